use std::time::Duration;

use wireline::http::error::Error;
use wireline::http::parser::{Limits, ParseErrorKind, parse_request};
use wireline::http::reader::ByteReader;
use wireline::http::request::{Method, Request, Version};
use wireline::http::response::StatusCode;

async fn parse(raw: &[u8]) -> Result<Request, Error> {
    parse_with(raw, Limits::default()).await
}

async fn parse_with(raw: &[u8], limits: Limits) -> Result<Request, Error> {
    let mut reader = ByteReader::new(raw);
    parse_request(&mut reader, &limits).await
}

fn kind(result: Result<Request, Error>) -> ParseErrorKind {
    match result {
        Err(Error::Parse(e)) => e.kind,
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_parse_simple_get_request() {
    let req = parse(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await.unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.target, "/");
    assert_eq!(req.version, Version::Http11);
    assert_eq!(req.header("Host"), Some("example.com"));
    assert!(req.body.is_empty());
}

#[tokio::test]
async fn test_parse_post_request_with_body_does_not_over_read() {
    let raw = b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /next HTTP/1.1\r\n\r\n";
    let mut reader = ByteReader::new(&raw[..]);

    let req = parse_request(&mut reader, &Limits::default()).await.unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(&req.body[..], b"hello");
    assert_eq!(reader.buffered(), b"GET /next HTTP/1.1\r\n\r\n");

    let next = parse_request(&mut reader, &Limits::default()).await.unwrap();
    assert_eq!(next.target, "/next");
}

#[tokio::test]
async fn test_parse_headers_keep_order_and_duplicates() {
    let req = parse(
        b"GET /path HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\nX-Tag: one\r\nx-tag: two\r\n\r\n",
    )
    .await
    .unwrap();

    let pairs: Vec<_> = req.headers.iter().collect();
    assert_eq!(
        pairs,
        vec![
            ("Host", "example.com"),
            ("Accept", "*/*"),
            ("X-Tag", "one"),
            ("x-tag", "two"),
        ]
    );
    assert_eq!(req.headers.get_all("X-TAG").collect::<Vec<_>>(), vec!["one", "two"]);
}

#[tokio::test]
async fn test_parse_trims_outer_whitespace_only() {
    let req = parse(b"GET / HTTP/1.1\r\nX-Pad :  spaced   value \t\r\n\r\n").await.unwrap();

    assert_eq!(req.header("X-Pad"), Some("spaced   value"));
}

#[tokio::test]
async fn test_parse_request_with_path_and_query_string() {
    let req = parse(b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n").await.unwrap();

    assert_eq!(req.target, "/search?q=rust");
    assert_eq!(req.path(), "/search");
    assert_eq!(req.query(), Some("q=rust"));
}

#[tokio::test]
async fn test_parse_http_10() {
    let req = parse(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    assert_eq!(req.version, Version::Http10);
}

#[tokio::test]
async fn test_parse_extension_method() {
    let req = parse(b"PROPFIND /dav HTTP/1.1\r\n\r\n").await.unwrap();
    assert_eq!(req.method, Method::Extension("PROPFIND".to_string()));
}

#[tokio::test]
async fn test_parse_skips_leading_empty_lines() {
    let req = parse(b"\r\n\r\nGET / HTTP/1.1\r\n\r\n").await.unwrap();
    assert_eq!(req.method, Method::GET);
}

#[tokio::test]
async fn test_parse_two_field_start_line() {
    let result = parse(b"GET /\r\n\r\n").await;

    let Err(Error::Parse(err)) = result else {
        panic!("expected parse error");
    };
    assert_eq!(err.kind, ParseErrorKind::MalformedStartLine);
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.line, "GET /");
}

#[tokio::test]
async fn test_parse_rejects_extra_spaces_in_start_line() {
    for raw in [
        &b"GET  / HTTP/1.1\r\n\r\n"[..],
        b"GET / HTTP/1.1 \r\n\r\n",
        b" GET / HTTP/1.1\r\n\r\n",
        b"GET / HTTP/1.1 extra\r\n\r\n",
    ] {
        assert_eq!(kind(parse(raw).await), ParseErrorKind::MalformedStartLine);
    }
}

#[tokio::test]
async fn test_parse_invalid_method_token() {
    assert_eq!(kind(parse(b"GE(T / HTTP/1.1\r\n\r\n").await), ParseErrorKind::MalformedStartLine);
}

#[tokio::test]
async fn test_parse_target_with_control_character() {
    assert_eq!(
        kind(parse(b"GET /a\tb HTTP/1.1\r\n\r\n").await),
        ParseErrorKind::MalformedStartLine
    );
}

#[tokio::test]
async fn test_parse_unsupported_version() {
    for raw in [&b"GET / HTTP/2.0\r\n\r\n"[..], b"GET / http/1.1\r\n\r\n", b"GET / HTTP/1.10\r\n\r\n"] {
        assert_eq!(kind(parse(raw).await), ParseErrorKind::UnsupportedVersion);
    }
}

#[tokio::test]
async fn test_parse_header_without_colon() {
    let result = parse(b"GET / HTTP/1.1\r\nHost: a\r\nX-Broken\r\n\r\n").await;

    let Err(Error::Parse(err)) = result else {
        panic!("expected parse error");
    };
    assert_eq!(err.kind, ParseErrorKind::InvalidHeaderSyntax);
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.line, "X-Broken");
}

#[tokio::test]
async fn test_parse_folded_header_is_rejected() {
    assert_eq!(
        kind(parse(b"GET / HTTP/1.1\r\nX-Long: a\r\n  continued\r\n\r\n").await),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_header_name_with_space() {
    assert_eq!(
        kind(parse(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n").await),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_empty_header_name() {
    assert_eq!(
        kind(parse(b"GET / HTTP/1.1\r\n: value\r\n\r\n").await),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_body_too_large() {
    let result = parse(b"POST / HTTP/1.1\r\nContent-Length: 999999999999\r\n\r\n").await;

    let Err(Error::Parse(err)) = result else {
        panic!("expected parse error");
    };
    assert_eq!(err.kind, ParseErrorKind::BodyTooLarge);
    assert_eq!(err.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));
}

#[tokio::test]
async fn test_parse_content_length_overflow_is_too_large() {
    assert_eq!(
        kind(parse(b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n").await),
        ParseErrorKind::BodyTooLarge
    );
}

#[tokio::test]
async fn test_parse_invalid_content_length() {
    for value in ["abc", "-1", "+5", "5 5", "0x10"] {
        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\nhello", value);
        assert_eq!(
            kind(parse(raw.as_bytes()).await),
            ParseErrorKind::InvalidHeaderSyntax,
            "Content-Length: {}",
            value
        );
    }
}

#[tokio::test]
async fn test_parse_conflicting_content_lengths() {
    assert_eq!(
        kind(parse(b"POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\nhello!").await),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_repeated_equal_content_lengths() {
    let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 5\r\ncontent-length: 5\r\n\r\nhello")
        .await
        .unwrap();
    assert_eq!(&req.body[..], b"hello");
}

#[tokio::test]
async fn test_parse_content_length_with_chunked_is_rejected() {
    assert_eq!(
        kind(
            parse(b"POST / HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\nhello")
                .await
        ),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_transfer_encoding_alone_is_rejected() {
    assert_eq!(
        kind(parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n").await),
        ParseErrorKind::InvalidHeaderSyntax
    );
}

#[tokio::test]
async fn test_parse_too_many_headers() {
    let limits = Limits {
        max_headers: 2,
        ..Limits::default()
    };
    let result = parse_with(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n", limits).await;

    let Err(Error::Parse(err)) = result else {
        panic!("expected parse error");
    };
    assert_eq!(err.kind, ParseErrorKind::HeaderTooLarge);
    assert_eq!(err.status(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
}

#[tokio::test]
async fn test_parse_header_line_too_long() {
    let limits = Limits {
        max_line_len: 32,
        ..Limits::default()
    };
    let raw = format!("GET / HTTP/1.1\r\nX-Long: {}\r\n\r\n", "a".repeat(64));

    assert_eq!(kind(parse_with(raw.as_bytes(), limits).await), ParseErrorKind::HeaderTooLarge);
}

#[tokio::test]
async fn test_parse_total_header_bytes_exceeded() {
    let limits = Limits {
        max_line_len: 64,
        max_header_bytes: 64,
        ..Limits::default()
    };
    let raw = b"GET / HTTP/1.1\r\nX-A: aaaaaaaaaaaaaaaaaaaa\r\nX-B: bbbbbbbbbbbbbbbbbbbb\r\nX-C: cccccccccccccccccccc\r\n\r\n";

    assert_eq!(kind(parse_with(raw, limits).await), ParseErrorKind::HeaderTooLarge);
}

#[tokio::test]
async fn test_parse_start_line_too_long() {
    let limits = Limits {
        max_line_len: 16,
        ..Limits::default()
    };
    let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "x".repeat(64));

    assert_eq!(kind(parse_with(raw.as_bytes(), limits).await), ParseErrorKind::MalformedStartLine);
}

#[tokio::test]
async fn test_parse_connection_closed_in_headers() {
    let result = parse(b"GET / HTTP/1.1\r\nHost: exa").await;

    let Err(Error::Parse(err)) = result else {
        panic!("expected parse error");
    };
    assert_eq!(err.kind, ParseErrorKind::ConnectionClosedEarly);
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_parse_connection_closed_in_body() {
    assert_eq!(
        kind(parse(b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello").await),
        ParseErrorKind::ConnectionClosedEarly
    );
}

#[tokio::test]
async fn test_parse_request_with_empty_body() {
    let req = parse(b"POST /api HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await.unwrap();
    assert_eq!(req.body.len(), 0);
}

#[tokio::test]
async fn test_parse_request_with_binary_body() {
    let req = parse(b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03")
        .await
        .unwrap();
    assert_eq!(&req.body[..], &[0, 1, 2, 3]);
}

#[tokio::test]
async fn test_parse_without_content_length_reads_no_body() {
    let raw = b"POST /api HTTP/1.1\r\n\r\nstray";
    let mut reader = ByteReader::new(&raw[..]);

    let req = parse_request(&mut reader, &Limits::default()).await.unwrap();

    assert!(req.body.is_empty());
    assert_eq!(reader.buffered(), b"stray");
}

#[tokio::test]
async fn test_parse_split_across_reads() {
    let (mut client, server) = tokio::io::duplex(1024);
    let mut reader = ByteReader::new(server);

    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        for chunk in [&b"GET /sl"[..], b"ow HTTP/1.1\r", b"\nHost: a\r\n\r", b"\n"] {
            client.write_all(chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        client
    });

    let req = parse_request(&mut reader, &Limits::default()).await.unwrap();
    assert_eq!(req.target, "/slow");
    assert_eq!(req.header("host"), Some("a"));
    writer.await.unwrap();
}

#[tokio::test]
async fn test_parse_times_out_on_silent_peer() {
    let (_client, server) = tokio::io::duplex(64);
    let mut reader = ByteReader::new(server).with_timeout(Duration::from_millis(50));

    let result = parse_request(&mut reader, &Limits::default()).await;

    assert!(matches!(result, Err(Error::Timeout { op: "read", .. })));
}

#[tokio::test]
async fn test_parse_with_unbounded_line_limit_across_reads() {
    use tokio::io::AsyncWriteExt;

    let limits = Limits {
        max_line_len: usize::MAX,
        max_header_bytes: usize::MAX,
        ..Limits::default()
    };
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = ByteReader::new(server);

    let feed = tokio::spawn(async move {
        client.write_all(b"GET / HT").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.write_all(b"TP/1.1\r\n\r\n").await.unwrap();
        client
    });

    let req = parse_request(&mut reader, &limits).await.unwrap();
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.version, Version::Http11);
    drop(feed.await.unwrap());
}
