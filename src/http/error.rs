use std::io;
use std::time::Duration;

use crate::http::parser::ParseError;

/// Failures that end a request cycle.
///
/// `Parse` is the client's fault and can still be answered. `Io` and
/// `Timeout` mean the transport is gone or stuck; the connection is torn down
/// without writing anything.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Short name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse(e) => e.kind.as_str(),
            Error::Timeout { .. } => "timeout",
            Error::Io { .. } => "io",
        }
    }
}
