use tracing::info;
use wireline::config::Config;
use wireline::http::request::Request;
use wireline::http::response::{Response, StatusCode};
use wireline::logging;
use wireline::server::Server;

fn hello(_req: &Request) -> anyhow::Result<Response> {
    Ok(Response::text(StatusCode::OK, "Hello, World!"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    logging::init(&cfg.log)?;

    info!(listen_addr = %cfg.listen_addr, "Starting wireline");

    let server = Server::bind(&cfg, hello).await?;
    server.run().await
}
