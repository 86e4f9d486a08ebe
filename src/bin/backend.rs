//! Demo origin server for trying the proxy locally.
//!
//! Answers every request with `Hello: <path>` and `/api/users` with a small
//! JSON document. One request per connection; the connection is closed after
//! the response.

use clap::Parser;
use http_relay::http::{Request, Response};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "demo-backend")]
#[command(about = "Demo HTTP/1.1 origin server for http-relay", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "BACKEND_LISTEN", default_value = "127.0.0.1:8081")]
    listen: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let listener = TcpListener::bind(&args.listen).await?;
    info!(address = %listener.local_addr()?, "Demo backend listening");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, addr).await {
                        warn!(peer = %addr, error = %e, "Request failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept connection"),
        }
    }
}

async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut stream = BufReader::new(stream);
    let request = Request::parse(&mut stream).await?;
    debug!(peer = %addr, request = ?request, "Request received");

    let response = route(&request);
    info!(
        peer = %addr,
        method = %request.method,
        path = %request.path,
        forwarded_for = request.headers.get("x-forwarded-for").map(String::as_str).unwrap_or("-"),
        status = response.status_code,
        "Served request"
    );

    stream.write_all(&response.serialize()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn route(request: &Request) -> Response {
    let (content_type, body) = match request.path.as_str() {
        "/api/users" => ("application/json", r#"{"users": ["Rohan"]}"#.to_string()),
        path => ("text/plain; charset=utf-8", format!("Hello: {}\n", path)),
    };

    let mut response = Response::synthesized(200, "OK");
    response
        .headers
        .insert("content-type".to_string(), content_type.to_string());
    response
        .headers
        .insert("content-length".to_string(), body.len().to_string());
    response.body = body.into();
    response
}
