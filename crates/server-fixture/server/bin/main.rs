use std::{env, io};

use tlsproof_server_fixture::{bind, DEFAULT_FIXTURE_PORT};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();
    let addr = env::var("ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_FIXTURE_PORT);
    let listener = TcpListener::bind((addr, port)).await?;

    info!("Starting server fixture on port {port}");
    loop {
        let (socket, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = bind(socket).await {
                warn!("connection failed: {err}");
            }
        });
    }
}
