//! Runnable RTU slave demo
//!
//! Starts the simulator, logs every extracted request frame and answers
//! each one with an "illegal function" exception response, so a master
//! under test sees correctly framed and correctly paced traffic without
//! any register model behind it.
//!
//! Usage: `slave_demo [config.json]`, log level via `RUST_LOG`.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rtusim::{append_crc, RtuSlaveConfig, RtuSlaveServer};

/// Modbus exception code: Illegal Function
const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Build an exception response echoing the request's address and function
fn exception_response(request: &[u8]) -> Vec<u8> {
    let mut response = vec![
        request[0],
        request[1] | 0x80,
        EXCEPTION_ILLEGAL_FUNCTION,
    ];
    append_crc(&mut response);
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
        },
        None => RtuSlaveConfig::default(),
    };

    let mut server = RtuSlaveServer::new(config)?;
    let mut frames = server.frames().context("frame sink already taken")?;
    let sender = server.sender();
    let params = server.serial_params();
    server.start().await?;
    info!(
        "emulating {} baud, {} data bits, parity {}, {} stop bits",
        params.baud_rate, params.data_bits, params.parity, params.stop_bits
    );

    let responder = tokio::spawn(async move {
        while let Some(request) = frames.recv().await {
            info!("request: {}", hex::encode(&request));
            let response = exception_response(&request);
            if let Err(e) = sender.send(&response).await {
                warn!("response not sent: {}", e);
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    server.stop().await;
    responder.abort();
    Ok(())
}
