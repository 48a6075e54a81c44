//! Print calls and messages as they arrive.
//!
//! Initializes the modem, then logs every event until Ctrl-C. Incoming
//! calls are answered automatically when `--answer` is given.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=modemlib_at=debug cargo run -p modemlib --example sms_monitor -- /dev/ttyUSB2 [--answer]
//! ```

use modemlib::{ErrorKind, ModemBuilder, ModemEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/serial0".to_string());
    let auto_answer = args.any(|a| a == "--answer");

    let modem = ModemBuilder::new().serial_port(&port).build().await?;
    let mut events = modem.subscribe();
    modem.start().await?;
    tracing::info!(port = %port, "monitoring modem, Ctrl-C to quit");

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(ModemEvent::Ring) => {
                println!("RING");
                if auto_answer {
                    modem.answer().await?;
                }
            }
            Ok(ModemEvent::CallerId(number)) => println!("call from {number:?}"),
            Ok(ModemEvent::Hangup) => println!("call ended"),
            Ok(ModemEvent::Sms(msg)) => println!("SMS {msg}"),
            Ok(ModemEvent::Error { kind: ErrorKind::Transport, detail }) => {
                anyhow::bail!("modem connection failed: {detail}");
            }
            Ok(ModemEvent::Error { detail, .. }) => tracing::warn!(%detail, "modem reported an error"),
            Ok(ModemEvent::Disconnected) => break,
            Ok(ModemEvent::RawLine(_)) | Ok(ModemEvent::CommandComplete) => {}
            Ok(other) => println!("{other:?}"),
            Err(RecvError::Lagged(n)) => tracing::warn!(missed = n, "event consumer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }

    modem.stop().await?;
    Ok(())
}
