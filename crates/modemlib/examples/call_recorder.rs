//! Answer incoming calls and record their audio to raw PCM files.
//!
//! Each call is captured from the modem's voice channel with `arecord`
//! into `call-<n>.raw` (mono, 48 kHz, S16_LE) until the caller hangs up.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p modemlib --example call_recorder -- /dev/ttyUSB2 plughw:1,0
//! ```

use modemlib::transport::ProcessCapture;
use modemlib::{AudioCapture, CaptureConfig, ModemBuilder, ModemEvent};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/serial0".to_string());
    let config = CaptureConfig {
        device: args.next().unwrap_or_else(|| CaptureConfig::default().device),
        ..CaptureConfig::default()
    };

    let modem = ModemBuilder::new().serial_port(&port).build().await?;
    let mut events = modem.subscribe();
    modem.start().await?;

    let (mut capture, mut streams) = ProcessCapture::new();
    let mut output: Option<tokio::fs::File> = None;
    let mut calls = 0u32;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ModemEvent::Ring) if !capture.is_running() => {
                    modem.answer().await?;
                    calls += 1;
                    let path = format!("call-{calls}.raw");
                    output = Some(tokio::fs::File::create(&path).await?);
                    capture.start(config.clone()).await?;
                    tracing::info!(%path, "recording call");
                }
                Ok(ModemEvent::Hangup) if capture.is_running() => {
                    capture.stop().await?;
                    if let Some(mut file) = output.take() {
                        file.flush().await?;
                    }
                    tracing::info!("call ended");
                }
                Ok(ModemEvent::Disconnected) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!(missed = n, "event consumer fell behind"),
                Err(RecvError::Closed) => break,
            },
            Some(chunk) = streams.audio.recv() => {
                if let Some(file) = output.as_mut() {
                    file.write_all(&chunk).await?;
                }
            }
            Some(line) = streams.info.recv() => {
                tracing::debug!(recorder = %String::from_utf8_lossy(&line).trim_end(), "arecord");
            }
        }
    }

    capture.stop().await?;
    modem.stop().await?;
    Ok(())
}
