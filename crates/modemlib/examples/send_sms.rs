//! Send one SMS and print the message references.
//!
//! Texts longer than a single PDU are split and each part is submitted
//! after the modem acknowledged the previous one.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p modemlib --example send_sms -- /dev/ttyUSB2 +15551234567 "hello from modemlib"
//! ```

use std::time::Duration;

use modemlib::ModemBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [port, number, text] = args.as_slice() else {
        anyhow::bail!("usage: send_sms <port> <number> <text>");
    };

    let modem = ModemBuilder::new()
        .serial_port(port)
        .command_timeout(Duration::from_secs(30))
        .build()
        .await?;
    modem.start().await?;

    let refs = modem.send_sms(text, number).await?;
    println!("sent {} part(s), references {refs:?}", refs.len());

    modem.stop().await?;
    Ok(())
}
