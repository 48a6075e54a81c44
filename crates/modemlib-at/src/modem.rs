//! Modem -- the application-facing handle for one AT modem.
//!
//! A [`Modem`] wraps the IO task spawned by
//! [`ModemBuilder`](crate::builder::ModemBuilder). Every operation is an
//! async request to that task; events arrive through [`Modem::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use modemlib_core::codec::PduCodec;
use modemlib_core::error::{Error, Result};
use modemlib_core::events::ModemEvent;
use modemlib_core::transport::Transport;
use modemlib_core::types::{AssembledMessage, ModemStatus};

use crate::commands;
use crate::io::{self, IoConfig, IoHandle, ModemIo, SharedStatus};

/// Grace period added to request timeouts so the IO task's own deadline
/// fires first.
const REPLY_MARGIN: Duration = Duration::from_millis(500);

/// Settings collected by the builder.
pub(crate) struct ModemSettings {
    pub pin: String,
    pub command_timeout: Duration,
    pub read_timeout: Duration,
    pub fragment_ttl: Duration,
    pub event_capacity: usize,
}

/// A connected AT modem.
///
/// Dropping the handle cancels the IO task and closes the transport; call
/// [`stop`](Modem::stop) to also wait for pending operations to be failed.
pub struct Modem {
    requests: IoHandle,
    io: Mutex<Option<ModemIo>>,
    cancel: CancellationToken,
    status: Arc<SharedStatus>,
    event_tx: broadcast::Sender<ModemEvent>,
    codec: Arc<dyn PduCodec>,
    pin: String,
    command_timeout: Duration,
    read_timeout: Duration,
}

impl Drop for Modem {
    fn drop(&mut self) {
        // Signal the IO loop to exit at its next select iteration.
        self.cancel.cancel();
    }
}

impl Modem {
    /// Spawn the IO task over `transport`.
    ///
    /// This is called by [`ModemBuilder`](crate::builder::ModemBuilder);
    /// callers should use the builder API instead.
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        codec: Arc<dyn PduCodec>,
        settings: ModemSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(settings.event_capacity);
        let config = IoConfig {
            command_timeout: settings.command_timeout,
            fragment_ttl: settings.fragment_ttl,
        };
        let io = io::spawn_io_task(transport, config, Arc::clone(&codec), event_tx.clone());

        Modem {
            requests: io.handle(),
            cancel: io.cancel.clone(),
            status: io.status(),
            io: Mutex::new(Some(io)),
            event_tx,
            codec,
            pin: settings.pin,
            command_timeout: settings.command_timeout,
            read_timeout: settings.read_timeout,
        }
    }

    async fn write(&self, lines: Vec<String>) -> Result<()> {
        let timeout = self.command_timeout * lines.len().max(1) as u32 + REPLY_MARGIN;
        self.requests.write(lines, timeout).await
    }

    /// Send the initialization sequence: echo check, connected-line and
    /// caller identification, audio channel, verbose errors, SMS routing,
    /// and SIM unlock.
    pub async fn start(&self) -> Result<()> {
        self.write(commands::init_sequence(&self.pin)).await?;
        info!("modem initialized");
        Ok(())
    }

    /// Close the transport.
    ///
    /// Pending reads, sends, and parked multipart readers fail with
    /// [`Error::ConnectionClosed`] and a [`ModemEvent::Disconnected`] is
    /// published. Stopping an already stopped modem does nothing.
    pub async fn stop(&self) -> Result<()> {
        let Some(io) = self.io.lock().await.take() else {
            debug!("modem already stopped");
            return Ok(());
        };
        io.shutdown().await
    }

    /// Place a voice call to `number`.
    pub async fn dial(&self, number: &str) -> Result<()> {
        validate_number(number)?;
        self.write(vec![commands::dial(number)]).await
    }

    /// Answer the ringing call and publish [`ModemEvent::Answer`].
    pub async fn answer(&self) -> Result<()> {
        self.write(vec![commands::answer()]).await?;
        let _ = self.event_tx.send(ModemEvent::Answer);
        Ok(())
    }

    /// End the current call.
    pub async fn hangup(&self) -> Result<()> {
        self.write(vec![commands::hangup()]).await
    }

    /// Ask for a signal quality report, delivered as
    /// [`ModemEvent::SignalQuality`].
    pub async fn request_signal_quality(&self) -> Result<()> {
        self.write(vec![commands::signal_quality()]).await
    }

    /// Send `text` to `number`, split into as many PDUs as needed.
    ///
    /// Each segment is submitted only after the modem acknowledged the
    /// previous one. Returns the message reference of every segment.
    pub async fn send_sms(&self, text: &str, number: &str) -> Result<Vec<u32>> {
        validate_number(number)?;
        let segments = self.codec.encode(text, number)?;
        debug!(segments = segments.len(), number, "sending SMS");
        let timeout = self.command_timeout * (segments.len() as u32 + 2) + REPLY_MARGIN;
        self.requests.send_sms(segments, timeout).await
    }

    /// Read the message stored at `id`.
    ///
    /// When the stored PDU is one part of a longer message, the call
    /// completes once the remaining parts have arrived, or fails with
    /// [`Error::Timeout`] after the configured read timeout.
    pub async fn read_sms(&self, id: u32) -> Result<AssembledMessage> {
        self.requests.read_sms(id, self.read_timeout).await
    }

    /// Subscribe to modem events.
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.event_tx.subscribe()
    }

    /// Readiness flags reported by the modem so far.
    pub fn status(&self) -> ModemStatus {
        self.status.snapshot()
    }
}

/// Dial strings and SMS addresses: digits, `+`, `*`, `#`.
fn validate_number(number: &str) -> Result<()> {
    if number.is_empty() {
        return Err(Error::InvalidParameter("number must not be empty".into()));
    }
    if let Some(c) = number
        .chars()
        .find(|c| !(c.is_ascii_digit() || matches!(c, '+' | '*' | '#')))
    {
        return Err(Error::InvalidParameter(format!(
            "invalid character {c:?} in number {number:?}"
        )));
    }
    Ok(())
}
