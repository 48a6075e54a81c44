//! Process-based audio capture for modem voice calls.
//!
//! [`ProcessCapture`] records the modem's voice channel by spawning an
//! external recorder (ALSA `arecord` by default) and bridging its stdout and
//! stderr into two tokio channels:
//!
//! - **audio**: raw sample bytes exactly as the recorder writes them
//! - **info**: the recorder's diagnostic text
//!
//! Both streams are created together with the handle and stay open across
//! any number of start/stop cycles, so a consumer can attach once and keep
//! reading while calls come and go.
//!
//! The handle owns at most one child process. The child is spawned with
//! `kill_on_drop`, so dropping the handle never leaks a recorder.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use modemlib_core::audio::{AudioCapture, ByteStream, CaptureConfig};
use modemlib_core::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Channel buffer capacity, in chunks, for each stream.
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Read size for one chunk pulled from the child's pipes.
const CHUNK_SIZE: usize = 4096;

/// Default recorder program.
pub const DEFAULT_PROGRAM: &str = "arecord";

/// Build the recorder command line for `config`.
///
/// ```
/// use modemlib_core::CaptureConfig;
/// use modemlib_transport::audio::capture_args;
///
/// let args = capture_args(&CaptureConfig::default());
/// assert_eq!(args, ["-D", "plughw:0,0", "-c", "1", "-r", "48000", "-f", "S16_LE"]);
/// ```
pub fn capture_args(config: &CaptureConfig) -> Vec<String> {
    let mut args = vec![
        "-D".to_string(),
        config.device.clone(),
        "-c".to_string(),
        config.channels.to_string(),
        "-r".to_string(),
        config.rate.to_string(),
        "-f".to_string(),
        config.sample_format.alsa_name().to_string(),
    ];
    args.extend(config.extra_args.iter().cloned());
    args
}

/// The two output streams of a [`ProcessCapture`].
pub struct CaptureStreams {
    /// Raw sample bytes from the recorder's stdout.
    pub audio: ByteStream,
    /// Diagnostic text from the recorder's stderr.
    pub info: ByteStream,
}

/// Owned handle to an external audio recorder process.
pub struct ProcessCapture {
    program: String,
    child: Option<Child>,
    pumps: Vec<JoinHandle<()>>,
    audio_tx: mpsc::Sender<Bytes>,
    info_tx: mpsc::Sender<Bytes>,
}

impl ProcessCapture {
    /// Create an idle handle that records with `arecord`.
    pub fn new() -> (Self, CaptureStreams) {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Create an idle handle that records with a different program.
    ///
    /// The program receives the arguments built by [`capture_args`].
    pub fn with_program(program: &str) -> (Self, CaptureStreams) {
        let (audio_tx, audio_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (info_tx, info_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let capture = ProcessCapture {
            program: program.to_string(),
            child: None,
            pumps: Vec::new(),
            audio_tx,
            info_tx,
        };
        let streams = CaptureStreams {
            audio: ByteStream::new(audio_rx),
            info: ByteStream::new(info_rx),
        };
        (capture, streams)
    }

    /// The recorder program this handle spawns.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Drop the child handle if the process has already exited on its own.
    fn reap_exited(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(program = %self.program, %status, "capture process exited");
                    self.child = None;
                    self.pumps.clear();
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(program = %self.program, error = %e, "failed to poll capture process");
                }
            }
        }
    }
}

#[async_trait]
impl AudioCapture for ProcessCapture {
    async fn start(&mut self, config: CaptureConfig) -> Result<()> {
        self.reap_exited();
        if self.child.is_some() {
            tracing::debug!(program = %self.program, "capture already running");
            return Ok(());
        }

        let args = capture_args(&config);
        tracing::debug!(program = %self.program, ?args, "spawning capture process");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(program = %self.program, error = %e, "failed to spawn capture process");
                Error::Transport(format!("failed to spawn {}: {e}", self.program))
            })?;

        if let Some(stdout) = child.stdout.take() {
            self.pumps.push(tokio::spawn(pump(stdout, self.audio_tx.clone(), "audio")));
        }
        if let Some(stderr) = child.stderr.take() {
            self.pumps.push(tokio::spawn(pump(stderr, self.info_tx.clone(), "info")));
        }

        tracing::info!(program = %self.program, device = %config.device, "audio capture started");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Err(e) = child.start_kill() {
            // Already exited; nothing to signal.
            tracing::debug!(program = %self.program, error = %e, "capture process not killable");
        }
        let status = child.wait().await?;
        tracing::info!(program = %self.program, %status, "audio capture stopped");

        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for ProcessCapture {
    fn drop(&mut self) {
        if self.child.is_some() {
            tracing::debug!(program = %self.program, "ProcessCapture dropped, killing recorder");
        }
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

/// Copy a child pipe into a stream channel until EOF.
///
/// Chunks are dropped when the consumer is not keeping up.
async fn pump<R>(mut reader: R, tx: mpsc::Sender<Bytes>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(mpsc::error::TrySendError::Full(_)) =
                    tx.try_send(Bytes::copy_from_slice(&buf[..n]))
                {
                    tracing::trace!(stream, bytes = n, "capture consumer lagging, chunk dropped");
                }
            }
            Err(e) => {
                tracing::warn!(stream, error = %e, "capture pipe read failed");
                break;
            }
        }
    }
    tracing::trace!(stream, "capture pipe closed");
}
