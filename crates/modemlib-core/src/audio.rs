//! Audio capture types and the [`AudioCapture`] trait.
//!
//! Call audio from the modem's voice channel is recorded by an external
//! capture process (ALSA `arecord` on Linux). This module defines the
//! backend-agnostic configuration and stream types; the process-based
//! implementation lives in `modemlib-transport`.
//!
//! # Channel-based streaming
//!
//! Captured data flows through [`tokio::sync::mpsc`] channels wrapped in
//! [`ByteStream`]. A capture handle exposes two streams for its whole
//! lifetime: raw sample bytes from the process's stdout, and diagnostic text
//! from its stderr. The streams survive stop/start cycles; they end only when
//! the handle is dropped.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

// ---------------------------------------------------------------------------
// SampleFormat
// ---------------------------------------------------------------------------

/// Sample encoding requested from the capture process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit little-endian.
    #[default]
    S16Le,
    /// Signed 24-bit little-endian in 32-bit containers.
    S24Le,
    /// Signed 32-bit little-endian.
    S32Le,
    /// 32-bit IEEE float little-endian.
    FloatLe,
}

impl SampleFormat {
    /// The ALSA format name passed to `arecord -f`.
    pub fn alsa_name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S16Le => "S16_LE",
            SampleFormat::S24Le => "S24_LE",
            SampleFormat::S32Le => "S32_LE",
            SampleFormat::FloatLe => "FLOAT_LE",
        }
    }

    /// Size of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le | SampleFormat::S32Le | SampleFormat::FloatLe => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Configuration for one capture run.
///
/// Defaults: device `plughw:0,0`, mono, 48 kHz, `S16_LE`, no extra arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// ALSA device name.
    pub device: String,
    /// Number of channels.
    pub channels: u16,
    /// Sample rate in hertz.
    pub rate: u32,
    /// Sample encoding.
    pub sample_format: SampleFormat,
    /// Additional arguments appended verbatim to the capture command line.
    pub extra_args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            device: "plughw:0,0".to_string(),
            channels: 1,
            rate: 48_000,
            sample_format: SampleFormat::S16Le,
            extra_args: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Bytes of audio produced per second with this configuration.
    pub fn bytes_per_second(&self) -> usize {
        self.rate as usize * self.channels as usize * self.sample_format.bytes_per_sample()
    }
}

// ---------------------------------------------------------------------------
// ByteStream
// ---------------------------------------------------------------------------

/// A continuously readable stream of byte chunks from a capture process.
///
/// Wraps a bounded [`tokio::sync::mpsc::Receiver`]. If the consumer falls
/// behind, the producer drops chunks rather than growing without bound.
pub struct ByteStream {
    rx: mpsc::Receiver<Bytes>,
}

impl ByteStream {
    /// Create a new `ByteStream` wrapping an mpsc receiver.
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        ByteStream { rx }
    }

    /// Receive the next chunk.
    ///
    /// Returns `None` once the owning capture handle has been dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Receive a chunk if one is immediately available.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// AudioCapture trait
// ---------------------------------------------------------------------------

/// Owned handle to an external audio capture process.
///
/// At most one process runs per handle. Starting an already-running handle
/// is a no-op; stopping terminates the process and returns the handle to the
/// idle state, ready to be started again.
#[async_trait]
pub trait AudioCapture: Send {
    /// Spawn the capture process with `config` unless one is already running.
    async fn start(&mut self, config: CaptureConfig) -> Result<()>;

    /// Terminate the running capture process, if any.
    async fn stop(&mut self) -> Result<()>;

    /// Whether a capture process is currently running.
    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_modem_voice_channel() {
        let c = CaptureConfig::default();
        assert_eq!(c.device, "plughw:0,0");
        assert_eq!(c.channels, 1);
        assert_eq!(c.rate, 48_000);
        assert_eq!(c.sample_format, SampleFormat::S16Le);
        assert!(c.extra_args.is_empty());
    }

    #[test]
    fn alsa_names() {
        assert_eq!(SampleFormat::S16Le.alsa_name(), "S16_LE");
        assert_eq!(SampleFormat::FloatLe.alsa_name(), "FLOAT_LE");
        assert_eq!(SampleFormat::U8.alsa_name(), "U8");
    }

    #[test]
    fn bytes_per_second() {
        let c = CaptureConfig {
            channels: 2,
            rate: 8000,
            ..Default::default()
        };
        assert_eq!(c.bytes_per_second(), 32_000);
    }

    #[tokio::test]
    async fn byte_stream_recv_and_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = ByteStream::new(rx);

        tx.send(Bytes::from_static(b"\x01\x02")).await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), Bytes::from_static(b"\x01\x02"));

        drop(tx);
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn byte_stream_try_recv_empty() {
        let (_tx, rx) = mpsc::channel::<Bytes>(4);
        let mut stream = ByteStream::new(rx);
        assert!(stream.try_recv().is_none());
    }
}
