//! IO task types and implementation for the AT engine.
//!
//! One tokio task owns the transport exclusively. It frames incoming bytes
//! into lines, runs them through the [`ModemSession`] state machine, and
//! carries out the resulting effects: publishing events, writing commands,
//! and answering callers.
//!
//! # Capture slot
//!
//! Commands whose reply must be captured (reading a stored SMS, including
//! the reads triggered by `+CMTI`, and sending an SMS, which waits for a
//! `+CMGS` per segment) run one at a time through a single slot. Later
//! ones wait in a FIFO backlog. Every slot command has a deadline of
//! `command_timeout`; expiry fails it with [`Error::Timeout`] and frees the
//! slot. Plain writes (dial, answer, hangup, init) bypass the slot.
//!
//! A read that yields one fragment of an incomplete multipart message frees
//! the slot but leaves its caller parked on the concatenation reference
//! until any later capture completes that reference. Once a second the
//! task drops parked callers that gave up and multipart groups older than
//! `fragment_ttl`; callers parked on an evicted group get
//! [`Error::Timeout`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use modemlib_core::codec::PduCodec;
use modemlib_core::error::{Error, Result};
use modemlib_core::events::{ErrorKind, ModemEvent};
use modemlib_core::transport::Transport;
use modemlib_core::types::{AssembledMessage, ModemStatus, PduSegment};

use crate::commands;
use crate::protocol::LineFramer;
use crate::session::{Continuation, Effect, ModemSession};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How long one idle read waits for data.
const IDLE_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after an idle read that returned nothing.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Period of the parked-reader and fragment cleanup.
const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(1);

/// Configuration for the modem IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Deadline for each slot command (and each segment of a send).
    pub command_timeout: Duration,
    /// How long an incomplete multipart group is kept.
    pub fragment_ttl: Duration,
}

type ReadReply = oneshot::Sender<Result<AssembledMessage>>;
type SendReply = oneshot::Sender<Result<Vec<u32>>>;

/// A request sent from [`IoHandle`] to the IO task.
pub enum Request {
    /// Write command lines in order.
    Write {
        lines: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Read the stored message at `id`.
    ReadSms { id: u32, reply: ReadReply },
    /// Send pre-encoded segments, one `AT+CMGS` at a time.
    SendSms {
        segments: Vec<PduSegment>,
        reply: SendReply,
    },
    /// Fail everything pending, close the transport, and exit.
    Shutdown { reply: oneshot::Sender<Result<()>> },
}

/// Readiness flags shared between the IO task and the modem handle.
#[derive(Debug, Default)]
pub struct SharedStatus {
    sms_ready: AtomicBool,
    call_ready: AtomicBool,
}

impl SharedStatus {
    /// Current flags.
    pub fn snapshot(&self) -> ModemStatus {
        ModemStatus {
            sms_ready: self.sms_ready.load(Ordering::Acquire),
            call_ready: self.call_ready.load(Ordering::Acquire),
        }
    }

    fn store(&self, status: ModemStatus) {
        self.sms_ready.store(status.sms_ready, Ordering::Release);
        self.call_ready.store(status.call_ready, Ordering::Release);
    }
}

/// Cloneable sender side of the IO task.
#[derive(Clone)]
pub struct IoHandle {
    tx: mpsc::Sender<Request>,
}

impl IoHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
        timeout: Duration,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Write command lines and wait until they are on the wire.
    pub async fn write(&self, lines: Vec<String>, timeout: Duration) -> Result<()> {
        self.request(|reply| Request::Write { lines, reply }, timeout)
            .await
    }

    /// Read a stored message, waiting up to `timeout` for it to complete.
    pub async fn read_sms(&self, id: u32, timeout: Duration) -> Result<AssembledMessage> {
        self.request(|reply| Request::ReadSms { id, reply }, timeout)
            .await
    }

    /// Send encoded segments and collect their message references.
    pub async fn send_sms(&self, segments: Vec<PduSegment>, timeout: Duration) -> Result<Vec<u32>> {
        self.request(|reply| Request::SendSms { segments, reply }, timeout)
            .await
    }
}

/// Owner of the IO task. Stored inside the [`Modem`](crate::modem::Modem).
pub struct ModemIo {
    handle: IoHandle,
    /// Cancellation token for abrupt termination (handle dropped).
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
    status: Arc<SharedStatus>,
}

impl ModemIo {
    /// A cloneable request handle.
    pub fn handle(&self) -> IoHandle {
        self.handle.clone()
    }

    /// Shared readiness flags.
    pub fn status(&self) -> Arc<SharedStatus> {
        Arc::clone(&self.status)
    }

    /// Shut down the IO task: pending operations fail with
    /// [`Error::ConnectionClosed`] and the transport is closed.
    ///
    /// Succeeds without doing anything if the task has already exited.
    pub async fn shutdown(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .handle
            .tx
            .send(Request::Shutdown { reply: reply_tx })
            .await
            .is_err()
        {
            debug!("IO task already stopped");
            let _ = self.task.await;
            return Ok(());
        }
        let result = reply_rx.await.unwrap_or(Ok(()));
        let _ = self.task.await;
        result
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the owner handle.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    codec: Arc<dyn PduCodec>,
    event_tx: broadcast::Sender<ModemEvent>,
) -> ModemIo {
    let (tx, rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let status = Arc::new(SharedStatus::default());

    let engine = Engine {
        session: ModemSession::new(codec),
        framer: LineFramer::new(),
        event_tx,
        status: Arc::clone(&status),
        command_timeout: config.command_timeout,
        fragment_ttl: config.fragment_ttl,
        slot: None,
        backlog: VecDeque::new(),
        parked: HashMap::new(),
    };
    let task = tokio::spawn(io_loop(transport, engine, rx, cancel.clone()));

    ModemIo {
        handle: IoHandle { tx },
        cancel,
        task,
        status,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop(Option<oneshot::Sender<Result<()>>>),
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Requests from the modem handle
/// 3. Expiry of the slot command's deadline
/// 4. Periodic cleanup of parked readers and stale fragments
/// 5. Reading modem output
async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut engine: Engine,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut read_buf = [0u8; 256];
    let mut housekeeping = tokio::time::interval(HOUSEKEEPING_PERIOD);
    housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let deadline = engine.deadline();
        let outcome: Result<Flow> = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("modem IO task cancelled");
                Ok(Flow::Stop(None))
            }

            req = rx.recv() => match req {
                Some(Request::Shutdown { reply }) => {
                    debug!("IO task shutdown requested");
                    Ok(Flow::Stop(Some(reply)))
                }
                Some(req) => engine
                    .handle_request(req, &mut *transport)
                    .await
                    .map(|()| Flow::Continue),
                None => {
                    debug!("request channel closed, exiting IO task");
                    Ok(Flow::Stop(None))
                }
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.expire_slot(&mut *transport).await.map(|()| Flow::Continue)
            }

            _ = housekeeping.tick() => {
                engine.housekeeping(Instant::now());
                Ok(Flow::Continue)
            }

            read = async {
                let result = transport.receive(&mut read_buf, IDLE_READ_TIMEOUT).await;
                if matches!(result, Ok(0) | Err(Error::Timeout)) {
                    // Nothing arrived; yield briefly so the loop can check
                    // for requests, deadlines, or cancellation.
                    tokio::time::sleep(IDLE_BACKOFF).await;
                }
                result
            } => match read {
                Ok(n) if n > 0 => engine
                    .on_bytes(&read_buf[..n], &mut *transport)
                    .await
                    .map(|()| Flow::Continue),
                Ok(_) | Err(Error::Timeout) => Ok(Flow::Continue),
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop(reply)) => {
                engine.teardown(|| Error::ConnectionClosed);
                let closed = transport.close().await;
                engine.publish(ModemEvent::Disconnected);
                tracing::info!("modem session closed");
                if let Some(reply) = reply {
                    let _ = reply.send(closed);
                }
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "modem transport failed");
                engine.publish(ModemEvent::transport_error(e.to_string()));
                engine.teardown(|| Error::ConnectionLost);
                let _ = transport.close().await;
                engine.publish(ModemEvent::Disconnected);
                return;
            }
        }
    }
}

/// Write each line as one transport send.
async fn write_all(transport: &mut dyn Transport, lines: &[String]) -> Result<()> {
    for line in lines {
        tracing::trace!(line = %line.escape_debug(), "tx");
        transport.send(line.as_bytes()).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A command that needs the capture slot.
enum SlotCommand {
    /// `reply` is `None` for reads triggered by `+CMTI`, whose result is
    /// published instead.
    Read { id: u32, reply: Option<ReadReply> },
    Send {
        segments: VecDeque<PduSegment>,
        refs: Vec<u32>,
        reply: SendReply,
    },
}

impl SlotCommand {
    fn fail(self, error: Error) {
        match self {
            SlotCommand::Read {
                id,
                reply: Some(reply),
            } => {
                debug!(id, %error, "read failed");
                let _ = reply.send(Err(error));
            }
            SlotCommand::Read { id, reply: None } => {
                tracing::warn!(id, %error, "read of new message failed");
            }
            SlotCommand::Send { refs, reply, .. } => {
                debug!(sent = refs.len(), %error, "send failed");
                let _ = reply.send(Err(error));
            }
        }
    }
}

struct Slot {
    command: SlotCommand,
    deadline: Instant,
}

/// Everything the IO task owns besides the transport.
struct Engine {
    session: ModemSession,
    framer: LineFramer,
    event_tx: broadcast::Sender<ModemEvent>,
    status: Arc<SharedStatus>,
    command_timeout: Duration,
    fragment_ttl: Duration,
    slot: Option<Slot>,
    backlog: VecDeque<SlotCommand>,
    /// Readers waiting for the rest of a multipart message, by reference.
    parked: HashMap<u16, Vec<ReadReply>>,
}

impl Engine {
    fn publish(&self, event: ModemEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    fn deadline(&self) -> Option<Instant> {
        self.slot.as_ref().map(|s| s.deadline)
    }

    async fn handle_request(&mut self, req: Request, transport: &mut dyn Transport) -> Result<()> {
        match req {
            Request::Write { lines, reply } => {
                let result = write_all(transport, &lines).await;
                let failure = result.as_ref().err().map(ToString::to_string);
                let _ = reply.send(result);
                match failure {
                    Some(detail) => Err(Error::Transport(detail)),
                    None => Ok(()),
                }
            }
            Request::ReadSms { id, reply } => {
                self.enqueue(SlotCommand::Read { id, reply: Some(reply) }, transport)
                    .await
            }
            Request::SendSms { segments, reply } => {
                let command = SlotCommand::Send {
                    segments: segments.into(),
                    refs: Vec::new(),
                    reply,
                };
                self.enqueue(command, transport).await
            }
            Request::Shutdown { .. } => unreachable!("Shutdown handled in io_loop"),
        }
    }

    async fn on_bytes(&mut self, data: &[u8], transport: &mut dyn Transport) -> Result<()> {
        for line in self.framer.push(data) {
            tracing::trace!(line = %line.escape_debug(), "rx");
            let effects = self.session.feed_line(&line);
            self.status.store(self.session.status());
            for effect in effects {
                self.apply(effect, transport).await?;
            }
        }
        Ok(())
    }

    async fn apply(&mut self, effect: Effect, transport: &mut dyn Transport) -> Result<()> {
        match effect {
            Effect::Publish(event) => {
                let sent = match &event {
                    ModemEvent::SmsSent(mr) => Some(*mr),
                    _ => None,
                };
                let modem_error = match &event {
                    ModemEvent::Error {
                        kind: ErrorKind::Modem,
                        detail,
                    } => Some(detail.clone()),
                    _ => None,
                };
                self.publish(event);

                if let Some(mr) = sent {
                    self.on_sms_sent(mr, transport).await?;
                }
                if let Some(detail) = modem_error {
                    if let Some(slot) = self.slot.take() {
                        self.session.cancel_read();
                        slot.command.fail(Error::Modem(detail));
                    }
                    self.start_next(transport).await?;
                }
                Ok(())
            }
            Effect::ReadStored(id) => {
                debug!(id, "new message stored, scheduling read");
                self.enqueue(SlotCommand::Read { id, reply: None }, transport)
                    .await
            }
            Effect::SmsResolved {
                continuation,
                message,
                reference,
            } => {
                match continuation {
                    Continuation::AwaitingSmsRead { id } => match self.take_read_slot(id) {
                        Some(Some(reply)) => {
                            let _ = reply.send(Ok(message.clone()));
                        }
                        // Internal read, or the reader already gave up.
                        _ => self.publish(ModemEvent::Sms(message.clone())),
                    },
                    Continuation::AwaitingSmsNotify => {
                        self.publish(ModemEvent::Sms(message.clone()));
                    }
                }
                if let Some(waiters) = reference.and_then(|r| self.parked.remove(&r)) {
                    debug!(?reference, waiters = waiters.len(), "waking parked readers");
                    for waiter in waiters {
                        let _ = waiter.send(Ok(message.clone()));
                    }
                }
                self.start_next(transport).await
            }
            Effect::SmsIncomplete {
                continuation,
                reference,
            } => {
                if let Continuation::AwaitingSmsRead { id } = continuation {
                    if let Some(Some(reply)) = self.take_read_slot(id) {
                        debug!(id, reference, "parking reader until message completes");
                        let waiters = self.parked.entry(reference).or_default();
                        waiters.retain(|w| !w.is_closed());
                        waiters.push(reply);
                    }
                }
                self.start_next(transport).await
            }
            Effect::CaptureFailed {
                continuation,
                error,
            } => {
                if let Continuation::AwaitingSmsRead { id } = continuation {
                    if let Some(Some(reply)) = self.take_read_slot(id) {
                        let _ = reply.send(Err(Error::Protocol(error)));
                    }
                }
                self.start_next(transport).await
            }
        }
    }

    /// Free the slot if it holds the read of `id`, returning its reply.
    fn take_read_slot(&mut self, id: u32) -> Option<Option<ReadReply>> {
        match &self.slot {
            Some(Slot {
                command: SlotCommand::Read { id: active, .. },
                ..
            }) if *active == id => {}
            _ => {
                debug!(id, "capture does not belong to the active command");
                return None;
            }
        }
        match self.slot.take() {
            Some(Slot {
                command: SlotCommand::Read { reply, .. },
                ..
            }) => Some(reply),
            _ => None,
        }
    }

    async fn on_sms_sent(&mut self, mr: u32, transport: &mut dyn Transport) -> Result<()> {
        let next = match self.slot.as_mut() {
            Some(Slot {
                command: SlotCommand::Send { segments, refs, .. },
                deadline,
            }) => {
                refs.push(mr);
                *deadline = Instant::now() + self.command_timeout;
                segments.pop_front()
            }
            _ => {
                debug!(mr, "+CMGS outside a send");
                return Ok(());
            }
        };

        match next {
            Some(segment) => write_all(transport, &commands::send_segment(&segment)).await,
            None => {
                if let Some(Slot {
                    command: SlotCommand::Send { refs, reply, .. },
                    ..
                }) = self.slot.take()
                {
                    debug!(?refs, "SMS sent");
                    let _ = reply.send(Ok(refs));
                }
                self.start_next(transport).await
            }
        }
    }

    async fn enqueue(&mut self, command: SlotCommand, transport: &mut dyn Transport) -> Result<()> {
        self.backlog.push_back(command);
        self.start_next(transport).await
    }

    /// Start backlog commands until one occupies the slot.
    async fn start_next(&mut self, transport: &mut dyn Transport) -> Result<()> {
        while self.slot.is_none() {
            let Some(command) = self.backlog.pop_front() else {
                break;
            };
            let deadline = Instant::now() + self.command_timeout;

            match command {
                SlotCommand::Read { id, reply } => {
                    if reply.as_ref().is_some_and(|r| r.is_closed()) {
                        debug!(id, "read abandoned before it started");
                        continue;
                    }
                    self.session.expect_read(id);
                    self.slot = Some(Slot {
                        command: SlotCommand::Read { id, reply },
                        deadline,
                    });
                    write_all(transport, &[commands::pdu_mode(), commands::read_sms(id)]).await?;
                }
                SlotCommand::Send {
                    mut segments,
                    refs,
                    reply,
                } => {
                    if reply.is_closed() {
                        debug!("send abandoned before it started");
                        continue;
                    }
                    let Some(first) = segments.pop_front() else {
                        let _ = reply.send(Ok(refs));
                        continue;
                    };
                    self.slot = Some(Slot {
                        command: SlotCommand::Send {
                            segments,
                            refs,
                            reply,
                        },
                        deadline,
                    });
                    write_all(transport, &[commands::signal_quality(), commands::pdu_mode()]).await?;
                    write_all(transport, &commands::send_segment(&first)).await?;
                }
            }
        }
        Ok(())
    }

    async fn expire_slot(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if let Some(slot) = self.slot.take() {
            tracing::warn!("modem did not answer in time");
            self.session.cancel_read();
            slot.command.fail(Error::Timeout);
        }
        self.start_next(transport).await
    }

    /// Forget parked readers whose caller went away and give up on
    /// multipart groups older than `fragment_ttl`.
    fn housekeeping(&mut self, now: Instant) {
        let evicted = self
            .session
            .evict_stale_fragments(self.fragment_ttl, now.into_std());
        for reference in evicted {
            for waiter in self.parked.remove(&reference).unwrap_or_default() {
                let _ = waiter.send(Err(Error::Timeout));
            }
        }
        self.parked.retain(|_, waiters| {
            waiters.retain(|w| !w.is_closed());
            !waiters.is_empty()
        });
    }

    /// Fail every pending operation and reset protocol state.
    fn teardown(&mut self, error: impl Fn() -> Error) {
        if let Some(slot) = self.slot.take() {
            slot.command.fail(error());
        }
        for command in self.backlog.drain(..) {
            command.fail(error());
        }
        for (_, waiters) in self.parked.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(error()));
            }
        }
        let dropped = self.session.reset();
        self.framer.clear();
        debug!(dropped = dropped.len(), "session state reset");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use modemlib_pdu::GsmPduCodec;
    use modemlib_test_harness::{MockHandle, MockTransport};

    const HELLO_PDU: &str = "00040B915155214365F700005210726104104005E8329BFD06";
    const PART1_PDU: &str = "00440B915155214365F70000521072610410400D0500032A0201906536FB0D02";
    const PART2_PDU: &str = "00440B915155214365F70000521072610410400C0500032A0202EE6F399B0C";

    fn cmgr_reply(pdu: &str) -> Vec<u8> {
        format!("\r\n+CMGR: 0,,24\r\n{pdu}\r\n\r\nOK\r\n").into_bytes()
    }

    fn spawn(mock: MockTransport, command_timeout: Duration) -> (ModemIo, broadcast::Receiver<ModemEvent>) {
        spawn_with_ttl(mock, command_timeout, Duration::from_secs(3600))
    }

    fn spawn_with_ttl(
        mock: MockTransport,
        command_timeout: Duration,
        fragment_ttl: Duration,
    ) -> (ModemIo, broadcast::Receiver<ModemEvent>) {
        let (event_tx, event_rx) = broadcast::channel(256);
        let io = spawn_io_task(
            Box::new(mock),
            IoConfig {
                command_timeout,
                fragment_ttl,
            },
            Arc::new(GsmPduCodec::new()),
            event_tx,
        );
        (io, event_rx)
    }

    /// An engine with no transport attached, for driving its bookkeeping.
    fn idle_engine(fragment_ttl: Duration) -> Engine {
        let (event_tx, _) = broadcast::channel(16);
        Engine {
            session: ModemSession::new(Arc::new(GsmPduCodec::new())),
            framer: LineFramer::new(),
            event_tx,
            status: Arc::new(SharedStatus::default()),
            command_timeout: Duration::from_secs(1),
            fragment_ttl,
            slot: None,
            backlog: VecDeque::new(),
            parked: HashMap::new(),
        }
    }

    /// Wait until the mock has seen `line` written `count` times.
    async fn wait_for_sent(handle: &MockHandle, line: &str, count: usize) {
        for _ in 0..400 {
            if handle.sent_strings().iter().filter(|s| *s == line).count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{line:?} not sent {count} times; sent: {:?}", handle.sent_strings());
    }

    async fn next_event(
        rx: &mut broadcast::Receiver<ModemEvent>,
        pred: impl Fn(&ModemEvent) -> bool,
    ) -> ModemEvent {
        let fut = async {
            loop {
                match rx.recv().await {
                    Ok(ev) if pred(&ev) => return ev,
                    Ok(_) => continue,
                    Err(e) => panic!("event channel error: {e}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), fut)
            .await
            .expect("timed out waiting for event")
    }

    // =======================================================================
    // Handle tests (channel-level, no IO loop)
    // =======================================================================

    #[tokio::test]
    async fn handle_reports_not_connected_when_task_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = IoHandle { tx };
        let result = handle.write(vec!["AT\r".into()], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn handle_times_out_without_reply() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = IoHandle { tx };
        let keep = tokio::spawn(async move {
            // Hold the request without answering it.
            let req = rx.recv().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(req);
        });
        let result = handle.read_sms(1, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        keep.abort();
    }

    #[test]
    fn shared_status_round_trip() {
        let status = SharedStatus::default();
        assert_eq!(status.snapshot(), ModemStatus::default());
        status.store(ModemStatus {
            sms_ready: true,
            call_ready: false,
        });
        assert!(status.snapshot().sms_ready);
        assert!(!status.snapshot().call_ready);
    }

    // =======================================================================
    // IO task tests
    // =======================================================================

    #[tokio::test]
    async fn write_sends_each_line_in_order() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        io.handle()
            .write(vec!["AT\r".into(), "ATA\r".into()], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(handle.sent_strings(), vec!["AT\r", "ATA\r"]);
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn read_sms_resolves_from_cmgr_reply() {
        let mock = MockTransport::lenient();
        mock.handle().expect(b"AT+CMGR=1\r", &cmgr_reply(HELLO_PDU));
        let handle = mock.handle();
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        let msg = io.handle().read_sms(1, Duration::from_secs(2)).await.unwrap();
        assert_eq!(msg.sender, "+15551234567");
        assert_eq!(msg.text, "hello");
        assert_eq!(handle.sent_strings(), vec!["AT+CMGF=0\r", "AT+CMGR=1\r"]);
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn read_sms_times_out_when_modem_is_silent() {
        let mock = MockTransport::lenient();
        let (io, _rx) = spawn(mock, Duration::from_millis(100));

        let result = io.handle().read_sms(1, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn modem_error_fails_the_read() {
        let mock = MockTransport::lenient();
        mock.handle()
            .expect(b"AT+CMGR=9\r", b"\r\n+CME ERROR: invalid index\r\n");
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));

        let result = io.handle().read_sms(9, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Modem(ref s)) if s == "+CME ERROR: invalid index"));
        next_event(&mut rx, |e| {
            matches!(e, ModemEvent::Error { kind: ErrorKind::Modem, .. })
        })
        .await;
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cmti_triggers_exactly_one_read_and_publishes_sms() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        handle.expect(b"AT+CMGR=3\r", &cmgr_reply(HELLO_PDU));
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));

        handle.push_incoming(b"\r\n+CMTI: \"SM\",3\r\n");
        let ev = next_event(&mut rx, |e| matches!(e, ModemEvent::Sms(_))).await;
        assert_eq!(
            ev,
            ModemEvent::Sms(AssembledMessage {
                sender: "+15551234567".into(),
                text: "hello".into(),
            })
        );

        let reads = handle
            .sent_strings()
            .iter()
            .filter(|s| s.starts_with("AT+CMGR="))
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(reads, vec!["AT+CMGR=3\r"]);
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unsolicited_cmt_publishes_sms() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));

        handle.push_incoming(format!("\r\n+CMT: ,24\r\n{HELLO_PDU}\r\n").as_bytes());
        let ev = next_event(&mut rx, |e| matches!(e, ModemEvent::Sms(_))).await;
        assert!(matches!(ev, ModemEvent::Sms(ref m) if m.text == "hello"));
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn multipart_read_waits_for_the_missing_part() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        handle.expect(b"AT+CMGR=1\r", &cmgr_reply(PART1_PDU));
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));

        let requests = io.handle();
        let read = tokio::spawn(async move { requests.read_sms(1, Duration::from_secs(3)).await });

        wait_for_sent(&handle, "AT+CMGR=1\r", 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!read.is_finished());

        handle.push_incoming(format!("\r\n+CMT: ,23\r\n{PART2_PDU}\r\n").as_bytes());
        let msg = read.await.unwrap().unwrap();
        assert_eq!(msg.text, "Hello world");

        // The notify path publishes the completed message too.
        let ev = next_event(&mut rx, |e| matches!(e, ModemEvent::Sms(_))).await;
        assert!(matches!(ev, ModemEvent::Sms(ref m) if m.text == "Hello world"));
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn reads_are_serialized_through_the_slot() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        handle.expect(b"AT+CMGR=1\r", &cmgr_reply(HELLO_PDU));
        handle.expect(b"AT+CMGR=2\r", &cmgr_reply(HELLO_PDU));
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        let (first, second) = (io.handle(), io.handle());
        let (a, b) = tokio::join!(
            first.read_sms(1, Duration::from_secs(2)),
            second.read_sms(2, Duration::from_secs(2)),
        );
        assert_eq!(a.unwrap().text, "hello");
        assert_eq!(b.unwrap().text, "hello");
        assert_eq!(
            handle.sent_strings(),
            vec!["AT+CMGF=0\r", "AT+CMGR=1\r", "AT+CMGF=0\r", "AT+CMGR=2\r"]
        );
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn send_sms_waits_for_each_cmgs() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let segments: Vec<PduSegment> = ["AA", "BB", "CC"]
            .iter()
            .map(|h| PduSegment {
                hex: h.to_string(),
                tpdu_len: 1,
            })
            .collect();
        handle.expect(b"AA\x1A", b"\r\n+CMGS: 10\r\n\r\nOK\r\n");
        handle.expect(b"BB\x1A", b"\r\n+CMGS: 11\r\n\r\nOK\r\n");
        handle.expect(b"CC\x1A", b"\r\n+CMGS: 12\r\n\r\nOK\r\n");
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        let refs = io
            .handle()
            .send_sms(segments, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(refs, vec![10, 11, 12]);
        assert_eq!(
            handle.sent_strings(),
            vec![
                "AT+CSQ\r",
                "AT+CMGF=0\r",
                "AT+CMGS=1\r",
                "AA\x1A",
                "AT+CMGS=1\r",
                "BB\x1A",
                "AT+CMGS=1\r",
                "CC\x1A",
            ]
        );
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn send_sms_fails_on_cms_error() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        handle.expect(b"AA\x1A", b"\r\n+CMS ERROR: 304\r\n");
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        let segment = PduSegment {
            hex: "AA".into(),
            tpdu_len: 1,
        };
        let result = io
            .handle()
            .send_sms(vec![segment], Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(Error::Modem(ref s)) if s == "+CMS ERROR: 304"));
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_fails_pending_read_with_connection_closed() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, mut rx) = spawn(mock, Duration::from_secs(5));

        let requests = io.handle();
        let read = tokio::spawn(async move { requests.read_sms(5, Duration::from_secs(5)).await });
        wait_for_sent(&handle, "AT+CMGR=5\r", 1).await;

        io.shutdown().await.unwrap();
        assert!(matches!(read.await.unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(handle.close_count(), 1);
        next_event(&mut rx, |e| matches!(e, ModemEvent::Disconnected)).await;
    }

    #[tokio::test]
    async fn shutdown_fails_parked_reader() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        handle.expect(b"AT+CMGR=1\r", &cmgr_reply(PART1_PDU));
        let (io, _rx) = spawn(mock, Duration::from_secs(1));

        let requests = io.handle();
        let read = tokio::spawn(async move { requests.read_sms(1, Duration::from_secs(5)).await });
        wait_for_sent(&handle, "AT+CMGR=1\r", 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        io.shutdown().await.unwrap();
        assert!(matches!(read.await.unwrap(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn housekeeping_drops_abandoned_parked_readers() {
        let mut engine = idle_engine(Duration::from_secs(3600));
        let (gone, gone_rx) = oneshot::channel();
        drop(gone_rx);
        let (waiting, mut waiting_rx) = oneshot::channel();
        engine.parked.insert(7, vec![gone]);
        engine.parked.insert(8, vec![waiting]);

        engine.housekeeping(Instant::now());
        assert!(!engine.parked.contains_key(&7));
        assert_eq!(engine.parked.get(&8).map(Vec::len), Some(1));
        assert!(waiting_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn parked_reader_times_out_when_fragments_expire() {
        let mock = MockTransport::lenient();
        mock.handle().expect(b"AT+CMGR=1\r", &cmgr_reply(PART1_PDU));
        let (io, _rx) = spawn_with_ttl(mock, Duration::from_secs(1), Duration::from_millis(200));

        let started = Instant::now();
        let result = io.handle().read_sms(1, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(5));
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn transport_loss_fails_pending_and_disconnects() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, mut rx) = spawn(mock, Duration::from_secs(5));

        let requests = io.handle();
        let read = tokio::spawn(async move { requests.read_sms(2, Duration::from_secs(5)).await });
        wait_for_sent(&handle, "AT+CMGR=2\r", 1).await;

        handle.set_connected(false);
        assert!(matches!(read.await.unwrap(), Err(Error::ConnectionLost)));
        next_event(&mut rx, |e| {
            matches!(e, ModemEvent::Error { kind: ErrorKind::Transport, .. })
        })
        .await;
        next_event(&mut rx, |e| matches!(e, ModemEvent::Disconnected)).await;

        // The task is gone; shutdown is a no-op and new requests fail.
        let requests = io.handle();
        io.shutdown().await.unwrap();
        let result = requests.write(vec!["AT\r".into()], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn readiness_flags_reach_shared_status() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));
        let status = io.status();

        handle.push_incoming(b"\r\nCall Ready\r\n\r\nSMS Ready\r\n");
        next_event(&mut rx, |e| matches!(e, ModemEvent::SmsReady)).await;
        assert_eq!(
            status.snapshot(),
            ModemStatus {
                sms_ready: true,
                call_ready: true,
            }
        );
        io.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_task() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (io, mut rx) = spawn(mock, Duration::from_secs(1));

        io.cancel.cancel();
        next_event(&mut rx, |e| matches!(e, ModemEvent::Disconnected)).await;
        let _ = io.task.await;
        assert_eq!(handle.close_count(), 1);
    }
}
