// src/io/capture.rs
//
// Capture loop and session control.
//
// The loop runs on a blocking worker thread and owns the port for its whole
// life. Each iteration is scan -> read -> hand off. Finished frames are moved
// to the consumer over an mpsc channel; nothing is shared with the caller
// except the stop flag.
//
// State machine:
//   Disconnected -> Scanning        port opened
//   Scanning     -> Reading         marker matched
//   Reading      -> Complete        grid full
//   Complete     -> Scanning        next frame
//   Scanning/Reading -> Error       timeout, underrun, IO failure
//   Error        -> Scanning        transient, port still alive
//   Error        -> Disconnected    port lost or stop requested (terminal)

use std::io::Read;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::serial::{self, ByteStream, FrameReader, MarkerScanner};
use super::{now_us, CaptureError, CaptureEvent, CaptureState, CapturedFrame, EndReason};
use crate::frame::PixelGrid;
use crate::settings::Settings;

/// Events buffered between the capture thread and the consumer
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Wait between send attempts while the consumer's channel is full
const FULL_CHANNEL_BACKOFF: Duration = Duration::from_millis(10);

// ============================================================================
// Pipeline
// ============================================================================

/// Marker scanner and frame reader for one device
pub struct CapturePipeline {
    device: String,
    scanner: MarkerScanner,
    reader: FrameReader,
}

impl CapturePipeline {
    pub fn new(device: impl Into<String>, scanner: MarkerScanner, reader: FrameReader) -> Self {
        Self {
            device: device.into(),
            scanner,
            reader,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CaptureError> {
        settings.validate()?;
        let scanner = MarkerScanner::new(settings.frame.marker_bytes()?)?;
        let reader = FrameReader::new(
            settings.frame.width,
            settings.frame.height,
            settings.frame.scan_order,
        )?;
        Ok(Self::new(settings.serial.device_label(), scanner, reader))
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Sync on the marker, then read one frame
    pub fn capture_frame<R: Read>(&mut self, stream: &mut ByteStream<R>) -> Result<PixelGrid, CaptureError> {
        self.scanner.scan(stream, &self.device)?;
        self.reader.read_frame(stream, &self.device)
    }
}

// ============================================================================
// Capture Loop
// ============================================================================

struct LoopContext<'a> {
    device: &'a str,
    events: &'a mpsc::Sender<CaptureEvent>,
    cancel_flag: &'a AtomicBool,
    state: CaptureState,
}

impl LoopContext<'_> {
    /// Deliver an event, waiting while the channel is full.
    /// False means the consumer is gone or a stop was requested while waiting;
    /// `abandon` tells the two apart.
    fn send(&self, mut event: CaptureEvent) -> bool {
        loop {
            match self.events.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => return false,
                Err(TrySendError::Full(returned)) => {
                    if self.cancel_flag.load(Ordering::Relaxed) {
                        return false;
                    }
                    event = returned;
                    std::thread::sleep(FULL_CHANNEL_BACKOFF);
                }
            }
        }
    }

    /// Exit without further events after a failed send
    fn abandon(&mut self) -> EndReason {
        self.state = CaptureState::Disconnected;
        if self.cancel_flag.load(Ordering::Relaxed) {
            tlog!("[capture:{}] Stop requested while consumer was stalled", self.device);
            EndReason::Stopped
        } else {
            EndReason::ConsumerGone
        }
    }

    fn transition(&mut self, next: CaptureState) -> bool {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        let previous = self.state;
        self.state = next;
        self.send(CaptureEvent::StateChanged {
            previous,
            current: next,
        })
    }

    fn finish(&mut self, reason: EndReason) -> EndReason {
        // Best effort: the loop exits whether or not the consumer hears about it
        if self.state != CaptureState::Disconnected {
            let _ = self.transition(CaptureState::Disconnected);
        }
        let _ = self.send(CaptureEvent::Ended(reason.clone()));
        reason
    }

    /// Enter Error and decide where to go next.
    /// None means the loop is back in Scanning; Some ends the loop.
    fn fault(&mut self, err: CaptureError, port_closed: bool) -> Option<EndReason> {
        if !self.transition(CaptureState::Error) {
            return Some(self.abandon());
        }

        if matches!(err, CaptureError::Cancelled { .. }) {
            tlog!("[capture:{}] Stop requested mid-read, partial frame dropped", self.device);
            return Some(self.finish(EndReason::Stopped));
        }

        if err.is_recoverable() && !port_closed {
            tlog!("[capture:{}] {}; rescanning", self.device, err);
            if !self.send(CaptureEvent::Fault(err)) || !self.transition(CaptureState::Scanning) {
                return Some(self.abandon());
            }
            return None;
        }

        let fatal = match err {
            CaptureError::Underrun {
                expected, received, ..
            } => CaptureError::connection(
                self.device,
                format!("stream closed after {} of {} samples", received, expected),
            ),
            other => other,
        };
        let message = fatal.to_string();
        tlog!("[capture:{}] Connection lost: {}", self.device, message);
        let _ = self.send(CaptureEvent::Fault(fatal));
        Some(self.finish(EndReason::Disconnected(message)))
    }
}

/// Run scan/read cycles until stopped or disconnected.
/// The stream is borrowed; the caller drops the port when this returns.
pub fn run_capture_loop<R: Read>(
    pipeline: &mut CapturePipeline,
    stream: &mut ByteStream<R>,
    cancel_flag: &AtomicBool,
    events: &mpsc::Sender<CaptureEvent>,
) -> EndReason {
    let device = pipeline.device.clone();
    let mut ctx = LoopContext {
        device: &device,
        events,
        cancel_flag,
        state: CaptureState::Disconnected,
    };
    let mut sequence: u64 = 0;

    // The port is already open
    if !ctx.transition(CaptureState::Scanning) {
        return ctx.abandon();
    }

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            tlog!("[capture:{}] Stop requested", ctx.device);
            return ctx.finish(EndReason::Stopped);
        }

        if let Err(e) = pipeline.scanner.scan(stream, ctx.device) {
            match ctx.fault(e, stream.is_closed()) {
                Some(reason) => return reason,
                None => continue,
            }
        }
        if !ctx.transition(CaptureState::Reading) {
            return ctx.abandon();
        }

        let grid = match pipeline.reader.read_frame(stream, ctx.device) {
            Ok(grid) => grid,
            Err(e) => match ctx.fault(e, stream.is_closed()) {
                Some(reason) => return reason,
                None => continue,
            },
        };

        sequence += 1;
        let frame = CapturedFrame {
            sequence,
            timestamp_us: now_us(),
            grid,
        };
        if !ctx.transition(CaptureState::Complete)
            || !ctx.send(CaptureEvent::Frame(frame))
            || !ctx.transition(CaptureState::Scanning)
        {
            return ctx.abandon();
        }
    }
}

/// Capture a single frame, retrying after timeouts and underruns.
pub fn grab_frame_from<R: Read>(
    pipeline: &mut CapturePipeline,
    stream: &mut ByteStream<R>,
    attempts: u32,
) -> Result<PixelGrid, CaptureError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match pipeline.capture_frame(stream) {
            Ok(grid) => return Ok(grid),
            Err(e) if e.is_recoverable() && !stream.is_closed() && attempt < attempts => {
                tlog!(
                    "[capture:{}] Attempt {}/{} failed: {}",
                    pipeline.device, attempt, attempts, e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Open the configured port and capture a single frame (blocking).
pub fn grab_frame(settings: &Settings, attempts: u32) -> Result<PixelGrid, CaptureError> {
    let mut pipeline = CapturePipeline::from_settings(settings)?;
    let port = serial::open_port(&settings.serial)?;
    tlog!(
        "[capture:{}] Opened at {} baud ({}), waiting for marker",
        pipeline.device(),
        settings.serial.baud_rate,
        serial::line_settings_label(&settings.serial)
    );
    let mut stream = ByteStream::new(
        port,
        settings.serial.read_timeout(),
        Arc::new(AtomicBool::new(false)),
    );
    grab_frame_from(&mut pipeline, &mut stream, attempts)
}

// ============================================================================
// Session
// ============================================================================

/// Owns one logical capture session: at most one running loop, one port.
pub struct CaptureSession {
    settings: Settings,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<EndReason>>,
    stopped: bool,
}

impl CaptureSession {
    pub fn new(settings: Settings) -> Result<Self, CaptureError> {
        settings.validate()?;
        Ok(Self {
            settings,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
            stopped: false,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether a capture loop is currently running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Flag that stops the loop when set. Usable from signal handlers.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Open the configured serial port and start capturing
    pub async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        self.check_startable()?;
        let port = serial::open_port(&self.settings.serial)?;
        tlog!(
            "[capture:{}] Opened at {} baud ({})",
            self.settings.serial.device_label(),
            self.settings.serial.baud_rate,
            serial::line_settings_label(&self.settings.serial)
        );
        self.start_with_source(port).await
    }

    /// Start capturing from an already-open byte source.
    /// The source is moved into the worker and dropped when the loop exits.
    pub async fn start_with_source<R>(&mut self, source: R) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>
    where
        R: Read + Send + 'static,
    {
        self.check_startable()?;
        let mut pipeline = CapturePipeline::from_settings(&self.settings)?;

        if let Some(previous) = self.task_handle.take() {
            // Finished after a disconnect; collect it before restarting
            let _ = previous.await;
        }

        self.cancel_flag.store(false, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel_flag = self.cancel_flag.clone();
        let read_timeout = self.settings.serial.read_timeout();

        let handle = tokio::task::spawn_blocking(move || {
            let mut stream = ByteStream::new(source, read_timeout, cancel_flag.clone());
            let reason = run_capture_loop(&mut pipeline, &mut stream, &cancel_flag, &tx);
            tlog!(
                "[capture:{}] Loop ended ({:?}) after {} bytes",
                pipeline.device(),
                reason,
                stream.consumed()
            );
            reason
        });
        self.task_handle = Some(handle);

        Ok(rx)
    }

    /// Stop capturing. Terminal: the session cannot be started again.
    pub async fn stop(&mut self) -> Result<Option<EndReason>, CaptureError> {
        self.stopped = true;
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.join().await
    }

    /// Wait for the running loop to exit on its own
    pub async fn join(&mut self) -> Result<Option<EndReason>, CaptureError> {
        match self.task_handle.take() {
            Some(handle) => handle.await.map(Some).map_err(|e| {
                CaptureError::connection(
                    &self.settings.serial.device_label(),
                    format!("capture task failed: {}", e),
                )
            }),
            None => Ok(None),
        }
    }

    fn check_startable(&self) -> Result<(), CaptureError> {
        if self.stopped {
            return Err(CaptureError::configuration("session has been stopped"));
        }
        if self.is_running() {
            return Err(CaptureError::configuration("capture is already running"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
