//! Line channel to the door microcontroller
//!
//! `SerialLink` moves bytes on background tasks and hands complete lines over
//! bounded queues, so `send_line` and `try_receive` never wait on the port.

use crate::command::Outbound;
use crate::defaults::QUEUE_DEPTH;
use crate::error::LinkError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Duplex, line-oriented, non-blocking channel
pub trait LinkChannel: Send {
    /// Write one line; the newline terminator is appended by the link.
    /// Best effort: an unavailable link logs and drops the line.
    fn send_line(&mut self, line: &str);

    /// Return at most one buffered, trimmed line without waiting
    fn try_receive(&mut self) -> Option<String>;

    /// Whether a live device is behind this channel
    fn is_attached(&self) -> bool;

    /// Release the link. Safe to call more than once.
    fn close(&mut self);

    /// Send a protocol verdict
    fn send(&mut self, command: Outbound) {
        self.send_line(command.as_str());
    }
}

/// Link over a serial port (or any byte stream)
pub struct SerialLink {
    /// Device path, used for log context
    device: String,
    /// Lines queued for the writer task
    outbound: Option<mpsc::Sender<String>>,
    /// Lines produced by the reader task
    inbound: mpsc::Receiver<String>,
    /// Cleared by either task when the port fails
    available: Arc<AtomicBool>,
    /// Whether the loss of the port has been reported
    loss_reported: bool,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SerialLink {
    /// Open a serial port and wait for the device to settle
    ///
    /// # Arguments
    /// * `device` - Serial port device path (e.g. "/dev/ttyACM0" or "COM3")
    /// * `baud_rate` - Must match the firmware
    /// * `settle` - Delay after opening; most boards reset when the port opens
    pub async fn open(device: &str, baud_rate: u32, settle: Duration) -> Result<Self, LinkError> {
        info!("Opening gate link on {} @ {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate).open_native_async()?;

        if !settle.is_zero() {
            debug!("Waiting {:?} for device reset", settle);
            tokio::time::sleep(settle).await;
        }

        info!("Connected to {}", device);
        Ok(Self::from_stream(device, port))
    }

    /// Build a link over an already open duplex byte stream
    pub fn from_stream<S>(device: &str, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::from_halves(device, read_half, write_half)
    }

    /// Build a link over separate read and write streams (e.g. stdin/stdout)
    pub fn from_halves<R, W>(device: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let available = Arc::new(AtomicBool::new(true));
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);

        let reader = tokio::spawn(read_lines(
            device.to_string(),
            reader,
            in_tx,
            available.clone(),
        ));
        Self::with_reader(device, reader, in_rx, writer, available)
    }

    /// Build a link whose inbound side is fed one line at a time, e.g. by a
    /// thread blocked on the process's stdin
    ///
    /// Closing the link only drops `lines`; whoever feeds it is never waited on.
    pub fn from_lines<W>(device: &str, lines: mpsc::Receiver<String>, writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let available = Arc::new(AtomicBool::new(true));
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);

        let reader = tokio::spawn(forward_lines(
            device.to_string(),
            lines,
            in_tx,
            available.clone(),
        ));
        Self::with_reader(device, reader, in_rx, writer, available)
    }

    fn with_reader<W>(
        device: &str,
        reader: JoinHandle<()>,
        inbound: mpsc::Receiver<String>,
        writer: W,
        available: Arc<AtomicBool>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        let writer = tokio::spawn(write_lines(
            device.to_string(),
            writer,
            out_rx,
            available.clone(),
        ));

        Self {
            device: device.to_string(),
            outbound: Some(out_tx),
            inbound,
            available,
            loss_reported: false,
            reader,
            writer,
        }
    }

    /// Device path this link was opened on
    pub fn device(&self) -> &str {
        &self.device
    }

    fn report_loss(&mut self) {
        if !self.loss_reported {
            let err = LinkError::Unavailable(self.device.clone());
            error!("{}; continuing without device", err);
            self.loss_reported = true;
        }
    }
}

impl LinkChannel for SerialLink {
    fn send_line(&mut self, line: &str) {
        if !self.available.load(Ordering::Acquire) {
            self.report_loss();
            warn!("Link down, dropped outbound {}", line);
            return;
        }

        let Some(outbound) = &self.outbound else {
            warn!("Link closed, dropped outbound {}", line);
            return;
        };

        match outbound.try_send(line.to_string()) {
            Ok(()) => info!("[SEND] {}", line),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropped {}", line);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.available.store(false, Ordering::Release);
                self.report_loss();
                warn!("Link down, dropped outbound {}", line);
            }
        }
    }

    fn try_receive(&mut self) -> Option<String> {
        match self.inbound.try_recv() {
            Ok(line) => Some(line),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                if self.outbound.is_some() {
                    self.report_loss();
                }
                None
            }
        }
    }

    fn is_attached(&self) -> bool {
        self.outbound.is_some() && self.available.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if self.outbound.take().is_some() {
            info!("Closing gate link on {}", self.device);
            // The writer drains what is queued and exits once the sender is gone.
            self.reader.abort();
            self.available.store(false, Ordering::Release);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
        if !self.writer.is_finished() {
            debug!("Writer for {} still flushing at drop", self.device);
        }
    }
}

async fn read_lines<R>(
    device: String,
    reader: R,
    lines: mpsc::Sender<String>,
    available: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                warn!("{} closed by peer", device);
                break;
            }
            Ok(_) => {
                let line = decode_line(&buf);
                if line.is_empty() {
                    continue;
                }
                debug!("[DEVICE] {}", line);
                if lines.send(line).await.is_err() {
                    // Receiver dropped; the link is being torn down.
                    return;
                }
            }
            Err(e) => {
                error!("Read from {} failed: {}", device, e);
                break;
            }
        }
    }

    available.store(false, Ordering::Release);
}

async fn forward_lines(
    device: String,
    mut source: mpsc::Receiver<String>,
    lines: mpsc::Sender<String>,
    available: Arc<AtomicBool>,
) {
    while let Some(raw) = source.recv().await {
        let line = decode_line(raw.as_bytes());
        if line.is_empty() {
            continue;
        }
        debug!("[DEVICE] {}", line);
        if lines.send(line).await.is_err() {
            return;
        }
    }

    warn!("{} closed by peer", device);
    available.store(false, Ordering::Release);
}

async fn write_lines<W>(
    device: String,
    mut writer: W,
    mut lines: mpsc::Receiver<String>,
    available: Arc<AtomicBool>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        let result = match writer.write_all(&bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!("Write to {} failed: {}", device, e);
            available.store(false, Ordering::Release);
            return;
        }
    }
}

/// Lossy ASCII decode: undecodable bytes are dropped, whitespace trimmed
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Stand-in used when no device is connected
///
/// Outbound lines are logged and dropped, nothing is ever received.
#[derive(Debug, Default)]
pub struct DetachedLink {
    dropped: usize,
}

impl DetachedLink {
    /// Create a detached link
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outbound lines dropped so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl LinkChannel for DetachedLink {
    fn send_line(&mut self, line: &str) {
        self.dropped += 1;
        warn!("No device link, dropped outbound {}", line);
    }

    fn try_receive(&mut self) -> Option<String> {
        None
    }

    fn is_attached(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Open the serial link, or fall back to a detached link if that fails
pub async fn connect_or_detach(
    device: &str,
    baud_rate: u32,
    settle: Duration,
) -> Box<dyn LinkChannel> {
    match SerialLink::open(device, baud_rate, settle).await {
        Ok(link) => Box::new(link),
        Err(e) => {
            error!("Unable to connect to serial port {}: {}", device, e);
            Box::new(DetachedLink::new())
        }
    }
}
