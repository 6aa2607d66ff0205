//! Serial link driver: read/write loops, ACK handshake and retry

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serialport::SerialPort;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::broadcaster::{Broadcaster, Subscription};
use crate::codec::{encode_frame, DeframeEvent, Deframer, ACK, NACK};
use crate::transport::CanTransport;
use crate::{port, CanFrame, LinkConfig, LinkError};

/// How long to wait for the bridge to acknowledge a frame.
const ACK_TIMEOUT: Duration = Duration::from_millis(100);
/// Retries after the initial send before giving up.
const MAX_SEND_RETRIES: u32 = 3;
/// First backoff delay; doubles on every retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

const ACK_CHANNEL_CAPACITY: usize = 128;
const WRITE_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckByte {
    Ack,
    Nack,
}

/// Owns the serial port exclusively: the read loop is the only reader and
/// the write loop the only writer. Outbound frames and the ACK/NACK
/// answers to inbound frames share one FIFO write queue.
pub struct SerialLink {
    writer_tx: mpsc::Sender<Vec<u8>>,
    // Locked across the whole enqueue-and-wait exchange: the bridge
    // acknowledges frames, not ids, so ACK waits must not interleave.
    ack_rx: Mutex<mpsc::Receiver<AckByte>>,
    broadcaster: Broadcaster<CanFrame>,
    cancel: CancellationToken,
    running: AtomicBool,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl SerialLink {
    /// Discover the bridge adapter, open it and start the I/O loops.
    pub async fn open(
        config: &LinkConfig,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>, LinkError> {
        let serial = port::open_adapter(config).await?;
        Self::with_port(serial, parent)
    }

    /// Build a link over an already-open port.
    ///
    /// Tests use this with an in-memory port implementing
    /// [`serialport::SerialPort`].
    pub fn with_port(
        mut serial: Box<dyn SerialPort>,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>, LinkError> {
        serial
            .set_timeout(port::READ_TIMEOUT)
            .map_err(|e| LinkError::Io(e.to_string()))?;
        let write_port = serial
            .try_clone()
            .map_err(|e| LinkError::Io(e.to_string()))?;

        let cancel = parent.child_token();
        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (ack_tx, ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
        let broadcaster = Broadcaster::new("can-frame");

        let read_handle = {
            let cancel = cancel.clone();
            let writer_tx = writer_tx.clone();
            let broadcaster = broadcaster.clone();
            tokio::task::spawn_blocking(move || {
                read_loop(serial, cancel, ack_tx, writer_tx, broadcaster)
            })
        };
        let write_handle = tokio::spawn(write_loop(write_port, writer_rx, cancel.clone()));

        Ok(Arc::new(Self {
            writer_tx,
            ack_rx: Mutex::new(ack_rx),
            broadcaster,
            cancel,
            running: AtomicBool::new(true),
            tasks: SyncMutex::new(vec![read_handle, write_handle]),
        }))
    }

    /// Encode and send a frame, waiting for the bridge's acknowledgement.
    ///
    /// On NACK or ACK timeout the frame is re-sent up to three times with
    /// exponential backoff (200 ms, 400 ms, 800 ms).
    pub async fn send_frame(
        &self,
        cancel: &CancellationToken,
        frame: &CanFrame,
    ) -> Result<(), LinkError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        let encoded = encode_frame(frame);

        let mut ack_rx = tokio::select! {
            _ = cancel.cancelled() => return Err(LinkError::Cancelled),
            _ = self.cancel.cancelled() => return Err(LinkError::Cancelled),
            guard = self.ack_rx.lock() => guard,
        };

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 0..=MAX_SEND_RETRIES {
            if attempt > 0 {
                debug!(attempt, delay_ms = backoff.as_millis() as u64, "retrying frame send");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                    _ = self.cancel.cancelled() => return Err(LinkError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
            }

            // a response that arrived after an earlier attempt's timeout
            // must not be mistaken for this attempt's acknowledgement
            while ack_rx.try_recv().is_ok() {}

            self.writer_tx
                .send(encoded.clone())
                .await
                .map_err(|_| LinkError::Closed)?;

            tokio::select! {
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                _ = self.cancel.cancelled() => return Err(LinkError::Cancelled),
                ack = tokio::time::timeout(ACK_TIMEOUT, ack_rx.recv()) => match ack {
                    Ok(Some(AckByte::Ack)) => return Ok(()),
                    Ok(Some(AckByte::Nack)) => {
                        warn!(%frame, "bridge rejected frame");
                    }
                    Ok(None) => return Err(LinkError::Closed),
                    Err(_) => {
                        debug!(%frame, "acknowledgement timed out");
                    }
                },
            }
        }
        Err(LinkError::NoAck)
    }

    /// Subscribe to every CAN frame received from the bus.
    pub fn subscribe_frames(&self) -> Subscription<CanFrame> {
        self.broadcaster.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Stop the I/O loops and close every subscriber queue. Idempotent.
    pub async fn shutdown(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.cancel.cancel();
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.broadcaster.cleanup();
        debug!("serial link shut down");
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        // loops notice the token at their next suspension point
        self.cancel.cancel();
    }
}

#[async_trait]
impl CanTransport for SerialLink {
    async fn send_frame(
        &self,
        cancel: &CancellationToken,
        frame: &CanFrame,
    ) -> Result<(), LinkError> {
        SerialLink::send_frame(self, cancel, frame).await
    }

    fn subscribe_frames(&self) -> Subscription<CanFrame> {
        SerialLink::subscribe_frames(self)
    }
}

/// Blocking single-byte reader feeding the deframer state machine.
///
/// Lone ACK/NACK bytes go to the ack channel; validated frames are
/// acknowledged on the write queue and broadcast; corrupt frames are
/// answered with a NACK and dropped.
fn read_loop(
    mut serial: Box<dyn SerialPort>,
    cancel: CancellationToken,
    ack_tx: mpsc::Sender<AckByte>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    broadcaster: Broadcaster<CanFrame>,
) {
    let mut deframer = Deframer::new();
    let mut byte = [0u8; 1];

    while !cancel.is_cancelled() {
        match serial.read(&mut byte) {
            Ok(0) => {
                error!("serial port reached end of stream");
                cancel.cancel();
                break;
            }
            Ok(_) => {
                let Some(event) = deframer.push(byte[0]) else {
                    continue;
                };
                match event {
                    DeframeEvent::Ack => dispatch_ack(&ack_tx, AckByte::Ack),
                    DeframeEvent::Nack => dispatch_ack(&ack_tx, AckByte::Nack),
                    DeframeEvent::Frame(frame) => {
                        debug!(%frame, "frame received");
                        if writer_tx.blocking_send(vec![ACK]).is_err() {
                            break;
                        }
                        broadcaster.broadcast(frame);
                    }
                    DeframeEvent::Reject(err) => {
                        warn!(error = %err, "rejecting corrupt frame");
                        if writer_tx.blocking_send(vec![NACK]).is_err() {
                            break;
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !cancel.is_cancelled() {
                    error!(error = %e, "serial read failed, shutting the link down");
                    cancel.cancel();
                }
                break;
            }
        }
    }
    debug!("read loop stopped");
}

fn dispatch_ack(ack_tx: &mpsc::Sender<AckByte>, ack: AckByte) {
    if let Err(mpsc::error::TrySendError::Full(_)) = ack_tx.try_send(ack) {
        warn!("ack channel is full, dropping acknowledgement");
    }
}

/// Drains the write queue in order; a write failure kills the link.
async fn write_loop(
    serial: Box<dyn SerialPort>,
    mut writer_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    let serial = Arc::new(SyncMutex::new(serial));
    loop {
        let buf = tokio::select! {
            _ = cancel.cancelled() => break,
            buf = writer_rx.recv() => match buf {
                Some(buf) => buf,
                None => break,
            },
        };

        let serial = serial.clone();
        let written = tokio::task::spawn_blocking(move || {
            let mut guard = serial.lock();
            guard.write_all(&buf).and_then(|_| guard.flush())
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "serial write failed, shutting the link down");
                cancel.cancel();
                break;
            }
            Err(e) => {
                error!(error = %e, "write task failed");
                cancel.cancel();
                break;
            }
        }
    }
    debug!("write loop stopped");
}
