//! Mock CAN transport for tests
//!
//! Captures every frame sent through it and lets tests script responses
//! (optionally delayed, simulating bus latency) or inject frames as if
//! the ECU had sent them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::{Broadcaster, Subscription};
use crate::transport::CanTransport;
use crate::{CanFrame, LinkError};

type Responder = Arc<dyn Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync>;

/// In-memory [`CanTransport`] with scripted responses.
pub struct MockCan {
    sent: Mutex<Vec<CanFrame>>,
    responders: Mutex<Vec<Responder>>,
    broadcaster: Broadcaster<CanFrame>,
    response_delay: Duration,
    fail_sends: Mutex<bool>,
}

impl MockCan {
    pub fn new() -> Self {
        Self::with_response_delay(Duration::ZERO)
    }

    /// Responses are broadcast from a background task after `delay`,
    /// like a real ECU that needs a moment to answer.
    pub fn with_response_delay(delay: Duration) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            responders: Mutex::new(Vec::new()),
            broadcaster: Broadcaster::new("mock-can"),
            response_delay: delay,
            fail_sends: Mutex::new(false),
        }
    }

    /// Script a response: the closure sees every sent frame and returns
    /// the frames the "ECU" answers with.
    pub fn add_responder(
        &self,
        responder: impl Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync + 'static,
    ) {
        self.responders.lock().push(Arc::new(responder));
    }

    /// Broadcast a frame as if it had arrived from the bus.
    pub fn inject(&self, frame: CanFrame) {
        self.broadcaster.broadcast(frame);
    }

    /// Every frame sent through the transport, in order.
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Make subsequent sends fail with [`LinkError::NoAck`].
    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }
}

impl Default for MockCan {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanTransport for MockCan {
    async fn send_frame(
        &self,
        cancel: &CancellationToken,
        frame: &CanFrame,
    ) -> Result<(), LinkError> {
        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        if *self.fail_sends.lock() {
            return Err(LinkError::NoAck);
        }

        self.sent.lock().push(*frame);

        let replies: Vec<CanFrame> = {
            let responders = self.responders.lock();
            responders.iter().flat_map(|r| r(frame)).collect()
        };
        if replies.is_empty() {
            return Ok(());
        }

        if self.response_delay.is_zero() {
            for reply in replies {
                self.broadcaster.broadcast(reply);
            }
        } else {
            let broadcaster = self.broadcaster.clone();
            let delay = self.response_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for reply in replies {
                    broadcaster.broadcast(reply);
                }
            });
        }
        Ok(())
    }

    fn subscribe_frames(&self) -> Subscription<CanFrame> {
        self.broadcaster.subscribe()
    }
}
