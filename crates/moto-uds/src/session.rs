//! UDS session: keep-alive, response broadcast and correlated reads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moto_link::broadcaster::{Broadcaster, Subscription};
use moto_link::CanTransport;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{TpError, UdsError};
use crate::isotp;
use crate::message::{Body, Message};
use crate::service::service_id;

/// Pause between TesterPresent keep-alives.
pub const TESTER_PRESENT_INTERVAL: Duration = Duration::from_secs(2);
/// How long a correlated read waits for its response.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// An established diagnostic session with one ECU.
///
/// [`start`](Self::start) spawns two loops under a child cancellation
/// scope: a TesterPresent keep-alive and a reader that decodes every
/// inbound ISO-TP message as a response and fans it out to subscribers.
pub struct UdsSession {
    transport: Arc<dyn CanTransport>,
    tester_id: u16,
    broadcaster: Broadcaster<Message>,
    cancel: CancellationToken,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UdsSession {
    pub fn new(
        transport: Arc<dyn CanTransport>,
        tester_id: u16,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            transport,
            tester_id,
            broadcaster: Broadcaster::new("uds-message"),
            cancel: parent.child_token(),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the keep-alive and read/broadcast loops. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(tester_present_loop(
            self.transport.clone(),
            self.tester_id,
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(read_loop(
            self.transport.clone(),
            self.broadcaster.clone(),
            self.cancel.clone(),
        )));
        debug!("uds session started");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Send a UDS message through the ISO-TP engine.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), UdsError> {
        if !self.is_running() {
            return Err(UdsError::NotRunning);
        }
        if message.service_id != service_id::TESTER_PRESENT {
            debug!(%message, "uds send");
        }
        isotp::send(
            cancel,
            self.transport.as_ref(),
            message.sender_id,
            &message.to_raw(),
        )
        .await?;
        Ok(())
    }

    /// Subscribe to every response the ECU sends.
    pub fn subscribe(&self) -> Subscription<Message> {
        self.broadcaster.subscribe()
    }

    /// Wait up to five seconds for a response matching the filters.
    ///
    /// A matching negative response is returned immediately (it carries
    /// no subfunction); a positive one must additionally satisfy the
    /// subfunction filter. The subscription taken here is released on
    /// every exit path.
    pub async fn read_matching(
        &self,
        cancel: &CancellationToken,
        service: Option<u8>,
        subfunction: Option<u8>,
    ) -> Result<Message, UdsError> {
        if !self.is_running() {
            return Err(UdsError::NotRunning);
        }
        let mut messages = self.subscribe();
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return Err(UdsError::Cancelled),
                _ = self.cancel.cancelled() => return Err(UdsError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(?service, ?subfunction, "timeout waiting for response");
                    return Err(UdsError::ReadTimeout);
                }
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => return Err(UdsError::NotRunning),
                },
            };

            if let Some(wanted) = service {
                if message.service_id != wanted {
                    continue;
                }
            }
            match &message.body {
                // negative responses carry no subfunction
                Body::Negative { .. } => return Ok(message),
                Body::Positive {
                    subfunction: sub, ..
                } => {
                    if let Some(wanted) = subfunction {
                        if *sub != Some(wanted) {
                            continue;
                        }
                    }
                    return Ok(message);
                }
                Body::Request { .. } => continue,
            }
        }
    }

    /// Stop both loops and close every subscriber queue. Idempotent.
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
        debug!("uds session stopped");
    }
}

impl Drop for UdsSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The TesterPresent request that keeps the ECU's session alive.
pub fn tester_present_message(tester_id: u16) -> Message {
    Message::request_with_subfunction(tester_id, service_id::TESTER_PRESENT, 0x00)
}

async fn tester_present_loop(
    transport: Arc<dyn CanTransport>,
    tester_id: u16,
    cancel: CancellationToken,
) {
    let raw = tester_present_message(tester_id).to_raw();
    loop {
        match isotp::send(&cancel, transport.as_ref(), tester_id, &raw).await {
            Ok(()) => {}
            Err(TpError::Cancelled) => return,
            Err(e) => warn!(error = %e, "couldn't send tester present"),
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(TESTER_PRESENT_INTERVAL) => {}
        }
    }
}

async fn read_loop(
    transport: Arc<dyn CanTransport>,
    broadcaster: Broadcaster<Message>,
    cancel: CancellationToken,
) {
    // one subscription for the whole session, so back-to-back responses
    // are never dropped between reads
    let mut frames = transport.subscribe_frames();
    loop {
        match isotp::read_from(&cancel, transport.as_ref(), &mut frames).await {
            Ok((sender_id, raw)) => {
                let Some(message) = Message::from_raw(sender_id, &raw, true) else {
                    continue;
                };
                if message.service_id != service_id::TESTER_PRESENT {
                    debug!(%message, "uds read");
                }
                broadcaster.broadcast(message);
            }
            Err(TpError::Cancelled) => {
                debug!("stopping uds read loop");
                return;
            }
            Err(TpError::Link(moto_link::LinkError::Closed)) => {
                debug!("transport closed, stopping uds read loop");
                return;
            }
            Err(e) => error!(error = %e, "uds read failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use moto_link::mock::MockCan;
    use moto_link::CanFrame;

    use super::*;
    use crate::message::ECU_ID;
    use crate::nrc::NegativeResponseCode;

    fn positive_response(service: u8, sub: u8, payload: &[u8]) -> CanFrame {
        let mut raw = vec![service + 0x40, sub];
        raw.extend_from_slice(payload);
        let mut data = vec![raw.len() as u8];
        data.extend_from_slice(&raw);
        CanFrame::new(ECU_ID, &data).unwrap()
    }

    async fn started_session(mock: &Arc<MockCan>) -> (UdsSession, CancellationToken) {
        let root = CancellationToken::new();
        let session = UdsSession::new(mock.clone(), crate::TESTER_ID, &root);
        session.start();
        // give the read loop a chance to subscribe
        tokio::time::sleep(Duration::from_millis(10)).await;
        (session, root)
    }

    #[tokio::test]
    async fn tester_present_goes_out_periodically() {
        let mock = Arc::new(MockCan::new());
        let (session, _root) = started_session(&mock).await;

        let sent = mock.sent_frames();
        assert!(!sent.is_empty());
        assert_eq!(sent[0].data(), &[0x02, 0x3E, 0x00]);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn read_matching_filters_by_service_and_subfunction() {
        let mock = Arc::new(MockCan::new());
        let (session, root) = started_session(&mock).await;
        let mut observer = session.subscribe();

        mock.inject(positive_response(0x1A, 0x05, b"KM2"));
        mock.inject(positive_response(0x1A, 0x02, &[]));
        mock.inject(positive_response(0x1A, 0x08, &[]));

        let message = session
            .read_matching(&root, Some(0x1A), Some(0x02))
            .await
            .unwrap();
        assert_eq!(message.service_id, 0x1A);
        assert_eq!(message.subfunction(), Some(0x02));

        // the read stopped at the second message; all three still reach
        // other subscribers in order
        for expected in [0x05, 0x02, 0x08] {
            let next = observer.recv().await.unwrap();
            assert_eq!(next.subfunction(), Some(expected));
        }

        session.shutdown().await;
    }

    #[tokio::test]
    async fn negative_response_matches_without_subfunction() {
        let mock = Arc::new(MockCan::new());
        let (session, root) = started_session(&mock).await;

        mock.inject(CanFrame::new(ECU_ID, &[0x03, 0x7F, 0x1A, 0x12]).unwrap());

        let message = session
            .read_matching(&root, Some(0x1A), Some(0x02))
            .await
            .unwrap();
        assert_eq!(message.is_positive(), Some(false));
        assert_eq!(
            message.nrc(),
            Some(NegativeResponseCode::SubfunctionNotSupported)
        );

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn read_matching_times_out() {
        let mock = Arc::new(MockCan::new());
        let root = CancellationToken::new();
        let session = UdsSession::new(mock.clone(), crate::TESTER_ID, &root);
        session.start();

        let err = session
            .read_matching(&root, Some(0x1A), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UdsError::ReadTimeout));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_loops_and_is_idempotent() {
        let mock = Arc::new(MockCan::new());
        let (session, root) = started_session(&mock).await;

        session.shutdown().await;
        session.shutdown().await;
        assert!(!session.is_running());

        let message = Message::request(crate::TESTER_ID, 0x1A);
        assert!(matches!(
            session.send(&root, &message).await.unwrap_err(),
            UdsError::NotRunning
        ));
    }

    #[tokio::test]
    async fn multi_frame_response_is_reassembled_and_broadcast() {
        let mock = Arc::new(MockCan::new());
        let (session, root) = started_session(&mock).await;

        // 0x5A 0x02 + "613.41.031.300" = 16 raw bytes, three frames
        let raw: Vec<u8> = [0x5A, 0x02]
            .into_iter()
            .chain(b"613.41.031.300".iter().copied())
            .collect();
        let mut ff = vec![0x10, raw.len() as u8];
        ff.extend_from_slice(&raw[..6]);
        mock.inject(CanFrame::new(ECU_ID, &ff).unwrap());
        let mut cf1 = vec![0x21];
        cf1.extend_from_slice(&raw[6..13]);
        mock.inject(CanFrame::new(ECU_ID, &cf1).unwrap());
        let mut cf2 = vec![0x22];
        cf2.extend_from_slice(&raw[13..]);
        mock.inject(CanFrame::new(ECU_ID, &cf2).unwrap());

        let message = session
            .read_matching(&root, Some(0x1A), Some(0x02))
            .await
            .unwrap();
        assert_eq!(message.ascii_payload(), "613.41.031.300");

        session.shutdown().await;
    }
}
