//! Transport abstraction over discrete CAN frames

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Subscription;
use crate::{CanFrame, LinkError};

/// Frame-level interface between the serial link and the protocol layers.
///
/// [`crate::SerialLink`] implements this over the real bridge;
/// [`crate::mock::MockCan`] implements it in-memory for tests.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Send one CAN frame, returning once the bridge acknowledged it.
    async fn send_frame(
        &self,
        cancel: &CancellationToken,
        frame: &CanFrame,
    ) -> Result<(), LinkError>;

    /// Subscribe to every frame received from the bus.
    fn subscribe_frames(&self) -> Subscription<CanFrame>;

    /// Remove a frame subscription.
    ///
    /// Dropping the handle has the same effect; this is the explicit form.
    fn unsubscribe_frames(&self, subscription: Subscription<CanFrame>) {
        drop(subscription);
    }
}
