//! Collaboration channel
//!
//! The transport that carries encoded `WireEnvelope`s between collaborators.
//! A channel must deliver every frame to every subscriber, in send order.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use formsync_core::FormResult;

/// Encoded wire message
pub type Frame = Vec<u8>;

/// Inbound frame stream for one subscriber
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// Any transport able to fan frames out to all subscribers
pub trait CollabChannel: Send + Sync {
    /// Send a frame to every current subscriber
    fn send(&self, frame: Frame) -> FormResult<()>;

    /// Open a new inbound stream
    fn subscribe(&self) -> FrameReceiver;
}

/// In-process broadcast channel
///
/// Each subscriber gets its own unbounded FIFO queue, so a slow subscriber
/// never causes frames to be dropped for the others.
#[derive(Default)]
pub struct InMemoryChannel {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        InMemoryChannel::default()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl CollabChannel for InMemoryChannel {
    fn send(&self, frame: Frame) -> FormResult<()> {
        let mut subscribers = self.subscribers.lock();
        // Receivers that were dropped are pruned on the way
        subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> FrameReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
