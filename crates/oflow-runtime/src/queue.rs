use oflow_proto::Message;
use tokio::sync::mpsc;

/// Default channel capacity: generous enough that a burst of unsolicited
/// notifications never blocks the correlator's dispatch task under normal
/// load, while still giving the dispatcher real backpressure (§4.D).
pub const DEFAULT_CAPACITY: usize = 4096;

/// FIFO of unsolicited events flowing from the correlator to the dispatcher.
pub struct EventQueue {
    rx: mpsc::Receiver<Message>,
}

/// The producer half, handed to the correlator at startup.
pub type EventSender = mpsc::Sender<Message>;

impl EventQueue {
    /// Creates a bounded queue and returns both halves.
    pub fn bounded(capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Receives the next event, or `None` once every sender has dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Drains and discards whatever is left, returning the count. Called
    /// once at shutdown; the caller is responsible for logging the
    /// aggregate count.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}
