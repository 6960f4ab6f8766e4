//! User message queue disciplines.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::envelope::Envelope;

/// Storage for an actor's user messages.
///
/// Implementations must accept concurrent producers. A single consumer (the
/// active mailbox run) dequeues at a time.
pub trait MessageQueue: Send + Sync {
    /// Add a message, or hand it back if the queue refuses it.
    fn enqueue(&self, envelope: Envelope) -> Result<(), Envelope>;

    /// Take the next message according to the queue's discipline.
    fn dequeue(&self) -> Option<Envelope>;

    /// Whether any message is queued.
    fn has_messages(&self) -> bool;

    /// Number of queued messages.
    fn number_of_messages(&self) -> usize;

    /// Remove every queued message.
    fn drain(&self) -> Vec<Envelope> {
        let mut drained = Vec::with_capacity(self.number_of_messages());
        while let Some(envelope) = self.dequeue() {
            drained.push(envelope);
        }
        drained
    }
}

/// FIFO queue without a capacity limit.
pub struct UnboundedQueue {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
}

impl UnboundedQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}

impl Default for UnboundedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue for UnboundedQueue {
    fn enqueue(&self, envelope: Envelope) -> Result<(), Envelope> {
        // The receiver lives in `self`, so the channel never disconnects.
        self.sender.send(envelope).map_err(|e| e.into_inner())
    }

    fn dequeue(&self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    fn has_messages(&self) -> bool {
        !self.receiver.is_empty()
    }

    fn number_of_messages(&self) -> usize {
        self.receiver.len()
    }
}

/// FIFO queue that rejects messages once `capacity` are waiting.
pub struct BoundedQueue {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
    capacity: usize,
}

impl BoundedQueue {
    /// Create an empty queue holding at most `capacity` messages.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Maximum number of queued messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl MessageQueue for BoundedQueue {
    fn enqueue(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(envelope) | TrySendError::Disconnected(envelope) => envelope,
        })
    }

    fn dequeue(&self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    fn has_messages(&self) -> bool {
        !self.receiver.is_empty()
    }

    fn number_of_messages(&self) -> usize {
        self.receiver.len()
    }
}

/// LIFO queue: the most recently posted message is processed first.
#[derive(Default)]
pub struct StackQueue {
    stack: Mutex<Vec<Envelope>>,
}

impl StackQueue {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageQueue for StackQueue {
    fn enqueue(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.stack.lock().push(envelope);
        Ok(())
    }

    fn dequeue(&self) -> Option<Envelope> {
        self.stack.lock().pop()
    }

    fn has_messages(&self) -> bool {
        !self.stack.lock().is_empty()
    }

    fn number_of_messages(&self) -> usize {
        self.stack.lock().len()
    }

    fn drain(&self) -> Vec<Envelope> {
        let mut stack = self.stack.lock();
        stack.drain(..).rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(queue: &dyn MessageQueue) -> Vec<u32> {
        queue
            .drain()
            .iter()
            .filter_map(|e| e.downcast_ref::<u32>().copied())
            .collect()
    }

    #[test]
    fn test_unbounded_is_fifo() {
        let queue = UnboundedQueue::new();
        for i in 1..=3u32 {
            queue.enqueue(Envelope::new(i, None)).unwrap();
        }
        assert_eq!(queue.number_of_messages(), 3);
        assert_eq!(values(&queue), vec![1, 2, 3]);
        assert!(!queue.has_messages());
    }

    #[test]
    fn test_bounded_rejects_when_full() {
        let queue = BoundedQueue::new(2);
        assert!(queue.enqueue(Envelope::new(1u32, None)).is_ok());
        assert!(queue.enqueue(Envelope::new(2u32, None)).is_ok());

        let rejected = queue.enqueue(Envelope::new(3u32, None)).unwrap_err();
        assert_eq!(rejected.downcast_ref::<u32>(), Some(&3));
        assert_eq!(queue.capacity(), 2);
        assert_eq!(values(&queue), vec![1, 2]);
    }

    #[test]
    fn test_zero_capacity_holds_one_message() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(Envelope::new(1u32, None)).is_ok());
        assert!(queue.enqueue(Envelope::new(2u32, None)).is_err());
        assert_eq!(values(&queue), vec![1]);
    }

    #[test]
    fn test_stack_is_lifo() {
        let queue = StackQueue::new();
        for i in 1..=3u32 {
            queue.enqueue(Envelope::new(i, None)).unwrap();
        }
        assert_eq!(queue.dequeue().unwrap().downcast_ref::<u32>(), Some(&3));
        assert_eq!(values(&queue), vec![2, 1]);
    }
}
