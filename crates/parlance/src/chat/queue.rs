//! Bounded per-session event queue.
//!
//! A fixed-size ring: publishing never blocks, and overflow drops the
//! oldest unread event so a slow or disconnected consumer can never stall
//! the model run. Consumers lose history rather than back-pressuring the
//! producer.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::events::WireEvent;

/// Maximum buffered events per session.
pub const QUEUE_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<VecDeque<WireEvent>>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Non-blocking publish. Drops the oldest queued event on overflow.
    pub fn push(&self, event: WireEvent) {
        {
            let mut queue = self.lock();
            if queue.len() == self.capacity {
                queue.pop_front();
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Await the next event in FIFO order.
    pub async fn recv(&self) -> WireEvent {
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.lock().pop_front() {
                return event;
            }
            notified.await;
        }
    }

    /// Pop without waiting.
    pub fn try_recv(&self) -> Option<WireEvent> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WireEvent>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(WireEvent::ContentChunk("a".to_string()));
        queue.push(WireEvent::ContentChunk("b".to_string()));
        queue.push(WireEvent::Done);

        assert_eq!(queue.recv().await, WireEvent::ContentChunk("a".to_string()));
        assert_eq!(queue.recv().await, WireEvent::ContentChunk("b".to_string()));
        assert_eq!(queue.recv().await, WireEvent::Done);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let queue = EventQueue::new();
        for i in 0..=QUEUE_CAPACITY {
            queue.push(WireEvent::ContentChunk(format!("event-{i}")));
        }

        assert_eq!(queue.len(), QUEUE_CAPACITY);
        // Event 0 was discarded; event 1 is now the head and the newest
        // event survived.
        assert_eq!(
            queue.recv().await,
            WireEvent::ContentChunk("event-1".to_string())
        );
        let mut last = None;
        while let Some(event) = queue.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(WireEvent::ContentChunk(format!("event-{QUEUE_CAPACITY}")))
        );
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let queue = Arc::new(EventQueue::new());
        let reader = queue.clone();
        let handle = tokio::spawn(async move { reader.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(WireEvent::Done);

        let received = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, WireEvent::Done);
    }
}
