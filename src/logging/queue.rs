//! Thread-safe FIFO between producers and the writer thread
//!
//! Producers hold the lock only to append; the consumer releases it while a
//! message is being written so file I/O never blocks an enqueue.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::Message;
use crate::error::{LogError, Result};

/// Position of a message in submission order (starts at 1)
pub type Sequence = u64;

struct QueueState {
    messages: VecDeque<(Sequence, Message)>,
    open: bool,
    last_seq: Sequence,
}

pub struct LogQueue {
    state: Mutex<QueueState>,
    notifier: Condvar,
    /// Sequence of the last message handed back by the consumer
    processed: Mutex<Sequence>,
    processed_notifier: Condvar,
}

impl LogQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                open: true,
                last_seq: 0,
            }),
            notifier: Condvar::new(),
            processed: Mutex::new(0),
            processed_notifier: Condvar::new(),
        }
    }

    /// Append a message and wake the consumer
    pub fn push(&self, message: Message) -> Result<Sequence> {
        let state = self.state.lock();
        self.append(state, message)
    }

    /// Like [`push`](Self::push), but gives up with `QueueBusy` if the lock
    /// is not free within `timeout`.
    ///
    /// For fault handlers: the interrupted code may be holding the lock on
    /// this very thread.
    pub fn try_push_for(&self, message: Message, timeout: Duration) -> Result<Sequence> {
        let state = self
            .state
            .try_lock_for(timeout)
            .ok_or(LogError::QueueBusy)?;
        self.append(state, message)
    }

    fn append(&self, mut state: MutexGuard<'_, QueueState>, message: Message) -> Result<Sequence> {
        if !state.open {
            return Err(LogError::QueueClosed);
        }
        state.last_seq += 1;
        let seq = state.last_seq;
        state.messages.push_back((seq, message));
        drop(state);
        self.notifier.notify_one();
        Ok(seq)
    }

    /// Stop accepting messages; the consumer drains what is left and returns
    pub fn close(&self) {
        self.state.lock().open = false;
        self.notifier.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the consumer loop on the calling thread until the queue is closed
    /// and empty.
    ///
    /// Messages are handed to `handler` one at a time, in submission order,
    /// with the queue lock released.
    pub fn consume<F>(&self, mut handler: F)
    where
        F: FnMut(Message),
    {
        let mut state = self.state.lock();
        loop {
            while let Some((seq, message)) = state.messages.pop_front() {
                MutexGuard::unlocked(&mut state, || {
                    handler(message);
                    self.mark_processed(seq);
                });
            }
            if !state.open {
                break;
            }
            self.notifier.wait(&mut state);
        }
    }

    fn mark_processed(&self, seq: Sequence) {
        *self.processed.lock() = seq;
        self.processed_notifier.notify_all();
    }

    /// Sequence of the most recently accepted message (0 if none)
    pub fn last_sequence(&self) -> Sequence {
        self.state.lock().last_seq
    }

    /// Last sequence the consumer has finished with
    pub fn processed(&self) -> Sequence {
        *self.processed.lock()
    }

    /// Block until `seq` has been processed or `timeout` elapses.
    ///
    /// Returns true if the message was processed in time.
    pub fn wait_processed(&self, seq: Sequence, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Some(mut done) = self.processed.try_lock_until(deadline) else {
            return false;
        };
        while *done < seq {
            if self
                .processed_notifier
                .wait_until(&mut done, deadline)
                .timed_out()
            {
                return *done >= seq;
            }
        }
        true
    }
}

impl Default for LogQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use std::sync::Arc;
    use std::thread;

    fn msg(text: &str) -> Message {
        Message::new("test", LogLevel::Info, text, vec![])
    }

    #[test]
    fn test_push_assigns_increasing_sequence() {
        let queue = LogQueue::new();
        assert_eq!(queue.push(msg("a")).unwrap(), 1);
        assert_eq!(queue.push(msg("b")).unwrap(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_after_close_fails() {
        let queue = LogQueue::new();
        queue.close();
        assert!(!queue.is_open());
        assert!(matches!(queue.push(msg("late")), Err(LogError::QueueClosed)));
    }

    #[test]
    fn test_consume_drains_before_exit() {
        let queue = LogQueue::new();
        for i in 0..5 {
            queue.push(msg(&i.to_string())).unwrap();
        }
        queue.close();

        let mut seen = Vec::new();
        queue.consume(|m| seen.push(m.text().to_string()));

        assert_eq!(seen, vec!["0", "1", "2", "3", "4"]);
        assert!(queue.is_empty());
        assert_eq!(queue.processed(), 5);
    }

    #[test]
    fn test_consumer_wakes_on_push() {
        let queue = Arc::new(LogQueue::new());
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut count = 0;
                queue.consume(|_| count += 1);
                count
            })
        };

        let seq = queue.push(msg("x")).unwrap();
        assert!(queue.wait_processed(seq, Duration::from_secs(5)));

        queue.push(msg("y")).unwrap();
        queue.close();
        assert_eq!(consumer.join().unwrap(), 2);
    }

    #[test]
    fn test_try_push_gives_up_while_lock_is_held() {
        let queue = LogQueue::new();
        {
            let _held = queue.state.lock();
            assert!(matches!(
                queue.try_push_for(msg("fault"), Duration::from_millis(20)),
                Err(LogError::QueueBusy)
            ));
        }
        assert_eq!(queue.try_push_for(msg("fault"), Duration::from_millis(20)).unwrap(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_wait_processed_gives_up_while_lock_is_held() {
        let queue = LogQueue::new();
        let seq = queue.push(msg("x")).unwrap();
        let _held = queue.processed.lock();
        assert!(!queue.wait_processed(seq, Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_processed_times_out_without_consumer() {
        let queue = LogQueue::new();
        let seq = queue.push(msg("stuck")).unwrap();
        assert!(!queue.wait_processed(seq, Duration::from_millis(20)));
    }
}
