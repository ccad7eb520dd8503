//! Single-slot frame mailbox for the optional preview consumer.
//!
//! The producer (processing thread) overwrites whatever is in the slot so
//! the consumer always sees the most recent frame; a slow consumer skips
//! frames instead of building a queue.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    available: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            available: Condvar::new(),
        }
    }
}

impl<T> Mailbox<T> {
    /// Replace the slot content with a newer value.
    pub fn offer(&self, value: T) {
        *self.slot.lock().expect("mailbox mutex") = Some(value);
        self.available.notify_one();
    }

    /// Take the current value, waiting up to `timeout` for one to arrive.
    pub fn take(&self, timeout: Duration) -> Option<T> {
        let guard = self.slot.lock().expect("mailbox mutex");
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .expect("mailbox mutex");
        guard.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_value_replaces_older() {
        let mailbox = Mailbox::default();
        mailbox.offer(1);
        mailbox.offer(2);
        assert_eq!(mailbox.take(Duration::from_millis(1)), Some(2));
        assert_eq!(mailbox.take(Duration::from_millis(1)), None);
    }

    #[test]
    fn take_wakes_on_offer() {
        let mailbox = std::sync::Arc::new(Mailbox::default());
        let producer = {
            let mailbox = std::sync::Arc::clone(&mailbox);
            std::thread::spawn(move || mailbox.offer(7))
        };
        assert_eq!(mailbox.take(Duration::from_secs(2)), Some(7));
        producer.join().unwrap();
    }
}
