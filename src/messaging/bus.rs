use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::Event;

/// Why an event could not be queued. The rejected event is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The queue is at capacity; the newest event is rejected
    #[error("event queue full, dropped {0:?}")]
    Full(Event),
    /// The consuming engine has been dropped
    #[error("event queue disconnected, dropped {0:?}")]
    Disconnected(Event),
}

impl EnqueueError {
    pub fn into_event(self) -> Event {
        match self {
            EnqueueError::Full(event) | EnqueueError::Disconnected(event) => event,
        }
    }
}

/// Create a bounded event queue.
///
/// Overflow rejects the newest event: `push` returns [`EnqueueError::Full`]
/// and the shared drop counter is incremented. Neither end ever blocks.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (sender, receiver) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            sender,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { receiver, dropped },
    )
}

/// Producer side, owned by the decoding thread
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Queue an event without blocking
    pub fn push(&self, event: Event) -> Result<(), EnqueueError> {
        self.sender.try_send(event).map_err(|err| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match err {
                TrySendError::Full(event) => EnqueueError::Full(event),
                TrySendError::Disconnected(event) => EnqueueError::Disconnected(event),
            }
        })
    }

    /// Number of events rejected so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by the audio thread
pub struct EventReceiver {
    receiver: Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    /// Iterate over every pending event in FIFO order without blocking
    pub fn drain(&self) -> impl Iterator<Item = Event> + '_ {
        self.receiver.try_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::Key;

    fn note_on(key: u8) -> Event {
        Event::NoteOn {
            key: Key::new(key).unwrap(),
        }
    }

    #[test]
    fn drains_in_fifo_order() {
        let (tx, rx) = event_queue(8);
        tx.push(note_on(60)).unwrap();
        tx.push(Event::SustainChange { on: true }).unwrap();
        tx.push(note_on(64)).unwrap();

        let events: Vec<Event> = rx.drain().collect();
        assert_eq!(
            events,
            vec![note_on(60), Event::SustainChange { on: true }, note_on(64)]
        );
        assert!(rx.is_empty());
        assert_eq!(rx.drain().next(), None);
    }

    #[test]
    fn full_queue_rejects_newest() {
        let (tx, rx) = event_queue(2);
        tx.push(note_on(1)).unwrap();
        tx.push(note_on(2)).unwrap();

        assert_eq!(tx.push(note_on(3)), Err(EnqueueError::Full(note_on(3))));
        assert_eq!(tx.dropped(), 1);
        assert_eq!(rx.dropped(), 1);

        // Oldest events survive
        let kept: Vec<Event> = rx.drain().collect();
        assert_eq!(kept, vec![note_on(1), note_on(2)]);

        // Space freed by draining is usable again
        tx.push(note_on(4)).unwrap();
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![note_on(4)]);
    }

    #[test]
    fn disconnected_consumer_is_reported() {
        let (tx, rx) = event_queue(2);
        drop(rx);
        let err = tx.push(note_on(5)).unwrap_err();
        assert_eq!(err, EnqueueError::Disconnected(note_on(5)));
        assert_eq!(err.into_event(), note_on(5));
    }

    #[test]
    fn producer_on_another_thread() {
        let (tx, rx) = event_queue(64);
        let producer = std::thread::spawn(move || {
            for key in 0..32 {
                tx.push(note_on(key)).unwrap();
            }
        });
        producer.join().unwrap();

        let keys: Vec<u8> = rx
            .drain()
            .map(|event| match event {
                Event::NoteOn { key } => key.get(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(keys, (0..32).collect::<Vec<u8>>());
    }
}
