mod bus;
mod types;

pub use bus::{event_queue, EnqueueError, EventReceiver, EventSender};
pub use types::{Event, Key, KEY_COUNT};
