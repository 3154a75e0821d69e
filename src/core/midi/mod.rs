//! MIDI keyboard input: raw message decoding and the midir port connection.

mod input;
mod mapping;

pub use input::MidiInputHandler;
pub use mapping::{ControlMapping, Decoded, Ignored};
