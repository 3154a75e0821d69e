use std::fmt;

/// Number of representable MIDI keys
pub const KEY_COUNT: usize = 128;

/// A MIDI key number, guaranteed to be in 0..=127
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u8);

impl Key {
    pub const MAX: u8 = (KEY_COUNT - 1) as u8;

    /// Returns `None` for values outside the 7-bit MIDI range
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Build a key from the low seven bits of a MIDI data byte
    pub const fn from_data_byte(byte: u8) -> Self {
        Self(byte & 0x7F)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every key, lowest first
    pub fn all() -> impl Iterator<Item = Key> {
        (0..=Self::MAX).map(Key)
    }
}

impl TryFrom<u8> for Key {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Key::new(value).ok_or(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Control events carried from the decoder to the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NoteOn { key: Key },
    NoteOff { key: Key },
    SustainChange { on: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range() {
        assert_eq!(Key::new(0).map(Key::get), Some(0));
        assert_eq!(Key::new(127).map(Key::get), Some(127));
        assert_eq!(Key::new(128), None);
        assert_eq!(Key::try_from(200), Err(200));
        assert_eq!(Key::from_data_byte(0xC5).get(), 0x45);
        assert_eq!(Key::all().count(), KEY_COUNT);
    }
}
