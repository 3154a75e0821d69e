//! Precomputed wavetables shared by every voice

mod wavetable;

pub use wavetable::{WaveTable, WaveTableBank, WaveTableSpec};
