pub mod audio;
pub mod midi;
pub mod oscillator;
pub mod synth;
pub mod voice;
