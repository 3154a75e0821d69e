mod envelope;
mod waveform;

// Re-export key types so they're accessible from core::oscillator
pub use self::envelope::{Envelope, EnvelopeStage, EnvelopeTimes};
pub use self::waveform::Waveform;
