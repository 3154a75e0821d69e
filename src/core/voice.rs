use std::sync::Arc;

use crate::core::audio::WaveTable;
use crate::core::oscillator::{Envelope, EnvelopeStage, EnvelopeTimes};
use crate::messaging::Key;

/// Outcome of rendering one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    Playing,
    /// Release ran out; the voice contributed nothing and should be dropped
    Finished,
}

/// One sounding note: a phase cursor into a shared wavetable plus its envelope
#[derive(Debug)]
pub struct Voice {
    key: Key,
    table: Arc<WaveTable>,
    phase: u64,
    envelope: Envelope,
}

impl Voice {
    pub fn new(key: Key, table: Arc<WaveTable>, times: EnvelopeTimes) -> Self {
        Self {
            key,
            table,
            phase: 0,
            envelope: Envelope::new(times),
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn phase(&self) -> u64 {
        self.phase
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn is_held(&self) -> bool {
        self.envelope.is_held()
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    pub fn release(&mut self) {
        self.envelope.release();
    }

    pub fn hold(&mut self) {
        self.envelope.hold();
    }

    pub fn unhold(&mut self) {
        self.envelope.unhold();
    }

    /// Render `out.len()` samples and add them into `out`.
    ///
    /// Does not allocate. On [`VoiceStatus::Finished`] `out` is left untouched
    /// and the phase does not advance.
    pub fn render(&mut self, out: &mut [f32]) -> VoiceStatus {
        let Some(gain) = self.envelope.advance(out.len()) else {
            return VoiceStatus::Finished;
        };

        for (i, (slot, sample)) in out
            .iter_mut()
            .zip(self.table.read_from(self.phase))
            .enumerate()
        {
            *slot += sample * gain.at(i);
        }

        self.phase += out.len() as u64;
        VoiceStatus::Playing
    }
}
