use crate::utils::helpers::ms_to_samples;

/// Attack and release durations, expressed in samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeTimes {
    pub attack_samples: f64,
    pub release_samples: f64,
}

impl EnvelopeTimes {
    pub fn from_ms(attack_ms: f32, release_ms: f32, sample_rate: u32) -> Self {
        Self {
            attack_samples: ms_to_samples(attack_ms, sample_rate),
            release_samples: ms_to_samples(release_ms, sample_rate),
        }
    }

    /// Per-sample amplitude increase while attacking
    pub fn attack_rate(&self) -> f64 {
        1.0 / self.attack_samples
    }

    /// Per-sample amplitude decrease while releasing
    pub fn release_rate(&self) -> f64 {
        1.0 / self.release_samples
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attacking,
    Sustained,
    Releasing,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct Release {
    start: f64,
    elapsed: u64,
}

impl Release {
    fn amplitude_at(&self, elapsed: u64, release_samples: f64) -> f64 {
        (self.start - elapsed as f64 / release_samples).clamp(0.0, 1.0)
    }
}

/// Gain applied across one rendered block.
///
/// Sample `i` of a block gets the amplitude the envelope has after `i + 1`
/// samples, so the last sample of a block carries the block's end amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gain {
    Unity,
    Constant(f32),
    Rising { from: u64, samples: f64 },
    Falling { start: f64, from: u64, samples: f64 },
}

impl Gain {
    #[inline]
    pub fn at(&self, i: usize) -> f32 {
        match *self {
            Gain::Unity => 1.0,
            Gain::Constant(level) => level,
            Gain::Rising { from, samples } => {
                (((from + i as u64 + 1) as f64 / samples).min(1.0)) as f32
            }
            Gain::Falling {
                start,
                from,
                samples,
            } => (start - (from + i as u64 + 1) as f64 / samples).clamp(0.0, 1.0) as f32,
        }
    }
}

/// Attack/release envelope with a sustain-pedal hold.
///
/// Positions are kept as whole sample counts, so the amplitude reached after
/// `n` samples does not depend on how those samples were split into blocks.
#[derive(Debug, Clone)]
pub struct Envelope {
    times: EnvelopeTimes,
    attack_elapsed: Option<u64>,
    attack_amplitude: f64,
    release: Option<Release>,
    held: bool,
    finished: bool,
}

impl Envelope {
    pub fn new(times: EnvelopeTimes) -> Self {
        Self {
            times,
            attack_elapsed: Some(0),
            attack_amplitude: 0.0,
            release: None,
            held: false,
            finished: false,
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        if self.finished {
            EnvelopeStage::Finished
        } else if self.release.is_some() {
            EnvelopeStage::Releasing
        } else if self.attack_elapsed.is_some() {
            EnvelopeStage::Attacking
        } else {
            EnvelopeStage::Sustained
        }
    }

    pub fn attack_rate(&self) -> Option<f64> {
        self.attack_elapsed.map(|_| self.times.attack_rate())
    }

    pub fn attack_amplitude(&self) -> f64 {
        self.attack_amplitude
    }

    /// Current release level; 1.0 before any release has started
    pub fn release_amplitude(&self) -> f64 {
        match self.release {
            Some(release) => release.amplitude_at(release.elapsed, self.times.release_samples),
            None => 1.0,
        }
    }

    /// Level the next sample would start from
    pub fn amplitude(&self) -> f64 {
        match self.stage() {
            EnvelopeStage::Attacking => self.attack_amplitude,
            EnvelopeStage::Sustained => 1.0,
            EnvelopeStage::Releasing => self.release_amplitude(),
            EnvelopeStage::Finished => 0.0,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_releasing(&self) -> bool {
        self.release.is_some()
    }

    pub fn hold(&mut self) {
        self.held = true;
    }

    pub fn unhold(&mut self) {
        self.held = false;
    }

    /// Start the release phase.
    ///
    /// An unfinished attack is cancelled and its level becomes the release
    /// starting point. Calling this again restarts the release from 1.0.
    pub fn release(&mut self) {
        let start = match self.attack_elapsed.take() {
            Some(_) => self.attack_amplitude,
            None => 1.0,
        };
        self.release = Some(Release { start, elapsed: 0 });
    }

    /// Step the envelope over `frames` samples.
    ///
    /// Returns the gain to apply to this block, or `None` once the release has
    /// run out, in which case the block must not be played.
    pub fn advance(&mut self, frames: usize) -> Option<Gain> {
        if self.finished {
            return None;
        }
        let frames = frames as u64;

        if let Some(release) = self.release.as_mut() {
            let samples = self.times.release_samples;
            if self.held {
                return Some(Gain::Constant(
                    release.amplitude_at(release.elapsed, samples) as f32,
                ));
            }
            let from = release.elapsed;
            let next = release.amplitude_at(from + frames, samples);
            if next <= 0.0 {
                self.finished = true;
                return None;
            }
            release.elapsed = from + frames;
            return Some(Gain::Falling {
                start: release.start,
                from,
                samples,
            });
        }

        if let Some(from) = self.attack_elapsed {
            let samples = self.times.attack_samples;
            let to = from + frames;
            let next = (to as f64 / samples).min(1.0);
            if next >= 1.0 {
                self.attack_elapsed = None;
                self.attack_amplitude = 1.0;
            } else {
                self.attack_elapsed = Some(to);
                self.attack_amplitude = next;
            }
            return Some(Gain::Rising { from, samples });
        }

        Some(Gain::Unity)
    }
}
