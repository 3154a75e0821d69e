pub mod render;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::core::audio::{WaveTableBank, WaveTableSpec};
use crate::core::oscillator::{EnvelopeTimes, Waveform};
use crate::core::voice::{Voice, VoiceStatus};
use crate::messaging::{
    event_queue, EnqueueError, Event, EventReceiver, EventSender, Key, KEY_COUNT,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Fixed engine parameters, chosen once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Expected frames per `process` call
    pub blocksize: usize,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub waveform: Waveform,
    /// Voices that can sound together at full level before the mix clips
    pub max_polyphony: usize,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            blocksize: 16,
            attack_ms: 10.0,
            release_ms: 100.0,
            waveform: Waveform::Sine,
            max_polyphony: 8,
            queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));
        if self.sample_rate == 0 {
            return invalid("sample rate must be positive".into());
        }
        if self.blocksize == 0 {
            return invalid("blocksize must be positive".into());
        }
        if !(self.attack_ms.is_finite() && self.attack_ms > 0.0) {
            return invalid(format!("attack time {} ms is not positive", self.attack_ms));
        }
        if !(self.release_ms.is_finite() && self.release_ms > 0.0) {
            return invalid(format!("release time {} ms is not positive", self.release_ms));
        }
        if self.max_polyphony == 0 {
            return invalid("max polyphony must be at least 1".into());
        }
        if self.queue_capacity == 0 {
            return invalid("event queue capacity must be at least 1".into());
        }
        Ok(())
    }

    /// Per-voice peak level
    pub fn voice_gain(&self) -> f32 {
        1.0 / self.max_polyphony as f32
    }

    pub fn wavetable_spec(&self) -> WaveTableSpec {
        WaveTableSpec {
            sample_rate: self.sample_rate,
            blocksize: self.blocksize,
            waveform: self.waveform,
            gain: self.voice_gain(),
        }
    }

    pub fn envelope_times(&self) -> EnvelopeTimes {
        EnvelopeTimes::from_ms(self.attack_ms, self.release_ms, self.sample_rate)
    }
}

/// Counters published by the audio thread for the control thread to read
#[derive(Debug, Default)]
pub struct EngineStats {
    active_voices: AtomicUsize,
    blocks_rendered: AtomicU64,
    voices_reaped: AtomicU64,
}

impl EngineStats {
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    pub fn voices_reaped(&self) -> u64 {
        self.voices_reaped.load(Ordering::Relaxed)
    }
}

/// Control-thread side of an [`Engine`]: queues events and reads stats
#[derive(Clone)]
pub struct EngineHandle {
    events: EventSender,
    stats: Arc<EngineStats>,
}

impl EngineHandle {
    pub fn enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        self.events.push(event)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn events_dropped(&self) -> u64 {
        self.events.dropped()
    }
}

/// Polyphonic voice engine.
///
/// Owned by the audio thread. `process` drains pending events, then mixes
/// every live voice; it never blocks, and it only allocates if asked for more
/// frames than the configured blocksize.
pub struct Engine {
    config: EngineConfig,
    bank: Arc<WaveTableBank>,
    times: EnvelopeTimes,
    voices: Box<[Option<Voice>]>,
    sustaining: bool,
    events: EventReceiver,
    sender: EventSender,
    accumulator: Vec<f32>,
    finished: Vec<Key>,
    stats: Arc<EngineStats>,
}

impl Engine {
    pub fn init(
        sample_rate: u32,
        blocksize: usize,
        attack_ms: f32,
        release_ms: f32,
    ) -> Result<Self, EngineError> {
        Self::with_config(EngineConfig {
            sample_rate,
            blocksize,
            attack_ms,
            release_ms,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let bank = Arc::new(WaveTableBank::new(config.wavetable_spec()));
        Ok(Self::with_bank(config, bank))
    }

    /// Build an engine around an existing bank; the bank's table parameters win over
    /// the table-related fields of `config`.
    pub fn with_bank(config: EngineConfig, bank: Arc<WaveTableBank>) -> Self {
        let (sender, events) = event_queue(config.queue_capacity);
        Self {
            times: config.envelope_times(),
            voices: (0..KEY_COUNT).map(|_| None).collect(),
            sustaining: false,
            events,
            sender,
            accumulator: vec![0.0; config.blocksize],
            finished: Vec::with_capacity(KEY_COUNT),
            stats: Arc::new(EngineStats::default()),
            bank,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bank(&self) -> &Arc<WaveTableBank> {
        &self.bank
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            events: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        self.sender.push(event)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn is_sustaining(&self) -> bool {
        self.sustaining
    }

    pub fn voice(&self, key: Key) -> Option<&Voice> {
        self.voices[key.index()].as_ref()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|slot| slot.is_some()).count()
    }

    /// Render one block and return it.
    ///
    /// A `frame_count` of zero returns an empty block without touching
    /// engine state.
    pub fn process(&mut self, frame_count: usize) -> &[f32] {
        if frame_count == 0 {
            return &[];
        }
        if self.accumulator.len() < frame_count {
            self.accumulator.resize(frame_count, 0.0);
        }
        let mut accumulator = std::mem::take(&mut self.accumulator);
        self.process_into(&mut accumulator[..frame_count]);
        self.accumulator = accumulator;
        &self.accumulator[..frame_count]
    }

    /// Render one block into `out`, overwriting its contents
    pub fn process_into(&mut self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }

        let Self {
            events,
            voices,
            sustaining,
            bank,
            times,
            ..
        } = self;
        for event in events.drain() {
            apply_event(voices, sustaining, bank, *times, event);
        }

        out.fill(0.0);
        self.finished.clear();
        for voice in self.voices.iter_mut().flatten() {
            if voice.render(out) == VoiceStatus::Finished {
                self.finished.push(voice.key());
            }
        }

        for key in self.finished.iter() {
            self.voices[key.index()] = None;
        }

        let active = self.active_voices();
        self.stats.active_voices.store(active, Ordering::Relaxed);
        self.stats.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        self.stats
            .voices_reaped
            .fetch_add(self.finished.len() as u64, Ordering::Relaxed);
    }
}

/// Apply one control event to the voice table
fn apply_event(
    voices: &mut [Option<Voice>],
    sustaining: &mut bool,
    bank: &WaveTableBank,
    times: EnvelopeTimes,
    event: Event,
) {
    match event {
        Event::NoteOn { key } => {
            let mut voice = Voice::new(key, Arc::clone(bank.get(key)), times);
            if *sustaining {
                voice.hold();
            }
            voices[key.index()] = Some(voice);
        }
        Event::NoteOff { key } => {
            if let Some(voice) = voices[key.index()].as_mut() {
                if !voice.is_releasing() {
                    voice.release();
                }
            }
        }
        Event::SustainChange { on } => {
            *sustaining = on;
            for voice in voices.iter_mut().flatten() {
                if on {
                    voice.hold();
                } else {
                    voice.unhold();
                }
            }
        }
    }
}
