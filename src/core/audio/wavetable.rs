use std::sync::Arc;

use crate::core::oscillator::Waveform;
use crate::messaging::Key;
use crate::utils::helpers::midi_note_to_freq;

/// Parameters every table in a bank is generated from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveTableSpec {
    pub sample_rate: u32,
    pub blocksize: usize,
    pub waveform: Waveform,
    /// Peak level of each table; budgets headroom for simultaneous voices
    pub gain: f32,
}

/// One precomputed pitch: a whole number of waveform cycles spanning at
/// least one block, so reads can tile the table by modulo.
#[derive(Debug)]
pub struct WaveTable {
    key: Key,
    frequency: f64,
    cycles: usize,
    samples: Box<[f32]>,
}

impl WaveTable {
    pub fn generate(key: Key, spec: &WaveTableSpec) -> Self {
        let frequency = midi_note_to_freq(key.get());
        let period = spec.sample_rate as f64 / frequency;
        let cycles = ((spec.blocksize as f64 / period).ceil() as usize).max(1);
        let len = ((cycles as f64 * period).round() as usize).max(1);

        let samples = (0..len)
            .map(|i| {
                let phase = cycles as f64 * i as f64 / len as f64;
                (spec.waveform.sample(phase) * spec.gain as f64) as f32
            })
            .collect();

        Self {
            key,
            frequency,
            cycles,
            samples,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Endless sample stream starting at `phase`, wrapping at the table end
    #[inline]
    pub fn read_from(&self, phase: u64) -> impl Iterator<Item = f32> + '_ {
        let start = (phase % self.samples.len() as u64) as usize;
        self.samples[start..]
            .iter()
            .chain(self.samples.iter().cycle())
            .copied()
    }
}

/// Read-only tables for all 128 keys, built once at startup
#[derive(Debug)]
pub struct WaveTableBank {
    tables: Vec<Arc<WaveTable>>,
}

impl WaveTableBank {
    pub fn new(spec: WaveTableSpec) -> Self {
        let tables = Key::all()
            .map(|key| Arc::new(WaveTable::generate(key, &spec)))
            .collect();
        Self { tables }
    }

    /// Shared table for `key`
    pub fn get(&self, key: Key) -> &Arc<WaveTable> {
        &self.tables[key.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WaveTable>> {
        self.tables.iter()
    }
}
