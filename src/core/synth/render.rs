//! Offline rendering: drive an [`Engine`] from a timed event list instead of
//! a MIDI device, and write the result to a WAV file.

use anyhow::{Context, Result};
use std::path::Path;

use super::Engine;
use crate::messaging::{Event, Key};
use crate::utils::helpers::ms_to_samples;

/// Events stamped with the sample offset at which they are sent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    events: Vec<(u64, Event)>,
    length: u64,
}

impl Timeline {
    pub fn new(length: u64) -> Self {
        Self {
            events: Vec::new(),
            length,
        }
    }

    /// Play `notes` together for `hold_ms`, then let them ring for `tail_ms`.
    ///
    /// With `pedal_ms`, the sustain pedal goes down before the notes and comes
    /// up `pedal_ms` after they are released.
    pub fn chord(
        notes: &[Key],
        hold_ms: f32,
        tail_ms: f32,
        pedal_ms: Option<f32>,
        sample_rate: u32,
    ) -> Self {
        let samples = |ms: f32| ms_to_samples(ms, sample_rate).round() as u64;
        let release_at = samples(hold_ms);
        let pedal_up_at = pedal_ms.map(|ms| release_at + samples(ms));
        let end = pedal_up_at.unwrap_or(release_at) + samples(tail_ms);

        let mut timeline = Timeline::new(end);
        if pedal_up_at.is_some() {
            timeline.push(0, Event::SustainChange { on: true });
        }
        for &key in notes {
            timeline.push(0, Event::NoteOn { key });
        }
        for &key in notes {
            timeline.push(release_at, Event::NoteOff { key });
        }
        if let Some(at) = pedal_up_at {
            timeline.push(at, Event::SustainChange { on: false });
        }
        timeline
    }

    /// Add an event; events at the same offset keep insertion order
    pub fn push(&mut self, at: u64, event: Event) {
        let index = self.events.partition_point(|(t, _)| *t <= at);
        self.events.insert(index, (at, event));
        self.length = self.length.max(at);
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn events(&self) -> &[(u64, Event)] {
        &self.events
    }
}

/// Render `timeline` block by block.
///
/// Events are queued at the start of the first block at or after their
/// offset, the same one-block latency a live keyboard sees. Events at the
/// end of the timeline are queued after the last block and take effect on
/// the engine's next `process` call.
pub fn render_timeline(engine: &mut Engine, timeline: &Timeline) -> Result<Vec<f32>> {
    let blocksize = engine.config().blocksize;
    let total = timeline.len() as usize;
    let mut output = Vec::with_capacity(total);
    let mut pending = timeline.events().iter().peekable();

    while output.len() < total {
        let block_start = output.len() as u64;
        while let Some((_, event)) = pending.next_if(|(at, _)| *at <= block_start) {
            engine
                .enqueue(*event)
                .with_context(|| format!("queueing event at sample {}", block_start))?;
        }
        let frames = blocksize.min(total - output.len());
        output.extend_from_slice(engine.process(frames));
    }

    // Events stamped at the very end have no block left to start; they are
    // queued anyway so the engine is left in the timeline's final state.
    for (at, event) in pending {
        engine
            .enqueue(*event)
            .with_context(|| format!("queueing event at sample {}", at))?;
    }

    Ok(output)
}

/// Write mono samples as a 32-bit float WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("Failed to write sample data")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: u8) -> Key {
        Key::new(value).unwrap()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn chord_timeline_layout() {
        let notes = [key(60), key(64)];
        let timeline = Timeline::chord(&notes, 10.0, 100.0, Some(50.0), 48_000);
        assert_eq!(timeline.len(), 480 + 2400 + 4800);
        let events = timeline.events();
        assert_eq!(events[0], (0, Event::SustainChange { on: true }));
        assert_eq!(events[1], (0, Event::NoteOn { key: key(60) }));
        assert_eq!(events[2], (0, Event::NoteOn { key: key(64) }));
        assert_eq!(events[3], (480, Event::NoteOff { key: key(60) }));
        assert_eq!(events[5], (2880, Event::SustainChange { on: false }));
    }

    #[test]
    fn rendered_chord_fades_to_silence() {
        let mut engine = Engine::init(48_000, 16, 10.0, 100.0).unwrap();
        let notes = [key(60), key(64), key(67)];
        let timeline = Timeline::chord(&notes, 200.0, 150.0, None, 48_000);
        let samples = render_timeline(&mut engine, &timeline).unwrap();

        assert_eq!(samples.len(), timeline.len() as usize);
        assert!(peak(&samples[..9600]) > 0.1);
        // Release is 100 ms; the last 50 ms are silent
        assert_eq!(peak(&samples[samples.len() - 2400..]), 0.0);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn pedal_keeps_notes_ringing() {
        let mut engine = Engine::init(48_000, 16, 10.0, 100.0).unwrap();
        let timeline = Timeline::chord(&[key(69)], 50.0, 150.0, Some(200.0), 48_000);
        let samples = render_timeline(&mut engine, &timeline).unwrap();

        // 150 ms after note-off the pedal is still down: full level
        let at = ms_to_samples(200.0, 48_000) as usize;
        assert!(peak(&samples[at..at + 480]) > 0.12);
        assert_eq!(peak(&samples[samples.len() - 480..]), 0.0);
    }

    #[test]
    fn events_at_the_end_still_reach_the_engine() {
        let mut engine = Engine::init(48_000, 16, 10.0, 100.0).unwrap();
        let timeline = Timeline::chord(&[key(60)], 20.0, 0.0, Some(30.0), 48_000);
        assert_eq!(timeline.events().last(), Some(&(2400, Event::SustainChange { on: false })));
        assert_eq!(timeline.len(), 2400);

        let samples = render_timeline(&mut engine, &timeline).unwrap();
        assert_eq!(samples.len(), 2400);
        assert!(engine.is_sustaining());

        engine.process(16);
        assert!(!engine.is_sustaining());
        assert!(!engine.voice(key(60)).unwrap().is_held());
    }

    #[test]
    fn wav_round_trip() {
        let path =
            std::env::temp_dir().join(format!("rhosy-render-{}.wav", std::process::id()));
        let samples = vec![0.0, 0.25, -0.5, 0.125];
        write_wav(&path, &samples, 48_000).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let read: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);

        std::fs::remove_file(&path).unwrap();
    }
}
