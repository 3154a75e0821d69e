use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::audio::{self, AudioOutput};
use crate::core::midi::{ControlMapping, MidiInputHandler};
use crate::core::oscillator::Waveform;
use crate::core::synth::render::{render_timeline, write_wav, Timeline};
use crate::core::synth::{Engine, EngineConfig};
use crate::messaging::Key;
use crate::utils::helpers::{amplitude_to_db, format_time};

const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Persistent settings, stored as JSON in the user's config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub sample_rate: u32,
    pub blocksize: usize,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub max_polyphony: usize,
    pub queue_capacity: usize,
    pub waveform: Waveform,
    pub midi_port: Option<String>,
    pub output_device: Option<String>,
    pub controls: ControlMapping,
}

impl Default for AppSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            sample_rate: engine.sample_rate,
            blocksize: engine.blocksize,
            attack_ms: engine.attack_ms,
            release_ms: engine.release_ms,
            max_polyphony: engine.max_polyphony,
            queue_capacity: engine.queue_capacity,
            waveform: engine.waveform,
            midi_port: None,
            output_device: None,
            controls: ControlMapping::default(),
        }
    }
}

impl AppSettings {
    pub fn settings_dir() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("rhosy");
        Ok(path)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join("settings.json"))
    }

    /// Load from `path`, or from the default location if `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    log::debug!("no settings at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open settings {}", path.display()))?;
        let settings = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse settings {}", path.display()))?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create settings {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write settings")?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            blocksize: self.blocksize,
            attack_ms: self.attack_ms,
            release_ms: self.release_ms,
            waveform: self.waveform,
            max_polyphony: self.max_polyphony,
            queue_capacity: self.queue_capacity,
        }
    }
}

/// What a render run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    pub peak: f32,
}

/// Wires settings, devices and the engine together for each command
pub struct SynthApp {
    settings: AppSettings,
}

impl SynthApp {
    pub fn new(settings: AppSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Play from a MIDI keyboard until the stop control arrives or `seconds`
    /// run out.
    ///
    /// `port` and `device` override the saved choices.
    pub fn play(
        &self,
        port: Option<&str>,
        device: Option<&str>,
        seconds: Option<f32>,
    ) -> Result<()> {
        let engine = Engine::with_config(self.settings.engine_config())
            .context("Failed to build engine")?;
        let handle = engine.handle();
        log::info!(
            "{} waveform, {} Hz, {} frame blocks, {:.1} dB per voice",
            self.settings.waveform,
            self.settings.sample_rate,
            self.settings.blocksize,
            amplitude_to_db(engine.config().voice_gain())
        );

        let device = device.or(self.settings.output_device.as_deref());
        let output = AudioOutput::start(engine, device)?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let port = port.or(self.settings.midi_port.as_deref());
        let midi = MidiInputHandler::connect(
            port,
            handle.clone(),
            self.settings.controls.clone(),
            stop_tx,
        )?;
        log::info!(
            "playing on '{}' ({:?}) from '{}'",
            output.device_name(),
            output.config().buffer_size,
            midi.port_name()
        );

        let started = Instant::now();
        let deadline = seconds.map(|s| started + Duration::from_secs_f32(s.max(0.0)));
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        log::info!("time limit reached");
                        break;
                    }
                    left.min(STATS_INTERVAL)
                }
                None => STATS_INTERVAL,
            };
            match stop_rx.recv_timeout(wait) {
                Ok(()) => {
                    log::info!("stop requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!(
                        target: "rhosy::audio",
                        "{} voices, {} blocks",
                        handle.stats().active_voices(),
                        handle.stats().blocks_rendered()
                    );
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(output);
        drop(midi);

        let stats = handle.stats();
        log::info!(
            "played {}: {} blocks, {} voices finished, {} events dropped",
            format_time(started.elapsed().as_secs_f32()),
            stats.blocks_rendered(),
            stats.voices_reaped(),
            handle.events_dropped()
        );
        Ok(())
    }

    /// Print MIDI inputs and audio outputs
    pub fn list_ports(&self) -> Result<()> {
        println!("MIDI inputs:");
        for (i, name) in MidiInputHandler::list_ports()?.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
        println!("Audio outputs:");
        for (i, name) in audio::list_output_devices()?.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
        Ok(())
    }

    /// Render a chord offline to a WAV file.
    ///
    /// With `pedal_ms`, the sustain pedal is held that long past note-off.
    pub fn render(
        &self,
        notes: &[Key],
        hold_ms: f32,
        tail_ms: f32,
        pedal_ms: Option<f32>,
        out: &Path,
    ) -> Result<RenderSummary> {
        let mut engine = Engine::with_config(self.settings.engine_config())
            .context("Failed to build engine")?;
        let sample_rate = self.settings.sample_rate;
        let timeline = Timeline::chord(notes, hold_ms, tail_ms, pedal_ms, sample_rate);
        let samples = render_timeline(&mut engine, &timeline)?;
        write_wav(out, &samples, sample_rate)?;

        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        log::info!(
            "wrote {} ({}, peak {:.1} dB)",
            out.display(),
            format_time(samples.len() as f32 / sample_rate as f32),
            amplitude_to_db(peak)
        );
        Ok(RenderSummary {
            frames: samples.len(),
            peak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rhosy-{}-{}", std::process::id(), name))
    }

    #[test]
    fn defaults_match_engine_defaults() {
        assert_eq!(AppSettings::default().engine_config(), EngineConfig::default());
    }

    #[test]
    fn settings_round_trip() {
        let path = temp_path("settings.json");
        let settings = AppSettings {
            blocksize: 64,
            waveform: Waveform::Saw,
            midi_port: Some("Oxygen 8".to_string()),
            ..AppSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(AppSettings::load(Some(&path)).unwrap(), settings);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let path = temp_path("partial.json");
        fs::write(&path, r#"{"release_ms": 250.0, "waveform": "triangle"}"#).unwrap();
        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.release_ms, 250.0);
        assert_eq!(settings.waveform, Waveform::Triangle);
        assert_eq!(settings.blocksize, 16);
        assert_eq!(settings.controls, ControlMapping::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_explicit_settings_is_an_error() {
        assert!(AppSettings::load(Some(&temp_path("absent.json"))).is_err());
    }

    #[test]
    fn render_writes_a_wav() {
        let path = temp_path("chord.wav");
        let app = SynthApp::new(AppSettings::default());
        let notes: Vec<Key> = [60, 64, 67].iter().filter_map(|&n| Key::new(n)).collect();
        let summary = app.render(&notes, 100.0, 200.0, None, &path).unwrap();

        assert_eq!(summary.frames, 14_400);
        assert!(summary.peak > 0.1 && summary.peak <= 3.0 / 8.0 + 1e-6);
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len() as usize, summary.frames);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn render_rejects_bad_settings() {
        let settings = AppSettings {
            blocksize: 0,
            ..AppSettings::default()
        };
        let app = SynthApp::new(settings);
        let result = app.render(&[], 10.0, 10.0, None, &temp_path("never.wav"));
        assert!(result.is_err());
    }
}
