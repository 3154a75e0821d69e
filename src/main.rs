use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod app;
mod audio;
mod core;
mod messaging;
mod utils;

use crate::app::{AppSettings, SynthApp};
use crate::core::oscillator::Waveform;
use crate::messaging::Key;

/// Polyphonic wavetable synthesizer for a MIDI keyboard
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Settings file to use instead of the one in the config directory
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(flatten)]
    engine: EngineOverrides,

    #[clap(subcommand)]
    command: Command,
}

/// Per-run overrides of the saved engine settings
#[derive(Args, Debug, Default)]
struct EngineOverrides {
    #[clap(long, global = true)]
    sample_rate: Option<u32>,

    /// Frames per audio block
    #[clap(long, global = true)]
    blocksize: Option<usize>,

    #[clap(long, global = true)]
    attack_ms: Option<f32>,

    #[clap(long, global = true)]
    release_ms: Option<f32>,

    /// sine, square, saw or triangle
    #[clap(long, global = true)]
    waveform: Option<Waveform>,
}

impl EngineOverrides {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(sample_rate) = self.sample_rate {
            settings.sample_rate = sample_rate;
        }
        if let Some(blocksize) = self.blocksize {
            settings.blocksize = blocksize;
        }
        if let Some(attack_ms) = self.attack_ms {
            settings.attack_ms = attack_ms;
        }
        if let Some(release_ms) = self.release_ms {
            settings.release_ms = release_ms;
        }
        if let Some(waveform) = self.waveform {
            settings.waveform = waveform;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play from a MIDI keyboard until its stop key is pressed
    Play {
        /// MIDI input port name (defaults to the saved port, then the first one)
        #[clap(long)]
        port: Option<String>,

        /// Audio output device name
        #[clap(long)]
        device: Option<String>,

        /// Stop after this many seconds
        #[clap(long)]
        seconds: Option<f32>,
    },
    /// List MIDI inputs and audio outputs
    Ports,
    /// Render a chord to a WAV file without any devices
    Render {
        #[clap(short, long)]
        out: PathBuf,

        /// Comma-separated MIDI note numbers
        #[clap(
            short,
            long,
            value_delimiter = ',',
            value_parser = parse_key,
            default_value = "60,64,67"
        )]
        notes: Vec<Key>,

        /// How long the keys stay down
        #[clap(long, default_value_t = 500.0)]
        hold_ms: f32,

        /// Time rendered after the last release
        #[clap(long, default_value_t = 500.0)]
        tail_ms: f32,

        /// Hold the sustain pedal this long past note-off
        #[clap(long)]
        sustain: Option<f32>,
    },
    /// Show the effective settings, optionally saving them
    Config {
        #[clap(long)]
        save: bool,
    },
}

fn parse_key(s: &str) -> Result<Key, String> {
    let value: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a MIDI note number", s))?;
    Key::new(value).ok_or_else(|| format!("note {} is out of range 0..=127", value))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = AppSettings::load(cli.config.as_deref())?;
    cli.engine.apply(&mut settings);
    let app = SynthApp::new(settings);

    match cli.command {
        Command::Play {
            port,
            device,
            seconds,
        } => app.play(port.as_deref(), device.as_deref(), seconds),
        Command::Ports => app.list_ports(),
        Command::Render {
            out,
            notes,
            hold_ms,
            tail_ms,
            sustain,
        } => app
            .render(&notes, hold_ms, tail_ms, sustain, &out)
            .map(|_| ()),
        Command::Config { save } => {
            let json = serde_json::to_string_pretty(app.settings())
                .context("Failed to serialize settings")?;
            println!("{}", json);
            if save {
                let path = match cli.config {
                    Some(path) => path,
                    None => AppSettings::default_path()?,
                };
                app.settings().save_to(&path)?;
            }
            Ok(())
        }
    }
}
