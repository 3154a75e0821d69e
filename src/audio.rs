use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Sample, SampleFormat, Stream, StreamConfig, SupportedBufferSize};

use crate::core::synth::Engine;

/// A running output stream; the engine lives inside its callback
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    config: StreamConfig,
}

impl AudioOutput {
    /// Open `device_name` (or the default device) and start rendering `engine`
    pub fn start(engine: Engine, device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        log::info!(target: "rhosy::audio", "using audio host {}", host.id().name());

        let device = find_output_device(&host, device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let supported = device
            .default_output_config()
            .with_context(|| format!("No output config for '{}'", device_name))?;

        let blocksize = engine.config().blocksize;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(engine.config().sample_rate),
            buffer_size: choose_buffer_size(supported.buffer_size(), blocksize),
        };
        if config.buffer_size == BufferSize::Default {
            log::warn!(
                target: "rhosy::audio",
                "'{}' cannot use {} frame buffers, using its default",
                device_name,
                blocksize
            );
        }
        log::info!(
            target: "rhosy::audio",
            "opening '{}': {} Hz, {} channels, {:?}, {:?}",
            device_name,
            config.sample_rate.0,
            config.channels,
            config.buffer_size,
            supported.sample_format()
        );

        let stream = match supported.sample_format() {
            SampleFormat::F32 => create_stream::<f32>(&device, &config, engine),
            SampleFormat::I16 => create_stream::<i16>(&device, &config, engine),
            SampleFormat::U16 => create_stream::<u16>(&device, &config, engine),
            other => anyhow::bail!("Unsupported sample format {:?}", other),
        }
        .with_context(|| format!("Failed to build output stream on '{}'", device_name))?;

        stream.play().context("Failed to start audio stream")?;
        Ok(Self {
            _stream: stream,
            device_name,
            config,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

/// Names of the default host's output devices
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .context("Failed to enumerate output devices")?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        Some(name) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Output device '{}' not found", name)),
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available")),
    }
}

/// One engine block per callback when the device allows it.
///
/// Any other callback size still works: [`BlockStream`] re-blocks the output.
fn choose_buffer_size(supported: &SupportedBufferSize, blocksize: usize) -> BufferSize {
    let frames = u32::try_from(blocksize).unwrap_or(u32::MAX);
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            BufferSize::Fixed(frames)
        }
        SupportedBufferSize::Range { .. } => BufferSize::Default,
        SupportedBufferSize::Unknown => BufferSize::Fixed(frames),
    }
}

/// Adapts device callbacks of any length to fixed `blocksize` engine blocks.
///
/// The engine is always asked for exactly one configured block, rendered into
/// a buffer allocated up front, and leftover frames carry over to the next
/// callback.
struct BlockStream {
    engine: Engine,
    block: Box<[f32]>,
    next: usize,
}

impl BlockStream {
    fn new(engine: Engine) -> Self {
        let blocksize = engine.config().blocksize;
        Self {
            engine,
            block: vec![0.0; blocksize].into_boxed_slice(),
            next: blocksize,
        }
    }

    /// Fill an interleaved buffer, copying the mono signal to every channel
    fn write<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + cpal::FromSample<f32>,
    {
        for frame in data.chunks_mut(channels) {
            if self.next == self.block.len() {
                self.engine.process_into(&mut self.block);
                self.next = 0;
            }
            frame.fill(T::from_sample(self.block[self.next]));
            self.next += 1;
        }
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: Engine,
) -> Result<Stream>
where
    T: Sample + Send + 'static + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = |err| log::error!(target: "rhosy::audio", "audio stream error: {}", err);
    let mut blocks = BlockStream::new(engine);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            blocks.write(data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{Event, Key};

    #[test]
    fn buffer_size_follows_device_range() {
        let range = SupportedBufferSize::Range { min: 32, max: 4096 };
        assert_eq!(choose_buffer_size(&range, 256), BufferSize::Fixed(256));
        assert_eq!(choose_buffer_size(&range, 16), BufferSize::Default);
        assert_eq!(
            choose_buffer_size(&SupportedBufferSize::Unknown, 16),
            BufferSize::Fixed(16)
        );
    }

    fn engine() -> Engine {
        let engine = Engine::init(48_000, 16, 10.0, 100.0).unwrap();
        engine
            .enqueue(Event::NoteOn {
                key: Key::new(69).unwrap(),
            })
            .unwrap();
        engine
    }

    #[test]
    fn mono_block_fills_every_channel() {
        let mut blocks = BlockStream::new(engine());
        let mut data = [0.0f32; 64];
        blocks.write(&mut data, 2);
        for frame in data.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(data.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn odd_callback_sizes_render_whole_blocks() {
        let mut reference = engine();
        let mut expected = Vec::new();
        for _ in 0..40 {
            expected.extend_from_slice(reference.process(16));
        }

        let engine = engine();
        let handle = engine.handle();
        let mut blocks = BlockStream::new(engine);
        let mut written = Vec::new();
        for size in [512, 7, 1, 33, 64, 23] {
            let mut data = vec![0.0f32; size];
            blocks.write(&mut data, 1);
            written.extend(data);
        }

        assert_eq!(written.len(), 640);
        assert_eq!(written, expected);
        // 640 frames are exactly 40 blocks of 16
        assert_eq!(handle.stats().blocks_rendered(), 40);
    }

    #[test]
    fn integer_formats_are_converted() {
        let mut blocks = BlockStream::new(Engine::init(48_000, 16, 10.0, 100.0).unwrap());
        let mut data = [1i16; 4];
        blocks.write(&mut data, 1);
        assert_eq!(data, [0; 4]);

        let mut data = [0u16; 4];
        blocks.write(&mut data, 2);
        assert_eq!(data, [32_768; 4]);
    }
}
