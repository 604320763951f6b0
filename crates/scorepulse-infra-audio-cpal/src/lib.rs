use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use scorepulse_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use scorepulse_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SampleTime};
use std::sync::mpsc;
use std::thread;

const UNKNOWN_OUTPUT: &str = "Unknown Output";
const DEFAULT_SCRATCH_FRAMES: usize = 8192;

pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_else(|_| UNKNOWN_OUTPUT.to_string());
                (device_id(&host_id, index, &name), device)
            })
            .collect())
    }

    fn describe(id: DeviceId, device: &cpal::Device) -> Option<AudioOutputDevice> {
        let default_config = device.default_output_config().ok()?;
        Some(AudioOutputDevice {
            id,
            name: device.name().unwrap_or_else(|_| UNKNOWN_OUTPUT.to_string()),
            default_config: AudioConfig {
                sample_rate_hz: default_config.sample_rate().0,
                channels: default_config.channels(),
                buffer_size_frames: None,
            },
        })
    }

    fn select_stream_config(
        device: &cpal::Device,
        desired: AudioConfig,
    ) -> Result<SelectedStreamConfig, AudioError> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let chosen = select_supported_config(&mut supported, desired)?;
        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        Ok(SelectedStreamConfig {
            config,
            sample_format,
        })
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the stream alive on its own thread; cpal streams are not `Send` on
/// every platform.
pub struct CpalAudioStreamHandle {
    sample_rate_hz: u32,
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("audio stream thread panicked");
            }
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        Ok(devices
            .into_iter()
            .filter_map(|(id, device)| Self::describe(id, &device))
            .collect())
    }

    fn default_output(&self) -> Result<AudioOutputDevice, AudioError> {
        let default = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string()))?;
        let default_name = default.name().ok();

        let devices = Self::list_devices_from_host(&self.host)?;
        devices
            .into_iter()
            .find(|(_, device)| default_name.is_some() && device.name().ok() == default_name)
            .and_then(|(id, device)| Self::describe(id, &device))
            .ok_or_else(|| AudioError::DeviceUnavailable("default output has no usable config".to_string()))
    }

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.clone();
        let desired = config;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join_handle = thread::Builder::new()
            .name("scorepulse-audio".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let opened = Self::list_devices_from_host(&host).and_then(|devices| {
                    let device = devices
                        .into_iter()
                        .find(|(id, _)| id == &device_id)
                        .map(|(_, device)| device)
                        .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))?;
                    let selected = Self::select_stream_config(&device, desired)?;
                    let stream = match selected.sample_format {
                        SampleFormat::F32 => build_stream::<f32>(&device, &selected.config, cb),
                        SampleFormat::I16 => build_stream::<i16>(&device, &selected.config, cb),
                        SampleFormat::U16 => build_stream::<u16>(&device, &selected.config, cb),
                        other => Err(AudioError::UnsupportedConfig(format!(
                            "sample format {other:?}"
                        ))),
                    }?;
                    stream
                        .play()
                        .map_err(|e| AudioError::Backend(e.to_string()))?;
                    Ok((stream, selected.config.sample_rate.0))
                });

                match opened {
                    Ok((stream, sample_rate_hz)) => {
                        let _ = ready_tx.send(Ok(sample_rate_hz));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let sample_rate_hz = ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;

        Ok(Box::new(CpalAudioStreamHandle {
            sample_rate_hz,
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn device_id(host_id: &str, index: usize, name: &str) -> DeviceId {
    DeviceId(format!("cpal:{}:{}:{}", host_id, index, name))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let scratch_frames = match config.buffer_size {
        BufferSize::Fixed(frames) => (frames as usize).max(1),
        BufferSize::Default => DEFAULT_SCRATCH_FRAMES,
    };
    let mut mono = vec![0.0f32; scratch_frames];
    let mut sample_time: SampleTime = 0;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                let frames = render_interleaved(cb.as_mut(), sample_time, data, channels, &mut mono);
                sample_time = sample_time.saturating_add(frames);
            },
            |err| tracing::warn!(error = %err, "cpal stream error"),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let mut best: Option<(i32, cpal::SupportedStreamConfig)> = None;

    for range in supported {
        let min = range.min_sample_rate().0;
        let max = range.max_sample_rate().0;
        if desired.sample_rate_hz < min || desired.sample_rate_hz > max {
            continue;
        }

        let format_score = match range.sample_format() {
            SampleFormat::F32 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::U16 => 1,
            _ => continue,
        };
        // prefer the requested channel count, but a mono click plays on anything
        let channel_score = if range.channels() == desired.channels { 10 } else { 0 };
        let score = format_score + channel_score;

        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, range.with_sample_rate(SampleRate(desired.sample_rate_hz))));
        }
    }

    best.map(|(_, config)| config).ok_or_else(|| {
        AudioError::UnsupportedConfig(format!(
            "no output config at {} Hz",
            desired.sample_rate_hz
        ))
    })
}

/// Renders `data` through `cb` in blocks no longer than `mono`, which keeps
/// the audio callback free of allocation. Returns the frames rendered.
pub fn render_interleaved<T>(
    cb: &mut dyn AudioRenderCallback,
    sample_time: SampleTime,
    data: &mut [T],
    channels: usize,
    mono: &mut [f32],
) -> u64
where
    T: SizedSample + FromSample<f32>,
{
    if channels == 0 || mono.is_empty() {
        return 0;
    }
    let mut rendered: u64 = 0;
    for chunk in data.chunks_mut(mono.len() * channels) {
        let frames = chunk.len() / channels;
        let block = &mut mono[..frames];
        cb.render(sample_time.saturating_add(rendered), block);
        write_interleaved(chunk, channels, block);
        rendered += frames as u64;
    }
    rendered
}

/// Copies the mono block into every channel of each interleaved frame.
pub fn write_interleaved<T>(data: &mut [T], channels: usize, mono: &[f32])
where
    T: SizedSample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
        let value = T::from_sample(mono.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0));
        out.fill(value);
    }
}
