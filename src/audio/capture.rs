//! Microphone capture using CPAL.

use crate::audio::source::SampleSource;
use crate::audio::wav::{downmix, resample};
use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::pipeline::queue::ChunkProducer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// ALSA and JACK print probe failures straight to fd 2 while CPAL enumerates
/// backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on fd 2. No other thread may touch fd 2
/// while the closure runs.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Quiet JACK and PipeWire before the audio backends are first probed.
///
/// # Safety
/// Mutates the process environment; call before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: called from main before any worker thread exists
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Sound-server devices that follow the desktop's input selection.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name fragments that never carry a microphone.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// How long to wait for the first callback before falling back to the
/// device's native format.
const FIRST_CALLBACK_WAIT: Duration = Duration::from_millis(200);

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Input devices usable for voice, preferred ones marked `[recommended]`.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host;
    let devices = devices.map_err(|e| VoxgateError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else {
            continue;
        };
        if should_filter_device(&name) {
            continue;
        }
        if is_preferred_device(&name) {
            names.push(format!("{} [recommended]", name));
        } else {
            names.push(name);
        }
    }
    Ok(names)
}

/// A sound-server device if there is one, else the host default.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }
        host.default_input_device()
            .ok_or_else(|| VoxgateError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

fn find_device(name: &str) -> Result<cpal::Device> {
    // `list_devices` decorates names; accept them as typed back.
    let wanted = name.trim_end_matches(" [recommended]");
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;
        for device in devices {
            if let Ok(device_name) = device.name()
                && device_name == wanted
            {
                return Ok(device);
            }
        }
        Err(VoxgateError::AudioDeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// Makes `cpal::Stream` movable across threads.
///
/// SAFETY: the stream is only touched from `start`/`stop`, which take
/// `&mut self`, so it is never used from two threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

type SharedProducer = Arc<Mutex<Option<ChunkProducer>>>;

/// Live microphone input delivering mono f32 samples at the pipeline rate.
///
/// Asks the device for f32/16 kHz/mono first, then i16 at the same format,
/// and finally captures at the native rate and channel count, converting in
/// software.
pub struct CpalSampleSource {
    device: cpal::Device,
    device_name: String,
    stream: Option<SendableStream>,
    producer: SharedProducer,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalSampleSource {
    /// Open `device_name`, or the best default input when `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = match device_name {
            Some(name) => find_device(name)?,
            None => best_default_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            device,
            device_name,
            stream: None,
            producer: Arc::new(Mutex::new(None)),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn error_callback() -> impl FnMut(cpal::StreamError) + Send + 'static {
        |err| tracing::error!("audio stream error: {}", err)
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let producer = Arc::clone(&self.producer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                deliver(&producer, data);
            },
            Self::error_callback(),
            None,
        ) {
            return Ok(stream);
        }

        let producer = Arc::clone(&self.producer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                let samples: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                deliver(&producer, &samples);
            },
            Self::error_callback(),
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Capture at the device's default config and convert in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VoxgateError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            device = %self.device_name,
            channels,
            rate = native_rate,
            format = ?default_config.sample_format(),
            "using native capture format, converting in software"
        );

        let producer = Arc::clone(&self.producer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted = to_pipeline_format(data, channels, native_rate, target_rate);
                        deliver(&producer, &converted);
                    },
                    Self::error_callback(),
                    None,
                )
                .map_err(|e| VoxgateError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let floats: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                        let converted =
                            to_pipeline_format(&floats, channels, native_rate, target_rate);
                        deliver(&producer, &converted);
                    },
                    Self::error_callback(),
                    None,
                )
                .map_err(|e| VoxgateError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            fmt => Err(VoxgateError::AudioFormatMismatch {
                expected: "f32 or i16 samples".to_string(),
                actual: format!("{:?}", fmt),
            }),
        }
    }
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Mix down to mono and resample to the pipeline rate.
fn to_pipeline_format(
    samples: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let mono = downmix(samples, channels);
    if source_rate == target_rate {
        mono
    } else {
        resample(&mono, source_rate, target_rate)
    }
}

/// Hand samples to the queue from the audio callback.
///
/// `try_lock` keeps the real-time thread from blocking; the lock is only
/// contended while `stop` is taking the producer away.
fn deliver(producer: &SharedProducer, samples: &[f32]) {
    if let Ok(mut guard) = producer.try_lock()
        && let Some(producer) = guard.as_mut()
    {
        producer.push_samples(samples);
    }
}

impl SampleSource for CpalSampleSource {
    fn start(&mut self, producer: ChunkProducer) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if let Ok(mut guard) = self.producer.lock() {
            *guard = Some(producer);
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoxgateError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Some PipeWire ALSA shims accept a non-native config but never call back.
        std::thread::sleep(FIRST_CALLBACK_WAIT);
        let stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            let native = self.build_stream_native()?;
            native.play().map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to start native audio stream: {}", e),
            })?;
            native
        } else {
            stream
        };

        tracing::info!(device = %self.device_name, rate = self.sample_rate, "capture started");
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.0.pause().map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        // Dropping the producer lets the consumer see the channel close.
        if let Ok(mut guard) = self.producer.lock() {
            guard.take();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}
