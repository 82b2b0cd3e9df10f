//! Audio capture and WAV I/O for the `record_audio`/`analyze_audio`
//! tools. Grounded in the teacher's `audio.rs`, which pairs a
//! `hound::WavWriter` with resampling; this module swaps the teacher's
//! file-to-file resampling pipeline for a live `cpal` capture feeding a
//! writer directly, since there is no recorded source file to resample
//! from here.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no default input device available")]
    NoInputDevice,
    #[error("cpal device error: {0}")]
    Device(#[from] cpal::DeviceNameError),
    #[error("cpal stream build error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("cpal stream play error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("cpal default stream config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("wav I/O error: {0}")]
    Wav(#[from] hound::Error),
}

/// Record from the system's default input device for `duration` and
/// write the captured mono signal to `path` as a 16-bit PCM WAV at
/// `sample_rate`. Blocking; callers on an async runtime should run this
/// via `spawn_blocking`.
pub fn record_to_wav(path: &Path, duration: Duration, sample_rate: u32) -> Result<(), AudioError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;
    let config = device.default_input_config()?;
    let channels = config.channels() as usize;

    let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
    let samples_for_callback = samples.clone();

    let stream = device.build_input_stream(
        &config.config(),
        move |data: &[f32], _| {
            let mut buf = samples_for_callback.lock().unwrap();
            if channels <= 1 {
                buf.extend_from_slice(data);
            } else {
                buf.extend(data.chunks(channels).map(|frame| {
                    frame.iter().sum::<f32>() / frame.len() as f32
                }));
            }
        },
        |err| tracing::warn!(%err, "cpal input stream error"),
        None,
    )?;
    stream.play()?;
    std::thread::sleep(duration);
    drop(stream);

    let captured = samples.lock().unwrap();
    write_wav(path, &captured, sample_rate)
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        let clamped = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(clamped)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file's samples as mono `f32` in `[-1.0, 1.0]`, averaging
/// channels down if the file is not already mono.
pub fn read_wav_mono(path: &str) -> Result<Vec<f32>, AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if channels <= 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn write_and_read_mono_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        write_wav(file.path(), &samples, 48_000).unwrap();

        let read_back = read_wav_mono(file.path().to_str().unwrap()).unwrap();
        assert_eq!(read_back.len(), samples.len());
        for (a, b) in samples.iter().zip(read_back.iter()) {
            assert!((a - b).abs() < 0.01, "{a} vs {b}");
        }
    }
}
