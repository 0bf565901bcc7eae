use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::{
    f32::consts::PI,
    fs::{self, File},
    io::BufReader,
    path::Path,
    time::Duration,
};

pub const PLACEHOLDER_SAMPLE_RATE: u32 = 44_100;
pub const PLACEHOLDER_SECONDS: u32 = 5;
const PLACEHOLDER_FREQUENCY: f32 = 440.0;
const PLACEHOLDER_VOLUME: f32 = 0.3;
/// (frequency multiplier, gain)
const HARMONICS: [(f32, f32); 4] = [(1.0, 0.5), (2.0, 0.25), (3.0, 0.15), (0.5, 0.1)];
const VIBRATO_DEPTH: f32 = 0.02;
const VIBRATO_RATE: f32 = 5.0;

pub struct AudioPlayer {
    _stream: OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<Sink>,
}

unsafe impl Send for AudioPlayer {}
unsafe impl Sync for AudioPlayer {}

impl AudioPlayer {
    pub fn new() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to open audio output")?;
        Ok(Self { _stream: stream, handle, sink: None })
    }

    pub fn play(&mut self, path: &Path) -> Result<()> {
        self.stop();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let decoder = Decoder::new(BufReader::new(file)).context("failed to decode audio")?;
        let sink = Sink::try_new(&self.handle).context("failed to create audio sink")?;
        sink.append(decoder);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.sink.as_ref().map(|sink| !sink.empty()).unwrap_or(false)
    }
}

pub fn audio_duration(path: &Path) -> Result<Duration> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let decoder = Decoder::new(BufReader::new(file)).context("failed to decode audio")?;
    if let Some(duration) = decoder.total_duration() {
        return Ok(duration);
    }
    wav_duration(path).ok_or_else(|| anyhow!("unable to determine duration for {}", path.display()))
}

fn wav_duration(path: &Path) -> Option<Duration> {
    let reader = WavReader::open(path).ok()?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Some(Duration::from_secs_f64(frames / spec.sample_rate as f64))
}

/// Placeholder tone: 440 Hz with a few harmonics, slight vibrato, a quarter
/// second attack and a half second release.
pub fn placeholder_samples() -> Vec<i16> {
    let total = (PLACEHOLDER_SAMPLE_RATE * PLACEHOLDER_SECONDS) as usize;
    let duration = PLACEHOLDER_SECONDS as f32;
    (0..total)
        .map(|index| {
            let t = index as f32 / PLACEHOLDER_SAMPLE_RATE as f32;
            let attack = (t * 4.0).min(1.0);
            let release = (1.0 - (t - duration + 0.5) * 2.0).clamp(0.0, 1.0);
            let tone: f32 = HARMONICS
                .iter()
                .map(|(multiple, gain)| (2.0 * PI * PLACEHOLDER_FREQUENCY * multiple * t).sin() * gain)
                .sum();
            let vibrato = (2.0 * PI * VIBRATO_RATE * t).sin() * VIBRATO_DEPTH;
            let sample = tone * (1.0 + vibrato) * attack * release * PLACEHOLDER_VOLUME;
            (sample * i16::MAX as f32).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Writes the placeholder tone as 16-bit mono WAV and returns the file size.
pub fn write_placeholder_wav(path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let spec = WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for sample in placeholder_samples() {
        writer.write_sample(sample).context("failed to write placeholder sample")?;
    }
    writer.finalize().context("failed to finalize placeholder audio")?;
    let size = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    Ok(size)
}
