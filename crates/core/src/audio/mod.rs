//! Live audio taps and the per-frame reader that normalizes them.

mod analyser;

pub use analyser::{AnalyserHandle, FftAnalyser};

use crate::Result;

/// A live analysis tap owned by the host audio graph. The engine only reads
/// from it, once per frame.
pub trait AnalyserTap {
    /// Number of frequency bins (and time-domain samples) one read yields.
    fn bin_count(&self) -> usize;

    /// Decibel range `(min, max)` mapped onto `0..1`.
    fn decibel_range(&self) -> (f32, f32);

    /// Fills `out` with per-bin magnitudes in decibels.
    fn frequency_data(&mut self, out: &mut [f32]) -> Result<()>;

    /// Fills `out` with the latest samples in `-1..1`.
    fn time_domain_data(&mut self, out: &mut [f32]) -> Result<()>;

    /// Time smoothing applied by the tap between analyses.
    fn set_smoothing(&mut self, _smoothing: f32) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Mono,
    Left,
    Right,
}

/// Maps a decibel reading onto `0..1`. Non-finite readings count as silence.
pub fn normalize_db(db: f32, min: f32, max: f32) -> f32 {
    let v = (db - min) / (max - min);
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Default)]
struct ChannelBuffers {
    decibels: Vec<f32>,
    magnitudes: Vec<f32>,
    samples: Vec<f32>,
    deviation: Vec<f32>,
}

impl ChannelBuffers {
    fn read(&mut self, tap: &mut dyn AnalyserTap) -> Result<()> {
        let count = tap.bin_count();
        self.decibels.resize(count, 0.0);
        self.magnitudes.resize(count, 0.0);
        self.samples.resize(count, 0.0);
        self.deviation.resize(count, 0.0);

        tap.frequency_data(&mut self.decibels)?;
        tap.time_domain_data(&mut self.samples)?;

        let (min, max) = tap.decibel_range();
        for (out, db) in self.magnitudes.iter_mut().zip(&self.decibels) {
            *out = normalize_db(*db, min, max);
        }
        for (out, sample) in self.deviation.iter_mut().zip(&self.samples) {
            *out = if sample.is_finite() {
                sample.abs().min(1.0)
            } else {
                0.0
            };
        }
        Ok(())
    }
}

/// Reads one required mono tap and an optional stereo pair into reusable,
/// normalized buffers.
pub struct SpectrumSource {
    mono: Box<dyn AnalyserTap>,
    stereo: Option<(Box<dyn AnalyserTap>, Box<dyn AnalyserTap>)>,
    mono_buffers: ChannelBuffers,
    left_buffers: ChannelBuffers,
    right_buffers: ChannelBuffers,
}

impl SpectrumSource {
    pub fn new(mono: impl AnalyserTap + 'static) -> Self {
        Self {
            mono: Box::new(mono),
            stereo: None,
            mono_buffers: ChannelBuffers::default(),
            left_buffers: ChannelBuffers::default(),
            right_buffers: ChannelBuffers::default(),
        }
    }

    pub fn with_stereo(
        mut self,
        left: impl AnalyserTap + 'static,
        right: impl AnalyserTap + 'static,
    ) -> Self {
        self.set_stereo(Some((Box::new(left), Box::new(right))));
        self
    }

    pub fn set_stereo(&mut self, taps: Option<(Box<dyn AnalyserTap>, Box<dyn AnalyserTap>)>) {
        self.stereo = taps;
        if self.stereo.is_none() {
            self.left_buffers = ChannelBuffers::default();
            self.right_buffers = ChannelBuffers::default();
        }
    }

    pub fn has_stereo(&self) -> bool {
        self.stereo.is_some()
    }

    /// Reads every wired tap. Called once at the start of each frame.
    pub fn refresh(&mut self) -> Result<()> {
        self.mono_buffers.read(self.mono.as_mut())?;
        if let Some((left, right)) = self.stereo.as_mut() {
            self.left_buffers.read(left.as_mut())?;
            self.right_buffers.read(right.as_mut())?;
        }
        Ok(())
    }

    /// Normalized `0..1` magnitudes. Left/right fall back to mono when no
    /// stereo pair is wired.
    pub fn magnitudes(&self, channel: Channel) -> &[f32] {
        &self.buffers(channel).magnitudes
    }

    /// Time-domain waveform as `0..1` deviation from center.
    pub fn waveform(&self, channel: Channel) -> &[f32] {
        &self.buffers(channel).deviation
    }

    /// Forwards the smoothing constant to every wired tap.
    pub fn set_smoothing(&mut self, smoothing: f32) -> Result<()> {
        self.mono.set_smoothing(smoothing)?;
        if let Some((left, right)) = self.stereo.as_mut() {
            left.set_smoothing(smoothing)?;
            right.set_smoothing(smoothing)?;
        }
        Ok(())
    }

    fn buffers(&self, channel: Channel) -> &ChannelBuffers {
        match (channel, self.stereo.is_some()) {
            (Channel::Left, true) => &self.left_buffers,
            (Channel::Right, true) => &self.right_buffers,
            _ => &self.mono_buffers,
        }
    }
}

impl std::fmt::Debug for SpectrumSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumSource")
            .field("bins", &self.mono.bin_count())
            .field("stereo", &self.stereo.is_some())
            .finish()
    }
}

/// Tap that replays fixed decibel and sample buffers. Useful for hosts that
/// analyse audio elsewhere and for tests.
#[derive(Debug, Clone)]
pub struct StaticTap {
    pub decibels: Vec<f32>,
    pub samples: Vec<f32>,
    pub range: (f32, f32),
}

impl StaticTap {
    pub fn new(decibels: Vec<f32>, samples: Vec<f32>) -> Self {
        Self {
            decibels,
            samples,
            range: (-90.0, -10.0),
        }
    }

    /// A tap of `bins` bins at a constant normalized level.
    pub fn constant(bins: usize, level: f32) -> Self {
        let (min, max) = (-90.0, -10.0);
        Self::new(vec![min + (max - min) * level; bins], vec![0.0; bins])
    }
}

impl AnalyserTap for StaticTap {
    fn bin_count(&self) -> usize {
        self.decibels.len()
    }

    fn decibel_range(&self) -> (f32, f32) {
        self.range
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> Result<()> {
        for (dst, src) in out.iter_mut().zip(&self.decibels) {
            *dst = *src;
        }
        Ok(())
    }

    fn time_domain_data(&mut self, out: &mut [f32]) -> Result<()> {
        for (index, dst) in out.iter_mut().enumerate() {
            *dst = self.samples.get(index).copied().unwrap_or(0.0);
        }
        Ok(())
    }
}
