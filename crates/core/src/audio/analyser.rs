use std::{
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use super::AnalyserTap;
use crate::{
    config::{clamp_smoothing, AnalyserConfig},
    Result, VizError,
};

const MAGNITUDE_EPSILON: f32 = 1.0e-12;

/// Windowed FFT analyser fed with PCM blocks: keeps the newest `fft_size`
/// samples, and on each read produces time-smoothed magnitudes in decibels.
pub struct FftAnalyser {
    config: AnalyserConfig,
    history: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: FftResources,
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FftAnalyser {
    pub fn new(config: AnalyserConfig) -> Self {
        let config = config.normalized();
        let size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let fft = FftResources {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        };

        Self {
            config,
            history: vec![0.0; size],
            write_pos: 0,
            window: (0..size).map(|i| blackman_value(i, size)).collect(),
            smoothed: vec![0.0; size / 2],
            fft,
        }
    }

    pub fn config(&self) -> AnalyserConfig {
        self.config
    }

    /// Appends mono samples, overwriting the oldest history.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let size = self.history.len();
        let skip = samples.len().saturating_sub(size);
        for sample in &samples[skip..] {
            self.history[self.write_pos] = *sample;
            self.write_pos = (self.write_pos + 1) % size;
        }
    }

    /// Clears history and smoothing state.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }

    fn analyse(&mut self, out: &mut [f32]) -> Result<()> {
        let size = self.history.len();
        for (index, slot) in self.fft.input.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + index) % size];
            *slot = sample * self.window[index];
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let tau = self.config.smoothing;
        let scale = 1.0 / size as f32;
        for (index, bin) in self.fft.spectrum.iter().take(self.smoothed.len()).enumerate() {
            let magnitude = bin.norm() * scale;
            let previous = self.smoothed[index];
            let value = tau * previous + (1.0 - tau) * magnitude;
            self.smoothed[index] = if value.is_finite() { value } else { 0.0 };
        }

        for (dst, magnitude) in out.iter_mut().zip(&self.smoothed) {
            *dst = if *magnitude <= MAGNITUDE_EPSILON {
                f32::NEG_INFINITY
            } else {
                20.0 * magnitude.log10()
            };
        }
        Ok(())
    }

    fn latest_samples(&self, out: &mut [f32]) {
        let size = self.history.len();
        let count = out.len().min(size);
        let start = (self.write_pos + size - count) % size;
        for (index, dst) in out.iter_mut().take(count).enumerate() {
            *dst = self.history[(start + index) % size];
        }
    }
}

impl AnalyserTap for FftAnalyser {
    fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    fn decibel_range(&self) -> (f32, f32) {
        (self.config.min_decibels, self.config.max_decibels)
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.analyse(out)
    }

    fn time_domain_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.latest_samples(out);
        Ok(())
    }

    fn set_smoothing(&mut self, smoothing: f32) -> Result<()> {
        self.config.smoothing = clamp_smoothing(smoothing);
        Ok(())
    }
}

impl fmt::Debug for FftAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftAnalyser")
            .field("config", &self.config)
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

/// Shared, thread-safe view over an [`FftAnalyser`]. The audio side keeps one
/// clone to push samples while the engine reads through another.
#[derive(Clone)]
pub struct AnalyserHandle {
    shared: Arc<Mutex<FftAnalyser>>,
    bins: usize,
    range: (f32, f32),
}

impl AnalyserHandle {
    pub fn new(config: AnalyserConfig) -> Self {
        let analyser = FftAnalyser::new(config);
        let bins = analyser.bin_count();
        let range = analyser.decibel_range();
        Self {
            shared: Arc::new(Mutex::new(analyser)),
            bins,
            range,
        }
    }

    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.lock()?.push_samples(samples);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, FftAnalyser>> {
        self.shared
            .lock()
            .map_err(|_| VizError::Poisoned("analyser tap"))
    }
}

impl AnalyserTap for AnalyserHandle {
    fn bin_count(&self) -> usize {
        self.bins
    }

    fn decibel_range(&self) -> (f32, f32) {
        self.range
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.lock()?.frequency_data(out)
    }

    fn time_domain_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.lock()?.time_domain_data(out)
    }

    fn set_smoothing(&mut self, smoothing: f32) -> Result<()> {
        self.lock()?.set_smoothing(smoothing)
    }
}

impl fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserHandle")
            .field("bins", &self.bins)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    let alpha = 0.16;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let x = 2.0 * PI * index as f32 / len as f32;
    a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
}
