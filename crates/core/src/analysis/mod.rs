//! Display-bin shaping of raw spectra, and beat tracking.

mod beat;

pub use beat::{beat_energy, BeatDetector, BeatSettings, BeatSnapshot, BeatSource, BeatState};

use serde::{Deserialize, Serialize};

use crate::{
    audio::{Channel, SpectrumSource},
    config::AutoGainConfig,
    scene::{MAX_DECAY, MAX_FLOOR, MIN_DECAY},
};

/// Sampling curve that crowds display bins into the low end (bar layouts).
pub const BAR_GAMMA: f32 = 2.0;
/// Even spread for layouts arranged around a circle.
pub const CIRCULAR_GAMMA: f32 = 1.0;
pub const MAX_EMPHASIS_GAIN: f32 = 3.0;

const LOCAL_RADIUS: isize = 3;
const ANGULAR_KERNEL: [f32; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
const ANGULAR_NORM: f32 = 9.0;
const WAVE_GAIN: f32 = 0.85;
/// Offset added to every waveform bin so closed shapes never collapse.
pub const WAVE_FLOOR: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmphasisMode {
    /// No weighting; uniform visual height across the spectrum.
    #[default]
    Flat,
    /// Blend of low/mid/high gains by triangular membership of bin position.
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmphasisGains {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl Default for EmphasisGains {
    fn default() -> Self {
        Self {
            low: 1.0,
            mid: 1.0,
            high: 1.0,
        }
    }
}

impl EmphasisGains {
    pub fn clamped(low: f32, mid: f32, high: f32) -> Self {
        let clamp = |v: f32| {
            if v.is_finite() {
                v.clamp(0.0, MAX_EMPHASIS_GAIN)
            } else {
                1.0
            }
        };
        Self {
            low: clamp(low),
            mid: clamp(mid),
            high: clamp(high),
        }
    }

    /// Gain at normalized bin position `t` in `0..=1`.
    pub fn weight_at(&self, t: f32) -> f32 {
        let low = (1.0 - 2.0 * t).max(0.0);
        let high = (2.0 * t - 1.0).max(0.0);
        let mid = 1.0 - (2.0 * t - 1.0).abs();
        low * self.low + mid * self.mid + high * self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    pub emphasis_mode: EmphasisMode,
    pub emphasis: EmphasisGains,
    /// Floor used when a request carries none.
    pub default_floor: f32,
    /// Perceptual shaping exponent for mono spectra.
    pub mono_exponent: f32,
    /// Perceptual shaping exponent for true stereo spectra.
    pub stereo_exponent: f32,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            emphasis_mode: EmphasisMode::Flat,
            emphasis: EmphasisGains::default(),
            default_floor: 0.12,
            mono_exponent: 1.08,
            stereo_exponent: 1.06,
        }
    }
}

impl ProcessorSettings {
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.emphasis = EmphasisGains::clamped(self.emphasis.low, self.emphasis.mid, self.emphasis.high);
        self.default_floor = clamp_floor(self.default_floor);
        let exponent = |v: f32, fallback: f32| {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                fallback
            }
        };
        self.mono_exponent = exponent(self.mono_exponent, defaults.mono_exponent);
        self.stereo_exponent = exponent(self.stereo_exponent, defaults.stereo_exponent);
        self
    }
}

fn clamp_floor(floor: f32) -> f32 {
    if floor.is_finite() {
        floor.clamp(0.0, MAX_FLOOR)
    } else {
        0.0
    }
}

/// Per-call shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumRequest {
    pub bins: usize,
    pub gamma: f32,
    /// Overrides [`ProcessorSettings::default_floor`].
    pub floor: Option<f32>,
    /// Peak-hold decay per frame, in `(0, 1)`.
    pub decay: f32,
}

impl SpectrumRequest {
    pub fn new(bins: usize, gamma: f32) -> Self {
        Self {
            bins,
            gamma,
            floor: None,
            decay: 0.92,
        }
    }

    pub fn floor(mut self, floor: f32) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }
}

/// Display-bin levels, their peak-held counterparts and the frame gain. The
/// buffers persist across frames; peaks reset only when the bin count changes.
#[derive(Debug, Clone, Default)]
pub struct SpectrumFrame {
    levels: Vec<f32>,
    peaks: Vec<f32>,
    gain: f32,
}

impl SpectrumFrame {
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Mean level across all bins.
    pub fn average(&self) -> f32 {
        if self.levels.is_empty() {
            0.0
        } else {
            self.levels.iter().sum::<f32>() / self.levels.len() as f32
        }
    }

    fn hold_peaks(&mut self, decay: f32) {
        if self.peaks.len() != self.levels.len() {
            self.peaks.clear();
            self.peaks.resize(self.levels.len(), 0.0);
        }
        let decay = if decay.is_finite() {
            decay.clamp(MIN_DECAY, MAX_DECAY)
        } else {
            0.92
        };
        for (peak, level) in self.peaks.iter_mut().zip(&self.levels) {
            *peak = (*peak * decay).max(*level);
        }
    }

    fn copy_half(&mut self, source: &SpectrumFrame, range: std::ops::Range<usize>) {
        self.levels.clear();
        self.levels.extend_from_slice(&source.levels[range.clone()]);
        self.peaks.clear();
        self.peaks.extend_from_slice(&source.peaks[range]);
        self.gain = source.gain;
    }
}

/// Left and right display-bin frames.
#[derive(Debug, Clone, Default)]
pub struct StereoFrame {
    pub left: SpectrumFrame,
    pub right: SpectrumFrame,
    /// Double-width mono frame split into halves when no stereo pair exists.
    mono: SpectrumFrame,
}

/// Remaps raw normalized magnitudes into display bins.
#[derive(Debug, Clone, Default)]
pub struct SpectrumProcessor {
    settings: ProcessorSettings,
    gain: AutoGainConfig,
    scratch: Vec<f32>,
}

impl SpectrumProcessor {
    pub fn new(settings: ProcessorSettings, gain: AutoGainConfig) -> Self {
        Self {
            settings: settings.normalized(),
            gain: gain.normalized(),
            scratch: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn set_emphasis_mode(&mut self, mode: EmphasisMode) {
        self.settings.emphasis_mode = mode;
    }

    pub fn set_emphasis(&mut self, low: f32, mid: f32, high: f32) {
        self.settings.emphasis = EmphasisGains::clamped(low, mid, high);
    }

    /// Shapes `raw` (normalized `0..1` magnitudes) into `request.bins` levels
    /// and advances the frame's peak-hold.
    pub fn spectrum(&mut self, raw: &[f32], request: SpectrumRequest, frame: &mut SpectrumFrame) {
        let exponent = self.settings.mono_exponent;
        self.shape(raw, request, exponent, frame);
    }

    /// Left/right frames of `request.bins` each. Without a stereo pair, a mono
    /// spectrum of twice the width is split into halves.
    pub fn stereo_spectrum(
        &mut self,
        source: &SpectrumSource,
        request: SpectrumRequest,
        frame: &mut StereoFrame,
    ) {
        let bins = request.bins.max(1);
        if source.has_stereo() {
            let exponent = self.settings.stereo_exponent;
            self.shape(source.magnitudes(Channel::Left), request, exponent, &mut frame.left);
            self.shape(source.magnitudes(Channel::Right), request, exponent, &mut frame.right);
            return;
        }

        let wide = SpectrumRequest {
            bins: bins * 2,
            ..request
        };
        self.spectrum(source.magnitudes(Channel::Mono), wide, &mut frame.mono);
        frame.left.copy_half(&frame.mono, 0..bins);
        frame.right.copy_half(&frame.mono, bins..bins * 2);
    }

    /// Prepares a time-domain deviation buffer for drawing: nearest-sample
    /// remap, local smoothing, a small floor, then circular 3-tap smoothing.
    pub fn waveform(&mut self, deviation: &[f32], bins: usize, out: &mut Vec<f32>) {
        let bins = bins.max(1);
        out.clear();
        out.resize(bins, WAVE_FLOOR);
        if deviation.is_empty() {
            return;
        }

        self.scratch.clear();
        self.scratch.resize(bins, 0.0);
        let len = deviation.len();
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let t = position(i, bins);
            let index = ((t * (len - 1) as f32).floor() as usize).min(len - 1);
            *slot = local_average(deviation, index) * WAVE_GAIN + WAVE_FLOOR;
        }

        for (i, slot) in out.iter_mut().enumerate() {
            let prev = self.scratch[wrap(i as isize - 1, bins)];
            let next = self.scratch[wrap(i as isize + 1, bins)];
            *slot = (prev + self.scratch[i] + next) / 3.0;
        }
    }

    fn shape(&mut self, raw: &[f32], request: SpectrumRequest, exponent: f32, frame: &mut SpectrumFrame) {
        let bins = request.bins.max(1);
        let floor = clamp_floor(request.floor.unwrap_or(self.settings.default_floor));
        let gamma = if request.gamma.is_finite() && request.gamma > 0.0 {
            request.gamma
        } else {
            CIRCULAR_GAMMA
        };

        let peak = raw
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0_f32, f32::max);
        let gain = self.gain.gain_for(peak);

        self.scratch.clear();
        self.scratch.resize(bins, 0.0);
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let t = position(i, bins);
            let mut v = if raw.is_empty() {
                0.0
            } else {
                local_average(raw, raw_index(i, bins, gamma, raw.len()))
            };

            if self.settings.emphasis_mode == EmphasisMode::Weighted {
                v *= self.settings.emphasis.weight_at(t);
            }

            let shaped = (v.max(0.0).powf(exponent) * gain).min(1.0);
            *slot = floor + shaped * (1.0 - floor);
        }

        frame.levels.clear();
        frame.levels.resize(bins, 0.0);
        for (i, level) in frame.levels.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (offset, weight) in ANGULAR_KERNEL.iter().enumerate() {
                acc += self.scratch[wrap(i as isize + offset as isize - 2, bins)] * weight;
            }
            *level = (acc / ANGULAR_NORM).clamp(0.0, 1.0);
        }
        frame.gain = gain;
        frame.hold_peaks(request.decay);
    }
}

/// Raw index sampled for display bin `i` of `bins`.
pub fn raw_index(i: usize, bins: usize, gamma: f32, raw_len: usize) -> usize {
    if raw_len == 0 {
        return 0;
    }
    let t = position(i, bins);
    ((t.powf(gamma) * (raw_len - 1) as f32).floor() as usize).min(raw_len - 1)
}

fn position(i: usize, bins: usize) -> f32 {
    if bins > 1 {
        i as f32 / (bins - 1) as f32
    } else {
        0.0
    }
}

fn local_average(values: &[f32], center: usize) -> f32 {
    let last = values.len() as isize - 1;
    let mut acc = 0.0;
    for offset in -LOCAL_RADIUS..=LOCAL_RADIUS {
        let k = (center as isize + offset).clamp(0, last) as usize;
        let v = values[k];
        acc += if v.is_finite() { v } else { 0.0 };
    }
    acc / (2 * LOCAL_RADIUS + 1) as f32
}

fn wrap(index: isize, len: usize) -> usize {
    index.rem_euclid(len as isize) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StaticTap;

    fn processor() -> SpectrumProcessor {
        SpectrumProcessor::new(ProcessorSettings::default(), AutoGainConfig::default())
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    #[test]
    fn returns_requested_bin_count_in_unit_range() {
        let mut processor = processor();
        let raw = ramp(1024);
        for bins in [24, 25, 96, 180, 240, 1000] {
            let mut frame = SpectrumFrame::default();
            processor.spectrum(&raw, SpectrumRequest::new(bins, BAR_GAMMA), &mut frame);
            assert_eq!(frame.len(), bins);
            assert_eq!(frame.peaks().len(), bins);
            assert!(frame.levels().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn silence_yields_the_floor() {
        let mut processor = processor();
        let raw = vec![0.0; 512];
        for floor in [0.0, 0.1, 0.16, 0.25, 0.4] {
            let mut frame = SpectrumFrame::default();
            processor.spectrum(&raw, SpectrumRequest::new(64, CIRCULAR_GAMMA).floor(floor), &mut frame);
            assert!(frame.levels().iter().all(|v| (v - floor).abs() < 1e-5));
            assert!((frame.gain() - 1.0 / 0.35).abs() < 1e-4);
        }
    }

    #[test]
    fn peaks_decay_but_never_below_level() {
        let mut processor = processor();
        let loud = vec![0.9; 256];
        let quiet = vec![0.05; 256];
        for decay in [0.3, 0.5, 0.92, 0.99] {
            let mut frame = SpectrumFrame::default();
            processor.spectrum(&loud, SpectrumRequest::new(32, 1.0).decay(decay), &mut frame);
            for _ in 0..5 {
                let previous = frame.peaks().to_vec();
                processor.spectrum(&quiet, SpectrumRequest::new(32, 1.0).decay(decay), &mut frame);
                for ((peak, prev), level) in frame.peaks().iter().zip(&previous).zip(frame.levels()) {
                    assert!(*peak >= prev * decay - 1e-6);
                    assert!(*peak >= *level - 1e-6);
                }
            }
        }
    }

    #[test]
    fn angular_smoothing_spreads_single_spikes() {
        let mut processor = processor();
        let mut raw = vec![0.0; 9];
        raw[4] = 1.0;
        let mut frame = SpectrumFrame::default();
        processor.spectrum(&raw, SpectrumRequest::new(9, 1.0).floor(0.0), &mut frame);
        let levels = frame.levels();
        assert!(levels[4] < 1.0);
        assert!(levels[0] > 0.0, "circular kernel wraps to the first bin");
        assert!((levels[0] - levels[8]).abs() < 1e-6);
    }

    #[test]
    fn gamma_crowds_low_frequencies() {
        assert_eq!(raw_index(0, 96, BAR_GAMMA, 1024), 0);
        assert_eq!(raw_index(95, 96, BAR_GAMMA, 1024), 1023);
        assert!(raw_index(48, 96, BAR_GAMMA, 1024) < raw_index(48, 96, CIRCULAR_GAMMA, 1024));
    }

    #[test]
    fn weighted_emphasis_blends_bands() {
        let gains = EmphasisGains::clamped(2.0, 1.0, 0.5);
        assert!((gains.weight_at(0.0) - 2.0).abs() < 1e-6);
        assert!((gains.weight_at(0.5) - 1.0).abs() < 1e-6);
        assert!((gains.weight_at(1.0) - 0.5).abs() < 1e-6);
        assert!((gains.weight_at(0.25) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn mono_fallback_splits_into_halves() {
        let mut processor = processor();
        let mut source = SpectrumSource::new(StaticTap::constant(256, 0.5));
        source.refresh().unwrap();

        let mut stereo = StereoFrame::default();
        processor.stereo_spectrum(&source, SpectrumRequest::new(90, 1.0), &mut stereo);
        assert_eq!(stereo.left.len(), 90);
        assert_eq!(stereo.right.len(), 90);
        assert_eq!(stereo.left.gain(), stereo.right.gain());
    }

    #[test]
    fn waveform_has_floor_and_requested_length() {
        let mut processor = processor();
        let mut out = Vec::new();
        processor.waveform(&[0.0; 128], 240, &mut out);
        assert_eq!(out.len(), 240);
        assert!(out.iter().all(|v| (v - WAVE_FLOOR).abs() < 1e-6));

        processor.waveform(&[1.0; 128], 16, &mut out);
        assert!(out.iter().all(|v| (v - (WAVE_GAIN + WAVE_FLOOR)).abs() < 1e-5));
    }
}
