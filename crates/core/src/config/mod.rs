use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{BeatSettings, ProcessorSettings},
    scene::{EngineDefaults, Layer},
    Result,
};

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;
pub const MIN_SMOOTHING: f32 = 0.5;
pub const MAX_SMOOTHING: f32 = 0.95;

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analyser: AnalyserConfig,
    pub gain: AutoGainConfig,
    pub governor: GovernorConfig,
    pub processor: ProcessorSettings,
    pub beat: BeatSettings,
    pub defaults: EngineDefaults,
    pub layers: Vec<Layer>,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Reads a JSON preset from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Forces every section into its documented range.
    pub fn normalized(mut self) -> Self {
        self.analyser = self.analyser.normalized();
        self.gain = self.gain.normalized();
        self.governor = self.governor.normalized();
        self.processor = self.processor.normalized();
        self.beat = self.beat.normalized();
        self.defaults = self.defaults.normalized();
        self.layers = self.layers.iter().map(Layer::normalized).collect();
        self
    }
}

/// Tuning for the FFT analyser taps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    /// Time smoothing of magnitudes between analyses.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -90.0,
            max_decibels: -10.0,
        }
    }
}

impl AnalyserConfig {
    pub fn normalized(mut self) -> Self {
        self.fft_size = self
            .fft_size
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
            .next_power_of_two();
        self.smoothing = clamp_smoothing(self.smoothing);

        let defaults = Self::default();
        if !self.min_decibels.is_finite() || !self.max_decibels.is_finite() {
            self.min_decibels = defaults.min_decibels;
            self.max_decibels = defaults.max_decibels;
        }
        if self.max_decibels <= self.min_decibels {
            self.max_decibels = self.min_decibels + 1.0;
        }
        self
    }
}

pub fn clamp_smoothing(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(MIN_SMOOTHING, MAX_SMOOTHING)
    } else {
        AnalyserConfig::default().smoothing
    }
}

/// Adaptive gain constants: `gain = 1 / max(min_peak, peak + headroom)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoGainConfig {
    pub min_peak: f32,
    pub headroom: f32,
}

impl Default for AutoGainConfig {
    fn default() -> Self {
        Self {
            min_peak: 0.35,
            headroom: 0.05,
        }
    }
}

impl AutoGainConfig {
    pub fn normalized(mut self) -> Self {
        if !self.min_peak.is_finite() || self.min_peak <= 0.0 {
            self.min_peak = Self::default().min_peak;
        }
        if !self.headroom.is_finite() || self.headroom < 0.0 {
            self.headroom = Self::default().headroom;
        }
        self
    }

    /// Gain for a frame whose loudest normalized bin is `peak`. Bounded above
    /// by `1 / min_peak`, so silence never divides by zero.
    pub fn gain_for(&self, peak: f32) -> f32 {
        let peak = if peak.is_finite() { peak.max(0.0) } else { 0.0 };
        1.0 / self.min_peak.max(peak + self.headroom)
    }
}

/// Per-frame cost model and degradation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub cost_ceiling: f32,
    /// Cost per segment of a circular layer.
    pub segment_cost: f32,
    pub flat_cost: f32,
    pub fast_bin_scale: f32,
    pub performance_bin_scale: f32,
    pub min_bins: usize,
    pub fast_glow_cap: f32,
    pub fast_trail_cap: f32,
    pub frame_interval_ms: u64,
    pub performance_frame_interval_ms: u64,
    pub max_particles: usize,
    /// Fraction of `max_particles` kept in performance mode.
    pub performance_particle_scale: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: 360.0,
            segment_cost: 180.0,
            flat_cost: 120.0,
            fast_bin_scale: 0.7,
            performance_bin_scale: 0.6,
            min_bins: 24,
            fast_glow_cap: 6.0,
            fast_trail_cap: 0.04,
            frame_interval_ms: 16,
            performance_frame_interval_ms: 33,
            max_particles: 200,
            performance_particle_scale: 0.6,
        }
    }
}

impl GovernorConfig {
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        let positive = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let unit = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 && value <= 1.0 {
                value
            } else {
                fallback
            }
        };

        self.cost_ceiling = positive(self.cost_ceiling, defaults.cost_ceiling);
        self.segment_cost = positive(self.segment_cost, defaults.segment_cost);
        self.flat_cost = positive(self.flat_cost, defaults.flat_cost);
        self.fast_bin_scale = unit(self.fast_bin_scale, defaults.fast_bin_scale);
        self.performance_bin_scale =
            unit(self.performance_bin_scale, defaults.performance_bin_scale);
        self.min_bins = self.min_bins.max(defaults.min_bins);
        self.fast_glow_cap = positive(self.fast_glow_cap, defaults.fast_glow_cap);
        self.fast_trail_cap = unit(self.fast_trail_cap, defaults.fast_trail_cap);
        self.performance_particle_scale =
            unit(self.performance_particle_scale, defaults.performance_particle_scale);
        self.performance_frame_interval_ms = self
            .performance_frame_interval_ms
            .max(self.frame_interval_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r##"{
                "analyser": { "fft_size": 1000 },
                "defaults": { "style": "radial", "thickness": 9.0, "color1": "#ff0000" },
                "layers": [ { "style": "circle", "overrides": { "segments": 12 } } ]
            }"##,
        )
        .unwrap();

        assert_eq!(config.analyser.fft_size, 1024);
        assert_eq!(config.analyser.smoothing, 0.8);
        assert_eq!(config.defaults.thickness, 4.0);
        assert_eq!(config.defaults.color1.r, 255);
        assert_eq!(config.layers.len(), 1);
        assert!(config.layers[0].visible);
        assert_eq!(config.layers[0].overrides.segments, Some(8));
        assert_eq!(config.governor.cost_ceiling, 360.0);
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig::default();
        let text = config.to_json_string().unwrap();
        let back = EngineConfig::from_json_str(&text).unwrap();
        assert_eq!(back.defaults, config.defaults);
    }

    #[test]
    fn auto_gain_is_bounded_for_silence() {
        let gain = AutoGainConfig::default();
        assert!((gain.gain_for(0.0) - 1.0 / 0.35).abs() < 1e-6);
        assert!((gain.gain_for(0.95) - 1.0).abs() < 1e-6);
        assert!(gain.gain_for(f32::NAN).is_finite());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(EngineConfig::from_json_str("{ not json").is_err());
    }
}
