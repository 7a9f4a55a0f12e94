use std::{cmp::Ordering, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::VizError;

const INTERVAL_SLOTS: usize = 12;
/// Shortest inter-beat interval used for tempo (240 BPM).
pub const MIN_BEAT_INTERVAL: f64 = 0.25;
/// Longest inter-beat interval used for tempo (24 BPM).
pub const MAX_BEAT_INTERVAL: f64 = 2.5;
/// Energy must fall below `threshold * RELEASE_RATIO` before the next crossing.
const RELEASE_RATIO: f32 = 0.9;

pub const MIN_SENSITIVITY: f32 = 0.2;
pub const MAX_SENSITIVITY: f32 = 2.5;
pub const MAX_BOOST: f32 = 2.5;
pub const MAX_THRESHOLD: f32 = 0.6;
pub const MAX_PULSE_WIDTH: f32 = 3.0;

/// Spectral weighting used to summarise a frame into beat energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatSource {
    #[default]
    Avg,
    Low,
    Mid,
    High,
}

impl BeatSource {
    fn weight(self, pos: f32) -> f32 {
        match self {
            BeatSource::Avg => 1.0,
            BeatSource::Low => 1.0 - pos,
            BeatSource::Mid => 1.0 - (2.0 * pos - 1.0).abs(),
            BeatSource::High => pos,
        }
    }
}

impl FromStr for BeatSource {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" => Ok(BeatSource::Avg),
            "low" => Ok(BeatSource::Low),
            "mid" => Ok(BeatSource::Mid),
            "high" => Ok(BeatSource::High),
            _ => Err(VizError::InvalidInput("beat source must be avg, low, mid or high")),
        }
    }
}

/// Weighted average of normalized magnitudes.
pub fn beat_energy(magnitudes: &[f32], source: BeatSource) -> f32 {
    let len = magnitudes.len();
    if len == 0 {
        return 0.0;
    }

    let mut weighted = 0.0;
    let mut total = 0.0;
    for (index, value) in magnitudes.iter().enumerate() {
        let pos = if len > 1 {
            index as f32 / (len - 1) as f32
        } else {
            0.5
        };
        let weight = source.weight(pos);
        weighted += weight * if value.is_finite() { *value } else { 0.0 };
        total += weight;
    }

    if total <= f32::EPSILON {
        0.0
    } else {
        (weighted / total).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSettings {
    pub sensitivity: f32,
    /// Multiplier applied to the beat level by pulse-driven visuals.
    pub boost: f32,
    pub threshold: f32,
    pub decay: f32,
    pub source: BeatSource,
    pub hold_ms: f32,
    pub pulse_width: f32,
    pub bpm_enabled: bool,
    /// Minimum target while a hold window is open.
    pub hold_floor: f32,
}

impl Default for BeatSettings {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            boost: 1.0,
            threshold: 0.08,
            decay: 0.90,
            source: BeatSource::Avg,
            hold_ms: 120.0,
            pulse_width: 1.0,
            bpm_enabled: false,
            hold_floor: 0.5,
        }
    }
}

impl BeatSettings {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let clamp = |v: f32, min: f32, max: f32, fallback: f32| {
            if v.is_finite() {
                v.clamp(min, max)
            } else {
                fallback
            }
        };
        Self {
            sensitivity: clamp(self.sensitivity, MIN_SENSITIVITY, MAX_SENSITIVITY, defaults.sensitivity),
            boost: clamp(self.boost, 0.0, MAX_BOOST, defaults.boost),
            threshold: clamp(self.threshold, 0.0, MAX_THRESHOLD, defaults.threshold),
            decay: clamp(self.decay, 0.0, 1.0, defaults.decay),
            hold_ms: clamp(self.hold_ms, 0.0, f32::MAX, defaults.hold_ms),
            pulse_width: clamp(self.pulse_width, 0.0, MAX_PULSE_WIDTH, defaults.pulse_width),
            hold_floor: clamp(self.hold_floor, 0.0, 1.0, defaults.hold_floor),
            ..self
        }
    }
}

/// Fixed-capacity ring of recent inter-beat intervals, in seconds.
#[derive(Debug, Clone, Copy, Default)]
struct IntervalRing {
    values: [f64; INTERVAL_SLOTS],
    len: usize,
    next: usize,
}

impl IntervalRing {
    fn push(&mut self, interval: f64) {
        self.values[self.next] = interval;
        self.next = (self.next + 1) % INTERVAL_SLOTS;
        self.len = (self.len + 1).min(INTERVAL_SLOTS);
    }

    fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    fn median(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = self.values;
        let sorted = &mut sorted[..self.len];
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = self.len / 2;
        Some(if self.len % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) * 0.5
        } else {
            sorted[mid]
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BeatState {
    /// Smoothed beat level, never negative.
    pub level: f32,
    /// Target the level moved toward on the latest update.
    pub target: f32,
    pub hold_until: Option<f64>,
    pub bpm: Option<u32>,
    /// True on the frame an upward crossing was detected.
    pub onset: bool,
    intervals: IntervalRing,
    last_crossing: Option<f64>,
    armed: bool,
}

impl BeatState {
    pub fn intervals(&self) -> &[f64] {
        self.intervals.as_slice()
    }

    pub fn in_hold(&self, now: f64) -> bool {
        self.hold_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Values renderers read after the once-per-frame update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeatSnapshot {
    pub level: f32,
    /// `level * boost`, the amount beat-driven visuals react by.
    pub pulse: f32,
    pub pulse_width: f32,
    pub onset: bool,
    pub bpm: Option<u32>,
}

/// Hysteresis beat tracker with hold windows and median-interval tempo.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    settings: BeatSettings,
    state: BeatState,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(BeatSettings::default())
    }
}

impl BeatDetector {
    pub fn new(settings: BeatSettings) -> Self {
        Self {
            settings: settings.normalized(),
            state: BeatState {
                armed: true,
                ..Default::default()
            },
        }
    }

    pub fn settings(&self) -> &BeatSettings {
        &self.settings
    }

    pub fn state(&self) -> &BeatState {
        &self.state
    }

    /// Replaces every setting at once, clamping into range.
    pub fn configure(&mut self, settings: BeatSettings) {
        self.settings = settings.normalized();
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.configure(BeatSettings {
            sensitivity: value,
            ..self.settings
        });
    }

    pub fn set_boost(&mut self, value: f32) {
        self.configure(BeatSettings {
            boost: value,
            ..self.settings
        });
    }

    pub fn set_threshold(&mut self, value: f32) {
        self.configure(BeatSettings {
            threshold: value,
            ..self.settings
        });
    }

    pub fn set_decay(&mut self, value: f32) {
        self.configure(BeatSettings {
            decay: value,
            ..self.settings
        });
    }

    pub fn set_source(&mut self, source: BeatSource) {
        self.settings.source = source;
    }

    pub fn set_hold_ms(&mut self, value: f32) {
        self.configure(BeatSettings {
            hold_ms: value,
            ..self.settings
        });
    }

    pub fn set_pulse_width(&mut self, value: f32) {
        self.configure(BeatSettings {
            pulse_width: value,
            ..self.settings
        });
    }

    pub fn set_bpm_enabled(&mut self, enabled: bool) {
        self.settings.bpm_enabled = enabled;
    }

    pub fn reset(&mut self) {
        self.state = BeatState {
            armed: true,
            ..Default::default()
        };
    }

    /// Summarises `magnitudes` with the configured source and updates.
    pub fn update_from_spectrum(&mut self, now: f64, magnitudes: &[f32]) -> BeatSnapshot {
        let energy = beat_energy(magnitudes, self.settings.source);
        self.update(now, energy)
    }

    /// Advances the tracker by one frame. `now` is in seconds and must not go
    /// backwards.
    pub fn update(&mut self, now: f64, energy: f32) -> BeatSnapshot {
        let energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        let settings = self.settings;
        let state = &mut self.state;

        state.onset = false;
        if state.armed && energy > settings.threshold {
            state.armed = false;
            state.onset = true;
            state.hold_until = Some(now + settings.hold_ms as f64 / 1000.0);

            if let Some(last) = state.last_crossing {
                let interval = now - last;
                if (MIN_BEAT_INTERVAL..=MAX_BEAT_INTERVAL).contains(&interval) {
                    state.intervals.push(interval);
                    state.bpm = state
                        .intervals
                        .median()
                        .map(|median| (60.0 / median).round() as u32);
                } else {
                    tracing::trace!(interval, "discarding implausible beat interval");
                }
            }
            state.last_crossing = Some(now);
        } else if !state.armed && energy <= settings.threshold * RELEASE_RATIO {
            state.armed = true;
        }

        let mut target = (energy - settings.threshold).max(0.0) * settings.sensitivity;
        if state.in_hold(now) {
            target = target.max(settings.hold_floor);
        }
        state.target = target;
        state.level = (state.level * settings.decay + target * (1.0 - settings.decay)).max(0.0);

        self.snapshot()
    }

    pub fn snapshot(&self) -> BeatSnapshot {
        BeatSnapshot {
            level: self.state.level,
            pulse: self.state.level * self.settings.boost,
            pulse_width: self.settings.pulse_width,
            onset: self.state.onset,
            bpm: self.bpm(),
        }
    }

    /// Estimated tempo, reported only while BPM display is enabled.
    pub fn bpm(&self) -> Option<u32> {
        if self.settings.bpm_enabled {
            self.state.bpm
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1.0 / 60.0;

    fn detector(threshold: f32, sensitivity: f32) -> BeatDetector {
        let mut detector = BeatDetector::new(BeatSettings::default());
        detector.set_threshold(threshold);
        detector.set_sensitivity(sensitivity);
        detector
    }

    #[test]
    fn energy_below_threshold_keeps_level_at_zero() {
        let mut detector = detector(0.1, 1.0);
        for frame in 0..100 {
            let snapshot = detector.update(frame as f64 * FRAME, 0.05);
            assert_eq!(snapshot.level, 0.0);
        }
    }

    #[test]
    fn burst_rises_then_decays() {
        let mut detector = detector(0.1, 1.0);
        let mut now = 0.0;
        for _ in 0..100 {
            detector.update(now, 0.05);
            now += FRAME;
        }

        let mut previous = 0.0;
        for _ in 0..5 {
            let level = detector.update(now, 0.3).level;
            assert!(level > previous);
            previous = level;
            now += FRAME;
        }
        assert!((previous - 0.2).abs() < 0.03, "level after burst was {previous}");

        // Hold window still open: the pulse is sustained.
        while detector.state().in_hold(now) {
            let level = detector.update(now, 0.05).level;
            assert!(level >= previous);
            previous = level;
            now += FRAME;
        }

        let decay = detector.settings().decay;
        for _ in 0..20 {
            let level = detector.update(now, 0.05).level;
            assert!((level - previous * decay).abs() < 1e-6);
            previous = level;
            now += FRAME;
        }
    }

    // The plateau here is the held target. The level only eases toward it
    // at the configured decay while the window is open.
    #[test]
    fn crossing_holds_the_target_at_the_sustain_floor() {
        let mut detector = detector(0.1, 1.0);
        detector.update(0.0, 0.0);
        let snapshot = detector.update(FRAME, 0.12);
        assert!(snapshot.onset);

        let hold = detector.settings().hold_ms as f64 / 1000.0;
        let mut now = FRAME;
        let mut previous = snapshot.level;
        while now < FRAME + hold {
            assert!(detector.state().target >= detector.settings().hold_floor);
            now += FRAME;
            let level = detector.update(now, 0.0).level;
            if detector.state().in_hold(now) {
                assert!(level > previous);
            }
            previous = level;
        }
        assert!(!detector.state().in_hold(now + FRAME));
    }

    fn pulse_train(detector: &mut BeatDetector, period: f64, pulses: usize) {
        let mut frame = 0usize;
        for pulse in 0..pulses {
            let start = pulse as f64 * period;
            detector.update(start, 0.8);
            let mut now = start + FRAME;
            while now < start + period - FRAME * 0.5 {
                detector.update(now, 0.0);
                now += FRAME;
                frame += 1;
            }
        }
        assert!(frame > 0);
    }

    #[test]
    fn tempo_converges_on_pulse_period() {
        for period in [0.25, 0.3, 0.5, 0.75, 1.2, 2.4, 2.5] {
            let mut detector = detector(0.1, 1.0);
            detector.set_bpm_enabled(true);
            pulse_train(&mut detector, period, 8);

            let bpm = detector.bpm().expect("tempo should be estimated") as i64;
            let expected = (60.0 / period).round() as i64;
            assert!((bpm - expected).abs() <= 2, "period {period}: {bpm} vs {expected}");
        }
    }

    #[test]
    fn implausible_intervals_are_discarded() {
        let mut detector = detector(0.1, 1.0);
        detector.set_bpm_enabled(true);
        pulse_train(&mut detector, 3.0, 6);
        assert!(detector.state().intervals().is_empty());
        assert_eq!(detector.bpm(), None);
    }

    #[test]
    fn bpm_hidden_until_enabled() {
        let mut detector = detector(0.1, 1.0);
        pulse_train(&mut detector, 0.5, 6);
        assert_eq!(detector.bpm(), None);
        detector.set_bpm_enabled(true);
        assert_eq!(detector.bpm(), Some(120));
    }

    #[test]
    fn interval_ring_is_bounded() {
        let mut ring = IntervalRing::default();
        for i in 0..30 {
            ring.push(i as f64);
        }
        assert_eq!(ring.as_slice().len(), INTERVAL_SLOTS);
        assert_eq!(ring.median(), Some(23.5));
    }

    #[test]
    fn energy_weightings() {
        let rising = [0.0, 0.5, 1.0];
        assert!((beat_energy(&rising, BeatSource::Avg) - 0.5).abs() < 1e-6);
        assert!(beat_energy(&rising, BeatSource::Low) < 0.5);
        assert!(beat_energy(&rising, BeatSource::High) > 0.5);
        assert!((beat_energy(&rising, BeatSource::Mid) - 0.5).abs() < 1e-6);
        assert_eq!(beat_energy(&[], BeatSource::Avg), 0.0);
    }

    #[test]
    fn setters_clamp() {
        let mut detector = BeatDetector::default();
        detector.set_sensitivity(10.0);
        detector.set_threshold(-1.0);
        detector.set_pulse_width(f32::NAN);
        assert_eq!(detector.settings().sensitivity, MAX_SENSITIVITY);
        assert_eq!(detector.settings().threshold, 0.0);
        assert_eq!(detector.settings().pulse_width, 1.0);
    }
}
