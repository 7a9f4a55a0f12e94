//! Frame timing: the minimum-interval gate, rotation phase, the per-frame
//! performance governor and the host-driven scheduler.

use std::f32::consts::TAU;

use crate::{config::GovernorConfig, scene::StyleKind, VizError};

/// Gates host callbacks to a minimum interval and measures elapsed time
/// between drawn frames.
#[derive(Debug, Clone)]
pub struct FrameClock {
    min_interval: f64,
    last_drawn: Option<f64>,
}

impl FrameClock {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval: min_interval_ms as f64 / 1000.0,
            last_drawn: None,
        }
    }

    pub fn set_min_interval_ms(&mut self, ms: u64) {
        self.min_interval = ms as f64 / 1000.0;
    }

    pub fn min_interval(&self) -> f64 {
        self.min_interval
    }

    /// True when enough time has passed since the last drawn frame.
    pub fn should_draw(&self, now: f64) -> bool {
        match self.last_drawn {
            Some(last) => now - last >= self.min_interval,
            None => true,
        }
    }

    /// Records a drawn frame at `now` and returns the seconds elapsed since
    /// the previous one (zero for the first frame).
    pub fn tick(&mut self, now: f64) -> f32 {
        let elapsed = self
            .last_drawn
            .map(|last| (now - last).max(0.0))
            .unwrap_or(0.0);
        self.last_drawn = Some(now);
        elapsed as f32
    }

    pub fn reset(&mut self) {
        self.last_drawn = None;
    }
}

/// Continuous rotation angle, kept in `0..TAU`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationPhase {
    angle: f32,
}

impl RotationPhase {
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn advance(&mut self, speed: f32, elapsed: f32) {
        let step = speed * elapsed;
        if step.is_finite() {
            self.angle = (self.angle + step).rem_euclid(TAU);
        }
    }
}

/// Fidelity settings for one frame, derived from the estimated cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    pub fast: bool,
    pub performance: bool,
    /// Combined multiplier applied to every style's base bin count.
    pub bin_scale: f32,
    pub min_bins: usize,
    pub glow_cap: f32,
    pub trail_cap: f32,
    pub max_particles: usize,
    pub particle_scale: f32,
}

impl Default for Quality {
    fn default() -> Self {
        Self::resolve(&GovernorConfig::default(), false, false)
    }
}

impl Quality {
    fn resolve(config: &GovernorConfig, fast: bool, performance: bool) -> Self {
        let mut bin_scale = 1.0;
        if fast {
            bin_scale *= config.fast_bin_scale;
        }
        if performance {
            bin_scale *= config.performance_bin_scale;
        }
        Self {
            fast,
            performance,
            bin_scale,
            min_bins: config.min_bins,
            glow_cap: config.fast_glow_cap,
            trail_cap: config.fast_trail_cap,
            max_particles: config.max_particles,
            particle_scale: config.performance_particle_scale,
        }
    }

    /// Scaled bin count, never below `min_bins`.
    pub fn bins(&self, base: usize) -> usize {
        ((base as f32 * self.bin_scale).round() as usize).max(self.min_bins)
    }

    pub fn glow_blur(&self, strength: f32) -> f32 {
        if self.fast {
            strength.min(self.glow_cap)
        } else {
            strength
        }
    }

    pub fn trail_alpha(&self, alpha: f32) -> f32 {
        if self.fast {
            alpha.min(self.trail_cap)
        } else {
            alpha
        }
    }

    /// Per-bin color interpolation collapses to one color in fast mode.
    pub fn flat_color(&self) -> bool {
        self.fast
    }

    pub fn cap_dots(&self) -> bool {
        !self.fast
    }

    pub fn particle_cap(&self) -> usize {
        if self.performance {
            (self.max_particles as f32 * self.particle_scale).round() as usize
        } else {
            self.max_particles
        }
    }
}

/// Estimates per-frame cost and switches fast mode on or off each frame.
#[derive(Debug, Clone)]
pub struct PerformanceGovernor {
    config: GovernorConfig,
    performance_mode: bool,
    fast: bool,
}

impl PerformanceGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config: config.normalized(),
            performance_mode: false,
            fast: false,
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn set_performance_mode(&mut self, enabled: bool) {
        if self.performance_mode != enabled {
            tracing::info!(enabled, "performance mode changed");
        }
        self.performance_mode = enabled;
    }

    pub fn performance_mode(&self) -> bool {
        self.performance_mode
    }

    pub fn is_fast(&self) -> bool {
        self.fast
    }

    /// Minimum callback interval for the current mode.
    pub fn frame_interval_ms(&self) -> u64 {
        if self.performance_mode {
            self.config.performance_frame_interval_ms
        } else {
            self.config.frame_interval_ms
        }
    }

    pub fn layer_cost(&self, style: StyleKind, segments: u8) -> f32 {
        if style.is_circular() {
            segments.max(1) as f32 * self.config.segment_cost
        } else {
            self.config.flat_cost
        }
    }

    /// Sum over `(style, segments)` of every visible layer.
    pub fn estimate_cost(&self, layers: impl IntoIterator<Item = (StyleKind, u8)>) -> f32 {
        layers
            .into_iter()
            .map(|(style, segments)| self.layer_cost(style, segments))
            .sum()
    }

    pub fn evaluate(&mut self, cost: f32) -> Quality {
        let fast = cost > self.config.cost_ceiling;
        if fast != self.fast {
            tracing::debug!(cost, fast, "fast mode transition");
            self.fast = fast;
        }
        Quality::resolve(&self.config, fast, self.performance_mode)
    }
}

/// Host side of the frame loop: the platform's per-frame callback registration
/// and its diagnostics channel.
pub trait FrameHost {
    fn request_frame(&mut self);
    fn report_error(&mut self, error: &VizError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// The callback fired before the minimum interval elapsed.
    Throttled,
    /// The surface was detached or too small to draw on.
    Skipped,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub drawn: u64,
    pub throttled: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Keeps requesting frames until stopped. A failed frame is reported to the
/// host and never ends the loop.
#[derive(Debug, Default)]
pub struct Scheduler {
    running: bool,
    stats: FrameStats,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn start(&mut self, host: &mut dyn FrameHost) {
        if self.running {
            return;
        }
        tracing::info!("frame loop started");
        self.running = true;
        host.request_frame();
    }

    pub fn stop(&mut self) {
        if self.running {
            tracing::info!(stats = ?self.stats, "frame loop stopped");
        }
        self.running = false;
    }

    /// Runs one host callback.
    pub fn on_frame<F>(&mut self, host: &mut dyn FrameHost, frame: F) -> FrameOutcome
    where
        F: FnOnce() -> crate::Result<FrameOutcome>,
    {
        if !self.running {
            return FrameOutcome::Stopped;
        }

        let outcome = match frame() {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "frame failed");
                host.report_error(&err);
                FrameOutcome::Failed
            }
        };

        match outcome {
            FrameOutcome::Drawn => self.stats.drawn += 1,
            FrameOutcome::Throttled => self.stats.throttled += 1,
            FrameOutcome::Skipped => self.stats.skipped += 1,
            FrameOutcome::Failed => self.stats.failed += 1,
            FrameOutcome::Stopped => return outcome,
        }

        if self.running {
            host.request_frame();
        }
        outcome
    }
}
