//! Built-in named parameter templates per style.

use crate::scene::{ParamUpdate, StyleKind};

use ParamUpdate::{Decay, RadialFloor, RingFloor, RotationSpeed, SpikeScale, Thickness, WaveScale};
use TemplateParam::*;

/// One value a template sets. Layer parameters go through the scoped update
/// path; the rest are engine-wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateParam {
    Layer(ParamUpdate),
    Smoothing(f32),
    Emphasis { low: f32, mid: f32, high: f32 },
    BeatSensitivity(f32),
    BeatBoost(f32),
    BeatThreshold(f32),
    BeatDecay(f32),
    BeatSource(crate::analysis::BeatSource),
    BeatHoldMs(f32),
    PulseWidth(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Template {
    pub style: StyleKind,
    pub name: &'static str,
    pub params: &'static [TemplateParam],
}

const fn layer(update: ParamUpdate) -> TemplateParam {
    TemplateParam::Layer(update)
}

const CIRCLE: &[Template] = &[
    Template {
        style: StyleKind::Circle,
        name: "Circle Spikes",
        params: &[
            layer(RotationSpeed(0.55)),
            layer(Decay(0.92)),
            layer(Thickness(1.2)),
            layer(RingFloor(0.18)),
            layer(SpikeScale(1.2)),
            Emphasis { low: 1.0, mid: 1.0, high: 1.15 },
            Smoothing(0.75),
        ],
    },
    Template {
        style: StyleKind::Circle,
        name: "Circle Smooth",
        params: &[
            layer(RotationSpeed(0.35)),
            layer(Decay(0.95)),
            layer(Thickness(1.4)),
            layer(RingFloor(0.20)),
            layer(SpikeScale(0.95)),
            Emphasis { low: 1.05, mid: 1.0, high: 1.05 },
            Smoothing(0.80),
        ],
    },
];

const RADIAL: &[Template] = &[
    Template {
        style: StyleKind::Radial,
        name: "Radial Glow",
        params: &[
            layer(RotationSpeed(0.7)),
            layer(Decay(0.92)),
            layer(Thickness(1.25)),
            layer(RadialFloor(0.18)),
            BeatSensitivity(1.10),
            BeatBoost(1.20),
            BeatThreshold(0.08),
            BeatDecay(0.90),
            BeatSource(crate::analysis::BeatSource::Avg),
            BeatHoldMs(120.0),
            PulseWidth(1.10),
            Emphasis { low: 1.1, mid: 1.0, high: 1.1 },
            Smoothing(0.75),
        ],
    },
    Template {
        style: StyleKind::Radial,
        name: "Radial Punchy",
        params: &[
            layer(RotationSpeed(0.85)),
            layer(Decay(0.90)),
            layer(Thickness(1.35)),
            layer(RadialFloor(0.16)),
            BeatSensitivity(1.25),
            BeatBoost(1.30),
            BeatThreshold(0.10),
            BeatDecay(0.88),
            BeatSource(crate::analysis::BeatSource::Low),
            BeatHoldMs(150.0),
            PulseWidth(1.2),
            Emphasis { low: 1.2, mid: 0.95, high: 1.05 },
            Smoothing(0.72),
        ],
    },
];

const RING: &[Template] = &[
    Template {
        style: StyleKind::Ring,
        name: "Ring Wave Smooth",
        params: &[
            layer(RotationSpeed(0.40)),
            layer(Thickness(1.6)),
            layer(WaveScale(1.20)),
            Smoothing(0.80),
        ],
    },
    Template {
        style: StyleKind::Ring,
        name: "Ring Wave Punchy",
        params: &[
            layer(RotationSpeed(0.65)),
            layer(Thickness(1.3)),
            layer(WaveScale(1.35)),
            Smoothing(0.70),
        ],
    },
];

const BARS: &[Template] = &[
    Template {
        style: StyleKind::Bars,
        name: "Bars EQ",
        params: &[
            layer(Decay(0.92)),
            layer(Thickness(1.2)),
            layer(RadialFloor(0.14)),
            Emphasis { low: 1.2, mid: 1.0, high: 1.1 },
            Smoothing(0.75),
        ],
    },
    Template {
        style: StyleKind::Bars,
        name: "Bars Calm",
        params: &[
            layer(Decay(0.95)),
            layer(Thickness(1.0)),
            layer(RadialFloor(0.16)),
            Emphasis { low: 1.05, mid: 1.0, high: 1.05 },
            Smoothing(0.82),
        ],
    },
];

const MIRROR: &[Template] = &[
    Template {
        style: StyleKind::Mirror,
        name: "Mirror EQ",
        params: &[
            layer(Decay(0.92)),
            layer(Thickness(1.2)),
            layer(RadialFloor(0.14)),
            Emphasis { low: 1.2, mid: 1.0, high: 1.1 },
            Smoothing(0.75),
        ],
    },
    Template {
        style: StyleKind::Mirror,
        name: "Mirror Calm",
        params: &[
            layer(Decay(0.95)),
            layer(Thickness(1.0)),
            layer(RadialFloor(0.16)),
            Emphasis { low: 1.05, mid: 1.0, high: 1.05 },
            Smoothing(0.82),
        ],
    },
];

const PARTICLES: &[Template] = &[
    Template {
        style: StyleKind::Particles,
        name: "Particles Orbit",
        params: &[
            layer(Thickness(1.0)),
            BeatSensitivity(1.0),
            BeatBoost(1.2),
            BeatThreshold(0.10),
            BeatDecay(0.90),
            BeatSource(crate::analysis::BeatSource::Avg),
            BeatHoldMs(140.0),
            PulseWidth(1.2),
            Smoothing(0.75),
        ],
    },
    Template {
        style: StyleKind::Particles,
        name: "Particles Spark",
        params: &[
            layer(Thickness(1.1)),
            BeatSensitivity(1.2),
            BeatBoost(1.3),
            BeatThreshold(0.12),
            BeatDecay(0.88),
            BeatSource(crate::analysis::BeatSource::High),
            BeatHoldMs(160.0),
            PulseWidth(1.3),
            Smoothing(0.72),
        ],
    },
];

/// Templates offered for `style`, in menu order. Empty for styles without any.
pub fn templates_for(style: StyleKind) -> &'static [Template] {
    match style {
        StyleKind::Circle => CIRCLE,
        StyleKind::Radial => RADIAL,
        StyleKind::Ring => RING,
        StyleKind::Bars => BARS,
        StyleKind::Mirror => MIRROR,
        StyleKind::Particles => PARTICLES,
        StyleKind::Wave | StyleKind::Background | StyleKind::Image => &[],
    }
}

/// Looks a template up by its display name, ignoring ASCII case.
pub fn find(style: StyleKind, name: &str) -> Option<&'static Template> {
    templates_for(style)
        .iter()
        .find(|template| template.name.eq_ignore_ascii_case(name.trim()))
}
