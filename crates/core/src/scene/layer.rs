use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{render::Color, VizError};

pub const MIN_THICKNESS: f32 = 0.5;
pub const MAX_THICKNESS: f32 = 4.0;
pub const MIN_SHAPE_SCALE: f32 = 0.5;
pub const MAX_SHAPE_SCALE: f32 = 2.5;
pub const MAX_FLOOR: f32 = 0.4;
pub const MIN_SEGMENTS: u8 = 1;
pub const MAX_SEGMENTS: u8 = 8;
pub const MIN_DECAY: f32 = 0.01;
pub const MAX_DECAY: f32 = 0.99;
pub const MAX_ROTATION_SPEED: f32 = 10.0;
pub const MAX_GLOW_STRENGTH: f32 = 64.0;
pub const MAX_TRAIL_ALPHA: f32 = 0.5;

/// Drawing algorithm a layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    Bars,
    Mirror,
    Wave,
    Ring,
    Radial,
    Circle,
    Particles,
    Background,
    Image,
}

impl StyleKind {
    pub const ALL: [StyleKind; 9] = [
        StyleKind::Bars,
        StyleKind::Mirror,
        StyleKind::Wave,
        StyleKind::Ring,
        StyleKind::Radial,
        StyleKind::Circle,
        StyleKind::Particles,
        StyleKind::Background,
        StyleKind::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StyleKind::Bars => "bars",
            StyleKind::Mirror => "mirror",
            StyleKind::Wave => "wave",
            StyleKind::Ring => "ring",
            StyleKind::Radial => "radial",
            StyleKind::Circle => "circle",
            StyleKind::Particles => "particles",
            StyleKind::Background => "background",
            StyleKind::Image => "image",
        }
    }

    /// Styles laid out around a closed loop; their cost grows with segments.
    pub fn is_circular(self) -> bool {
        matches!(self, StyleKind::Ring | StyleKind::Radial | StyleKind::Circle)
    }
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StyleKind {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        StyleKind::ALL
            .into_iter()
            .find(|style| style.as_str() == needle)
            .ok_or_else(|| VizError::UnknownStyle(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Screen,
    Multiply,
    Overlay,
}

/// How an image layer maps its bitmap onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFit {
    Stretch,
    Contain,
    #[default]
    Cover,
    Tile,
}

impl FromStr for ImageFit {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stretch" => Ok(ImageFit::Stretch),
            "contain" => Ok(ImageFit::Contain),
            "cover" => Ok(ImageFit::Cover),
            "tile" => Ok(ImageFit::Tile),
            _ => Err(VizError::InvalidInput("image fit must be stretch, contain, cover or tile")),
        }
    }
}

/// Engine-wide parameter values every layer falls back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    pub style: StyleKind,
    pub color1: Color,
    pub color2: Color,
    pub glow: bool,
    pub trail: bool,
    pub glow_strength: f32,
    pub trail_alpha: f32,
    /// Radians per second.
    pub rotation_speed: f32,
    pub decay: f32,
    pub thickness: f32,
    pub ring_floor: f32,
    pub radial_floor: f32,
    pub spike_scale: f32,
    pub wave_scale: f32,
    pub segments: u8,
    pub blend: BlendMode,
    pub alpha: f32,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            style: StyleKind::Bars,
            color1: Color::rgb(0x19, 0xd3, 0xae),
            color2: Color::rgb(0x1e, 0x90, 0xff),
            glow: true,
            trail: true,
            glow_strength: 12.0,
            trail_alpha: 0.08,
            rotation_speed: 0.6,
            decay: 0.92,
            thickness: 1.0,
            ring_floor: 0.16,
            radial_floor: 0.16,
            spike_scale: 1.0,
            wave_scale: 1.0,
            segments: 1,
            blend: BlendMode::Normal,
            alpha: 1.0,
        }
    }
}

impl EngineDefaults {
    /// Applies a parameter update, clamping it into range. Non-finite values
    /// leave the current value untouched.
    pub fn apply(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::Style(style) => self.style = style,
            ParamUpdate::Colors(c1, c2) => {
                self.color1 = c1;
                self.color2 = c2;
            }
            ParamUpdate::Glow(on) => self.glow = on,
            ParamUpdate::Trail(on) => self.trail = on,
            ParamUpdate::Blend(mode) => self.blend = mode,
            ParamUpdate::Segments(n) => self.segments = clamp_segments(n),
            other => {
                let Some(value) = other.clamped_value() else {
                    return;
                };
                if let Some(slot) = self.scalar_slot(&other) {
                    *slot = value;
                }
            }
        }
    }

    fn scalar_slot(&mut self, update: &ParamUpdate) -> Option<&mut f32> {
        Some(match update {
            ParamUpdate::GlowStrength(_) => &mut self.glow_strength,
            ParamUpdate::TrailAlpha(_) => &mut self.trail_alpha,
            ParamUpdate::RotationSpeed(_) => &mut self.rotation_speed,
            ParamUpdate::Decay(_) => &mut self.decay,
            ParamUpdate::Thickness(_) => &mut self.thickness,
            ParamUpdate::RingFloor(_) => &mut self.ring_floor,
            ParamUpdate::RadialFloor(_) => &mut self.radial_floor,
            ParamUpdate::SpikeScale(_) => &mut self.spike_scale,
            ParamUpdate::WaveScale(_) => &mut self.wave_scale,
            ParamUpdate::Alpha(_) => &mut self.alpha,
            _ => return None,
        })
    }

    /// Returns a copy with every field forced into its documented range.
    pub fn normalized(&self) -> Self {
        let mut out = Self::default();
        for update in self.as_updates() {
            out.apply(update);
        }
        out
    }

    fn as_updates(&self) -> [ParamUpdate; 16] {
        [
            ParamUpdate::Colors(self.color1, self.color2),
            ParamUpdate::Glow(self.glow),
            ParamUpdate::Trail(self.trail),
            ParamUpdate::GlowStrength(self.glow_strength),
            ParamUpdate::TrailAlpha(self.trail_alpha),
            ParamUpdate::RotationSpeed(self.rotation_speed),
            ParamUpdate::Decay(self.decay),
            ParamUpdate::Thickness(self.thickness),
            ParamUpdate::RingFloor(self.ring_floor),
            ParamUpdate::RadialFloor(self.radial_floor),
            ParamUpdate::SpikeScale(self.spike_scale),
            ParamUpdate::WaveScale(self.wave_scale),
            ParamUpdate::Segments(self.segments as f32),
            ParamUpdate::Blend(self.blend),
            ParamUpdate::Alpha(self.alpha),
            ParamUpdate::Style(self.style),
        ]
    }
}

/// A single settable layer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "param", content = "value", rename_all = "snake_case")]
pub enum ParamUpdate {
    Style(StyleKind),
    Colors(Color, Color),
    Glow(bool),
    Trail(bool),
    GlowStrength(f32),
    TrailAlpha(f32),
    RotationSpeed(f32),
    Decay(f32),
    Thickness(f32),
    RingFloor(f32),
    RadialFloor(f32),
    SpikeScale(f32),
    WaveScale(f32),
    Segments(f32),
    Blend(BlendMode),
    Alpha(f32),
}

impl ParamUpdate {
    /// Clamped scalar carried by numeric updates, `None` for non-numeric or
    /// non-finite ones.
    fn clamped_value(&self) -> Option<f32> {
        let (value, min, max) = match *self {
            ParamUpdate::GlowStrength(v) => (v, 0.0, MAX_GLOW_STRENGTH),
            ParamUpdate::TrailAlpha(v) => (v, 0.0, MAX_TRAIL_ALPHA),
            ParamUpdate::RotationSpeed(v) => (v, -MAX_ROTATION_SPEED, MAX_ROTATION_SPEED),
            ParamUpdate::Decay(v) => (v, MIN_DECAY, MAX_DECAY),
            ParamUpdate::Thickness(v) => (v, MIN_THICKNESS, MAX_THICKNESS),
            ParamUpdate::RingFloor(v) | ParamUpdate::RadialFloor(v) => (v, 0.0, MAX_FLOOR),
            ParamUpdate::SpikeScale(v) | ParamUpdate::WaveScale(v) => {
                (v, MIN_SHAPE_SCALE, MAX_SHAPE_SCALE)
            }
            ParamUpdate::Alpha(v) => (v, 0.0, 1.0),
            _ => return None,
        };
        value.is_finite().then(|| value.clamp(min, max))
    }
}

fn clamp_segments(value: f32) -> u8 {
    if !value.is_finite() {
        return MIN_SEGMENTS;
    }
    value.round().clamp(MIN_SEGMENTS as f32, MAX_SEGMENTS as f32) as u8
}

/// Per-layer values that shadow [`EngineDefaults`] when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOverrides {
    pub color1: Option<Color>,
    pub color2: Option<Color>,
    pub glow: Option<bool>,
    /// Trail versus clear is decided once per frame by the lead layer (the
    /// first visible non-background layer). On any other layer this override
    /// has no effect.
    pub trail: Option<bool>,
    pub glow_strength: Option<f32>,
    pub trail_alpha: Option<f32>,
    pub rotation_speed: Option<f32>,
    pub decay: Option<f32>,
    pub thickness: Option<f32>,
    pub ring_floor: Option<f32>,
    pub radial_floor: Option<f32>,
    pub spike_scale: Option<f32>,
    pub wave_scale: Option<f32>,
    pub segments: Option<u8>,
    pub blend: Option<BlendMode>,
    pub alpha: Option<f32>,
}

impl LayerOverrides {
    /// Field-wise merge: values set on `self` win, the rest come from `base`.
    pub fn or(&self, base: &LayerOverrides) -> LayerOverrides {
        LayerOverrides {
            color1: self.color1.or(base.color1),
            color2: self.color2.or(base.color2),
            glow: self.glow.or(base.glow),
            trail: self.trail.or(base.trail),
            glow_strength: self.glow_strength.or(base.glow_strength),
            trail_alpha: self.trail_alpha.or(base.trail_alpha),
            rotation_speed: self.rotation_speed.or(base.rotation_speed),
            decay: self.decay.or(base.decay),
            thickness: self.thickness.or(base.thickness),
            ring_floor: self.ring_floor.or(base.ring_floor),
            radial_floor: self.radial_floor.or(base.radial_floor),
            spike_scale: self.spike_scale.or(base.spike_scale),
            wave_scale: self.wave_scale.or(base.wave_scale),
            segments: self.segments.or(base.segments),
            blend: self.blend.or(base.blend),
            alpha: self.alpha.or(base.alpha),
        }
    }

    /// Applies an update as an override. Style updates are handled by
    /// [`Layer::apply`].
    pub fn apply(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::Style(_) => {}
            ParamUpdate::Colors(c1, c2) => {
                self.color1 = Some(c1);
                self.color2 = Some(c2);
            }
            ParamUpdate::Glow(on) => self.glow = Some(on),
            ParamUpdate::Trail(on) => self.trail = Some(on),
            ParamUpdate::Blend(mode) => self.blend = Some(mode),
            ParamUpdate::Segments(n) => self.segments = Some(clamp_segments(n)),
            other => {
                let Some(value) = other.clamped_value() else {
                    return;
                };
                let slot = match other {
                    ParamUpdate::GlowStrength(_) => &mut self.glow_strength,
                    ParamUpdate::TrailAlpha(_) => &mut self.trail_alpha,
                    ParamUpdate::RotationSpeed(_) => &mut self.rotation_speed,
                    ParamUpdate::Decay(_) => &mut self.decay,
                    ParamUpdate::Thickness(_) => &mut self.thickness,
                    ParamUpdate::RingFloor(_) => &mut self.ring_floor,
                    ParamUpdate::RadialFloor(_) => &mut self.radial_floor,
                    ParamUpdate::SpikeScale(_) => &mut self.spike_scale,
                    ParamUpdate::WaveScale(_) => &mut self.wave_scale,
                    ParamUpdate::Alpha(_) => &mut self.alpha,
                    _ => return,
                };
                *slot = Some(value);
            }
        }
    }

    /// Re-applies every present override through the clamping path.
    pub fn normalized(&self) -> LayerOverrides {
        let mut out = LayerOverrides {
            color1: self.color1,
            color2: self.color2,
            glow: self.glow,
            trail: self.trail,
            blend: self.blend,
            ..Default::default()
        };
        let scalars = [
            self.glow_strength.map(ParamUpdate::GlowStrength),
            self.trail_alpha.map(ParamUpdate::TrailAlpha),
            self.rotation_speed.map(ParamUpdate::RotationSpeed),
            self.decay.map(ParamUpdate::Decay),
            self.thickness.map(ParamUpdate::Thickness),
            self.ring_floor.map(ParamUpdate::RingFloor),
            self.radial_floor.map(ParamUpdate::RadialFloor),
            self.spike_scale.map(ParamUpdate::SpikeScale),
            self.wave_scale.map(ParamUpdate::WaveScale),
            self.segments.map(|n| ParamUpdate::Segments(n as f32)),
            self.alpha.map(ParamUpdate::Alpha),
        ];
        for update in scalars.into_iter().flatten() {
            out.apply(update);
        }
        out
    }
}

/// One independently parameterised rendering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub style: StyleKind,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub overrides: LayerOverrides,
    /// Asset id of the bitmap drawn by `image` layers.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_fit: ImageFit,
}

fn visible_by_default() -> bool {
    true
}

impl Layer {
    pub fn new(style: StyleKind, overrides: LayerOverrides) -> Self {
        Self {
            style,
            visible: true,
            overrides: overrides.normalized(),
            image: None,
            image_fit: ImageFit::default(),
        }
    }

    pub fn apply(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::Style(style) => self.style = style,
            other => self.overrides.apply(other),
        }
    }

    pub fn normalized(&self) -> Self {
        Self {
            overrides: self.overrides.normalized(),
            ..self.clone()
        }
    }
}

/// Fully resolved parameters handed to a style renderer for one frame. Borrows
/// the layer's image id so resolving never allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveParams<'a> {
    pub style: StyleKind,
    pub color1: Color,
    pub color2: Color,
    pub glow: bool,
    pub trail: bool,
    pub glow_strength: f32,
    pub trail_alpha: f32,
    pub rotation_speed: f32,
    pub decay: f32,
    pub thickness: f32,
    pub ring_floor: f32,
    pub radial_floor: f32,
    pub spike_scale: f32,
    pub wave_scale: f32,
    pub segments: u8,
    pub blend: BlendMode,
    pub alpha: f32,
    pub image: Option<&'a str>,
    pub image_fit: ImageFit,
}

impl<'a> EffectiveParams<'a> {
    /// Merges a layer's overrides over the engine defaults. Without a layer the
    /// defaults act as one implicit layer.
    pub fn resolve(defaults: &EngineDefaults, layer: Option<&'a Layer>) -> Self {
        let empty = LayerOverrides::default();
        let o = layer.map(|layer| &layer.overrides).unwrap_or(&empty);
        Self {
            style: layer.map(|layer| layer.style).unwrap_or(defaults.style),
            color1: o.color1.unwrap_or(defaults.color1),
            color2: o.color2.unwrap_or(defaults.color2),
            glow: o.glow.unwrap_or(defaults.glow),
            trail: o.trail.unwrap_or(defaults.trail),
            glow_strength: o.glow_strength.unwrap_or(defaults.glow_strength),
            trail_alpha: o.trail_alpha.unwrap_or(defaults.trail_alpha),
            rotation_speed: o.rotation_speed.unwrap_or(defaults.rotation_speed),
            decay: o.decay.unwrap_or(defaults.decay),
            thickness: o.thickness.unwrap_or(defaults.thickness),
            ring_floor: o.ring_floor.unwrap_or(defaults.ring_floor),
            radial_floor: o.radial_floor.unwrap_or(defaults.radial_floor),
            spike_scale: o.spike_scale.unwrap_or(defaults.spike_scale),
            wave_scale: o.wave_scale.unwrap_or(defaults.wave_scale),
            segments: o.segments.unwrap_or(defaults.segments),
            blend: o.blend.unwrap_or(defaults.blend),
            alpha: o.alpha.unwrap_or(defaults.alpha),
            image: layer.and_then(|layer| layer.image.as_deref()),
            image_fit: layer.map(|layer| layer.image_fit).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp_into_documented_ranges() {
        let mut defaults = EngineDefaults::default();
        defaults.apply(ParamUpdate::Thickness(10.0));
        defaults.apply(ParamUpdate::SpikeScale(0.1));
        defaults.apply(ParamUpdate::RingFloor(0.9));
        defaults.apply(ParamUpdate::Segments(42.0));
        defaults.apply(ParamUpdate::Decay(1.5));

        assert_eq!(defaults.thickness, MAX_THICKNESS);
        assert_eq!(defaults.spike_scale, MIN_SHAPE_SCALE);
        assert_eq!(defaults.ring_floor, MAX_FLOOR);
        assert_eq!(defaults.segments, MAX_SEGMENTS);
        assert_eq!(defaults.decay, MAX_DECAY);
    }

    #[test]
    fn non_finite_updates_are_ignored() {
        let mut defaults = EngineDefaults::default();
        defaults.apply(ParamUpdate::RotationSpeed(f32::NAN));
        assert_eq!(defaults.rotation_speed, 0.6);

        let mut overrides = LayerOverrides::default();
        overrides.apply(ParamUpdate::WaveScale(f32::INFINITY));
        assert_eq!(overrides.wave_scale, None);
    }

    #[test]
    fn resolve_prefers_layer_overrides() {
        let defaults = EngineDefaults::default();
        let mut layer = Layer::new(StyleKind::Radial, LayerOverrides::default());
        layer.apply(ParamUpdate::Thickness(2.0));

        let params = EffectiveParams::resolve(&defaults, Some(&layer));
        assert_eq!(params.style, StyleKind::Radial);
        assert_eq!(params.thickness, 2.0);
        assert_eq!(params.decay, defaults.decay);

        let implicit = EffectiveParams::resolve(&defaults, None);
        assert_eq!(implicit.style, defaults.style);
        assert_eq!(implicit.thickness, defaults.thickness);
        assert_eq!(implicit.image, None);
    }

    #[test]
    fn resolved_image_borrows_the_layer_id() {
        let mut layer = Layer::new(StyleKind::Image, LayerOverrides::default());
        layer.image = Some("cover".to_string());

        let params = EffectiveParams::resolve(&EngineDefaults::default(), Some(&layer));
        let id = params.image.unwrap();
        assert_eq!(id, "cover");
        assert!(std::ptr::eq(id, layer.image.as_deref().unwrap()));
    }

    #[test]
    fn merge_keeps_explicit_fields() {
        let base = LayerOverrides {
            thickness: Some(3.0),
            segments: Some(4),
            ..Default::default()
        };
        let explicit = LayerOverrides {
            thickness: Some(1.5),
            ..Default::default()
        };
        let merged = explicit.or(&base);
        assert_eq!(merged.thickness, Some(1.5));
        assert_eq!(merged.segments, Some(4));
    }

    #[test]
    fn parses_style_names() {
        assert_eq!("Radial".parse::<StyleKind>().unwrap(), StyleKind::Radial);
        assert!("spiral".parse::<StyleKind>().is_err());
    }
}
