//! Drawing surface seam, command recording and the per-frame compositor.

mod color;
mod particles;
mod styles;

pub use color::{Color, Paint};
pub use particles::{Emitter, Particle, ParticlePool, MIN_LIFE};
pub use styles::{fit_rect, DrawContext, Style, StyleRenderer};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{BeatSnapshot, SpectrumFrame, SpectrumProcessor, StereoFrame},
    assets::{AssetStore, ImageHandle},
    audio::SpectrumSource,
    scene::{BlendMode, EffectiveParams, EngineDefaults, Layer, LayerStack, StyleKind},
    timeline::{Quality, RotationPhase},
    Result,
};

/// Fraction of the ring radius covered by the album-art overlay.
const ART_RADIUS_SCALE: f32 = 0.62;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Point at `radius` from `self` along `angle` (radians, clockwise from
    /// 3 o'clock in screen space).
    pub fn polar(self, angle: f32, radius: f32) -> Point {
        Point {
            x: self.x + angle.cos() * radius,
            y: self.y + angle.sin() * radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Surfaces narrower or shorter than two pixels are not drawn on.
    pub fn is_drawable(&self) -> bool {
        self.width >= 2.0 && self.height >= 2.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Base radius of every circular layout.
    pub fn ring_radius(&self) -> f32 {
        self.width.min(self.height) / 3.0
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f32,
    pub cap: LineCap,
}

impl Stroke {
    pub fn new(paint: Paint, width: f32) -> Self {
        Self {
            paint,
            width,
            cap: LineCap::Butt,
        }
    }

    pub fn round(mut self) -> Self {
        self.cap = LineCap::Round;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glow {
    pub color: Color,
    pub blur: f32,
}

/// State applied to every shape drawn until the next change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    pub glow: Option<Glow>,
    pub blend: BlendMode,
    pub alpha: f32,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            glow: None,
            blend: BlendMode::Normal,
            alpha: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleClip {
    pub center: Point,
    pub radius: f32,
}

/// A host-owned 2D drawing target. Angles are in radians; arcs run clockwise
/// in screen space from `start` to `end`.
pub trait Surface {
    fn size(&self) -> Size;

    /// False once the host has detached the surface.
    fn is_attached(&self) -> bool {
        true
    }

    fn clear(&mut self);
    fn set_effects(&mut self, effects: Effects);
    fn fill_rect(&mut self, rect: Rect, paint: Paint);
    fn fill_round_rect(&mut self, rect: Rect, radius: f32, paint: Paint);
    fn stroke_polyline(&mut self, points: &[Point], closed: bool, stroke: Stroke);
    fn stroke_line(&mut self, from: Point, to: Point, stroke: Stroke);
    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: Stroke);
    fn fill_circle(&mut self, center: Point, radius: f32, paint: Paint);
    fn draw_image(&mut self, image: &ImageHandle, dest: Rect, clip: Option<CircleClip>);

    /// Called once after the frame has been composited.
    fn present(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear,
    SetEffects {
        effects: Effects,
    },
    FillRect {
        rect: Rect,
        paint: Paint,
    },
    FillRoundRect {
        rect: Rect,
        radius: f32,
        paint: Paint,
    },
    StrokePolyline {
        points: Vec<Point>,
        closed: bool,
        stroke: Stroke,
    },
    StrokeLine {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    StrokeArc {
        center: Point,
        radius: f32,
        start: f32,
        end: f32,
        stroke: Stroke,
    },
    FillCircle {
        center: Point,
        radius: f32,
        paint: Paint,
    },
    DrawImage {
        image: String,
        dest: Rect,
        clip: Option<CircleClip>,
    },
}

/// Surface that records every call. Used by tests and the CLI dump.
#[derive(Debug, Clone, Default)]
pub struct CommandRecorder {
    size: Size,
    attached: bool,
    commands: Vec<DrawCommand>,
}

impl CommandRecorder {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Size::new(width, height),
            attached: true,
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.size = Size::new(width, height);
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drains the recorded commands, keeping the buffer's capacity.
    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, predicate: impl Fn(&DrawCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }
}

impl Surface for CommandRecorder {
    fn size(&self) -> Size {
        self.size
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn set_effects(&mut self, effects: Effects) {
        self.commands.push(DrawCommand::SetEffects { effects });
    }

    fn fill_rect(&mut self, rect: Rect, paint: Paint) {
        self.commands.push(DrawCommand::FillRect { rect, paint });
    }

    fn fill_round_rect(&mut self, rect: Rect, radius: f32, paint: Paint) {
        self.commands
            .push(DrawCommand::FillRoundRect { rect, radius, paint });
    }

    fn stroke_polyline(&mut self, points: &[Point], closed: bool, stroke: Stroke) {
        self.commands.push(DrawCommand::StrokePolyline {
            points: points.to_vec(),
            closed,
            stroke,
        });
    }

    fn stroke_line(&mut self, from: Point, to: Point, stroke: Stroke) {
        self.commands
            .push(DrawCommand::StrokeLine { from, to, stroke });
    }

    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: Stroke) {
        self.commands.push(DrawCommand::StrokeArc {
            center,
            radius,
            start,
            end,
            stroke,
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: Paint) {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            paint,
        });
    }

    fn draw_image(&mut self, image: &ImageHandle, dest: Rect, clip: Option<CircleClip>) {
        self.commands.push(DrawCommand::DrawImage {
            image: image.id.clone(),
            dest,
            clip,
        });
    }
}

/// Buffers and animation state owned by one layer across frames.
#[derive(Debug, Clone)]
pub struct LayerSession {
    pub(crate) spectrum: SpectrumFrame,
    pub(crate) stereo: StereoFrame,
    pub(crate) wave: Vec<f32>,
    pub(crate) points: Vec<Point>,
    pub(crate) particles: ParticlePool,
    pub(crate) phase: RotationPhase,
    pub(crate) image_missing: bool,
    style: Option<StyleKind>,
}

impl LayerSession {
    pub fn new(seed: u64, max_particles: usize) -> Self {
        Self {
            spectrum: SpectrumFrame::default(),
            stereo: StereoFrame::default(),
            wave: Vec::new(),
            points: Vec::new(),
            particles: ParticlePool::new(seed, max_particles),
            phase: RotationPhase::default(),
            image_missing: false,
            style: None,
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase.angle()
    }

    pub fn particles(&self) -> &ParticlePool {
        &self.particles
    }

    pub fn spectrum(&self) -> &SpectrumFrame {
        &self.spectrum
    }

    /// Resets style-specific state when the layer switches style.
    fn bind(&mut self, style: StyleKind) {
        if self.style != Some(style) {
            Style::from(style).reset(self);
            self.style = Some(style);
        }
    }
}

/// Everything the compositor reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub source: &'a SpectrumSource,
    pub defaults: &'a EngineDefaults,
    pub stack: &'a LayerStack,
    pub assets: &'a AssetStore,
    pub album_art: Option<&'a ImageHandle>,
    pub show_art: bool,
    pub beat: BeatSnapshot,
    pub quality: Quality,
    pub progress: f32,
    /// Seconds since the previous drawn frame.
    pub elapsed: f32,
}

/// Draws the layer stack in composite order, keeping one [`LayerSession`]
/// per layer aligned with the stack.
#[derive(Debug)]
pub struct Compositor {
    sessions: Vec<LayerSession>,
    implicit: LayerSession,
    order: Vec<usize>,
    seed: u64,
    next_seed: u64,
    max_particles: usize,
    shadowed_trails: usize,
}

impl Compositor {
    pub fn new(seed: u64, max_particles: usize) -> Self {
        Self {
            sessions: Vec::new(),
            implicit: LayerSession::new(seed, max_particles),
            order: Vec::new(),
            seed,
            next_seed: 1,
            max_particles,
            shadowed_trails: 0,
        }
    }

    pub fn sessions(&self) -> &[LayerSession] {
        &self.sessions
    }

    /// Visible layers whose trail override disagreed with the lead layer on
    /// the last frame.
    pub fn shadowed_trails(&self) -> usize {
        self.shadowed_trails
    }

    /// Session used when the stack is empty.
    pub fn implicit_session(&self) -> &LayerSession {
        &self.implicit
    }

    /// Appends a session for a newly added layer.
    pub fn push_session(&mut self) {
        let session = self.fresh_session();
        self.sessions.push(session);
    }

    /// Drops the session of a removed layer, shifting the rest down.
    pub fn remove_session(&mut self, index: usize) {
        if index < self.sessions.len() {
            self.sessions.remove(index);
        }
    }

    /// Grows or shrinks the session list to `len` layers.
    pub fn sync(&mut self, len: usize) {
        if self.sessions.len() > len {
            self.sessions.truncate(len);
        }
        while self.sessions.len() < len {
            self.push_session();
        }
    }

    fn note_shadowed_trails(&mut self, layers: &[Layer], lead: Option<usize>, trail: bool) {
        let shadowed = self
            .order
            .iter()
            .filter(|index| Some(**index) != lead)
            .map(|index| &layers[*index])
            .filter(|layer| Style::from(layer.style).uses_effects())
            .filter(|layer| matches!(layer.overrides.trail, Some(on) if on != trail))
            .count();
        if shadowed != self.shadowed_trails {
            if shadowed > 0 {
                tracing::warn!(
                    layers = shadowed,
                    lead_trail = trail,
                    "trail overrides below the lead layer are ignored"
                );
            }
            self.shadowed_trails = shadowed;
        }
    }

    fn fresh_session(&mut self) -> LayerSession {
        let seed = self.seed.wrapping_add(self.next_seed);
        self.next_seed += 1;
        LayerSession::new(seed, self.max_particles)
    }

    pub fn composite(
        &mut self,
        input: FrameInput<'_>,
        processor: &mut SpectrumProcessor,
        surface: &mut dyn Surface,
    ) {
        let size = surface.size();
        let defaults = input.defaults;
        let layers = input.stack.layers();
        self.sync(layers.len());

        for (layer, session) in layers.iter().zip(&mut self.sessions) {
            let speed = layer
                .overrides
                .rotation_speed
                .unwrap_or(defaults.rotation_speed);
            session.phase.advance(speed, input.elapsed);
        }
        self.implicit
            .phase
            .advance(defaults.rotation_speed, input.elapsed);

        input.stack.composite_order(&mut self.order);

        let lead_index = self
            .order
            .iter()
            .copied()
            .find(|index| layers[*index].style != StyleKind::Background);
        let lead = EffectiveParams::resolve(defaults, lead_index.map(|index| &layers[index]));
        self.note_shadowed_trails(layers, lead_index, lead.trail);
        surface.set_effects(Effects::default());
        if lead.trail && Style::from(lead.style).uses_effects() {
            let alpha = input.quality.trail_alpha(lead.trail_alpha);
            surface.fill_rect(size.rect(), Paint::solid(Color::TRAIL.with_alpha(alpha)));
        } else {
            surface.clear();
        }

        let backgrounds = self
            .order
            .iter()
            .take_while(|index| layers[**index].style == StyleKind::Background)
            .count();

        for position in 0..self.order.len() {
            if position == backgrounds {
                draw_center_art(&input, size, surface);
            }
            let index = self.order[position];
            let params = EffectiveParams::resolve(defaults, Some(&layers[index]));
            draw_layer(&input, &params, &mut self.sessions[index], processor, size, surface);
        }

        if layers.is_empty() {
            draw_center_art(&input, size, surface);
            let params = EffectiveParams::resolve(defaults, None);
            draw_layer(&input, &params, &mut self.implicit, processor, size, surface);
        } else if backgrounds == self.order.len() {
            draw_center_art(&input, size, surface);
        }
    }
}

fn draw_center_art(input: &FrameInput<'_>, size: Size, surface: &mut dyn Surface) {
    let Some(art) = input.album_art.filter(|art| input.show_art && !art.is_empty()) else {
        return;
    };
    let center = size.center();
    let radius = size.ring_radius() * ART_RADIUS_SCALE;
    surface.set_effects(Effects::default());
    surface.draw_image(
        art,
        Rect::new(center.x - radius, center.y - radius, radius * 2.0, radius * 2.0),
        Some(CircleClip { center, radius }),
    );
}

fn draw_layer(
    input: &FrameInput<'_>,
    params: &EffectiveParams<'_>,
    session: &mut LayerSession,
    processor: &mut SpectrumProcessor,
    size: Size,
    surface: &mut dyn Surface,
) {
    session.bind(params.style);
    let style = Style::from(params.style);

    let blur = input.quality.glow_blur(params.glow_strength);
    let glow = (params.glow && style.uses_effects() && blur > 0.0).then_some(Glow {
        color: params.color2,
        blur,
    });
    surface.set_effects(Effects {
        glow,
        blend: params.blend,
        alpha: params.alpha,
    });

    let mut ctx = DrawContext {
        params,
        source: input.source,
        processor,
        session,
        assets: input.assets,
        beat: input.beat,
        quality: input.quality,
        progress: input.progress,
        size,
    };
    style.draw(&mut ctx, surface);
}
