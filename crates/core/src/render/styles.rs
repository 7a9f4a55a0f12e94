use std::f32::consts::{FRAC_PI_2, TAU};

use super::{
    Color, Emitter, LayerSession, Paint, ParticlePool, Point, Rect, Size, Stroke,
    Surface,
};
use crate::{
    analysis::{BeatSnapshot, SpectrumProcessor, SpectrumRequest, BAR_GAMMA, CIRCULAR_GAMMA, WAVE_FLOOR},
    assets::{AssetStore, ImageHandle},
    audio::{Channel, SpectrumSource},
    scene::{EffectiveParams, ImageFit, StyleKind},
    timeline::Quality,
};

const BAR_BINS: usize = 96;
const MIRROR_BINS: usize = 100;
const WAVE_BINS: usize = 256;
const RING_BINS: usize = 240;
/// Bins per half circle for stereo layouts.
const HALF_BINS: usize = 90;
const BAR_CORNER: f32 = 4.0;
/// Inner spike length relative to the outer one.
const INWARD_SPIKE: f32 = 0.35;
const MAX_TILES: u32 = 4096;

/// Per-layer inputs handed to a style for one frame.
pub struct DrawContext<'a> {
    pub params: &'a EffectiveParams<'a>,
    pub source: &'a SpectrumSource,
    pub processor: &'a mut SpectrumProcessor,
    pub session: &'a mut LayerSession,
    pub assets: &'a AssetStore,
    pub beat: BeatSnapshot,
    pub quality: Quality,
    pub progress: f32,
    pub size: Size,
}

impl DrawContext<'_> {
    /// Fill used for shapes that span the surface.
    fn gradient(&self) -> Paint {
        Paint::Diagonal {
            from: self.params.color1,
            to: self.params.color2,
        }
    }

    /// Color of bin `t` in `0..=1`, or one flat color in fast mode.
    fn bin_color(&self, t: f32) -> Color {
        let t = if self.quality.flat_color() { 0.5 } else { t };
        self.params.color1.lerp(self.params.color2, t)
    }

    fn spectrum(&mut self, base_bins: usize, gamma: f32, floor: f32) {
        let request = SpectrumRequest::new(self.quality.bins(base_bins), gamma)
            .floor(floor)
            .decay(self.params.decay);
        self.processor.spectrum(
            self.source.magnitudes(Channel::Mono),
            request,
            &mut self.session.spectrum,
        );
    }

    fn stereo_spectrum(&mut self, floor: f32) {
        let request = SpectrumRequest::new(self.quality.bins(HALF_BINS), CIRCULAR_GAMMA)
            .floor(floor)
            .decay(self.params.decay);
        self.processor
            .stereo_spectrum(self.source, request, &mut self.session.stereo);
    }

    fn waveform(&mut self, base_bins: usize) {
        let bins = self.quality.bins(base_bins);
        self.processor.waveform(
            self.source.waveform(Channel::Mono),
            bins,
            &mut self.session.wave,
        );
    }

    /// Peak of display slot `j` of `2 * half` around the circle. With a stereo
    /// pair wired, both halves show the averaged channels.
    fn circular_peak(&self, j: usize, averaged: bool) -> f32 {
        let left = self.session.stereo.left.peaks();
        let right = self.session.stereo.right.peaks();
        let half = left.len();
        if averaged {
            let m = j % half;
            (left[m] + right[m]) * 0.5
        } else if j < half {
            left[j]
        } else {
            right[j - half]
        }
    }

    fn draw_progress_arc(&self, surface: &mut dyn Surface) {
        if self.progress <= 0.0 {
            return;
        }
        let start = -FRAC_PI_2;
        let stroke = Stroke::new(
            Paint::solid(Color::WHITE.with_alpha(0.35)),
            3.4 * self.params.thickness,
        )
        .round();
        surface.stroke_arc(
            self.size.center(),
            self.size.ring_radius() + 1.5,
            start,
            start + self.progress * TAU,
            stroke,
        );
    }
}

/// Drawing algorithm for one style tag. Optional hooks have no-op defaults so
/// every style exposes the same interface.
pub trait StyleRenderer {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface);

    /// Whether trail and glow apply to this style.
    fn uses_effects(&self) -> bool {
        true
    }

    /// Clears style-specific session state when a layer switches style.
    fn reset(&self, _session: &mut LayerSession) {}
}

#[derive(Debug, Clone, Copy)]
pub struct Bars;
#[derive(Debug, Clone, Copy)]
pub struct Mirror;
#[derive(Debug, Clone, Copy)]
pub struct Wave;
#[derive(Debug, Clone, Copy)]
pub struct Ring;
#[derive(Debug, Clone, Copy)]
pub struct Radial;
#[derive(Debug, Clone, Copy)]
pub struct Circle;
#[derive(Debug, Clone, Copy)]
pub struct Particles;
#[derive(Debug, Clone, Copy)]
pub struct Background;
#[derive(Debug, Clone, Copy)]
pub struct Image;

/// Closed set of renderers, one per [`StyleKind`].
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bars(Bars),
    Mirror(Mirror),
    Wave(Wave),
    Ring(Ring),
    Radial(Radial),
    Circle(Circle),
    Particles(Particles),
    Background(Background),
    Image(Image),
}

impl From<StyleKind> for Style {
    fn from(kind: StyleKind) -> Self {
        match kind {
            StyleKind::Bars => Style::Bars(Bars),
            StyleKind::Mirror => Style::Mirror(Mirror),
            StyleKind::Wave => Style::Wave(Wave),
            StyleKind::Ring => Style::Ring(Ring),
            StyleKind::Radial => Style::Radial(Radial),
            StyleKind::Circle => Style::Circle(Circle),
            StyleKind::Particles => Style::Particles(Particles),
            StyleKind::Background => Style::Background(Background),
            StyleKind::Image => Style::Image(Image),
        }
    }
}

impl Style {
    fn renderer(&self) -> &dyn StyleRenderer {
        match self {
            Style::Bars(style) => style,
            Style::Mirror(style) => style,
            Style::Wave(style) => style,
            Style::Ring(style) => style,
            Style::Radial(style) => style,
            Style::Circle(style) => style,
            Style::Particles(style) => style,
            Style::Background(style) => style,
            Style::Image(style) => style,
        }
    }
}

impl StyleRenderer for Style {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        self.renderer().draw(ctx, surface)
    }

    fn uses_effects(&self) -> bool {
        self.renderer().uses_effects()
    }

    fn reset(&self, session: &mut LayerSession) {
        self.renderer().reset(session)
    }
}

fn bar_geometry(slot: f32, thickness: f32) -> (f32, f32) {
    let width = ((slot - 4.0) * (0.75 + 0.25 * thickness)).max(2.0);
    let gap = (slot - width).max(2.0);
    (width, gap)
}

impl StyleRenderer for Bars {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        ctx.spectrum(BAR_BINS, BAR_GAMMA, ctx.params.radial_floor);
        let Size { width: w, height: h } = ctx.size;
        let peaks = ctx.session.spectrum.peaks();
        let slot = w / peaks.len() as f32;
        let (width, gap) = bar_geometry(slot, ctx.params.thickness);
        let paint = ctx.gradient();

        for (i, peak) in peaks.iter().enumerate() {
            let bar = peak * h;
            let rect = Rect::new(i as f32 * slot + gap / 2.0, h - bar, width, bar);
            surface.fill_round_rect(rect, BAR_CORNER, paint);
        }
    }
}

impl StyleRenderer for Mirror {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        ctx.spectrum(MIRROR_BINS, CIRCULAR_GAMMA, ctx.params.radial_floor);
        let Size { width: w, height: h } = ctx.size;
        let peaks = ctx.session.spectrum.peaks();
        let bins = peaks.len();
        let slot = w / bins as f32;
        let (width, gap) = bar_geometry(slot, ctx.params.thickness);

        for (i, peak) in peaks.iter().enumerate() {
            let bar = peak * (h / 2.0);
            let x = i as f32 * slot + gap / 2.0;
            let t = i as f32 / (bins - 1).max(1) as f32;
            let paint = Paint::solid(ctx.bin_color(t));
            surface.fill_round_rect(Rect::new(x, h - bar, width, bar), BAR_CORNER, paint);
            surface.fill_round_rect(Rect::new(x, 0.0, width, bar), BAR_CORNER, paint);
        }
    }
}

impl StyleRenderer for Wave {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        ctx.waveform(WAVE_BINS);
        let Size { width: w, height: h } = ctx.size;
        let scale = (h / 2.0) * 0.9 * ctx.params.wave_scale;
        let wave = &ctx.session.wave;
        let last = (wave.len() - 1).max(1) as f32;

        let points = &mut ctx.session.points;
        points.clear();
        points.extend(wave.iter().enumerate().map(|(i, value)| {
            let v = (value - WAVE_FLOOR) / (1.0 - WAVE_FLOOR);
            Point::new(i as f32 / last * w, h / 2.0 + v * scale)
        }));

        let stroke = Stroke::new(ctx.gradient(), 2.0 * ctx.params.thickness);
        surface.stroke_polyline(&ctx.session.points, false, stroke);
    }
}

impl StyleRenderer for Ring {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        ctx.waveform(RING_BINS);
        let center = ctx.size.center();
        let r = ctx.size.ring_radius();
        let scale = (ctx.size.height / 5.0).min(r * 0.75) * ctx.params.wave_scale;
        let phase = ctx.session.phase.angle();
        let segments = ctx.params.segments.max(1) as usize;
        let wave = &ctx.session.wave;
        let bins = wave.len();

        let points = &mut ctx.session.points;
        points.clear();
        points.extend((0..bins).map(|i| {
            let angle = i as f32 / bins as f32 * TAU + phase;
            center.polar(angle, r + wave[(i * segments) % bins] * scale)
        }));

        let stroke = Stroke::new(ctx.gradient(), 2.6 * ctx.params.thickness);
        surface.stroke_polyline(&ctx.session.points, true, stroke);
    }
}

impl StyleRenderer for Radial {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        ctx.stereo_spectrum(ctx.params.radial_floor);
        let center = ctx.size.center();
        let h = ctx.size.height;
        let r = ctx.size.ring_radius();
        let thickness = ctx.params.thickness;
        let stereo = &ctx.session.stereo;

        let avg = (stereo.left.average() + stereo.right.average()) * 0.5;
        let pulse = ctx.beat.pulse * ctx.beat.pulse_width;
        let ring = Stroke::new(
            Paint::solid(Color::WHITE.with_alpha(0.18)),
            2.5 * thickness * (1.0 + pulse),
        );
        surface.stroke_arc(center, r + avg.powf(1.2) * (h / 16.0), 0.0, TAU, ring);

        let total = stereo.left.len() * 2;
        let segments = ctx.params.segments.max(1);
        let sector = TAU / segments as f32;
        let phase = ctx.session.phase.angle();
        let dot = Paint::solid(Color::WHITE.with_alpha(0.85));

        for segment in 0..segments {
            let offset = phase + segment as f32 * sector;
            for j in 0..total {
                let pv = ctx.circular_peak(j, false);
                let angle = offset + j as f32 / total as f32 * sector;
                let tip = center.polar(angle, r + pv.powf(1.2) * (h / 3.0));
                let t = j as f32 / (total - 1) as f32;
                let stroke = Stroke::new(
                    Paint::solid(ctx.bin_color(t)),
                    (2.2 + pv * 3.6) * thickness,
                )
                .round();
                surface.stroke_line(center.polar(angle, r), tip, stroke);

                if ctx.quality.cap_dots() {
                    surface.fill_circle(tip, (2.0 + pv * 2.6) * thickness, dot);
                }
            }
        }

        ctx.draw_progress_arc(surface);
    }
}

impl StyleRenderer for Circle {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        let center = ctx.size.center();
        let r = ctx.size.ring_radius();
        let thickness = ctx.params.thickness;
        surface.stroke_arc(center, r, 0.0, TAU, Stroke::new(ctx.gradient(), 3.2 * thickness));

        ctx.stereo_spectrum(ctx.params.ring_floor);
        let pulse = 1.0 + 0.25 * ctx.beat.pulse * ctx.beat.pulse_width;
        let scale = (ctx.size.height / 4.0).min(r * 0.65) * ctx.params.spike_scale * pulse;
        let averaged = ctx.source.has_stereo();
        let total = ctx.session.stereo.left.len() * 2;
        let segments = ctx.params.segments.max(1);
        let sector = TAU / segments as f32;
        let phase = ctx.session.phase.angle();
        let paint = ctx.gradient();

        for segment in 0..segments {
            let offset = phase + segment as f32 * sector;
            for j in 0..total {
                let pv = ctx.circular_peak(j, averaged);
                let angle = offset + j as f32 / total as f32 * sector;
                let length = pv.powf(1.1) * scale;
                let stroke = Stroke::new(paint, (1.8 + pv * 2.0) * thickness);
                surface.stroke_line(
                    center.polar(angle, r - length * INWARD_SPIKE),
                    center.polar(angle, r + length),
                    stroke,
                );
            }
        }

        ctx.draw_progress_arc(surface);
    }
}

impl StyleRenderer for Particles {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        let center = ctx.size.center();
        let r = ctx.size.ring_radius();
        let emitter = Emitter {
            count: ParticlePool::spawn_count(ctx.beat.pulse),
            base_radius: r,
            spread: (ctx.size.height / 3.0) * 0.5,
            segments: ctx.params.segments,
            pulse_width: ctx.beat.pulse_width,
        };
        let pool = &mut ctx.session.particles;
        pool.emit(emitter, ctx.quality.particle_cap());
        pool.advance();

        for particle in pool.iter() {
            let color = Color::WHITE.with_alpha(particle.alpha());
            surface.fill_circle(
                center.polar(particle.theta, particle.radius),
                particle.size(ctx.params.thickness),
                Paint::solid(color),
            );
        }
    }

    fn reset(&self, session: &mut LayerSession) {
        session.particles.clear();
    }
}

impl StyleRenderer for Background {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        let paint = Paint::Vertical {
            from: ctx.params.color1,
            to: ctx.params.color2,
        };
        surface.fill_rect(ctx.size.rect(), paint);
    }

    fn uses_effects(&self) -> bool {
        false
    }
}

impl StyleRenderer for Image {
    fn draw(&self, ctx: &mut DrawContext<'_>, surface: &mut dyn Surface) {
        let Some(id) = ctx.params.image else {
            return;
        };
        let Some(image) = ctx.assets.image(id) else {
            if !ctx.session.image_missing {
                tracing::warn!(id, "layer image is not registered");
                ctx.session.image_missing = true;
            }
            return;
        };
        ctx.session.image_missing = false;
        if image.is_empty() {
            return;
        }

        if ctx.params.image_fit == ImageFit::Tile {
            draw_tiled(image, ctx.size, surface);
        } else {
            let dest = fit_rect(ctx.params.image_fit, image.width, image.height, ctx.size);
            surface.draw_image(image, dest, None);
        }
    }

    fn uses_effects(&self) -> bool {
        false
    }

    fn reset(&self, session: &mut LayerSession) {
        session.image_missing = false;
    }
}

/// Destination of an `image_width x image_height` bitmap on `size` for the
/// non-repeating fit modes. `Tile` yields the first tile at native size.
pub fn fit_rect(fit: ImageFit, image_width: u32, image_height: u32, size: Size) -> Rect {
    let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);
    let scale = match fit {
        ImageFit::Stretch => return size.rect(),
        ImageFit::Tile => return Rect::new(0.0, 0.0, iw, ih),
        ImageFit::Contain => (size.width / iw).min(size.height / ih),
        ImageFit::Cover => (size.width / iw).max(size.height / ih),
    };
    let (width, height) = (iw * scale, ih * scale);
    Rect::new(
        (size.width - width) / 2.0,
        (size.height - height) / 2.0,
        width,
        height,
    )
}

fn draw_tiled(image: &ImageHandle, size: Size, surface: &mut dyn Surface) {
    let (mut tile_w, mut tile_h) = (image.width as f32, image.height as f32);
    let tiles = |w: f32, h: f32| {
        ((size.width / w).ceil() as u32).saturating_mul((size.height / h).ceil() as u32)
    };
    while tiles(tile_w, tile_h) > MAX_TILES {
        tile_w *= 2.0;
        tile_h *= 2.0;
    }

    let mut y = 0.0;
    while y < size.height {
        let mut x = 0.0;
        while x < size.width {
            surface.draw_image(image, Rect::new(x, y, tile_w, tile_h), None);
            x += tile_w;
        }
        y += tile_h;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ProcessorSettings,
        audio::StaticTap,
        config::AutoGainConfig,
        render::{CommandRecorder, DrawCommand},
        scene::{EngineDefaults, Layer, LayerOverrides, ParamUpdate},
    };

    struct Bench {
        source: SpectrumSource,
        processor: SpectrumProcessor,
        session: LayerSession,
        assets: AssetStore,
        surface: CommandRecorder,
    }

    impl Bench {
        fn new(source: SpectrumSource) -> Self {
            Self {
                source,
                processor: SpectrumProcessor::new(
                    ProcessorSettings::default(),
                    AutoGainConfig::default(),
                ),
                session: LayerSession::new(5, 200),
                assets: AssetStore::new(),
                surface: CommandRecorder::new(600.0, 400.0),
            }
        }

        fn mono(level: f32) -> Self {
            let mut source = SpectrumSource::new(StaticTap::constant(512, level));
            source.refresh().unwrap();
            Self::new(source)
        }

        fn draw(&mut self, layer: &Layer, beat: BeatSnapshot, quality: Quality, progress: f32) {
            let params = EffectiveParams::resolve(&EngineDefaults::default(), Some(layer));
            let mut ctx = DrawContext {
                params: &params,
                source: &self.source,
                processor: &mut self.processor,
                session: &mut self.session,
                assets: &self.assets,
                beat,
                quality,
                progress,
                size: self.surface.size(),
            };
            Style::from(layer.style).draw(&mut ctx, &mut self.surface);
        }

        fn lines(&self) -> usize {
            self.surface
                .count(|c| matches!(c, DrawCommand::StrokeLine { .. }))
        }

        fn dots(&self) -> usize {
            self.surface
                .count(|c| matches!(c, DrawCommand::FillCircle { .. }))
        }
    }

    fn layer(style: StyleKind) -> Layer {
        Layer::new(style, LayerOverrides::default())
    }

    fn segmented(style: StyleKind, segments: f32) -> Layer {
        let mut layer = layer(style);
        layer.apply(ParamUpdate::Segments(segments));
        layer
    }

    #[test]
    fn bars_grow_from_the_baseline() {
        let mut bench = Bench::mono(0.6);
        bench.draw(&layer(StyleKind::Bars), BeatSnapshot::default(), Quality::default(), 0.0);
        let commands = bench.surface.commands();
        assert_eq!(commands.len(), 96);
        for command in commands {
            match command {
                DrawCommand::FillRoundRect { rect, radius, .. } => {
                    assert!((rect.y + rect.height - 400.0).abs() < 1e-3);
                    assert!(rect.width >= 2.0);
                    assert_eq!(*radius, BAR_CORNER);
                }
                other => panic!("unexpected command {other:?}"),
            }
        }
    }

    #[test]
    fn mirror_bars_are_reflected() {
        let mut bench = Bench::mono(0.6);
        bench.draw(&layer(StyleKind::Mirror), BeatSnapshot::default(), Quality::default(), 0.0);
        let rects: Vec<Rect> = bench
            .surface
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillRoundRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(rects.len(), 200);
        for pair in rects.chunks(2) {
            assert_eq!(pair[0].height, pair[1].height);
            assert_eq!(pair[1].y, 0.0);
            assert!(pair[0].height <= 200.0 + 1e-3);
        }
    }

    #[test]
    fn mirror_collapses_to_one_color_in_fast_mode() {
        let mut bench = Bench::mono(0.6);
        let fast = Quality {
            fast: true,
            ..Quality::default()
        };
        bench.draw(&layer(StyleKind::Mirror), BeatSnapshot::default(), fast, 0.0);
        let mut paints = bench.surface.commands().iter().filter_map(|c| match c {
            DrawCommand::FillRoundRect { paint, .. } => Some(*paint),
            _ => None,
        });
        let first = paints.next().unwrap();
        assert!(paints.all(|paint| paint == first));
    }

    #[test]
    fn wave_spans_the_width_around_the_midline() {
        let mut bench = Bench::mono(0.0);
        bench.draw(&layer(StyleKind::Wave), BeatSnapshot::default(), Quality::default(), 0.0);
        match &bench.surface.commands()[0] {
            DrawCommand::StrokePolyline { points, closed, .. } => {
                assert!(!closed);
                assert_eq!(points.len(), 256);
                assert_eq!(points[0].x, 0.0);
                assert!((points[255].x - 600.0).abs() < 1e-3);
                assert!(points.iter().all(|p| (p.y - 200.0).abs() < 1e-3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ring_is_a_closed_loop_outside_the_base_radius() {
        let mut bench = Bench::mono(0.0);
        bench.draw(&layer(StyleKind::Ring), BeatSnapshot::default(), Quality::default(), 0.0);
        match &bench.surface.commands()[0] {
            DrawCommand::StrokePolyline { points, closed, .. } => {
                assert!(closed);
                assert_eq!(points.len(), 240);
                let center = Point::new(300.0, 200.0);
                let r = 400.0 / 3.0;
                for point in points {
                    let distance = ((point.x - center.x).powi(2) + (point.y - center.y).powi(2)).sqrt();
                    assert!(distance > r);
                }
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn radial_replicates_segments_and_drops_cap_dots_in_fast_mode() {
        let mut bench = Bench::mono(0.5);
        bench.draw(&segmented(StyleKind::Radial, 2.0), BeatSnapshot::default(), Quality::default(), 0.0);
        assert_eq!(bench.lines(), 2 * 180);
        assert_eq!(bench.dots(), 2 * 180);

        let mut bench = Bench::mono(0.5);
        let fast = Quality {
            fast: true,
            ..Quality::default()
        };
        bench.draw(&layer(StyleKind::Radial), BeatSnapshot::default(), fast, 0.0);
        assert_eq!(bench.lines(), 2 * 63);
        assert_eq!(bench.dots(), 0);
    }

    #[test]
    fn radial_beat_ring_widens_with_pulse() {
        let ring_width = |beat: BeatSnapshot| {
            let mut bench = Bench::mono(0.5);
            bench.draw(&layer(StyleKind::Radial), beat, Quality::default(), 0.0);
            match &bench.surface.commands()[0] {
                DrawCommand::StrokeArc { stroke, .. } => stroke.width,
                other => panic!("unexpected command {other:?}"),
            }
        };
        let quiet = ring_width(BeatSnapshot::default());
        let loud = ring_width(BeatSnapshot {
            level: 0.5,
            pulse: 0.5,
            pulse_width: 1.0,
            ..Default::default()
        });
        assert!(loud > quiet);
    }

    #[test]
    fn progress_arc_starts_at_twelve_o_clock() {
        let mut bench = Bench::mono(0.5);
        bench.draw(&layer(StyleKind::Circle), BeatSnapshot::default(), Quality::default(), 0.25);
        match bench.surface.commands().last() {
            Some(DrawCommand::StrokeArc { start, end, radius, .. }) => {
                assert!((start + FRAC_PI_2).abs() < 1e-6);
                assert!((end - start - TAU * 0.25).abs() < 1e-5);
                assert!((radius - (400.0 / 3.0 + 1.5)).abs() < 1e-3);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let mut bench = Bench::mono(0.5);
        bench.draw(&layer(StyleKind::Circle), BeatSnapshot::default(), Quality::default(), 0.0);
        assert_eq!(bench.surface.count(|c| matches!(c, DrawCommand::StrokeArc { .. })), 1);
    }

    #[test]
    fn circle_spikes_cross_the_base_ring() {
        let mut bench = Bench::mono(0.8);
        bench.draw(&layer(StyleKind::Circle), BeatSnapshot::default(), Quality::default(), 0.0);
        let center = Point::new(300.0, 200.0);
        let r = 400.0 / 3.0;
        let distance = |p: &Point| ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt();
        let mut spikes = 0;
        for command in bench.surface.commands() {
            if let DrawCommand::StrokeLine { from, to, .. } = command {
                assert!(distance(from) < r);
                assert!(distance(to) > r);
                spikes += 1;
            }
        }
        assert_eq!(spikes, 180);
    }

    #[test]
    fn particles_spawn_on_pulse_and_respect_the_cap() {
        let mut bench = Bench::mono(0.5);
        let particles = layer(StyleKind::Particles);
        bench.draw(&particles, BeatSnapshot::default(), Quality::default(), 0.0);
        assert!(bench.session.particles.is_empty());

        let beat = BeatSnapshot {
            level: 1.0,
            pulse: 1.0,
            pulse_width: 1.0,
            ..Default::default()
        };
        let performance = Quality {
            performance: true,
            ..Quality::default()
        };
        for _ in 0..100 {
            bench.draw(&particles, beat, performance, 0.0);
        }
        assert_eq!(bench.session.particles.len(), 120);
    }

    #[test]
    fn image_fit_geometry() {
        let size = Size::new(400.0, 200.0);
        assert_eq!(fit_rect(ImageFit::Stretch, 100, 100, size), size.rect());
        assert_eq!(fit_rect(ImageFit::Contain, 100, 100, size), Rect::new(100.0, 0.0, 200.0, 200.0));
        assert_eq!(fit_rect(ImageFit::Cover, 100, 100, size), Rect::new(0.0, -100.0, 400.0, 400.0));
    }

    #[test]
    fn tiled_images_cover_the_surface() {
        let mut bench = Bench::mono(0.0);
        bench.assets.register(ImageHandle::new("tile", 250, 150));
        let mut tiled = layer(StyleKind::Image);
        tiled.image = Some("tile".into());
        tiled.image_fit = ImageFit::Tile;
        bench.draw(&tiled, BeatSnapshot::default(), Quality::default(), 0.0);
        assert_eq!(bench.surface.count(|c| matches!(c, DrawCommand::DrawImage { .. })), 3 * 3);
    }

    #[test]
    fn missing_images_draw_nothing() {
        let mut bench = Bench::mono(0.0);
        let mut missing = layer(StyleKind::Image);
        missing.image = Some("nope".into());
        bench.draw(&missing, BeatSnapshot::default(), Quality::default(), 0.0);
        assert!(bench.surface.commands().is_empty());
        assert!(bench.session.image_missing);
    }
}
