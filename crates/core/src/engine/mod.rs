//! The visualization engine: the parameter-setting surface consumed by the
//! host UI and the single per-frame pass.

use crate::{
    analysis::{BeatDetector, BeatSettings, BeatSnapshot, BeatSource, EmphasisMode, SpectrumProcessor},
    assets::{AssetStore, ImageHandle},
    audio::{AnalyserTap, Channel, SpectrumSource},
    config::{clamp_smoothing, EngineConfig},
    presets::{self, Template, TemplateParam},
    render::{Color, Compositor, FrameInput, Surface},
    scene::{
        EffectiveParams, EngineDefaults, ImageFit, Layer, LayerOverrides, LayerStack, ParamUpdate,
        StyleKind,
    },
    timeline::{FrameClock, FrameOutcome, PerformanceGovernor, Quality},
    Result, VizError,
};

const DEFAULT_SEED: u64 = 0x5eed_cafe;

/// Which parameter record an update writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Engine-wide defaults every layer falls back to.
    Defaults,
    /// The selected layer, or the defaults when nothing is selected.
    Selected,
    Layer(usize),
}

#[derive(Debug)]
pub struct VisualEngine {
    source: SpectrumSource,
    processor: SpectrumProcessor,
    beat: BeatDetector,
    defaults: EngineDefaults,
    stack: LayerStack,
    compositor: Compositor,
    governor: PerformanceGovernor,
    clock: FrameClock,
    assets: AssetStore,
    album_art: Option<ImageHandle>,
    show_art: bool,
    progress: f32,
    smoothing: f32,
    style_presets: bool,
    quality: Quality,
    surface_ready: bool,
}

impl VisualEngine {
    pub fn new(source: SpectrumSource) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: SpectrumSource, config: EngineConfig) -> Self {
        let config = config.normalized();
        let governor = PerformanceGovernor::new(config.governor);
        let clock = FrameClock::new(governor.frame_interval_ms());
        let stack = LayerStack::from_layers(config.layers);
        let mut compositor = Compositor::new(DEFAULT_SEED, config.governor.max_particles);
        compositor.sync(stack.len());

        let mut engine = Self {
            source,
            processor: SpectrumProcessor::new(config.processor, config.gain),
            beat: BeatDetector::new(config.beat),
            defaults: config.defaults,
            stack,
            compositor,
            governor,
            clock,
            assets: AssetStore::new(),
            album_art: None,
            show_art: true,
            progress: 0.0,
            smoothing: config.analyser.smoothing,
            style_presets: false,
            quality: Quality::default(),
            surface_ready: true,
        };
        engine.set_smoothing(config.analyser.smoothing);
        tracing::info!(layers = engine.stack.len(), style = %engine.defaults.style, "engine configured");
        engine
    }

    /// Reseeds particle generators, for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.compositor = Compositor::new(seed, self.governor.config().max_particles);
        self.compositor.sync(self.stack.len());
        self
    }

    /// Runs one frame: reads the taps, updates the beat tracker once, then
    /// composites every visible layer onto `surface`. `now` is in seconds.
    pub fn render_frame(&mut self, now: f64, surface: &mut dyn Surface) -> Result<FrameOutcome> {
        let size = surface.size();
        let ready = surface.is_attached() && size.is_drawable();
        if ready != self.surface_ready {
            tracing::debug!(ready, width = size.width, height = size.height, "surface availability changed");
            self.surface_ready = ready;
        }
        if !ready {
            return Ok(FrameOutcome::Skipped);
        }
        if !self.clock.should_draw(now) {
            return Ok(FrameOutcome::Throttled);
        }

        self.source.refresh()?;
        let elapsed = self.clock.tick(now);
        self.beat
            .update_from_spectrum(now, self.source.magnitudes(Channel::Mono));

        let defaults = &self.defaults;
        let cost = if self.stack.is_empty() {
            self.governor
                .estimate_cost([(defaults.style, defaults.segments)])
        } else {
            self.governor.estimate_cost(
                self.stack
                    .layers()
                    .iter()
                    .filter(|layer| layer.visible)
                    .map(|layer| {
                        let segments = layer.overrides.segments.unwrap_or(defaults.segments);
                        (layer.style, segments)
                    }),
            )
        };
        self.quality = self.governor.evaluate(cost);

        let input = FrameInput {
            source: &self.source,
            defaults: &self.defaults,
            stack: &self.stack,
            assets: &self.assets,
            album_art: self.album_art.as_ref(),
            show_art: self.show_art,
            beat: self.beat.snapshot(),
            quality: self.quality,
            progress: self.progress,
            elapsed,
        };
        self.compositor
            .composite(input, &mut self.processor, surface);
        surface.present()?;
        Ok(FrameOutcome::Drawn)
    }

    // Engine-wide parameters. These write the defaults record.

    pub fn set_style(&mut self, style: StyleKind) {
        self.defaults.apply(ParamUpdate::Style(style));
        if self.style_presets {
            if let Some(template) = presets::templates_for(style).first() {
                self.apply_template_at(None, template);
            }
        }
    }

    pub fn set_colors(&mut self, color1: Color, color2: Color) {
        self.defaults.apply(ParamUpdate::Colors(color1, color2));
    }

    pub fn set_glow(&mut self, on: bool) {
        self.defaults.apply(ParamUpdate::Glow(on));
    }

    pub fn set_trail(&mut self, on: bool) {
        self.defaults.apply(ParamUpdate::Trail(on));
    }

    pub fn set_show_art(&mut self, on: bool) {
        self.show_art = on;
    }

    pub fn set_glow_strength(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::GlowStrength(value));
    }

    pub fn set_trail_alpha(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::TrailAlpha(value));
    }

    pub fn set_rotation_speed(&mut self, radians_per_second: f32) {
        self.defaults
            .apply(ParamUpdate::RotationSpeed(radians_per_second));
    }

    pub fn set_decay(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::Decay(value));
    }

    pub fn set_thickness(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::Thickness(value));
    }

    pub fn set_spike_scale(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::SpikeScale(value));
    }

    pub fn set_wave_scale(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::WaveScale(value));
    }

    pub fn set_ring_floor(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::RingFloor(value));
    }

    pub fn set_radial_floor(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::RadialFloor(value));
    }

    pub fn set_segments(&mut self, value: f32) {
        self.defaults.apply(ParamUpdate::Segments(value));
    }

    /// Clamps and forwards the smoothing constant to every wired tap. A tap
    /// that rejects it is logged and left as is.
    pub fn set_smoothing(&mut self, value: f32) {
        self.smoothing = clamp_smoothing(value);
        if let Err(err) = self.source.set_smoothing(self.smoothing) {
            tracing::warn!(error = %err, "failed to forward smoothing to analyser taps");
        }
    }

    pub fn set_emphasis_mode(&mut self, mode: EmphasisMode) {
        self.processor.set_emphasis_mode(mode);
    }

    pub fn set_emphasis(&mut self, low: f32, mid: f32, high: f32) {
        self.processor.set_emphasis(low, mid, high);
    }

    pub fn set_performance_mode(&mut self, on: bool) {
        self.governor.set_performance_mode(on);
        self.clock
            .set_min_interval_ms(self.governor.frame_interval_ms());
    }

    pub fn set_beat_sensitivity(&mut self, value: f32) {
        self.beat.set_sensitivity(value);
    }

    pub fn set_beat_boost(&mut self, value: f32) {
        self.beat.set_boost(value);
    }

    pub fn set_beat_threshold(&mut self, value: f32) {
        self.beat.set_threshold(value);
    }

    pub fn set_beat_decay(&mut self, value: f32) {
        self.beat.set_decay(value);
    }

    pub fn set_beat_source(&mut self, source: BeatSource) {
        self.beat.set_source(source);
    }

    pub fn set_beat_hold_ms(&mut self, value: f32) {
        self.beat.set_hold_ms(value);
    }

    pub fn set_pulse_width(&mut self, value: f32) {
        self.beat.set_pulse_width(value);
    }

    pub fn set_bpm_enabled(&mut self, on: bool) {
        self.beat.set_bpm_enabled(on);
    }

    /// Playback progress in `0..=1`; non-finite values count as zero.
    pub fn set_progress(&mut self, value: f32) {
        self.progress = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn set_album_art(&mut self, art: Option<ImageHandle>) {
        self.album_art = art;
    }

    /// When enabled, [`set_style`](Self::set_style) also applies the style's
    /// first built-in template.
    pub fn set_style_presets(&mut self, on: bool) {
        self.style_presets = on;
    }

    /// Wires or unwires the stereo tap pair.
    pub fn set_stereo_taps(&mut self, taps: Option<(Box<dyn AnalyserTap>, Box<dyn AnalyserTap>)>) {
        self.source.set_stereo(taps);
        self.set_smoothing(self.smoothing);
    }

    // Layer-scoped operations.

    pub fn add_layer(&mut self, style: StyleKind, params: LayerOverrides) -> usize {
        let index = self.stack.add(style, params);
        self.compositor.push_session();
        tracing::debug!(index, %style, "layer added");
        index
    }

    /// Removes a layer. Indices above `index` shift down by one.
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer> {
        let removed = self.stack.remove(index)?;
        self.compositor.remove_session(index);
        tracing::debug!(index, style = %removed.style, "layer removed");
        Ok(removed)
    }

    pub fn select_layer(&mut self, index: usize) -> Result<()> {
        self.stack.select(index)
    }

    pub fn clear_selection(&mut self) {
        self.stack.clear_selection();
    }

    pub fn selected_layer(&self) -> Option<usize> {
        self.stack.selected_index()
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.stack.set_visible(index, visible)
    }

    pub fn layers(&self) -> &[Layer] {
        self.stack.layers()
    }

    /// Points an image layer at a registered bitmap. Unknown ids are kept so
    /// the host may register the bitmap later.
    pub fn set_layer_image(&mut self, index: usize, image: Option<String>) -> Result<()> {
        let layer = self.stack.get_mut(index)?;
        layer.image = image;
        if let Err(err) = self.assets.resolve_layer(layer) {
            tracing::warn!(index, error = %err, "layer image not registered yet");
        }
        Ok(())
    }

    pub fn set_layer_img_fit(&mut self, index: usize, fit: ImageFit) -> Result<()> {
        self.stack.get_mut(index)?.image_fit = fit;
        Ok(())
    }

    /// Writes one parameter to the record `scope` names, clamping it.
    pub fn update(&mut self, scope: Scope, update: ParamUpdate) -> Result<()> {
        let target = self.target(scope)?;
        self.apply_at(target, update);
        Ok(())
    }

    /// Applies every value of `template`. Layer parameters go to `scope`, the
    /// rest are engine-wide.
    pub fn apply_template(&mut self, scope: Scope, template: &Template) -> Result<()> {
        let target = self.target(scope)?;
        self.apply_template_at(target, template);
        tracing::info!(style = %template.style, name = template.name, "applied style template");
        Ok(())
    }

    fn target(&self, scope: Scope) -> Result<Option<usize>> {
        match scope {
            Scope::Defaults => Ok(None),
            Scope::Selected => Ok(self.stack.selected_index()),
            Scope::Layer(index) => match self.stack.get(index) {
                Some(_) => Ok(Some(index)),
                None => Err(VizError::LayerIndex {
                    index,
                    len: self.stack.len(),
                }),
            },
        }
    }

    fn apply_at(&mut self, target: Option<usize>, update: ParamUpdate) {
        match target.and_then(|index| self.stack.get_mut(index).ok()) {
            Some(layer) => layer.apply(update),
            None => self.defaults.apply(update),
        }
    }

    fn apply_template_at(&mut self, target: Option<usize>, template: &Template) {
        for param in template.params {
            match *param {
                TemplateParam::Layer(update) => self.apply_at(target, update),
                TemplateParam::Smoothing(value) => self.set_smoothing(value),
                TemplateParam::Emphasis { low, mid, high } => self.set_emphasis(low, mid, high),
                TemplateParam::BeatSensitivity(value) => self.set_beat_sensitivity(value),
                TemplateParam::BeatBoost(value) => self.set_beat_boost(value),
                TemplateParam::BeatThreshold(value) => self.set_beat_threshold(value),
                TemplateParam::BeatDecay(value) => self.set_beat_decay(value),
                TemplateParam::BeatSource(source) => self.set_beat_source(source),
                TemplateParam::BeatHoldMs(value) => self.set_beat_hold_ms(value),
                TemplateParam::PulseWidth(value) => self.set_pulse_width(value),
            }
        }
    }

    // Read access.

    pub fn defaults(&self) -> &EngineDefaults {
        &self.defaults
    }

    /// Parameters layer `index` renders with this frame.
    pub fn effective_params(&self, index: usize) -> Option<EffectiveParams<'_>> {
        self.stack
            .get(index)
            .map(|layer| EffectiveParams::resolve(&self.defaults, Some(layer)))
    }

    pub fn beat(&self) -> BeatSnapshot {
        self.beat.snapshot()
    }

    pub fn beat_level(&self) -> f32 {
        self.beat.state().level
    }

    /// Estimated tempo, `None` unless BPM display is enabled.
    pub fn bpm(&self) -> Option<u32> {
        self.beat.bpm()
    }

    pub fn beat_settings(&self) -> &BeatSettings {
        self.beat.settings()
    }

    pub fn processor(&self) -> &SpectrumProcessor {
        &self.processor
    }

    /// Fidelity used by the most recent frame.
    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn performance_mode(&self) -> bool {
        self.governor.performance_mode()
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn show_art(&self) -> bool {
        self.show_art
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetStore {
        &mut self.assets
    }

    pub fn source(&self) -> &SpectrumSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{
        audio::{AnalyserHandle, StaticTap},
        config::AnalyserConfig,
        render::{CommandRecorder, DrawCommand},
        scene::{MAX_THICKNESS, MAX_TRAIL_ALPHA},
        timeline::{FrameHost, Scheduler},
        VizError,
    };

    const FRAME: f64 = 1.0 / 60.0;

    fn engine() -> VisualEngine {
        VisualEngine::new(SpectrumSource::new(StaticTap::constant(512, 0.5)))
    }

    struct FailingTap;

    impl AnalyserTap for FailingTap {
        fn bin_count(&self) -> usize {
            64
        }

        fn decibel_range(&self) -> (f32, f32) {
            (-90.0, -10.0)
        }

        fn frequency_data(&mut self, _out: &mut [f32]) -> Result<()> {
            Err(VizError::msg("tap disconnected"))
        }

        fn time_domain_data(&mut self, _out: &mut [f32]) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Host {
        requests: usize,
        errors: usize,
    }

    impl FrameHost for Host {
        fn request_frame(&mut self) {
            self.requests += 1;
        }

        fn report_error(&mut self, _error: &VizError) {
            self.errors += 1;
        }
    }

    #[test]
    fn removing_the_only_layer_leaves_the_stack_empty() {
        let mut engine = engine();
        let index = engine.add_layer(StyleKind::Radial, LayerOverrides::default());
        assert_eq!(index, 0);
        engine.remove_layer(0).unwrap();
        assert!(engine.layers().is_empty());
        assert!(engine.compositor().sessions().is_empty());
        assert!(engine.select_layer(0).is_err());
        assert_eq!(engine.selected_layer(), None);
    }

    #[test]
    fn removal_preserves_order_when_compositing() {
        let mut engine = engine();
        engine.add_layer(StyleKind::Bars, LayerOverrides::default());
        engine.add_layer(StyleKind::Wave, LayerOverrides::default());
        engine.add_layer(StyleKind::Ring, LayerOverrides::default());
        engine.remove_layer(1).unwrap();

        let styles: Vec<StyleKind> = engine.layers().iter().map(|layer| layer.style).collect();
        assert_eq!(styles, vec![StyleKind::Bars, StyleKind::Ring]);

        let mut surface = CommandRecorder::new(320.0, 240.0);
        assert_eq!(engine.render_frame(0.0, &mut surface).unwrap(), FrameOutcome::Drawn);
        let commands = surface.commands();
        let last_bar = commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::FillRoundRect { .. }))
            .unwrap();
        let ring = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::StrokePolyline { closed: true, .. }))
            .unwrap();
        assert!(last_bar < ring);
        assert!(!commands
            .iter()
            .any(|c| matches!(c, DrawCommand::StrokePolyline { closed: false, .. })));
    }

    #[test]
    fn bad_indices_fail_without_side_effects() {
        let mut engine = engine();
        engine.add_layer(StyleKind::Bars, LayerOverrides::default());
        assert!(engine.remove_layer(3).is_err());
        assert!(engine.set_layer_visible(1, false).is_err());
        assert!(engine.set_layer_img_fit(1, ImageFit::Tile).is_err());
        assert!(engine.update(Scope::Layer(5), ParamUpdate::Thickness(2.0)).is_err());
        assert_eq!(engine.layers().len(), 1);
        assert_eq!(engine.defaults().thickness, 1.0);
    }

    #[test]
    fn scoped_updates_hit_the_right_record() {
        let mut engine = engine();
        engine.add_layer(StyleKind::Circle, LayerOverrides::default());
        engine.add_layer(StyleKind::Radial, LayerOverrides::default());

        engine.update(Scope::Selected, ParamUpdate::Thickness(2.0)).unwrap();
        assert_eq!(engine.defaults().thickness, 2.0);

        engine.update(Scope::Layer(1), ParamUpdate::Thickness(3.0)).unwrap();
        assert_eq!(engine.effective_params(0).unwrap().thickness, 2.0);
        assert_eq!(engine.effective_params(1).unwrap().thickness, 3.0);

        engine.select_layer(0).unwrap();
        engine.update(Scope::Selected, ParamUpdate::Segments(3.0)).unwrap();
        assert_eq!(engine.layers()[0].overrides.segments, Some(3));
        assert_eq!(engine.defaults().segments, 1);
    }

    #[test]
    fn setters_clamp_instead_of_failing() {
        let mut engine = engine();
        engine.set_thickness(10.0);
        engine.set_trail_alpha(3.0);
        engine.set_progress(2.0);
        engine.set_beat_sensitivity(9.0);
        engine.set_smoothing(0.1);
        engine.set_rotation_speed(f32::NAN);

        assert_eq!(engine.defaults().thickness, MAX_THICKNESS);
        assert_eq!(engine.defaults().trail_alpha, MAX_TRAIL_ALPHA);
        assert_eq!(engine.progress(), 1.0);
        assert_eq!(engine.beat_settings().sensitivity, 2.5);
        assert_eq!(engine.smoothing(), 0.5);
        assert_eq!(engine.defaults().rotation_speed, 0.6);
    }

    #[test]
    fn style_presets_apply_the_first_template() {
        let mut engine = engine();
        engine.set_style(StyleKind::Circle);
        assert_eq!(engine.defaults().rotation_speed, 0.6);

        engine.set_style_presets(true);
        engine.set_style(StyleKind::Circle);
        assert_eq!(engine.defaults().style, StyleKind::Circle);
        assert_eq!(engine.defaults().rotation_speed, 0.55);
        assert_eq!(engine.defaults().spike_scale, 1.2);
        assert_eq!(engine.smoothing(), 0.75);
    }

    #[test]
    fn templates_target_a_layer_and_the_engine() {
        let mut engine = engine();
        engine.add_layer(StyleKind::Radial, LayerOverrides::default());
        let template = presets::find(StyleKind::Radial, "Radial Punchy").unwrap();
        engine.apply_template(Scope::Layer(0), template).unwrap();

        assert_eq!(engine.layers()[0].overrides.rotation_speed, Some(0.85));
        assert_eq!(engine.defaults().rotation_speed, 0.6);
        assert_eq!(engine.beat_settings().source, BeatSource::Low);
        assert_eq!(engine.beat_settings().hold_ms, 150.0);
        assert_eq!(engine.processor().settings().emphasis.low, 1.2);
    }

    #[test]
    fn image_layers_and_album_art_draw_registered_bitmaps() {
        let mut engine = engine();
        engine.assets_mut().register(ImageHandle::new("cover", 64, 64));
        let index = engine.add_layer(StyleKind::Image, LayerOverrides::default());
        engine.set_layer_image(index, Some("cover".into())).unwrap();
        engine.set_layer_img_fit(index, ImageFit::Stretch).unwrap();
        engine.set_album_art(Some(ImageHandle::new("art", 32, 32)));

        let mut surface = CommandRecorder::new(200.0, 100.0);
        engine.render_frame(0.0, &mut surface).unwrap();
        let images: Vec<_> = surface
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::DrawImage { image, clip, .. } => Some((image.as_str(), clip.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(images, vec![("art", true), ("cover", false)]);

        engine.set_show_art(false);
        surface.clear_commands();
        engine.render_frame(1.0, &mut surface).unwrap();
        assert_eq!(surface.count(|c| matches!(c, DrawCommand::DrawImage { .. })), 1);
    }

    #[test]
    fn undersized_or_detached_surfaces_skip_the_frame() {
        let mut engine = engine();
        let mut surface = CommandRecorder::new(1.0, 300.0);
        assert_eq!(engine.render_frame(0.0, &mut surface).unwrap(), FrameOutcome::Skipped);
        assert!(surface.commands().is_empty());

        surface.resize(300.0, 300.0);
        assert_eq!(engine.render_frame(FRAME, &mut surface).unwrap(), FrameOutcome::Drawn);

        surface.detach();
        assert_eq!(engine.render_frame(2.0 * FRAME, &mut surface).unwrap(), FrameOutcome::Skipped);
    }

    #[test]
    fn callbacks_faster_than_the_gate_are_throttled() {
        let mut engine = engine();
        let mut surface = CommandRecorder::new(300.0, 300.0);
        assert_eq!(engine.render_frame(0.0, &mut surface).unwrap(), FrameOutcome::Drawn);
        assert_eq!(engine.render_frame(0.005, &mut surface).unwrap(), FrameOutcome::Throttled);
        assert_eq!(engine.render_frame(FRAME, &mut surface).unwrap(), FrameOutcome::Drawn);

        engine.set_performance_mode(true);
        assert_eq!(engine.render_frame(2.0 * FRAME, &mut surface).unwrap(), FrameOutcome::Throttled);
        assert_eq!(engine.render_frame(3.0 * FRAME, &mut surface).unwrap(), FrameOutcome::Drawn);
    }

    #[test]
    fn heavy_stacks_switch_to_fast_mode() {
        let mut engine = engine();
        let mut surface = CommandRecorder::new(300.0, 300.0);
        engine.render_frame(0.0, &mut surface).unwrap();
        assert!(!engine.quality().fast);

        for style in [StyleKind::Circle, StyleKind::Radial, StyleKind::Circle] {
            let index = engine.add_layer(style, LayerOverrides::default());
            engine.update(Scope::Layer(index), ParamUpdate::Segments(4.0)).unwrap();
        }
        engine.render_frame(1.0, &mut surface).unwrap();
        assert!(engine.quality().fast);
    }

    #[test]
    fn scheduler_keeps_running_after_a_failed_frame() {
        let mut engine = VisualEngine::new(SpectrumSource::new(FailingTap));
        let mut surface = CommandRecorder::new(300.0, 300.0);
        let mut host = Host::default();
        let mut scheduler = Scheduler::new();
        scheduler.start(&mut host);

        for frame in 0..3 {
            let now = frame as f64 * FRAME;
            let outcome = scheduler.on_frame(&mut host, || engine.render_frame(now, &mut surface));
            assert_eq!(outcome, FrameOutcome::Failed);
        }
        assert_eq!(host.errors, 3);
        assert_eq!(host.requests, 4);
        assert!(scheduler.is_running());
    }

    #[test]
    fn periodic_noise_bursts_drive_the_beat_tracker() {
        let tap = AnalyserHandle::new(AnalyserConfig::default());
        let mut engine = VisualEngine::new(SpectrumSource::new(tap.clone()));
        engine.set_bpm_enabled(true);
        engine.set_smoothing(0.5);

        let mut noise = StdRng::seed_from_u64(3);
        let mut surface = CommandRecorder::new(300.0, 300.0);
        let mut position = 0u64;
        let mut peak = 0.0f32;
        for frame in 0..240 {
            let block: Vec<f32> = (0..735)
                .map(|_| {
                    let since_beat = (position % 22_050) as f32 / 44_100.0;
                    position += 1;
                    noise.gen_range(-1.0f32..1.0) * 0.6 * (-since_beat * 40.0).exp()
                })
                .collect();
            tap.push_samples(&block).unwrap();
            engine.render_frame(frame as f64 * FRAME, &mut surface).unwrap();
            peak = peak.max(engine.beat_level());
        }

        assert!(peak > 0.1, "beat level never rose: {peak}");
        let bpm = engine.bpm().expect("tempo estimate");
        assert!((118..=122).contains(&bpm), "bpm {bpm}");
    }
}
