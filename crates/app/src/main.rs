use std::{f32::consts::TAU, path::PathBuf};

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;
use visualiser_core::{
    presets, AnalyserHandle, CommandRecorder, EngineConfig, FrameHost, FrameOutcome,
    LayerOverrides, Scheduler, Scope, SpectrumSource, StyleKind, VisualEngine, VizError,
};

const SAMPLE_RATE: f32 = 44_100.0;

fn main() -> visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => run_render(args),
        Commands::Styles => {
            list_styles();
            Ok(())
        }
    }
}

fn run_render(args: RenderArgs) -> visualiser_core::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    tracing::info!(frames = args.frames, fps = args.fps, bpm = args.bpm, "starting offline render");

    let tap = AnalyserHandle::new(config.analyser);
    let mut engine = VisualEngine::with_config(SpectrumSource::new(tap.clone()), config)
        .with_seed(args.seed);
    engine.set_bpm_enabled(true);
    engine.set_performance_mode(args.performance);
    engine.set_style_presets(args.style_presets);

    if let Some(style) = args.style {
        engine.set_style(style);
    }
    if let Some(name) = &args.preset {
        let style = engine.defaults().style;
        let template = presets::find(style, name)
            .ok_or_else(|| VizError::msg(format!("no template `{name}` for style {style}")))?;
        engine.apply_template(Scope::Defaults, template)?;
    }
    for style in &args.layers {
        engine.add_layer(*style, LayerOverrides::default());
    }

    let mut surface = CommandRecorder::new(args.width, args.height);
    let mut signal = Synth::new(args.bpm, args.seed);
    let block = (SAMPLE_RATE / args.fps.max(1.0)).round() as usize;
    let mut host = CliHost::default();
    let mut scheduler = Scheduler::new();
    let mut last_frame = Vec::new();
    let mut fast_frames = 0u64;

    scheduler.start(&mut host);
    for frame in 0..args.frames {
        if !host.pending {
            break;
        }
        host.pending = false;

        tap.push_samples(&signal.next_block(block))?;
        engine.set_progress(frame as f32 / args.frames.max(1) as f32);

        let now = frame as f64 / args.fps as f64;
        let outcome = scheduler.on_frame(&mut host, || engine.render_frame(now, &mut surface));
        if outcome == FrameOutcome::Drawn {
            last_frame = surface.take();
            if engine.quality().fast {
                fast_frames += 1;
            }
        }
    }
    scheduler.stop();

    let stats = scheduler.stats();
    tracing::info!(
        drawn = stats.drawn,
        skipped = stats.skipped,
        failed = stats.failed,
        fast_frames,
        bpm = ?engine.bpm(),
        beat_level = engine.beat_level(),
        "render finished"
    );

    if let Some(path) = &args.dump {
        let report = serde_json::json!({
            "frames": {
                "drawn": stats.drawn,
                "throttled": stats.throttled,
                "skipped": stats.skipped,
                "failed": stats.failed,
                "fast": fast_frames,
            },
            "bpm": engine.bpm(),
            "beat_level": engine.beat_level(),
            "layers": engine.layers(),
            "commands": last_frame,
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(?path, commands = last_frame.len(), "wrote last frame");
    }

    if host.errors > 0 {
        tracing::warn!(errors = host.errors, "some frames failed");
    }
    Ok(())
}

fn list_styles() {
    for style in StyleKind::ALL {
        let names: Vec<&str> = presets::templates_for(style)
            .iter()
            .map(|template| template.name)
            .collect();
        if names.is_empty() {
            println!("{style}");
        } else {
            println!("{style}: {}", names.join(", "));
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Default)]
struct CliHost {
    pending: bool,
    errors: usize,
}

impl FrameHost for CliHost {
    fn request_frame(&mut self) {
        self.pending = true;
    }

    fn report_error(&mut self, error: &VizError) {
        self.errors += 1;
        tracing::error!(%error, "frame error");
    }
}

/// Broadband kick on every beat over a quiet sustained tone. The kick is a
/// decaying noise burst with a low sine body so it lifts the whole spectrum,
/// not just the bottom bins.
struct Synth {
    beat_period: f32,
    position: u64,
    noise: StdRng,
}

impl Synth {
    fn new(bpm: f32, seed: u64) -> Self {
        Self {
            beat_period: 60.0 / bpm.clamp(30.0, 300.0),
            position: 0,
            noise: StdRng::seed_from_u64(seed),
        }
    }

    fn next_block(&mut self, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                let t = self.position as f32 / SAMPLE_RATE;
                self.position += 1;
                let since_beat = t % self.beat_period;
                let envelope = (-since_beat * 40.0).exp();
                let burst = self.noise.gen_range(-1.0f32..1.0) * 0.6;
                let body = (TAU * 60.0 * since_beat).sin() * 0.3;
                let tone = (TAU * 440.0 * t).sin() * 0.15;
                ((burst + body) * envelope + tone).clamp(-1.0, 1.0)
            })
            .collect()
    }
}

fn parse_style(value: &str) -> Result<StyleKind, String> {
    value.parse::<StyleKind>().map_err(|err| err.to_string())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Layered music visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the engine with a synthetic beat and record draw commands.
    Render(RenderArgs),
    /// List visual styles and their built-in templates.
    Styles,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Number of host frame callbacks to run.
    #[arg(long, default_value_t = 240)]
    frames: usize,
    /// Host callback rate.
    #[arg(long, default_value_t = 60.0)]
    fps: f32,
    /// Tempo of the synthetic kick drum.
    #[arg(long, default_value_t = 120.0)]
    bpm: f32,
    #[arg(long, default_value_t = 640.0)]
    width: f32,
    #[arg(long, default_value_t = 360.0)]
    height: f32,
    /// Engine configuration file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Engine-wide style.
    #[arg(long, value_parser = parse_style)]
    style: Option<StyleKind>,
    /// Template name to apply to the engine defaults.
    #[arg(short, long)]
    preset: Option<String>,
    /// Comma-separated layer stack, bottom first.
    #[arg(long, value_delimiter = ',', value_parser = parse_style)]
    layers: Vec<StyleKind>,
    #[arg(long)]
    performance: bool,
    /// Apply each style's first template when the style changes.
    #[arg(long)]
    style_presets: bool,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Write the last drawn frame's commands as JSON.
    #[arg(long)]
    dump: Option<PathBuf>,
}
