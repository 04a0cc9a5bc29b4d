use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};

use lockstep_engine::capture::{FfmpegEncoderFactory, is_ffmpeg_on_path};
use lockstep_engine::config::{CaptureMode, MeshSource, RenderConfig, Resolution};
use lockstep_engine::device::GpuInit;
use lockstep_engine::driver::DriverApp;
use lockstep_engine::logging::{LoggingConfig, init_logging};
use lockstep_engine::mesh::{AssetCache, load_mesh};
use lockstep_engine::render::ProgramTable;
use lockstep_engine::window::{Runtime, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "lockstep", version)]
#[command(about = "Render a GPU demo live, or capture it frame-exact to a video file")]
#[command(group(ArgGroup::new("mode").args(["live", "file"])))]
struct Cli {
    /// Preview only (default).
    #[arg(long)]
    live: bool,

    /// Record a fixed number of frames to --out, then exit.
    #[arg(long)]
    file: bool,

    /// Render resolution, e.g. 1920x1080.
    #[arg(long, default_value_t = Resolution::default())]
    res: Resolution,

    /// Demo to run: "bunny" for the mesh, otherwise a procedural program name.
    #[arg(long, default_value = "bunny")]
    demo: String,

    /// Drive uniforms from the pointer (drag, wheel, clicks).
    #[arg(long)]
    mouse: bool,

    /// Output video path for --file.
    #[arg(long, default_value = "output.mp4")]
    out: PathBuf,

    /// OBJ file for the mesh demo.
    #[arg(long, conflicts_with = "mesh_url")]
    mesh: Option<PathBuf>,

    /// OBJ download for the mesh demo, cached and verified against --mesh-sha256.
    #[arg(long, requires = "mesh_sha256")]
    mesh_url: Option<String>,

    #[arg(long, requires = "mesh_url")]
    mesh_sha256: Option<String>,

    /// Where --mesh-url downloads are cached.
    #[arg(long, default_value = "assets/mesh.obj")]
    mesh_cache: PathBuf,

    /// Debug logging for the engine.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn render_config(&self) -> RenderConfig {
        let mesh = match (&self.mesh, &self.mesh_url, &self.mesh_sha256) {
            (Some(path), _, _) => MeshSource::File(path.clone()),
            (None, Some(url), Some(sha256)) => MeshSource::Cached {
                url: url.clone(),
                sha256: sha256.clone(),
                cache_path: self.mesh_cache.clone(),
            },
            _ => MeshSource::Sphere,
        };

        RenderConfig {
            resolution: self.res,
            mode: if self.file {
                CaptureMode::File
            } else {
                CaptureMode::Live
            },
            demo: self.demo.clone(),
            output: self.out.clone(),
            input_enabled: self.mouse,
            mesh,
            ..RenderConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    });

    let config = Arc::new(cli.render_config());
    log::info!(
        "lockstep: {:?} mode, {} @ {} fps, demo '{}'",
        config.mode,
        config.resolution,
        config.fps,
        config.demo
    );
    if config.is_file_mode() {
        log::info!(
            "recording {} frames to {}",
            config.target_frames,
            config.output.display()
        );
        if !is_ffmpeg_on_path(&FfmpegEncoderFactory::default().program) {
            log::warn!("ffmpeg not found on PATH; capture will fail to start");
        }
    }

    let mesh = load_mesh(&config.mesh, &AssetCache::http());
    let programs = ProgramTable::builtin();

    let gpu_init = if config.is_file_mode() {
        GpuInit::unthrottled()
    } else {
        GpuInit::default()
    };

    let app = DriverApp::new(
        Arc::clone(&config),
        programs,
        mesh,
        Box::new(FfmpegEncoderFactory::default()),
    );

    Runtime::run(RuntimeConfig::new("lockstep", config.resolution), gpu_init, app)
        .context("lockstep runtime failed")
}
