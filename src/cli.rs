// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running the overlay pipeline
//! - Validating a config file
//! - Listing plugin kinds

use overlaycam::backends::camera::{FrameSource, StillImageSource, TestPatternSource};
use overlaycam::backends::virtual_camera::{FrameSink, NullSink};
use overlaycam::config::{Config, ConfigSource, JsonConfigSource, StaticConfigSource};
use overlaycam::control::{ControlEvent, hotkeys, watcher};
use overlaycam::errors::{CaptureError, EngineError};
use overlaycam::media::FrameFormat;
use overlaycam::pipelines::{self, ShutdownReport};
use overlaycam::plugins::{PluginChain, PluginRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Options of the `run` command
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub source: String,
    pub sink: String,
    pub duration: Option<u64>,
    pub hotkeys: bool,
    pub watch: bool,
}

fn config_source(path: Option<PathBuf>) -> Arc<dyn ConfigSource> {
    match path {
        Some(path) => Arc::new(JsonConfigSource::new(path)),
        None => Arc::new(StaticConfigSource::default()),
    }
}

fn open_source(spec: &str, config: &Config) -> CliResult<Box<dyn FrameSource>> {
    let camera = &config.camera;
    let format = FrameFormat::rgba(camera.width, camera.height);

    if let Some(path) = spec.strip_prefix("image:") {
        let size = camera.fit.then_some((camera.width, camera.height));
        return Ok(Box::new(StillImageSource::open(Path::new(path), size, camera.fps)?));
    }
    match spec {
        "test" => Ok(Box::new(TestPatternSource::new(format, camera.fps))),
        #[cfg(feature = "gstreamer")]
        "camera" => Ok(Box::new(overlaycam::backends::camera::V4l2Source::open(
            camera.device,
            camera.width,
            camera.height,
            camera.fps,
        )?)),
        #[cfg(not(feature = "gstreamer"))]
        "camera" => Err("camera capture needs the 'gstreamer' feature; try --source test".into()),
        other => Err(format!("unknown source '{other}'").into()),
    }
}

fn open_sink(spec: &str, format: FrameFormat, fps: u32) -> CliResult<Box<dyn FrameSink>> {
    if spec == "null" {
        return Ok(Box::new(NullSink::expecting(format)));
    }

    #[cfg(feature = "gstreamer")]
    {
        use overlaycam::backends::virtual_camera::{OutputTarget, VirtualCameraPipeline};
        let target = match spec {
            "pipewire" => OutputTarget::PipeWire,
            other => match other.strip_prefix("v4l2:") {
                Some(device) => OutputTarget::V4l2Loopback(device.to_string()),
                None => return Err(format!("unknown sink '{other}'").into()),
            },
        };
        let pipeline = VirtualCameraPipeline::new(format, fps, &target)?;
        pipeline.start()?;
        Ok(Box::new(pipeline))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        let _ = (format, fps);
        Err(format!("sink '{spec}' needs the 'gstreamer' feature; try --sink null").into())
    }
}

/// Run the pipeline until Ctrl+C, the quit hotkey, the end of the source
/// or the optional duration
pub fn run(options: RunOptions) -> CliResult<()> {
    let source = config_source(options.config_path.clone());
    let config = source.load()?;
    let registry = Arc::new(PluginRegistry::with_builtins());

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(run_pipeline(options, config, source, registry))?;

    let state = &report.final_state;
    println!(
        "Published {} frames ({} dropped, {} publish failures, {} plugin failures)",
        state.counters.published,
        state.counters.dropped,
        state.counters.publish_failures,
        state.counters.plugin_failures
    );
    println!(
        "Frame time: avg {:.1} ms, max {:.1} ms",
        state.frame_times.average().as_secs_f64() * 1000.0,
        state.frame_times.max().as_secs_f64() * 1000.0
    );
    if !report.abandoned_producers.is_empty() {
        println!("Abandoned: {}", report.abandoned_producers.join(", "));
    }

    // A source running out of frames is a normal end
    match &state.last_error {
        Some(EngineError::Capture(CaptureError::EndOfStream)) => Ok(()),
        Some(e @ (EngineError::Capture(_) | EngineError::Pool(_))) => Err(e.to_string().into()),
        _ => Ok(()),
    }
}

async fn run_pipeline(
    options: RunOptions,
    config: Config,
    config_source: Arc<dyn ConfigSource>,
    registry: Arc<PluginRegistry>,
) -> CliResult<ShutdownReport> {
    let frame_source = open_source(&options.source, &config)?;
    let sink = open_sink(&options.sink, frame_source.format(), config.camera.fps)?;
    let mut pipeline = pipelines::start(&config, registry, frame_source, sink)?;

    // Set up Ctrl+C handler
    let interrupt = pipeline.sender("ctrl-c");
    ctrlc::set_handler(move || {
        let _ = interrupt.blocking_send(ControlEvent::Shutdown);
    })?;

    if options.hotkeys {
        let keymap = hotkeys::Keymap::from_config(&config.hotkeys, &config.shortcuts);
        if let Some(producer) = hotkeys::spawn(keymap, pipeline.sender("hotkeys")) {
            pipeline.add_producer(producer);
        }
    }

    if options.watch
        && let Some(interval) = config.control.watch_interval()
        && let Some(producer) =
            watcher::spawn(config_source, interval, pipeline.sender("config-watcher"))
    {
        pipeline.add_producer(producer);
    }

    info!(
        version = pipeline.chain().version(),
        plugins = ?pipeline.chain().enabled_names(),
        "Pipeline running"
    );

    match options.duration {
        Some(secs) => {
            tokio::select! {
                _ = pipeline.wait() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Duration elapsed, stopping");
                }
            }
        }
        None => pipeline.wait().await,
    }

    Ok(pipeline.shutdown().await)
}

/// Validate the config file and build its chain without touching any device
pub fn check(config_path: Option<PathBuf>, print: bool) -> CliResult<()> {
    if let Some(path) = &config_path {
        println!("Config: {}", path.display());
    }
    let config = config_source(config_path).load()?;
    let registry = PluginRegistry::with_builtins();
    let chain = PluginChain::build(&config.plugins, &registry)?;

    let keymap = hotkeys::Keymap::from_config(&config.hotkeys, &config.shortcuts);
    println!(
        "Camera: {}x{} @ {}fps (device {})",
        config.camera.width, config.camera.height, config.camera.fps, config.camera.device
    );
    println!("Plugins ({} enabled of {}):", chain.enabled_names().len(), chain.len());
    for spec in chain.specs() {
        let marker = if spec.enabled { "*" } else { " " };
        println!("  {} [{}] {} ({})", marker, spec.position, spec.name, spec.kind());
    }
    println!("Hotkeys: {}", keymap.len());

    if print {
        println!();
        println!("{}", config.to_json());
    }
    Ok(())
}

/// List all plugin kinds with their option schemas
pub fn list_plugins() -> CliResult<()> {
    let registry = PluginRegistry::with_builtins();

    println!("Available plugins:");
    println!();
    for descriptor in registry.descriptors() {
        println!("  {:<8} {}", descriptor.kind, descriptor.description);
        let options: Vec<String> = descriptor
            .schema
            .iter()
            .map(|field| {
                let required = if field.required { "!" } else { "" };
                format!("{}{}:{}", field.name, required, field.kind.name())
            })
            .collect();
        if !options.is_empty() {
            println!("           Options: {}", options.join(", "));
        }
    }

    let aliases = registry.aliases();
    if !aliases.is_empty() {
        println!();
        for (alias, kind) in aliases {
            println!("  {} -> {}", alias, kind);
        }
    }
    Ok(())
}
