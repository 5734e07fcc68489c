// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the compositing pipeline

use image::{Rgba, RgbaImage};
use overlaycam::backends::camera::{StillImageSource, TestPatternSource};
use overlaycam::backends::virtual_camera::{FrameSink, NullSink};
use overlaycam::constants::PoolMode;
use overlaycam::control::ControlEvent;
use overlaycam::errors::{
    CaptureError, ChainError, EngineError, PluginError, PoolError, PublishError,
};
use overlaycam::pipelines::{self, EngineStatus, PipelineHandle};
use overlaycam::plugins::{
    ChainContext, ChainHandle, OptionField, OptionKind, PluginDescriptor, StageOutput, StageResult,
    from_fn,
};
use overlaycam::{Config, Frame, FrameFormat, FramePool, PluginChain, PluginRegistry, PluginSpec};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn vga() -> FrameFormat {
    FrameFormat::rgba(640, 480)
}

/// Pixels that are no longer black
fn lit(frame: &Frame) -> usize {
    frame
        .data()
        .chunks_exact(4)
        .filter(|px| px[0] != 0 || px[1] != 0 || px[2] != 0)
        .count()
}

fn black_frame(pool: &FramePool, sequence: u64) -> Frame {
    let mut frame = pool.acquire(vga()).unwrap();
    frame.fill([0, 0, 0, 255]);
    frame.set_sequence(sequence);
    frame
}

fn ctx(pool: &FramePool) -> ChainContext<'_> {
    ChainContext {
        pool,
        acquire_timeout: Duration::from_millis(200),
        skip: &[],
        stage_timeout: None,
    }
}

fn live_banner(position: u32) -> PluginSpec {
    PluginSpec::new("banner", position)
        .with_kind("text")
        .with_option("text", "LIVE")
        .with_option("x", 10i64)
        .with_option("y", 10i64)
}

/// Built-ins plus a couple of test kinds
fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins();
    registry.register(PluginDescriptor::new(
        "paint",
        "fill with a grey shade",
        &[OptionField::required("shade", OptionKind::Integer)],
        |options| {
            let shade = options.integer("shade")?.unwrap_or(0) as u8;
            Ok(from_fn(move |frame, _ctx| {
                frame.fill([shade, shade, shade, 255]);
                Ok(StageOutput::InPlace)
            }))
        },
    ));
    registry.register(PluginDescriptor::new("broken", "scribbles, then fails", &[], |_| {
        Ok(from_fn(|frame, _ctx| {
            frame.fill([255, 0, 0, 255]);
            Err(PluginError::render("boom"))
        }))
    }));
    registry
}

#[test]
fn test_empty_chain_is_identity() {
    let pool = FramePool::new(4, PoolMode::Backpressure);
    let chain = PluginChain::empty();
    let mut input = pool.acquire(vga()).unwrap();
    input.fill([12, 34, 56, 255]);
    input.set_sequence(3);
    let expected = input.to_detached();

    let outcome = chain.apply_all(input, &ctx(&pool));
    assert!(outcome.stages.is_empty());
    assert!(outcome.pool_error.is_none());
    assert_eq!(outcome.frame.data(), expected.data());
    assert_eq!(outcome.frame.sequence(), 3);

    pool.release(outcome.frame).unwrap();
    assert_eq!(pool.stats().outstanding, 0);
}

#[test]
fn test_live_text_overlay() {
    let registry = registry();
    let pool = FramePool::new(4, PoolMode::Backpressure);
    let chain = PluginChain::build(&[live_banner(0)], &registry).unwrap();

    let outcome = chain.apply_all(black_frame(&pool, 41), &ctx(&pool));
    assert_eq!(outcome.stages.len(), 1);
    assert_eq!(outcome.stages[0].result, StageResult::Applied);

    let frame = outcome.frame;
    assert_eq!(frame.format(), vga(), "Output keeps the input format");
    assert_eq!(frame.sequence(), 41, "Output keeps the input sequence");
    assert!(lit(&frame) > 0, "Text should be drawn");
    assert_eq!(frame.pixel(600, 400), Some([0, 0, 0, 255]), "Far corner untouched");

    pool.release(frame).unwrap();
    assert_eq!(pool.stats().outstanding, 0, "Every stage buffer returned");
}

#[test]
fn test_failing_plugin_passes_frame_through() {
    let registry = registry();
    let pool = FramePool::new(4, PoolMode::Backpressure);
    let specs = [
        PluginSpec::new("paint", 0).with_option("shade", 90i64),
        PluginSpec::new("broken", 1),
    ];
    let chain = PluginChain::build(&specs, &registry).unwrap();

    let outcome = chain.apply_all(black_frame(&pool, 0), &ctx(&pool));
    assert_eq!(outcome.stages[0].result, StageResult::Applied);
    assert!(matches!(outcome.stages[1].result, StageResult::Failed(PluginError::RenderFailure(_))));
    // The failed stage's scribble is discarded
    assert_eq!(outcome.frame.pixel(0, 0), Some([90, 90, 90, 255]));

    pool.release(outcome.frame).unwrap();
    assert_eq!(pool.stats().outstanding, 0);
}

#[test]
fn test_invalid_chain_keeps_active_version() {
    let registry = registry();
    let handle = ChainHandle::new();
    assert_eq!(handle.rebuild(&[live_banner(0)], &registry).unwrap(), 1);

    let duplicate = [live_banner(0), PluginSpec::new("clock", 0)];
    assert!(matches!(
        handle.rebuild(&duplicate, &registry),
        Err(ChainError::DuplicatePosition { position: 0, .. })
    ));

    let unknown = [PluginSpec::new("nonexistent", 0)];
    assert!(matches!(handle.rebuild(&unknown, &registry), Err(ChainError::UnknownPlugin(_))));

    let huge_interval = [PluginSpec::new("cpu", 0).with_option("update_interval", 1e30)];
    assert!(matches!(
        handle.rebuild(&huge_interval, &registry),
        Err(ChainError::InvalidOption(..))
    ));

    assert_eq!(handle.version(), 1);
    assert_eq!(handle.snapshot().enabled_names(), vec!["banner"]);
}

#[test]
fn test_snapshot_survives_swap() {
    let registry = registry();
    let pool = FramePool::new(8, PoolMode::Backpressure);
    let handle = ChainHandle::new();
    let reader = handle.reader();
    handle
        .rebuild(&[PluginSpec::new("paint", 0).with_option("shade", 10i64)], &registry)
        .unwrap();

    let held = reader.snapshot();
    handle
        .rebuild(&[PluginSpec::new("paint", 0).with_option("shade", 200i64)], &registry)
        .unwrap();

    // A frame that started on v1 finishes on v1
    assert_eq!(held.version(), 1);
    let old = held.apply_all(black_frame(&pool, 0), &ctx(&pool));
    assert_eq!(old.frame.pixel(0, 0), Some([10, 10, 10, 255]));

    let current = reader.snapshot();
    assert_eq!(current.version(), 2);
    let new = current.apply_all(black_frame(&pool, 1), &ctx(&pool));
    assert_eq!(new.frame.pixel(0, 0), Some([200, 200, 200, 255]));

    pool.release(old.frame).unwrap();
    pool.release(new.frame).unwrap();
}

#[test]
fn test_concurrent_swaps_never_mix_versions() {
    let registry = Arc::new(registry());
    let handle = ChainHandle::new();
    let reader = handle.reader();
    handle
        .rebuild(&[PluginSpec::new("paint", 0).with_option("shade", 1i64)], &registry)
        .unwrap();

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for shade in 2..40i64 {
                handle
                    .rebuild(&[PluginSpec::new("paint", 0).with_option("shade", shade)], &registry)
                    .unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            handle
        })
    };

    let pool = FramePool::new(4, PoolMode::Backpressure);
    for sequence in 0..60 {
        let chain = reader.snapshot();
        let outcome = chain.apply_all(black_frame(&pool, sequence), &ctx(&pool));
        // Version N is the chain painting shade N
        let shade = chain.version() as u8;
        assert_eq!(outcome.frame.pixel(5, 5), Some([shade, shade, shade, 255]));
        pool.release(outcome.frame).unwrap();
    }

    let handle = writer.join().unwrap();
    assert_eq!(handle.version(), 39);
    assert_eq!(pool.stats().outstanding, 0);
}

#[test]
fn test_pool_backpressure() {
    let pool = Arc::new(FramePool::new(4, PoolMode::Backpressure));
    let mut held: Vec<Frame> = (0..4).map(|_| pool.acquire(vga()).unwrap()).collect();

    assert_eq!(
        pool.acquire_timeout(vga(), Duration::from_millis(20)).unwrap_err(),
        PoolError::Exhausted { capacity: 4 }
    );

    let releaser = {
        let pool = Arc::clone(&pool);
        let frame = held.pop().unwrap();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            pool.release(frame).unwrap();
        })
    };
    let waited = pool.acquire(vga()).unwrap();
    releaser.join().unwrap();
    held.push(waited);

    let stats = pool.stats();
    assert_eq!(stats.pooled, 4, "Never more than capacity buffers");
    assert!(stats.waits >= 2);
    for frame in held {
        pool.release(frame).unwrap();
    }
    assert_eq!(pool.stats().outstanding, 0);
}

/// Sink that remembers the sequence and lit pixel count of every frame
#[derive(Clone, Default)]
struct RecordingSink {
    frames: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl RecordingSink {
    fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn since(&self, from: usize) -> Vec<(u64, usize)> {
        self.frames.lock().unwrap()[from..].to_vec()
    }
}

impl FrameSink for RecordingSink {
    fn publish(&mut self, frame: &Frame) -> Result<(), PublishError> {
        self.frames.lock().unwrap().push((frame.sequence(), lit(frame)));
        Ok(())
    }
}

fn black_source() -> Box<StillImageSource> {
    let image = RgbaImage::from_pixel(640, 480, Rgba([0, 0, 0, 255]));
    Box::new(StillImageSource::from_image(image, None, None))
}

fn small_config(plugins: Vec<PluginSpec>) -> Config {
    let mut config = Config::default();
    config.camera.width = 640;
    config.camera.height = 480;
    // Generous budget so slow test builds never degrade
    config.camera.fps = 5;
    config.pool.capacity = 4;
    config.plugins = plugins;
    config
}

async fn wait_for(pipeline: &PipelineHandle, what: &str, check: impl Fn(&PipelineHandle) -> bool) {
    for _ in 0..500 {
        if check(pipeline) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_runs_until_source_ends() {
    let config = small_config(vec![live_banner(0)]);
    let source = TestPatternSource::unpaced(vga()).with_frame_limit(25);
    let sink = NullSink::expecting(vga());
    let published = sink.counter();

    let mut pipeline =
        pipelines::start(&config, Arc::new(registry()), Box::new(source), Box::new(sink)).unwrap();
    assert_eq!(pipeline.chain().version(), 1);

    // The engine announces the end of the stream on the bus
    pipeline.wait().await;
    let report = pipeline.shutdown().await;

    assert!(report.engine_joined);
    assert!(report.abandoned_producers.is_empty());
    assert_eq!(report.final_state.status, EngineStatus::Stopped);
    assert_eq!(report.final_state.counters.published, 25);
    assert_eq!(published.load(Ordering::Relaxed), 25);
    assert_eq!(
        report.final_state.last_error,
        Some(EngineError::Capture(CaptureError::EndOfStream))
    );
    assert_eq!(report.pool.outstanding, 0, "Every buffer returned to the pool");
    assert!(report.pool.pooled <= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_toggle_removes_overlay() {
    let config = small_config(vec![live_banner(0)]);
    let sink = RecordingSink::default();
    let pipeline =
        pipelines::start(&config, Arc::new(registry()), black_source(), Box::new(sink.clone()))
            .unwrap();

    wait_for(&pipeline, "first frames", |_| sink.len() >= 3).await;
    assert!(sink.since(0).iter().all(|&(_, lit)| lit > 0), "v1 draws the banner");

    pipeline.toggle("banner", Some(false)).await.unwrap();
    wait_for(&pipeline, "chain v2", |p| p.chain().version() == 2).await;
    wait_for(&pipeline, "engine on v2", |p| p.state().chain_version == 2).await;

    let mark = sink.len();
    wait_for(&pipeline, "frames on v2", |_| sink.len() >= mark + 3).await;
    // The frame in flight at the mark may still be a v1 frame
    let after = sink.since(mark + 1);
    assert!(!after.is_empty());
    assert!(after.iter().all(|&(_, lit)| lit == 0), "v2 has no banner");

    let report = pipeline.shutdown().await;
    assert!(report.engine_joined);
    assert_eq!(report.pool.outstanding, 0);

    // Sequence numbers are strictly increasing across the swap
    let frames = sink.since(0);
    assert!(frames.windows(2).all(|w| w[0].0 < w[1].0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_reload_keeps_chain() {
    let config = small_config(vec![live_banner(0)]);
    let pipeline =
        pipelines::start(&config, Arc::new(registry()), black_source(), Box::new(NullSink::new()))
            .unwrap();

    let invalid = vec![live_banner(0), PluginSpec::new("clock", 0)];
    pipeline.reload(invalid).await.unwrap();
    wait_for(&pipeline, "rejection", |p| {
        matches!(
            p.state().last_error,
            Some(EngineError::Chain(ChainError::DuplicatePosition { .. }))
        )
    })
    .await;
    assert_eq!(pipeline.chain().version(), 1);

    pipeline.reorder(vec!["banner".into()]).await.unwrap();
    pipeline.set_option("banner", "text", "OFF AIR".into()).await.unwrap();
    wait_for(&pipeline, "option edit", |p| p.chain().version() == 2).await;
    let chain = pipeline.chain();
    let banner = chain.spec("banner").unwrap();
    assert_eq!(banner.options.get("text").map(ToString::to_string).as_deref(), Some("OFF AIR"));

    let report = pipeline.shutdown().await;
    assert_eq!(report.pool.outstanding, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_and_resume() {
    let config = small_config(Vec::new());
    let sink = RecordingSink::default();
    let pipeline =
        pipelines::start(&config, Arc::new(registry()), black_source(), Box::new(sink.clone()))
            .unwrap();
    assert_eq!(pipeline.chain().version(), 0, "An empty config commits nothing");

    wait_for(&pipeline, "first frames", |_| sink.len() > 0).await;
    pipeline.pause(true).await.unwrap();
    wait_for(&pipeline, "pause", |p| p.state().paused).await;

    let frozen = sink.len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(sink.len() <= frozen + 1, "At most the in-flight frame after pausing");

    pipeline.pause(false).await.unwrap();
    wait_for(&pipeline, "resume", |_| sink.len() > frozen + 2).await;
    assert!(!pipeline.is_paused());

    let report = pipeline.shutdown().await;
    assert_eq!(report.final_state.status, EngineStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_bus() {
    let config = small_config(vec![live_banner(0)]);
    let pipeline =
        pipelines::start(&config, Arc::new(registry()), black_source(), Box::new(NullSink::new()))
            .unwrap();
    let late = pipeline.sender("test");

    let report = pipeline.shutdown().await;
    assert!(report.engine_joined);
    assert_eq!(report.pool.outstanding, 0);
    assert!(late.is_closed());
    assert!(late.send(ControlEvent::toggle("banner")).await.is_err());
}

#[tokio::test]
async fn test_cancelled_wait_keeps_discard_count() {
    let config = small_config(vec![live_banner(0)]);
    let mut pipeline =
        pipelines::start(&config, Arc::new(registry()), black_source(), Box::new(NullSink::new()))
            .unwrap();

    // Like `--duration` winning the select against `wait`
    let waited = tokio::time::timeout(Duration::from_millis(20), pipeline.wait()).await;
    assert!(waited.is_err());

    // Queued without yielding, so the consumer sees them in one batch
    let sender = pipeline.sender("test");
    sender.send(ControlEvent::Shutdown).await.unwrap();
    sender.send(ControlEvent::toggle("banner")).await.unwrap();
    sender.send(ControlEvent::toggle("banner")).await.unwrap();

    let report = pipeline.shutdown().await;
    assert!(report.engine_joined);
    assert_eq!(report.discarded_events, 3, "Both toggles and the second Shutdown");
}

#[test]
fn test_start_rejects_invalid_plugins() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let config = small_config(vec![PluginSpec::new("nonexistent", 0)]);
        let sink = Box::new(NullSink::new());
        let result = pipelines::start(&config, Arc::new(registry()), black_source(), sink);
        assert!(result.is_err());
    });
}
