// SPDX-License-Identifier: GPL-3.0-only

//! Compositing engine
//!
//! One iteration per frame on a dedicated thread:
//!
//! ```text
//! capture ──▶ chain snapshot ──▶ apply_all ──▶ publish ──▶ release
//!    │                                                        │
//!    └───────────── budget check (Running ⇄ Degraded) ◀───────┘
//! ```
//!
//! The chain is snapshotted once per frame, so a frame is composited by
//! exactly one chain version even if the control task swaps the chain
//! mid-frame.

use super::frame_loop::{LoopAction, LoopController};
use super::stats::{EngineStatus, StateHandle};
use crate::backends::camera::FrameSource;
use crate::backends::virtual_camera::FrameSink;
use crate::config::Config;
use crate::constants::engine::{
    FRAME_LOG_INTERVAL, MAX_DROPS_PER_FRAME, PAUSE_POLL_MS, RECOVERY_FRAMES,
};
use crate::constants::pool::ACQUIRE_TIMEOUT_MS;
use crate::constants::{DegradePolicy, camera, frame_budget};
use crate::control::{ControlEvent, ControlSender};
use crate::errors::{CaptureError, EngineError};
use crate::media::{Frame, FramePool};
use crate::plugins::{ChainContext, ChainReader, StageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Target frame rate; the budget is `1 / fps`
    pub fps: u32,
    pub degrade_policy: DegradePolicy,
    pub recovery_frames: u32,
    pub max_drops: u32,
    /// Backpressure wait for pool buffers inside the chain
    pub acquire_timeout: Duration,
    pub stage_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: camera::DEFAULT_FPS,
            degrade_policy: DegradePolicy::default(),
            recovery_frames: RECOVERY_FRAMES,
            max_drops: MAX_DROPS_PER_FRAME,
            acquire_timeout: Duration::from_millis(ACQUIRE_TIMEOUT_MS),
            stage_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fps: config.camera.fps,
            degrade_policy: config.engine.degrade_policy,
            recovery_frames: config.engine.recovery_frames.max(1),
            max_drops: config.engine.max_drops,
            acquire_timeout: Duration::from_millis(config.pool.acquire_timeout_ms),
            stage_timeout: config.engine.stage_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn budget(&self) -> Duration {
        frame_budget(self.fps)
    }
}

/// The frame loop state; runs on a [`LoopController`] thread
pub struct CompositingEngine {
    config: EngineConfig,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    pool: Arc<FramePool>,
    chain: ChainReader,
    state: StateHandle,
    paused: Arc<AtomicBool>,
    /// Told about the engine stopping on its own
    notify: Option<ControlSender>,
    sequence: u64,
    in_budget_streak: u32,
    skip: Vec<Arc<str>>,
}

impl CompositingEngine {
    pub fn new(
        config: EngineConfig,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        pool: Arc<FramePool>,
        chain: ChainReader,
        state: StateHandle,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            pool,
            chain,
            state,
            paused: Arc::new(AtomicBool::new(false)),
            notify: None,
            sequence: 0,
            in_budget_streak: 0,
            skip: Vec::new(),
        }
    }

    /// Share the pause flag with the control side
    pub fn with_pause_flag(mut self, paused: Arc<AtomicBool>) -> Self {
        self.paused = paused;
        self
    }

    /// Publish `Shutdown` on the bus when the engine stops
    pub fn with_exit_notify(mut self, sender: ControlSender) -> Self {
        self.notify = Some(sender);
        self
    }

    /// Start the frame loop on its own thread
    pub fn spawn(self) -> LoopController {
        info!(
            fps = self.config.fps,
            budget = ?self.config.budget(),
            policy = self.config.degrade_policy.display_name(),
            "Starting compositing engine"
        );
        LoopController::start_with_state("compositor", self, Self::step, Self::finish)
    }

    /// One iteration: capture, composite, publish, release
    pub fn step(&mut self) -> LoopAction {
        if self.paused.load(Ordering::SeqCst) {
            self.state.update(|state| state.paused = true);
            std::thread::sleep(Duration::from_millis(PAUSE_POLL_MS));
            return LoopAction::Continue;
        }
        self.state.update(|state| {
            state.paused = false;
            if state.status == EngineStatus::Idle {
                state.status = EngineStatus::Running;
            }
        });

        let mut frame = match self.capture() {
            Ok(frame) => frame,
            Err(e) => return self.fail(e.into()),
        };

        if self.state.status() == EngineStatus::Degraded {
            frame = match self.drop_stale(frame) {
                Ok(fresh) => fresh,
                Err(e) => return self.fail(e),
            };
        }

        let started = Instant::now();
        let chain = self.chain.snapshot();
        let ctx = ChainContext {
            pool: &self.pool,
            acquire_timeout: self.config.acquire_timeout,
            skip: &self.skip,
            stage_timeout: self.config.stage_timeout,
        };
        let outcome = chain.apply_all(frame, &ctx);

        self.state.update(|state| {
            state.chain_version = chain.version();
            for stage in &outcome.stages {
                let cost = state.plugin_costs.entry(stage.name.to_string()).or_default();
                match &stage.result {
                    StageResult::Applied => cost.record(stage.elapsed),
                    StageResult::Skipped => {}
                    StageResult::Failed(error) => {
                        cost.record(stage.elapsed);
                        cost.failures += 1;
                        state.counters.plugin_failures += 1;
                        state.last_error = Some(EngineError::Plugin {
                            plugin: stage.name.to_string(),
                            error: error.clone(),
                        });
                    }
                }
            }
        });

        if let Some(e) = outcome.pool_error {
            if let Err(release) = self.pool.release(outcome.frame) {
                warn!(error = %release, "Failed to return frame after pool error");
            }
            return self.fail(e.into());
        }

        let frame = outcome.frame;
        match self.sink.publish(&frame) {
            Ok(()) => self.state.update(|state| state.counters.published += 1),
            Err(e) => {
                warn!(sequence = frame.sequence(), error = %e, "Failed to publish frame");
                self.state.update(|state| {
                    state.counters.publish_failures += 1;
                    state.last_error = Some(e.into());
                });
            }
        }

        let sequence = frame.sequence();
        if let Err(e) = self.pool.release(frame) {
            return self.fail(e.into());
        }

        self.check_budget(started.elapsed());
        if sequence % FRAME_LOG_INTERVAL == 0 {
            let snapshot = self.state.snapshot();
            debug!(
                sequence,
                version = snapshot.chain_version,
                avg = ?snapshot.frame_times.average(),
                max = ?snapshot.frame_times.max(),
                published = snapshot.counters.published,
                dropped = snapshot.counters.dropped,
                "Frame summary"
            );
        }
        LoopAction::Continue
    }

    /// Pull one frame, retrying a transient failure once
    ///
    /// A transient failure that repeats on the retry is returned like any
    /// other capture error.
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let mut frame = match self.source.next_frame(&self.pool) {
            Err(e) if e.is_transient() => {
                debug!(error = %e, "Transient capture failure, retrying");
                self.state.update(|state| state.counters.capture_retries += 1);
                self.source.next_frame(&self.pool).inspect_err(|e| {
                    if e.is_transient() {
                        warn!(error = %e, "Capture failed again after retry");
                    }
                })?
            }
            other => other?,
        };
        self.sequence += 1;
        frame.set_sequence(self.sequence);
        self.state.update(|state| state.counters.captured += 1);
        Ok(frame)
    }

    /// Release frames older than one budget, up to `max_drops`
    fn drop_stale(&mut self, mut frame: Frame) -> Result<Frame, EngineError> {
        let budget = self.config.budget();
        let mut drops = 0;
        while drops < self.config.max_drops && frame.captured_at().elapsed() > budget {
            debug!(sequence = frame.sequence(), "Dropping stale frame");
            self.pool.release(frame)?;
            drops += 1;
            self.state.update(|state| state.counters.dropped += 1);
            frame = self.capture()?;
        }
        Ok(frame)
    }

    fn check_budget(&mut self, elapsed: Duration) {
        let budget = self.config.budget();
        let policy = self.config.degrade_policy;
        let recovery = self.config.recovery_frames;
        let over = elapsed > budget;

        let mut skip_next: Option<String> = None;
        let recovered = self.state.update(|state| {
            state.frame_times.push(elapsed);
            if over {
                state.counters.over_budget += 1;
                if state.status == EngineStatus::Running {
                    info!(?elapsed, ?budget, "Frame over budget, degrading");
                    state.status = EngineStatus::Degraded;
                }
                if policy == DegradePolicy::SkipSlowest {
                    skip_next = state.slowest_plugin(&state.skipped).map(str::to_string);
                    if let Some(name) = &skip_next {
                        state.skipped.push(name.clone());
                    }
                }
                false
            } else if state.status == EngineStatus::Degraded {
                self.in_budget_streak += 1;
                if self.in_budget_streak >= recovery {
                    info!(frames = self.in_budget_streak, "Back within budget");
                    state.status = EngineStatus::Running;
                    state.skipped.clear();
                    true
                } else {
                    false
                }
            } else {
                false
            }
        });

        if over {
            self.in_budget_streak = 0;
        }
        if let Some(name) = skip_next {
            warn!(plugin = %name, "Bypassing slowest plugin while degraded");
            self.skip.push(Arc::from(name.as_str()));
        }
        if recovered {
            self.in_budget_streak = 0;
            self.skip.clear();
        }
    }

    fn fail(&mut self, e: EngineError) -> LoopAction {
        if matches!(e, EngineError::Capture(CaptureError::EndOfStream)) {
            info!("Capture source ended");
        } else {
            error!(error = %e, "Engine stopping on unrecoverable error");
        }
        self.state.update(|state| state.last_error = Some(e));
        LoopAction::Stop
    }

    /// Terminal transition; runs once on the engine thread
    fn finish(mut self) {
        self.source.stop();
        self.sink.stop();
        let pool = self.pool.stats();
        self.state.update(|state| state.status = EngineStatus::Stopped);
        info!(
            frames = self.sequence,
            outstanding = pool.outstanding,
            "Compositing engine stopped"
        );
        if let Some(notify) = self.notify.take() {
            // Fails if shutdown already closed the bus
            let _ = notify.blocking_send(ControlEvent::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::TestPatternSource;
    use crate::backends::virtual_camera::NullSink;
    use crate::constants::PoolMode;
    use crate::errors::PublishError;
    use crate::media::FrameFormat;
    use crate::errors::PoolError;
    use crate::plugins::{
        ChainHandle, PluginChain, PluginDescriptor, PluginRegistry, PluginSpec, StageOutput,
        from_fn,
    };
    use std::collections::VecDeque;

    fn format() -> FrameFormat {
        FrameFormat::rgba(32, 24)
    }

    struct Scripted {
        script: VecDeque<Result<(), CaptureError>>,
    }

    impl FrameSource for Scripted {
        fn format(&self) -> FrameFormat {
            format()
        }

        fn next_frame(&mut self, pool: &FramePool) -> Result<Frame, CaptureError> {
            match self.script.pop_front() {
                Some(Ok(())) => pool
                    .acquire(format())
                    .map_err(|e| CaptureError::Fatal(e.to_string())),
                Some(Err(e)) => Err(e),
                None => Err(CaptureError::EndOfStream),
            }
        }
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn publish(&mut self, _frame: &Frame) -> Result<(), PublishError> {
            Err(PublishError::Rejected("offline".into()))
        }
    }

    fn engine(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        handle: &ChainHandle,
        config: EngineConfig,
    ) -> (CompositingEngine, Arc<FramePool>, StateHandle) {
        engine_with_pool(source, sink, handle, config, FramePool::new(4, PoolMode::Backpressure))
    }

    fn engine_with_pool(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        handle: &ChainHandle,
        config: EngineConfig,
        pool: FramePool,
    ) -> (CompositingEngine, Arc<FramePool>, StateHandle) {
        let pool = Arc::new(pool);
        let state = StateHandle::new();
        let engine = CompositingEngine::new(
            config,
            source,
            sink,
            Arc::clone(&pool),
            handle.reader(),
            state.clone(),
        );
        (engine, pool, state)
    }

    fn run_to_end(engine: &mut CompositingEngine) -> u32 {
        let mut steps = 0;
        while engine.step() == LoopAction::Continue {
            steps += 1;
            assert!(steps < 1_000, "engine never stopped");
        }
        steps
    }

    #[test]
    fn test_transient_retried_once() {
        let script = VecDeque::from([
            Ok(()),
            Err(CaptureError::Transient("usb".into())),
            Ok(()),
            Ok(()),
            Err(CaptureError::Transient("usb".into())),
            Err(CaptureError::Transient("usb again".into())),
            Ok(()),
        ]);
        let handle = ChainHandle::new();
        let sink = NullSink::new();
        let published = sink.counter();
        let source = Box::new(Scripted { script });
        let (mut engine, pool, state) =
            engine(source, Box::new(sink), &handle, EngineConfig::default());

        run_to_end(&mut engine);
        let snapshot = state.snapshot();
        assert_eq!(published.load(Ordering::Relaxed), 3);
        assert_eq!(snapshot.counters.capture_retries, 2);
        // The second failure in a row ends the stream
        assert_eq!(
            snapshot.last_error,
            Some(EngineError::Capture(CaptureError::Transient("usb again".into())))
        );
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_publish_failure_is_counted_not_fatal() {
        let handle = ChainHandle::new();
        let source = TestPatternSource::unpaced(format()).with_frame_limit(5);
        let (mut engine, pool, state) =
            engine(Box::new(source), Box::new(FailingSink), &handle, EngineConfig::default());

        run_to_end(&mut engine);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.counters.publish_failures, 5);
        assert_eq!(snapshot.counters.published, 0);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_pool_exhaustion_is_fatal_and_returns_frame() {
        let registry = PluginRegistry::with_builtins();
        let handle = ChainHandle::new();
        let spec = PluginSpec::new("banner", 1).with_kind("text").with_option("text", "LIVE");
        handle.commit(PluginChain::build(&[spec], &registry).unwrap());

        // One buffer: the captured frame leaves nothing for the stage copy
        let config = EngineConfig {
            acquire_timeout: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        let source = TestPatternSource::unpaced(format());
        let pool = FramePool::new(1, PoolMode::Backpressure);
        let (mut engine, pool, state) =
            engine_with_pool(Box::new(source), Box::new(NullSink::new()), &handle, config, pool);

        assert_eq!(engine.step(), LoopAction::Stop);
        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.last_error,
            Some(EngineError::Pool(PoolError::Exhausted { capacity: 1 }))
        );
        assert_eq!(snapshot.counters.published, 0);
        assert_eq!(pool.stats().outstanding, 0, "Captured frame released on the fatal path");
    }

    #[test]
    fn test_degrade_and_recover() {
        let slow = Arc::new(AtomicBool::new(true));
        let plugin_slow = Arc::clone(&slow);
        let mut registry = PluginRegistry::new();
        registry.register(PluginDescriptor::new("sleepy", "sleeps while told to", &[], move |_| {
            let slow = Arc::clone(&plugin_slow);
            Ok(from_fn(move |_frame: &mut Frame, _ctx| {
                if slow.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(30));
                }
                Ok(StageOutput::InPlace)
            }))
        }));
        let handle = ChainHandle::new();
        handle.commit(PluginChain::build(&[PluginSpec::new("sleepy", 1)], &registry).unwrap());

        let config = EngineConfig {
            fps: 100,
            degrade_policy: DegradePolicy::SkipSlowest,
            ..EngineConfig::default()
        };
        let source = TestPatternSource::unpaced(format());
        let (mut engine, _pool, state) =
            engine(Box::new(source), Box::new(NullSink::new()), &handle, config);

        assert_eq!(engine.step(), LoopAction::Continue);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, EngineStatus::Degraded);
        assert_eq!(snapshot.skipped, vec!["sleepy".to_string()]);

        // Bypassed while degraded, so frames are fast again
        slow.store(false, Ordering::SeqCst);
        for _ in 0..RECOVERY_FRAMES {
            engine.step();
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, EngineStatus::Running);
        assert!(snapshot.skipped.is_empty());
        assert_eq!(snapshot.counters.over_budget, 1);
    }

    #[test]
    fn test_pause_skips_capture() {
        let handle = ChainHandle::new();
        let paused = Arc::new(AtomicBool::new(true));
        let source = TestPatternSource::unpaced(format());
        let (engine, _pool, state) =
            engine(Box::new(source), Box::new(NullSink::new()), &handle, EngineConfig::default());
        let mut engine = engine.with_pause_flag(Arc::clone(&paused));

        engine.step();
        assert!(state.snapshot().paused);
        assert_eq!(state.snapshot().counters.captured, 0);

        paused.store(false, Ordering::SeqCst);
        engine.step();
        let snapshot = state.snapshot();
        assert!(!snapshot.paused);
        assert_eq!(snapshot.counters.captured, 1);
    }
}
