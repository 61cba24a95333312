//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};
use visflow::{
    concurrent::SharedFuture,
    config::EngineConfig,
    context::EngineContext,
    pipeline::{Pipeline, PipelineFlowState, PipelineResult},
};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Engine context with a small worker pool
pub fn engine() -> Arc<EngineContext> {
    engine_with(|_| {})
}

/// Engine context with a customized configuration
pub fn engine_with(configure: impl FnOnce(&mut EngineConfig)) -> Arc<EngineContext> {
    let mut config = EngineConfig::default();
    config.worker_threads = 2;
    config.poll_interval_ms = 1;
    configure(&mut config);
    Arc::new(EngineContext::new(config).expect("engine context"))
}

/// Pump pipeline events until `future` resolves or the test timeout expires
pub fn wait_for(pipeline: &mut Pipeline, future: &SharedFuture<PipelineFlowState>) -> PipelineResult<PipelineFlowState> {
    let deadline = Instant::now() + test_timeout();
    loop {
        pipeline.process_events();
        if let Some(result) = future.try_result() {
            return result;
        }
        assert!(Instant::now() < deadline, "timed out waiting for evaluation");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
