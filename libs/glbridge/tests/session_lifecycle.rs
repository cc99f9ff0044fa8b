//! Session bring-up and teardown against scripted fakes: the two-phase
//! start order, abort-before-Playing on engine failure, and end-to-end
//! probe wiring.

use std::sync::Arc;

use glbridge::core::engine::{GpuResources, ProcessingEngine};
use glbridge::core::{BridgeConfig, PixelFormat};
use glbridge::gl::{GlTaskRunner, gl_constants};
use glbridge::pipeline::{BufferFlags, GlMemory, PipelineBuffer, PipelineState, VideoMeta};
use glbridge::session::BridgeSession;
use glbridge::testing::{FakeEngine, FakeGpu, FakePipeline};

fn fake_resources(gpu: &Arc<FakeGpu>) -> GpuResources {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let runner = GlTaskRunner::spawn("engine-gl", gpu.clone());
    let backend: Arc<dyn glbridge::gl::GpuBackend> = gpu.clone();
    GpuResources::from_parts(runner, backend)
}

#[test]
fn engine_initialize_failure_aborts_before_playing() {
    let engine = FakeEngine::failing_initialize();
    let pipeline = FakePipeline::new();
    let engine_dyn: Arc<dyn ProcessingEngine> = engine.clone();
    let mut session = BridgeSession::new(
        BridgeConfig::new("node {}"),
        Box::new(pipeline.clone()),
        engine_dyn,
    );

    assert!(session.start().is_err());
    assert!(!session.is_streaming());
    assert!(!pipeline.state_log().contains(&PipelineState::Playing));
    assert_eq!(engine.submission_count(), 0);
    assert!(!engine.was_started());
}

#[test]
fn ready_transition_failure_aborts_before_playing() {
    let engine = FakeEngine::passthrough();
    let pipeline = FakePipeline::new();
    pipeline.fail_on(PipelineState::Ready);
    let engine_dyn: Arc<dyn ProcessingEngine> = engine.clone();
    let mut session = BridgeSession::new(
        BridgeConfig::new("node {}"),
        Box::new(pipeline.clone()),
        engine_dyn,
    );

    assert!(session.start().is_err());
    assert!(!pipeline.state_log().contains(&PipelineState::Playing));
    assert!(!engine.was_started());
}

#[test]
fn start_walks_ready_then_playing_and_wires_the_probe() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let pipeline = FakePipeline::new();
    let engine_dyn: Arc<dyn ProcessingEngine> = engine.clone();
    let mut session = BridgeSession::new(
        BridgeConfig::new("node {}"),
        Box::new(pipeline.clone()),
        engine_dyn,
    )
    .with_gpu_resources(fake_resources(&gpu));

    session.start().unwrap();

    assert!(session.is_streaming());
    assert_eq!(
        pipeline.state_log(),
        vec![PipelineState::Ready, PipelineState::Playing]
    );
    assert!(engine.was_started());
    assert!(engine.has_gpu_resources());
    assert!(
        pipeline
            .element_flags()
            .contains(&("glsink".into(), "sync".into(), false))
    );

    // The installed probe performs a full round-trip.
    let texture = gpu.seed_texture(PixelFormat::Bgra32, 4, 4, |_, _| [1, 2, 3, 4]);
    let mut buffer = PipelineBuffer::new(
        Some(5),
        BufferFlags::LIVE,
        VideoMeta {
            format: PixelFormat::Bgra32,
            width: 4,
            height: 4,
            planes: 1,
        },
        GlMemory::borrowed(gl_constants::TEXTURE_2D, texture),
    );
    pipeline.push_buffer("flip", &mut buffer);
    assert_eq!(engine.submitted_sequences(), vec![0]);
    assert_eq!(buffer.pts_ns, Some(5));

    session.stop().unwrap();
    assert_eq!(
        pipeline.state_log(),
        vec![
            PipelineState::Ready,
            PipelineState::Playing,
            PipelineState::Null
        ]
    );
}

#[test]
fn drop_drives_pipeline_to_null() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let pipeline = FakePipeline::new();
    let engine_dyn: Arc<dyn ProcessingEngine> = engine.clone();
    let mut session = BridgeSession::new(
        BridgeConfig::new("node {}"),
        Box::new(pipeline.clone()),
        engine_dyn,
    )
    .with_gpu_resources(fake_resources(&gpu));

    session.start().unwrap();
    drop(session);
    assert_eq!(pipeline.state_log().last(), Some(&PipelineState::Null));
}
