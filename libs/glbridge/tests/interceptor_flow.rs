//! Buffer and query interception against scripted engine and pipeline
//! fakes: sequence stamping, in-place substitution with metadata
//! preservation, deferred packet release, and allocation-query filtering.

use std::sync::Arc;

use glbridge::core::{Packet, PixelFormat, SystemClock};
use glbridge::gl::{GlInteropHelper, GlTaskRunner, gl_constants};
use glbridge::pipeline::{
    AllocationQuery, BufferFlags, FrameInterceptor, GlMemory, MetaCapability, PadProbe, PadQuery,
    PipelineBuffer, ProbeVerdict, VideoMeta,
};
use glbridge::testing::{FakeEngine, FakeGpu, FakeSinkPad};

fn interceptor_with_engine(
    gpu: &Arc<FakeGpu>,
    engine: &Arc<FakeEngine>,
    sink: FakeSinkPad,
) -> FrameInterceptor {
    use glbridge::core::engine::ProcessingEngine;

    engine.initialize("node {}").unwrap();
    let poller = engine.add_output_poller("output_video").unwrap();
    engine.start_run().unwrap();

    let runner = GlTaskRunner::spawn("engine-gl", gpu.clone());
    let helper = Arc::new(GlInteropHelper::new(runner));
    let engine: Arc<dyn ProcessingEngine> = engine.clone();
    FrameInterceptor::new(
        engine,
        poller,
        helper,
        Arc::new(sink),
        "input_video",
        Arc::new(SystemClock::new()),
    )
}

fn pipeline_buffer(gpu: &FakeGpu, pts: Option<u64>, flags: BufferFlags) -> PipelineBuffer {
    let texture = gpu.seed_texture(PixelFormat::Bgra32, 8, 4, |x, y| [x as u8, y as u8, 0, 0xFF]);
    PipelineBuffer::new(
        pts,
        flags,
        VideoMeta {
            format: PixelFormat::Bgra32,
            width: 8,
            height: 4,
            planes: 1,
        },
        GlMemory::borrowed(gl_constants::TEXTURE_2D, texture),
    )
}

#[test]
fn sequence_stamps_are_monotonic_from_zero() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    for _ in 0..5 {
        let mut buffer = pipeline_buffer(&gpu, Some(1), BufferFlags::LIVE);
        assert_eq!(interceptor.on_buffer(&mut buffer), ProbeVerdict::Pass);
    }

    assert_eq!(engine.submitted_sequences(), vec![0, 1, 2, 3, 4]);
    assert_eq!(interceptor.next_sequence(), 5);
}

#[test]
fn substitution_preserves_metadata_and_swaps_payload() {
    let gpu = FakeGpu::shared();
    let output_texture = gpu.seed_texture(PixelFormat::Rgba32, 8, 4, |_, _| [9, 9, 9, 9]);
    let engine = FakeEngine::with_transform(move |packet| {
        Packet::new(
            glbridge::core::frames::ExternalTexture {
                target: gl_constants::TEXTURE_2D,
                name: output_texture,
                width: 8,
                height: 4,
                format: PixelFormat::Rgba32,
            },
            packet.sequence(),
        )
    });
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    let mut buffer = pipeline_buffer(&gpu, Some(777), BufferFlags::LIVE | BufferFlags::DISCONT);
    let input_texture = buffer.memory().texture;
    interceptor.on_buffer(&mut buffer);

    assert_eq!(buffer.pts_ns, Some(777));
    assert_eq!(buffer.flags, BufferFlags::LIVE | BufferFlags::DISCONT);
    assert_eq!(buffer.memory().texture, output_texture);
    assert_ne!(buffer.memory().texture, input_texture);
    assert_eq!(buffer.meta().format, PixelFormat::Rgba32);
    assert_eq!(buffer.meta().planes, 1);
}

#[test]
#[should_panic(expected = "multi-plane pipeline buffers are unsupported")]
fn multi_plane_buffers_are_fatal() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    let texture = gpu.seed_texture(PixelFormat::Bgra32, 2, 2, |_, _| [0; 4]);
    let mut buffer = PipelineBuffer::new(
        None,
        BufferFlags::empty(),
        VideoMeta {
            format: PixelFormat::Bgra32,
            width: 2,
            height: 2,
            planes: 2,
        },
        GlMemory::borrowed(gl_constants::TEXTURE_2D, texture),
    );
    interceptor.on_buffer(&mut buffer);
}

#[test]
#[should_panic(expected = "engine output stream ended")]
fn engine_teardown_mid_stream_is_fatal() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    engine.shutdown();
    let mut buffer = pipeline_buffer(&gpu, None, BufferFlags::empty());
    interceptor.on_buffer(&mut buffer);
}

#[test]
fn allocation_query_strips_affine_capability_in_order() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: vec![
                MetaCapability::Other("a".into()),
                MetaCapability::AffineTransformation,
                MetaCapability::Other("b".into()),
            ],
        },
    );

    let mut query = PadQuery::Allocation(AllocationQuery::default());
    assert_eq!(interceptor.on_query(&mut query), ProbeVerdict::Handled);
    let PadQuery::Allocation(allocation) = query else {
        panic!("query kind changed");
    };
    assert_eq!(
        allocation.capabilities,
        vec![
            MetaCapability::Other("a".into()),
            MetaCapability::Other("b".into()),
        ]
    );
}

#[test]
fn rejected_sink_query_is_still_handled() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: false,
            capabilities: vec![MetaCapability::AffineTransformation],
        },
    );

    let mut query = PadQuery::Allocation(AllocationQuery::default());
    assert_eq!(interceptor.on_query(&mut query), ProbeVerdict::Handled);
    let PadQuery::Allocation(allocation) = query else {
        panic!("query kind changed");
    };
    assert!(allocation.capabilities.is_empty());
}

#[test]
fn non_allocation_queries_pass_through() {
    let gpu = FakeGpu::shared();
    let engine = FakeEngine::passthrough();
    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    let mut query = PadQuery::Other("caps".into());
    assert_eq!(interceptor.on_query(&mut query), ProbeVerdict::Pass);
}

#[test]
fn substituted_buffer_retains_engine_packet_until_dropped() {
    use std::sync::atomic::{AtomicBool, Ordering};

    use glbridge::core::CpuFrame;

    let gpu = FakeGpu::shared();
    let released = Arc::new(AtomicBool::new(false));
    let engine = {
        let released = Arc::clone(&released);
        // Output a CPU frame whose release callback we can watch; the
        // interceptor uploads it to a fresh texture whose owning buffer
        // must survive alongside the packet.
        FakeEngine::with_transform(move |packet| {
            let mut data = vec![0u8; 4 * 4 * 4].into_boxed_slice();
            let ptr = data.as_mut_ptr();
            let released = Arc::clone(&released);
            // SAFETY: data moves into the release closure, so the heap
            // block outlives the frame.
            let frame = unsafe {
                CpuFrame::from_raw_parts(
                    PixelFormat::Rgba32,
                    4,
                    4,
                    16,
                    ptr,
                    Box::new(move || {
                        drop(data);
                        released.store(true, Ordering::SeqCst);
                    }),
                )
            };
            Packet::new(frame, packet.sequence())
        })
    };

    let interceptor = interceptor_with_engine(
        &gpu,
        &engine,
        FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        },
    );

    let live_before = gpu.live_textures();
    let mut buffer = pipeline_buffer(&gpu, None, BufferFlags::empty());
    interceptor.on_buffer(&mut buffer);

    // The engine packet (and the uploaded texture behind the substituted
    // payload) survives as long as the replacement buffer does.
    assert!(!released.load(Ordering::SeqCst));
    assert_eq!(gpu.live_textures(), live_before + 2); // pipeline input + upload

    drop(buffer);
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(gpu.live_textures(), live_before + 1); // upload released
}
