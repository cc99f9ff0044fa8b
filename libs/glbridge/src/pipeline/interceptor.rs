// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-flight buffer substitution at the probed pad.
//!
//! The buffer probe runs on the pipeline's streaming thread and performs
//! one blocking engine round-trip per buffer: wrap the pipeline texture
//! without taking ownership, submit it, wait for the engine's result,
//! resolve the result to a texture inside the engine's context, and swap
//! the buffer's payload while copying its metadata. This is a hard
//! backpressure point by design - there is no pipelining, and end-to-end
//! throughput is bounded by the sum of both contexts' per-frame cost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::clock::{FramePacer, MonotonicClock};
use crate::core::engine::{OutputPoller, ProcessingEngine};
use crate::core::frames::ExternalTexture;
use crate::core::packet::Packet;
use crate::gl::interop::GlInteropHelper;
use crate::gl::runner::TaskTag;
use crate::pipeline::buffer::{GlMemory, PipelineBuffer, VideoMeta};
use crate::pipeline::probe::{MetaCapability, PadProbe, PadQuery, ProbeVerdict, SinkPad};

const NODE_NAME: &str = "frame_interceptor";

/// Pad probe that feeds pipeline buffers through the processing engine and
/// substitutes the results in place.
pub struct FrameInterceptor {
    engine: Arc<dyn ProcessingEngine>,
    poller: Mutex<Box<dyn OutputPoller>>,
    helper: Arc<GlInteropHelper>,
    sink: Arc<dyn SinkPad>,
    input_stream: String,
    /// Private sequence stamp for submitted packets. Strictly monotonic
    /// from zero; never wall-clock time.
    sequence: AtomicU64,
    pacer: Mutex<FramePacer>,
}

impl FrameInterceptor {
    pub fn new(
        engine: Arc<dyn ProcessingEngine>,
        poller: Box<dyn OutputPoller>,
        helper: Arc<GlInteropHelper>,
        sink: Arc<dyn SinkPad>,
        input_stream: impl Into<String>,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        Self {
            engine,
            poller: Mutex::new(poller),
            helper,
            sink,
            input_stream: input_stream.into(),
            sequence: AtomicU64::new(0),
            pacer: Mutex::new(FramePacer::new(clock)),
        }
    }

    /// Sequence stamp the next submitted buffer will carry.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl PadProbe for FrameInterceptor {
    fn on_buffer(&self, buffer: &mut PipelineBuffer) -> ProbeVerdict {
        let meta = *buffer.meta();
        assert_eq!(
            meta.planes, 1,
            "multi-plane pipeline buffers are unsupported ({} planes)",
            meta.planes
        );

        // Wrap the pipeline's texture without taking ownership; the
        // pipeline holds this buffer until the probe returns, which is
        // what keeps the memory stable across the round-trip.
        let memory = buffer.memory();
        let wrapped = ExternalTexture {
            target: memory.target,
            name: memory.texture,
            width: meta.width,
            height: meta.height,
            format: meta.format,
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.engine
            .add_packet(&self.input_stream, Packet::new(wrapped, sequence))
            .unwrap_or_else(|e| panic!("engine rejected input at seq {sequence}: {e}"));

        // Blocking round-trip: we are acting as a pipeline filter here, so
        // any latency directly stalls the streaming thread.
        let output = self
            .poller
            .lock()
            .next()
            .unwrap_or_else(|| panic!("engine output stream ended at seq {sequence}"));

        let tag = TaskTag::new(NODE_NAME, Some(sequence));
        let retained = output.clone();
        let (target, name, width, height, format, resolved_buffer) = self
            .helper
            .run_in_context(&tag, |scope| {
                let view = scope.resolve_packet_texture(&output)?;
                Ok((
                    view.target(),
                    view.name(),
                    view.width(),
                    view.height(),
                    view.format(),
                    // For payloads resolved through a fresh owning buffer
                    // (CPU frame uploads), the view's backing must outlive
                    // the scope too.
                    view.buffer().cloned(),
                ))
            })
            .unwrap_or_else(|e| panic!("failed to resolve engine output at seq {sequence}: {e}"));

        if let Some(interval) = self.pacer.lock().tick() {
            tracing::debug!(
                "tex {} {}x{} {:.2} ms ({:.2} fps)",
                name,
                width,
                height,
                interval.millis(),
                interval.fps()
            );
        }

        // The release callback drops the retained packet (and any resolved
        // owning buffer) when the pipeline's consumer is done with the
        // replacement buffer, extending the engine buffer's lifetime
        // exactly that long. Context-confined teardown behind either
        // reference re-enters its own runner from the drop path.
        let release = Box::new(move || {
            drop(resolved_buffer);
            drop(retained);
        });
        let replacement = buffer.substitute(
            VideoMeta {
                format,
                width,
                height,
                planes: 1,
            },
            GlMemory::with_release(target, name, release),
        );

        // Swap in place; the original buffer (and our non-owning wrap of
        // its memory) is dropped here.
        *buffer = replacement;
        ProbeVerdict::Pass
    }

    fn on_query(&self, query: &mut PadQuery) -> ProbeVerdict {
        match query {
            PadQuery::Allocation(allocation) => {
                tracing::debug!("forwarding allocation query to sink");
                if self.sink.query(allocation) {
                    // Clobber the sink's declared affine-transform support
                    // so the upstream flip element bakes the flip into the
                    // buffers we intercept.
                    if allocation.remove_capability(&MetaCapability::AffineTransformation) {
                        tracing::debug!("removed affine-transform capability from sink response");
                    }
                }
                ProbeVerdict::Handled
            }
            PadQuery::Other(_) => ProbeVerdict::Pass,
        }
    }
}
