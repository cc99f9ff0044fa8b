// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! GPU-to-CPU frame conversion node.
//!
//! The calculator-level owner of the DMA-BUF recycle slot. Engine packets
//! carrying GPU payloads are rendered into the shareable surface and handed
//! out as CPU frames without a readback; CPU payloads pass through
//! untouched. On platforms without DMA-BUF export the node falls back to a
//! `read_pixels` copy (always RGBA8 output on that path).

use std::sync::Arc;

use crate::core::error::Result;
use crate::core::frames::{CpuFrame, PixelFormat};
use crate::core::packet::Packet;
use crate::gl::dmabuf::DmaTextureSlot;
use crate::gl::interop::{GlInteropHelper, GlScope, GlTexture};
use crate::gl::runner::TaskTag;

const NODE_NAME: &str = "gpu_frame_converter";

/// Converts engine output packets into CPU pixel frames.
pub struct GpuFrameConverter {
    helper: Arc<GlInteropHelper>,
    slot: Arc<DmaTextureSlot>,
}

impl GpuFrameConverter {
    pub fn new(helper: Arc<GlInteropHelper>) -> Self {
        Self {
            helper,
            slot: Arc::new(DmaTextureSlot::new()),
        }
    }

    /// The recycle slot, exposed for instrumentation.
    pub fn slot(&self) -> &Arc<DmaTextureSlot> {
        &self.slot
    }

    /// Convert one packet.
    ///
    /// `CpuFrame` payloads pass through as-is. GPU payloads are resolved to
    /// a texture inside the engine's context and converted. Unrecognized
    /// payload types are a propagated status failure.
    pub fn process(&self, packet: &Packet) -> Result<Packet> {
        if packet.is::<CpuFrame>() {
            return Ok(packet.clone());
        }

        let tag = TaskTag::new(NODE_NAME, Some(packet.sequence()));
        self.helper.run_in_context(&tag, |scope| {
            let src = scope.resolve_packet_texture(packet)?;
            let frame = if scope.gpu().supports_dma_export() {
                self.convert_via_dma(scope, &src)
            } else {
                Self::convert_via_readback(scope, &src)
            };
            Ok(Packet::new(frame, packet.sequence()))
        })
    }

    /// Render the source into the recycled DMA surface and wrap the mapped
    /// region as a frame. The frame's release callback re-enters the
    /// context, closes the CPU access window, and recycles the instance.
    fn convert_via_dma(&self, scope: &GlScope<'_>, src: &GlTexture<'_>) -> CpuFrame {
        let gpu = scope.gpu();
        let (width, height, format) = (src.width(), src.height(), src.format());

        let mut texture = self.slot.acquire(gpu, width, height, format);
        gpu.bind_framebuffer(texture.framebuffer());
        gpu.set_viewport([0, 0, width as i32, height as i32]);
        gpu.blit_texture(src.target(), src.name(), width, height);
        texture.set_fence(gpu);
        gpu.unbind_framebuffer();

        // Consumer side of the fence contract: the mapped bytes are not
        // complete until the rendering commands signal.
        texture.wait_fence(gpu);
        texture.begin_cpu_access(gpu, true, false);

        let stride = texture.stride() as usize;
        let data = texture.mapped_ptr();
        let release = {
            let runner = Arc::clone(self.helper.runner());
            let slot = Arc::clone(&self.slot);
            Box::new(move || {
                let returned = runner.run_sync(move |gpu| {
                    texture.end_cpu_access(gpu, true, false);
                    slot.release(gpu, texture);
                    Ok(())
                });
                if let Err(e) = returned {
                    tracing::warn!("leaking DMA texture: {}", e);
                }
            })
        };

        // SAFETY: the mapping spans height * stride bytes and stays valid
        // until the release callback unmaps or recycles the instance.
        unsafe { CpuFrame::from_raw_parts(format, width, height, stride, data, release) }
    }

    /// Readback fallback for platforms without DMA-BUF export.
    fn convert_via_readback(scope: &GlScope<'_>, src: &GlTexture<'_>) -> CpuFrame {
        let mut frame = CpuFrame::alloc(PixelFormat::Rgba32, src.width(), src.height(), 4);
        scope.read_pixels(src, frame.data_mut());
        scope.gpu().flush();
        frame
    }

    /// Tear down the recycle slot. Call while the engine context is still
    /// alive; checked-out instances are recycled or destroyed by their own
    /// release callbacks.
    pub fn close(&self) -> Result<()> {
        let tag = TaskTag::new(NODE_NAME, None);
        self.helper.run_in_context(&tag, |scope| {
            self.slot.clear(scope.gpu());
            Ok(())
        })
    }
}
