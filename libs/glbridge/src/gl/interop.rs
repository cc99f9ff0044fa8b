// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer/texture interop helper.
//!
//! Wraps engine buffers, pipeline textures, and CPU pixel frames as
//! sampleable textures, allocates destination textures, and owns the one
//! framebuffer used for format/orientation conversion passes. All texture
//! operations happen inside [`GlInteropHelper::run_in_context`]; the
//! [`GlScope`] handed to the closure is the capability to touch GL state,
//! and the [`GlTexture`] views it creates cannot outlive that closure.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::error::Result;
use crate::core::frames::{CpuFrame, ExternalTexture, GpuBuffer, PixelFormat};
use crate::core::packet::Packet;
use crate::gl::backend::{GpuBackend, gl_constants, wait_fence_blocking};
use crate::gl::runner::{GlTaskRunner, TaskTag};

/// Short-lived binding of an image to a texture unit.
///
/// Valid only within the `run_in_context` invocation that created it; the
/// lifetime parameter ties it to the [`GlScope`] so it cannot escape, and
/// it is not `Send`.
pub struct GlTexture<'s> {
    target: u32,
    name: u32,
    width: u32,
    height: u32,
    plane: u32,
    format: PixelFormat,
    /// Keeps an owning buffer alive for the duration of the view.
    keepalive: Option<GpuBuffer>,
    _scope: PhantomData<&'s GlScope<'s>>,
    _not_send: PhantomData<*const ()>,
}

impl GlTexture<'_> {
    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn name(&self) -> u32 {
        self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self) -> u32 {
        self.plane
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The owning buffer behind this view, when there is one.
    pub fn buffer(&self) -> Option<&GpuBuffer> {
        self.keepalive.as_ref()
    }
}

/// Capability to perform texture operations inside one confined invocation.
pub struct GlScope<'h> {
    helper: &'h GlInteropHelper,
    gpu: &'h dyn GpuBackend,
    _not_send: PhantomData<*const ()>,
}

impl<'h> GlScope<'h> {
    pub fn gpu(&self) -> &dyn GpuBackend {
        self.gpu
    }

    /// Wrap an engine-owned buffer for sampling.
    ///
    /// Consumes the buffer's producer fence first: the texture is not safe
    /// to sample until the producing context's commands complete.
    pub fn wrap_source_texture(&self, buffer: &GpuBuffer) -> GlTexture<'_> {
        if let Some(fence) = buffer.take_producer_fence() {
            wait_fence_blocking(self.gpu, fence);
            self.gpu.destroy_fence(fence);
        }
        self.gpu
            .set_standard_texture_params(buffer.target(), buffer.name(), buffer.format());
        GlTexture {
            target: buffer.target(),
            name: buffer.name(),
            width: buffer.width(),
            height: buffer.height(),
            plane: 0,
            format: buffer.format(),
            keepalive: Some(buffer.clone()),
            _scope: PhantomData,
            _not_send: PhantomData,
        }
    }

    /// Wrap a pipeline-owned texture for sampling. No fence is available at
    /// this boundary; the pipeline's own backpressure keeps the memory
    /// stable for the duration of the probe (see [`ExternalTexture`]).
    pub fn wrap_external_texture(&self, external: &ExternalTexture) -> GlTexture<'_> {
        self.gpu
            .set_standard_texture_params(external.target, external.name, external.format);
        GlTexture {
            target: external.target,
            name: external.name,
            width: external.width,
            height: external.height,
            plane: 0,
            format: external.format,
            keepalive: None,
            _scope: PhantomData,
            _not_send: PhantomData,
        }
    }

    /// Upload a CPU pixel frame into a fresh texture for sampling.
    pub fn upload_source_texture(&self, frame: &CpuFrame) -> GlTexture<'_> {
        let buffer = GpuBuffer::allocate(
            Arc::clone(&self.helper.runner),
            frame.width(),
            frame.height(),
            frame.format(),
        );
        self.gpu.upload_texture_2d(
            buffer.name(),
            frame.format(),
            frame.width(),
            frame.height(),
            frame.data(),
        );
        self.gpu
            .set_standard_texture_params(buffer.target(), buffer.name(), buffer.format());
        self.wrap_source_texture(&buffer)
    }

    /// Allocate a destination texture and return it bound as a render
    /// target view.
    pub fn create_destination_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> GlTexture<'_> {
        let buffer = GpuBuffer::allocate(Arc::clone(&self.helper.runner), width, height, format);
        self.gpu
            .set_standard_texture_params(buffer.target(), buffer.name(), buffer.format());
        GlTexture {
            target: buffer.target(),
            name: buffer.name(),
            width,
            height,
            plane: 0,
            format,
            keepalive: Some(buffer),
            _scope: PhantomData,
            _not_send: PhantomData,
        }
    }

    /// Bind the helper's framebuffer with `dst` as its color target and set
    /// the viewport to the view's dimensions.
    pub fn bind_render_target(&self, dst: &GlTexture<'_>) {
        if self.gpu.needs_framebuffer_rebind_workaround() {
            // Attaching a new texture does not detach the old one on some
            // drivers; unbinding first forces the stale attachment out.
            self.gpu.unbind_framebuffer();
        }
        let framebuffer = self.helper.framebuffer(self.gpu);
        self.gpu.bind_framebuffer(framebuffer);
        self.gpu
            .set_viewport([0, 0, dst.width() as i32, dst.height() as i32]);
        self.gpu.attach_color_texture(dst.target(), dst.name());
    }

    /// Read a view back as tightly packed RGBA8.
    ///
    /// When `src` is not the current color attachment, it is attached
    /// temporarily and the prior viewport and attachment are restored, so
    /// caller render state is not disturbed.
    pub fn read_pixels(&self, src: &GlTexture<'_>, out: &mut [u8]) {
        let required = src.width() as usize * src.height() as usize * 4;
        assert!(
            out.len() >= required,
            "read_pixels output buffer too small: {} < {}",
            out.len(),
            required
        );
        let framebuffer = self.helper.framebuffer(self.gpu);
        self.gpu.bind_framebuffer(framebuffer);

        let attached = self.gpu.bound_color_attachment();
        if attached != src.name() {
            let saved_viewport = self.gpu.viewport();
            self.gpu
                .set_viewport([0, 0, src.width() as i32, src.height() as i32]);
            self.gpu.attach_color_texture(src.target(), src.name());
            self.gpu.read_pixels_rgba(src.width(), src.height(), out);
            self.gpu.set_viewport(saved_viewport);
            self.gpu
                .attach_color_texture(gl_constants::TEXTURE_2D, attached);
        } else {
            self.gpu.read_pixels_rgba(src.width(), src.height(), out);
        }
    }

    /// Resolve any supported packet payload to a sampleable view.
    ///
    /// Unrecognized payload types are a propagated status failure, not a
    /// panic: they come from graph misconfiguration, not hardware mismatch.
    pub fn resolve_packet_texture(&self, packet: &Packet) -> Result<GlTexture<'_>> {
        if let Some(buffer) = packet.get::<GpuBuffer>() {
            Ok(self.wrap_source_texture(buffer))
        } else if let Some(external) = packet.get::<ExternalTexture>() {
            Ok(self.wrap_external_texture(external))
        } else if let Some(frame) = packet.get::<CpuFrame>() {
            Ok(self.upload_source_texture(frame))
        } else {
            Err(crate::core::BridgeError::UnsupportedPayload(format!(
                "packet at seq {} holds {}",
                packet.sequence(),
                packet.payload_summary()
            )))
        }
    }
}

/// Buffer/texture interop helper bound to one context runner.
pub struct GlInteropHelper {
    runner: Arc<GlTaskRunner>,
    /// Lazily created, reused for the helper's lifetime. 0 = not yet
    /// created.
    framebuffer: AtomicU32,
}

impl GlInteropHelper {
    pub fn new(runner: Arc<GlTaskRunner>) -> Self {
        Self {
            runner,
            framebuffer: AtomicU32::new(0),
        }
    }

    pub fn runner(&self) -> &Arc<GlTaskRunner> {
        &self.runner
    }

    /// Execute `task` on the owning context's thread, blocking until done.
    pub fn run_in_context<T, F>(&self, tag: &TaskTag, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&GlScope<'_>) -> Result<T> + Send,
    {
        self.runner.run_sync_tagged(tag, |gpu| {
            let scope = GlScope {
                helper: self,
                gpu,
                _not_send: PhantomData,
            };
            task(&scope)
        })
    }

    fn framebuffer(&self, gpu: &dyn GpuBackend) -> u32 {
        let existing = self.framebuffer.load(Ordering::Relaxed);
        if existing != 0 {
            return existing;
        }
        let created = gpu.create_framebuffer();
        self.framebuffer.store(created, Ordering::Relaxed);
        created
    }
}

impl Drop for GlInteropHelper {
    fn drop(&mut self) {
        let framebuffer = self.framebuffer.load(Ordering::Relaxed);
        if framebuffer == 0 {
            return;
        }
        let released = self
            .runner
            .run_sync(move |gpu| {
                gpu.delete_framebuffer(framebuffer);
                Ok(())
            });
        if released.is_err() {
            tracing::warn!("leaking framebuffer {}: context runner stopped", framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGpu;

    fn helper() -> (Arc<FakeGpu>, GlInteropHelper) {
        let gpu = FakeGpu::shared();
        let runner = GlTaskRunner::spawn("test-gl", gpu.clone());
        (gpu, GlInteropHelper::new(runner))
    }

    fn gradient_frame(width: u32, height: u32) -> CpuFrame {
        let mut frame = CpuFrame::alloc(PixelFormat::Rgba32, width, height, 1);
        let stride = frame.stride();
        let data = frame.data_mut();
        for y in 0..height {
            for x in 0..width {
                let at = y as usize * stride + x as usize * 4;
                data[at] = x as u8;
                data[at + 1] = y as u8;
                data[at + 2] = (x + y) as u8;
                data[at + 3] = 0xFF;
            }
        }
        frame
    }

    #[test]
    fn test_round_trip_cpu_frame_is_byte_identical() {
        let (_gpu, helper) = helper();
        let frame = gradient_frame(16, 8);
        let expected: Vec<u8> = (0..8).flat_map(|y| frame.row(y).to_vec()).collect();

        let read_back = helper
            .run_in_context(&TaskTag::default(), |scope| {
                let src = scope.upload_source_texture(&frame);
                let mut out = vec![0u8; 16 * 8 * 4];
                scope.read_pixels(&src, &mut out);
                Ok(out)
            })
            .unwrap();
        assert_eq!(read_back, expected);
    }

    #[test]
    fn test_read_pixels_restores_prior_attachment_and_viewport() {
        let (gpu, helper) = helper();
        helper
            .run_in_context(&TaskTag::default(), |scope| {
                let dst = scope.create_destination_texture(32, 32, PixelFormat::Rgba32);
                scope.bind_render_target(&dst);
                let viewport_before = scope.gpu().viewport();

                let frame = gradient_frame(4, 4);
                let other = scope.upload_source_texture(&frame);
                let mut out = vec![0u8; 4 * 4 * 4];
                scope.read_pixels(&other, &mut out);

                assert_eq!(scope.gpu().bound_color_attachment(), dst.name());
                assert_eq!(scope.gpu().viewport(), viewport_before);
                Ok(())
            })
            .unwrap();
        drop(helper);
        assert_eq!(gpu.live_framebuffers(), 0);
    }

    #[test]
    fn test_framebuffer_created_once_per_helper() {
        let (gpu, helper) = helper();
        for _ in 0..3 {
            helper
                .run_in_context(&TaskTag::default(), |scope| {
                    let dst = scope.create_destination_texture(8, 8, PixelFormat::Rgba32);
                    scope.bind_render_target(&dst);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(gpu.total_framebuffers_created(), 1);
    }

    #[test]
    fn test_wrap_waits_on_producer_fence() {
        let (gpu, helper) = helper();
        helper
            .run_in_context(&TaskTag::default(), |scope| {
                let dst = scope.create_destination_texture(8, 8, PixelFormat::Rgba32);
                let buffer = dst.buffer().unwrap().clone();
                buffer.set_producer_fence(scope.gpu().create_fence());
                drop(dst);

                let view = scope.wrap_source_texture(&buffer);
                assert_eq!(view.name(), buffer.name());
                // Fence consumed: waited on and destroyed.
                assert!(buffer.take_producer_fence().is_none());
                Ok(())
            })
            .unwrap();
        assert_eq!(gpu.live_fences(), 0);
    }

    #[test]
    fn test_unknown_payload_is_propagated_error() {
        let (_gpu, helper) = helper();
        let packet = Packet::new("not a frame", 0);
        let err = helper
            .run_in_context(&TaskTag::default(), |scope| {
                scope.resolve_packet_texture(&packet).map(|_| ())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::core::BridgeError::UnsupportedPayload(_)
        ));
    }
}
