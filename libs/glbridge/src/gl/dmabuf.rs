// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! DMA-BUF-backed recyclable texture.
//!
//! Exports a GPU texture as a shareable file descriptor, maps it for CPU
//! access, and synchronizes the CPU/GPU handoff with a fence. Instances are
//! recycled through an explicit single-slot cache so steady-state streaming
//! does not allocate per frame.
//!
//! Lifecycle per instance: allocate (on-context) → render into it → set
//! fence → open CPU access window → consumer reads the mapped pointer →
//! release callback re-enters the context, closes the window, and returns
//! the instance to the slot (cached if empty, destroyed if occupied).

use parking_lot::Mutex;

use crate::core::frames::PixelFormat;
use crate::gl::backend::{
    FenceHandle, FramebufferName, GpuBackend, ImageHandle, TextureName, gl_constants,
    wait_fence_blocking,
};

/// A shareable GPU surface with a CPU mapping and a fence.
///
/// All methods must run with the producing context current. The instance
/// must be explicitly destroyed (or given back to a [`DmaTextureSlot`]);
/// dropping a live one leaks its GPU handles and logs.
pub struct DmaTexture {
    image: ImageHandle,
    fd: i32,
    stride: u32,
    map_ptr: *mut u8,
    map_len: usize,
    fence: Option<FenceHandle>,
    framebuffer: FramebufferName,
    texture: TextureName,
    width: u32,
    height: u32,
    format: PixelFormat,
    destroyed: bool,
}

// SAFETY: the mapped pointer is a process-wide shared mapping; thread
// affinity applies only to the GPU calls, which are confined by contract.
unsafe impl Send for DmaTexture {}

impl DmaTexture {
    /// Allocate a shareable surface of the given size and format.
    ///
    /// Fatal for formats without a shareable fourcc mapping and for any
    /// allocation/import/mapping failure - all are environment
    /// misconfiguration discovered at first use.
    pub fn allocate(gpu: &dyn GpuBackend, width: u32, height: u32, format: PixelFormat) -> Self {
        let fourcc = format
            .shareable_fourcc()
            .unwrap_or_else(|| panic!("unsupported format for DMA-BUF export: {format}"));

        let alloc = gpu.allocate_shared_image(width, height, fourcc);
        let image = gpu.import_shared_image(alloc.fd, width, height, alloc.stride, fourcc);

        let framebuffer = gpu.create_framebuffer();
        gpu.bind_framebuffer(framebuffer);
        let texture = gpu.create_texture();
        gpu.set_standard_texture_params(gl_constants::TEXTURE_2D, texture, format);
        gpu.bind_image_to_texture(image, texture);
        gpu.attach_color_texture(gl_constants::TEXTURE_2D, texture);
        gpu.unbind_framebuffer();

        let map_len = height as usize * alloc.stride as usize;
        let map_ptr = gpu.map_shared(alloc.fd, map_len);

        tracing::debug!(
            "allocated {}x{} {} DMA texture, fd {}, stride {}",
            width,
            height,
            format,
            alloc.fd,
            alloc.stride
        );

        Self {
            image,
            fd: alloc.fd,
            stride: alloc.stride,
            map_ptr,
            map_len,
            fence: None,
            framebuffer,
            texture,
            width,
            height,
            format,
            destroyed: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row pitch of the shareable surface in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn framebuffer(&self) -> FramebufferName {
        self.framebuffer
    }

    pub fn texture(&self) -> TextureName {
        self.texture
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    /// CPU-visible pointer to the mapped surface, `height * stride` bytes.
    /// Only dereferenceable inside a Begin/End access window.
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.map_ptr
    }

    pub fn mapped_len(&self) -> usize {
        self.map_len
    }

    /// Whether this instance can be reused for a frame of the given shape.
    pub fn matches(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }

    /// Destroy any previous fence and insert a new one after the commands
    /// that filled the surface. Producers call this immediately after
    /// issuing their rendering commands.
    pub fn set_fence(&mut self, gpu: &dyn GpuBackend) {
        self.destroy_fence(gpu);
        self.fence = Some(gpu.create_fence());
    }

    /// Block until the fence signals, re-polling the bounded wait.
    /// Consumers call this before treating the surface contents as
    /// complete.
    pub fn wait_fence(&self, gpu: &dyn GpuBackend) {
        if let Some(fence) = self.fence {
            wait_fence_blocking(gpu, fence);
        }
    }

    pub fn destroy_fence(&mut self, gpu: &dyn GpuBackend) {
        if let Some(fence) = self.fence.take() {
            gpu.destroy_fence(fence);
        }
    }

    /// Open a CPU access window on the mapped region.
    pub fn begin_cpu_access(&self, gpu: &dyn GpuBackend, read: bool, write: bool) {
        gpu.begin_cpu_access(self.fd, read, write);
    }

    /// Close a CPU access window. Must mirror the matching begin exactly;
    /// when triggered from a downstream release callback this runs after
    /// re-entering the producing context.
    pub fn end_cpu_access(&self, gpu: &dyn GpuBackend, read: bool, write: bool) {
        gpu.end_cpu_access(self.fd, read, write);
    }

    /// Release every native resource. Must run with the producing context
    /// current.
    pub fn destroy(mut self, gpu: &dyn GpuBackend) {
        self.destroy_fence(gpu);
        gpu.delete_texture(self.texture);
        gpu.delete_framebuffer(self.framebuffer);
        gpu.unmap_shared(self.map_ptr, self.map_len);
        gpu.destroy_image(self.image);
        gpu.close_shared_fd(self.fd);
        self.destroyed = true;
        tracing::debug!("DMA texture freed (fd {})", self.fd);
    }
}

impl Drop for DmaTexture {
    fn drop(&mut self) {
        if !self.destroyed {
            tracing::warn!(
                "DmaTexture dropped without destroy(); leaking fd {} and GPU handles",
                self.fd
            );
        }
    }
}

/// Recycle state of the single cache slot.
#[derive(Default)]
enum SlotState {
    /// No instance cached and none checked out.
    #[default]
    Empty,
    /// An idle instance waits for the next frame.
    Cached(DmaTexture),
    /// An instance is out with a consumer.
    CheckedOut,
}

/// Single-slot recycle cache.
///
/// At most one instance is cached at a time. Re-entrant acquisition (a new
/// frame processed before the previous frame's release callback has run) is
/// permitted: it allocates a second instance, and whichever instance is
/// released while the slot is occupied is destroyed instead of cached, so
/// the steady state returns to one live instance.
#[derive(Default)]
pub struct DmaTextureSlot {
    state: Mutex<SlotState>,
}

impl DmaTextureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the cached instance if it fits the requested shape, else
    /// allocate. Must run with the producing context current.
    pub fn acquire(
        &self,
        gpu: &dyn GpuBackend,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> DmaTexture {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            SlotState::Cached(texture) if texture.matches(width, height, format) => {
                *state = SlotState::CheckedOut;
                texture
            }
            SlotState::Cached(texture) => {
                // Shape changed mid-stream; the cached instance is useless.
                texture.destroy(gpu);
                *state = SlotState::CheckedOut;
                DmaTexture::allocate(gpu, width, height, format)
            }
            SlotState::Empty | SlotState::CheckedOut => {
                *state = SlotState::CheckedOut;
                DmaTexture::allocate(gpu, width, height, format)
            }
        }
    }

    /// Return an instance after its consumer released it. Cached if the
    /// slot is free, destroyed if another instance got there first. Must
    /// run with the producing context current.
    pub fn release(&self, gpu: &dyn GpuBackend, mut texture: DmaTexture) {
        texture.destroy_fence(gpu);
        let mut state = self.state.lock();
        if matches!(&*state, SlotState::Cached(_)) {
            drop(state);
            texture.destroy(gpu);
        } else {
            *state = SlotState::Cached(texture);
        }
    }

    /// Whether an idle instance is currently cached.
    pub fn has_cached(&self) -> bool {
        matches!(&*self.state.lock(), SlotState::Cached(_))
    }

    /// Destroy the cached instance, if any. Must run with the producing
    /// context current. Checked-out instances are their consumers' problem.
    pub fn clear(&self, gpu: &dyn GpuBackend) {
        let mut state = self.state.lock();
        if let SlotState::Cached(texture) = std::mem::take(&mut *state) {
            drop(state);
            texture.destroy(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGpu;

    #[test]
    fn test_sequential_cycles_recycle_one_instance() {
        let gpu = FakeGpu::shared();
        let slot = DmaTextureSlot::new();

        let first = slot.acquire(gpu.as_ref(), 64, 32, PixelFormat::Bgra32);
        let first_fd = first.fd();
        slot.release(gpu.as_ref(), first);

        for _ in 0..1000 {
            let texture = slot.acquire(gpu.as_ref(), 64, 32, PixelFormat::Bgra32);
            assert_eq!(texture.fd(), first_fd, "instance must be recycled");
            slot.release(gpu.as_ref(), texture);
        }

        assert_eq!(gpu.live_textures(), 1);
        assert_eq!(gpu.live_framebuffers(), 1);
        assert_eq!(gpu.live_images(), 1);
        assert_eq!(gpu.open_shared_fds(), 1);

        slot.clear(gpu.as_ref());
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_framebuffers(), 0);
        assert_eq!(gpu.live_images(), 0);
        assert_eq!(gpu.open_shared_fds(), 0);
    }

    #[test]
    fn test_reentrant_acquire_allocates_second_instance() {
        let gpu = FakeGpu::shared();
        let slot = DmaTextureSlot::new();

        let first = slot.acquire(gpu.as_ref(), 16, 16, PixelFormat::Bgra32);
        // Second frame starts before the first release callback ran.
        let second = slot.acquire(gpu.as_ref(), 16, 16, PixelFormat::Bgra32);
        assert_ne!(first.fd(), second.fd());
        assert_eq!(gpu.open_shared_fds(), 2);

        // First release caches; second finds the slot occupied and is
        // destroyed.
        slot.release(gpu.as_ref(), first);
        assert!(slot.has_cached());
        slot.release(gpu.as_ref(), second);
        assert_eq!(gpu.open_shared_fds(), 1);

        slot.clear(gpu.as_ref());
        assert_eq!(gpu.open_shared_fds(), 0);
    }

    #[test]
    fn test_shape_change_discards_cached_instance() {
        let gpu = FakeGpu::shared();
        let slot = DmaTextureSlot::new();

        let first = slot.acquire(gpu.as_ref(), 16, 16, PixelFormat::Bgra32);
        slot.release(gpu.as_ref(), first);

        let second = slot.acquire(gpu.as_ref(), 32, 32, PixelFormat::Bgra32);
        assert_eq!(second.width(), 32);
        assert_eq!(gpu.open_shared_fds(), 1);
        slot.release(gpu.as_ref(), second);
        slot.clear(gpu.as_ref());
    }

    #[test]
    #[should_panic(expected = "unsupported format for DMA-BUF export")]
    fn test_unsupported_format_is_fatal() {
        let gpu = FakeGpu::shared();
        let _ = DmaTexture::allocate(gpu.as_ref(), 8, 8, PixelFormat::RgbaFloat);
    }

    #[test]
    fn test_set_fence_replaces_prior_fence() {
        let gpu = FakeGpu::shared();
        let mut texture = DmaTexture::allocate(gpu.as_ref(), 8, 8, PixelFormat::Bgra32);
        texture.set_fence(gpu.as_ref());
        texture.set_fence(gpu.as_ref());
        assert_eq!(gpu.live_fences(), 1);
        texture.destroy(gpu.as_ref());
        assert_eq!(gpu.live_fences(), 0);
    }
}
