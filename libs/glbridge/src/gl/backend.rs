// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The GPU surface this crate calls into.
//!
//! Every operation the interop core needs from the GL/EGL/DMA-BUF platform
//! is behind [`GpuBackend`], so the core is testable against a
//! deterministic in-memory backend and the Linux EGL implementation stays
//! in one place. Every method must be called with the backend's context
//! current, i.e. from inside a `GlTaskRunner` task; calling one anywhere
//! else is a contract violation.

use crate::core::frames::PixelFormat;

/// GL texture target and format constants used at the interop boundary.
pub mod gl_constants {
    /// GL_TEXTURE_2D - standard 2D texture.
    pub const TEXTURE_2D: u32 = 0x0DE1;
    /// GL_TEXTURE_EXTERNAL_OES - imported external images on some drivers.
    pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;
}

/// Native GL texture name.
pub type TextureName = u32;

/// Native GL framebuffer name.
pub type FramebufferName = u32;

/// Opaque token for an imported shareable image.
pub type ImageHandle = u64;

/// Opaque token for a GPU fence.
pub type FenceHandle = u64;

/// Outcome of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// All commands before the fence have completed.
    Signaled,
    /// The bounded wait elapsed; the caller re-polls.
    TimedOut,
}

/// A freshly allocated shareable surface, exported as a file descriptor.
///
/// The fd owns the surface; the intermediate allocation handle is already
/// destroyed by the time this is returned.
#[derive(Debug, Clone, Copy)]
pub struct SharedImageAlloc {
    pub fd: i32,
    pub stride: u32,
}

/// Context-confined GPU operations.
///
/// Fallible-looking operations that return plainly (texture/framebuffer
/// creation, mapping, shareable allocation) are fatal preconditions inside
/// the implementation: failure means an unsupported GPU configuration
/// detected at first use, and the process aborts rather than limping on.
pub trait GpuBackend: Send + Sync {
    /// Make the context current on the calling thread. Called once by the
    /// runner thread before any other method.
    fn make_current(&self);

    // ----- capabilities -----

    /// Whether shareable DMA-BUF surfaces can be allocated and imported.
    fn supports_dma_export(&self) -> bool;

    /// Whether the platform advertises DRM format modifiers on import.
    fn supports_drm_modifiers(&self) -> bool;

    /// Whether attaching a new framebuffer color texture requires unbinding
    /// the framebuffer first to drop stale attachments (known driver
    /// defect on some GPUs).
    fn needs_framebuffer_rebind_workaround(&self) -> bool {
        false
    }

    // ----- textures -----

    fn create_texture(&self) -> TextureName;
    fn delete_texture(&self, name: TextureName);

    /// Synchronous pixel upload into a 2D texture.
    fn upload_texture_2d(
        &self,
        name: TextureName,
        format: PixelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    );

    /// Apply standard sampling parameters: filtering per
    /// [`PixelFormat::filtering`], wrap mode clamp-to-edge.
    fn set_standard_texture_params(&self, target: u32, name: TextureName, format: PixelFormat);

    // ----- framebuffers -----

    fn create_framebuffer(&self) -> FramebufferName;
    fn delete_framebuffer(&self, name: FramebufferName);
    fn bind_framebuffer(&self, name: FramebufferName);
    fn unbind_framebuffer(&self);

    /// Attach `name` as the bound framebuffer's color target.
    fn attach_color_texture(&self, target: u32, name: TextureName);

    /// Color attachment of the currently bound framebuffer (0 if none).
    fn bound_color_attachment(&self) -> TextureName;

    fn set_viewport(&self, rect: [i32; 4]);
    fn viewport(&self) -> [i32; 4];

    /// Read the bound framebuffer as tightly packed RGBA8.
    fn read_pixels_rgba(&self, width: u32, height: u32, out: &mut [u8]);

    /// Draw `name` as a full-target quad into the bound framebuffer
    /// (format/orientation conversion pass).
    fn blit_texture(&self, target: u32, name: TextureName, width: u32, height: u32);

    fn flush(&self);

    // ----- shareable images -----

    /// Allocate a shareable surface and export it as a file descriptor.
    fn allocate_shared_image(&self, width: u32, height: u32, fourcc: u32) -> SharedImageAlloc;

    /// Import an exported fd as a GPU image. Does not take ownership of
    /// `fd`.
    fn import_shared_image(
        &self,
        fd: i32,
        width: u32,
        height: u32,
        stride: u32,
        fourcc: u32,
    ) -> ImageHandle;

    /// Bind an imported image as the backing store of a 2D texture.
    fn bind_image_to_texture(&self, image: ImageHandle, name: TextureName);

    fn destroy_image(&self, image: ImageHandle);

    /// Close an exported fd once nothing references it anymore.
    fn close_shared_fd(&self, fd: i32);

    // ----- CPU mapping and access windows -----

    /// Map `len` bytes of an exported fd into the process address space.
    fn map_shared(&self, fd: i32, len: usize) -> *mut u8;
    fn unmap_shared(&self, ptr: *mut u8, len: usize);

    /// Open a CPU access window on the mapped region. Must be paired with
    /// `end_cpu_access` with the same read/write intent; touching the
    /// mapped pointer outside a window is undefined behavior on drivers
    /// with incoherent caches.
    fn begin_cpu_access(&self, fd: i32, read: bool, write: bool);
    fn end_cpu_access(&self, fd: i32, read: bool, write: bool);

    // ----- fences -----

    /// Insert a fence into the context's command stream.
    fn create_fence(&self) -> FenceHandle;

    /// Bounded wait: blocks up to `timeout_ns`, flushing pending commands.
    fn client_wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> FenceStatus;

    fn destroy_fence(&self, fence: FenceHandle);
}

/// Per-call timeout for fence waits; waits are re-polled until signaled.
pub const FENCE_WAIT_TIMEOUT_NS: u64 = 1_000_000_000;

/// Wait until `fence` signals, re-polling the bounded wait. Liveness only:
/// each poll is bounded, the loop is not.
pub fn wait_fence_blocking(gpu: &dyn GpuBackend, fence: FenceHandle) {
    while gpu.client_wait_fence(fence, FENCE_WAIT_TIMEOUT_NS) == FenceStatus::TimedOut {
        tracing::debug!("fence {} wait timed out, re-polling", fence);
    }
}
