// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! GPU-resident image buffers: the owning, reference-counted kind and the
//! non-owning view over pipeline memory.

use std::sync::Arc;

use parking_lot::Mutex;

use super::PixelFormat;
use crate::gl::backend::{FenceHandle, TextureName};
use crate::gl::runner::GlTaskRunner;

struct TextureBufferInner {
    target: u32,
    name: TextureName,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Fence inserted by the producer after the commands that filled this
    /// texture. Consumed (waited on, then destroyed) before first sampling.
    producer_fence: Mutex<Option<FenceHandle>>,
    /// Runner owning the GL context this texture was created in. `None`
    /// only in tests that hand-construct buffers.
    owner: Option<Arc<GlTaskRunner>>,
}

impl Drop for TextureBufferInner {
    fn drop(&mut self) {
        let Some(owner) = self.owner.take() else {
            return;
        };
        let name = self.name;
        let fence = self.producer_fence.get_mut().take();
        // Last reference dropped: release the native handle with the owning
        // context current. Executes inline when already on the context
        // thread.
        let released = owner.run_sync(move |gpu| {
            if let Some(fence) = fence {
                gpu.destroy_fence(fence);
            }
            gpu.delete_texture(name);
            Ok(())
        });
        if let Err(e) = released {
            tracing::warn!("leaking texture {}: {}", name, e);
        }
    }
}

/// Opaque, reference-counted, GPU-resident image.
///
/// Clones share the underlying texture; the native handle is released (with
/// the owning GL context current) when the last clone drops.
#[derive(Clone)]
pub struct GpuBuffer {
    inner: Arc<TextureBufferInner>,
}

impl GpuBuffer {
    /// Allocate a texture in the context owned by `runner`.
    ///
    /// Must be called with that context current (i.e. from inside a
    /// `run_sync` task); creation failure is a fatal precondition inside
    /// the backend.
    pub fn allocate(
        runner: Arc<GlTaskRunner>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        assert!(
            runner.is_current_thread(),
            "GpuBuffer::allocate outside the owning GL context"
        );
        let name = runner.backend().create_texture();
        Self {
            inner: Arc::new(TextureBufferInner {
                target: crate::gl::gl_constants::TEXTURE_2D,
                name,
                width,
                height,
                format,
                producer_fence: Mutex::new(None),
                owner: Some(runner),
            }),
        }
    }

    /// Test-only constructor: a buffer with no owning context. Dropping it
    /// releases nothing.
    #[doc(hidden)]
    pub fn detached(target: u32, name: TextureName, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            inner: Arc::new(TextureBufferInner {
                target,
                name,
                width,
                height,
                format,
                producer_fence: Mutex::new(None),
                owner: None,
            }),
        }
    }

    pub fn target(&self) -> u32 {
        self.inner.target
    }

    pub fn name(&self) -> TextureName {
        self.inner.name
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Record a fence the producer inserted after filling this texture.
    /// Replaces (and returns) any previous fence.
    pub fn set_producer_fence(&self, fence: FenceHandle) -> Option<FenceHandle> {
        self.inner.producer_fence.lock().replace(fence)
    }

    /// Take the producer fence for consumption. The caller waits on it and
    /// destroys it before sampling.
    pub fn take_producer_fence(&self) -> Option<FenceHandle> {
        self.inner.producer_fence.lock().take()
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("name", &self.inner.name)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .finish()
    }
}

/// Non-owning view of a texture owned by the streaming pipeline.
///
/// The pipeline retains ownership and may recycle or free the memory once
/// its own reference count reaches zero; nothing here prevents that from
/// happening before a reader is done. The pipeline's single-frame
/// backpressure is what makes the wrap safe in practice: the probed buffer
/// is held for the whole engine round-trip. There is deliberately no
/// conversion from `ExternalTexture` to [`GpuBuffer`] - wrapping must never
/// turn into ownership transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalTexture {
    pub target: u32,
    pub name: TextureName,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}
