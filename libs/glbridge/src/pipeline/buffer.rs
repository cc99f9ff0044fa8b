// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The streaming pipeline's buffer unit, as seen at a probe point.
//!
//! Metadata (timestamp, flags) travels independently of the payload memory;
//! substitution replaces only the payload and copies the metadata across.

use bitflags::bitflags;

use crate::core::frames::{PixelFormat, ReleaseFn};
use crate::gl::backend::TextureName;

bitflags! {
    /// Pipeline buffer flags carried across substitution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Discontinuity in the stream (seek, drop).
        const DISCONT   = 1 << 0;
        /// Buffer content is known to be corrupted.
        const CORRUPTED = 1 << 1;
        /// Stream-specific marker (e.g. end of a field/frame group).
        const MARKER    = 1 << 2;
        /// Buffer carries header data.
        const HEADER    = 1 << 3;
        /// Buffer was produced by a live source.
        const LIVE      = 1 << 4;
    }
}

/// Video shape metadata attached to a pipeline buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMeta {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Number of memory planes backing the frame.
    pub planes: u32,
}

/// GL memory payload of a pipeline buffer.
///
/// `release` is `None` for buffers whose memory the pipeline itself owns
/// (the probe wraps those without taking ownership); substituted buffers
/// carry a callback that drops the retained engine packet when the
/// pipeline's consumer is done with the buffer.
pub struct GlMemory {
    pub target: u32,
    pub texture: TextureName,
    release: Option<ReleaseFn>,
}

impl GlMemory {
    /// Pipeline-owned memory: no release callback, the pipeline keeps
    /// ownership and may recycle the texture once its own refcount drops.
    pub fn borrowed(target: u32, texture: TextureName) -> Self {
        Self {
            target,
            texture,
            release: None,
        }
    }

    /// Memory kept alive by `release` until the buffer drops.
    pub fn with_release(target: u32, texture: TextureName, release: ReleaseFn) -> Self {
        Self {
            target,
            texture,
            release: Some(release),
        }
    }
}

impl Drop for GlMemory {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for GlMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlMemory")
            .field("texture", &self.texture)
            .field("owned", &self.release.is_some())
            .finish()
    }
}

/// One buffer flowing through the probed pad.
#[derive(Debug)]
pub struct PipelineBuffer {
    /// Presentation timestamp in nanoseconds, if the pipeline stamped one.
    pub pts_ns: Option<u64>,
    pub flags: BufferFlags,
    meta: VideoMeta,
    memory: GlMemory,
}

impl PipelineBuffer {
    pub fn new(
        pts_ns: Option<u64>,
        flags: BufferFlags,
        meta: VideoMeta,
        memory: GlMemory,
    ) -> Self {
        Self {
            pts_ns,
            flags,
            meta,
            memory,
        }
    }

    pub fn meta(&self) -> &VideoMeta {
        &self.meta
    }

    pub fn memory(&self) -> &GlMemory {
        &self.memory
    }

    /// Build the replacement for this buffer: metadata (timestamp, flags)
    /// is copied from `self`, the payload is `memory` with the given shape.
    /// The original buffer's payload is untouched; the caller swaps the
    /// replacement in and drops the original.
    pub fn substitute(&self, meta: VideoMeta, memory: GlMemory) -> Self {
        Self {
            pts_ns: self.pts_ns,
            flags: self.flags,
            meta,
            memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::gl_constants;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn meta() -> VideoMeta {
        VideoMeta {
            format: PixelFormat::Rgba32,
            width: 4,
            height: 4,
            planes: 1,
        }
    }

    #[test]
    fn test_substitution_copies_metadata_only() {
        let original = PipelineBuffer::new(
            Some(42),
            BufferFlags::LIVE | BufferFlags::MARKER,
            meta(),
            GlMemory::borrowed(gl_constants::TEXTURE_2D, 5),
        );
        let replacement = original.substitute(
            VideoMeta {
                format: PixelFormat::Bgra32,
                ..meta()
            },
            GlMemory::borrowed(gl_constants::TEXTURE_2D, 9),
        );
        assert_eq!(replacement.pts_ns, Some(42));
        assert_eq!(replacement.flags, BufferFlags::LIVE | BufferFlags::MARKER);
        assert_eq!(replacement.memory().texture, 9);
        assert_eq!(replacement.meta().format, PixelFormat::Bgra32);
    }

    #[test]
    fn test_release_runs_when_buffer_drops() {
        let released = Arc::new(AtomicBool::new(false));
        let buffer = {
            let released = Arc::clone(&released);
            PipelineBuffer::new(
                None,
                BufferFlags::empty(),
                meta(),
                GlMemory::with_release(
                    gl_constants::TEXTURE_2D,
                    7,
                    Box::new(move || released.store(true, Ordering::SeqCst)),
                ),
            )
        };
        drop(buffer);
        assert!(released.load(Ordering::SeqCst));
    }
}
