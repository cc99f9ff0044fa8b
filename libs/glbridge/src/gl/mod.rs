// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod backend;
pub mod convert;
pub mod dmabuf;
pub mod interop;
pub mod runner;

pub use backend::{
    FenceHandle, FenceStatus, FramebufferName, GpuBackend, ImageHandle, SharedImageAlloc,
    TextureName, gl_constants, wait_fence_blocking,
};
pub use convert::GpuFrameConverter;
pub use dmabuf::{DmaTexture, DmaTextureSlot};
pub use interop::{GlInteropHelper, GlScope, GlTexture};
pub use runner::{GlTaskRunner, TaskTag};
