// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Zero-copy GPU buffer interop between a real-time streaming pipeline and a
//! graph-based image-processing engine.
//!
//! Two independently-scheduled subsystems each own a GL context on a
//! dedicated thread. This crate moves image buffers between them without
//! CPU-side pixel copies:
//!
//! - [`gl::GlTaskRunner`] confines GPU work to the thread owning a context.
//! - [`gl::GlInteropHelper`] wraps externally-owned GL textures (and CPU
//!   pixel frames) as sampleable textures, and engine output as render
//!   targets.
//! - [`gl::DmaTexture`] exports a texture as a CPU-mappable DMA-BUF with
//!   explicit fence synchronization, recycled through a single-slot cache.
//! - [`pipeline::FrameInterceptor`] swaps pipeline buffers for engine output
//!   at a pad probe, preserving timestamp/flag metadata and the pipeline's
//!   backpressure.
//!
//! The streaming pipeline and the processing engine themselves are external
//! collaborators; they appear here only as the boundary traits in
//! [`core::engine`] and [`pipeline`].

// Suppress pedantic clippy warnings that are intentional design choices
#![allow(clippy::too_many_arguments)] // GPU entry points mirror native signatures
#![allow(clippy::type_complexity)] // Complex types are clear in context
#![allow(clippy::missing_safety_doc)] // Safety documented in implementation comments

pub mod core;
pub mod gl;
pub mod pipeline;
pub mod session;

#[cfg(target_os = "linux")]
pub mod egl;

#[doc(hidden)]
pub mod testing;

pub use crate::core::{BridgeConfig, BridgeError, CpuFrame, Packet, PixelFormat, Result};
pub use crate::gl::{GlInteropHelper, GlTaskRunner};
pub use crate::pipeline::FrameInterceptor;
pub use crate::session::BridgeSession;
