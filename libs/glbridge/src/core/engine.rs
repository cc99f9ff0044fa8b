// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Boundary to the graph-based processing engine.
//!
//! The engine itself (node scheduling, graph configuration parsing) is an
//! external collaborator; this module defines only the surface this crate
//! consumes, plus [`GpuResources`], the piece we hand the engine so its GL
//! work shares state with the pipeline's context.

use std::sync::Arc;

use crate::core::{Packet, Result};
use crate::gl::backend::GpuBackend;
use crate::gl::runner::GlTaskRunner;

/// Raw handle of an already-created GL context, as exposed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeGlHandle(pub usize);

/// Raw native display handle matching [`NativeGlHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDisplayHandle(pub usize);

/// Blocking poller over one engine output stream.
pub trait OutputPoller: Send {
    /// Block until the next packet, or `None` when the stream has ended
    /// (engine torn down or done).
    fn next(&mut self) -> Option<Packet>;
}

/// The processing-engine surface consumed by this crate.
///
/// All methods take `&self`: engines are shared between the session (which
/// drives bring-up) and the interceptor (which submits packets from the
/// pipeline's streaming thread), and are internally synchronized.
pub trait ProcessingEngine: Send + Sync {
    /// Initialize from a textual graph description. Failure is a propagated
    /// status (bad configuration), not a panic.
    fn initialize(&self, graph_config: &str) -> Result<()>;

    /// Hand the engine the GL resources it must run its GPU nodes against.
    fn set_gpu_resources(&self, resources: GpuResources) -> Result<()>;

    /// Attach a poller to a named output stream. Must be called before
    /// `start_run`.
    fn add_output_poller(&self, stream: &str) -> Result<Box<dyn OutputPoller>>;

    /// Start graph execution.
    fn start_run(&self) -> Result<()>;

    /// Submit a packet to a named input stream.
    fn add_packet(&self, stream: &str, packet: Packet) -> Result<()>;
}

/// GL execution state shared with the engine: the engine-side task runner
/// and the backend its tasks call into.
///
/// Created from the pipeline's native GL handles so the engine's context is
/// shared with (not identical to) the pipeline's - each side keeps its own
/// confined thread, and objects cross only via explicit interop.
#[derive(Clone)]
pub struct GpuResources {
    runner: Arc<GlTaskRunner>,
    backend: Arc<dyn GpuBackend>,
}

impl GpuResources {
    /// Adopt the pipeline's native GL context/display: create a context
    /// shared with it, owned by a fresh confined runner thread.
    ///
    /// Fails with a propagated status when the platform has no shared-context
    /// support compiled in.
    #[allow(unused_variables)]
    pub fn create(context: NativeGlHandle, display: NativeDisplayHandle) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let backend: Arc<dyn GpuBackend> =
                Arc::new(crate::egl::EglBackend::adopt_shared(context, display)?);
            Ok(Self::from_parts(
                GlTaskRunner::spawn("engine-gl", Arc::clone(&backend)),
                backend,
            ))
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(crate::core::BridgeError::NotSupported(
                "shared GL contexts are only implemented for EGL platforms".into(),
            ))
        }
    }

    /// Assemble from an existing runner/backend pair (tests, embedders that
    /// already own a confined context).
    pub fn from_parts(runner: Arc<GlTaskRunner>, backend: Arc<dyn GpuBackend>) -> Self {
        Self { runner, backend }
    }

    pub fn runner(&self) -> &Arc<GlTaskRunner> {
        &self.runner
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for GpuResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResources")
            .field("runner", &self.runner.name())
            .finish()
    }
}
