// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Boundary to the streaming pipeline.
//!
//! The pipeline (element graph, description parsing, windowing) is an
//! external collaborator; this module defines the surface this crate
//! consumes: probe registration on a named element's pad, state
//! transitions, element property access, and the native GL handles of the
//! pipeline's context.

use std::sync::Arc;

use crate::core::Result;
use crate::core::engine::{NativeDisplayHandle, NativeGlHandle};
use crate::pipeline::buffer::PipelineBuffer;

/// Pipeline element state, walked Null → Ready → Playing and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Ready,
    Playing,
}

/// Verdict returned from a probe callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Continue default handling downstream.
    Pass,
    /// The probe handled the item fully; default propagation is
    /// short-circuited.
    Handled,
}

/// Capability entry advertised in an allocation query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCapability {
    /// Downstream can apply affine transformations to buffers itself.
    /// Advertising this suppresses upstream flips we need baked into the
    /// buffer, so the interceptor strips it.
    AffineTransformation,
    Other(String),
}

/// A downstream allocation-capability negotiation query.
#[derive(Debug, Default)]
pub struct AllocationQuery {
    pub capabilities: Vec<MetaCapability>,
}

impl AllocationQuery {
    /// Remove the first occurrence of `capability`, preserving the order of
    /// the remaining entries. Returns whether an entry was removed.
    pub fn remove_capability(&mut self, capability: &MetaCapability) -> bool {
        match self.capabilities.iter().position(|c| c == capability) {
            Some(index) => {
                self.capabilities.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Queries reaching the probed pad.
#[derive(Debug)]
pub enum PadQuery {
    Allocation(AllocationQuery),
    Other(String),
}

/// Probe callbacks invoked by the pipeline on its streaming thread.
pub trait PadProbe: Send + Sync {
    /// Invoked once per buffer. The probe may replace `buffer` in place.
    fn on_buffer(&self, buffer: &mut PipelineBuffer) -> ProbeVerdict;

    /// Invoked for downstream queries reaching the probed pad.
    fn on_query(&self, query: &mut PadQuery) -> ProbeVerdict;
}

/// The sink element's pad, for manually forwarded queries.
pub trait SinkPad: Send + Sync {
    /// Run the query against the sink. Returns whether the sink accepted
    /// it (and filled in its response).
    fn query(&self, query: &mut AllocationQuery) -> bool;
}

/// The streaming-pipeline surface consumed by this crate.
pub trait MediaPipeline: Send {
    /// Transition the pipeline, blocking until the change completes.
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    /// Register buffer and query probes on the named element's source pad.
    fn install_probes(&mut self, element: &str, probe: Arc<dyn PadProbe>) -> Result<()>;

    /// The named sink element's sink pad.
    fn sink_pad(&self, element: &str) -> Result<Arc<dyn SinkPad>>;

    /// Set a boolean property on a named element (e.g. disabling sink
    /// clock sync when processing latency is high).
    fn set_element_flag(&mut self, element: &str, property: &str, value: bool) -> Result<()>;

    /// Native handles of the pipeline's GL context. Only available at
    /// Ready or later (contexts are created on the Null → Ready edge).
    fn native_gl_handles(&self) -> Result<(NativeGlHandle, NativeDisplayHandle)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_capability_preserves_order() {
        let mut query = AllocationQuery {
            capabilities: vec![
                MetaCapability::Other("a".into()),
                MetaCapability::AffineTransformation,
                MetaCapability::Other("b".into()),
            ],
        };
        assert!(query.remove_capability(&MetaCapability::AffineTransformation));
        assert_eq!(
            query.capabilities,
            vec![
                MetaCapability::Other("a".into()),
                MetaCapability::Other("b".into()),
            ]
        );
        assert!(!query.remove_capability(&MetaCapability::AffineTransformation));
    }
}
