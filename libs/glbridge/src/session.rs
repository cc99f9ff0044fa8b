// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Session orchestration: the explicit two-phase bring-up that connects
//! the streaming pipeline, the processing engine, and the interceptor.
//!
//! Phase one establishes the contexts: initialize the engine from its
//! graph description, walk the pipeline to Ready (GL contexts are created
//! on that edge), adopt the pipeline's native GL handles into shared
//! engine resources. Phase two starts the flow: attach the output poller,
//! start the graph, install the probes, walk the pipeline to Playing.
//! An engine initialization failure aborts in phase one - the pipeline
//! never reaches Playing and no buffer is ever submitted.

use std::sync::Arc;

use crate::core::clock::{MonotonicClock, SystemClock};
use crate::core::config::BridgeConfig;
use crate::core::engine::{GpuResources, ProcessingEngine};
use crate::core::error::Result;
use crate::gl::interop::GlInteropHelper;
use crate::pipeline::interceptor::FrameInterceptor;
use crate::pipeline::probe::{MediaPipeline, PipelineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Streaming,
    Stopped,
}

/// Owns the wiring between one pipeline and one engine.
pub struct BridgeSession {
    config: BridgeConfig,
    pipeline: Box<dyn MediaPipeline>,
    engine: Arc<dyn ProcessingEngine>,
    clock: Arc<dyn MonotonicClock>,
    interceptor: Option<Arc<FrameInterceptor>>,
    helper: Option<Arc<GlInteropHelper>>,
    resources_override: Option<GpuResources>,
    state: SessionState,
}

impl BridgeSession {
    pub fn new(
        config: BridgeConfig,
        pipeline: Box<dyn MediaPipeline>,
        engine: Arc<dyn ProcessingEngine>,
    ) -> Self {
        Self::with_clock(config, pipeline, engine, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        config: BridgeConfig,
        pipeline: Box<dyn MediaPipeline>,
        engine: Arc<dyn ProcessingEngine>,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        Self {
            config,
            pipeline,
            engine,
            clock,
            interceptor: None,
            helper: None,
            resources_override: None,
            state: SessionState::Idle,
        }
    }

    /// Use an already-assembled runner/backend pair instead of adopting
    /// the pipeline's native handles (embedders that own their contexts,
    /// tests against a fake backend).
    pub fn with_gpu_resources(mut self, resources: GpuResources) -> Self {
        self.resources_override = Some(resources);
        self
    }

    /// Bring the session up to streaming. On any failure the pipeline is
    /// left short of Playing and nothing has been submitted to the engine.
    pub fn start(&mut self) -> Result<()> {
        assert_eq!(self.state, SessionState::Idle, "session already started");
        self.config.validate()?;

        tracing::info!("initializing engine graph");
        self.engine.initialize(&self.config.graph_config)?;

        // Disabling sink clock sync is required when processing latency is
        // high, or the sink drops every frame it considers late.
        self.pipeline
            .set_element_flag(&self.config.sink_element, "sync", false)?;

        // GL contexts are created on the Null -> Ready edge.
        tracing::info!("setting pipeline to Ready");
        self.pipeline.set_state(PipelineState::Ready)?;

        let resources = match self.resources_override.take() {
            Some(resources) => resources,
            None => {
                let (gl_handle, display_handle) = self.pipeline.native_gl_handles()?;
                tracing::info!("adopting pipeline GL context into engine resources");
                GpuResources::create(gl_handle, display_handle)?
            }
        };
        let helper = Arc::new(GlInteropHelper::new(Arc::clone(resources.runner())));
        self.engine.set_gpu_resources(resources)?;

        let poller = self.engine.add_output_poller(&self.config.output_stream)?;
        tracing::info!("starting engine graph");
        self.engine.start_run()?;

        let interceptor = Arc::new(FrameInterceptor::new(
            Arc::clone(&self.engine),
            poller,
            Arc::clone(&helper),
            self.pipeline.sink_pad(&self.config.sink_element)?,
            self.config.input_stream.clone(),
            Arc::clone(&self.clock),
        ));
        let probe: Arc<dyn crate::pipeline::probe::PadProbe> = interceptor.clone();
        self.pipeline.install_probes(&self.config.probe_element, probe)?;

        tracing::info!("setting pipeline to Playing");
        self.pipeline.set_state(PipelineState::Playing)?;

        self.helper = Some(helper);
        self.interceptor = Some(interceptor);
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Drive the pipeline to Null. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        tracing::info!("setting pipeline to Null");
        self.pipeline.set_state(PipelineState::Null)?;
        self.state = SessionState::Stopped;
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// The interceptor, once the session is streaming.
    pub fn interceptor(&self) -> Option<&Arc<FrameInterceptor>> {
        self.interceptor.as_ref()
    }

    /// The engine-context interop helper, once the session is streaming.
    pub fn interop_helper(&self) -> Option<&Arc<GlInteropHelper>> {
        self.helper.as_ref()
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if self.state == SessionState::Streaming {
            if let Err(e) = self.stop() {
                tracing::warn!("pipeline teardown failed: {}", e);
            }
        }
    }
}
