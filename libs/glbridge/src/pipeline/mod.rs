// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod buffer;
pub mod interceptor;
pub mod probe;

pub use buffer::{BufferFlags, GlMemory, PipelineBuffer, VideoMeta};
pub use interceptor::FrameInterceptor;
pub use probe::{
    AllocationQuery, MediaPipeline, MetaCapability, PadProbe, PadQuery, PipelineState,
    ProbeVerdict, SinkPad,
};
