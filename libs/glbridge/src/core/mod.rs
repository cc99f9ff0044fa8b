// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod frames;
pub mod packet;

pub use clock::{FrameInterval, FramePacer, MonotonicClock, SystemClock};
pub use config::BridgeConfig;
pub use engine::{
    GpuResources, NativeDisplayHandle, NativeGlHandle, OutputPoller, ProcessingEngine,
};
pub use error::{BridgeError, Result};
pub use frames::{CpuFrame, ExternalTexture, GpuBuffer, PixelFormat, ReleaseFn, TextureFiltering};
pub use packet::Packet;
