// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Immutable, sequence-stamped, type-erased values exchanged with the
//! processing engine.

use std::any::Any;
use std::sync::Arc;

/// An engine packet: a reference-counted, type-erased payload plus the
/// sequence stamp it was submitted at.
///
/// Packets are immutable; clones share the payload. A packet's lifetime can
/// be extended past the call that produced it by capturing a clone in a
/// release callback (the cross-subsystem ownership handoff the interceptor
/// relies on).
#[derive(Clone)]
pub struct Packet {
    payload: Arc<dyn Any + Send + Sync>,
    sequence: u64,
}

impl Packet {
    pub fn new<T: Any + Send + Sync>(payload: T, sequence: u64) -> Self {
        Self {
            payload: Arc::new(payload),
            sequence,
        }
    }

    /// Sequence stamp assigned at submission. Strictly monotonic per input
    /// stream, starting at zero; not wall-clock time.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrow the payload as `T`, or `None` if the payload is another type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Name of the payload's concrete type when known, for diagnostics.
    pub fn payload_summary(&self) -> &'static str {
        use crate::core::frames::{CpuFrame, ExternalTexture, GpuBuffer};
        if self.is::<GpuBuffer>() {
            "GpuBuffer"
        } else if self.is::<ExternalTexture>() {
            "ExternalTexture"
        } else if self.is::<CpuFrame>() {
            "CpuFrame"
        } else {
            "opaque"
        }
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("sequence", &self.sequence)
            .field("payload", &self.payload_summary())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_roundtrip() {
        let packet = Packet::new(42u32, 7);
        assert_eq!(packet.sequence(), 7);
        assert_eq!(packet.get::<u32>(), Some(&42));
        assert_eq!(packet.get::<u64>(), None);
    }

    #[test]
    fn test_clone_shares_payload() {
        let packet = Packet::new(String::from("shared"), 0);
        let clone = packet.clone();
        assert!(std::ptr::eq(
            packet.get::<String>().unwrap(),
            clone.get::<String>().unwrap()
        ));
    }
}
