// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! CPU-addressable pixel frame with an owning release callback.

use super::PixelFormat;

/// Release callback invoked exactly once when the frame is dropped.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

enum Backing {
    /// Heap allocation owned by the frame.
    Owned(Box<[u8]>),
    /// Memory owned elsewhere: a mapped DMA-BUF region or a borrowed
    /// pointer with an external deleter. The release callback runs when the
    /// frame drops and must re-enter the owning GL context itself if its
    /// teardown is context-confined.
    Foreign {
        data: *mut u8,
        len: usize,
        release: Option<ReleaseFn>,
    },
}

/// A CPU-addressable pixel buffer.
///
/// The backing memory is valid from construction until the release callback
/// runs, which happens exactly once, on drop. Row `r` starts at byte
/// `r * stride`; `stride >= width * format.bytes_per_pixel()`.
pub struct CpuFrame {
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    backing: Backing,
}

// SAFETY: the foreign pointer is either a mapped shared region or a borrowed
// allocation whose owner outlives the frame by contract; nothing in the frame
// is thread-affine. Context-confined teardown is the release callback's job.
unsafe impl Send for CpuFrame {}
unsafe impl Sync for CpuFrame {}

impl CpuFrame {
    /// Allocate a zeroed frame with the given row alignment.
    pub fn alloc(format: PixelFormat, width: u32, height: u32, alignment: usize) -> Self {
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        let row = width as usize * format.bytes_per_pixel();
        let stride = (row + alignment - 1) & !(alignment - 1);
        let data = vec![0u8; stride * height as usize].into_boxed_slice();
        Self {
            format,
            width,
            height,
            stride,
            backing: Backing::Owned(data),
        }
    }

    /// Wrap externally-owned memory.
    ///
    /// `release` runs exactly once when the frame drops. If the backing
    /// resource requires GL-context-confined teardown, the callback must
    /// re-enter that context (see `GlTaskRunner::run_sync`, which executes
    /// inline when already on the context thread).
    ///
    /// # Safety
    /// `data` must point to at least `stride * height` readable bytes that
    /// stay valid until `release` runs.
    pub unsafe fn from_raw_parts(
        format: PixelFormat,
        width: u32,
        height: u32,
        stride: usize,
        data: *mut u8,
        release: ReleaseFn,
    ) -> Self {
        assert!(!data.is_null(), "CpuFrame backing pointer is null");
        assert!(
            stride >= width as usize * format.bytes_per_pixel(),
            "stride {} too small for {} pixels of {}",
            stride,
            width,
            format
        );
        Self {
            format,
            width,
            height,
            stride,
            backing: Backing::Foreign {
                data,
                len: stride * height as usize,
                release: Some(release),
            },
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Full backing slice, `stride * height` bytes.
    pub fn data(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(data) => data,
            // SAFETY: valid per the from_raw_parts contract until release runs.
            Backing::Foreign { data, len, .. } => unsafe {
                std::slice::from_raw_parts(*data, *len)
            },
        }
    }

    /// Mutable backing slice.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Owned(data) => data,
            // SAFETY: valid per the from_raw_parts contract until release runs.
            Backing::Foreign { data, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(*data, *len)
            },
        }
    }

    /// One row of pixels, without the stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height);
        let row = self.width as usize * self.format.bytes_per_pixel();
        let start = y as usize * self.stride;
        &self.data()[start..start + row]
    }
}

impl Drop for CpuFrame {
    fn drop(&mut self) {
        if let Backing::Foreign { release, .. } = &mut self.backing {
            if let Some(release) = release.take() {
                release();
            }
        }
    }
}

impl std::fmt::Debug for CpuFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_alloc_stride_alignment() {
        let frame = CpuFrame::alloc(PixelFormat::Rgb24, 641, 3, 4);
        assert_eq!(frame.stride() % 4, 0);
        assert!(frame.stride() >= 641 * 3);
        assert_eq!(frame.data().len(), frame.stride() * 3);
    }

    #[test]
    fn test_release_runs_exactly_once() {
        let count = Arc::new(AtomicU32::new(0));
        let mut data = vec![0u8; 4 * 2 * 2];
        let frame = {
            let count = Arc::clone(&count);
            // SAFETY: data outlives the frame in this scope.
            unsafe {
                CpuFrame::from_raw_parts(
                    PixelFormat::Rgba32,
                    2,
                    2,
                    8,
                    data.as_mut_ptr(),
                    Box::new(move || {
                        count.fetch_add(1, Ordering::SeqCst);
                    }),
                )
            }
        };
        drop(frame);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
