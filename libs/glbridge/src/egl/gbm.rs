// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Minimal GBM binding for shareable-surface allocation.
//!
//! Loaded dynamically like the EGL entry points; hosts without a render
//! node or libgbm simply report no DMA-BUF support instead of failing the
//! build.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uint};

const RENDER_NODE: &[u8] = b"/dev/dri/renderD128\0";
const LIBGBM: &str = "libgbm.so.1";

/// GBM_BO_USE_RENDERING from gbm.h.
const GBM_BO_USE_RENDERING: u32 = 1 << 2;

type CreateDeviceFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type DestroyDeviceFn = unsafe extern "C" fn(*mut c_void);
type IsFormatSupportedFn = unsafe extern "C" fn(*mut c_void, u32, u32) -> c_int;
type BoCreateFn = unsafe extern "C" fn(*mut c_void, u32, u32, u32, u32) -> *mut c_void;
type BoGetStrideFn = unsafe extern "C" fn(*mut c_void) -> u32;
type BoGetFdFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type BoDestroyFn = unsafe extern "C" fn(*mut c_void);

/// A GBM device on the first render node.
pub struct GbmDevice {
    // Keeps the dlopen handle alive for the copied-out fn pointers.
    _lib: libloading::Library,
    device: *mut c_void,
    drm_fd: c_int,
    destroy_device: DestroyDeviceFn,
    is_format_supported: IsFormatSupportedFn,
    bo_create: BoCreateFn,
    bo_get_stride: BoGetStrideFn,
    bo_get_fd: BoGetFdFn,
    bo_destroy: BoDestroyFn,
}

// SAFETY: all calls are confined to the owning context thread by the
// backend's contract; the raw handles themselves are plain pointers.
unsafe impl Send for GbmDevice {}
unsafe impl Sync for GbmDevice {}

/// An exported buffer: the fd owns the memory, the allocation handle is
/// already destroyed.
pub struct ExportedBuffer {
    pub fd: c_int,
    pub stride: u32,
}

impl GbmDevice {
    /// Open the render node and load libgbm. `None` when either is
    /// unavailable; the caller falls back to readback conversion.
    pub fn open() -> Option<Self> {
        // SAFETY: open(2) with a static path.
        let drm_fd = unsafe { libc::open(RENDER_NODE.as_ptr() as *const c_char, libc::O_RDWR) };
        if drm_fd < 0 {
            tracing::info!("no DRM render node; DMA-BUF export disabled");
            return None;
        }

        // SAFETY: loading a system library by soname.
        let lib = match unsafe { libloading::Library::new(LIBGBM) } {
            Ok(lib) => lib,
            Err(e) => {
                tracing::info!("libgbm unavailable ({e}); DMA-BUF export disabled");
                // SAFETY: fd from the successful open above.
                unsafe { libc::close(drm_fd) };
                return None;
            }
        };

        // SAFETY: symbol names and signatures match gbm.h.
        let (create_device, destroy_device, is_format_supported, bo_create, bo_get_stride, bo_get_fd, bo_destroy) = unsafe {
            (
                *lib.get::<CreateDeviceFn>(b"gbm_create_device\0").ok()?,
                *lib.get::<DestroyDeviceFn>(b"gbm_device_destroy\0").ok()?,
                *lib.get::<IsFormatSupportedFn>(b"gbm_device_is_format_supported\0")
                    .ok()?,
                *lib.get::<BoCreateFn>(b"gbm_bo_create\0").ok()?,
                *lib.get::<BoGetStrideFn>(b"gbm_bo_get_stride\0").ok()?,
                *lib.get::<BoGetFdFn>(b"gbm_bo_get_fd\0").ok()?,
                *lib.get::<BoDestroyFn>(b"gbm_bo_destroy\0").ok()?,
            )
        };

        // SAFETY: fd is a valid render node.
        let device = unsafe { create_device(drm_fd) };
        assert!(!device.is_null(), "failed to create GBM device");

        Some(Self {
            _lib: lib,
            device,
            drm_fd,
            destroy_device,
            is_format_supported,
            bo_create,
            bo_get_stride,
            bo_get_fd,
            bo_destroy,
        })
    }

    /// Allocate a buffer object, export it as a dmabuf fd, and destroy the
    /// object (ownership transfers to the fd). Fatal on allocation or
    /// export failure.
    pub fn export_buffer(&self, width: u32, height: u32, fourcc: u32) -> ExportedBuffer {
        // SAFETY: device valid for the lifetime of self.
        let supported =
            unsafe { (self.is_format_supported)(self.device, fourcc, GBM_BO_USE_RENDERING) };
        assert_ne!(
            supported, 0,
            "GBM implementation does not support format {fourcc:#x}"
        );

        // SAFETY: as above.
        let bo = unsafe {
            (self.bo_create)(
                self.device,
                width,
                height,
                fourcc,
                GBM_BO_USE_RENDERING as c_uint,
            )
        };
        assert!(!bo.is_null(), "failed to create GBM buffer object");

        // SAFETY: bo from the successful create above.
        let (stride, fd) = unsafe { ((self.bo_get_stride)(bo), (self.bo_get_fd)(bo)) };
        // SAFETY: bo not used past this point.
        unsafe { (self.bo_destroy)(bo) };
        assert!(fd >= 0, "failed to export dmabuf");

        ExportedBuffer { fd, stride }
    }
}

impl Drop for GbmDevice {
    fn drop(&mut self) {
        // SAFETY: handles acquired in open() and owned by self.
        unsafe {
            (self.destroy_device)(self.device);
            libc::close(self.drm_fd);
        }
    }
}
