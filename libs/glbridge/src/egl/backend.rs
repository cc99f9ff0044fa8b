// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! EGL/GL backend for Linux.
//!
//! Adopts the pipeline's native EGL context by creating a context shared
//! with it, owned by the engine-side runner thread. DMA-BUF import/export
//! and fence sync go through extension entry points resolved with
//! `eglGetProcAddress`; shareable surfaces are allocated with GBM (loaded
//! dynamically, see [`crate::egl::gbm`]).

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use khronos_egl as egl;
use parking_lot::Mutex;

use crate::core::engine::{NativeDisplayHandle, NativeGlHandle};
use crate::core::error::{BridgeError, Result};
use crate::core::frames::{PixelFormat, TextureFiltering, drm_fourcc};
use crate::egl::gbm::GbmDevice;
use crate::egl::quad::QuadRenderer;
use crate::gl::backend::{
    FenceHandle, FenceStatus, FramebufferName, GpuBackend, ImageHandle, SharedImageAlloc,
    TextureName,
};

type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

// EGL_EXT_image_dma_buf_import / EGL_KHR_image / EGL_KHR_fence_sync
// constants, absent from the core bindings.
const EGL_LINUX_DMA_BUF_EXT: u32 = 0x3270;
const EGL_LINUX_DRM_FOURCC_EXT: i32 = 0x3271;
const EGL_DMA_BUF_PLANE0_FD_EXT: i32 = 0x3272;
const EGL_DMA_BUF_PLANE0_OFFSET_EXT: i32 = 0x3273;
const EGL_DMA_BUF_PLANE0_PITCH_EXT: i32 = 0x3274;
const EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT: i32 = 0x3443;
const EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT: i32 = 0x3444;
const EGL_SYNC_FENCE_KHR: u32 = 0x30F9;
const EGL_SYNC_FLUSH_COMMANDS_BIT_KHR: i32 = 0x0001;
const EGL_TIMEOUT_EXPIRED_KHR: i32 = 0x30F5;
const EGL_CONDITION_SATISFIED_KHR: i32 = 0x30F6;
const EGL_WIDTH: i32 = 0x3057;
const EGL_HEIGHT: i32 = 0x3056;
const EGL_NONE: i32 = 0x3038;

type EglCreateImageKhrFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, u32, *mut c_void, *const i32) -> *mut c_void;
type EglDestroyImageKhrFn = unsafe extern "system" fn(*mut c_void, *mut c_void) -> u32;
type EglCreateSyncKhrFn = unsafe extern "system" fn(*mut c_void, u32, *const i32) -> *mut c_void;
type EglClientWaitSyncKhrFn = unsafe extern "system" fn(*mut c_void, *mut c_void, i32, u64) -> i32;
type EglDestroySyncKhrFn = unsafe extern "system" fn(*mut c_void, *mut c_void) -> u32;
type GlEglImageTargetTexture2DOesFn = unsafe extern "system" fn(u32, *mut c_void);

struct DmaBufEntryPoints {
    gbm: GbmDevice,
    create_image: EglCreateImageKhrFn,
    destroy_image: EglDestroyImageKhrFn,
    image_target_texture: GlEglImageTargetTexture2DOesFn,
    modifiers: bool,
}

mod dma_ioctl {
    //! DMA_BUF_IOCTL_SYNC, from linux/dma-buf.h (avoids a bindings crate
    //! for one ioctl).

    #[repr(C)]
    pub struct DmaBufSync {
        pub flags: u64,
    }

    pub const DMA_BUF_SYNC_READ: u64 = 1 << 0;
    pub const DMA_BUF_SYNC_WRITE: u64 = 2 << 0;
    pub const DMA_BUF_SYNC_END: u64 = 1 << 2;
    pub const DMA_BUF_IOCTL_SYNC: libc::c_ulong = 0x4008_6200;

    /// Issue the sync ioctl, retrying on EINTR. Unbalanced windows are
    /// undefined behavior on some drivers, so failure here is fatal.
    pub fn sync(fd: i32, flags: u64) {
        let sync = DmaBufSync { flags };
        loop {
            // SAFETY: fd is an exported dmabuf, argument struct matches the
            // kernel ABI.
            let rc = unsafe { libc::ioctl(fd, DMA_BUF_IOCTL_SYNC, &sync) };
            if rc == 0 {
                return;
            }
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            panic!("DMA_BUF_IOCTL_SYNC failed on fd {fd}: {errno}");
        }
    }
}

/// GL upload/readback triple for a pixel format.
fn gl_format(format: PixelFormat) -> (i32, u32, u32) {
    match format {
        PixelFormat::Rgba32 => (gl::RGBA as i32, gl::RGBA, gl::UNSIGNED_BYTE),
        PixelFormat::Bgra32 => (gl::RGBA as i32, gl::BGRA, gl::UNSIGNED_BYTE),
        PixelFormat::Rgb24 => (gl::RGB as i32, gl::RGB, gl::UNSIGNED_BYTE),
        PixelFormat::RgbaHalf => (gl::RGBA16F as i32, gl::RGBA, gl::HALF_FLOAT),
        PixelFormat::RgbaFloat => (gl::RGBA32F as i32, gl::RGBA, gl::FLOAT),
        PixelFormat::Gray8 => (gl::R8 as i32, gl::RED, gl::UNSIGNED_BYTE),
    }
}

/// EGL-backed [`GpuBackend`].
pub struct EglBackend {
    egl: EglInstance,
    display: egl::Display,
    context: egl::Context,
    surface: egl::Surface,
    create_sync: EglCreateSyncKhrFn,
    client_wait_sync: EglClientWaitSyncKhrFn,
    destroy_sync: EglDestroySyncKhrFn,
    dma: Option<DmaBufEntryPoints>,
    images: Mutex<HashMap<ImageHandle, usize>>,
    next_image: AtomicU64,
    fences: Mutex<HashMap<FenceHandle, usize>>,
    next_fence: AtomicU64,
    quad: Mutex<Option<QuadRenderer>>,
}

// SAFETY: every EGL/GL entry point is invoked only on the confined runner
// thread per the GpuBackend contract; the handle tables are mutex-guarded
// and the raw EGL handles are plain pointers.
unsafe impl Send for EglBackend {}
unsafe impl Sync for EglBackend {}

impl EglBackend {
    /// Create a context shared with the pipeline's, on its display.
    pub fn adopt_shared(context: NativeGlHandle, display: NativeDisplayHandle) -> Result<Self> {
        // SAFETY: loading the system EGL library by soname.
        let egl = unsafe { EglInstance::load_required() }
            .map_err(|e| BridgeError::NotSupported(format!("cannot load libEGL: {e}")))?;

        // SAFETY: the handle comes from the pipeline's GL display query.
        let display = unsafe { egl.get_display(display.0 as egl::NativeDisplayType) }
            .ok_or_else(|| BridgeError::NotSupported("no EGL display for native handle".into()))?;
        egl.initialize(display)
            .map_err(|e| BridgeError::NotSupported(format!("eglInitialize failed: {e}")))?;

        let config_attribs = [
            egl::SURFACE_TYPE,
            egl::PBUFFER_BIT,
            egl::RENDERABLE_TYPE,
            egl::OPENGL_ES2_BIT,
            egl::NONE,
        ];
        let config = egl
            .choose_first_config(display, &config_attribs)
            .map_err(|e| BridgeError::NotSupported(format!("eglChooseConfig failed: {e}")))?
            .ok_or_else(|| BridgeError::NotSupported("no pbuffer-capable EGL config".into()))?;

        // SAFETY: the handle is the pipeline's live EGL context; sharing
        // with it is the whole point of this constructor.
        let share = unsafe { egl::Context::from_ptr(context.0 as *mut c_void) };
        let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let context = egl
            .create_context(display, config, Some(share), &context_attribs)
            .map_err(|e| BridgeError::NotSupported(format!("shared eglCreateContext failed: {e}")))?;

        // 1x1 pbuffer: we only ever render into framebuffer objects, but
        // make-current needs a surface on stacks without surfaceless
        // contexts.
        let surface_attribs = [EGL_WIDTH, 1, EGL_HEIGHT, 1, EGL_NONE];
        let surface = egl
            .create_pbuffer_surface(display, config, &surface_attribs)
            .map_err(|e| BridgeError::NotSupported(format!("pbuffer creation failed: {e}")))?;

        let extensions = egl
            .query_string(Some(display), egl::EXTENSIONS)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let create_sync = Self::required_proc::<EglCreateSyncKhrFn>(&egl, "eglCreateSyncKHR")?;
        let client_wait_sync =
            Self::required_proc::<EglClientWaitSyncKhrFn>(&egl, "eglClientWaitSyncKHR")?;
        let destroy_sync = Self::required_proc::<EglDestroySyncKhrFn>(&egl, "eglDestroySyncKHR")?;

        let dma = if extensions.contains("EGL_EXT_image_dma_buf_import") {
            match GbmDevice::open() {
                Some(gbm) => Some(DmaBufEntryPoints {
                    gbm,
                    create_image: Self::required_proc::<EglCreateImageKhrFn>(
                        &egl,
                        "eglCreateImageKHR",
                    )?,
                    destroy_image: Self::required_proc::<EglDestroyImageKhrFn>(
                        &egl,
                        "eglDestroyImageKHR",
                    )?,
                    image_target_texture: Self::required_proc::<GlEglImageTargetTexture2DOesFn>(
                        &egl,
                        "glEGLImageTargetTexture2DOES",
                    )?,
                    modifiers: extensions.contains("EGL_EXT_image_dma_buf_import_modifiers"),
                }),
                None => None,
            }
        } else {
            tracing::info!("EGL_EXT_image_dma_buf_import missing; DMA-BUF export disabled");
            None
        };

        Ok(Self {
            egl,
            display,
            context,
            surface,
            create_sync,
            client_wait_sync,
            destroy_sync,
            dma,
            images: Mutex::new(HashMap::new()),
            next_image: AtomicU64::new(1),
            fences: Mutex::new(HashMap::new()),
            next_fence: AtomicU64::new(1),
            quad: Mutex::new(None),
        })
    }

    fn required_proc<F: Copy>(egl: &EglInstance, name: &str) -> Result<F> {
        assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        let addr = egl
            .get_proc_address(name)
            .ok_or_else(|| BridgeError::NotSupported(format!("{name} unsupported")))?;
        // SAFETY: eglGetProcAddress returned a non-null entry point for
        // `name`; F is the matching extern "system" signature.
        Ok(unsafe { std::mem::transmute_copy::<_, F>(&addr) })
    }

    fn dma(&self) -> &DmaBufEntryPoints {
        self.dma
            .as_ref()
            .expect("DMA-BUF operation on a backend without DMA-BUF support")
    }

    fn display_ptr(&self) -> *mut c_void {
        self.display.as_ptr()
    }

    fn check_gl_error(&self, what: &str) {
        // SAFETY: error query with a current context.
        let error = unsafe { gl::GetError() };
        assert_eq!(error, gl::NO_ERROR, "{what} failed: GL error {error:#x}");
    }
}

impl Drop for EglBackend {
    fn drop(&mut self) {
        let _ = self.egl.make_current(self.display, None, None, None);
        let _ = self.egl.destroy_surface(self.display, self.surface);
        let _ = self.egl.destroy_context(self.display, self.context);
    }
}

impl GpuBackend for EglBackend {
    fn make_current(&self) {
        self.egl
            .make_current(
                self.display,
                Some(self.surface),
                Some(self.surface),
                Some(self.context),
            )
            .unwrap_or_else(|e| panic!("eglMakeCurrent failed: {e}"));
        gl::load_with(|symbol| match self.egl.get_proc_address(symbol) {
            Some(f) => f as *const c_void,
            None => std::ptr::null(),
        });
    }

    fn supports_dma_export(&self) -> bool {
        self.dma.is_some()
    }

    fn supports_drm_modifiers(&self) -> bool {
        self.dma.as_ref().is_some_and(|d| d.modifiers)
    }

    fn create_texture(&self) -> TextureName {
        let mut name = 0;
        // SAFETY: GL object creation with a current context.
        unsafe { gl::GenTextures(1, &mut name) };
        self.check_gl_error("glGenTextures");
        name
    }

    fn delete_texture(&self, name: TextureName) {
        // SAFETY: as above.
        unsafe { gl::DeleteTextures(1, &name) };
    }

    fn upload_texture_2d(
        &self,
        name: TextureName,
        format: PixelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        let (internal, pixel_format, pixel_type) = gl_format(format);
        assert!(data.len() >= width as usize * height as usize * format.bytes_per_pixel());
        // SAFETY: data spans the full image per the assertion; rows are
        // tightly packed by the caller (alignment 1).
        unsafe {
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::BindTexture(gl::TEXTURE_2D, name);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                internal,
                width as i32,
                height as i32,
                0,
                pixel_format,
                pixel_type,
                data.as_ptr() as *const c_void,
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        self.check_gl_error("glTexImage2D");
    }

    fn set_standard_texture_params(&self, target: u32, name: TextureName, format: PixelFormat) {
        let filter = match format.filtering() {
            TextureFiltering::Linear => gl::LINEAR,
            TextureFiltering::Point => gl::NEAREST,
        } as i32;
        // SAFETY: parameter setting with a current context.
        unsafe {
            gl::BindTexture(target, name);
            gl::TexParameteri(target, gl::TEXTURE_MIN_FILTER, filter);
            gl::TexParameteri(target, gl::TEXTURE_MAG_FILTER, filter);
            gl::TexParameteri(target, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(target, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::BindTexture(target, 0);
        }
    }

    fn create_framebuffer(&self) -> FramebufferName {
        let mut name = 0;
        // SAFETY: GL object creation with a current context. Color-only
        // attachments; the depth test must stay off.
        unsafe {
            gl::Disable(gl::DEPTH_TEST);
            gl::GenFramebuffers(1, &mut name);
        }
        self.check_gl_error("glGenFramebuffers");
        name
    }

    fn delete_framebuffer(&self, name: FramebufferName) {
        // SAFETY: as above.
        unsafe { gl::DeleteFramebuffers(1, &name) };
    }

    fn bind_framebuffer(&self, name: FramebufferName) {
        // SAFETY: as above.
        unsafe { gl::BindFramebuffer(gl::FRAMEBUFFER, name) };
    }

    fn unbind_framebuffer(&self) {
        // SAFETY: as above.
        unsafe { gl::BindFramebuffer(gl::FRAMEBUFFER, 0) };
    }

    fn attach_color_texture(&self, target: u32, name: TextureName) {
        // SAFETY: as above.
        unsafe {
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(target, name);
            gl::FramebufferTexture2D(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, target, name, 0);
        }
    }

    fn bound_color_attachment(&self) -> TextureName {
        let mut name = 0;
        // SAFETY: state query with a current context.
        unsafe {
            gl::GetFramebufferAttachmentParameteriv(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                gl::FRAMEBUFFER_ATTACHMENT_OBJECT_NAME,
                &mut name,
            );
        }
        name as TextureName
    }

    fn set_viewport(&self, rect: [i32; 4]) {
        // SAFETY: as above.
        unsafe { gl::Viewport(rect[0], rect[1], rect[2], rect[3]) };
    }

    fn viewport(&self) -> [i32; 4] {
        let mut rect = [0; 4];
        // SAFETY: as above.
        unsafe { gl::GetIntegerv(gl::VIEWPORT, rect.as_mut_ptr()) };
        rect
    }

    fn read_pixels_rgba(&self, width: u32, height: u32, out: &mut [u8]) {
        assert!(out.len() >= width as usize * height as usize * 4);
        // SAFETY: out spans the full read per the assertion.
        unsafe {
            gl::PixelStorei(gl::PACK_ALIGNMENT, 1);
            gl::ReadPixels(
                0,
                0,
                width as i32,
                height as i32,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                out.as_mut_ptr() as *mut c_void,
            );
        }
        self.check_gl_error("glReadPixels");
    }

    fn blit_texture(&self, target: u32, name: TextureName, _width: u32, _height: u32) {
        let mut quad = self.quad.lock();
        let quad = quad.get_or_insert_with(QuadRenderer::new);
        // SAFETY: completeness check against the bound framebuffer.
        let status = unsafe { gl::CheckFramebufferStatus(gl::FRAMEBUFFER) };
        assert_eq!(
            status,
            gl::FRAMEBUFFER_COMPLETE,
            "incomplete framebuffer for conversion pass"
        );
        quad.draw(target, name);
    }

    fn flush(&self) {
        // SAFETY: as above.
        unsafe { gl::Flush() };
    }

    fn allocate_shared_image(&self, width: u32, height: u32, fourcc: u32) -> SharedImageAlloc {
        let exported = self.dma().gbm.export_buffer(width, height, fourcc);
        SharedImageAlloc {
            fd: exported.fd,
            stride: exported.stride,
        }
    }

    fn import_shared_image(
        &self,
        fd: i32,
        width: u32,
        height: u32,
        stride: u32,
        fourcc: u32,
    ) -> ImageHandle {
        let dma = self.dma();
        let mut attribs: Vec<i32> = vec![
            EGL_WIDTH,
            width as i32,
            EGL_HEIGHT,
            height as i32,
            EGL_LINUX_DRM_FOURCC_EXT,
            fourcc as i32,
            EGL_DMA_BUF_PLANE0_FD_EXT,
            fd,
            EGL_DMA_BUF_PLANE0_OFFSET_EXT,
            0,
            EGL_DMA_BUF_PLANE0_PITCH_EXT,
            stride as i32,
        ];
        if dma.modifiers {
            attribs.extend_from_slice(&[
                EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT,
                (drm_fourcc::MOD_LINEAR & 0xFFFF_FFFF) as i32,
                EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT,
                ((drm_fourcc::MOD_LINEAR >> 32) & 0xFFFF_FFFF) as i32,
            ]);
        }
        attribs.push(EGL_NONE);

        // SAFETY: attrib list is EGL_NONE-terminated; the import does not
        // take ownership of fd.
        let image = unsafe {
            (dma.create_image)(
                self.display_ptr(),
                std::ptr::null_mut(), // EGL_NO_CONTEXT
                EGL_LINUX_DMA_BUF_EXT,
                std::ptr::null_mut(), // no client buffer for dmabuf import
                attribs.as_ptr(),
            )
        };
        assert!(!image.is_null(), "eglCreateImageKHR failed for dmabuf import");

        let handle = self.next_image.fetch_add(1, Ordering::Relaxed);
        self.images.lock().insert(handle, image as usize);
        handle
    }

    fn bind_image_to_texture(&self, image: ImageHandle, name: TextureName) {
        let ptr = *self
            .images
            .lock()
            .get(&image)
            .expect("binding unknown image handle");
        let dma = self.dma();
        // SAFETY: image is a live EGLImage; texture binding per
        // OES_EGL_image.
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, name);
            (dma.image_target_texture)(gl::TEXTURE_2D, ptr as *mut c_void);
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        self.check_gl_error("glEGLImageTargetTexture2DOES");
    }

    fn destroy_image(&self, image: ImageHandle) {
        let ptr = self
            .images
            .lock()
            .remove(&image)
            .expect("destroying unknown image handle");
        // SAFETY: ptr is the EGLImage created in import_shared_image.
        unsafe { (self.dma().destroy_image)(self.display_ptr(), ptr as *mut c_void) };
    }

    fn close_shared_fd(&self, fd: i32) {
        // SAFETY: fd is an exported dmabuf owned by this backend.
        unsafe { libc::close(fd) };
    }

    fn map_shared(&self, fd: i32, len: usize) -> *mut u8 {
        // SAFETY: mapping an exported dmabuf for its full size.
        let data = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        assert_ne!(
            data,
            libc::MAP_FAILED,
            "failed to mmap dmabuf fd {fd}: {}",
            std::io::Error::last_os_error()
        );
        data as *mut u8
    }

    fn unmap_shared(&self, ptr: *mut u8, len: usize) {
        // SAFETY: ptr/len from a successful map_shared.
        let rc = unsafe { libc::munmap(ptr as *mut c_void, len) };
        assert_eq!(
            rc,
            0,
            "failed to munmap dmabuf: {}",
            std::io::Error::last_os_error()
        );
    }

    fn begin_cpu_access(&self, fd: i32, read: bool, write: bool) {
        let mut flags = 0;
        if read {
            flags |= dma_ioctl::DMA_BUF_SYNC_READ;
        }
        if write {
            flags |= dma_ioctl::DMA_BUF_SYNC_WRITE;
        }
        dma_ioctl::sync(fd, flags);
    }

    fn end_cpu_access(&self, fd: i32, read: bool, write: bool) {
        let mut flags = dma_ioctl::DMA_BUF_SYNC_END;
        if read {
            flags |= dma_ioctl::DMA_BUF_SYNC_READ;
        }
        if write {
            flags |= dma_ioctl::DMA_BUF_SYNC_WRITE;
        }
        dma_ioctl::sync(fd, flags);
    }

    fn create_fence(&self) -> FenceHandle {
        // SAFETY: fence creation on this context's display.
        let sync =
            unsafe { (self.create_sync)(self.display_ptr(), EGL_SYNC_FENCE_KHR, std::ptr::null()) };
        assert!(!sync.is_null(), "eglCreateSyncKHR failed");
        let handle = self.next_fence.fetch_add(1, Ordering::Relaxed);
        self.fences.lock().insert(handle, sync as usize);
        handle
    }

    fn client_wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> FenceStatus {
        let ptr = *self
            .fences
            .lock()
            .get(&fence)
            .expect("waiting on unknown fence handle");
        // SAFETY: ptr is a live EGLSync.
        let rc = unsafe {
            (self.client_wait_sync)(
                self.display_ptr(),
                ptr as *mut c_void,
                EGL_SYNC_FLUSH_COMMANDS_BIT_KHR,
                timeout_ns,
            )
        };
        match rc {
            EGL_CONDITION_SATISFIED_KHR => FenceStatus::Signaled,
            EGL_TIMEOUT_EXPIRED_KHR => FenceStatus::TimedOut,
            other => panic!("eglClientWaitSyncKHR failed: {other:#x}"),
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let ptr = self
            .fences
            .lock()
            .remove(&fence)
            .expect("destroying unknown fence handle");
        // SAFETY: ptr is the EGLSync created in create_fence.
        unsafe { (self.destroy_sync)(self.display_ptr(), ptr as *mut c_void) };
    }
}
