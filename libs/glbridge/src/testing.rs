// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Deterministic fakes for the three external boundaries: the GPU platform,
//! the processing engine, and the streaming pipeline.
//!
//! Test support only. [`FakeGpu`] models textures as byte vectors, shared
//! surfaces as pinned heap regions, and GPU asynchrony as a command counter:
//! rendering into a shared surface stays invisible to its mapped pointer
//! until the covering fence is waited on (or the context flushed), which is
//! what makes the fence happens-before property observable.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::engine::{GpuResources, OutputPoller, ProcessingEngine};
use crate::core::error::{BridgeError, Result};
use crate::core::frames::{PixelFormat, TextureFiltering};
use crate::core::packet::Packet;
use crate::gl::backend::{
    FenceHandle, FenceStatus, FramebufferName, GpuBackend, ImageHandle, SharedImageAlloc,
    TextureName,
};
use crate::pipeline::probe::{
    AllocationQuery, MediaPipeline, MetaCapability, PadProbe, PadQuery, PipelineState,
    ProbeVerdict, SinkPad,
};

// ---------------------------------------------------------------------------
// FakeGpu
// ---------------------------------------------------------------------------

fn to_rgba(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Rgba32 => [px[0], px[1], px[2], px[3]],
        PixelFormat::Bgra32 => [px[2], px[1], px[0], px[3]],
        PixelFormat::Rgb24 => [px[0], px[1], px[2], 0xFF],
        PixelFormat::Gray8 => [px[0], px[0], px[0], 0xFF],
        other => panic!("FakeGpu cannot convert {other} to rgba"),
    }
}

fn from_rgba(format: PixelFormat, rgba: [u8; 4], out: &mut [u8]) {
    match format {
        PixelFormat::Rgba32 => out.copy_from_slice(&rgba),
        PixelFormat::Bgra32 => out.copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]),
        PixelFormat::Rgb24 => out.copy_from_slice(&rgba[0..3]),
        PixelFormat::Gray8 => out[0] = rgba[0],
        other => panic!("FakeGpu cannot convert rgba to {other}"),
    }
}

fn fourcc_format(fourcc: u32) -> PixelFormat {
    match fourcc {
        crate::core::frames::drm_fourcc::ABGR8888 => PixelFormat::Bgra32,
        crate::core::frames::drm_fourcc::BGR888 => PixelFormat::Rgb24,
        other => panic!("FakeGpu does not model fourcc {other:#x}"),
    }
}

struct FakeTexture {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
    image: Option<ImageHandle>,
    filtering: Option<TextureFiltering>,
}

struct FakeImage {
    fd: i32,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

struct SharedRegion {
    bytes: Box<[u8]>,
    mapped: bool,
    /// Open CPU access window, `(read, write)`.
    window: Option<(bool, bool)>,
}

struct FakeFence {
    issued_at: u64,
}

/// A deferred surface write: raw bytes for a shared region, completed when
/// the command counter catches up.
struct PendingWrite {
    command: u64,
    fd: i32,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct FakeGpuState {
    next_texture: TextureName,
    textures: HashMap<TextureName, FakeTexture>,
    next_framebuffer: FramebufferName,
    framebuffers: HashMap<FramebufferName, TextureName>,
    total_framebuffers: u64,
    bound_framebuffer: FramebufferName,
    viewport: [i32; 4],
    next_image: ImageHandle,
    images: HashMap<ImageHandle, FakeImage>,
    next_fd: i32,
    regions: HashMap<i32, SharedRegion>,
    next_fence: FenceHandle,
    fences: HashMap<FenceHandle, FakeFence>,
    commands_issued: u64,
    commands_completed: u64,
    pending: VecDeque<PendingWrite>,
    forced_timeouts: u32,
}

impl FakeGpuState {
    fn complete_through(&mut self, command: u64) {
        if command > self.commands_completed {
            self.commands_completed = command;
        }
        while let Some(write) = self.pending.front() {
            if write.command > self.commands_completed {
                break;
            }
            let write = self.pending.pop_front().expect("front checked");
            let region = self
                .regions
                .get_mut(&write.fd)
                .expect("pending write against closed fd");
            assert_eq!(region.bytes.len(), write.bytes.len());
            // SAFETY: writes go through the raw pointer a concurrent mapper
            // holds, so we never form a second &mut over the region.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    write.bytes.as_ptr(),
                    region.bytes.as_ptr() as *mut u8,
                    write.bytes.len(),
                );
            }
        }
    }
}

/// In-memory GPU backend with handle accounting.
pub struct FakeGpu {
    state: Mutex<FakeGpuState>,
    dma_export: bool,
}

impl FakeGpu {
    pub fn new() -> Self {
        Self::with_dma_export(true)
    }

    pub fn with_dma_export(dma_export: bool) -> Self {
        Self {
            state: Mutex::new(FakeGpuState {
                next_texture: 1,
                next_framebuffer: 1,
                next_image: 1,
                next_fd: 100,
                next_fence: 1,
                viewport: [0, 0, 0, 0],
                ..Default::default()
            }),
            dma_export,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a texture pre-filled per pixel. The closure returns bytes in
    /// the texture's own layout; only the format's first
    /// `bytes_per_pixel` entries are used.
    pub fn seed_texture(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        pixel: impl Fn(u32, u32) -> [u8; 4],
    ) -> TextureName {
        let bpp = format.bytes_per_pixel();
        let mut data = vec![0u8; width as usize * height as usize * bpp];
        for y in 0..height {
            for x in 0..width {
                let at = (y as usize * width as usize + x as usize) * bpp;
                data[at..at + bpp].copy_from_slice(&pixel(x, y)[..bpp]);
            }
        }
        let mut state = self.state.lock();
        let name = state.next_texture;
        state.next_texture += 1;
        state.textures.insert(
            name,
            FakeTexture {
                format,
                width,
                height,
                data,
                image: None,
                filtering: None,
            },
        );
        name
    }

    /// Make the next `count` fence waits time out without completing work.
    pub fn force_fence_timeouts(&self, count: u32) {
        self.state.lock().forced_timeouts = count;
    }

    /// Read a texture's raw bytes.
    pub fn texture_bytes(&self, name: TextureName) -> Vec<u8> {
        self.state.lock().textures[&name].data.clone()
    }

    /// Filtering last applied to a texture.
    pub fn texture_filtering(&self, name: TextureName) -> Option<TextureFiltering> {
        self.state.lock().textures.get(&name).and_then(|t| t.filtering)
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub fn total_framebuffers_created(&self) -> u64 {
        self.state.lock().total_framebuffers
    }

    pub fn live_images(&self) -> usize {
        self.state.lock().images.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn open_shared_fds(&self) -> usize {
        self.state.lock().regions.len()
    }

    pub fn open_access_windows(&self) -> usize {
        self.state
            .lock()
            .regions
            .values()
            .filter(|r| r.window.is_some())
            .count()
    }
}

impl Default for FakeGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for FakeGpu {
    fn make_current(&self) {}

    fn supports_dma_export(&self) -> bool {
        self.dma_export
    }

    fn supports_drm_modifiers(&self) -> bool {
        true
    }

    fn create_texture(&self) -> TextureName {
        let mut state = self.state.lock();
        let name = state.next_texture;
        state.next_texture += 1;
        state.textures.insert(
            name,
            FakeTexture {
                format: PixelFormat::Rgba32,
                width: 0,
                height: 0,
                data: Vec::new(),
                image: None,
                filtering: None,
            },
        );
        name
    }

    fn delete_texture(&self, name: TextureName) {
        assert!(
            self.state.lock().textures.remove(&name).is_some(),
            "deleting unknown texture {name}"
        );
    }

    fn upload_texture_2d(
        &self,
        name: TextureName,
        format: PixelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        let bpp = format.bytes_per_pixel();
        let tight = width as usize * bpp;
        let mut state = self.state.lock();
        let texture = state.textures.get_mut(&name).expect("unknown texture");
        texture.format = format;
        texture.width = width;
        texture.height = height;
        // Accept strided input; store tightly packed.
        let stride = if height == 0 { 0 } else { data.len() / height as usize };
        assert!(stride >= tight, "upload smaller than a row");
        texture.data = (0..height as usize)
            .flat_map(|y| data[y * stride..y * stride + tight].to_vec())
            .collect();
    }

    fn set_standard_texture_params(&self, _target: u32, name: TextureName, format: PixelFormat) {
        if let Some(texture) = self.state.lock().textures.get_mut(&name) {
            texture.filtering = Some(format.filtering());
        }
    }

    fn create_framebuffer(&self) -> FramebufferName {
        let mut state = self.state.lock();
        let name = state.next_framebuffer;
        state.next_framebuffer += 1;
        state.total_framebuffers += 1;
        state.framebuffers.insert(name, 0);
        name
    }

    fn delete_framebuffer(&self, name: FramebufferName) {
        assert!(
            self.state.lock().framebuffers.remove(&name).is_some(),
            "deleting unknown framebuffer {name}"
        );
    }

    fn bind_framebuffer(&self, name: FramebufferName) {
        let mut state = self.state.lock();
        assert!(state.framebuffers.contains_key(&name), "binding unknown framebuffer");
        state.bound_framebuffer = name;
    }

    fn unbind_framebuffer(&self) {
        self.state.lock().bound_framebuffer = 0;
    }

    fn attach_color_texture(&self, _target: u32, name: TextureName) {
        let mut state = self.state.lock();
        let bound = state.bound_framebuffer;
        assert_ne!(bound, 0, "attaching with no framebuffer bound");
        state.framebuffers.insert(bound, name);
    }

    fn bound_color_attachment(&self) -> TextureName {
        let state = self.state.lock();
        state
            .framebuffers
            .get(&state.bound_framebuffer)
            .copied()
            .unwrap_or(0)
    }

    fn set_viewport(&self, rect: [i32; 4]) {
        self.state.lock().viewport = rect;
    }

    fn viewport(&self) -> [i32; 4] {
        self.state.lock().viewport
    }

    fn read_pixels_rgba(&self, width: u32, height: u32, out: &mut [u8]) {
        let state = self.state.lock();
        let attachment = state
            .framebuffers
            .get(&state.bound_framebuffer)
            .copied()
            .unwrap_or(0);
        assert_ne!(attachment, 0, "read_pixels with no color attachment");
        let texture = &state.textures[&attachment];
        assert!(width <= texture.width && height <= texture.height);
        let bpp = texture.format.bytes_per_pixel();
        for y in 0..height as usize {
            for x in 0..width as usize {
                let src = (y * texture.width as usize + x) * bpp;
                let rgba = to_rgba(texture.format, &texture.data[src..src + bpp]);
                out[(y * width as usize + x) * 4..][..4].copy_from_slice(&rgba);
            }
        }
    }

    fn blit_texture(&self, _target: u32, name: TextureName, width: u32, height: u32) {
        let mut state = self.state.lock();
        let dest_name = {
            let bound = state.bound_framebuffer;
            assert_ne!(bound, 0, "blit with no framebuffer bound");
            state.framebuffers[&bound]
        };
        assert_ne!(dest_name, 0, "blit with no color attachment");

        let source = &state.textures[&name];
        assert_eq!((source.width, source.height), (width, height));
        let src_format = source.format;
        let src_data = source.data.clone();

        let dest = &state.textures[&dest_name];
        let dst_format = dest.format;
        let dst_bpp = dst_format.bytes_per_pixel();
        let src_bpp = src_format.bytes_per_pixel();

        let mut tight = vec![0u8; width as usize * height as usize * dst_bpp];
        for i in 0..(width as usize * height as usize) {
            let rgba = to_rgba(src_format, &src_data[i * src_bpp..i * src_bpp + src_bpp]);
            from_rgba(dst_format, rgba, &mut tight[i * dst_bpp..(i + 1) * dst_bpp]);
        }

        state.commands_issued += 1;
        let command = state.commands_issued;

        let image = state.textures[&dest_name].image;
        if let Some(image) = image {
            let (fd, stride) = {
                let image = &state.images[&image];
                (image.fd, image.stride as usize)
            };
            let row = width as usize * dst_bpp;
            let mut bytes = vec![0u8; stride * height as usize];
            for y in 0..height as usize {
                bytes[y * stride..y * stride + row].copy_from_slice(&tight[y * row..(y + 1) * row]);
            }
            // GPU work is asynchronous: the shared region sees the pixels
            // only once the covering fence completes.
            state.pending.push_back(PendingWrite { command, fd, bytes });
        }

        let dest = state.textures.get_mut(&dest_name).expect("dest texture");
        dest.data = tight;
        dest.width = width;
        dest.height = height;
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        let issued = state.commands_issued;
        state.complete_through(issued);
    }

    fn allocate_shared_image(&self, width: u32, height: u32, fourcc: u32) -> SharedImageAlloc {
        let format = fourcc_format(fourcc);
        let stride = ((width as usize * format.bytes_per_pixel() + 63) & !63) as u32;
        let mut state = self.state.lock();
        let fd = state.next_fd;
        state.next_fd += 1;
        state.regions.insert(
            fd,
            SharedRegion {
                bytes: vec![0u8; stride as usize * height as usize].into_boxed_slice(),
                mapped: false,
                window: None,
            },
        );
        SharedImageAlloc { fd, stride }
    }

    fn import_shared_image(
        &self,
        fd: i32,
        width: u32,
        height: u32,
        stride: u32,
        fourcc: u32,
    ) -> ImageHandle {
        let mut state = self.state.lock();
        assert!(state.regions.contains_key(&fd), "importing unknown fd {fd}");
        let handle = state.next_image;
        state.next_image += 1;
        state.images.insert(
            handle,
            FakeImage {
                fd,
                width,
                height,
                stride,
                format: fourcc_format(fourcc),
            },
        );
        handle
    }

    fn bind_image_to_texture(&self, image: ImageHandle, name: TextureName) {
        let mut state = self.state.lock();
        let (width, height, format) = {
            let image = &state.images[&image];
            (image.width, image.height, image.format)
        };
        let texture = state.textures.get_mut(&name).expect("unknown texture");
        texture.image = Some(image);
        texture.format = format;
        texture.width = width;
        texture.height = height;
        texture.data = vec![0u8; width as usize * height as usize * format.bytes_per_pixel()];
    }

    fn destroy_image(&self, image: ImageHandle) {
        assert!(
            self.state.lock().images.remove(&image).is_some(),
            "destroying unknown image {image}"
        );
    }

    fn close_shared_fd(&self, fd: i32) {
        let mut state = self.state.lock();
        let region = state.regions.remove(&fd).expect("closing unknown fd");
        assert!(!region.mapped, "closing fd {fd} while mapped");
        assert!(region.window.is_none(), "closing fd {fd} inside access window");
    }

    fn map_shared(&self, fd: i32, len: usize) -> *mut u8 {
        let mut state = self.state.lock();
        let region = state.regions.get_mut(&fd).expect("mapping unknown fd");
        assert_eq!(region.bytes.len(), len, "mapping length mismatch");
        assert!(!region.mapped, "double-mapping fd {fd}");
        region.mapped = true;
        region.bytes.as_ptr() as *mut u8
    }

    fn unmap_shared(&self, ptr: *mut u8, len: usize) {
        let mut state = self.state.lock();
        let region = state
            .regions
            .values_mut()
            .find(|r| r.bytes.as_ptr() as *mut u8 == ptr)
            .expect("unmapping unknown pointer");
        assert_eq!(region.bytes.len(), len);
        assert!(region.mapped, "unmapping a region that is not mapped");
        region.mapped = false;
    }

    fn begin_cpu_access(&self, fd: i32, read: bool, write: bool) {
        let mut state = self.state.lock();
        let region = state.regions.get_mut(&fd).expect("unknown fd");
        assert!(
            region.window.is_none(),
            "begin_cpu_access while a window is already open on fd {fd}"
        );
        region.window = Some((read, write));
    }

    fn end_cpu_access(&self, fd: i32, read: bool, write: bool) {
        let mut state = self.state.lock();
        let region = state.regions.get_mut(&fd).expect("unknown fd");
        let open = region
            .window
            .take()
            .unwrap_or_else(|| panic!("end_cpu_access without a window on fd {fd}"));
        assert_eq!(open, (read, write), "unbalanced access window intent");
    }

    fn create_fence(&self) -> FenceHandle {
        let mut state = self.state.lock();
        let handle = state.next_fence;
        state.next_fence += 1;
        let issued_at = state.commands_issued;
        state.fences.insert(handle, FakeFence { issued_at });
        handle
    }

    fn client_wait_fence(&self, fence: FenceHandle, _timeout_ns: u64) -> FenceStatus {
        let mut state = self.state.lock();
        if state.forced_timeouts > 0 {
            state.forced_timeouts -= 1;
            return FenceStatus::TimedOut;
        }
        let at = state.fences.get(&fence).expect("waiting on unknown fence").issued_at;
        state.complete_through(at);
        FenceStatus::Signaled
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        assert!(
            self.state.lock().fences.remove(&fence).is_some(),
            "destroying unknown fence {fence}"
        );
    }
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

type Transform = Box<dyn Fn(&Packet) -> Packet + Send + Sync>;

#[derive(Default)]
struct FakeEngineState {
    initialized: bool,
    started: bool,
    gpu: Option<GpuResources>,
    submissions: Vec<(String, u64)>,
    outputs: HashMap<String, crossbeam_channel::Sender<Packet>>,
}

/// Scriptable processing engine.
///
/// Default behavior echoes each input packet to the single registered
/// output stream; `with_transform` rewrites payloads in between.
pub struct FakeEngine {
    state: Mutex<FakeEngineState>,
    transform: Transform,
    fail_initialize: bool,
}

impl FakeEngine {
    pub fn passthrough() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeEngineState::default()),
            transform: Box::new(Packet::clone),
            fail_initialize: false,
        })
    }

    pub fn with_transform(transform: impl Fn(&Packet) -> Packet + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeEngineState::default()),
            transform: Box::new(transform),
            fail_initialize: false,
        })
    }

    pub fn failing_initialize() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeEngineState::default()),
            transform: Box::new(Packet::clone),
            fail_initialize: true,
        })
    }

    /// Sequence stamps submitted so far, in order.
    pub fn submitted_sequences(&self) -> Vec<u64> {
        self.state.lock().submissions.iter().map(|(_, s)| *s).collect()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    pub fn was_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn has_gpu_resources(&self) -> bool {
        self.state.lock().gpu.is_some()
    }

    /// Tear the engine down: pollers see end-of-stream.
    pub fn shutdown(&self) {
        self.state.lock().outputs.clear();
    }
}

struct FakePoller {
    receiver: crossbeam_channel::Receiver<Packet>,
}

impl OutputPoller for FakePoller {
    fn next(&mut self) -> Option<Packet> {
        self.receiver.recv().ok()
    }
}

impl ProcessingEngine for FakeEngine {
    fn initialize(&self, _graph_config: &str) -> Result<()> {
        if self.fail_initialize {
            return Err(BridgeError::Engine("graph validation failed".into()));
        }
        self.state.lock().initialized = true;
        Ok(())
    }

    fn set_gpu_resources(&self, resources: GpuResources) -> Result<()> {
        self.state.lock().gpu = Some(resources);
        Ok(())
    }

    fn add_output_poller(&self, stream: &str) -> Result<Box<dyn OutputPoller>> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.state.lock().outputs.insert(stream.to_string(), sender);
        Ok(Box::new(FakePoller { receiver }))
    }

    fn start_run(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(BridgeError::Engine("start_run before initialize".into()));
        }
        state.started = true;
        Ok(())
    }

    fn add_packet(&self, stream: &str, packet: Packet) -> Result<()> {
        let output = (self.transform)(&packet);
        let mut state = self.state.lock();
        if !state.started {
            return Err(BridgeError::Engine("add_packet before start_run".into()));
        }
        state.submissions.push((stream.to_string(), packet.sequence()));
        for sender in state.outputs.values() {
            let _ = sender.send(output.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakePipeline
// ---------------------------------------------------------------------------

/// Canned sink pad response for allocation queries.
pub struct FakeSinkPad {
    pub accept: bool,
    pub capabilities: Vec<MetaCapability>,
}

impl SinkPad for FakeSinkPad {
    fn query(&self, query: &mut AllocationQuery) -> bool {
        if self.accept {
            query.capabilities = self.capabilities.clone();
        }
        self.accept
    }
}

#[derive(Default)]
struct FakePipelineInner {
    state_log: Vec<PipelineState>,
    probes: HashMap<String, Arc<dyn PadProbe>>,
    flags: Vec<(String, String, bool)>,
    fail_state_change: Option<PipelineState>,
}

/// Scriptable pipeline handle; clones share state so tests can drive the
/// probe after handing the pipeline to a session.
#[derive(Clone, Default)]
pub struct FakePipeline {
    inner: Arc<Mutex<FakePipelineInner>>,
    sink: Arc<Mutex<Option<Arc<FakeSinkPad>>>>,
}

impl FakePipeline {
    pub fn new() -> Self {
        let pipeline = Self::default();
        *pipeline.sink.lock() = Some(Arc::new(FakeSinkPad {
            accept: true,
            capabilities: Vec::new(),
        }));
        pipeline
    }

    pub fn with_sink(sink: FakeSinkPad) -> Self {
        let pipeline = Self::default();
        *pipeline.sink.lock() = Some(Arc::new(sink));
        pipeline
    }

    /// Make the given state transition fail.
    pub fn fail_on(&self, state: PipelineState) {
        self.inner.lock().fail_state_change = Some(state);
    }

    pub fn state_log(&self) -> Vec<PipelineState> {
        self.inner.lock().state_log.clone()
    }

    pub fn element_flags(&self) -> Vec<(String, String, bool)> {
        self.inner.lock().flags.clone()
    }

    pub fn probe(&self, element: &str) -> Option<Arc<dyn PadProbe>> {
        self.inner.lock().probes.get(element).cloned()
    }

    /// Drive one buffer through the installed probe, as the pipeline's
    /// streaming thread would.
    pub fn push_buffer(
        &self,
        element: &str,
        buffer: &mut crate::pipeline::buffer::PipelineBuffer,
    ) -> ProbeVerdict {
        let probe = self.probe(element).expect("no probe installed");
        probe.on_buffer(buffer)
    }

    /// Drive one query through the installed probe.
    pub fn push_query(&self, element: &str, query: &mut PadQuery) -> ProbeVerdict {
        let probe = self.probe(element).expect("no probe installed");
        probe.on_query(query)
    }
}

impl MediaPipeline for FakePipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_state_change == Some(state) {
            return Err(BridgeError::Pipeline(format!(
                "state change to {state:?} failed"
            )));
        }
        inner.state_log.push(state);
        Ok(())
    }

    fn install_probes(&mut self, element: &str, probe: Arc<dyn PadProbe>) -> Result<()> {
        self.inner.lock().probes.insert(element.to_string(), probe);
        Ok(())
    }

    fn sink_pad(&self, _element: &str) -> Result<Arc<dyn SinkPad>> {
        let sink: Arc<dyn SinkPad> = self.sink.lock().clone().expect("no sink configured");
        Ok(sink)
    }

    fn set_element_flag(&mut self, element: &str, property: &str, value: bool) -> Result<()> {
        self.inner
            .lock()
            .flags
            .push((element.to_string(), property.to_string(), value));
        Ok(())
    }

    fn native_gl_handles(
        &self,
    ) -> Result<(crate::core::engine::NativeGlHandle, crate::core::engine::NativeDisplayHandle)>
    {
        Ok((
            crate::core::engine::NativeGlHandle(0xFA4E),
            crate::core::engine::NativeDisplayHandle(0xD150),
        ))
    }
}
