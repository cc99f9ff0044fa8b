//! GPU-to-CPU conversion scenarios against the fake backend: the 640x480
//! RGB round trip, instance recycling across cycles, mapping-window
//! discipline, and the fence happens-before property.

use std::sync::Arc;

use glbridge::core::frames::ExternalTexture;
use glbridge::core::{CpuFrame, Packet, PixelFormat};
use glbridge::gl::{
    DmaTexture, GlInteropHelper, GlTaskRunner, GpuBackend, GpuFrameConverter, gl_constants,
    wait_fence_blocking,
};
use glbridge::testing::FakeGpu;

fn converter(gpu: &Arc<FakeGpu>) -> GpuFrameConverter {
    let runner = GlTaskRunner::spawn("engine-gl", gpu.clone());
    GpuFrameConverter::new(Arc::new(GlInteropHelper::new(runner)))
}

fn rgb_texture_packet(gpu: &FakeGpu, seed: u8, sequence: u64) -> (u32, Packet) {
    let texture = gpu.seed_texture(PixelFormat::Rgb24, 640, 480, move |x, y| {
        [seed, (x % 251) as u8, (y % 241) as u8, 0]
    });
    let packet = Packet::new(
        ExternalTexture {
            target: gl_constants::TEXTURE_2D,
            name: texture,
            width: 640,
            height: 480,
            format: PixelFormat::Rgb24,
        },
        sequence,
    );
    (texture, packet)
}

#[test]
fn rgb_640x480_frame_round_trips_to_cpu() {
    let gpu = FakeGpu::shared();
    let converter = converter(&gpu);
    let (_texture, packet) = rgb_texture_packet(&gpu, 7, 0);

    let out = converter.process(&packet).unwrap();
    let frame = out.get::<CpuFrame>().unwrap();

    assert_eq!(frame.width(), 640);
    assert_eq!(frame.height(), 480);
    assert_eq!(frame.format(), PixelFormat::Rgb24);
    assert!(frame.stride() >= 640 * 3);
    assert_eq!(frame.row(0)[0..3], [7, 0, 0]);
    assert_eq!(frame.row(3)[3..6], [7, 1, 3]);

    drop(out);
    converter.close().unwrap();
}

#[test]
fn second_cycle_recycles_the_instance_with_fresh_contents() {
    let gpu = FakeGpu::shared();
    let converter = converter(&gpu);

    let (_, first_packet) = rgb_texture_packet(&gpu, 10, 0);
    let first = converter.process(&first_packet).unwrap();
    let first_ptr = first.get::<CpuFrame>().unwrap().data().as_ptr();
    assert_eq!(first.get::<CpuFrame>().unwrap().row(0)[0], 10);
    drop(first);

    let (_, second_packet) = rgb_texture_packet(&gpu, 20, 1);
    let second = converter.process(&second_packet).unwrap();
    let second_frame = second.get::<CpuFrame>().unwrap();

    // Same backing instance, second frame's pixels.
    assert_eq!(second_frame.data().as_ptr(), first_ptr);
    assert_eq!(second_frame.row(0)[0], 20);
    assert_eq!(gpu.open_shared_fds(), 1);

    drop(second);
    converter.close().unwrap();
    assert_eq!(gpu.open_shared_fds(), 0);
}

#[test]
fn cpu_access_window_tracks_frame_lifetime() {
    let gpu = FakeGpu::shared();
    let converter = converter(&gpu);
    let (_, packet) = rgb_texture_packet(&gpu, 1, 0);

    assert_eq!(gpu.open_access_windows(), 0);
    let out = converter.process(&packet).unwrap();
    assert_eq!(gpu.open_access_windows(), 1);

    // Reads happen here, inside the window.
    let _ = out.get::<CpuFrame>().unwrap().row(0);

    drop(out);
    assert_eq!(gpu.open_access_windows(), 0);
    converter.close().unwrap();
}

#[test]
fn no_handle_growth_across_many_cycles() {
    let gpu = FakeGpu::shared();
    let converter = converter(&gpu);

    let small_packet = |seed: u8, sequence: u64| {
        let texture = gpu.seed_texture(PixelFormat::Bgra32, 64, 48, move |_, _| [seed, 0, 0, 0xFF]);
        (
            texture,
            Packet::new(
                ExternalTexture {
                    target: gl_constants::TEXTURE_2D,
                    name: texture,
                    width: 64,
                    height: 48,
                    format: PixelFormat::Bgra32,
                },
                sequence,
            ),
        )
    };

    let (warmup_texture, warmup) = small_packet(0, 0);
    drop(converter.process(&warmup).unwrap());
    gpu.delete_texture(warmup_texture);
    let textures = gpu.live_textures();
    let framebuffers = gpu.live_framebuffers();
    let images = gpu.live_images();
    let fds = gpu.open_shared_fds();

    for sequence in 1..=1000 {
        let (source, packet) = small_packet((sequence % 255) as u8, sequence);
        drop(converter.process(&packet).unwrap());
        // Source textures are the test's; free them to isolate converter
        // handles.
        gpu.delete_texture(source);
    }

    assert_eq!(gpu.live_textures(), textures);
    assert_eq!(gpu.live_framebuffers(), framebuffers);
    assert_eq!(gpu.live_images(), images);
    assert_eq!(gpu.open_shared_fds(), fds);
    converter.close().unwrap();
}

#[test]
fn fence_gates_visibility_of_rendered_pixels() {
    let gpu = FakeGpu::shared();
    let source = gpu.seed_texture(PixelFormat::Bgra32, 4, 4, |_, _| [0x11, 0x22, 0x33, 0x44]);

    let mut texture = DmaTexture::allocate(gpu.as_ref(), 4, 4, PixelFormat::Bgra32);
    gpu.bind_framebuffer(texture.framebuffer());
    gpu.set_viewport([0, 0, 4, 4]);
    gpu.blit_texture(gl_constants::TEXTURE_2D, source, 4, 4);
    texture.set_fence(gpu.as_ref());
    gpu.unbind_framebuffer();

    // SAFETY: reading the mapped region; the instance is live.
    let mapped =
        unsafe { std::slice::from_raw_parts(texture.mapped_ptr(), texture.mapped_len()) };

    // Before the fence wait the GPU work is not observable.
    assert_eq!(&mapped[0..4], &[0, 0, 0, 0]);

    texture.wait_fence(gpu.as_ref());
    assert_eq!(&mapped[0..4], &[0x11, 0x22, 0x33, 0x44]);

    texture.destroy(gpu.as_ref());
}

#[test]
fn timed_out_fence_waits_are_retried_until_signaled() {
    let gpu = FakeGpu::shared();
    let source = gpu.seed_texture(PixelFormat::Bgra32, 2, 2, |_, _| [9, 8, 7, 6]);

    let texture = DmaTexture::allocate(gpu.as_ref(), 2, 2, PixelFormat::Bgra32);
    gpu.bind_framebuffer(texture.framebuffer());
    gpu.set_viewport([0, 0, 2, 2]);
    gpu.blit_texture(gl_constants::TEXTURE_2D, source, 2, 2);
    let fence = gpu.create_fence();
    gpu.unbind_framebuffer();

    gpu.force_fence_timeouts(3);
    wait_fence_blocking(gpu.as_ref(), fence);

    // SAFETY: reading the mapped region; the instance is live.
    let mapped = unsafe { std::slice::from_raw_parts(texture.mapped_ptr(), 4) };
    assert_eq!(mapped, &[9, 8, 7, 6]);

    gpu.destroy_fence(fence);
    texture.destroy(gpu.as_ref());
}
