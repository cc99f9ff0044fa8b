// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pixel formats shared by CPU frames and GPU buffers.
//!
//! One enum serves both sides of the interop boundary so a frame can cross
//! it without a format translation table. DRM fourcc values are defined
//! in-module; the only formats with a DMA-BUF export mapping are the two
//! the shareable-surface allocator supports.

/// Filtering mode applied when a texture is bound for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFiltering {
    /// GL_LINEAR min/mag filtering.
    Linear,
    /// GL_NEAREST min/mag filtering.
    Point,
}

/// DRM fourcc codes for the shareable-surface formats.
///
/// Values match `drm_fourcc.h`; defined here to avoid a libdrm dependency
/// for two constants.
pub mod drm_fourcc {
    /// DRM_FORMAT_ABGR8888 ('AB24') - matches 8-bit BGRA GL textures.
    pub const ABGR8888: u32 = 0x3432_4241;
    /// DRM_FORMAT_BGR888 ('BG24') - matches tightly packed RGB.
    pub const BGR888: u32 = 0x3432_4742;
    /// DRM_FORMAT_MOD_LINEAR - row-major layout, no tiling.
    pub const MOD_LINEAR: u64 = 0;
}

/// Pixel format of an image buffer, CPU- or GPU-resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum PixelFormat {
    /// 8-bit BGRA (32 bits per pixel).
    #[default]
    Bgra32,
    /// 8-bit RGBA (32 bits per pixel).
    Rgba32,
    /// Tightly packed 8-bit RGB (24 bits per pixel).
    Rgb24,
    /// 16-bit float RGBA.
    RgbaHalf,
    /// 32-bit float RGBA.
    RgbaFloat,
    /// 8-bit single channel.
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel for this format.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Bgra32 | Self::Rgba32 => 4,
            Self::Rgb24 => 3,
            Self::RgbaHalf => 8,
            Self::RgbaFloat => 16,
            Self::Gray8 => 1,
        }
    }

    /// Number of planes. Every format this core supports is single-plane;
    /// the query exists so a multi-plane path has a place to hang.
    pub const fn plane_count(&self) -> u32 {
        1
    }

    /// Filtering mode for a sampled texture of this format.
    ///
    /// 32F (unlike 16F) textures do not support linear texture filtering,
    /// per the OpenGL ES specification.
    pub const fn filtering(&self) -> TextureFiltering {
        match self {
            Self::RgbaFloat => TextureFiltering::Point,
            _ => TextureFiltering::Linear,
        }
    }

    /// DRM fourcc used when exporting a shareable surface of this format.
    ///
    /// `None` means the format cannot back a DMA-BUF texture; callers treat
    /// that as a fatal precondition.
    pub const fn shareable_fourcc(&self) -> Option<u32> {
        match self {
            Self::Bgra32 => Some(drm_fourcc::ABGR8888),
            Self::Rgb24 => Some(drm_fourcc::BGR888),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bgra32 => "bgra32",
            Self::Rgba32 => "rgba32",
            Self::Rgb24 => "rgb24",
            Self::RgbaHalf => "rgba16f",
            Self::RgbaFloat => "rgba32f",
            Self::Gray8 => "gray8",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formats_use_point_filtering() {
        assert_eq!(PixelFormat::RgbaFloat.filtering(), TextureFiltering::Point);
        assert_eq!(PixelFormat::RgbaHalf.filtering(), TextureFiltering::Linear);
        assert_eq!(PixelFormat::Bgra32.filtering(), TextureFiltering::Linear);
    }

    #[test]
    fn test_shareable_fourcc_mapping() {
        assert_eq!(
            PixelFormat::Bgra32.shareable_fourcc(),
            Some(drm_fourcc::ABGR8888)
        );
        assert_eq!(
            PixelFormat::Rgb24.shareable_fourcc(),
            Some(drm_fourcc::BGR888)
        );
        assert_eq!(PixelFormat::RgbaFloat.shareable_fourcc(), None);
    }
}
