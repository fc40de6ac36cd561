use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, Rgba32FImage, RgbaImage};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::TextureError;

/// Number of texture units a frame can bind at once.
pub const TEXTURE_UNITS: usize = 16;

/// Internal colour format picked from an image's channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Red,
    Rgb,
    Srgb,
    Rgba,
    SrgbAlpha,
}

impl PixelFormat {
    /// Maps a channel count and the gamma-correction flag to a format.
    /// Single-channel images stay linear regardless of the flag.
    pub fn select(channels: u8, gamma_correction: bool) -> Result<Self, TextureError> {
        match (channels, gamma_correction) {
            (1, _) => Ok(PixelFormat::Red),
            (3, false) => Ok(PixelFormat::Rgb),
            (3, true) => Ok(PixelFormat::Srgb),
            (4, false) => Ok(PixelFormat::Rgba),
            (4, true) => Ok(PixelFormat::SrgbAlpha),
            (channels, _) => Err(TextureError::UnsupportedChannels { channels }),
        }
    }

    /// wgpu has no three-channel formats; RGB data is widened to RGBA.
    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Red => wgpu::TextureFormat::R8Unorm,
            PixelFormat::Rgb | PixelFormat::Rgba => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Srgb | PixelFormat::SrgbAlpha => wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }

    fn is_single_channel(self) -> bool {
        self == PixelFormat::Red
    }

    fn is_srgb(self) -> bool {
        matches!(self, PixelFormat::Srgb | PixelFormat::SrgbAlpha)
    }
}

/// Decoded, vertically flipped image ready for upload.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub format: PixelFormat,
    image: DynamicImage,
}

impl DecodedImage {
    pub fn open(path: &Path, gamma_correction: bool) -> Result<Self, TextureError> {
        let image = image::open(path).map_err(|source| TextureError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_dynamic(image, gamma_correction)
    }

    pub fn from_dynamic(image: DynamicImage, gamma_correction: bool) -> Result<Self, TextureError> {
        let format = PixelFormat::select(image.color().channel_count(), gamma_correction)?;
        // Image rows run top-down; texture coordinates start at the bottom.
        let flipped = image.flipv();
        let image = if format.is_single_channel() {
            DynamicImage::ImageLuma8(flipped.to_luma8())
        } else {
            DynamicImage::ImageRgba8(flipped.to_rgba8())
        };
        Ok(Self { format, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Base level pixels in upload layout (one or four bytes per texel).
    pub fn pixels(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn mip_level_count(&self) -> u32 {
        mip_level_count(self.width(), self.height())
    }

    /// Every mip level, largest first, concatenated in upload order.
    ///
    /// sRGB images are filtered in linear light and re-encoded per level.
    pub fn mip_chain(&self) -> Vec<u8> {
        let mut data = self.pixels().to_vec();
        let linear = self
            .format
            .is_srgb()
            .then(|| linearize(&self.image.to_rgba8()));
        let (mut width, mut height) = (self.width(), self.height());
        for _ in 1..self.mip_level_count() {
            width = (width / 2).max(1);
            height = (height / 2).max(1);
            match &linear {
                Some(base) => {
                    let level = imageops::resize(base, width, height, FilterType::Triangle);
                    data.extend(level.pixels().flat_map(encode_srgb));
                }
                None => {
                    let level = self.image.resize_exact(width, height, FilterType::Triangle);
                    data.extend_from_slice(level.as_bytes());
                }
            }
        }
        data
    }
}

/// Decodes the colour channels to linear light. Alpha is only rescaled.
fn linearize(image: &RgbaImage) -> Rgba32FImage {
    Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        Rgba([
            srgb_to_linear(r),
            srgb_to_linear(g),
            srgb_to_linear(b),
            f32::from(a) / 255.0,
        ])
    })
}

fn encode_srgb(texel: &Rgba<f32>) -> [u8; 4] {
    let [r, g, b, a] = texel.0;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b), unorm8(a)]
}

fn srgb_to_linear(value: u8) -> f32 {
    let c = f32::from(value) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(value: f32) -> u8 {
    let c = value.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    unorm8(encoded)
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// A sampled 2D texture with its view and sampler.
///
/// Cloning shares the underlying GPU objects; `id` identifies them when
/// caching bind groups.
#[derive(Clone, Debug)]
pub struct Texture {
    pub id: u64,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub format: wgpu::TextureFormat,
    pub size: (u32, u32),
}

impl Texture {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        image: &DecodedImage,
    ) -> Self {
        let format = image.format.wgpu_format();
        let size = (image.width(), image.height());
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size.0,
                    height: size.1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: image.mip_level_count(),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &image.mip_chain(),
        );
        Self::finish(device, texture, format, size)
    }

    /// A 1×1 all-zero texture standing in for an image that failed to load.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &[0u8; 4],
        );
        Self::finish(device, texture, format, (1, 1))
    }

    fn finish(
        device: &wgpu::Device,
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            view,
            sampler,
            format,
            size,
        }
    }
}

/// Decodes and uploads the image at `path`.
pub fn load_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    gamma_correction: bool,
) -> Result<Texture, TextureError> {
    let image = DecodedImage::open(path, gamma_correction)?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        format = ?image.format,
        mips = image.mip_level_count(),
        "decoded texture"
    );
    Ok(Texture::upload(
        device,
        queue,
        &path.display().to_string(),
        &image,
    ))
}

/// [`load_texture`], falling back to a zeroed placeholder on failure.
pub fn load_texture_or_placeholder(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    gamma_correction: bool,
) -> Texture {
    load_texture(device, queue, path, gamma_correction).unwrap_or_else(|err| {
        tracing::error!(path = %path.display(), error = %err, "texture failed to load");
        Texture::placeholder(device, queue, "missing texture")
    })
}

/// Texture-unit table consulted when a draw resolves its sampler uniforms.
#[derive(Clone, Debug, Default)]
pub struct TextureUnits {
    slots: [Option<Texture>; TEXTURE_UNITS],
}

impl TextureUnits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `texture` to `unit`; out-of-range units are ignored.
    pub fn bind(&mut self, unit: u32, texture: &Texture) {
        match self.slots.get_mut(unit as usize) {
            Some(slot) => *slot = Some(texture.clone()),
            None => tracing::warn!(unit, limit = TEXTURE_UNITS, "texture unit out of range"),
        }
    }

    pub fn get(&self, unit: u32) -> Option<&Texture> {
        self.slots.get(unit as usize).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn three_channel_format_follows_gamma_flag() {
        assert_eq!(PixelFormat::select(3, true).unwrap(), PixelFormat::Srgb);
        assert_eq!(PixelFormat::select(3, false).unwrap(), PixelFormat::Rgb);
        assert_eq!(
            PixelFormat::select(3, true).unwrap().wgpu_format(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            PixelFormat::select(3, false).unwrap().wgpu_format(),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }

    #[test]
    fn four_channel_format_keeps_alpha() {
        assert_eq!(PixelFormat::select(4, true).unwrap(), PixelFormat::SrgbAlpha);
        assert_eq!(PixelFormat::select(4, false).unwrap(), PixelFormat::Rgba);
    }

    #[test]
    fn single_channel_is_always_linear_red() {
        for gamma in [false, true] {
            let format = PixelFormat::select(1, gamma).unwrap();
            assert_eq!(format, PixelFormat::Red);
            assert_eq!(format.wgpu_format(), wgpu::TextureFormat::R8Unorm);
        }
    }

    #[test]
    fn two_channel_images_are_rejected() {
        assert!(matches!(
            PixelFormat::select(2, false),
            Err(TextureError::UnsupportedChannels { channels: 2 })
        ));
    }

    #[test]
    fn decoded_rgb_image_is_flipped_and_widened() {
        let mut rgb = RgbImage::new(1, 2);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(0, 1, Rgb([0, 0, 255]));

        let decoded = DecodedImage::from_dynamic(DynamicImage::ImageRgb8(rgb), true).unwrap();
        assert_eq!(decoded.format, PixelFormat::Srgb);
        assert_eq!(decoded.pixels(), &[0, 0, 255, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn grayscale_stays_one_byte_per_texel() {
        let gray = GrayImage::from_pixel(4, 4, Luma([7]));
        let decoded = DecodedImage::from_dynamic(DynamicImage::ImageLuma8(gray), false).unwrap();
        assert_eq!(decoded.pixels().len(), 16);
        // 4x4 + 2x2 + 1x1
        assert_eq!(decoded.mip_chain().len(), 16 + 4 + 1);
    }

    fn black_and_white_pair(gamma_correction: bool) -> Vec<u8> {
        let mut pair = RgbImage::new(2, 1);
        pair.put_pixel(0, 0, Rgb([0, 0, 0]));
        pair.put_pixel(1, 0, Rgb([255, 255, 255]));
        DecodedImage::from_dynamic(DynamicImage::ImageRgb8(pair), gamma_correction)
            .unwrap()
            .mip_chain()
    }

    #[test]
    fn srgb_mips_average_in_linear_light() {
        let chain = black_and_white_pair(true);
        // 2x1 base plus one 1x1 level, four bytes per texel.
        assert_eq!(chain.len(), 12);
        let level = &chain[8..12];
        // Linear 0.5 re-encodes to ~188, not the gamma-space midpoint 128.
        for &channel in &level[..3] {
            assert!((187..=189).contains(&channel), "got {channel}");
        }
        assert_eq!(level[3], 255);
    }

    #[test]
    fn linear_mips_average_stored_values() {
        let chain = black_and_white_pair(false);
        assert_eq!(chain.len(), 12);
        for &channel in &chain[8..11] {
            assert!((127..=128).contains(&channel), "got {channel}");
        }
        assert_eq!(chain[11], 255);
    }

    #[test]
    fn srgb_conversion_keeps_the_endpoints() {
        assert_eq!(linear_to_srgb(srgb_to_linear(0)), 0);
        assert_eq!(linear_to_srgb(srgb_to_linear(255)), 255);
        assert_eq!(linear_to_srgb(srgb_to_linear(200)), 200);
    }

    #[test]
    fn texture_units_start_empty_and_ignore_out_of_range() {
        let units = TextureUnits::new();
        assert!(units.get(0).is_none());
        assert!(units.get(TEXTURE_UNITS as u32 - 1).is_none());
        assert!(units.get(TEXTURE_UNITS as u32).is_none());
    }

    #[test]
    fn mip_counts_cover_the_longest_edge() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(800, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn open_reads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.png");
        RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40]))
            .save(&path)
            .unwrap();

        let decoded = DecodedImage::open(&path, false).unwrap();
        assert_eq!(decoded.format, PixelFormat::Rgba);
        assert_eq!((decoded.width(), decoded.height()), (2, 2));
        assert_eq!(&decoded.pixels()[..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn missing_image_reports_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.png");
        match DecodedImage::open(&path, false) {
            Err(TextureError::Load { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected load error, got {other:?}"),
        }
    }
}
