use std::{path::Path, sync::Arc};

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops::FilterType};
use log::debug;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, StegoError},
    image_utils::{image_to_array, is_gray8, luma_601_wide, sample_depth, to_luma},
};

pub const DEFAULT_TARGET_SIZE: (u32, u32) = (512, 512);

/// Camera raw extensions that can only be read through a [`RawDecoder`].
pub const RAW_EXTENSIONS: &[&str] = &["dng"];

/// Decoder for camera raw containers. Implementations must return a
/// demosaiced 8-bit RGB image.
pub trait RawDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RgbImage>;

    /// Lowercase file extensions routed to this decoder.
    fn extensions(&self) -> &[&str] {
        RAW_EXTENSIONS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Bicubic,
    Lanczos3,
    Triangle,
    Gaussian,
}

impl ResampleFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            ResampleFilter::Bicubic => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::Gaussian => FilterType::Gaussian,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Keep the decoded channel layout (1, 2, 3 or 4 samples per pixel).
    Native,
    /// Collapse to a single luma plane before resampling.
    Luma,
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// height x width x channel samples, widened to u16 so 16-bit sources
    /// keep their low bit
    pub pixels: Array3<u16>,
    pub channels: usize,
    /// 8 or 16
    pub bit_depth: u8,
    /// Whether the decoded source was 8-bit single channel, regardless of
    /// the layout requested.
    pub was_single_channel: bool,
}

impl NormalizedImage {
    pub fn dimensions(&self) -> (usize, usize) {
        let (height, width, _) = self.pixels.dim();
        (height, width)
    }

    /// Single-channel floating point plane for the SPAM extractor.
    pub fn luma_f32(&self) -> Array2<f32> {
        match self.channels {
            1 | 2 => self.pixels.index_axis(Axis(2), 0).mapv(|v| v as f32),
            _ => {
                let (height, width) = self.dimensions();
                Array2::from_shape_fn((height, width), |(y, x)| {
                    luma_601_wide(
                        self.pixels[[y, x, 0]],
                        self.pixels[[y, x, 1]],
                        self.pixels[[y, x, 2]],
                    ) as f32
                })
            }
        }
    }
}

pub struct ImageNormalizer {
    target_size: (u32, u32),
    filter: ResampleFilter,
    rewrite_source: bool,
    raw_decoder: Option<Arc<dyn RawDecoder>>,
}

impl ImageNormalizer {
    pub fn new(target_size: (u32, u32)) -> Result<Self> {
        if target_size.0 == 0 || target_size.1 == 0 {
            return Err(StegoError::InvalidParameter(format!(
                "target size must be non-zero, got {}x{}",
                target_size.0, target_size.1
            )));
        }

        Ok(Self {
            target_size,
            filter: ResampleFilter::Bicubic,
            rewrite_source: false,
            raw_decoder: None,
        })
    }

    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Re-encode the resized image over the source file as PNG. Off unless
    /// explicitly requested since it mutates the input.
    pub fn with_rewrite_source(mut self, rewrite: bool) -> Self {
        self.rewrite_source = rewrite;
        self
    }

    pub fn with_raw_decoder(mut self, decoder: Arc<dyn RawDecoder>) -> Self {
        self.raw_decoder = Some(decoder);
        self
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    pub fn has_raw_decoder(&self) -> bool {
        self.raw_decoder.is_some()
    }

    pub fn normalize<P: AsRef<Path>>(&self, path: P) -> Result<NormalizedImage> {
        self.normalize_path(path.as_ref(), PixelLayout::Native)
    }

    pub fn normalize_luma<P: AsRef<Path>>(&self, path: P) -> Result<NormalizedImage> {
        self.normalize_path(path.as_ref(), PixelLayout::Luma)
    }

    fn normalize_path(&self, path: &Path, layout: PixelLayout) -> Result<NormalizedImage> {
        let raw = self.is_raw(path);
        let image = self.load(path)?;
        let prepared = self.prepare(&image, layout);

        if self.rewrite_source {
            if raw {
                debug!("Not rewriting raw container {}", path.display());
            } else {
                let native;
                let resized = match layout {
                    PixelLayout::Native => &prepared,
                    PixelLayout::Luma => {
                        native = self.resize(&image);
                        &native
                    }
                };
                resized
                    .save_with_format(path, ImageFormat::Png)
                    .map_err(|e| {
                        StegoError::Decode(format!("failed to rewrite {}: {e}", path.display()))
                    })?;
                debug!("Rewrote {} as {}x{} PNG", path.display(), self.target_size.0, self.target_size.1);
            }
        }

        self.finish(&image, &prepared)
    }

    /// Resamples an already decoded image. Never touches the filesystem.
    pub fn normalize_image(
        &self,
        image: &DynamicImage,
        layout: PixelLayout,
    ) -> Result<NormalizedImage> {
        let prepared = self.prepare(image, layout);
        self.finish(image, &prepared)
    }

    fn prepare(&self, image: &DynamicImage, layout: PixelLayout) -> DynamicImage {
        match layout {
            PixelLayout::Native => self.resize(image),
            PixelLayout::Luma => self.resize(&DynamicImage::ImageLuma8(to_luma(image))),
        }
    }

    fn finish(&self, image: &DynamicImage, prepared: &DynamicImage) -> Result<NormalizedImage> {
        let was_single_channel = is_gray8(image);
        let bit_depth = sample_depth(prepared);
        let pixels = image_to_array(prepared)?;
        let channels = pixels.dim().2;

        debug!(
            "Normalized {}x{} image to {}x{}x{}",
            image.width(),
            image.height(),
            pixels.dim().1,
            pixels.dim().0,
            channels
        );

        Ok(NormalizedImage {
            pixels,
            channels,
            bit_depth,
            was_single_channel,
        })
    }

    fn resize(&self, image: &DynamicImage) -> DynamicImage {
        let (width, height) = self.target_size;
        if image.width() == width && image.height() == height {
            image.clone()
        } else {
            image.resize_exact(width, height, self.filter.filter_type())
        }
    }

    fn is_raw(&self, path: &Path) -> bool {
        let Some(decoder) = &self.raw_decoder else {
            return has_extension(path, RAW_EXTENSIONS);
        };
        has_extension(path, decoder.extensions())
    }

    fn load(&self, path: &Path) -> Result<DynamicImage> {
        if self.is_raw(path) {
            let decoder = self.raw_decoder.as_ref().ok_or_else(|| {
                StegoError::Decode(format!("no raw decoder configured for {}", path.display()))
            })?;
            let rgb = decoder.decode(path).map_err(|e| match e {
                StegoError::Decode(msg) => StegoError::Decode(msg),
                other => StegoError::Decode(format!("{}: {other}", path.display())),
            })?;
            return Ok(DynamicImage::ImageRgb8(rgb));
        }

        let reader = ImageReader::open(path)
            .map_err(|e| StegoError::Decode(format!("cannot open {}: {e}", path.display())))?
            .with_guessed_format()
            .map_err(|e| StegoError::Decode(format!("cannot read {}: {e}", path.display())))?;

        Ok(reader.decode()?)
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            filter: ResampleFilter::Bicubic,
            rewrite_source: false,
            raw_decoder: None,
        }
    }
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    use super::*;

    struct FlatRaw;

    impl RawDecoder for FlatRaw {
        fn decode(&self, _path: &Path) -> Result<RgbImage> {
            Ok(RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])))
        }
    }

    struct BrokenRaw;

    impl RawDecoder for BrokenRaw {
        fn decode(&self, path: &Path) -> Result<RgbImage> {
            Err(StegoError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("truncated sensor data in {}", path.display()),
            )))
        }
    }

    #[test]
    fn test_rejects_zero_target() {
        assert!(ImageNormalizer::new((0, 512)).is_err());
    }

    #[test]
    fn test_stretches_without_preserving_aspect() {
        let normalizer = ImageNormalizer::new((16, 16)).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(40, 10));
        let normalized = normalizer.normalize_image(&image, PixelLayout::Native).unwrap();

        assert_eq!(normalized.pixels.dim(), (16, 16, 3));
        assert!(!normalized.was_single_channel);
    }

    #[test]
    fn test_same_size_is_untouched() {
        let normalizer = ImageNormalizer::new((4, 4)).unwrap();
        let mut gray = GrayImage::new(4, 4);
        gray.put_pixel(1, 2, Luma([77]));
        let normalized = normalizer
            .normalize_image(&DynamicImage::ImageLuma8(gray), PixelLayout::Native)
            .unwrap();

        assert_eq!(normalized.channels, 1);
        assert!(normalized.was_single_channel);
        assert_eq!(normalized.pixels[[2, 1, 0]], 77);
    }

    #[test]
    fn test_luma_layout_collapses_color() {
        let normalizer = ImageNormalizer::new((4, 4)).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let normalized = normalizer.normalize_image(&image, PixelLayout::Luma).unwrap();

        assert_eq!(normalized.channels, 1);
        assert!(!normalized.was_single_channel);
        assert!(normalized.luma_f32().iter().all(|&v| v == 255.0));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let normalizer = ImageNormalizer::default();
        let err = normalizer.normalize("/nonexistent/never.png").unwrap_err();
        assert!(matches!(err, StegoError::Decode(_)));
    }

    #[test]
    fn test_raw_without_decoder_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.DNG");
        std::fs::write(&path, b"not really raw").unwrap();

        let err = ImageNormalizer::default().normalize(&path).unwrap_err();
        assert!(matches!(err, StegoError::Decode(_)));
    }

    #[test]
    fn test_raw_goes_through_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.dng");
        std::fs::write(&path, b"sensor").unwrap();

        let normalizer = ImageNormalizer::new((4, 4))
            .unwrap()
            .with_raw_decoder(Arc::new(FlatRaw));
        let normalized = normalizer.normalize_luma(&path).unwrap();
        assert_eq!(normalized.pixels.dim(), (4, 4, 1));

        let failing = ImageNormalizer::default().with_raw_decoder(Arc::new(BrokenRaw));
        assert!(matches!(failing.normalize(&path), Err(StegoError::Decode(_))));
    }

    #[test]
    fn test_rewrite_source_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        GrayImage::new(8, 8).save(&path).unwrap();

        ImageNormalizer::new((16, 16)).unwrap().normalize(&path).unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 8);

        ImageNormalizer::new((16, 16))
            .unwrap()
            .with_rewrite_source(true)
            .normalize(&path)
            .unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 16);
    }

    #[test]
    fn test_rewritten_source_matches_analyzed_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        GrayImage::from_fn(6, 5, |x, y| Luma([(x * 40 + y * 7) as u8]))
            .save(&path)
            .unwrap();

        let normalized = ImageNormalizer::new((9, 9))
            .unwrap()
            .with_rewrite_source(true)
            .normalize(&path)
            .unwrap();
        let rewritten = image::open(&path).unwrap();
        let on_disk = image_to_array(&rewritten).unwrap();

        assert_eq!(on_disk, normalized.pixels);
    }

    #[test]
    fn test_sixteen_bit_gray_is_not_treated_as_grayscale() {
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(4, 4, |x, _| Luma([(((60 + x % 2) as u16) << 8) | 1]));
        let normalizer = ImageNormalizer::new((4, 4)).unwrap();
        let normalized = normalizer
            .normalize_image(&DynamicImage::ImageLuma16(wide), PixelLayout::Native)
            .unwrap();

        assert_eq!(normalized.bit_depth, 16);
        assert!(!normalized.was_single_channel);
        assert!(normalized.pixels.iter().all(|&v| v & 1 == 1));
    }
}
