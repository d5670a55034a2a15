use image::{ColorType, DynamicImage, GrayImage, Luma, RgbImage};
use ndarray::{Array2, Array3};

use crate::error::{Result, StegoError};

/// ITU-R 601-2 luma with fixed-point rounding, matching the conversion the
/// detection models were trained against.
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        gray.put_pixel(x, y, Luma([luma_601(pixel[0], pixel[1], pixel[2])]));
    }

    gray
}

#[inline]
pub fn luma_601(r: u8, g: u8, b: u8) -> u8 {
    luma_601_wide(r as u16, g as u16, b as u16) as u8
}

/// Same weights as [`luma_601`] for samples of either depth.
#[inline]
pub fn luma_601_wide(r: u16, g: u16, b: u16) -> u16 {
    ((r as u64 * 19595 + g as u64 * 38470 + b as u64 * 7471 + 0x8000) >> 16) as u16
}

/// Collapses any layout to a single 8-bit luma plane. Alpha is discarded.
pub fn to_luma(image: &DynamicImage) -> GrayImage {
    if image.color().has_color() {
        rgb_to_gray(&image.to_rgb8())
    } else {
        image.to_luma8()
    }
}

/// Number of samples per pixel.
pub fn channel_count(image: &DynamicImage) -> usize {
    let color = image.color();
    match (color.has_color(), color.has_alpha()) {
        (false, false) => 1,
        (false, true) => 2,
        (true, false) => 3,
        (true, true) => 4,
    }
}

/// Bits per sample kept when the image is turned into an array. 16-bit
/// integer sources stay 16-bit; everything else, floats included, is
/// reduced to 8.
pub fn sample_depth(image: &DynamicImage) -> u8 {
    match image.color() {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => 16,
        _ => 8,
    }
}

/// True only for 8-bit single channel sources.
pub fn is_gray8(image: &DynamicImage) -> bool {
    image.color() == ColorType::L8
}

/// Converts an image into a height x width x channel array at its
/// [`sample_depth`], so the least significant bit of every sample survives.
/// Grayscale keeps an explicit channel axis of length one.
pub fn image_to_array(image: &DynamicImage) -> Result<Array3<u16>> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let channels = channel_count(image);

    let raw: Vec<u16> = if sample_depth(image) == 16 {
        match channels {
            1 => image.to_luma16().into_raw(),
            2 => image.to_luma_alpha16().into_raw(),
            3 => image.to_rgb16().into_raw(),
            _ => image.to_rgba16().into_raw(),
        }
    } else {
        let narrow = match channels {
            1 => image.to_luma8().into_raw(),
            2 => image.to_luma_alpha8().into_raw(),
            3 => image.to_rgb8().into_raw(),
            _ => image.to_rgba8().into_raw(),
        };
        narrow.into_iter().map(u16::from).collect()
    };

    Array3::from_shape_vec((height, width, channels), raw)
        .map_err(|e| StegoError::Decode(format!("pixel buffer does not match image shape: {e}")))
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f32;
    }

    arr
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, LumaA, Rgb, RgbaImage};

    use super::*;

    #[test]
    fn test_rgb_to_gray_rounds_like_601() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 255, 255]));
        rgb.put_pixel(1, 0, Rgb([255, 0, 0]));

        let gray = rgb_to_gray(&rgb);
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        // 255 * 0.299 = 76.245
        assert_eq!(gray.get_pixel(1, 0)[0], 76);
    }

    #[test]
    fn test_image_to_array_keeps_channel_axis_for_gray() {
        let gray = GrayImage::from_pixel(4, 3, Luma([7]));
        let arr = image_to_array(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(arr.dim(), (3, 4, 1));
        assert!(arr.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_sixteen_bit_samples_keep_low_bit() {
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_pixel(3, 2, Luma([(61 << 8) | 1]));
        let image = DynamicImage::ImageLuma16(wide);

        assert_eq!(sample_depth(&image), 16);
        assert!(!is_gray8(&image));
        let arr = image_to_array(&image).unwrap();
        assert_eq!(arr.dim(), (2, 3, 1));
        assert!(arr.iter().all(|&v| v == 15617));
    }

    #[test]
    fn test_wide_luma_matches_narrow() {
        assert_eq!(luma_601(255, 0, 0), 76);
        assert_eq!(luma_601_wide(65535, 65535, 65535), 65535);
        assert_eq!(luma_601_wide(200, 100, 50) as u8, luma_601(200, 100, 50));
    }

    #[test]
    fn test_channel_counts() {
        let la = image::GrayAlphaImage::from_pixel(2, 2, LumaA([1, 2]));
        assert_eq!(channel_count(&DynamicImage::ImageLumaA8(la)), 2);
        assert_eq!(channel_count(&DynamicImage::ImageRgb8(RgbImage::new(2, 2))), 3);
        assert_eq!(channel_count(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2))), 4);
    }

    #[test]
    fn test_image_to_array_layout_is_row_major() {
        let mut rgb = RgbImage::new(2, 2);
        rgb.put_pixel(1, 0, Rgb([10, 20, 30]));
        let arr = image_to_array(&DynamicImage::ImageRgb8(rgb)).unwrap();
        assert_eq!(arr[[0, 1, 0]], 10);
        assert_eq!(arr[[0, 1, 2]], 30);
        assert_eq!(arr[[1, 1, 0]], 0);
    }
}
