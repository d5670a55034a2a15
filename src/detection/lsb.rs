use std::{path::Path, sync::Arc};

use image::DynamicImage;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    DetectionConfig,
    analysis::chi_square::ChiSquareAnalyzer,
    detection::{DetectionMethod, Detector, Evidence, Verdict},
    error::Result,
    normalize::{ImageNormalizer, NormalizedImage, PixelLayout, RawDecoder},
};

pub const DEFAULT_GRAYSCALE_THRESHOLD: f64 = 10.0;
pub const DEFAULT_COLOR_THRESHOLD: f64 = 500.0;

/// Empirical cut-offs on the per-channel statistic. Single-channel images
/// get a much lower bar than color ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LsbThresholds {
    pub grayscale: f64,
    pub color: f64,
}

impl Default for LsbThresholds {
    fn default() -> Self {
        Self {
            grayscale: DEFAULT_GRAYSCALE_THRESHOLD,
            color: DEFAULT_COLOR_THRESHOLD,
        }
    }
}

impl LsbThresholds {
    pub fn threshold_for(&self, is_grayscale: bool) -> f64 {
        if is_grayscale { self.grayscale } else { self.color }
    }

    /// Stego if any channel exceeds the threshold.
    pub fn classify(&self, statistics: &[f64], is_grayscale: bool) -> bool {
        let threshold = self.threshold_for(is_grayscale);
        statistics.iter().any(|&stat| stat > threshold)
    }
}

pub struct ChiSquareDetector {
    normalizer: ImageNormalizer,
    analyzer: ChiSquareAnalyzer,
    thresholds: LsbThresholds,
}

impl ChiSquareDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        Ok(Self {
            normalizer: config.normalizer(config.chi_square_filter)?,
            analyzer: ChiSquareAnalyzer::new()?,
            thresholds: config.thresholds,
        })
    }

    pub fn with_raw_decoder(mut self, decoder: Arc<dyn RawDecoder>) -> Self {
        self.normalizer = self.normalizer.with_raw_decoder(decoder);
        self
    }

    pub fn evaluate(&self, image: &NormalizedImage) -> Result<Verdict> {
        let result = self.analyzer.analyze(&image.pixels)?;
        let statistics = result.statistics();
        let threshold = self.thresholds.threshold_for(image.was_single_channel);
        let is_stego = self.thresholds.classify(&statistics, image.was_single_channel);

        debug!(
            "LSB verdict {} (max {:.3}, threshold {threshold})",
            is_stego,
            result.max_statistic()
        );

        Ok(Verdict {
            is_stego,
            evidence: Evidence::ChiSquare {
                statistics,
                p_values: result.p_values(),
                threshold,
            },
        })
    }
}

impl Detector for ChiSquareDetector {
    fn detect(&self, path: &Path) -> Result<Verdict> {
        let normalized = self.normalizer.normalize(path)?;
        self.evaluate(&normalized)
    }

    fn detect_image(&self, image: &DynamicImage) -> Result<Verdict> {
        let normalized = self.normalizer.normalize_image(image, PixelLayout::Native)?;
        self.evaluate(&normalized)
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::ChiSquare
    }

    fn name(&self) -> &str {
        "Chi-square LSB test"
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;

    fn small_config() -> DetectionConfig {
        DetectionConfig {
            target_size: (8, 8),
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn test_threshold_asymmetry() {
        let thresholds = LsbThresholds::default();

        assert!(thresholds.classify(&[50.0], true));
        assert!(!thresholds.classify(&[50.0, 50.0, 50.0], false));
    }

    #[test]
    fn test_any_channel_triggers() {
        let thresholds = LsbThresholds::default();

        assert!(thresholds.classify(&[0.0, 501.0, 0.0], false));
        assert!(!thresholds.classify(&[500.0, 500.0, 500.0], false));
    }

    #[test]
    fn test_black_grayscale_is_skewed() {
        // an all-zero plane is maximally skewed towards 0
        let detector = ChiSquareDetector::new(&small_config()).unwrap();
        let verdict = detector
            .detect_image(&DynamicImage::ImageLuma8(GrayImage::new(8, 8)))
            .unwrap();

        assert!(verdict.is_stego);
        assert_eq!(verdict.max_statistic(), Some(64.0));
    }

    #[test]
    fn test_checkerboard_grayscale_is_clean() {
        let gray = GrayImage::from_fn(8, 8, |x, y| Luma([((x + y) % 2) as u8 + 60]));
        let detector = ChiSquareDetector::new(&small_config()).unwrap();
        let verdict = detector.detect_image(&DynamicImage::ImageLuma8(gray)).unwrap();

        assert!(!verdict.is_stego);
        assert_eq!(verdict.answer(), "No");
        match verdict.evidence {
            Evidence::ChiSquare { threshold, .. } => assert_eq!(threshold, 10.0),
            _ => panic!("expected chi-square evidence"),
        }
    }

    #[test]
    fn test_color_uses_color_threshold() {
        // 64 pixels can never push a channel past 500
        let rgb = RgbImage::from_pixel(8, 8, Rgb([1, 1, 1]));
        let detector = ChiSquareDetector::new(&small_config()).unwrap();
        let verdict = detector.detect_image(&DynamicImage::ImageRgb8(rgb)).unwrap();

        assert!(!verdict.is_stego);
        assert_eq!(verdict.max_statistic(), Some(64.0));
    }
}
