use std::path::Path;

use image::DynamicImage;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        chi_square::ChiSquareAnalyzer,
        spam::{DEFAULT_CLIP, SpamExtractor},
    },
    detection::{
        DetectionMethod, Detector, Verdict,
        classifier::ClassifierDetector,
        lsb::{ChiSquareDetector, LsbThresholds},
        model::ModelContext,
    },
    error::Result,
    normalize::{DEFAULT_TARGET_SIZE, ImageNormalizer, PixelLayout, ResampleFilter},
};

pub mod error;
pub mod image_utils;
pub mod normalize;
pub mod analysis;
pub mod detection;
pub mod batch;
pub mod report;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub method: DetectionMethod,
    pub target_size: (u32, u32),
    pub chi_square_filter: ResampleFilter,
    pub spam_filter: ResampleFilter,
    pub thresholds: LsbThresholds,
    pub spam_clip: u32,
    pub rewrite_source: bool,
    pub parallel: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::ChiSquare,
            target_size: DEFAULT_TARGET_SIZE,
            chi_square_filter: ResampleFilter::Bicubic,
            spam_filter: ResampleFilter::Lanczos3,
            thresholds: LsbThresholds::default(),
            spam_clip: DEFAULT_CLIP,
            rewrite_source: false,
            parallel: true,
        }
    }
}

impl DetectionConfig {
    pub(crate) fn normalizer(&self, filter: ResampleFilter) -> Result<ImageNormalizer> {
        Ok(ImageNormalizer::new(self.target_size)?
            .with_filter(filter)
            .with_rewrite_source(self.rewrite_source))
    }
}

/// In-memory entry point for analysing a single decoded image.
pub struct StegoAnalyzer {
    original: DynamicImage,
    config: DetectionConfig,
    path: Option<String>,
}

impl StegoAnalyzer {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let original = image::open(&path)?;

        Ok(Self {
            original,
            config: DetectionConfig::default(),
            path: Some(path_str),
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            original: image,
            config: DetectionConfig::default(),
            path: None,
        }
    }

    pub fn with_config(mut self, config: DetectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn chi_square(&self) -> Result<ChiSquareResult> {
        let normalized = self
            .config
            .normalizer(self.config.chi_square_filter)?
            .normalize_image(&self.original, PixelLayout::Native)?;

        ChiSquareAnalyzer::new()?.analyze(&normalized.pixels)
    }

    pub fn detect_lsb(&self) -> Result<Verdict> {
        let detector = ChiSquareDetector::new(&self.config)?;
        detector.detect_image(&self.original)
    }

    pub fn spam_features(&self) -> Result<SpamFeatures> {
        let normalized = self
            .config
            .normalizer(self.config.spam_filter)?
            .normalize_image(&self.original, PixelLayout::Luma)?;

        SpamExtractor::new(self.config.spam_clip)?
            .with_parallel(self.config.parallel)
            .extract(&normalized.luma_f32())
    }

    pub fn classify(&self, models: &ModelContext) -> Result<Verdict> {
        let detector = ClassifierDetector::new(&self.config, models.clone())?;
        detector.detect_image(&self.original)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatistic {
    pub zeros: u64,
    pub ones: u64,
    pub statistic: f64,
    /// Upper tail of chi-square with one degree of freedom.
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChiSquareResult {
    pub channels: Vec<ChannelStatistic>,
}

impl ChiSquareResult {
    pub fn statistics(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.statistic).collect()
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.p_value).collect()
    }

    pub fn max_statistic(&self) -> f64 {
        self.channels
            .iter()
            .map(|c| c.statistic)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

#[derive(Debug, Clone)]
pub struct SpamFeatures {
    pub clip: u32,
    /// Horizontal, vertical, diagonal, anti-diagonal histograms.
    pub directional: Vec<Array1<f64>>,
    pub vector: Array1<f64>,
}
