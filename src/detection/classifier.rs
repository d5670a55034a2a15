use std::{path::Path, sync::Arc};

use image::DynamicImage;
use log::debug;

use crate::{
    DetectionConfig,
    analysis::spam::SpamExtractor,
    detection::{DetectionMethod, Detector, Evidence, Verdict, model::ModelContext},
    error::Result,
    normalize::{ImageNormalizer, NormalizedImage, PixelLayout, RAW_EXTENSIONS, RawDecoder},
};

/// SPAM features of the luma plane fed through the pre-fitted scaler and
/// support vector classifier. Label `1` means stego.
pub struct ClassifierDetector {
    normalizer: ImageNormalizer,
    extractor: SpamExtractor,
    models: ModelContext,
}

impl ClassifierDetector {
    pub fn new(config: &DetectionConfig, models: ModelContext) -> Result<Self> {
        Ok(Self {
            normalizer: config.normalizer(config.spam_filter)?,
            extractor: SpamExtractor::new(config.spam_clip)?.with_parallel(config.parallel),
            models,
        })
    }

    pub fn with_raw_decoder(mut self, decoder: Arc<dyn RawDecoder>) -> Self {
        self.normalizer = self.normalizer.with_raw_decoder(decoder);
        self
    }

    pub fn evaluate(&self, image: &NormalizedImage) -> Result<Verdict> {
        let features = self.extractor.extract(&image.luma_f32())?;
        let label = self.models.classify(&features.vector)?;

        debug!("Classifier label {label}");

        Ok(Verdict {
            is_stego: label == 1,
            evidence: Evidence::Classifier { label },
        })
    }
}

impl Detector for ClassifierDetector {
    fn detect(&self, path: &Path) -> Result<Verdict> {
        let normalized = self.normalizer.normalize_luma(path)?;
        self.evaluate(&normalized)
    }

    fn detect_image(&self, image: &DynamicImage) -> Result<Verdict> {
        let normalized = self.normalizer.normalize_image(image, PixelLayout::Luma)?;
        self.evaluate(&normalized)
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Classifier
    }

    fn name(&self) -> &str {
        "SPAM support vector classifier"
    }

    fn extensions(&self) -> Vec<&'static str> {
        let all = self.method().supported_extensions().iter().copied();
        if self.normalizer.has_raw_decoder() {
            all.collect()
        } else {
            all.filter(|ext| !RAW_EXTENSIONS.contains(ext)).collect()
        }
    }
}
