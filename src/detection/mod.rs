pub mod classifier;
pub mod lsb;
pub mod model;

use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    #[default]
    ChiSquare,
    Classifier,
}

impl DetectionMethod {
    /// Lowercase extensions picked up when scanning a directory.
    pub fn supported_extensions(&self) -> &'static [&'static str] {
        match self {
            DetectionMethod::ChiSquare => &["png", "jpg", "jpeg"],
            DetectionMethod::Classifier => &["png", "jpg", "jpeg", "bmp", "gif", "pgm", "dng"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectionMethod::ChiSquare => "chi-square",
            DetectionMethod::Classifier => "classifier",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    ChiSquare {
        statistics: Vec<f64>,
        p_values: Vec<f64>,
        threshold: f64,
    },
    Classifier {
        label: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_stego: bool,
    pub evidence: Evidence,
}

impl Verdict {
    pub fn answer(&self) -> &'static str {
        if self.is_stego { "Yes" } else { "No" }
    }

    pub fn max_statistic(&self) -> Option<f64> {
        match &self.evidence {
            Evidence::ChiSquare { statistics, .. } => {
                statistics.iter().cloned().reduce(f64::max)
            }
            Evidence::Classifier { .. } => None,
        }
    }

    pub fn label(&self) -> Option<i32> {
        match self.evidence {
            Evidence::Classifier { label } => Some(label),
            Evidence::ChiSquare { .. } => None,
        }
    }
}

pub trait Detector: Send + Sync {
    fn detect(&self, path: &Path) -> Result<Verdict>;

    fn detect_image(&self, image: &DynamicImage) -> Result<Verdict>;

    fn method(&self) -> DetectionMethod;

    fn name(&self) -> &str;

    /// Extensions this detector can decode, used when scanning a directory.
    fn extensions(&self) -> Vec<&'static str> {
        self.method().supported_extensions().to_vec()
    }
}
