use std::{fs, path::Path};

use serde::Serialize;

use crate::{
    DetectionConfig,
    batch::{BatchSummary, FileOutcome},
    detection::{DetectionMethod, Evidence},
    error::Result,
};

/// One stdout line per analysed file.
pub fn format_outcome(outcome: &FileOutcome) -> Option<String> {
    let verdict = outcome.result.as_ref().ok()?;
    let path = outcome.path.display();

    Some(match &verdict.evidence {
        Evidence::ChiSquare { .. } => format!(
            "File: {path}, Detected LSB Steganography: {}, Chi-square Statistic: {:?}",
            verdict.answer(),
            verdict.max_statistic().unwrap_or(0.0)
        ),
        Evidence::Classifier { .. } => {
            format!("File: {path}, Steganography Detected: {}", verdict.answer())
        }
    })
}

/// Diagnostic line for a file that could not be analysed.
pub fn format_failure(outcome: &FileOutcome) -> Option<String> {
    let err = outcome.result.as_ref().err()?;
    Some(format!("Error processing {}: {err}", outcome.path.display()))
}

pub fn format_summary(summary: &BatchSummary) -> String {
    format!(
        "Steganography images found: {}\nTotal images: {}\nAccuracy percentage: {:.2}%",
        summary.stego_count,
        summary.total,
        summary.detection_percentage()
    )
}

#[derive(Serialize)]
pub struct JsonReport {
    pub method: DetectionMethod,
    pub config: DetectionConfig,
    pub stego_count: usize,
    pub total_images: usize,
    pub detection_percentage: f64,
    pub suspected_files: Vec<String>,
    pub files: Vec<FileReportSection>,
}

#[derive(Serialize)]
pub struct FileReportSection {
    pub path: String,
    pub detected: Option<bool>,
    pub max_statistic: Option<f64>,
    pub label: Option<i32>,
    pub error: Option<String>,
}

impl From<&FileOutcome> for FileReportSection {
    fn from(outcome: &FileOutcome) -> Self {
        let path = outcome.path.display().to_string();
        match &outcome.result {
            Ok(verdict) => Self {
                path,
                detected: Some(verdict.is_stego),
                max_statistic: verdict.max_statistic(),
                label: verdict.label(),
                error: None,
            },
            Err(e) => Self {
                path,
                detected: None,
                max_statistic: None,
                label: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl JsonReport {
    pub fn new(summary: &BatchSummary, config: &DetectionConfig) -> Self {
        Self {
            method: config.method,
            config: config.clone(),
            stego_count: summary.stego_count,
            total_images: summary.total,
            detection_percentage: summary.detection_percentage(),
            suspected_files: summary
                .suspected()
                .map(|p| p.display().to_string())
                .collect(),
            files: summary.outcomes.iter().map(FileReportSection::from).collect(),
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
