//! Pre-trained artifacts consumed by the classifier path.
//!
//! Both artifacts are JSON documents carrying a `format_version`. They are
//! produced by the training pipeline and only ever read here.

use std::{fs, path::Path, sync::Arc};

use log::info;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StegoError};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub trait FeatureScaler: Send + Sync {
    fn transform(&self, features: &Array1<f64>) -> Result<Array1<f64>>;
}

pub trait BinaryClassifier: Send + Sync {
    fn predict(&self, scaled: &Array1<f64>) -> Result<i32>;
}

fn read_artifact<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| {
        StegoError::ModelUnavailable(format!("cannot read {what} {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        StegoError::ModelUnavailable(format!("malformed {what} {}: {e}", path.display()))
    })
}

fn check_version(version: u32, what: &str) -> Result<()> {
    if version != ARTIFACT_FORMAT_VERSION {
        return Err(StegoError::ModelUnavailable(format!(
            "{what} format version {version} is not supported (expected {ARTIFACT_FORMAT_VERSION})"
        )));
    }
    Ok(())
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Elementwise standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub format_version: u32,
    pub mean: Option<Vec<f64>>,
    pub scale: Option<Vec<f64>>,
}

impl StandardScaler {
    pub fn new(mean: Option<Vec<f64>>, scale: Option<Vec<f64>>) -> Result<Self> {
        let scaler = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            mean,
            scale,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let scaler: Self = read_artifact(path.as_ref(), "scaler")?;
        scaler.validate()?;
        info!("Loaded scaler from {}", path.as_ref().display());
        Ok(scaler)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn n_features(&self) -> Option<usize> {
        self.mean.as_ref().or(self.scale.as_ref()).map(Vec::len)
    }

    fn validate(&self) -> Result<()> {
        check_version(self.format_version, "scaler")?;

        if let (Some(mean), Some(scale)) = (&self.mean, &self.scale) {
            if mean.len() != scale.len() {
                return Err(StegoError::ModelUnavailable(format!(
                    "scaler mean has {} entries but scale has {}",
                    mean.len(),
                    scale.len()
                )));
            }
        }
        if !self.mean.as_deref().map(all_finite).unwrap_or(true) {
            return Err(StegoError::ModelUnavailable("scaler mean is not finite".into()));
        }
        if let Some(scale) = &self.scale {
            if !all_finite(scale) || scale.iter().any(|&s| s == 0.0) {
                return Err(StegoError::ModelUnavailable(
                    "scaler scale must be finite and non-zero".into(),
                ));
            }
        }

        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &Array1<f64>) -> Result<Array1<f64>> {
        if let Some(expected) = self.n_features() {
            if features.len() != expected {
                return Err(StegoError::Prediction(format!(
                    "scaler expects {expected} features, got {}",
                    features.len()
                )));
            }
        }

        let mut scaled = features.clone();
        if let Some(mean) = &self.mean {
            scaled -= &ArrayView1::from(mean.as_slice());
        }
        if let Some(scale) = &self.scale {
            scaled /= &ArrayView1::from(scale.as_slice());
        }

        Ok(scaled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Rbf { gamma: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Kernel {
    fn apply(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            Kernel::Linear => a.dot(&b),
            Kernel::Poly { gamma, coef0, degree } => (gamma * a.dot(&b) + coef0).powi(degree),
            Kernel::Rbf { gamma } => {
                let distance = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>();
                (-gamma * distance).exp()
            }
            Kernel::Sigmoid { gamma, coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
        }
    }

    fn gamma(&self) -> Option<f64> {
        match *self {
            Kernel::Linear => None,
            Kernel::Poly { gamma, .. } | Kernel::Rbf { gamma } | Kernel::Sigmoid { gamma, .. } => {
                Some(gamma)
            }
        }
    }
}

/// Two-class support vector machine in dual form. `dual_coef` carries the
/// signed coefficients so that a positive decision value selects
/// `classes[1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorClassifier {
    pub format_version: u32,
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
    pub classes: [i32; 2],
}

impl SupportVectorClassifier {
    pub fn new(
        kernel: Kernel,
        support_vectors: Vec<Vec<f64>>,
        dual_coef: Vec<f64>,
        intercept: f64,
    ) -> Result<Self> {
        let classifier = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            kernel,
            support_vectors,
            dual_coef,
            intercept,
            classes: [0, 1],
        };
        classifier.validate()?;
        Ok(classifier)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let classifier: Self = read_artifact(path.as_ref(), "classifier")?;
        classifier.validate()?;
        info!(
            "Loaded classifier from {} ({} support vectors)",
            path.as_ref().display(),
            classifier.support_vectors.len()
        );
        Ok(classifier)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.support_vectors.first().map(Vec::len).unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        check_version(self.format_version, "classifier")?;

        let unavailable = |msg: String| Err(StegoError::ModelUnavailable(msg));

        if self.support_vectors.is_empty() {
            return unavailable("classifier has no support vectors".into());
        }
        let n_features = self.n_features();
        if n_features == 0 || self.support_vectors.iter().any(|sv| sv.len() != n_features) {
            return unavailable("support vectors have inconsistent lengths".into());
        }
        if self.dual_coef.len() != self.support_vectors.len() {
            return unavailable(format!(
                "{} dual coefficients for {} support vectors",
                self.dual_coef.len(),
                self.support_vectors.len()
            ));
        }
        if !all_finite(&self.dual_coef)
            || !self.intercept.is_finite()
            || !self.support_vectors.iter().all(|sv| all_finite(sv))
        {
            return unavailable("classifier parameters are not finite".into());
        }
        if let Some(gamma) = self.kernel.gamma() {
            if !(gamma.is_finite() && gamma > 0.0) {
                return unavailable(format!("kernel gamma must be positive, got {gamma}"));
            }
        }

        Ok(())
    }

    pub fn decision_function(&self, scaled: &Array1<f64>) -> Result<f64> {
        if scaled.len() != self.n_features() {
            return Err(StegoError::Prediction(format!(
                "classifier expects {} features, got {}",
                self.n_features(),
                scaled.len()
            )));
        }

        let decision = self
            .support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * self.kernel.apply(ArrayView1::from(sv.as_slice()), scaled.view()))
            .sum::<f64>()
            + self.intercept;

        if decision.is_finite() {
            Ok(decision)
        } else {
            Err(StegoError::Prediction("decision value is not finite".into()))
        }
    }
}

impl BinaryClassifier for SupportVectorClassifier {
    fn predict(&self, scaled: &Array1<f64>) -> Result<i32> {
        let decision = self.decision_function(scaled)?;
        Ok(if decision > 0.0 { self.classes[1] } else { self.classes[0] })
    }
}

/// Scaler and classifier loaded once and shared read-only.
#[derive(Clone)]
pub struct ModelContext {
    scaler: Arc<dyn FeatureScaler>,
    classifier: Arc<dyn BinaryClassifier>,
}

impl ModelContext {
    pub fn new(scaler: Arc<dyn FeatureScaler>, classifier: Arc<dyn BinaryClassifier>) -> Self {
        Self { scaler, classifier }
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(model_path: P, scaler_path: Q) -> Result<Self> {
        let classifier = SupportVectorClassifier::load(model_path)?;
        let scaler = StandardScaler::load(scaler_path)?;

        if let Some(n) = scaler.n_features() {
            if n != classifier.n_features() {
                return Err(StegoError::ModelUnavailable(format!(
                    "scaler has {n} features but classifier expects {}",
                    classifier.n_features()
                )));
            }
        }

        Ok(Self::new(Arc::new(scaler), Arc::new(classifier)))
    }

    /// Scale then predict. Any failure along the way is a prediction error.
    pub fn classify(&self, features: &Array1<f64>) -> Result<i32> {
        let run = || -> Result<i32> {
            let scaled = self.scaler.transform(features)?;
            self.classifier.predict(&scaled)
        };

        run().map_err(|e| match e {
            StegoError::Prediction(msg) => StegoError::Prediction(msg),
            other => StegoError::Prediction(other.to_string()),
        })
    }
}
