//! Second-order SPAM features: co-occurrences of three consecutive pixel
//! differences, clipped to `[-T, T]`, averaged over four directions.

use log::debug;
use ndarray::{Array1, Array2, Zip, s};
use rayon::prelude::*;

use crate::{
    SpamFeatures,
    error::{Result, StegoError},
};

pub const DEFAULT_CLIP: u32 = 3;
const MAX_CLIP: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
    Diagonal,
    AntiDiagonal,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::Diagonal,
        Direction::AntiDiagonal,
    ];
}

/// Signed difference between each pixel and its neighbour along `direction`.
/// The result loses one row and/or column relative to `pixels`.
pub fn difference_array(pixels: &Array2<f32>, direction: Direction) -> Array2<f32> {
    let (rows, cols) = pixels.dim();
    let r = rows.saturating_sub(1);
    let c = cols.saturating_sub(1);
    let r1 = rows.min(1);
    let c1 = cols.min(1);

    match direction {
        Direction::Horizontal => &pixels.slice(s![.., ..c]) - &pixels.slice(s![.., c1..]),
        Direction::Vertical => &pixels.slice(s![..r, ..]) - &pixels.slice(s![r1.., ..]),
        Direction::Diagonal => &pixels.slice(s![..r, ..c]) - &pixels.slice(s![r1.., c1..]),
        Direction::AntiDiagonal => &pixels.slice(s![r1.., ..c]) - &pixels.slice(s![..r, c1..]),
    }
}

pub struct SpamExtractor {
    clip: u32,
    parallel: bool,
}

impl SpamExtractor {
    pub fn new(clip: u32) -> Result<Self> {
        if clip == 0 || clip > MAX_CLIP {
            return Err(StegoError::InvalidParameter(format!(
                "clipping bound must be between 1 and {MAX_CLIP}, got {clip}"
            )));
        }

        Ok(Self {
            clip,
            parallel: true,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn clip(&self) -> u32 {
        self.clip
    }

    /// Length of every histogram and of the final feature vector.
    pub fn feature_len(&self) -> usize {
        let bins = self.bins();
        bins * bins * bins
    }

    fn bins(&self) -> usize {
        2 * self.clip as usize + 1
    }

    pub fn extract(&self, pixels: &Array2<f32>) -> Result<SpamFeatures> {
        let histogram = |direction: &Direction| {
            let differences = difference_array(pixels, *direction);
            self.cooccurrence(&differences)
        };

        let directional = if self.parallel {
            Direction::ALL
                .par_iter()
                .map(histogram)
                .collect::<Result<Vec<_>>>()?
        } else {
            Direction::ALL
                .iter()
                .map(histogram)
                .collect::<Result<Vec<_>>>()?
        };

        let mut vector = Array1::<f64>::zeros(self.feature_len());
        for h in &directional {
            vector += h;
        }
        vector /= directional.len() as f64;

        debug!(
            "Extracted {} SPAM features from {}x{} plane",
            vector.len(),
            pixels.nrows(),
            pixels.ncols()
        );

        Ok(SpamFeatures {
            clip: self.clip,
            directional,
            vector,
        })
    }

    /// Normalized triple co-occurrence histogram of one difference array.
    /// Triples run down the rows: `(D[r, c], D[r + 1, c], D[r + 2, c])`.
    pub fn cooccurrence(&self, differences: &Array2<f32>) -> Result<Array1<f64>> {
        let (rows, cols) = differences.dim();
        if rows < 3 || cols == 0 {
            return Err(StegoError::InsufficientSize { rows, cols });
        }

        let bins = self.bins();
        let mut counts = vec![0u64; self.feature_len()];

        Zip::from(differences.slice(s![..rows - 2, ..]))
            .and(differences.slice(s![1..rows - 1, ..]))
            .and(differences.slice(s![2.., ..]))
            .for_each(|&l, &c, &r| {
                if let (Some(l), Some(c), Some(r)) =
                    (self.quantize(l), self.quantize(c), self.quantize(r))
                {
                    counts[(l * bins + c) * bins + r] += 1;
                }
            });

        let total = counts.iter().sum::<u64>();
        if total == 0 {
            return Err(StegoError::DegenerateHistogram(
                "no difference triple landed on an integer bin".into(),
            ));
        }

        Ok(counts.iter().map(|&n| n as f64 / total as f64).collect())
    }

    /// Bin of a clipped difference. Non-integral values belong to no bin.
    fn quantize(&self, value: f32) -> Option<usize> {
        let t = self.clip as f32;
        let clipped = value.clamp(-t, t);
        if clipped.fract() != 0.0 || clipped.is_nan() {
            return None;
        }
        Some((clipped + t) as usize)
    }
}

impl Default for SpamExtractor {
    fn default() -> Self {
        Self {
            clip: DEFAULT_CLIP,
            parallel: true,
        }
    }
}

/// Final feature vector for a grayscale plane with clipping bound `clip`.
pub fn extract_features(pixels: &Array2<f32>, clip: u32) -> Result<Array1<f64>> {
    Ok(SpamExtractor::new(clip)?.extract(pixels)?.vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |(y, x)| ((x * 7 + y * 13) % 256) as f32)
    }

    #[test]
    fn test_difference_shapes() {
        let pixels = ramp(5, 6);
        assert_eq!(difference_array(&pixels, Direction::Horizontal).dim(), (5, 5));
        assert_eq!(difference_array(&pixels, Direction::Vertical).dim(), (4, 6));
        assert_eq!(difference_array(&pixels, Direction::Diagonal).dim(), (4, 5));
        assert_eq!(difference_array(&pixels, Direction::AntiDiagonal).dim(), (4, 5));
    }

    #[test]
    fn test_difference_signs() {
        let pixels = Array2::from_shape_vec((2, 2), vec![1.0, 4.0, 9.0, 16.0]).unwrap();

        assert_eq!(difference_array(&pixels, Direction::Horizontal)[[0, 0]], -3.0);
        assert_eq!(difference_array(&pixels, Direction::Vertical)[[0, 1]], -12.0);
        assert_eq!(difference_array(&pixels, Direction::Diagonal)[[0, 0]], -15.0);
        // lower-left minus upper-right
        assert_eq!(difference_array(&pixels, Direction::AntiDiagonal)[[0, 0]], 5.0);
    }

    #[test]
    fn test_flat_image_concentrates_on_center_bin() {
        let pixels = Array2::from_elem((10, 10), 42.0f32);
        let features = SpamExtractor::default().extract(&pixels).unwrap();

        assert_eq!(features.vector.len(), 343);
        // (3 * 7 + 3) * 7 + 3
        assert_eq!(features.vector[171], 1.0);
        assert_eq!(features.vector.sum(), 1.0);
    }

    #[test]
    fn test_histograms_are_distributions() {
        let features = SpamExtractor::default().extract(&ramp(32, 24)).unwrap();

        assert_eq!(features.directional.len(), 4);
        for h in &features.directional {
            assert!((h.sum() - 1.0).abs() < 1e-9);
            assert!(h.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
        assert!((features.vector.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_steps_are_clipped() {
        // every horizontal difference is -100, clipped to -3
        let pixels = Array2::from_shape_fn((4, 3), |(_, x)| (x * 100) as f32);
        let extractor = SpamExtractor::default();
        let h = extractor
            .cooccurrence(&difference_array(&pixels, Direction::Horizontal))
            .unwrap();

        assert_eq!(h[0], 1.0);
    }

    #[test]
    fn test_two_by_two_is_too_small() {
        let pixels = Array2::from_elem((2, 2), 0.0f32);
        let err = extract_features(&pixels, 3).unwrap_err();

        assert!(matches!(err, StegoError::InsufficientSize { .. }));
    }

    #[test]
    fn test_fractional_differences_are_degenerate() {
        let differences = Array2::from_elem((4, 4), 0.5f32);
        let err = SpamExtractor::default().cooccurrence(&differences).unwrap_err();

        assert!(matches!(err, StegoError::DegenerateHistogram(_)));
    }

    #[test]
    fn test_parallel_and_serial_agree_bitwise() {
        let pixels = ramp(40, 40);
        let parallel = SpamExtractor::default().extract(&pixels).unwrap();
        let serial = SpamExtractor::default()
            .with_parallel(false)
            .extract(&pixels)
            .unwrap();

        assert_eq!(parallel.vector, serial.vector);
    }

    #[test]
    fn test_clip_bounds_validated() {
        assert!(SpamExtractor::new(0).is_err());
        assert_eq!(SpamExtractor::new(2).unwrap().feature_len(), 125);
    }
}
