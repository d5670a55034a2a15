use log::debug;
use ndarray::{Array3, Axis};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::{
    ChannelStatistic, ChiSquareResult,
    error::{Result, StegoError},
};

/// Two-bin chi-square test on the least significant bit plane of every
/// channel. A clean natural image splits its LSBs close to evenly; a
/// strongly skewed plane scores high. Works on 8-bit and 16-bit samples
/// alike.
pub struct ChiSquareAnalyzer {
    distribution: ChiSquared,
}

impl ChiSquareAnalyzer {
    pub fn new() -> Result<Self> {
        // two bins, one constraint
        let distribution = ChiSquared::new(1.0)
            .map_err(|e| StegoError::InvalidParameter(format!("chi-square distribution: {e}")))?;

        Ok(Self { distribution })
    }

    pub fn analyze<T>(&self, pixels: &Array3<T>) -> Result<ChiSquareResult>
    where
        T: Copy + Into<u64>,
    {
        let channels = (0..pixels.dim().2)
            .map(|channel| self.channel_statistic(pixels, channel))
            .collect::<Result<Vec<_>>>()?;

        if channels.is_empty() {
            return Err(StegoError::DegenerateHistogram(
                "pixel array has no channels".into(),
            ));
        }

        debug!(
            "Chi-square statistics: {:?}",
            channels.iter().map(|c| c.statistic).collect::<Vec<_>>()
        );

        Ok(ChiSquareResult { channels })
    }

    fn channel_statistic<T>(&self, pixels: &Array3<T>, channel: usize) -> Result<ChannelStatistic>
    where
        T: Copy + Into<u64>,
    {
        let plane = pixels.index_axis(Axis(2), channel);
        let ones = plane.iter().map(|&v| Into::<u64>::into(v) & 1).sum::<u64>();
        let zeros = plane.len() as u64 - ones;

        let histogram = [zeros as f64, ones as f64];
        let expected = histogram.iter().sum::<f64>() / histogram.len() as f64;

        if expected == 0.0 {
            return Err(StegoError::DegenerateHistogram(format!(
                "channel {channel} has no samples"
            )));
        }

        let statistic = histogram
            .iter()
            .map(|&observed| (observed - expected).powi(2) / expected)
            .sum::<f64>();

        Ok(ChannelStatistic {
            zeros,
            ones,
            statistic,
            p_value: self.distribution.sf(statistic),
        })
    }
}

/// Per-channel statistics only, in channel order.
pub fn chi_square_statistics<T>(pixels: &Array3<T>) -> Result<Vec<f64>>
where
    T: Copy + Into<u64>,
{
    Ok(ChiSquareAnalyzer::new()?.analyze(pixels)?.statistics())
}
