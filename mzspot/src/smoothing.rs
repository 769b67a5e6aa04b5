//! Chromatogram smoothing
use std::fmt::Display;
use std::str::FromStr;

use itertools::Itertools;
use mzpeaks::{feature::Feature, Time, MZ};
use mzsignal::feature_statistics::FeatureTransform;
use savgol_rs::{savgol_filter, SavGolInput};
use tracing::warn;

use crate::peak::ChromatogramPeak;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SmoothingMethod {
    None,
    SimpleMovingAverage,
    #[default]
    LinearWeightedMovingAverage,
    SavitzkyGolay,
}

impl Display for SmoothingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for SmoothingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "none" => Ok(Self::None),
            "sma" | "simplemovingaverage" => Ok(Self::SimpleMovingAverage),
            "lwma" | "linearweightedmovingaverage" => Ok(Self::LinearWeightedMovingAverage),
            "sg" | "savitzkygolay" => Ok(Self::SavitzkyGolay),
            _ => Err(format!("Unknown smoothing method {s}")),
        }
    }
}

impl SmoothingMethod {
    /// Smooth the intensities of `peaks`, which must be in chromatographic order.
    ///
    /// The moving averages run over a [`Feature`] with `level` as the window size
    /// and the linear weighted average is two such passes. The Savitzky-Golay
    /// filter fits a quadratic over `2 * level + 1` points and leaves traces
    /// shorter than that unchanged. Smoothed intensities are never negative.
    pub fn smooth(&self, peaks: &[ChromatogramPeak], level: usize) -> Vec<ChromatogramPeak> {
        if *self == SmoothingMethod::None || level == 0 || peaks.len() < 3 {
            return peaks.to_vec();
        }
        let intensities = match self {
            SmoothingMethod::None => return peaks.to_vec(),
            SmoothingMethod::SimpleMovingAverage => moving_average(peaks, level, 1),
            SmoothingMethod::LinearWeightedMovingAverage => moving_average(peaks, level, 2),
            SmoothingMethod::SavitzkyGolay => match savitzky_golay(peaks, level) {
                Some(intensities) => intensities,
                None => return peaks.to_vec(),
            },
        };
        peaks
            .iter()
            .zip(intensities)
            .map(|(peak, intensity)| ChromatogramPeak {
                intensity: intensity.max(0.0),
                ..*peak
            })
            .collect()
    }
}

fn moving_average(peaks: &[ChromatogramPeak], level: usize, passes: usize) -> Vec<f64> {
    let (mzs, times, intensities): (Vec<f64>, Vec<f64>, Vec<f32>) = peaks
        .iter()
        .map(|p| (p.mz, p.chrom_value, p.intensity as f32))
        .multiunzip();
    let mut feature: Feature<MZ, Time> = Feature::new(mzs, times, intensities);
    for _ in 0..passes {
        feature.smooth(level);
    }
    let (_, _, intensities) = feature.into_inner();
    intensities.into_iter().map(|i| i as f64).collect()
}

fn savitzky_golay(peaks: &[ChromatogramPeak], level: usize) -> Option<Vec<f64>> {
    let window_length = 2 * level + 1;
    if window_length > peaks.len() {
        return None;
    }
    let data: Vec<f64> = peaks.iter().map(|p| p.intensity).collect();
    let input = SavGolInput {
        data: &data,
        window_length,
        poly_order: 2,
        derivative: 0,
    };
    match savgol_filter(&input) {
        Ok(smoothed) => Some(smoothed),
        Err(e) => {
            warn!("Savitzky-Golay smoothing over {window_length} points failed: {e}");
            None
        }
    }
}

/// Smooth `peaks` with `method` at `level`
pub fn smooth(peaks: &[ChromatogramPeak], method: SmoothingMethod, level: usize) -> Vec<ChromatogramPeak> {
    method.smooth(peaks, level)
}

#[cfg(test)]
mod test {
    use super::*;

    fn trace(values: &[f64]) -> Vec<ChromatogramPeak> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ChromatogramPeak::new(i, i as f64 * 0.01, 300.0, *v))
            .collect()
    }

    #[test]
    fn test_moving_averages() {
        let mut values = vec![0.0; 11];
        values[5] = 90.0;
        let peaks = trace(&values);
        for method in [
            SmoothingMethod::SimpleMovingAverage,
            SmoothingMethod::LinearWeightedMovingAverage,
        ] {
            let smoothed = method.smooth(&peaks, 1);
            assert_eq!(smoothed.len(), peaks.len());
            assert!(smoothed[5].intensity < 90.0, "{method}");
            assert!(smoothed[4].intensity > 0.0, "{method}");
            assert!(smoothed[6].intensity > 0.0, "{method}");
            assert!(smoothed.iter().all(|p| p.intensity >= 0.0));
            assert_eq!(smoothed[5].chrom_value, peaks[5].chrom_value);
        }
    }

    #[test]
    fn test_savitzky_golay_preserves_quadratics() {
        let values: Vec<f64> = (0..9).map(|i| 100.0 - (i as f64 - 4.0).powi(2)).collect();
        let peaks = trace(&values);
        let smoothed = SmoothingMethod::SavitzkyGolay.smooth(&peaks, 2);
        for (a, b) in smoothed.iter().zip(peaks.iter()) {
            assert!((a.intensity - b.intensity).abs() < 1e-6);
        }
        let short = trace(&[1.0, 5.0, 2.0]);
        assert_eq!(SmoothingMethod::SavitzkyGolay.smooth(&short, 2), short);
    }

    #[test]
    fn test_none_and_parse() {
        let peaks = trace(&[1.0, 5.0, 2.0]);
        assert_eq!(smooth(&peaks, SmoothingMethod::None, 3), peaks);
        assert_eq!("sg".parse::<SmoothingMethod>().unwrap(), SmoothingMethod::SavitzkyGolay);
        assert_eq!(
            "linear-weighted-moving-average".parse::<SmoothingMethod>().unwrap(),
            SmoothingMethod::LinearWeightedMovingAverage
        );
        assert!("spline".parse::<SmoothingMethod>().is_err());
    }
}
