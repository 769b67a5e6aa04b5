//! Loading per-file peak lists for alignment
use std::collections::HashMap;
use std::io;

use rayon::prelude::*;
use tracing::debug;

use crate::chrom::ChromXType;
use crate::comparer::PeakComparer;
use crate::error::AlignmentError;
use crate::interval::{SimpleInterval, Span1D};
use crate::peak::{AnalysisFile, ChromatogramPeakFeature};

/// Something that can produce the detected peaks of one input file
pub trait PeakFeatureSource: Sync {
    fn load_peaks(&self, file: &AnalysisFile) -> io::Result<Vec<ChromatogramPeakFeature>>;
}

/// A [`PeakFeatureSource`] over peak lists already in memory, keyed by file ID
#[derive(Debug, Default, Clone)]
pub struct InMemoryPeakSource {
    peaks: HashMap<usize, Vec<ChromatogramPeakFeature>>,
}

impl InMemoryPeakSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: usize, peaks: Vec<ChromatogramPeakFeature>) {
        self.peaks.insert(file_id, peaks);
    }

    pub fn with(mut self, file_id: usize, peaks: Vec<ChromatogramPeakFeature>) -> Self {
        self.insert(file_id, peaks);
        self
    }
}

impl FromIterator<(usize, Vec<ChromatogramPeakFeature>)> for InMemoryPeakSource {
    fn from_iter<T: IntoIterator<Item = (usize, Vec<ChromatogramPeakFeature>)>>(iter: T) -> Self {
        Self {
            peaks: iter.into_iter().collect(),
        }
    }
}

impl PeakFeatureSource for InMemoryPeakSource {
    fn load_peaks(&self, file: &AnalysisFile) -> io::Result<Vec<ChromatogramPeakFeature>> {
        self.peaks.get(&file.id).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No peaks registered for file {}", file.id),
            )
        })
    }
}

/// Loads peak lists and puts them into the form the joiner expects: on the
/// comparer's primary axis and sorted by the comparer's order.
#[derive(Debug, Clone)]
pub struct DataAccessor {
    comparer: PeakComparer,
    time_range: Option<SimpleInterval<f64>>,
}

impl DataAccessor {
    pub fn new(comparer: PeakComparer) -> Self {
        Self {
            comparer,
            time_range: None,
        }
    }

    /// Only keep peaks whose apex retention time falls inside `time_range`
    pub fn with_time_range(mut self, time_range: Option<SimpleInterval<f64>>) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn comparer(&self) -> &PeakComparer {
        &self.comparer
    }

    fn fill_retention_index(
        &self,
        file: &AnalysisFile,
        peaks: &mut [ChromatogramPeakFeature],
    ) -> Result<(), AlignmentError> {
        let calibration =
            file.calibration
                .as_ref()
                .ok_or_else(|| AlignmentError::MissingCalibration {
                    file_id: file.id,
                    file_name: file.name.clone(),
                })?;
        for peak in peaks.iter_mut() {
            for position in [&mut peak.chrom_left, &mut peak.chrom_top, &mut peak.chrom_right] {
                if let Some(rt) = position.rt() {
                    position.set(ChromXType::RI, calibration.rt_to_ri(rt));
                }
            }
            peak.set_main_type(ChromXType::RI);
        }
        Ok(())
    }

    /// Load the peaks of one file.
    ///
    /// Fails if the source fails, if a loaded peak carries the gap sentinel as
    /// its ID, or if retention index alignment is requested and the file has no
    /// calibration.
    pub fn load(
        &self,
        file: &AnalysisFile,
        source: &dyn PeakFeatureSource,
    ) -> Result<Vec<ChromatogramPeakFeature>, AlignmentError> {
        let data_error = |source: io::Error| AlignmentError::DataSource {
            file_id: file.id,
            file_name: file.name.clone(),
            source,
        };
        let mut peaks = source.load_peaks(file).map_err(data_error)?;
        if let Some(bad) = peaks.iter().find(|p| p.is_gap()) {
            return Err(data_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Detected peak has a negative ID {}", bad.peak_id),
            )));
        }
        let total = peaks.len();
        if let Some(time_range) = self.time_range.as_ref() {
            peaks.retain(|p| {
                p.apex(ChromXType::RT)
                    .map(|rt| time_range.contains(&rt))
                    .unwrap_or(true)
            });
        }
        if matches!(&self.comparer, PeakComparer::Gcms(c) if c.axis == ChromXType::RI) {
            self.fill_retention_index(file, &mut peaks)?;
        }
        peaks.sort_by(|a, b| self.comparer.compare(a, b));
        debug!(
            "Loaded {} of {} peaks from {} ({})",
            peaks.len(),
            total,
            file.name,
            file.id
        );
        Ok(peaks)
    }

    /// Load every file on the worker pool. The result is in `files` order.
    pub fn load_all(
        &self,
        files: &[AnalysisFile],
        source: &dyn PeakFeatureSource,
    ) -> Result<Vec<Vec<ChromatogramPeakFeature>>, AlignmentError> {
        files.par_iter().map(|file| self.load(file, source)).collect()
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::params::{AlignmentParameters, RetentionType, Technology};
    use crate::retention_index::RetentionIndexCalibration;

    fn peak(id: i64, rt: f64, mz: f64) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature::new(id, rt - 0.02, rt, rt + 0.02, mz, 100.0)
    }

    fn source() -> InMemoryPeakSource {
        InMemoryPeakSource::new().with(0, vec![peak(0, 7.0, 120.0), peak(1, 4.5, 300.0), peak(2, 4.5, 200.0)])
    }

    #[test]
    fn test_load_sorted_and_filtered() {
        let params = AlignmentParameters::for_technology(Technology::LcMs);
        let accessor = DataAccessor::new(PeakComparer::new(Technology::LcMs, &params));
        let file = AnalysisFile::new(0, "a");
        let peaks = accessor.load(&file, &source()).unwrap();
        let ids: Vec<i64> = peaks.iter().map(|p| p.peak_id).collect();
        assert_eq!(ids, vec![2, 1, 0]);

        let accessor = accessor.with_time_range(Some(SimpleInterval::new(4.0, 6.0)));
        assert_eq!(accessor.load(&file, &source()).unwrap().len(), 2);

        let missing = AnalysisFile::new(3, "d");
        assert!(matches!(
            accessor.load(&missing, &source()),
            Err(AlignmentError::DataSource { file_id: 3, .. })
        ));
    }

    #[test]
    fn test_retention_index_mode() {
        let mut params = AlignmentParameters::for_technology(Technology::GcMs);
        params.retention_type = RetentionType::RI;
        let accessor = DataAccessor::new(PeakComparer::new(Technology::GcMs, &params));

        let file = AnalysisFile::new(0, "a");
        assert!(matches!(
            accessor.load(&file, &source()),
            Err(AlignmentError::MissingCalibration { file_id: 0, .. })
        ));

        let alkanes: BTreeMap<u32, f64> = [(10, 4.0), (11, 5.0), (12, 8.0)].into_iter().collect();
        let file = file.with_calibration(RetentionIndexCalibration::kovats(&alkanes).unwrap());
        let peaks = accessor.load(&file, &source()).unwrap();
        assert_eq!(peaks[0].chrom_top.main_type(), ChromXType::RI);
        assert!((peaks[0].chrom_top.main_value() - 1050.0).abs() < 1e-9);
        assert!((peaks[2].chrom_top.main_value() - 1166.6666666666667).abs() < 1e-6);
    }

    #[test]
    fn test_load_all_preserves_order() {
        let params = AlignmentParameters::for_technology(Technology::LcMs);
        let accessor = DataAccessor::new(PeakComparer::new(Technology::LcMs, &params));
        let source: InMemoryPeakSource = (0..8)
            .map(|i| (i, (0..=i).map(|j| peak(j as i64, 1.0 + j as f64, 100.0)).collect()))
            .collect();
        let files: Vec<_> = (0..8).map(|i| AnalysisFile::new(i, format!("f{i}"))).collect();
        let loaded = accessor.load_all(&files, &source).unwrap();
        for (i, peaks) in loaded.iter().enumerate() {
            assert_eq!(peaks.len(), i + 1);
        }
    }
}
