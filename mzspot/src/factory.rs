//! Wires the alignment components together for one technology.
use std::fmt::Display;

use tracing::{info, warn};

use crate::accessor::{DataAccessor, PeakFeatureSource};
use crate::comparer::PeakComparer;
use crate::error::AlignmentError;
use crate::gapfill::{GapFiller, QuantMassLookup, RawSpectrumSource};
use crate::interval::SimpleInterval;
use crate::joiner::PeakJoiner;
use crate::params::{AlignmentParameters, Technology};
use crate::peak::AnalysisFile;
use crate::refiner::{AlignmentRefiner, Joined};
use crate::spot::AlignmentSpotProperty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentStage {
    Loading,
    Joining,
    GapFilling,
}

impl Display for AlignmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlignmentStage::Loading => "loading",
            AlignmentStage::Joining => "joining",
            AlignmentStage::GapFilling => "gap filling",
        };
        f.write_str(s)
    }
}

/// Called with `(stage, completed, total)` as files complete
pub type ProgressCallback<'a> = &'a (dyn Fn(AlignmentStage, usize, usize) + Sync);

/// The composition root of an alignment run
#[derive(Debug, Clone)]
pub struct AlignmentProcessFactory {
    technology: Technology,
    params: AlignmentParameters,
    comparer: PeakComparer,
    time_range: Option<SimpleInterval<f64>>,
}

impl AlignmentProcessFactory {
    /// Validate `params` for `technology` and build the factory
    pub fn new(technology: Technology, params: AlignmentParameters) -> Result<Self, AlignmentError> {
        params.validate(technology)?;
        let comparer = PeakComparer::new(technology, &params);
        Ok(Self {
            technology,
            params,
            comparer,
            time_range: None,
        })
    }

    pub fn with_time_range(mut self, time_range: Option<SimpleInterval<f64>>) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn parameters(&self) -> &AlignmentParameters {
        &self.params
    }

    pub fn comparer(&self) -> &PeakComparer {
        &self.comparer
    }

    pub fn accessor(&self) -> DataAccessor {
        DataAccessor::new(self.comparer.clone()).with_time_range(self.time_range)
    }

    pub fn joiner(&self) -> PeakJoiner {
        PeakJoiner::new(
            self.comparer.clone(),
            self.params.reference_file_id,
            self.params.window_multiplier,
        )
    }

    pub fn refiner(&self, spots: Vec<AlignmentSpotProperty>) -> AlignmentRefiner<Joined> {
        AlignmentRefiner::new(self.comparer.clone(), self.params.clone(), spots)
    }

    pub fn gap_filler(&self) -> GapFiller {
        GapFiller::new(self.comparer.clone(), self.params.clone())
    }

    /// Load, join, refine and gap fill `files`, strictly in that order.
    ///
    /// If `max_threads` is set the run happens inside a dedicated pool of that size.
    pub fn run(
        &self,
        files: &[AnalysisFile],
        peak_source: &dyn PeakFeatureSource,
        raw_source: &dyn RawSpectrumSource,
        quant_lookup: Option<&dyn QuantMassLookup>,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<AlignmentSpotProperty>, AlignmentError> {
        match self.params.max_threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| AlignmentError::invalid_config(format!("cannot build a pool of {n} threads: {e}")))?;
                pool.install(|| self.run_inner(files, peak_source, raw_source, quant_lookup, progress))
            }
            None => self.run_inner(files, peak_source, raw_source, quant_lookup, progress),
        }
    }

    fn run_inner(
        &self,
        files: &[AnalysisFile],
        peak_source: &dyn PeakFeatureSource,
        raw_source: &dyn RawSpectrumSource,
        quant_lookup: Option<&dyn QuantMassLookup>,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<AlignmentSpotProperty>, AlignmentError> {
        info!("Aligning {} {} files", files.len(), self.technology);
        let peaks = self.accessor().load_all(files, peak_source)?;
        if let Some(cb) = progress {
            cb(AlignmentStage::Loading, files.len(), files.len());
        }

        let join_progress = |done: usize, total: usize| {
            if let Some(cb) = progress {
                cb(AlignmentStage::Joining, done, total)
            }
        };
        let table = self.joiner().join(files, peaks, Some(&join_progress))?;
        info!("Joined {} rows", table.len());
        let spots = table.into_spots()?;

        let mut spots = self.refiner(spots).refine().into_spots();
        info!("Refined to {} spots", spots.len());

        let fill_progress = |done: usize, total: usize| {
            if let Some(cb) = progress {
                cb(AlignmentStage::GapFilling, done, total)
            }
        };
        self.gap_filler()
            .fill(files, &mut spots, raw_source, quant_lookup, Some(&fill_progress))?;

        let below = spots
            .iter()
            .filter(|s| s.fill_percentage < self.params.min_fill_percentage)
            .count();
        if below > 0 {
            warn!(
                "{below} of {} spots are detected in fewer than {:.0}% of files",
                spots.len(),
                self.params.min_fill_percentage * 100.0
            );
        }
        Ok(spots)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_invalid_parameters_fail_fast() {
        let mut params = AlignmentParameters::for_technology(Technology::LcMs);
        params.rt_tolerance = 0.0;
        assert!(matches!(
            AlignmentProcessFactory::new(Technology::LcMs, params),
            Err(AlignmentError::InvalidConfiguration(_))
        ));
    }
}
