pub mod accessor;
pub mod chrom;
pub mod comparer;
pub mod error;
pub mod factory;
pub mod gapfill;
pub mod interval;
pub mod joiner;
pub mod matching;
pub mod params;
pub mod peak;
pub mod refiner;
pub mod retention_index;
pub mod similarity;
pub mod smoothing;
pub mod spot;

pub use crate::accessor::{DataAccessor, InMemoryPeakSource, PeakFeatureSource};
pub use crate::chrom::{ChromX, ChromXType, ChromXUnit, ChromXs};
pub use crate::comparer::{PeakComparer, PeakMatch};
pub use crate::error::AlignmentError;
pub use crate::factory::{AlignmentProcessFactory, AlignmentStage, ProgressCallback};
pub use crate::gapfill::{GapFiller, InMemoryRawSource, QuantMassLookup, RawSpectrum, RawSpectrumSource};
pub use crate::joiner::{JoinedTable, PeakJoiner};
pub use crate::matching::{MatchSource, MsScanMatchResult, NOT_APPLICABLE};
pub use crate::params::{AlignmentParameters, IonMode, RetentionType, Technology};
pub use crate::peak::{
    AlignmentChromPeakFeature, AnalysisFile, ChromatogramPeak, ChromatogramPeakFeature, GAP_PEAK_ID,
};
pub use crate::refiner::AlignmentRefiner;
pub use crate::retention_index::{RetentionIndexCalibration, RiCompoundType};
pub use crate::smoothing::SmoothingMethod;
pub use crate::spot::AlignmentSpotProperty;
