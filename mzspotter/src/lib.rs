mod args;
mod driver;
mod input;
mod progress;
mod time_range;
mod write;

pub use args::*;
pub use driver::{MZSpotter, MZSpotterError, SpotterConfig};
pub use input::{JsonPeakSource, JsonRawSource, Manifest, ManifestEntry, PeakRecord, ScanRecord};
pub use progress::ProgressRecord;
pub use time_range::TimeRange;
pub use write::{write_json, write_output, write_tsv};
