//! The run manifest and the JSON peak list and raw spectrum readers.
//!
//! A manifest lists the samples in alignment order:
//!
//! ```json
//! {
//!   "files": [
//!     {"name": "QC_01", "peaks": "QC_01.peaks.json", "raw": "QC_01.scans.json",
//!      "calibration": {"kind": "Alkanes", "standards": {"10": 4.12, "12": 6.03}}}
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory. Any of the
//! referenced files may be gzip compressed.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use flate2::bufread::MultiGzDecoder;
use itertools::Itertools;
use mzpeaks::CentroidPeak;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use mzspot::{
    AnalysisFile, ChromXType, ChromatogramPeakFeature, IonMode, PeakFeatureSource, RawSpectrum,
    RawSpectrumSource, RetentionIndexCalibration, RiCompoundType,
};

use crate::driver::MZSpotterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    #[serde(default)]
    pub kind: RiCompoundType,
    /// Carbon number to retention time
    pub standards: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub peaks: PathBuf,
    #[serde(default)]
    pub raw: Option<PathBuf>,
    #[serde(default)]
    pub calibration: Option<CalibrationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
    #[serde(skip)]
    root: PathBuf,
}

fn open_maybe_gzipped(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let mut handle = io::BufReader::new(fs::File::open(path)?);
    let compressed = handle.fill_buf()?.starts_with(&[0x1f, 0x8b]);
    if compressed {
        Ok(Box::new(io::BufReader::new(MultiGzDecoder::new(handle))))
    } else {
        Ok(Box::new(handle))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let reader = open_maybe_gzipped(path)?;
    serde_json::from_reader(reader).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse {}: {e}", path.display()),
        )
    })
}

impl Manifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MZSpotterError> {
        let path = path.as_ref();
        let reader = open_maybe_gzipped(path).map_err(|source| MZSpotterError::ManifestError {
            path: path.display().to_string(),
            source,
        })?;
        let mut manifest: Manifest = serde_json::from_reader(reader).map_err(|source| MZSpotterError::JSONError {
            path: path.display().to_string(),
            source,
        })?;
        manifest.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Build the analysis files, fitting each file's calibration, and the
    /// sources that read their peaks and spectra.
    pub fn into_sources(self) -> Result<(Vec<AnalysisFile>, JsonPeakSource, JsonRawSource), MZSpotterError> {
        let mut files = Vec::with_capacity(self.files.len());
        let mut peaks = HashMap::new();
        let mut raw = HashMap::new();
        for (i, entry) in self.files.iter().enumerate() {
            let mut file = AnalysisFile::new(i, entry.name.clone());
            if let Some(cal) = entry.calibration.as_ref() {
                file = file.with_calibration(RetentionIndexCalibration::from_standards(cal.kind, &cal.standards)?);
            }
            peaks.insert(i, self.resolve(&entry.peaks));
            if let Some(path) = entry.raw.as_ref() {
                raw.insert(i, self.resolve(path));
            }
            files.push(file);
        }
        if let Some(dup) = files.iter().map(|f| f.name.as_str()).duplicates().next() {
            return Err(MZSpotterError::InvalidManifest(format!(
                "The sample name {dup} appears more than once"
            )));
        }
        debug!("Manifest lists {} files, {} with raw spectra", files.len(), raw.len());
        Ok((files, JsonPeakSource { paths: peaks }, JsonRawSource { paths: raw }))
    }
}

/// One detected peak as written by an upstream peak picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub id: i64,
    pub rt: f64,
    pub rt_left: f64,
    pub rt_right: f64,
    pub mz: f64,
    pub height: f64,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub quant_mass: Option<f64>,
    #[serde(default)]
    pub ri: Option<f64>,
    #[serde(default)]
    pub drift: Option<f64>,
    #[serde(default)]
    pub ccs: Option<f64>,
    #[serde(default)]
    pub signal_to_noise: Option<f64>,
    /// `[mz, intensity]` pairs
    #[serde(default)]
    pub spectrum: Vec<(f64, f32)>,
    /// Isotope abundances, M+0 first
    #[serde(default)]
    pub isotopes: Vec<f64>,
}

fn to_centroids(pairs: &[(f64, f32)]) -> Vec<CentroidPeak> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, (mz, intensity))| CentroidPeak::new(*mz, *intensity, i as u32))
        .collect()
}

impl From<PeakRecord> for ChromatogramPeakFeature {
    fn from(record: PeakRecord) -> Self {
        let mut feature =
            ChromatogramPeakFeature::new(record.id, record.rt_left, record.rt, record.rt_right, record.mz, record.height);
        if let Some(area) = record.area {
            feature.area_above_zero = area;
            feature.area_above_baseline = area;
        }
        if let Some(quant_mass) = record.quant_mass {
            feature.quant_mass = quant_mass;
        }
        if let Some(ri) = record.ri {
            feature.chrom_top.set(ChromXType::RI, ri);
        }
        if let Some(drift) = record.drift {
            for chrom in [&mut feature.chrom_left, &mut feature.chrom_top, &mut feature.chrom_right] {
                chrom.set(ChromXType::Drift, drift);
            }
        }
        feature.ccs = record.ccs;
        feature.signal_to_noise = record.signal_to_noise.unwrap_or_default();
        feature.spectrum = to_centroids(&record.spectrum);
        feature.isotope_abundances = record.isotopes;
        feature
    }
}

/// One raw scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub index: usize,
    pub rt: f64,
    #[serde(default = "ScanRecord::default_ms_level")]
    pub ms_level: u8,
    #[serde(default)]
    pub polarity: IonMode,
    #[serde(default)]
    pub precursor_mz: Option<f64>,
    #[serde(default)]
    pub drift: Option<f64>,
    pub peaks: Vec<(f64, f32)>,
}

impl ScanRecord {
    fn default_ms_level() -> u8 {
        1
    }
}

impl From<ScanRecord> for RawSpectrum {
    fn from(record: ScanRecord) -> Self {
        let mut spectrum = RawSpectrum::new(record.index, record.rt, record.ms_level, to_centroids(&record.peaks));
        spectrum.polarity = record.polarity;
        spectrum.precursor_mz = record.precursor_mz;
        spectrum.drift = record.drift;
        spectrum
    }
}

/// Reads each file's peaks from a JSON array of [`PeakRecord`]
#[derive(Debug, Clone, Default)]
pub struct JsonPeakSource {
    paths: HashMap<usize, PathBuf>,
}

impl PeakFeatureSource for JsonPeakSource {
    fn load_peaks(&self, file: &AnalysisFile) -> io::Result<Vec<ChromatogramPeakFeature>> {
        let path = self.paths.get(&file.id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No peak list registered for {}", file.name),
            )
        })?;
        let records: Vec<PeakRecord> = read_json(path)?;
        debug!("Read {} peaks from {}", records.len(), path.display());
        Ok(records.into_iter().map(ChromatogramPeakFeature::from).collect())
    }
}

/// Reads each file's scans from a JSON array of [`ScanRecord`]
#[derive(Debug, Clone, Default)]
pub struct JsonRawSource {
    paths: HashMap<usize, PathBuf>,
}

impl RawSpectrumSource for JsonRawSource {
    fn load_spectra(&self, file: &AnalysisFile) -> io::Result<Vec<RawSpectrum>> {
        let path = self.paths.get(&file.id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has missing peaks but no raw spectra to fill them from", file.name),
            )
        })?;
        let records: Vec<ScanRecord> = read_json(path)?;
        debug!("Read {} scans from {}", records.len(), path.display());
        Ok(records.into_iter().map(RawSpectrum::from).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_peak_record_conversion() -> Result<(), serde_json::Error> {
        let record: PeakRecord = serde_json::from_str(
            r#"{"id": 3, "rt": 5.0, "rt_left": 4.95, "rt_right": 5.05, "mz": 300.1,
                "height": 1000.0, "ri": 1250.0, "spectrum": [[100.0, 50.0], [90.0, 10.0]]}"#,
        )?;
        let feature = ChromatogramPeakFeature::from(record);
        assert_eq!(feature.peak_id, 3);
        assert_eq!(feature.quant_mass, 300.1);
        assert_eq!(feature.chrom_top.ri(), Some(1250.0));
        assert_eq!(feature.chrom_top.main_type(), ChromXType::RT);
        assert_eq!(feature.spectrum.len(), 2);
        Ok(())
    }

    #[test]
    fn test_scan_record_defaults() -> Result<(), serde_json::Error> {
        let record: ScanRecord = serde_json::from_str(r#"{"index": 0, "rt": 1.0, "peaks": [[200.0, 5.0]]}"#)?;
        let spectrum = RawSpectrum::from(record);
        assert_eq!(spectrum.ms_level, 1);
        assert_eq!(spectrum.polarity, IonMode::Positive);
        assert_eq!(spectrum.peaks.len(), 1);
        Ok(())
    }
}
