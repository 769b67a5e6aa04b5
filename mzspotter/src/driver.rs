use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use mzspot::{
    AlignmentError, AlignmentParameters, AlignmentProcessFactory, AlignmentStage, PeakFeatureSource,
    QuantMassLookup, Technology,
};
use mzspot_annotate::{
    annotate_spots, read_msp_file, read_textdb_file, secondary_key_for, AnnotatingPeakSource,
    AnnotationError, Annotator, MsRefSearchParameter, MspAnnotator, TextDbAnnotator,
};

use crate::args::{ArgRetentionType, ArgSmoothingMethod, ArgTechnology, OutputFormat};
use crate::input::Manifest;
use crate::progress::ProgressRecord;
use crate::time_range::TimeRange;
use crate::write::write_output;

#[derive(Debug, Error)]
pub enum MZSpotterError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to read the manifest {path}: {source}")]
    ManifestError {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON from {path}: {source}")]
    JSONError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("The manifest is invalid: {0}")]
    InvalidManifest(String),
    #[error("Failed to build the configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        Box<figment::Error>,
    ),
    #[error("Failed to write the configuration: {0}")]
    ConfigWriteError(
        #[source]
        #[from]
        toml::ser::Error,
    ),
    #[error(transparent)]
    AlignmentError(#[from] AlignmentError),
    #[error(transparent)]
    AnnotationError(#[from] AnnotationError),
    #[error("The output file format for {0} was either unknown or not supported")]
    OutputFormatUnknownOrNotSupportedError(String),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
}

impl From<figment::Error> for MZSpotterError {
    fn from(value: figment::Error) -> Self {
        Self::ConfigurationError(Box::new(value))
    }
}

/// The parameters of a run that can be set from configuration files and the environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotterConfig {
    pub alignment: AlignmentParameters,
    pub search: MsRefSearchParameter,
}

impl SpotterConfig {
    pub fn for_technology(technology: Technology) -> Self {
        let mut search = MsRefSearchParameter::default();
        if technology == Technology::GcMs {
            search.ms1_tolerance = 0.5;
            search.ms2_tolerance = 0.5;
            search.ri_tolerance = 20.0;
            search.use_time_for_filtering = true;
            search.use_time_for_scoring = true;
        }
        Self {
            alignment: AlignmentParameters::for_technology(technology),
            search,
        }
    }
}

/// Cross-sample alignment, gap filling and annotation of metabolomics peak lists.
///
/// Read a manifest of per-sample peak lists, align the peaks into spots, recover
/// the missing peaks from raw spectra, optionally annotate the spots against
/// spectral libraries, and write out the aligned table.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct MZSpotter {
    /// The JSON manifest listing each sample's peak list and raw spectra
    #[arg()]
    pub manifest: PathBuf,

    /// The path to write the aligned table to, or if '-' is passed, write to STDOUT.
    ///
    /// If a path is specified, the output format is inferred, otherwise TSV is assumed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The format to write, overriding the one inferred from the output path
    #[arg(short = 'f', long = "output-format")]
    pub output_format: Option<OutputFormat>,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzspotter.toml` in the working directory.
    /// Environment variables prefixed with `MZSPOTTER_` will be read too, using `__`
    /// to separate nested keys, e.g. `MZSPOTTER_ALIGNMENT__MZ_TOLERANCE`.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Write the effective configuration to this path as TOML
    #[arg(long = "write-config")]
    pub write_config: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The separation technology the peak lists were acquired with
    #[arg(short = 'T', long = "technology", default_value = "lc-ms")]
    pub technology: ArgTechnology,

    /// The time range to align, denoted (start?)-(stop?)
    #[arg(
        short='r',
        long="time-range",
        value_parser=TimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The time range to align, denoted (start?)-(stop?)

If a start is not specified, peaks are taken from the start of the run.
If a stop is not specified, peaks are taken until the end of the run.
"#
    )]
    pub time_range: Option<TimeRange>,

    /// The retention axis to align on
    #[arg(short = 'R', long = "retention-type")]
    pub retention_type: Option<ArgRetentionType>,

    /// The m/z tolerance in Da for matching peaks across samples
    #[arg(short = 'm', long = "mz-tolerance")]
    pub mz_tolerance: Option<f64>,

    /// The retention time tolerance in minutes for matching peaks across samples
    #[arg(long = "rt-tolerance")]
    pub rt_tolerance: Option<f64>,

    /// The retention index tolerance for matching peaks across samples
    #[arg(long = "ri-tolerance")]
    pub ri_tolerance: Option<f64>,

    /// The drift time tolerance for matching peaks across samples
    #[arg(long = "drift-tolerance")]
    pub drift_tolerance: Option<f64>,

    /// The smoothing applied to chromatograms extracted while gap filling
    #[arg(long = "smoothing")]
    pub smoothing: Option<ArgSmoothingMethod>,

    /// The number of points on either side used for smoothing
    #[arg(long = "smoothing-level")]
    pub smoothing_level: Option<usize>,

    /// The name of the sample to use as the alignment reference.
    ///
    /// If not given, the sample with the most peaks is used.
    #[arg(long = "reference-file")]
    pub reference_file: Option<String>,

    /// An MSP spectral library to annotate spots with
    #[arg(long = "msp")]
    pub msp: Option<PathBuf>,

    /// A tab separated compound list to annotate spots with
    #[arg(long = "textdb")]
    pub textdb: Option<PathBuf>,
}

impl Default for MZSpotter {
    fn default() -> Self {
        Self {
            manifest: PathBuf::new(),
            output_file: PathBuf::from("-"),
            output_format: None,
            log_file: None,
            config_file: None,
            write_config: None,
            threads: -1,
            technology: ArgTechnology::default(),
            time_range: None,
            retention_type: None,
            mz_tolerance: None,
            rt_tolerance: None,
            ri_tolerance: None,
            drift_tolerance: None,
            smoothing: None,
            smoothing_level: None,
            reference_file: None,
            msp: None,
            textdb: None,
        }
    }
}

impl MZSpotter {
    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZSpotterError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    /// Layer the technology defaults, `mzspotter.toml`, the configuration file and
    /// the environment, then apply the command line overrides.
    pub fn configuration(&self) -> Result<SpotterConfig, MZSpotterError> {
        let technology = Technology::from(self.technology);
        let mut figment = Figment::from(Serialized::defaults(SpotterConfig::for_technology(technology)))
            .merge(Toml::file("mzspotter.toml"));
        if let Some(path) = self.config_file.as_ref() {
            debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file_exact(path));
        }
        figment = figment.merge(Env::prefixed("MZSPOTTER_").split("__"));
        let mut config: SpotterConfig = figment.extract()?;

        let alignment = &mut config.alignment;
        if let Some(retention_type) = self.retention_type {
            alignment.retention_type = retention_type.into();
        }
        if let Some(value) = self.mz_tolerance {
            alignment.mz_tolerance = value;
        }
        if let Some(value) = self.rt_tolerance {
            alignment.rt_tolerance = value;
        }
        if let Some(value) = self.ri_tolerance {
            alignment.ri_tolerance = value;
        }
        if let Some(value) = self.drift_tolerance {
            alignment.drift_tolerance = value;
        }
        if let Some(method) = self.smoothing {
            alignment.smoothing_method = method.into();
        }
        if let Some(level) = self.smoothing_level {
            alignment.smoothing_level = level;
        }
        Ok(config)
    }

    pub fn main(&self) -> Result<ProgressRecord, MZSpotterError> {
        info!(
            "mzspotter v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Manifest: {}", self.manifest.display());
        info!("Output: {}", self.output_file.display());
        self.create_threadpool()?.install(|| self.run())
    }

    fn write_configuration(&self, config: &SpotterConfig) -> Result<(), MZSpotterError> {
        if let Some(path) = self.write_config.as_ref() {
            info!("Writing configuration to {}", path.display());
            fs::write(path, toml::to_string_pretty(config)?)?;
        }
        Ok(())
    }

    fn load_msp(&self, config: &SpotterConfig, technology: Technology) -> Result<Option<MspAnnotator>, MZSpotterError> {
        let Some(path) = self.msp.as_ref() else {
            return Ok(None);
        };
        let references = read_msp_file(path)?;
        info!("Read {} references from {}", references.len(), path.display());
        let secondary = secondary_key_for(technology, config.alignment.retention_type.axis());
        Ok(Some(MspAnnotator::new(
            "msp",
            references,
            secondary,
            config.search.clone(),
        )?))
    }

    fn load_textdb(&self, config: &SpotterConfig, technology: Technology) -> Result<Option<TextDbAnnotator>, MZSpotterError> {
        let Some(path) = self.textdb.as_ref() else {
            return Ok(None);
        };
        let references = read_textdb_file(path)?;
        info!("Read {} compounds from {}", references.len(), path.display());
        let secondary = secondary_key_for(technology, config.alignment.retention_type.axis());
        Ok(Some(TextDbAnnotator::new(
            "textdb",
            references,
            secondary,
            config.search.clone(),
        )?))
    }

    fn run(&self) -> Result<ProgressRecord, MZSpotterError> {
        let start = Instant::now();
        let technology = Technology::from(self.technology);
        let mut config = self.configuration()?;

        let (files, peak_source, raw_source) = Manifest::from_path(&self.manifest)?.into_sources()?;
        if let Some(name) = self.reference_file.as_ref() {
            let file = files.iter().find(|f| &f.name == name).ok_or_else(|| {
                MZSpotterError::InvalidManifest(format!("The reference file {name} is not in the manifest"))
            })?;
            config.alignment.reference_file_id = Some(file.id);
        }
        self.write_configuration(&config)?;

        let msp = self.load_msp(&config, technology)?;
        let textdb = self.load_textdb(&config, technology)?;
        let annotators: Vec<&dyn Annotator> = msp
            .iter()
            .map(|a| a as &dyn Annotator)
            .chain(textdb.iter().map(|a| a as &dyn Annotator))
            .collect();

        let factory = AlignmentProcessFactory::new(technology, config.alignment.clone())?
            .with_time_range(self.time_range.map(Into::into));

        let annotating_source;
        // GC-MS identifications must exist before cleaning so identified spots are kept
        let peaks: &dyn PeakFeatureSource = if technology == Technology::GcMs && !annotators.is_empty() {
            debug!("Annotating peaks of each file before alignment");
            annotating_source = AnnotatingPeakSource::new(&peak_source, annotators.clone(), technology);
            &annotating_source
        } else {
            &peak_source
        };
        let quant_lookup = msp.as_ref().map(|a| a.library() as &dyn QuantMassLookup);

        let progress = |stage: AlignmentStage, done: usize, total: usize| {
            debug!("{stage}: {done}/{total} files");
        };
        let mut spots = factory.run(&files, peaks, &raw_source, quant_lookup, Some(&progress))?;
        let aligned = Instant::now();
        info!("Alignment Time: {:0.3?}", aligned - start);

        for annotator in annotators.iter() {
            annotate_spots(&mut spots, *annotator, technology, None)?;
        }

        let prog = ProgressRecord::from_spots(files.len(), &spots);
        info!("Files: {} | Spots: {}", prog.files, prog.spots);
        info!(
            "Detected Peaks: {} | Gaps: {} | Gaps With Signal: {}",
            prog.detected_peaks, prog.gaps, prog.gaps_with_signal
        );
        if !annotators.is_empty() {
            info!("Identified Spots: {}", prog.identified);
        }

        write_output(&self.output_file, self.output_format, &files, &spots)?;
        let elapsed = Instant::now() - start;
        if (elapsed - (aligned - start)).as_secs_f64() > 2.0 {
            info!("Total Elapsed Time: {:0.3?}", elapsed);
        }
        Ok(prog)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gcms_search_defaults() {
        let config = SpotterConfig::for_technology(Technology::GcMs);
        assert!(config.search.use_time_for_filtering);
        assert_eq!(config.alignment, AlignmentParameters::for_technology(Technology::GcMs));
        let config = SpotterConfig::for_technology(Technology::LcMs);
        assert_eq!(config.search, MsRefSearchParameter::default());
    }

    #[test]
    fn test_command_line_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let args = MZSpotter::try_parse_from([
            "mzspotter",
            "manifest.json",
            "--mz-tolerance",
            "0.02",
            "--smoothing",
            "sma",
            "-T",
            "gc-ms",
        ])?;
        let config = args.configuration()?;
        assert_eq!(config.alignment.mz_tolerance, 0.02);
        assert_eq!(
            config.alignment.smoothing_method,
            mzspot::SmoothingMethod::SimpleMovingAverage
        );
        assert_eq!(config.alignment.rt_tolerance, 0.075);
        Ok(())
    }
}
