//! Reading NIST MSP formatted spectral libraries.
//!
//! Each record is a block of `KEY: value` lines ending with a `Num Peaks`
//! line and that many `mz intensity` lines. Records are separated by blank
//! lines. Keys are case insensitive and unknown keys are ignored.
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;
use itertools::Itertools;
use mzpeaks::CentroidPeak;
use tracing::{debug, info};

use mzspot::IonMode;

use crate::error::AnnotationError;
use crate::reference::{ion_mode_of_adduct, MoleculeMsReference};

fn parse_number(value: &str, line: usize, key: &str) -> Result<f64, AnnotationError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| AnnotationError::parse(line, format!("{key} value {value:?} is not a number: {e}")))
}

/// Parse every `mz intensity` pair on a peak line.
///
/// Pairs may be separated by `;` and quoted annotations are skipped, so
/// `44 999; 72 120 "frag"` yields two peaks.
fn parse_peaks(text: &str, line: usize, first_index: u32) -> Result<Vec<CentroidPeak>, AnnotationError> {
    let unquoted: String = text.split('"').step_by(2).collect();
    let tokens: Vec<&str> = unquoted
        .split(|c: char| c.is_whitespace() || c == ';' || c == ',' || c == ':')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(AnnotationError::parse(
            line,
            format!("Expected `mz intensity` pairs, got {text:?}"),
        ));
    }
    tokens
        .into_iter()
        .tuples()
        .enumerate()
        .map(|(i, (mz, intensity))| {
            let mz = parse_number(mz, line, "peak m/z")?;
            let intensity = parse_number(intensity, line, "peak intensity")?;
            Ok(CentroidPeak::new(mz, intensity as f32, first_index + i as u32))
        })
        .collect()
}

#[derive(Debug, Default)]
struct RecordBuilder {
    reference: MoleculeMsReference,
    ion_mode_given: bool,
    peaks: Vec<CentroidPeak>,
    peaks_expected: usize,
    started: bool,
}

impl RecordBuilder {
    fn set(&mut self, key: &str, value: &str, line: usize) -> Result<(), AnnotationError> {
        self.started = true;
        let value = value.trim();
        let r = &mut self.reference;
        match key.trim().to_ascii_uppercase().as_str() {
            "NAME" => r.name = value.to_string(),
            "PRECURSORMZ" => r.precursor_mz = parse_number(value, line, key)?,
            "PRECURSORTYPE" => r.adduct = value.to_string(),
            "RETENTIONTIME" | "RT" => r.rt = Some(parse_number(value, line, key)?),
            "RETENTIONINDEX" | "RI" => r.ri = Some(parse_number(value, line, key)?),
            "CCS" => r.ccs = Some(parse_number(value, line, key)?),
            "FORMULA" => r.formula = value.to_string(),
            "ONTOLOGY" | "COMPOUNDCLASS" => r.ontology = value.to_string(),
            "INCHIKEY" => r.inchikey = value.to_string(),
            "SMILES" => r.smiles = value.to_string(),
            "QUANTMASS" => r.quant_mass = Some(parse_number(value, line, key)?),
            "COMMENT" | "COMMENTS" => r.comment = value.to_string(),
            "IONMODE" => {
                r.ion_mode = match value.to_ascii_lowercase().as_str() {
                    "positive" | "p" | "+" => IonMode::Positive,
                    "negative" | "n" | "-" => IonMode::Negative,
                    _ => {
                        return Err(AnnotationError::parse(line, format!("Unknown ion mode {value:?}")));
                    }
                };
                self.ion_mode_given = true;
            }
            "NUM PEAKS" => {
                let n = parse_number(value, line, key)?;
                if n < 0.0 || n.fract() != 0.0 {
                    return Err(AnnotationError::parse(line, format!("Invalid peak count {value:?}")));
                }
                self.peaks_expected = n as usize;
            }
            _ => {}
        }
        Ok(())
    }

    fn push_peaks(&mut self, text: &str, line: usize) -> Result<(), AnnotationError> {
        let peaks = parse_peaks(text, line, self.peaks.len() as u32)?;
        if self.peaks.len() + peaks.len() > self.peaks_expected {
            return Err(AnnotationError::parse(
                line,
                format!(
                    "Found {} peaks but Num Peaks is {}",
                    self.peaks.len() + peaks.len(),
                    self.peaks_expected
                ),
            ));
        }
        self.peaks.extend(peaks);
        Ok(())
    }

    fn finish(mut self, scan_id: i64, line: usize) -> Result<MoleculeMsReference, AnnotationError> {
        if self.peaks.len() < self.peaks_expected {
            return Err(AnnotationError::parse(
                line,
                format!(
                    "Record {:?} ended after {} of {} peaks",
                    self.reference.name,
                    self.peaks.len(),
                    self.peaks_expected
                ),
            ));
        }
        if !self.ion_mode_given {
            if let Some(mode) = ion_mode_of_adduct(&self.reference.adduct) {
                self.reference.ion_mode = mode;
            }
        }
        self.reference.scan_id = scan_id;
        Ok(self.reference.with_spectrum(self.peaks))
    }
}

/// Read every record of an MSP library.
///
/// Records are numbered in file order, which becomes their `scan_id`.
pub fn read_msp<R: BufRead>(reader: R) -> Result<Vec<MoleculeMsReference>, AnnotationError> {
    let mut references = Vec::new();
    let mut builder = RecordBuilder::default();
    let mut line_no = 0;
    for line in reader.lines() {
        line_no += 1;
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            if builder.started {
                let done = std::mem::take(&mut builder);
                references.push(done.finish(references.len() as i64, line_no)?);
            }
            continue;
        }
        if builder.peaks_expected > builder.peaks.len() {
            builder.push_peaks(text, line_no)?;
            continue;
        }
        match text.split_once(':') {
            Some((key, value)) => builder.set(key, value, line_no)?,
            None => {
                return Err(AnnotationError::parse(
                    line_no,
                    format!("Expected `KEY: value`, got {text:?}"),
                ))
            }
        }
    }
    if builder.started {
        references.push(builder.finish(references.len() as i64, line_no)?);
    }
    debug!("Parsed {} MSP records over {line_no} lines", references.len());
    Ok(references)
}

/// Read an MSP library from `path`, decompressing it if it is gzipped
pub fn read_msp_file(path: impl AsRef<Path>) -> Result<Vec<MoleculeMsReference>, AnnotationError> {
    let path = path.as_ref();
    let references = if is_gzipped(path)? {
        let handle = io::BufReader::new(fs::File::open(path)?);
        read_msp(io::BufReader::new(MultiGzDecoder::new(handle)))?
    } else {
        read_msp(io::BufReader::new(fs::File::open(path)?))?
    };
    info!("Read {} references from {}", references.len(), path.display());
    Ok(references)
}

pub(crate) fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut handle = fs::File::open(path)?;
    let mut magic = [0u8; 2];
    match handle.read_exact(&mut magic) {
        Ok(()) => Ok(magic == [0x1f, 0x8b]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
