use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use csv::WriterBuilder;
use tracing::debug;

use mzspot::{AlignmentSpotProperty, AnalysisFile, ChromXType, MsScanMatchResult};

use crate::args::OutputFormat;
use crate::driver::MZSpotterError;

fn score_of(result: Option<&MsScanMatchResult>) -> String {
    result
        .map(|r| format!("{:.4}", r.total_score))
        .unwrap_or_default()
}

fn axis_value(spot: &AlignmentSpotProperty, axis: ChromXType) -> String {
    spot.center(axis).map(|v| format!("{v:.4}")).unwrap_or_default()
}

/// Write one row per spot with its coordinates, identity and one height column per file
pub fn write_tsv<W: Write>(
    writer: W,
    files: &[AnalysisFile],
    spots: &[AlignmentSpotProperty],
) -> io::Result<()> {
    let fixed = [
        "alignment_id",
        "rt",
        "ri",
        "drift",
        "mz",
        "quant_mass",
        "fill_percentage",
        "representative_file",
        "name",
        "inchikey",
        "msp_score",
        "textdb_score",
        "isotope_weight_number",
        "adduct",
    ];
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    let header = fixed
        .iter()
        .map(|s| s.to_string())
        .chain(files.iter().map(|f| format!("height:{}", f.name)));
    writer.write_record(header)?;
    for spot in spots {
        let representative = files
            .get(spot.representative_file_id)
            .map(|f| f.name.as_str())
            .unwrap_or_default();
        let row = [
            spot.alignment_id.to_string(),
            axis_value(spot, ChromXType::RT),
            axis_value(spot, ChromXType::RI),
            axis_value(spot, ChromXType::Drift),
            format!("{:.5}", spot.mass_center),
            format!("{:.5}", spot.quant_mass),
            format!("{:.3}", spot.fill_percentage),
            representative.to_string(),
            spot.name.clone(),
            spot.inchikey.clone(),
            score_of(spot.msp_match.as_ref()),
            score_of(spot.textdb_match.as_ref()),
            spot.isotope_weight_number.to_string(),
            spot.adduct_type.clone(),
        ];
        let heights = spot.aligned_peaks.iter().map(|p| format!("{:.1}", p.height()));
        writer.write_record(row.into_iter().chain(heights))?;
    }
    writer.flush()
}

pub fn write_json<W: Write>(mut writer: W, spots: &[AlignmentSpotProperty]) -> io::Result<()> {
    serde_json::to_writer(&mut writer, spots)?;
    writeln!(writer)?;
    writer.flush()
}

fn write_format<W: Write>(
    writer: W,
    format: OutputFormat,
    files: &[AnalysisFile],
    spots: &[AlignmentSpotProperty],
) -> io::Result<()> {
    match format {
        OutputFormat::Tsv => write_tsv(writer, files, spots),
        OutputFormat::Json => write_json(writer, spots),
    }
}

/// Write `spots` to `path`, or to STDOUT if `path` is `-`.
///
/// If `format` is not given it is inferred from the path, and a `.gz` suffix
/// compresses the output. STDOUT defaults to TSV.
pub fn write_output(
    path: &Path,
    format: Option<OutputFormat>,
    files: &[AnalysisFile],
    spots: &[AlignmentSpotProperty],
) -> Result<(), MZSpotterError> {
    if path == Path::new("-") {
        let stdout = io::stdout();
        let handle = io::BufWriter::new(stdout.lock());
        write_format(handle, format.unwrap_or(OutputFormat::Tsv), files, spots)?;
        return Ok(());
    }
    let inferred = OutputFormat::infer_from_path(path);
    let compressed = inferred.map(|(_, c)| c).unwrap_or(false);
    let format = format
        .or(inferred.map(|(f, _)| f))
        .ok_or_else(|| MZSpotterError::OutputFormatUnknownOrNotSupportedError(path.display().to_string()))?;
    debug!("Writing {} spots as {format} to {}", spots.len(), path.display());
    let handle = io::BufWriter::new(fs::File::create(path)?);
    if compressed {
        let mut encoder = GzEncoder::new(handle, Compression::best());
        write_format(&mut encoder, format, files, spots)?;
        encoder.finish()?.flush()?;
    } else {
        write_format(handle, format, files, spots)?;
    }
    Ok(())
}
