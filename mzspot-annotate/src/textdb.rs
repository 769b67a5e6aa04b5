//! Reading tab separated compound lists.
//!
//! The first line is a header. `Name` and `m/z` columns are required; `RT(min)`,
//! `Adduct`, `InChIKey`, `Formula`, `SMILES`, `Ontology` and `CCS` are optional
//! and any other column is ignored. Header matching is case insensitive.
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::bufread::MultiGzDecoder;
use serde::Deserialize;
use tracing::info;

use crate::error::AnnotationError;
use crate::msp::is_gzipped;
use crate::reference::{ion_mode_of_adduct, MoleculeMsReference};

/// One data row, keyed by the names [`canonical_column`] assigns
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextDbRow {
    name: String,
    mz: Option<f64>,
    rt: Option<f64>,
    adduct: String,
    inchikey: String,
    formula: String,
    smiles: String,
    ontology: String,
    ccs: Option<f64>,
}

fn canonical_column(header: &str) -> Option<&'static str> {
    let column = match header.trim().to_ascii_lowercase().as_str() {
        "name" | "metabolite name" => "name",
        "m/z" | "mz" | "precursormz" | "precursor m/z" => "mz",
        "rt(min)" | "rt" | "retention time" => "rt",
        "adduct" | "precursortype" => "adduct",
        "inchikey" => "inchikey",
        "formula" => "formula",
        "smiles" => "smiles",
        "ontology" => "ontology",
        "ccs" => "ccs",
        _ => return None,
    };
    Some(column)
}

/// Rename recognized headers to their canonical names. Unknown and repeated
/// columns are blanked so the first occurrence wins.
fn canonical_headers(headers: &StringRecord) -> Result<StringRecord, AnnotationError> {
    let mut seen: Vec<&str> = Vec::new();
    let renamed: StringRecord = headers
        .iter()
        .map(|h| match canonical_column(h) {
            Some(c) if !seen.contains(&c) => {
                seen.push(c);
                c
            }
            _ => "",
        })
        .collect();
    if !(seen.contains(&"name") && seen.contains(&"mz")) {
        return Err(AnnotationError::parse(
            1,
            "The header must contain `Name` and `m/z` columns",
        ));
    }
    Ok(renamed)
}

/// Read every row of a tab separated compound list. Rows are numbered from
/// zero in file order, which becomes their `scan_id`. Fields may be quoted
/// to hold tabs or newlines.
pub fn read_textdb<R: Read>(reader: R) -> Result<Vec<MoleculeMsReference>, AnnotationError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Vec::new());
    }
    let headers = canonical_headers(&headers)?;

    let mut references = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or_default();
        let row: TextDbRow = record
            .deserialize(Some(&headers))
            .map_err(|e| AnnotationError::parse(line, e.to_string()))?;
        let mz = row
            .mz
            .ok_or_else(|| AnnotationError::parse(line, format!("Missing m/z for {:?}", row.name)))?;
        let mut reference = MoleculeMsReference::new(references.len() as i64, row.name, mz);
        reference.rt = row.rt;
        reference.ccs = row.ccs;
        reference.adduct = row.adduct;
        reference.inchikey = row.inchikey;
        reference.formula = row.formula;
        reference.smiles = row.smiles;
        reference.ontology = row.ontology;
        if let Some(mode) = ion_mode_of_adduct(&reference.adduct) {
            reference.ion_mode = mode;
        }
        references.push(reference);
    }
    Ok(references)
}

/// Read a text compound list from `path`, decompressing it if it is gzipped
pub fn read_textdb_file(path: impl AsRef<Path>) -> Result<Vec<MoleculeMsReference>, AnnotationError> {
    let path = path.as_ref();
    let references = if is_gzipped(path)? {
        let handle = io::BufReader::new(fs::File::open(path)?);
        read_textdb(io::BufReader::new(MultiGzDecoder::new(handle)))?
    } else {
        read_textdb(io::BufReader::new(fs::File::open(path)?))?
    };
    info!("Read {} compounds from {}", references.len(), path.display());
    Ok(references)
}

#[cfg(test)]
mod test {
    use super::*;
    use mzspot::IonMode;

    #[test]
    fn test_read_textdb() -> Result<(), AnnotationError> {
        let text = "Name\tm/z\tRT(min)\tAdduct\tExtra\tCCS\n\
                    Caffeine\t195.0877\t3.2\t[M+H]+\tfoo\t\n\
                    \n\
                    Citrate\t191.0197\t\t[M-H]-\tbar\t130.1\n";
        let refs = read_textdb(text.as_bytes())?;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "Caffeine");
        assert_eq!(refs[0].rt, Some(3.2));
        assert_eq!(refs[0].ccs, None);
        assert_eq!(refs[1].scan_id, 1);
        assert_eq!(refs[1].rt, None);
        assert_eq!(refs[1].ion_mode, IonMode::Negative);
        assert_eq!(refs[1].ccs, Some(130.1));
        Ok(())
    }

    #[test]
    fn test_missing_required_columns() {
        assert!(matches!(
            read_textdb("Name\tRT\nX\t1.0\n".as_bytes()),
            Err(AnnotationError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            read_textdb("Name\tm/z\nX\tabc\n".as_bytes()),
            Err(AnnotationError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_quoted_fields() -> Result<(), AnnotationError> {
        let text = "Name\tm/z\tFormula\n\
                    \"Tab\tName\"\t100.5\tC6H12O6\n\
                    \"Two\nLines\"\t200.25\t\n\
                    Plain\tabc\t\n";
        match read_textdb(text.as_bytes()) {
            Err(AnnotationError::Parse { line, .. }) => assert_eq!(line, 5),
            other => panic!("Expected a parse error, got {other:?}"),
        }
        let refs = read_textdb(text.replace("abc", "300.0").as_bytes())?;
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].name, "Tab\tName");
        assert_eq!(refs[0].precursor_mz, 100.5);
        assert_eq!(refs[0].formula, "C6H12O6");
        assert_eq!(refs[1].name, "Two\nLines");
        assert_eq!(refs[1].precursor_mz, 200.25);
        assert_eq!(refs[2].precursor_mz, 300.0);
        Ok(())
    }
}
