//! Spectral library entries
use mzpeaks::CentroidPeak;

use mzspot::IonMode;

/// One compound in a reference library.
///
/// `scan_id` is the stable key of the entry. It survives re-sorting the
/// library, unlike the entry's position.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MoleculeMsReference {
    pub scan_id: i64,
    pub name: String,
    pub precursor_mz: f64,
    pub rt: Option<f64>,
    pub ri: Option<f64>,
    pub ccs: Option<f64>,
    pub adduct: String,
    pub formula: String,
    pub ontology: String,
    pub inchikey: String,
    pub smiles: String,
    /// The m/z a GC-MS library recommends quantifying this compound with
    pub quant_mass: Option<f64>,
    /// M+1 and M+2 abundances relative to M+0
    pub isotope_abundances: Vec<f64>,
    pub spectrum: Vec<CentroidPeak>,
    pub ion_mode: IonMode,
    pub comment: String,
}

impl MoleculeMsReference {
    pub fn new(scan_id: i64, name: impl Into<String>, precursor_mz: f64) -> Self {
        Self {
            scan_id,
            name: name.into(),
            precursor_mz,
            ..Default::default()
        }
    }

    pub fn with_rt(mut self, rt: f64) -> Self {
        self.rt = Some(rt);
        self
    }

    pub fn with_ri(mut self, ri: f64) -> Self {
        self.ri = Some(ri);
        self
    }

    pub fn with_ccs(mut self, ccs: f64) -> Self {
        self.ccs = Some(ccs);
        self
    }

    pub fn with_inchikey(mut self, inchikey: impl Into<String>) -> Self {
        self.inchikey = inchikey.into();
        self
    }

    pub fn with_spectrum(mut self, mut spectrum: Vec<CentroidPeak>) -> Self {
        spectrum.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        self.spectrum = spectrum;
        self
    }

    pub fn with_isotope_abundances(mut self, abundances: Vec<f64>) -> Self {
        self.isotope_abundances = abundances;
        self
    }
}

/// Infer the polarity of an adduct string like `[M+H]+` from its trailing charge sign
pub fn ion_mode_of_adduct(adduct: &str) -> Option<IonMode> {
    match adduct.trim().chars().last()? {
        '+' => Some(IonMode::Positive),
        '-' => Some(IonMode::Negative),
        _ => None,
    }
}
