//! Scan versus reference match results
use std::cmp::Ordering;

/// The score assigned to a criterion that could not be evaluated
pub const NOT_APPLICABLE: f64 = -1.0;

/// Where an identification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MatchSource {
    #[default]
    None,
    Msp,
    TextDb,
    Manual,
}

/// The outcome of comparing one experimental scan against one library reference.
///
/// Every score is either `>= 0` or [`NOT_APPLICABLE`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MsScanMatchResult {
    pub name: String,
    pub inchikey: String,
    /// The stable identifier of the matched reference
    pub library_id: i64,
    /// The position of the matched reference in the annotator's sorted library
    pub library_id_when_ordered: usize,
    pub annotator_id: String,
    pub source: MatchSource,

    pub total_score: f64,
    pub weighted_dot_product: f64,
    pub simple_dot_product: f64,
    pub reverse_dot_product: f64,
    pub matched_peaks_count: f64,
    pub matched_peaks_percentage: f64,
    pub accurate_mass_similarity: f64,
    pub rt_similarity: f64,
    pub ri_similarity: f64,
    pub ccs_similarity: f64,
    pub isotope_similarity: f64,

    pub is_precursor_mz_match: bool,
    pub is_spectrum_match: bool,
    pub is_rt_match: bool,
    pub is_ri_match: bool,
    pub is_ccs_match: bool,
    pub is_lipid_class_match: bool,
    pub is_lipid_chains_match: bool,
    pub is_lipid_position_match: bool,
    pub is_other_lipid_match: bool,
}

impl Default for MsScanMatchResult {
    fn default() -> Self {
        Self {
            name: String::new(),
            inchikey: String::new(),
            library_id: -1,
            library_id_when_ordered: usize::MAX,
            annotator_id: String::new(),
            source: MatchSource::None,
            total_score: 0.0,
            weighted_dot_product: NOT_APPLICABLE,
            simple_dot_product: NOT_APPLICABLE,
            reverse_dot_product: NOT_APPLICABLE,
            matched_peaks_count: NOT_APPLICABLE,
            matched_peaks_percentage: NOT_APPLICABLE,
            accurate_mass_similarity: NOT_APPLICABLE,
            rt_similarity: NOT_APPLICABLE,
            ri_similarity: NOT_APPLICABLE,
            ccs_similarity: NOT_APPLICABLE,
            isotope_similarity: NOT_APPLICABLE,
            is_precursor_mz_match: false,
            is_spectrum_match: false,
            is_rt_match: false,
            is_ri_match: false,
            is_ccs_match: false,
            is_lipid_class_match: false,
            is_lipid_chains_match: false,
            is_lipid_position_match: false,
            is_other_lipid_match: false,
        }
    }
}

impl MsScanMatchResult {
    /// The `[0, 1]` criteria that participate in [`MsScanMatchResult::total_score`].
    /// The matched peak count is a count, so it is not included.
    pub fn criteria(&self) -> [f64; 9] {
        [
            self.weighted_dot_product,
            self.simple_dot_product,
            self.reverse_dot_product,
            self.matched_peaks_percentage,
            self.accurate_mass_similarity,
            self.rt_similarity,
            self.ri_similarity,
            self.ccs_similarity,
            self.isotope_similarity,
        ]
    }

    /// Recompute [`MsScanMatchResult::total_score`] as the mean of the applicable criteria
    pub fn aggregate_total_score(&mut self) -> f64 {
        self.total_score = mean_of_applicable(&self.criteria());
        self.total_score
    }

    /// Whether this result denotes a usable identification
    pub fn is_identified(&self) -> bool {
        self.library_id >= 0
            && self.source != MatchSource::None
            && (self.is_spectrum_match || self.is_precursor_mz_match)
    }

    /// Whether this result identifies a compound by its fragment spectrum
    pub fn is_msms_identified(&self) -> bool {
        self.library_id >= 0 && self.is_spectrum_match
    }

    /// Blank out every identity and score field, keeping only the annotator
    /// that produced the result.
    pub fn set_default_compound_information(&mut self) {
        let annotator_id = std::mem::take(&mut self.annotator_id);
        *self = Self {
            annotator_id,
            ..Default::default()
        };
    }

    /// Order results best first: descending total score, then ascending library position
    pub fn best_first(a: &Self, b: &Self) -> Ordering {
        b.total_score
            .total_cmp(&a.total_score)
            .then_with(|| a.library_id_when_ordered.cmp(&b.library_id_when_ordered))
    }
}

/// Average the values that are `>= 0`, returning `0` when none are
pub fn mean_of_applicable(values: &[f64]) -> f64 {
    let (total, count) = values
        .iter()
        .filter(|v| **v >= 0.0)
        .fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_total_score_ignores_not_applicable() {
        let mut result = MsScanMatchResult {
            weighted_dot_product: 0.9,
            simple_dot_product: 0.6,
            accurate_mass_similarity: 0.3,
            ..Default::default()
        };
        let total = result.aggregate_total_score();
        assert!((total - 0.6).abs() < 1e-12);

        let mut empty = MsScanMatchResult::default();
        assert_eq!(empty.aggregate_total_score(), 0.0);
    }

    #[test]
    fn test_set_default_compound_information() {
        let mut result = MsScanMatchResult {
            name: "Alanine".to_string(),
            library_id: 12,
            annotator_id: "msp".to_string(),
            source: MatchSource::Msp,
            is_spectrum_match: true,
            total_score: 0.8,
            ..Default::default()
        };
        assert!(result.is_identified());
        result.set_default_compound_information();
        assert!(!result.is_identified());
        assert_eq!(result.annotator_id, "msp");
        assert!(result.name.is_empty());
        assert_eq!(result.total_score, 0.0);
    }
}
