//! A reference library kept sorted for binary search retrieval
use std::ops::Range;

use tracing::debug;

use mzspot::interval::{sorted_range_of, SimpleInterval};
use mzspot::{MsScanMatchResult, QuantMassLookup};

use crate::params::MsRefSearchParameter;
use crate::reference::MoleculeMsReference;

/// The tie-breaking key after precursor m/z in the library order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecondaryKey {
    #[default]
    None,
    RT,
    RI,
}

impl SecondaryKey {
    pub fn value_of(&self, reference: &MoleculeMsReference) -> Option<f64> {
        match self {
            SecondaryKey::None => None,
            SecondaryKey::RT => reference.rt,
            SecondaryKey::RI => reference.ri,
        }
    }
}

/// A collection of [`MoleculeMsReference`] sorted by precursor m/z, then by
/// the secondary key, then by stable key.
///
/// The order is established by the constructor and never changes, so the
/// position of an entry is valid for the life of the library.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    references: Vec<MoleculeMsReference>,
    secondary: SecondaryKey,
    /// Positions of entries with a secondary value, sorted by that value
    by_retention: Vec<usize>,
    /// Positions of entries without a secondary value
    without_retention: Vec<usize>,
}

impl ReferenceLibrary {
    pub fn new(mut references: Vec<MoleculeMsReference>, secondary: SecondaryKey) -> Self {
        references.sort_by(|a, b| {
            a.precursor_mz
                .total_cmp(&b.precursor_mz)
                .then_with(|| {
                    let a = secondary.value_of(a).unwrap_or(f64::NEG_INFINITY);
                    let b = secondary.value_of(b).unwrap_or(f64::NEG_INFINITY);
                    a.total_cmp(&b)
                })
                .then_with(|| a.scan_id.cmp(&b.scan_id))
        });
        let (mut by_retention, without_retention): (Vec<usize>, Vec<usize>) =
            (0..references.len()).partition(|i| secondary.value_of(&references[*i]).is_some());
        by_retention.sort_by(|a, b| {
            let a = secondary.value_of(&references[*a]).unwrap_or_default();
            let b = secondary.value_of(&references[*b]).unwrap_or_default();
            a.total_cmp(&b)
        });
        debug!("Sorted {} library references by {secondary:?}", references.len());
        Self {
            references,
            secondary,
            by_retention,
            without_retention,
        }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MoleculeMsReference> {
        self.references.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MoleculeMsReference> {
        self.references.iter()
    }

    pub fn as_slice(&self) -> &[MoleculeMsReference] {
        &self.references
    }

    pub fn secondary_key(&self) -> SecondaryKey {
        self.secondary
    }

    /// The index range of entries whose precursor m/z is within the effective
    /// tolerance of `mz`
    pub fn candidate_range(&self, mz: f64, params: &MsRefSearchParameter) -> Range<usize> {
        let (lo, hi) = params.effective_tolerance(mz).bounds(mz);
        sorted_range_of(&self.references, &SimpleInterval::new(lo, hi), |r| r.precursor_mz)
    }

    /// The positions of entries whose secondary value is within `tolerance` of
    /// `value`, in secondary value order. Empty when there is no secondary key.
    pub fn retention_range(&self, value: f64, tolerance: f64) -> &[usize] {
        let key = |i: &usize| self.secondary.value_of(&self.references[*i]).unwrap_or_default();
        let start = self.by_retention.partition_point(|i| key(i) < value - tolerance);
        let end = self.by_retention.partition_point(|i| key(i) <= value + tolerance);
        &self.by_retention[start..end.max(start)]
    }

    /// The positions of entries lacking a secondary value, which no
    /// [`ReferenceLibrary::retention_range`] can return
    pub fn without_retention(&self) -> &[usize] {
        &self.without_retention
    }

    /// Resolve a match result to its library entry.
    ///
    /// The cached position is tried first. If it is stale, the library is
    /// scanned for the stable key, then for the InChIKey.
    pub fn refer(&self, result: &MsScanMatchResult) -> Option<(usize, &MoleculeMsReference)> {
        if let Some(hit) = self
            .references
            .get(result.library_id_when_ordered)
            .filter(|r| r.scan_id == result.library_id)
        {
            return Some((result.library_id_when_ordered, hit));
        }
        self.references
            .iter()
            .position(|r| r.scan_id == result.library_id)
            .or_else(|| {
                if result.inchikey.is_empty() {
                    None
                } else {
                    self.references.iter().position(|r| r.inchikey == result.inchikey)
                }
            })
            .map(|i| (i, &self.references[i]))
    }
}

impl FromIterator<MoleculeMsReference> for ReferenceLibrary {
    fn from_iter<T: IntoIterator<Item = MoleculeMsReference>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect(), SecondaryKey::None)
    }
}

impl QuantMassLookup for ReferenceLibrary {
    fn reference_quant_mass(&self, result: &MsScanMatchResult) -> Option<f64> {
        self.refer(result).and_then(|(_, r)| r.quant_mass)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn library() -> ReferenceLibrary {
        ReferenceLibrary::new(
            vec![
                MoleculeMsReference::new(3, "c", 300.2).with_rt(2.0),
                MoleculeMsReference::new(1, "a", 100.0),
                MoleculeMsReference::new(2, "b", 300.2).with_rt(1.0).with_inchikey("BBBB"),
                MoleculeMsReference::new(4, "d", 900.0),
            ],
            SecondaryKey::RT,
        )
    }

    #[test]
    fn test_sorted_on_construction() {
        let lib = library();
        let keys: Vec<i64> = lib.iter().map(|r| r.scan_id).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_candidate_range() {
        let lib = library();
        let params = MsRefSearchParameter::default();
        assert_eq!(lib.candidate_range(300.205, &params), 1..3);
        assert!(lib.candidate_range(500.0, &params).is_empty());
        assert_eq!(lib.candidate_range(900.015, &params), 3..4);
    }

    #[test]
    fn test_retention_range() {
        let lib = library();
        let scan_ids = |ordinals: &[usize]| -> Vec<i64> {
            ordinals.iter().map(|i| lib.get(*i).unwrap().scan_id).collect()
        };
        assert_eq!(scan_ids(lib.retention_range(1.5, 0.6)), vec![2, 3]);
        assert_eq!(scan_ids(lib.retention_range(2.1, 0.2)), vec![3]);
        assert!(lib.retention_range(5.0, 1.0).is_empty());
        assert_eq!(scan_ids(lib.without_retention()), vec![1, 4]);

        let unkeyed: ReferenceLibrary = library().iter().cloned().collect();
        assert!(unkeyed.retention_range(1.5, 10.0).is_empty());
        assert_eq!(unkeyed.without_retention().len(), 4);
    }

    #[test]
    fn test_refer_falls_back_to_stable_key() {
        let lib = library();
        let mut result = MsScanMatchResult {
            library_id: 2,
            library_id_when_ordered: 1,
            ..Default::default()
        };
        assert_eq!(lib.refer(&result).map(|(i, r)| (i, r.scan_id)), Some((1, 2)));

        result.library_id_when_ordered = 3;
        assert_eq!(lib.refer(&result).map(|(i, r)| (i, r.scan_id)), Some((1, 2)));

        result.library_id = 99;
        result.inchikey = "BBBB".to_string();
        assert_eq!(lib.refer(&result).map(|(i, _)| i), Some(1));

        result.inchikey.clear();
        assert!(lib.refer(&result).is_none());
    }
}
