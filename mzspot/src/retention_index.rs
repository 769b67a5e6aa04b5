//! Retention time and retention index interconversion.
//!
//! Every file carries its own fitted calibration, so the same retention index
//! maps to a different retention time in each file.
use std::collections::BTreeMap;

use crate::error::AlignmentError;

/// Which family of retention standards a calibration was fitted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RiCompoundType {
    /// n-alkane ladder, Kovats retention index
    #[default]
    Alkanes,
    /// Fatty acid methyl ester markers on the Fiehn retention index scale
    Fames,
}

/// The retention indices assigned to the Fiehn FAME markers, keyed by carbon number
pub const FIEHN_FAME_INDICES: [(u32, f64); 13] = [
    (8, 262320.0),
    (9, 323120.0),
    (10, 381020.0),
    (12, 487220.0),
    (14, 582620.0),
    (16, 668720.0),
    (18, 747420.0),
    (20, 819620.0),
    (22, 886620.0),
    (24, 948820.0),
    (26, 1006900.0),
    (28, 1061990.0),
    (30, 1113100.0),
];

fn fiehn_index_of(carbon: u32) -> Option<f64> {
    FIEHN_FAME_INDICES
        .iter()
        .find(|(c, _)| *c == carbon)
        .map(|(_, ri)| *ri)
}

/// A piecewise linear map between retention time and retention index
/// anchored at standard compounds.
///
/// The anchors are kept sorted and strictly increasing on both axes. Outside
/// the anchored range the map extrapolates the nearest segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetentionIndexCalibration {
    kind: RiCompoundType,
    /// `(retention time, retention index)` pairs
    anchors: Vec<(f64, f64)>,
}

impl RetentionIndexCalibration {
    /// Fit a Kovats calibration from the retention times of an n-alkane ladder,
    /// keyed by carbon number. Alkane `Cn` has retention index `100 n`.
    pub fn kovats(alkanes: &BTreeMap<u32, f64>) -> Result<Self, AlignmentError> {
        let anchors = alkanes
            .iter()
            .map(|(carbon, rt)| (*rt, *carbon as f64 * 100.0))
            .collect();
        Self::from_anchors(RiCompoundType::Alkanes, anchors)
    }

    /// Fit a Fiehn calibration from the retention times of FAME markers, keyed
    /// by carbon number. Only the carbon numbers in [`FIEHN_FAME_INDICES`] are valid.
    pub fn fiehn(markers: &BTreeMap<u32, f64>) -> Result<Self, AlignmentError> {
        let mut anchors = Vec::with_capacity(markers.len());
        for (carbon, rt) in markers.iter() {
            let ri = fiehn_index_of(*carbon).ok_or_else(|| {
                AlignmentError::InvalidCalibration(format!(
                    "C{carbon} is not a Fiehn FAME marker"
                ))
            })?;
            anchors.push((*rt, ri));
        }
        Self::from_anchors(RiCompoundType::Fames, anchors)
    }

    /// Build a calibration from the compound standard table of `kind`
    pub fn from_standards(
        kind: RiCompoundType,
        standards: &BTreeMap<u32, f64>,
    ) -> Result<Self, AlignmentError> {
        match kind {
            RiCompoundType::Alkanes => Self::kovats(standards),
            RiCompoundType::Fames => Self::fiehn(standards),
        }
    }

    fn from_anchors(
        kind: RiCompoundType,
        mut anchors: Vec<(f64, f64)>,
    ) -> Result<Self, AlignmentError> {
        if anchors.len() < 2 {
            return Err(AlignmentError::InvalidCalibration(format!(
                "{kind:?} calibration needs at least two standards, found {}",
                anchors.len()
            )));
        }
        if anchors.iter().any(|(rt, ri)| !rt.is_finite() || !ri.is_finite()) {
            return Err(AlignmentError::InvalidCalibration(
                "calibration contains a non-finite value".to_string(),
            ));
        }
        anchors.sort_by(|a, b| a.1.total_cmp(&b.1));
        for pair in anchors.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(AlignmentError::InvalidCalibration(format!(
                    "retention times must increase with retention index, {} is not after {}",
                    pair[1].0, pair[0].0
                )));
            }
        }
        Ok(Self { kind, anchors })
    }

    pub fn kind(&self) -> RiCompoundType {
        self.kind
    }

    pub fn anchors(&self) -> &[(f64, f64)] {
        &self.anchors
    }

    /// The index of the left anchor of the segment used to convert `value`,
    /// where `key` selects which axis `value` is on.
    fn segment_of<F: Fn(&(f64, f64)) -> f64>(&self, value: f64, key: F) -> usize {
        let i = self.anchors.partition_point(|a| key(a) <= value);
        i.saturating_sub(1).min(self.anchors.len() - 2)
    }

    /// Convert a retention time to a retention index.
    ///
    /// For Kovats calibrations this is the linear Kovats formula between the
    /// bracketing alkanes. For Fiehn calibrations the bracketing FAME markers
    /// are interpolated the same way.
    pub fn rt_to_ri(&self, rt: f64) -> f64 {
        let i = self.segment_of(rt, |a| a.0);
        let (rt0, ri0) = self.anchors[i];
        let (rt1, ri1) = self.anchors[i + 1];
        ri0 + (ri1 - ri0) * (rt - rt0) / (rt1 - rt0)
    }

    /// Convert a retention index back to a retention time
    pub fn ri_to_rt(&self, ri: f64) -> f64 {
        let i = self.segment_of(ri, |a| a.1);
        let (rt0, ri0) = self.anchors[i];
        let (rt1, ri1) = self.anchors[i + 1];
        rt0 + (rt1 - rt0) * (ri - ri0) / (ri1 - ri0)
    }

    /// Convert a retention index width centered at `ri` into a retention time width
    pub fn ri_width_to_rt(&self, ri: f64, width: f64) -> f64 {
        let half = width / 2.0;
        (self.ri_to_rt(ri + half) - self.ri_to_rt(ri - half)).abs()
    }
}
