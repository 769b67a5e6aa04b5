//! Cross-file peak joining.
//!
//! Alignment is progressive: the reference file seeds one row per peak, then
//! every other file is merged into the growing table in input order. Each row
//! carries a consensus peak that is recomputed after every merge, so retention
//! drift across files is followed rather than compared to the first file only.
use std::collections::HashSet;

use identity_hash::BuildIdentityHasher;
use itertools::Itertools;
use tracing::{debug, info, trace};

use crate::comparer::PeakComparer;
use crate::error::AlignmentError;
use crate::interval::{sorted_range_of, SimpleInterval};
use crate::peak::{AlignmentChromPeakFeature, AnalysisFile, ChromatogramPeakFeature};
use crate::spot::AlignmentSpotProperty;

type ClaimedSet = HashSet<usize, BuildIdentityHasher<usize>>;

/// One prospective spot: the index of the peak it took from each file, if any
#[derive(Debug, Clone)]
pub struct JoinedRow {
    pub slots: Vec<Option<usize>>,
    center: ChromatogramPeakFeature,
}

impl JoinedRow {
    pub fn center(&self) -> &ChromatogramPeakFeature {
        &self.center
    }

    pub fn detected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn fill_percentage(&self) -> f64 {
        if self.slots.is_empty() {
            0.0
        } else {
            self.detected_count() as f64 / self.slots.len() as f64
        }
    }
}

/// The output of [`PeakJoiner::join`]: the per-file peak lists and the rows
/// that index into them.
#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub files: Vec<AnalysisFile>,
    pub peaks: Vec<Vec<ChromatogramPeakFeature>>,
    pub rows: Vec<JoinedRow>,
    pub reference_file_id: usize,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert each row into a spot with one slot per file, in file order.
    ///
    /// Fails if any peak is referenced by more than one row.
    pub fn into_spots(self) -> Result<Vec<AlignmentSpotProperty>, AlignmentError> {
        let Self {
            files, peaks, rows, ..
        } = self;
        let mut pool: Vec<Vec<Option<ChromatogramPeakFeature>>> = peaks
            .into_iter()
            .map(|ps| ps.into_iter().map(Some).collect())
            .collect();
        let mut spots = Vec::with_capacity(rows.len());
        for row in rows {
            if row.slots.len() != files.len() {
                return Err(AlignmentError::InvariantViolation(format!(
                    "row has {} slots for {} files",
                    row.slots.len(),
                    files.len()
                )));
            }
            let mut aligned = Vec::with_capacity(files.len());
            for (file, slot) in files.iter().zip(row.slots) {
                match slot {
                    Some(i) => {
                        let feature = pool
                            .get_mut(file.id)
                            .and_then(|ps| ps.get_mut(i))
                            .and_then(Option::take)
                            .ok_or_else(|| {
                                AlignmentError::InvariantViolation(format!(
                                    "peak {i} of file {} is claimed twice or does not exist",
                                    file.id
                                ))
                            })?;
                        aligned.push(AlignmentChromPeakFeature::from_feature(file, feature));
                    }
                    None => aligned.push(AlignmentChromPeakFeature::gap(file)),
                }
            }
            let mut spot = AlignmentSpotProperty::new(aligned);
            spot.assign_representative();
            spots.push(spot);
        }
        Ok(spots)
    }
}

/// Progressive star alignment of per-file peak lists
#[derive(Debug, Clone)]
pub struct PeakJoiner {
    comparer: PeakComparer,
    reference_file_id: Option<usize>,
    window_multiplier: f64,
}

impl PeakJoiner {
    pub fn new(comparer: PeakComparer, reference_file_id: Option<usize>, window_multiplier: f64) -> Self {
        Self {
            comparer,
            reference_file_id,
            window_multiplier,
        }
    }

    /// The configured reference file, or else the file with the most peaks,
    /// with ties going to the lowest index.
    pub fn select_reference_file(
        &self,
        peaks: &[Vec<ChromatogramPeakFeature>],
    ) -> Result<usize, AlignmentError> {
        match self.reference_file_id {
            Some(i) if i < peaks.len() => Ok(i),
            Some(i) => Err(AlignmentError::invalid_config(format!(
                "reference file {i} does not exist, there are {} files",
                peaks.len()
            ))),
            None => Ok(peaks
                .iter()
                .enumerate()
                .fold((0, 0), |(best, best_len), (i, ps)| {
                    if ps.len() > best_len {
                        (i, ps.len())
                    } else {
                        (best, best_len)
                    }
                })
                .0),
        }
    }

    fn check_sorted(&self, file: &AnalysisFile, peaks: &[ChromatogramPeakFeature]) -> Result<(), AlignmentError> {
        if peaks
            .iter()
            .map(|p| self.comparer.key(p))
            .tuple_windows()
            .any(|(a, b)| a > b)
        {
            return Err(AlignmentError::InvariantViolation(format!(
                "peaks of file {} ({}) are not sorted by {}",
                file.id,
                file.name,
                self.comparer.primary_axis()
            )));
        }
        Ok(())
    }

    fn recenter(&self, row: &mut JoinedRow, peaks: &[Vec<ChromatogramPeakFeature>]) {
        let members: Vec<&ChromatogramPeakFeature> = row
            .slots
            .iter()
            .enumerate()
            .filter_map(|(f, slot)| slot.map(|i| &peaks[f][i]))
            .collect();
        if let Some(center) = self.comparer.consensus(&members) {
            row.center = center;
        }
    }

    /// Find the best unclaimed peak of `peaks` for `row`.
    ///
    /// Candidates come from a binary-search bounded window on the primary axis
    /// and must pass [`PeakComparer::equals`]. The best is the most similar,
    /// then the highest, then the earliest in the list.
    fn best_candidate(
        &self,
        row: &JoinedRow,
        peaks: &[ChromatogramPeakFeature],
        claimed: &ClaimedSet,
    ) -> Option<usize> {
        let axis = self.comparer.primary_axis();
        let center = row.center.apex(axis)?;
        let half_width = (row.center.width(axis) * self.window_multiplier)
            .max(self.comparer.retention_tolerance());
        let window = SimpleInterval::around(center, half_width);
        let range = sorted_range_of(peaks, &window, |p| self.comparer.key(p));

        let mut best: Option<(usize, f64, f64)> = None;
        for i in range {
            if claimed.contains(&i) {
                continue;
            }
            let candidate = &peaks[i];
            let m = self.comparer.match_peaks(&row.center, candidate);
            if !m.is_match() {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, score, height)) => {
                    m.total_score > score || (m.total_score == score && candidate.height_top > height)
                }
            };
            if better {
                best = Some((i, m.total_score, candidate.height_top));
            }
        }
        best.map(|(i, _, _)| i)
    }

    /// Join the per-file peak lists, each sorted by the comparer's order.
    ///
    /// `progress` is called with `(files merged, total files)` after each file.
    pub fn join(
        &self,
        files: &[AnalysisFile],
        peaks: Vec<Vec<ChromatogramPeakFeature>>,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<JoinedTable, AlignmentError> {
        if files.len() != peaks.len() {
            return Err(AlignmentError::InvariantViolation(format!(
                "{} files but {} peak lists",
                files.len(),
                peaks.len()
            )));
        }
        if let Some((i, f)) = files.iter().enumerate().find(|(i, f)| f.id != *i) {
            return Err(AlignmentError::InvariantViolation(format!(
                "file at position {i} has ID {}",
                f.id
            )));
        }
        for (file, ps) in files.iter().zip(peaks.iter()) {
            self.check_sorted(file, ps)?;
        }
        let n_files = files.len();
        if n_files == 0 {
            return Ok(JoinedTable {
                files: Vec::new(),
                peaks,
                rows: Vec::new(),
                reference_file_id: 0,
            });
        }

        let reference = self.select_reference_file(&peaks)?;
        info!(
            "Joining {} files using {} ({}) as the reference",
            n_files, files[reference].name, reference
        );

        let mut rows: Vec<JoinedRow> = peaks[reference]
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut slots = vec![None; n_files];
                slots[reference] = Some(i);
                JoinedRow {
                    slots,
                    center: p.clone(),
                }
            })
            .collect();

        let order = std::iter::once(reference).chain((0..n_files).filter(|f| *f != reference));
        for (step, f) in order.enumerate() {
            if f != reference {
                let file_peaks = &peaks[f];
                let mut claimed = ClaimedSet::default();
                let existing = rows.len();
                for row in rows.iter_mut().take(existing) {
                    if let Some(i) = self.best_candidate(row, file_peaks, &claimed) {
                        trace!("Row claims peak {i} of file {f}");
                        claimed.insert(i);
                        row.slots[f] = Some(i);
                    }
                }
                let mut added = 0usize;
                for (i, p) in file_peaks.iter().enumerate() {
                    if !claimed.contains(&i) {
                        let mut slots = vec![None; n_files];
                        slots[f] = Some(i);
                        rows.push(JoinedRow {
                            slots,
                            center: p.clone(),
                        });
                        added += 1;
                    }
                }
                for row in rows.iter_mut().take(existing) {
                    if row.slots[f].is_some() {
                        self.recenter(row, &peaks);
                    }
                }
                debug!(
                    "Merged file {} ({}): {} matched, {} new rows, {} rows total",
                    files[f].name,
                    f,
                    claimed.len(),
                    added,
                    rows.len()
                );
            }
            if let Some(cb) = progress {
                cb(step + 1, n_files);
            }
        }

        Ok(JoinedTable {
            files: files.to_vec(),
            peaks,
            rows,
            reference_file_id: reference,
        })
    }
}
