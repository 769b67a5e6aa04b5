use std::ops::{Add, AddAssign};

use mzspot::AlignmentSpotProperty;

/// Counts summarizing one alignment run
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub files: usize,
    pub spots: usize,
    pub detected_peaks: usize,
    pub gaps: usize,
    /// Gaps whose reconstructed peak has a positive height
    pub gaps_with_signal: usize,
    pub identified: usize,
}

impl ProgressRecord {
    pub fn from_spots(files: usize, spots: &[AlignmentSpotProperty]) -> Self {
        spots
            .iter()
            .map(|spot| {
                let gaps = spot.aligned_peaks.iter().filter(|p| p.is_gap());
                ProgressRecord {
                    files: 0,
                    spots: 1,
                    detected_peaks: spot.detected_count(),
                    gaps: gaps.clone().count(),
                    gaps_with_signal: gaps.filter(|p| p.height() > 0.0).count(),
                    identified: usize::from(spot.is_identified()),
                }
            })
            .fold(
                ProgressRecord {
                    files,
                    ..Default::default()
                },
                ProgressRecord::add,
            )
    }
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.files += rhs.files;
        self.spots += rhs.spots;
        self.detected_peaks += rhs.detected_peaks;
        self.gaps += rhs.gaps;
        self.gaps_with_signal += rhs.gaps_with_signal;
        self.identified += rhs.identified;
    }
}
