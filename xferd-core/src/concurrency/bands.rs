//! Admission bands
//!
//! Step-function throttle: the number of jobs and files admitted per
//! link grows in discrete jumps as the link's active transfer count rises.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XferdError};

/// One rung of the admission ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionBand {
    /// Inclusive lower active-transfer bound
    pub low: u32,
    /// Exclusive upper active-transfer bound
    pub high: u32,
    /// Jobs admitted per cycle
    pub jobs: u32,
    /// Files admitted per cycle
    pub files: u32,
}

impl AdmissionBand {
    pub const fn new(low: u32, high: u32, jobs: u32, files: u32) -> Self {
        Self {
            low,
            high,
            jobs,
            files,
        }
    }

    pub fn contains(&self, active: u32) -> bool {
        self.low <= active && active < self.high
    }

    pub fn limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            jobs: self.jobs,
            files: self.files,
        }
    }
}

pub const MODE_1: AdmissionBand = AdmissionBand::new(2, 4, 3, 5);
pub const MODE_2: AdmissionBand = AdmissionBand::new(4, 6, 5, 8);
pub const MODE_3: AdmissionBand = AdmissionBand::new(6, 8, 7, 10);

/// Job and file limits for one dispatch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub jobs: u32,
    pub files: u32,
}

/// Predefined admission mode, naming the lowest rung that may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    #[default]
    Mode1,
    Mode2,
    Mode3,
}

impl AdmissionMode {
    fn floor(&self) -> usize {
        match self {
            AdmissionMode::Mode1 => 0,
            AdmissionMode::Mode2 => 1,
            AdmissionMode::Mode3 => 2,
        }
    }
}

/// Validated, ascending admission ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandTable {
    rungs: Vec<AdmissionBand>,
}

impl BandTable {
    /// The built-in three-rung ladder
    pub fn standard() -> Self {
        Self {
            rungs: vec![MODE_1, MODE_2, MODE_3],
        }
    }

    /// Build a custom ladder.
    ///
    /// Rungs must be non-empty intervals, ascending and non-overlapping.
    pub fn new(rungs: Vec<AdmissionBand>) -> Result<Self> {
        if rungs.is_empty() {
            return Err(XferdError::InvalidBand {
                reason: "ladder needs at least one rung".into(),
            });
        }
        for (idx, rung) in rungs.iter().enumerate() {
            if rung.low >= rung.high {
                return Err(XferdError::InvalidBand {
                    reason: format!("rung {idx}: low {} >= high {}", rung.low, rung.high),
                });
            }
            if idx > 0 && rungs[idx - 1].high > rung.low {
                return Err(XferdError::InvalidBand {
                    reason: format!("rung {idx} overlaps or precedes rung {}", idx - 1),
                });
            }
        }
        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[AdmissionBand] {
        &self.rungs
    }

    /// Limits for a link with `active` running transfers.
    ///
    /// Picks the first usable rung with `low <= active < high`. Counts past
    /// every rung clamp to the top rung; counts below the mode's floor rung
    /// (or in a gap between rungs) use the highest rung already reached.
    pub fn admission_band(&self, mode: AdmissionMode, active: u32) -> AdmissionLimits {
        let floor = mode.floor().min(self.rungs.len() - 1);
        let usable = &self.rungs[floor..];

        if let Some(rung) = usable.iter().find(|r| r.contains(active)) {
            return rung.limits();
        }
        usable
            .iter()
            .rev()
            .find(|r| r.low <= active)
            .unwrap_or(&usable[0])
            .limits()
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Limits from the built-in ladder
pub fn admission_band(mode: AdmissionMode, active: u32) -> AdmissionLimits {
    BandTable::standard().admission_band(mode, active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_bracket() {
        let limits = admission_band(AdmissionMode::Mode1, 3);
        assert_eq!(limits, AdmissionLimits { jobs: 3, files: 5 });
        assert_eq!(admission_band(AdmissionMode::Mode1, 4).jobs, 5);
        assert_eq!(admission_band(AdmissionMode::Mode1, 7).files, 10);
    }

    #[test]
    fn test_clamps_above_top() {
        let limits = admission_band(AdmissionMode::Mode1, 10);
        assert_eq!(limits, AdmissionLimits { jobs: 7, files: 10 });
    }

    #[test]
    fn test_below_floor_uses_floor_rung() {
        assert_eq!(admission_band(AdmissionMode::Mode1, 0).jobs, 3);
        assert_eq!(admission_band(AdmissionMode::Mode3, 3).jobs, 7);
        assert_eq!(admission_band(AdmissionMode::Mode2, 5).files, 8);
    }

    #[test]
    fn test_rejects_bad_ladders() {
        assert!(BandTable::new(vec![]).is_err());
        assert!(BandTable::new(vec![AdmissionBand::new(4, 4, 1, 1)]).is_err());
        assert!(BandTable::new(vec![
            AdmissionBand::new(0, 5, 1, 1),
            AdmissionBand::new(3, 8, 2, 2),
        ])
        .is_err());
    }

    #[test]
    fn test_gap_between_rungs() {
        let table = BandTable::new(vec![
            AdmissionBand::new(0, 2, 1, 1),
            AdmissionBand::new(5, 9, 4, 6),
        ])
        .unwrap();
        assert_eq!(table.admission_band(AdmissionMode::Mode1, 3).jobs, 1);
        assert_eq!(table.admission_band(AdmissionMode::Mode1, 6).jobs, 4);
        // Mode3 floor clamps to the last rung of a short ladder
        assert_eq!(table.admission_band(AdmissionMode::Mode3, 0).jobs, 4);
    }
}
