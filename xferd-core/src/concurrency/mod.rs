//! Discrete concurrency bands
//!
//! Static lookup tables the dispatch logic consults per link: admission
//! limits by active-transfer count, and the finite transfer parameter
//! candidate sets.

pub mod bands;
pub mod params;

pub use bands::{admission_band, AdmissionBand, AdmissionLimits, AdmissionMode, BandTable};
pub use params::{
    pick_transfer_params, DefaultSelector, IndexSelector, LinkStats, ParamSelector,
    TransferParams,
};

use crate::config::BandConfig;
use crate::error::Result;

/// Band tables loaded once at startup, read-only afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyBands {
    table: BandTable,
    mode: AdmissionMode,
}

impl ConcurrencyBands {
    pub fn standard() -> Self {
        Self {
            table: BandTable::standard(),
            mode: AdmissionMode::default(),
        }
    }

    pub fn from_config(config: &BandConfig) -> Result<Self> {
        let table = match &config.rungs {
            Some(rungs) => BandTable::new(rungs.clone())?,
            None => BandTable::standard(),
        };
        Ok(Self {
            table,
            mode: config.mode,
        })
    }

    /// Limits for a link under the configured mode
    pub fn admit(&self, active: u32) -> AdmissionLimits {
        self.table.admission_band(self.mode, active)
    }

    /// Limits for a link under an explicit mode
    pub fn admission_band(&self, mode: AdmissionMode, active: u32) -> AdmissionLimits {
        self.table.admission_band(mode, active)
    }

    pub fn pick_transfer_params(
        &self,
        link: &LinkStats,
        selector: &dyn ParamSelector,
    ) -> TransferParams {
        pick_transfer_params(link, selector)
    }

    pub fn table(&self) -> &BandTable {
        &self.table
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }
}

impl Default for ConcurrencyBands {
    fn default() -> Self {
        Self::standard()
    }
}
