//! Transfer parameter candidates
//!
//! Timeouts, stream counts and TCP buffer sizes come from small fixed
//! candidate sets. The dispatcher decides which candidate to use; it
//! never synthesizes values outside these sets.

use tracing::debug;

/// Seconds
pub const DEFAULT_TIMEOUT: u32 = 4000;
pub const TIMEOUT_CANDIDATES: [u32; 1] = [4000];

pub const DEFAULT_NOSTREAMS: u32 = 4;
pub const NOSTREAMS_CANDIDATES: [u32; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// 0 lets TCP autotune the buffer
pub const DEFAULT_BUFFSIZE: u32 = 0;
pub const BUFFSIZE_CANDIDATES: [u32; 10] = [
    1_048_576, 4_194_304, 5_242_880, 7_340_032, 8_388_608, 9_437_184, 11_534_336, 12_582_912,
    14_680_064, 67_108_864,
];

/// Parameters a transfer worker is launched with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    pub timeout: u32,
    pub nostreams: u32,
    pub buffersize: u32,
}

impl TransferParams {
    /// True when every value is a candidate or the default
    pub fn is_allowed(&self) -> bool {
        (self.timeout == DEFAULT_TIMEOUT || TIMEOUT_CANDIDATES.contains(&self.timeout))
            && (self.nostreams == DEFAULT_NOSTREAMS
                || NOSTREAMS_CANDIDATES.contains(&self.nostreams))
            && (self.buffersize == DEFAULT_BUFFSIZE
                || BUFFSIZE_CANDIDATES.contains(&self.buffersize))
    }
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            nostreams: DEFAULT_NOSTREAMS,
            buffersize: DEFAULT_BUFFSIZE,
        }
    }
}

/// What the dispatcher currently knows about a link
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    pub source_se: String,
    pub dest_se: String,
    pub vo_name: Option<String>,
    pub active: u32,
    /// Recent average throughput, KiB/s
    pub avg_throughput: Option<f64>,
}

impl LinkStats {
    pub fn new(source_se: impl Into<String>, dest_se: impl Into<String>) -> Self {
        Self {
            source_se: source_se.into(),
            dest_se: dest_se.into(),
            ..Default::default()
        }
    }
}

/// Dispatcher-side selection policy.
///
/// Each method returns an index into the candidate slice, or `None` for
/// the default. Out-of-range indices also fall back to the default.
pub trait ParamSelector {
    fn timeout(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        None
    }

    fn nostreams(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        None
    }

    fn buffersize(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        None
    }
}

/// Always the defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSelector;

impl ParamSelector for DefaultSelector {}

/// Fixed candidate indices, e.g. from operator configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexSelector {
    pub timeout: Option<usize>,
    pub nostreams: Option<usize>,
    pub buffersize: Option<usize>,
}

impl ParamSelector for IndexSelector {
    fn timeout(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        self.timeout
    }

    fn nostreams(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        self.nostreams
    }

    fn buffersize(&self, _link: &LinkStats, _candidates: &[u32]) -> Option<usize> {
        self.buffersize
    }
}

/// One candidate each for timeout, streams and buffer size
pub fn pick_transfer_params(link: &LinkStats, selector: &dyn ParamSelector) -> TransferParams {
    let choose = |name: &str, idx: Option<usize>, candidates: &[u32], default: u32| match idx {
        Some(i) if i < candidates.len() => candidates[i],
        Some(i) => {
            debug!(
                param = name,
                index = i,
                source = %link.source_se,
                dest = %link.dest_se,
                "Candidate index out of range, using default"
            );
            default
        }
        None => default,
    };

    TransferParams {
        timeout: choose(
            "timeout",
            selector.timeout(link, &TIMEOUT_CANDIDATES),
            &TIMEOUT_CANDIDATES,
            DEFAULT_TIMEOUT,
        ),
        nostreams: choose(
            "nostreams",
            selector.nostreams(link, &NOSTREAMS_CANDIDATES),
            &NOSTREAMS_CANDIDATES,
            DEFAULT_NOSTREAMS,
        ),
        buffersize: choose(
            "buffersize",
            selector.buffersize(link, &BUFFSIZE_CANDIDATES),
            &BUFFSIZE_CANDIDATES,
            DEFAULT_BUFFSIZE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = pick_transfer_params(&LinkStats::new("a", "b"), &DefaultSelector);
        assert_eq!(params, TransferParams::default());
        assert!(params.is_allowed());
    }

    #[test]
    fn test_selected_candidates() {
        let selector = IndexSelector {
            timeout: Some(0),
            nostreams: Some(7),
            buffersize: Some(9),
        };
        let params = pick_transfer_params(&LinkStats::new("a", "b"), &selector);
        assert_eq!(params.timeout, 4000);
        assert_eq!(params.nostreams, 8);
        assert_eq!(params.buffersize, 67_108_864);
        assert!(params.is_allowed());
    }

    #[test]
    fn test_out_of_range_falls_back() {
        let selector = IndexSelector {
            nostreams: Some(99),
            ..Default::default()
        };
        let params = pick_transfer_params(&LinkStats::new("a", "b"), &selector);
        assert_eq!(params.nostreams, DEFAULT_NOSTREAMS);
    }

    #[test]
    fn test_synthesized_values_not_allowed() {
        let params = TransferParams {
            nostreams: 11,
            ..Default::default()
        };
        assert!(!params.is_allowed());
    }
}
