//! Unit tests for admission bands and transfer parameter selection

use proptest::prelude::*;
use xferd_core::concurrency::params::{
    BUFFSIZE_CANDIDATES, DEFAULT_NOSTREAMS, NOSTREAMS_CANDIDATES,
};
use xferd_core::concurrency::{
    admission_band, AdmissionBand, AdmissionLimits, AdmissionMode, BandTable, ConcurrencyBands,
    IndexSelector, LinkStats,
};
use xferd_core::config::BandConfig;

fn mode_strategy() -> impl Strategy<Value = AdmissionMode> {
    prop_oneof![
        Just(AdmissionMode::Mode1),
        Just(AdmissionMode::Mode2),
        Just(AdmissionMode::Mode3),
    ]
}

proptest! {
    /// Property: admission never shrinks as the active count grows
    #[test]
    fn prop_admission_monotonic(mode in mode_strategy(), active in 0u32..1_000) {
        let here = admission_band(mode, active);
        let next = admission_band(mode, active + 1);
        prop_assert!(next.jobs >= here.jobs);
        prop_assert!(next.files >= here.files);
    }

    /// Property: any selector yields only candidate or default values
    #[test]
    fn prop_params_always_allowed(
        timeout in proptest::option::of(0usize..4),
        nostreams in proptest::option::of(0usize..20),
        buffersize in proptest::option::of(0usize..20),
    ) {
        let selector = IndexSelector { timeout, nostreams, buffersize };
        let params = ConcurrencyBands::standard()
            .pick_transfer_params(&LinkStats::new("srm://a", "srm://b"), &selector);
        prop_assert!(params.is_allowed());
    }
}

#[test]
fn test_mode_limits() {
    assert_eq!(
        admission_band(AdmissionMode::Mode1, 3),
        AdmissionLimits { jobs: 3, files: 5 }
    );
    assert_eq!(
        admission_band(AdmissionMode::Mode2, 4),
        AdmissionLimits { jobs: 5, files: 8 }
    );
    assert_eq!(
        admission_band(AdmissionMode::Mode3, 6),
        AdmissionLimits { jobs: 7, files: 10 }
    );
}

#[test]
fn test_high_count_clamps_to_top() {
    assert_eq!(
        admission_band(AdmissionMode::Mode1, 10),
        AdmissionLimits { jobs: 7, files: 10 }
    );
}

#[test]
fn test_configured_bands() {
    let bands = ConcurrencyBands::from_config(&BandConfig {
        mode: AdmissionMode::Mode2,
        rungs: None,
    })
    .unwrap();
    assert_eq!(bands.admit(0).jobs, 5);

    let custom = ConcurrencyBands::from_config(&BandConfig {
        mode: AdmissionMode::Mode1,
        rungs: Some(vec![
            AdmissionBand::new(0, 10, 1, 2),
            AdmissionBand::new(10, 100, 4, 8),
        ]),
    })
    .unwrap();
    assert_eq!(custom.admit(50), AdmissionLimits { jobs: 4, files: 8 });
    assert_eq!(custom.table().rungs().len(), 2);

    assert!(BandTable::new(vec![AdmissionBand::new(5, 1, 1, 1)]).is_err());
}

#[test]
fn test_candidate_sets() {
    assert_eq!(NOSTREAMS_CANDIDATES.len(), 10);
    assert!(!NOSTREAMS_CANDIDATES.contains(&0));
    assert!(NOSTREAMS_CANDIDATES.contains(&DEFAULT_NOSTREAMS));
    assert_eq!(BUFFSIZE_CANDIDATES.last(), Some(&67_108_864));
}
