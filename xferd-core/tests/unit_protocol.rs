//! Unit tests for the worker message shapes

use xferd_core::protocol::messages::{
    status, ErrorPhase, ErrorScope, ReasonClass, TRANSFER_MESSAGE_LEN,
};
use xferd_core::protocol::{
    BringOnlineState, FixedText, JobId, PinStatus, StagingPhase, TransferStatus,
};

#[test]
fn test_job_id_round_trip() {
    let id = "5d2c1a7e-9b3f-4e8a-a1c2-0f9e8d7c6b5a";
    assert_eq!(id.len(), 36);
    let job = JobId::new(id);
    assert_eq!(job.as_str(), id);

    let status = TransferStatus::new(job, 1, status::ACTIVE);
    let json = serde_json::to_string(&status).unwrap();
    let back: TransferStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back.job_id.as_str(), id);
}

#[test]
fn test_long_message_truncated() {
    let text = "x".repeat(2000);
    let status = TransferStatus::new(JobId::generate(), 1, status::FAILED).with_message(&text);
    assert_eq!(status.message.len(), TRANSFER_MESSAGE_LEN);

    let short: FixedText<128> = FixedText::new(&"e".repeat(200));
    assert_eq!(short.len(), 128);
    assert!(FixedText::<128>::truncates(&"e".repeat(200)));
}

#[test]
fn test_failure_message_format() {
    let mut status = TransferStatus::new(JobId::generate(), 1, status::FAILED);
    status.error.set_error(110);
    let status = status.with_failure(
        ErrorScope::Source,
        ErrorPhase::TransferPreparation,
        ReasonClass::ConnectionError,
        "gridftp server unreachable",
    );
    assert!(status.error.is_error());
    assert!(status
        .message
        .as_str()
        .starts_with("SOURCE [110] TRANSFER_PREPARATION"));
    assert!(status.message.as_str().ends_with("gridftp server unreachable"));
}

#[test]
fn test_bring_online_expires_after_timeout() {
    let mut state = BringOnlineState::new(
        JobId::generate(),
        42,
        "srm://se.example.org/pnfs/file",
        0,
        600,
    );
    assert!(state.submit(0));

    let mut now = 0;
    let mut phase = StagingPhase::Polling;
    while phase == StagingPhase::Polling {
        now = state.next_poll;
        assert!(state.poll_due(now));
        phase = state.record_poll(now, PinStatus::Pending);
    }
    assert_eq!(phase, StagingPhase::Expired);
    assert_eq!(state.n_polls, 7);
    assert_eq!(now, 615);
}

#[test]
fn test_late_pin_still_expires() {
    let mut state = BringOnlineState::new(JobId::generate(), 1, "srm://se/f", 0, 10);
    state.submit(0);
    assert_eq!(state.record_poll(11, PinStatus::Pinned), StagingPhase::Expired);
}
