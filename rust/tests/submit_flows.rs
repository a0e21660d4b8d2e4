use std::sync::Arc;
use std::time::Duration;

use ledgerchat_core::{
    ContractCallBuilder, Draft, FailureClass, RelayError, SignerError, SignerErrorKind,
    SubmitError, SubmitPipeline, SubmitStage,
};
use ledgerchat_test_utils::{FakeRelay, FakeSigner};

fn draft(body: &str) -> Draft {
    Draft {
        recipient_contract: Some("CWALLET".to_string()),
        body: body.to_string(),
        key_reference: Some("passkey-1".to_string()),
    }
}

fn pipeline() -> (SubmitPipeline, Arc<FakeSigner>, Arc<FakeRelay>) {
    let signer = FakeSigner::new();
    let relay = FakeRelay::new();
    let pipeline = SubmitPipeline::new(
        ContractCallBuilder::new("CCHAT", "send"),
        signer.clone(),
        relay.clone(),
    );
    (pipeline, signer, relay)
}

fn assert_released(pipeline: &SubmitPipeline) {
    assert!(!pipeline.guard().is_in_flight());
    assert_eq!(pipeline.stage(), SubmitStage::Idle);
}

fn assert_failed(pipeline: &SubmitPipeline) {
    assert!(!pipeline.guard().is_in_flight());
    assert_eq!(pipeline.stage(), SubmitStage::Failed);
}

#[tokio::test]
async fn happy_path_builds_signs_and_relays() {
    let (pipeline, signer, relay) = pipeline();

    let receipt = pipeline.submit(draft("gm")).await.unwrap();

    assert_eq!(receipt.transaction_hash, "hash-1");
    assert_eq!(signer.calls(), 1);
    assert_eq!(signer.last_key().as_deref(), Some("passkey-1"));
    assert_eq!(relay.sent()[0].envelope, "signed:CCHAT:send:CWALLET:gm");
    assert_released(&pipeline);
}

#[tokio::test]
async fn missing_recipient_fails_before_signer() {
    let (pipeline, signer, relay) = pipeline();
    let mut d = draft("hi");
    d.recipient_contract = None;

    let err = pipeline.submit(d).await.unwrap_err();

    assert!(matches!(err, SubmitError::InvalidDraft(_)));
    assert_eq!(err.failure_class(), FailureClass::Input);
    assert_eq!(signer.calls(), 0);
    assert!(relay.sent().is_empty());
    assert_failed(&pipeline);
}

#[tokio::test]
async fn missing_key_reference_fails_before_signer() {
    let (pipeline, signer, _relay) = pipeline();
    let mut d = draft("hi");
    d.key_reference = None;

    assert!(matches!(
        pipeline.submit(d).await,
        Err(SubmitError::InvalidDraft(_))
    ));
    assert_eq!(signer.calls(), 0);
    assert_failed(&pipeline);
}

#[tokio::test]
async fn signer_failures_surface_and_release_guard() {
    let (pipeline, signer, relay) = pipeline();

    signer.fail_with(SignerError::new(SignerErrorKind::Rejected, "user declined"));
    let err = pipeline.submit(draft("a")).await.unwrap_err();
    assert!(matches!(err, SubmitError::SigningRejected(_)));
    assert_eq!(err.failure_class(), FailureClass::Declined);
    assert_failed(&pipeline);

    signer.fail_with(SignerError::new(SignerErrorKind::Unavailable, "device gone"));
    let err = pipeline.submit(draft("b")).await.unwrap_err();
    assert!(matches!(err, SubmitError::SigningUnavailable(_)));
    assert_eq!(err.failure_class(), FailureClass::Network);
    assert_failed(&pipeline);

    assert!(relay.sent().is_empty());
}

#[tokio::test]
async fn relay_failures_surface_and_release_guard() {
    let (pipeline, signer, relay) = pipeline();

    relay.fail_with(RelayError::rejected("tx_bad_seq"));
    let err = pipeline.submit(draft("a")).await.unwrap_err();
    assert_eq!(err, SubmitError::RelayRejected("tx_bad_seq".to_string()));
    assert_eq!(err.failure_class(), FailureClass::Ledger);
    assert_failed(&pipeline);

    relay.fail_with(RelayError::unavailable("connection refused"));
    let err = pipeline.submit(draft("b")).await.unwrap_err();
    assert!(matches!(err, SubmitError::RelayUnavailable(_)));
    assert_failed(&pipeline);

    assert_eq!(signer.calls(), 2);
    relay.succeed();
    assert!(pipeline.submit(draft("c")).await.is_ok());
    assert_released(&pipeline);
}

#[tokio::test]
async fn concurrent_submit_is_rejected_without_signing_twice() {
    let (pipeline, signer, relay) = pipeline();
    let gate = signer.hold();

    let (first, second) = tokio::join!(pipeline.submit(draft("one")), async {
        signer.wait_entered().await;
        assert_eq!(pipeline.stage(), SubmitStage::Signing);
        assert!(pipeline.guard().is_in_flight());
        let second = pipeline.submit(draft("two")).await;
        gate.notify_one();
        second
    });

    assert!(first.is_ok());
    assert_eq!(second, Err(SubmitError::AlreadyInFlight));
    assert_eq!(signer.calls(), 1);
    assert_released(&pipeline);

    signer.release_hold();
    let third = pipeline.submit(draft("three")).await.unwrap();
    assert_eq!(third.transaction_hash, "hash-2");
    assert_eq!(relay.sent().len(), 2);
    assert_eq!(relay.sent()[1].envelope, "signed:CCHAT:send:CWALLET:three");
}

#[tokio::test]
async fn submit_after_failed_submit_runs_again() {
    let (pipeline, signer, relay) = pipeline();
    let gate = signer.hold();
    signer.fail_with(SignerError::new(SignerErrorKind::Timeout, ""));

    let (first, second) = tokio::join!(pipeline.submit(draft("one")), async {
        signer.wait_entered().await;
        let second = pipeline.submit(draft("two")).await;
        gate.notify_one();
        second
    });
    assert!(matches!(first, Err(SubmitError::SigningUnavailable(_))));
    assert_eq!(second, Err(SubmitError::AlreadyInFlight));
    assert_failed(&pipeline);

    signer.release_hold();
    signer.succeed();
    assert!(pipeline.submit(draft("three")).await.is_ok());
    assert_released(&pipeline);
    assert_eq!(relay.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_an_in_flight_submit_releases_guard() {
    let (pipeline, signer, _relay) = pipeline();
    let _gate = signer.hold();

    let res = tokio::time::timeout(Duration::from_secs(5), pipeline.submit(draft("x"))).await;

    assert!(res.is_err(), "submit should still be waiting on the signer");
    assert_eq!(signer.calls(), 1);
    assert_released(&pipeline);
}

#[tokio::test]
async fn stage_observer_sees_failure_until_next_submit() {
    let (pipeline, _signer, relay) = pipeline();
    relay.fail_with(RelayError::rejected("tx_insufficient_fee"));
    let mut rx = pipeline.subscribe_stage();

    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let stage = *rx.borrow_and_update();
            seen.push(stage);
            if stage == SubmitStage::Failed || rx.changed().await.is_err() {
                break;
            }
        }
        seen
    });

    let err = pipeline.submit(draft("x")).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Ledger);

    let seen = tokio::time::timeout(Duration::from_secs(5), observer)
        .await
        .expect("observer saw the failure")
        .unwrap();
    assert_eq!(seen.last(), Some(&SubmitStage::Failed));
    assert_failed(&pipeline);

    relay.succeed();
    let mut rx = pipeline.subscribe_stage();
    pipeline.submit(draft("y")).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), SubmitStage::Idle);
}
