//! Asynchronous session tests.
//!
//! Tests validate:
//! - Ordered sessions deliver results in submission order, one task at a time
//! - A failed update discards dependent tasks without events
//! - Discriminators and session ids reach listeners unchanged
//! - The accumulating listener attaches the whole stream to the final result
//! - Single-shot sessions run whole operations on the shared pool

use delegated_crypto::{
    AccumulatingListener, CombinedOperation, CryptoEvent, CryptoListener, DelegationClient,
    DelegationConfig, Discriminator, EventKind, QueueState, SignerMode, TaskOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{
    AES_DECRYPT_HANDLE, AES_ENCRYPT_HANDLE, AES_NIST_KEY, CMAC_VECTORS, RSA_PRIVATE_HANDLE,
    RSA_PUBLIC_HANDLE, RSA_SIGNATURE, RSA_SIGNED_MESSAGE, RsaTestKey, aes_remote_key, hex,
};
use test_utils::init_test_tracing;
use test_utils::mocks::{FAIL_MARKER, RecordingListener, ScriptedCipher, SimulatedKeyService};

const WAIT: Duration = Duration::from_secs(5);

fn scripted_client(pool_size: usize) -> DelegationClient {
    init_test_tracing();
    DelegationClient::new(
        DelegationConfig::default()
            .with_worker_pool_size(pool_size)
            .with_metrics_enabled(false),
        Arc::new(SimulatedKeyService::new()),
    )
    .unwrap()
}

fn discriminators(events: &[CryptoEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.discriminator.as_ref().map(ToString::to_string).unwrap_or_default())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordered_session_is_fifo_and_serial() {
    let client = scripted_client(4);
    let (cipher, probe) = ScriptedCipher::new(Duration::from_millis(2));
    let queue = client.ordered(CombinedOperation::cipher(cipher));
    let recorder = RecordingListener::new();
    queue.add_listener(recorder.clone());

    for i in 0..20 {
        queue.update(format!("chunk-{i}").as_bytes(), Some(Discriminator::new(format!("{i}"))));
    }
    queue.finalize(b"last", Some("final".into()));

    let events = recorder.wait_for(21, WAIT).await;
    assert_eq!(events.len(), 21);

    let mut expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    expected.push("final".to_string());
    assert_eq!(discriminators(&events), expected);

    for (i, event) in events.iter().take(20).enumerate() {
        assert_eq!(event.kind, EventKind::UpdateResult(format!("chunk-{i}").into_bytes()));
        assert_eq!(event.session, queue.id());
    }
    assert_eq!(probe.peak(), 1);
    assert_eq!(probe.inputs().len(), 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_update_cascade() {
    let client = scripted_client(2);
    let (cipher, probe) = ScriptedCipher::new(Duration::from_millis(5));
    let queue = client.ordered(CombinedOperation::cipher(cipher));
    let recorder = RecordingListener::new();
    queue.add_listener(recorder.clone());

    queue.update(FAIL_MARKER, Some("u1".into()));
    queue.update(b"u2", Some("u2".into()));
    queue.update(b"u3", Some("u3".into()));
    queue.finalize(b"f4", Some("f4".into()));
    queue.update(b"u5", Some("u5".into()));

    while queue.state() != QueueState::Idle {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let events = recorder.events();

    assert_eq!(discriminators(&events), vec!["u1", "u5"]);
    assert!(events[0].is_failure());
    assert_eq!(events[1].kind, EventKind::UpdateResult(b"u5".to_vec()));
    assert_eq!(probe.inputs(), vec![FAIL_MARKER.to_vec(), b"u5".to_vec()]);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accumulated_stream_output() {
    let client = scripted_client(2);
    let (cipher, _probe) = ScriptedCipher::new(Duration::ZERO);
    let queue = client.ordered(CombinedOperation::cipher(cipher));

    let recorder = RecordingListener::new();
    let sink = recorder.clone();
    queue.add_listener(Arc::new(AccumulatingListener::new(move |e: &CryptoEvent| {
        sink.on_event(e);
    })));

    queue.update(b"ab", None);
    queue.update(b"cd", None);
    queue.finalize(b"ef", Some("stream".into()));

    let events = recorder.wait_for(3, WAIT).await;
    assert_eq!(
        events[2].kind,
        EventKind::FinalResult {
            output: b"ef".to_vec(),
            accumulated: Some(b"abcdef".to_vec()),
        }
    );
    assert_eq!(events[2].discriminator, Some("stream".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_streamed_cmac_through_queue() {
    let key: [u8; 16] = hex(AES_NIST_KEY).try_into().unwrap();
    let service = Arc::new(SimulatedKeyService::new().with_aes(
        AES_ENCRYPT_HANDLE,
        AES_DECRYPT_HANDLE,
        &key,
    ));
    let client = DelegationClient::new(
        DelegationConfig::default().with_metrics_enabled(false),
        service,
    )
    .unwrap();

    let (message, tag) = CMAC_VECTORS[3];
    let message = hex(message);
    let queue = client.ordered(client.cmac(&aes_remote_key()).unwrap());
    let recorder = RecordingListener::new();
    queue.add_listener(recorder.clone());

    for chunk in message.chunks(13) {
        queue.update(chunk, None);
    }
    let tag_id = Discriminator::generate();
    queue.finalize(&[], Some(tag_id.clone()));

    let expected_events = message.chunks(13).count() + 1;
    let events = recorder.wait_for(expected_events, WAIT).await;
    let last = events.last().unwrap();
    assert_eq!(last.discriminator, Some(tag_id));
    assert!(matches!(&last.kind, EventKind::FinalResult { output, .. } if *output == hex(tag)));
    assert!(queue.is_reconfigurable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_independent() {
    let client = scripted_client(4);
    let (first_cipher, _) = ScriptedCipher::new(Duration::from_millis(1));
    let (second_cipher, _) = ScriptedCipher::new(Duration::from_millis(1));
    let first = client.ordered(CombinedOperation::cipher(first_cipher));
    let second = client.ordered(CombinedOperation::cipher(second_cipher));
    let first_events = RecordingListener::new();
    let second_events = RecordingListener::new();
    first.add_listener(first_events.clone());
    second.add_listener(second_events.clone());

    // a failure in one session does not touch the other
    first.update(FAIL_MARKER, None);
    first.finalize(b"dropped", None);
    second.update(b"a", None);
    second.finalize(b"b", None);

    let second_seen = second_events.wait_for(2, WAIT).await;
    assert_eq!(second_seen.len(), 2);
    assert!(second_seen.iter().all(|e| e.session == second.id()));

    while first.state() != QueueState::Idle {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let first_seen = first_events.events();
    assert_eq!(first_seen.len(), 1);
    assert!(first_seen[0].is_failure());
    assert_ne!(first.id(), second.id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_shot_sign_and_verify() {
    let key = RsaTestKey::load();
    let service = Arc::new(SimulatedKeyService::new().with_rsa(
        RSA_PUBLIC_HANDLE,
        RSA_PRIVATE_HANDLE,
        &key.modulus,
        &key.public_exponent,
        &key.private_exponent,
    ));
    let client = DelegationClient::new(
        DelegationConfig::default().with_metrics_enabled(false),
        service,
    )
    .unwrap();

    let signer = client.single_shot(
        client
            .rsa_signer(&key.private_remote_key(), SignerMode::Sign)
            .unwrap(),
    );
    let recorder = RecordingListener::new();
    signer.add_listener(recorder.clone());
    signer.finalize(RSA_SIGNED_MESSAGE, Some("sig-1".into()));
    assert_eq!(
        signer.get_timeout(WAIT).await.unwrap(),
        Some(TaskOutcome::Final(hex(RSA_SIGNATURE)))
    );
    let events = recorder.wait_for(1, WAIT).await;
    assert_eq!(events[0].discriminator, Some("sig-1".into()));
    assert_eq!(events[0].session, signer.id());

    let verifier = client.single_shot(
        client
            .rsa_signer(&key.public_remote_key(), SignerMode::Verify)
            .unwrap(),
    );
    // nothing absorbed, so the signature covers a different message
    verifier.verify(&hex(RSA_SIGNATURE), None);
    assert_eq!(
        verifier.get_timeout(WAIT).await.unwrap(),
        Some(TaskOutcome::Verify(false))
    );
}
