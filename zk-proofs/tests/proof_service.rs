use std::sync::{Arc, OnceLock};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use wellness_zk::constants::{INTERACTION_HISTORY_LEN, MOOD_HISTORY_LEN};
use wellness_zk::types::{
    G1Point, MilestonePrivateInputs, MilestonePublicInputs, MoodEntry, PeerSupportPrivateInputs,
    PeerSupportPublicInputs,
};
use wellness_zk::{
    BatchItem, BatchOutcome, CircuitContext, CircuitId, CircuitKeys, ProofError, ProofRequest, ProofService,
    ProofServiceConfig, WireProof,
};

fn context() -> Arc<CircuitContext> {
    static CONTEXT: OnceLock<Arc<CircuitContext>> = OnceLock::new();
    CONTEXT
        .get_or_init(|| {
            let mut rng = ChaCha20Rng::seed_from_u64(7);
            let keys = CircuitId::ALL
                .into_iter()
                .map(|id| CircuitKeys::setup(id, &mut rng).unwrap())
                .collect::<Vec<_>>();
            Arc::new(CircuitContext::new(keys))
        })
        .clone()
}

fn service() -> Arc<ProofService> {
    Arc::new(ProofService::new(context(), ProofServiceConfig { workers: 2, ..Default::default() }))
}

fn milestone(score: u64) -> ProofRequest {
    ProofRequest::WellnessMilestone {
        private_inputs: MilestonePrivateInputs {
            health_score: score,
            session_count: 12,
            consistency_days: 40,
            improvement_score: 30,
            user_secret: "31415926535".into(),
            mood_history: (0..MOOD_HISTORY_LEN as u64)
                .map(|i| MoodEntry { mood: 55 + i, timestamp: 1_700_000_000 + i * 86_400 })
                .collect(),
        },
        public_inputs: MilestonePublicInputs {
            min_health_score: 80,
            min_sessions: 10,
            min_consistency_days: 30,
            min_improvement: 20,
            milestone_type: 1,
            verification_timestamp: 1_702_600_000,
        },
    }
}

fn peer_support(history: Vec<i64>) -> ProofRequest {
    ProofRequest::PeerSupportEligibility {
        private_inputs: PeerSupportPrivateInputs {
            supporter_experience: 30,
            supporter_wellness: 80,
            interaction_history: history,
            supporter_secret: "271828".into(),
        },
        public_inputs: PeerSupportPublicInputs { min_experience: 12, min_wellness: 60, quality_threshold: 3 },
    }
}

fn good_history() -> Vec<i64> {
    let mut h = vec![-1i64; INTERACTION_HISTORY_LEN];
    h[0] = 4;
    h[5] = 5;
    h
}

#[test]
fn milestone_proof_round_trips_and_reports_achievement() {
    let svc = service();
    let proof = svc.generate_proof(&milestone(85)).unwrap();
    assert_eq!(proof.public_signals.len(), 11);
    assert_eq!(proof.public_signals[0], "1");
    assert!(svc.verify_proof(proof.circuit_id, &proof.proof, &proof.public_signals).unwrap());

    let missed = svc.generate_proof(&milestone(70)).unwrap();
    assert_eq!(missed.public_signals[0], "0");
    assert!(svc.verify_wire(&missed.to_wire()).unwrap());
}

#[test]
fn thresholds_met_exactly_prove_and_verify() {
    let svc = service();
    let mut exact = milestone(80);
    if let ProofRequest::WellnessMilestone { private_inputs, public_inputs } = &mut exact {
        private_inputs.session_count = public_inputs.min_sessions;
        private_inputs.consistency_days = public_inputs.min_consistency_days;
        private_inputs.improvement_score = public_inputs.min_improvement;
    }
    let proof = svc.generate_proof(&exact).unwrap();
    assert_eq!(proof.public_signals[0], "1");
    assert!(svc.verify_wire(&proof.to_wire()).unwrap());

    let short = svc.generate_proof(&milestone(79)).unwrap();
    assert_eq!(short.public_signals[0], "0");
    assert!(svc.verify_wire(&short.to_wire()).unwrap());

    // good_history rates 4 and 5; the floored average is 4.
    let mut peer = peer_support(good_history());
    if let ProofRequest::PeerSupportEligibility { private_inputs, public_inputs } = &mut peer {
        private_inputs.supporter_experience = public_inputs.min_experience;
        private_inputs.supporter_wellness = public_inputs.min_wellness;
        public_inputs.quality_threshold = 4;
    }
    let proof = svc.generate_proof(&peer).unwrap();
    assert_eq!(proof.public_signals[..2], ["1", "4"]);
    assert!(svc.verify_wire(&proof.to_wire()).unwrap());
}

#[test]
fn mutating_any_public_signal_fails_verification() {
    let svc = service();
    let proof = svc.generate_proof(&milestone(90)).unwrap();
    for i in 0..proof.public_signals.len() {
        let mut signals = proof.public_signals.clone();
        signals[i] = if signals[i] == "1" { "2".into() } else { "1".into() };
        assert!(
            !svc.verify_proof(proof.circuit_id, &proof.proof, &signals).unwrap(),
            "signal {i} was mutated but still verified"
        );
    }
}

#[test]
fn malformed_wire_input_is_a_false_not_an_error() {
    let svc = service();
    let proof = svc.generate_proof(&milestone(86)).unwrap();

    let mut short = proof.public_signals.clone();
    short.pop();
    assert!(!svc.verify_proof(proof.circuit_id, &proof.proof, &short).unwrap());

    let mut padded = proof.public_signals.clone();
    padded[1] = format!("0{}", padded[1]);
    assert!(!svc.verify_proof(proof.circuit_id, &proof.proof, &padded).unwrap());

    let mut off_curve = proof.proof.clone();
    off_curve.a = G1Point { x: "1".into(), y: "1".into() };
    assert!(!svc.verify_proof(proof.circuit_id, &off_curve, &proof.public_signals).unwrap());
}

#[test]
fn wire_format_survives_json() {
    let svc = service();
    let proof = svc.generate_proof(&milestone(99)).unwrap();
    let json = serde_json::to_value(proof.to_wire()).unwrap();
    assert_eq!(json["circuitId"], "wellness_milestone");
    assert!(json["proof"]["b"]["x"].is_array());
    let back: WireProof = serde_json::from_value(json).unwrap();
    assert!(svc.verify_wire(&back).unwrap());
}

#[test]
fn repeated_request_is_served_from_cache() {
    let svc = service();
    let first = svc.generate_proof(&milestone(88)).unwrap();
    let second = svc.generate_proof(&milestone(88)).unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.proof, second.proof);
    assert_eq!(first.generated_at, second.generated_at);
    assert!(svc.cache().stats().hits >= 1);

    let other = svc.generate_proof(&milestone(89)).unwrap();
    assert_ne!(first.fingerprint, other.fingerprint);
}

#[test]
fn peer_support_proof_round_trips() {
    let svc = service();
    let proof = svc.generate_proof(&peer_support(good_history())).unwrap();
    // eligible, quality = floor(9 / 2) = 4
    assert_eq!(proof.public_signals[0], "1");
    assert_eq!(proof.public_signals[1], "4");
    assert!(svc.verify_wire(&proof.to_wire()).unwrap());
}

#[test]
fn undefined_quality_score_yields_validation_error() {
    let svc = service();
    let err = svc
        .generate_proof(&peer_support(vec![0; INTERACTION_HISTORY_LEN]))
        .unwrap_err();
    match err {
        ProofError::Validation(v) => assert_eq!(v.field, "interaction_history"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn circuits_missing_from_context_are_rejected() {
    let svc = ProofService::new(Arc::new(CircuitContext::default()), ProofServiceConfig::default());
    assert!(matches!(
        svc.generate_proof(&milestone(85)),
        Err(ProofError::CircuitUnavailable(CircuitId::WellnessMilestone))
    ));

    let loaded = service();
    let proof = loaded.generate_proof(&milestone(87)).unwrap();
    assert!(matches!(
        svc.verify_proof(proof.circuit_id, &proof.proof, &proof.public_signals),
        Err(ProofError::CircuitUnavailable(_))
    ));
}

#[test]
fn key_mismatch_is_reported_as_self_verification_failure() {
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let a = CircuitKeys::setup(CircuitId::PeerSupportEligibility, &mut rng).unwrap();
    let b = CircuitKeys::setup(CircuitId::PeerSupportEligibility, &mut rng).unwrap();
    let crossed = CircuitKeys::from_parts(CircuitId::PeerSupportEligibility, a.pk, b.vk);
    let svc = ProofService::new(Arc::new(CircuitContext::new([crossed])), ProofServiceConfig::default());

    let err = svc.generate_proof(&peer_support(good_history())).unwrap_err();
    assert!(err.is_integrity_fault());
    assert!(matches!(err, ProofError::SelfVerificationFailure { circuit_id: CircuitId::PeerSupportEligibility }));
    assert_eq!(svc.cache().stats().entries, 0);
}

#[test]
fn verifying_key_of_another_circuit_is_a_self_verification_failure() {
    let ctx = context();
    let peer = ctx.get(CircuitId::PeerSupportEligibility).unwrap();
    let milestone = ctx.get(CircuitId::WellnessMilestone).unwrap();
    let crossed = CircuitKeys::from_parts(CircuitId::PeerSupportEligibility, peer.pk.clone(), milestone.vk.clone());
    let svc = ProofService::new(Arc::new(CircuitContext::new([crossed])), ProofServiceConfig::default());

    let err = svc.generate_proof(&peer_support(good_history())).unwrap_err();
    assert!(matches!(err, ProofError::SelfVerificationFailure { .. }));
    assert_eq!(svc.cache().stats().entries, 0);
}

#[test]
fn artifacts_round_trip_and_manifest_is_enforced() {
    let ctx = context();
    let keys = ctx.get(CircuitId::PeerSupportEligibility).unwrap();
    let artifacts = keys.to_artifacts().unwrap();

    let reloaded = CircuitKeys::from_artifacts(CircuitId::PeerSupportEligibility, &artifacts).unwrap();
    assert_eq!(reloaded.vk, keys.vk);

    // Manifest for a different circuit.
    assert!(CircuitKeys::from_artifacts(CircuitId::WellnessMilestone, &artifacts).is_err());

    let mut manifest: serde_json::Value = serde_json::from_slice(&artifacts.manifest_json).unwrap();
    manifest["schema_version"] = serde_json::json!(99);
    let mut tampered = artifacts.clone();
    tampered.manifest_json = serde_json::to_vec(&manifest).unwrap();
    assert!(CircuitKeys::from_artifacts(CircuitId::PeerSupportEligibility, &tampered).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_reports_partial_failure_in_request_order() {
    let svc = service();
    let items = vec![
        BatchItem { correlation_id: "a".into(), request: milestone(81) },
        BatchItem { correlation_id: "b".into(), request: peer_support(vec![0; INTERACTION_HISTORY_LEN]) },
        BatchItem { correlation_id: "c".into(), request: peer_support(good_history()) },
    ];

    let results = svc.generate_batch(items).await;
    let ids: Vec<_> = results.iter().map(|r| r.correlation_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    assert!(matches!(results[0].outcome, BatchOutcome::Ok { .. }));
    match &results[1].outcome {
        BatchOutcome::Error { message } => assert!(message.contains("interaction_history")),
        BatchOutcome::Ok { .. } => panic!("invalid request produced a proof"),
    }
    match &results[2].outcome {
        BatchOutcome::Ok { proof } => assert!(svc.verify_wire(&proof.to_wire()).unwrap()),
        BatchOutcome::Error { message } => panic!("unexpected failure: {message}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_batch_returns_empty_results() {
    assert!(service().generate_batch(Vec::new()).await.is_empty());
}
