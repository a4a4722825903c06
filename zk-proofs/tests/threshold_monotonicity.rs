//! Threshold properties: raising any single threshold can only turn an achieved milestone
//! (or eligible supporter) into a non-achieved one, never the reverse. Checked on native
//! evaluation and on the synthesized constraint system.

use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use proptest::prelude::*;
use wellness_zk::circuit::{MilestoneCircuit, PeerSupportCircuit};
use wellness_zk::constants::{INTERACTION_HISTORY_LEN, MOOD_HISTORY_LEN};
use wellness_zk::types::{
    MilestonePrivateInputs, MilestonePublicInputs, MoodEntry, PeerSupportPrivateInputs, PeerSupportPublicInputs,
};
use wellness_zk::witness::{build_milestone, build_peer_support};

fn private_milestone(values: [u64; 4]) -> MilestonePrivateInputs {
    MilestonePrivateInputs {
        health_score: values[0],
        session_count: values[1],
        consistency_days: values[2],
        improvement_score: values[3],
        user_secret: "42".into(),
        mood_history: (0..MOOD_HISTORY_LEN as u64)
            .map(|i| MoodEntry { mood: 50, timestamp: 1_700_000_000 + i })
            .collect(),
    }
}

fn public_milestone(mins: [u64; 4]) -> MilestonePublicInputs {
    MilestonePublicInputs {
        min_health_score: mins[0],
        min_sessions: mins[1],
        min_consistency_days: mins[2],
        min_improvement: mins[3],
        milestone_type: 0,
        verification_timestamp: 1_700_100_000,
    }
}

fn achieved(values: [u64; 4], mins: [u64; 4]) -> bool {
    let witness = build_milestone(&private_milestone(values), &public_milestone(mins)).unwrap();
    MilestoneCircuit::new(witness).evaluate().unwrap().achieved
}

/// Synthesize, require satisfaction, and return the instance (public signals) without the
/// leading constant one.
fn synthesize<C: ConstraintSynthesizer<Fr>>(circuit: C) -> Vec<Fr> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit.generate_constraints(cs.clone()).unwrap();
    assert!(cs.is_satisfied().unwrap(), "unsatisfied at {:?}", cs.which_is_unsatisfied().unwrap());
    let instance = cs.borrow().unwrap().instance_assignment.clone();
    instance[1..].to_vec()
}

fn achieved_in_circuit(values: [u64; 4], mins: [u64; 4]) -> bool {
    let witness = build_milestone(&private_milestone(values), &public_milestone(mins)).unwrap();
    let circuit = MilestoneCircuit::new(witness);
    let expected = circuit.public_signals().unwrap();
    let native = circuit.evaluate().unwrap().achieved;

    let instance = synthesize(circuit);
    assert_eq!(instance, expected);
    assert_eq!(instance[0], Fr::from(native as u64));
    native
}

fn peer_private(experience: u64, wellness: u64, ratings: Vec<i64>) -> PeerSupportPrivateInputs {
    PeerSupportPrivateInputs {
        supporter_experience: experience,
        supporter_wellness: wellness,
        interaction_history: ratings,
        supporter_secret: "7".into(),
    }
}

fn eligible_in_circuit(private: &PeerSupportPrivateInputs, public: &PeerSupportPublicInputs) -> bool {
    let circuit = PeerSupportCircuit::new(build_peer_support(private, public).unwrap());
    let expected = circuit.public_signals().unwrap();
    let outputs = circuit.evaluate().unwrap();

    let instance = synthesize(circuit);
    assert_eq!(instance, expected);
    assert_eq!(instance[0], Fr::from(outputs.eligible as u64));
    assert_eq!(instance[1], Fr::from(outputs.quality_score));
    outputs.eligible
}

#[test]
fn circuit_accepts_values_equal_to_their_thresholds() {
    let mins = [80, 10, 30, 20];
    assert!(achieved_in_circuit(mins, mins));
    for which in 0..4 {
        let mut below = mins;
        below[which] -= 1;
        assert!(!achieved_in_circuit(below, mins), "threshold {which} met one short");
    }

    // Quality of [6, 2] is exactly 4.
    let mut ratings = vec![0i64; INTERACTION_HISTORY_LEN];
    ratings[3] = 6;
    ratings[11] = 2;
    let public = PeerSupportPublicInputs { min_experience: 12, min_wellness: 60, quality_threshold: 4 };
    assert!(eligible_in_circuit(&peer_private(12, 60, ratings.clone()), &public));
    assert!(!eligible_in_circuit(&peer_private(11, 60, ratings.clone()), &public));
    assert!(!eligible_in_circuit(
        &peer_private(12, 60, ratings),
        &PeerSupportPublicInputs { quality_threshold: 5, ..public },
    ));
}

proptest! {
    #[test]
    fn raising_a_milestone_threshold_never_grants_achievement(
        values in prop::array::uniform4(0u64..=255),
        mins in prop::array::uniform4(0u64..=255),
        which in 0usize..4,
        bump in 1u64..64,
    ) {
        let before = achieved(values, mins);
        let mut raised = mins;
        raised[which] = (raised[which] + bump).min(255);
        let after = achieved(values, raised);
        prop_assert!(before || !after);
    }

    #[test]
    fn milestone_achievement_matches_plain_comparison(
        values in prop::array::uniform4(0u64..=255),
        mins in prop::array::uniform4(0u64..=255),
    ) {
        let expected = values.iter().zip(mins.iter()).all(|(v, m)| v >= m);
        prop_assert_eq!(achieved(values, mins), expected);
    }

    #[test]
    fn raising_peer_thresholds_never_grants_eligibility(
        experience in 0u64..=255,
        wellness in 0u64..=255,
        ratings in prop::collection::vec(-5i64..=5, INTERACTION_HISTORY_LEN),
        threshold in 0u64..=127,
        bump in 1u64..16,
    ) {
        prop_assume!(ratings.iter().any(|r| *r > 0));
        let private = PeerSupportPrivateInputs {
            supporter_experience: experience,
            supporter_wellness: wellness,
            interaction_history: ratings,
            supporter_secret: "7".into(),
        };
        let eligible = |min_experience, quality_threshold| {
            let public = PeerSupportPublicInputs { min_experience, min_wellness: 40, quality_threshold };
            let witness = build_peer_support(&private, &public).unwrap();
            PeerSupportCircuit::new(witness).evaluate().unwrap().eligible
        };

        let before = eligible(10, threshold);
        prop_assert!(before || !eligible(10, (threshold + bump).min(127)));
        prop_assert!(before || !eligible((10 + bump).min(255), threshold));
    }
}

// Synthesis is far slower than native evaluation.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn synthesized_milestone_is_satisfied_and_monotone(
        values in prop::array::uniform4(0u64..=255),
        mins in prop::array::uniform4(0u64..=255),
        which in 0usize..4,
        bump in 1u64..64,
    ) {
        let before = achieved_in_circuit(values, mins);
        prop_assert_eq!(before, values.iter().zip(mins.iter()).all(|(v, m)| v >= m));

        let mut raised = mins;
        raised[which] = (raised[which] + bump).min(255);
        prop_assert!(before || !achieved_in_circuit(values, raised));
    }

    #[test]
    fn synthesized_peer_support_is_satisfied_and_monotone(
        experience in 0u64..=255,
        wellness in 0u64..=255,
        ratings in prop::collection::vec(-5i64..=5, INTERACTION_HISTORY_LEN),
        threshold in 0u64..=127,
        bump in 1u64..16,
    ) {
        prop_assume!(ratings.iter().any(|r| *r > 0));
        let private = peer_private(experience, wellness, ratings);
        let public = PeerSupportPublicInputs { min_experience: 10, min_wellness: 40, quality_threshold: threshold };

        let before = eligible_in_circuit(&private, &public);
        let raised = PeerSupportPublicInputs { quality_threshold: (threshold + bump).min(127), ..public };
        prop_assert!(before || !eligible_in_circuit(&private, &raised));
    }
}
