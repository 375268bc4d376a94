//! Note issuance through tracker attestation to reserve redemption.

use std::sync::Arc;

use basis_authmap::SparseMerkleTree;
use basis_keypair::Keypair;
use basis_note::{DebtEntry, DebtNote, authorization_message};
use basis_pubkey::PairKey;
use basis_verifier::{
    RawRedemption, RedemptionWitness, RejectReason, ReserveId, ReserveState, Signer,
    TrackerAnchor, TrackerId, VerifierConfig,
};

use crate::config::derive_tracker_id;
use crate::reserves::{BookError, ReserveBook};
use crate::storage::{MemoryStore, SharedStore};
use crate::tracker::{StoreAnchorSink, Tracker, TrackerLedger};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const T0: u64 = 1_700_000_000_000;
const RESERVE: ReserveId = [5; 32];
const BALANCE: u64 = 1_000_000_000;

struct World {
    debtor: Keypair,
    creditor: Keypair,
    tracker_id: TrackerId,
    tracker: Tracker,
    book: ReserveBook,
}

impl World {
    fn new() -> Self {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let tracker_keys = Keypair::generate();
        let tracker_id = derive_tracker_id(&tracker_keys.public_key());
        let anchors = Arc::new(StoreAnchorSink::new(store.clone()));
        let tracker = Tracker::new(
            tracker_keys,
            tracker_id,
            TrackerLedger::open(store).unwrap(),
            anchors.clone(),
        );

        let debtor = Keypair::generate();
        let book = ReserveBook::new(VerifierConfig::default(), anchors);
        book.register(ReserveState::new(
            RESERVE,
            debtor.public_key(),
            tracker_id,
            BALANCE,
        ))
        .unwrap();

        Self {
            debtor,
            creditor: Keypair::generate(),
            tracker_id,
            tracker,
            book,
        }
    }

    fn owe(&mut self, amount: u64, timestamp: u64) -> DebtNote {
        let note = DebtNote::issue(&self.debtor, self.creditor.public_key(), amount, timestamp);
        self.tracker.accept_note(&note).unwrap();
        note
    }

    /// Everything the creditor submits to redeem `amount`
    fn claim(&self, note: &DebtNote, amount: u64) -> (ReserveState, TrackerAnchor, RedemptionWitness) {
        let attestation = self
            .tracker
            .attest(&self.debtor.public_key(), &self.creditor.public_key())
            .unwrap()
            .unwrap();
        let proposal = self
            .book
            .prepare_redemption(&RESERVE, &self.creditor.public_key(), amount)
            .unwrap();

        let witness = RedemptionWitness {
            receiver: self.creditor.public_key(),
            owner_signature: note.debtor_signature,
            tracker_signature: Some(attestation.tracker_signature),
            claimed_amount: attestation.entry.amount,
            debt_timestamp: attestation.entry.timestamp,
            redeemed_proof: proposal.redeemed_proof,
            tracker_proof: attestation.proof,
        };
        (proposal.proposed, attestation.anchor, witness)
    }

    fn balance(&self) -> u64 {
        self.book.state(&RESERVE).unwrap().balance
    }

    fn redeemed(&self) -> u64 {
        self.book
            .redeemed(&RESERVE, &self.creditor.public_key())
            .unwrap()
    }
}

#[test]
fn full_redemption_through_tracker() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let (proposed, anchor, witness) = world.claim(&note, 500_000_000);
    let effect = world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 1_000)
        .unwrap();

    assert_eq!(effect.payout.amount, 500_000_000);
    assert_eq!(effect.payout.receiver, world.creditor.public_key());
    assert!(!effect.emergency);
    assert_eq!(world.balance(), BALANCE - 500_000_000);
    assert_eq!(world.redeemed(), 500_000_000);
}

#[test]
fn over_redemption_leaves_reserve_untouched() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let before = world.book.state(&RESERVE).unwrap();
    let (proposed, anchor, witness) = world.claim(&note, 600_000_000);
    let result = world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 1_000);

    assert_eq!(
        result,
        Err(BookError::Rejected(RejectReason::InsufficientHeadroom {
            requested: 600_000_000,
            available: 500_000_000,
        }))
    );
    assert_eq!(world.book.state(&RESERVE).unwrap(), before);
}

#[test]
fn corrupted_tracker_signature_waits_out_emergency_window() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let (proposed, anchor, mut witness) = world.claim(&note, 500_000_000);
    if let Some(sig) = witness.tracker_signature.as_mut() {
        sig.z[31] ^= 0x01;
    }

    let early = world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 6 * DAY_MS);
    assert_eq!(
        early,
        Err(BookError::Rejected(RejectReason::InvalidSignature(
            Signer::Tracker
        )))
    );
    assert_eq!(world.balance(), BALANCE);

    let late = world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 8 * DAY_MS)
        .unwrap();
    assert!(late.emergency);
    assert_eq!(world.balance(), BALANCE - 500_000_000);
}

#[test]
fn replayed_witness_is_rejected() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let (proposed, anchor, witness) = world.claim(&note, 300_000_000);
    world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0)
        .unwrap();

    let replay = world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0);
    assert_eq!(replay, Err(BookError::Rejected(RejectReason::ProofMismatch)));

    // only the remaining headroom can follow
    let (proposed, anchor, witness) = world.claim(&note, 300_000_000);
    assert!(matches!(
        world
            .book
            .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0),
        Err(BookError::Rejected(RejectReason::InsufficientHeadroom { .. }))
    ));

    let (proposed, anchor, witness) = world.claim(&note, 200_000_000);
    world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0)
        .unwrap();
    assert_eq!(world.redeemed(), 500_000_000);
    assert_eq!(world.balance(), BALANCE - 500_000_000);
}

#[test]
fn concurrent_redemptions_serialise() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let first = world.claim(&note, 200_000_000);
    let second = world.claim(&note, 300_000_000);
    let book = &world.book;

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = [&first, &second]
            .into_iter()
            .map(|(proposed, anchor, witness)| {
                s.spawn(move || book.submit_redemption(&RESERVE, proposed, anchor, witness, T0))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(committed.len(), 1);
    assert!(
        results
            .iter()
            .any(|r| r == &Err(BookError::Rejected(RejectReason::ProofMismatch)))
    );
    assert_eq!(world.balance(), BALANCE - committed[0].payout.amount);
}

#[test]
fn newer_note_needs_new_anchor() {
    let mut world = World::new();
    world.owe(100_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();
    let newer = world.owe(400_000_000, 2);

    // attestation still reflects the anchored entry
    let (proposed, anchor, witness) = world.claim(&newer, 100_000_000);
    assert_eq!(witness.claimed_amount, 100_000_000);
    assert_eq!(
        world
            .book
            .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0),
        Err(BookError::Rejected(RejectReason::InvalidSignature(
            Signer::ReserveOwner
        )))
    );

    world.tracker.publish_anchor(T0 + 1_000).unwrap();
    let (proposed, anchor, witness) = world.claim(&newer, 400_000_000);
    world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 2_000)
        .unwrap();
    assert_eq!(world.redeemed(), 400_000_000);
}

#[test]
fn malformed_raw_input_rejected_before_verification() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();

    let (proposed, anchor, witness) = world.claim(&note, 100_000_000);
    let mut raw = RawRedemption::from(&witness);
    raw.owner_signature.truncate(64);

    assert_eq!(
        world
            .book
            .submit_raw_redemption(&RESERVE, &proposed, &anchor, &raw, T0),
        Err(BookError::Rejected(RejectReason::MalformedInput(
            "owner signature"
        )))
    );

    let raw = RawRedemption::from(&witness);
    assert!(
        world
            .book
            .submit_raw_redemption(&RESERVE, &proposed, &anchor, &raw, T0)
            .is_ok()
    );
}

#[test]
fn forged_anchor_is_refused() {
    let mut world = World::new();
    world.owe(100, 1);
    world.tracker.publish_anchor(T0).unwrap();

    // creditor invents a ledger that owes them 900M and signs for the tracker
    let pair = PairKey::derive(&world.debtor.public_key(), &world.creditor.public_key());
    let claimed = DebtEntry::new(900_000_000, 2);
    let mut fake = SparseMerkleTree::new();
    fake.insert(pair.0, claimed.to_bytes().to_vec());

    let inflated = DebtNote::issue(&world.debtor, world.creditor.public_key(), 900_000_000, 2);
    let message = authorization_message(&pair, claimed.amount, claimed.timestamp);
    let proposal = world
        .book
        .prepare_redemption(&RESERVE, &world.creditor.public_key(), 900_000_000)
        .unwrap();
    let witness = RedemptionWitness {
        receiver: world.creditor.public_key(),
        owner_signature: inflated.debtor_signature,
        tracker_signature: Some(world.creditor.sign(&message)),
        claimed_amount: claimed.amount,
        debt_timestamp: claimed.timestamp,
        redeemed_proof: proposal.redeemed_proof,
        tracker_proof: fake.prove(&pair.0),
    };
    let forged = TrackerAnchor {
        tracker_id: world.tracker_id,
        tracker_key: world.creditor.public_key(),
        digest: fake.root(),
        anchor_time: 0,
    };

    assert_eq!(
        world
            .book
            .submit_redemption(&RESERVE, &proposal.proposed, &forged, &witness, T0 + 1),
        Err(BookError::UnpublishedAnchor)
    );
    assert_eq!(world.balance(), BALANCE);
    assert_eq!(world.redeemed(), 0);
}

#[test]
fn superseded_anchor_is_refused() {
    let mut world = World::new();
    let note = world.owe(500_000_000, 1);
    world.tracker.publish_anchor(T0).unwrap();
    let (proposed, stale, witness) = world.claim(&note, 100_000_000);

    world.tracker.publish_anchor(T0 + 1_000).unwrap();
    assert_eq!(
        world
            .book
            .submit_redemption(&RESERVE, &proposed, &stale, &witness, T0 + 2_000),
        Err(BookError::UnpublishedAnchor)
    );

    let (proposed, anchor, witness) = world.claim(&note, 100_000_000);
    assert_eq!(anchor.anchor_time, T0 + 1_000);
    world
        .book
        .submit_redemption(&RESERVE, &proposed, &anchor, &witness, T0 + 2_000)
        .unwrap();
    assert_eq!(world.redeemed(), 100_000_000);
}

#[test]
fn tracker_without_anchor_cannot_back_redemption() {
    let world = World::new();
    let proposal = world
        .book
        .prepare_redemption(&RESERVE, &world.creditor.public_key(), 100)
        .unwrap();
    let tree = SparseMerkleTree::new();
    let pair = PairKey::derive(&world.debtor.public_key(), &world.creditor.public_key());
    let note = DebtNote::issue(&world.debtor, world.creditor.public_key(), 100, 1);
    let witness = RedemptionWitness {
        receiver: world.creditor.public_key(),
        owner_signature: note.debtor_signature,
        tracker_signature: None,
        claimed_amount: 100,
        debt_timestamp: 1,
        redeemed_proof: proposal.redeemed_proof,
        tracker_proof: tree.prove(&pair.0),
    };
    let anchor = TrackerAnchor {
        tracker_id: world.tracker_id,
        tracker_key: world.creditor.public_key(),
        digest: tree.root(),
        anchor_time: 0,
    };

    assert_eq!(
        world
            .book
            .submit_redemption(&RESERVE, &proposal.proposed, &anchor, &witness, T0),
        Err(BookError::NoPublishedAnchor)
    );
}
