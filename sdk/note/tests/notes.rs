use basis_keypair::Keypair;
use basis_note::{DebtNote, authorization_message};
use basis_pubkey::PairKey;
use basis_signature::verify;

#[test]
fn issued_note_verifies() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();

    let note = DebtNote::issue(&alice, bob.public_key(), 500_000_000, 1_700_000_000_000);
    assert!(note.verify_debtor_signature());
    assert_eq!(
        note.pair_key(),
        PairKey::derive(&alice.public_key(), &bob.public_key())
    );
}

#[test]
fn altered_note_fails() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();

    let mut note = DebtNote::issue(&alice, bob.public_key(), 100, 1);
    note.amount = 101;
    assert!(!note.verify_debtor_signature());

    let mut note = DebtNote::issue(&alice, bob.public_key(), 100, 1);
    note.creditor = alice.public_key();
    assert!(!note.verify_debtor_signature());
}

#[test]
fn signature_is_over_wire_message() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();

    let note = DebtNote::issue(&alice, bob.public_key(), 77, 3);
    let pair = PairKey::derive(&alice.public_key(), &bob.public_key());
    assert!(verify(
        &authorization_message(&pair, 77, 3),
        &alice.public_key(),
        &note.debtor_signature
    ));
}

#[test]
fn note_json_roundtrip_keeps_signature_valid() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();

    let note = DebtNote::issue(&alice, bob.public_key(), 5, 9);
    let json = serde_json::to_string(&note).unwrap();
    let back: DebtNote = serde_json::from_str(&json).unwrap();
    assert_eq!(back, note);
    assert!(back.verify_debtor_signature());
}
