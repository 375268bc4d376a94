//! Runtime wiring for the shared Basis configuration.
//!
//! Turns the TOML/env sections of [`BasisConfig`] into the typed values the
//! tracker, verifier and reconciler consume.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use basis_config::BasisConfig;
use basis_keypair::Keypair;
use basis_pubkey::PublicKey;
use basis_verifier::{TrackerId, VerifierConfig};
use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::reconciler::RecordFilter;

const TRACKER_ID_TAG: &[u8] = b"basis-tracker-id";

pub fn verifier_config(config: &BasisConfig) -> VerifierConfig {
    VerifierConfig {
        emergency_window_ms: config.verifier.emergency_window_ms,
        min_top_up: config.verifier.min_top_up,
    }
}

fn parse_hash(field: &str, value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value).with_context(|| format!("{field} is not hex"))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("{field} must be 32 bytes, got {}", b.len()))
}

pub fn record_filter(config: &BasisConfig) -> Result<RecordFilter> {
    Ok(RecordFilter {
        reserve_script_hash: parse_hash(
            "reconciler.reserve_script_hash",
            &config.reconciler.reserve_script_hash,
        )?,
        note_token_id: parse_hash("reconciler.note_token_id", &config.reconciler.note_token_id)?,
    })
}

/// Identity marker derived from the tracker key when none is configured
pub fn derive_tracker_id(key: &PublicKey) -> TrackerId {
    let mut hasher = Sha256::new();
    hasher.update(TRACKER_ID_TAG);
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

pub fn tracker_id(config: &BasisConfig, key: &PublicKey) -> Result<TrackerId> {
    match &config.tracker.tracker_id {
        Some(id) => parse_hash("tracker.tracker_id", id),
        None => Ok(derive_tracker_id(key)),
    }
}

/// Read the tracker key from `path`, generating and saving one if absent.
pub fn load_or_create_keypair(path: &Path) -> Result<Keypair> {
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypair: {}", path.display()))?;
        let keypair = Keypair::from_hex(contents.trim())
            .with_context(|| format!("Invalid keypair file: {}", path.display()))?;
        info!("Loaded tracker key from {}", path.display());
        return Ok(keypair);
    }

    warn!(
        "No tracker key at {}, generating a new one",
        path.display()
    );
    let keypair = Keypair::generate();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, hex::encode(keypair.secret_bytes()))
        .with_context(|| format!("Failed to write keypair: {}", path.display()))?;
    Ok(keypair)
}
