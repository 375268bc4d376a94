use crate::{RejectReason, ReserveState, VerifierConfig};

/// Anyone may add value to a reserve. Returns the amount added.
pub fn verify_top_up(
    prior: &ReserveState,
    proposed: &ReserveState,
    config: &VerifierConfig,
) -> Result<u64, RejectReason> {
    prior.check_identity_unchanged(proposed)?;
    if prior.redeemed_digest != proposed.redeemed_digest {
        return Err(RejectReason::FieldChanged("redeemed_digest"));
    }

    let added = proposed.balance.saturating_sub(prior.balance);
    if added == 0 || added < config.min_top_up {
        return Err(RejectReason::TopUpTooSmall {
            amount: added,
            minimum: config.min_top_up,
        });
    }
    Ok(added)
}
