use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, signature::Signature};

/// A recent blockhash together with the block height at which the ledger
/// stops accepting transactions that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorContext {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Tip-floor percentile used when quoting a tip amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipTier {
    P95,
    P99,
}

impl Default for TipTier {
    fn default() -> Self {
        TipTier::P95
    }
}

/// Terminal state of a submitted transaction as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Included and executed without error.
    Landed,
    /// Included but the ledger reported an execution error.
    Failed(String),
    /// Not seen before the anchor's expiry height. The bundle was likely
    /// dropped by the relay; this is an expected outcome, not a fault.
    Expired,
}

#[derive(Debug, Clone)]
pub struct ConfirmationOutcome {
    pub signature: Signature,
    pub status: ConfirmationStatus,
}

impl ConfirmationOutcome {
    pub fn landed(&self) -> bool {
        matches!(self.status, ConfirmationStatus::Landed)
    }
}

/// Result of a successful bundle submission, attempts included.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    /// Relay acknowledgement (bundle id).
    pub bundle_id: String,
    /// Total attempts spent, including the successful one.
    pub attempts: u32,
    pub confirmation: ConfirmationOutcome,
}

/// Clone-able cancellation flag. Checked between submission attempts, never
/// mid network call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());

        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
