//! Post-submission confirmation.
//!
//! Thin adapter over the ledger capability: waits for the primary signature
//! until it lands, fails, or the anchor expires. An execution error and an
//! expired anchor are both non-landed outcomes, not faults; only transport
//! failures propagate as errors.

use std::sync::Arc;

use anyhow::Result;
use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use tracing::{info, warn};

use crate::rpc::{LedgerClient, LedgerError};
use crate::types::{AnchorContext, ConfirmationOutcome, ConfirmationStatus};

pub struct ConfirmationWaiter {
    ledger: Arc<dyn LedgerClient>,
    commitment: CommitmentConfig,
}

impl ConfirmationWaiter {
    pub fn new(ledger: Arc<dyn LedgerClient>, commitment: CommitmentConfig) -> Self {
        Self { ledger, commitment }
    }

    pub async fn confirm(
        &self,
        signature: Signature,
        anchor: &AnchorContext,
    ) -> Result<ConfirmationOutcome> {
        let status = match self
            .ledger
            .await_confirmation(&signature, anchor, self.commitment)
            .await
        {
            Ok(None) => {
                info!(sig = %signature, "transaction landed");
                ConfirmationStatus::Landed
            }
            Ok(Some(err)) => {
                warn!(sig = %signature, error = %err, "transaction executed with error");
                ConfirmationStatus::Failed(err)
            }
            Err(LedgerError::Expired(height)) => {
                warn!(sig = %signature, expiry_height = height, "anchor expired before inclusion");
                ConfirmationStatus::Expired
            }
            Err(e @ LedgerError::Rpc(_)) => return Err(e.into()),
        };

        Ok(ConfirmationOutcome { signature, status })
    }
}
