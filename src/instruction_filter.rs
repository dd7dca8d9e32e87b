//! Instruction filtering ahead of bundle packing.
//!
//! Three passes, in order:
//! - drop unwrap-WSOL instructions (the close happens downstream, outside the
//!   bundle),
//! - structural de-duplication, first occurrence wins,
//! - drop priority-fee instructions (the bundle tip supersedes them).
//!
//! All functions are pure; input order is preserved apart from removals.

use std::collections::HashSet;

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

/// SPL Token `CloseAccount` opcode. Closing a WSOL account is the unwrap.
const CLOSE_ACCOUNT_OPCODE: u8 = 9;

/// ComputeBudget `SetComputeUnitPrice` opcode.
const SET_COMPUTE_UNIT_PRICE_OPCODE: u8 = 3;

/// A WSOL unwrap is a token-program CloseAccount: 1-byte payload `9` and at
/// least account/destination/owner metas.
pub fn is_unwrap_wsol_instruction(ix: &Instruction) -> bool {
    ix.program_id == spl_token::id()
        && ix.data.len() == 1
        && ix.data[0] == CLOSE_ACCOUNT_OPCODE
        && ix.accounts.len() >= 3
}

pub fn is_priority_fee_instruction(ix: &Instruction) -> bool {
    ix.program_id == solana_sdk::compute_budget::id()
        && ix.data.first() == Some(&SET_COMPUTE_UNIT_PRICE_OPCODE)
}

/// Removes exact structural duplicates, keeping the first occurrence.
/// Identity is the full (program id, payload, account metas) triple.
pub fn deduplicate_instructions(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut seen: HashSet<(Pubkey, Vec<u8>, Vec<(Pubkey, bool, bool)>)> = HashSet::new();
    let mut deduped = Vec::with_capacity(instructions.len());

    for ix in instructions {
        let key = (
            ix.program_id,
            ix.data.clone(),
            ix.accounts
                .iter()
                .map(|meta| (meta.pubkey, meta.is_signer, meta.is_writable))
                .collect(),
        );
        if seen.insert(key) {
            deduped.push(ix);
        }
    }

    deduped
}

/// Full filter pipeline applied before a bundle is assembled.
pub fn filter_instructions(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let without_unwrap: Vec<Instruction> = instructions
        .into_iter()
        .filter(|ix| !is_unwrap_wsol_instruction(ix))
        .collect();

    deduplicate_instructions(without_unwrap)
        .into_iter()
        .filter(|ix| !is_priority_fee_instruction(ix))
        .collect()
}
