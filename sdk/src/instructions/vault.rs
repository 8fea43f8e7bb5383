//! Vault signer derivation.
//!
//! The market wallets are owned by a program address derived from the
//! market header and a nonce.

use solana_sdk::pubkey::Pubkey;

use crate::error::SdkError;

/// Derives the vault signer for a given nonce.
///
/// Seeds: `[market_state, nonce.to_le_bytes()]`
///
/// # Errors
///
/// Returns an error if the seeds land on the ed25519 curve.
pub fn vault_signer_address(
    market_state: &Pubkey,
    nonce: u64,
    program_id: &Pubkey,
) -> Result<Pubkey, SdkError> {
    let nonce_bytes = nonce.to_le_bytes();
    Pubkey::create_program_address(&[market_state.as_ref(), &nonce_bytes], program_id)
        .map_err(|e| SdkError::InvalidAddress(e.to_string()))
}

/// Finds the first nonce in `0..=255` that yields a valid vault signer.
///
/// # Errors
///
/// Returns `SdkError::NonceNotFound` if no nonce works.
pub fn find_vault_signer(
    market_state: &Pubkey,
    program_id: &Pubkey,
) -> Result<(Pubkey, u64), SdkError> {
    (0..=255_u64)
        .find_map(|nonce| {
            vault_signer_address(market_state, nonce, program_id)
                .ok()
                .map(|address| (address, nonce))
        })
        .ok_or(SdkError::NonceNotFound)
}
