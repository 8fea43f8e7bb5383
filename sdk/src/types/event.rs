//! Events emitted by the exchange program.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::SdkError;

/// Discriminator prefixed to `InitializedEvent` log data.
pub const INITIALIZED_EVENT_DISCRIMINATOR: [u8; 8] = [136, 202, 63, 120, 152, 146, 41, 79];

/// Emitted once a market has been initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializedEvent {
    /// Base asset mint.
    pub coin_mint: Pubkey,
    /// Quote asset mint.
    pub price_mint: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct InitializedEventBody {
    coin_mint: [u8; 32],
    price_mint: [u8; 32],
}

impl InitializedEvent {
    /// Encodes the event as program log data.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_log_data(&self) -> Result<Vec<u8>, SdkError> {
        let body = InitializedEventBody {
            coin_mint: self.coin_mint.to_bytes(),
            price_mint: self.price_mint.to_bytes(),
        };

        let mut data = INITIALIZED_EVENT_DISCRIMINATOR.to_vec();
        data.extend(borsh::to_vec(&body).map_err(|e| SdkError::Serialization(e.to_string()))?);
        Ok(data)
    }

    /// Decodes program log data.
    ///
    /// Returns `None` if the data belongs to another event.
    ///
    /// # Errors
    ///
    /// Returns an error if the discriminator matches but the body is malformed.
    pub fn from_log_data(data: &[u8]) -> Result<Option<Self>, SdkError> {
        let Some(body) = data.strip_prefix(INITIALIZED_EVENT_DISCRIMINATOR.as_slice()) else {
            return Ok(None);
        };

        let body = InitializedEventBody::try_from_slice(body)
            .map_err(|e| SdkError::Deserialization(e.to_string()))?;

        Ok(Some(Self {
            coin_mint: Pubkey::new_from_array(body.coin_mint),
            price_mint: Pubkey::new_from_array(body.price_mint),
        }))
    }
}
