//! Account sizing for market roles.
//!
//! The exchange program rejects accounts whose length does not match its
//! layout, so sizes computed here must agree with it byte for byte.

use serde::{Deserialize, Serialize};

use crate::error::SdkError;
use crate::types::MarketRole;

/// Bytes added to every role for the account tag, flags and padding.
pub const HEADER_OVERHEAD: u64 = 12;

/// Largest account a program may allocate from inside an instruction.
///
/// Bigger accounts must be created by the client before initialization.
pub const MAX_PROGRAM_ALLOCATION: u64 = 10_240;

/// Length of a token account.
pub const TOKEN_ACCOUNT_LEN: u64 = 165;

/// Computes the byte size of an account for `role` holding `slots` entries.
///
/// # Errors
///
/// Returns `SdkError::InvalidCapacity` if `slots` is zero or the size
/// overflows.
pub fn size_for(role: MarketRole, slots: u64) -> Result<u64, SdkError> {
    let invalid = || SdkError::InvalidCapacity { role, slots };

    if slots == 0 {
        return Err(invalid());
    }

    slots
        .checked_mul(role.slot_size())
        .and_then(|data| data.checked_add(HEADER_OVERHEAD))
        .ok_or_else(invalid)
}

/// Slot counts for every market role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCapacity {
    /// Request queue slots.
    pub request_queue_slots: u64,

    /// Event queue slots.
    pub event_queue_slots: u64,

    /// Slots per book side.
    pub book_slots: u64,
}

impl Default for MarketCapacity {
    fn default() -> Self {
        Self {
            request_queue_slots: MarketRole::RequestQueue.default_slots(),
            event_queue_slots: MarketRole::EventQueue.default_slots(),
            book_slots: MarketRole::Bids.default_slots(),
        }
    }
}

impl MarketCapacity {
    /// Sets the request queue slot count.
    #[must_use]
    pub fn with_request_queue_slots(mut self, slots: u64) -> Self {
        self.request_queue_slots = slots;
        self
    }

    /// Sets the event queue slot count.
    #[must_use]
    pub fn with_event_queue_slots(mut self, slots: u64) -> Self {
        self.event_queue_slots = slots;
        self
    }

    /// Sets the slot count of each book side.
    #[must_use]
    pub fn with_book_slots(mut self, slots: u64) -> Self {
        self.book_slots = slots;
        self
    }

    /// Returns the slot count for a role.
    #[must_use]
    pub const fn slots_for(&self, role: MarketRole) -> u64 {
        match role {
            MarketRole::RequestQueue => self.request_queue_slots,
            MarketRole::EventQueue => self.event_queue_slots,
            MarketRole::Bids | MarketRole::Asks => self.book_slots,
            MarketRole::MarketState => 1,
        }
    }

    /// Returns the byte size for a role.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidCapacity` if the slot count is invalid.
    pub fn size_of(&self, role: MarketRole) -> Result<u64, SdkError> {
        size_for(role, self.slots_for(role))
    }

    /// Returns true if the client must create the account for `role`.
    ///
    /// The initialize instruction only allocates roles at their default
    /// layout and within [`MAX_PROGRAM_ALLOCATION`]. Anything larger or
    /// resized has to exist before initialization.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidCapacity` if the slot count is invalid.
    pub fn is_client_provisioned(&self, role: MarketRole) -> Result<bool, SdkError> {
        let size = self.size_of(role)?;
        Ok(size > MAX_PROGRAM_ALLOCATION || self.slots_for(role) != role.default_slots())
    }

    /// Returns the roles the client must create, in program order.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidCapacity` if any slot count is invalid.
    pub fn client_provisioned_roles(&self) -> Result<Vec<MarketRole>, SdkError> {
        let mut roles = Vec::new();
        for role in MarketRole::ALL {
            if self.is_client_provisioned(role)? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    /// Validates every slot count.
    ///
    /// # Errors
    ///
    /// Returns the first `SdkError::InvalidCapacity` found.
    pub fn validate(&self) -> Result<(), SdkError> {
        for role in MarketRole::ALL {
            self.size_of(role)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_for_matches_slot_formula() {
        for role in MarketRole::ALL {
            for slots in [1_u64, 2, 7, 64, 1024, 4096] {
                let size = size_for(role, slots).expect("valid size");
                assert_eq!(size, slots * role.slot_size() + 12);
            }
        }
    }

    #[test]
    fn test_size_for_zero_slots() {
        for role in MarketRole::ALL {
            assert_eq!(
                size_for(role, 0),
                Err(SdkError::InvalidCapacity { role, slots: 0 })
            );
        }
    }

    #[test]
    fn test_size_for_overflow() {
        let result = size_for(MarketRole::EventQueue, u64::MAX);
        assert!(matches!(result, Err(SdkError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_default_sizes() {
        let capacity = MarketCapacity::default();
        assert_eq!(capacity.size_of(MarketRole::RequestQueue), Ok(5120 + 12));
        assert_eq!(capacity.size_of(MarketRole::EventQueue), Ok(262_144 + 12));
        assert_eq!(capacity.size_of(MarketRole::Bids), Ok(65_536 + 12));
        assert_eq!(capacity.size_of(MarketRole::Asks), Ok(65_536 + 12));
        assert_eq!(capacity.size_of(MarketRole::MarketState), Ok(376 + 12));
    }

    #[test]
    fn test_default_client_provisioned_roles() {
        let roles = MarketCapacity::default()
            .client_provisioned_roles()
            .expect("roles");
        assert_eq!(
            roles,
            vec![MarketRole::EventQueue, MarketRole::Bids, MarketRole::Asks]
        );
    }

    #[test]
    fn test_resized_request_queue_is_client_provisioned() {
        let capacity = MarketCapacity::default().with_request_queue_slots(32);
        let roles = capacity.client_provisioned_roles().expect("roles");
        assert_eq!(
            roles,
            vec![
                MarketRole::RequestQueue,
                MarketRole::EventQueue,
                MarketRole::Bids,
                MarketRole::Asks
            ]
        );
    }

    #[test]
    fn test_program_allocation_limit() {
        let capacity = MarketCapacity::default();
        let request_queue = capacity.size_of(MarketRole::RequestQueue).expect("size");
        assert!(request_queue <= MAX_PROGRAM_ALLOCATION);
        assert!(!capacity
            .is_client_provisioned(MarketRole::RequestQueue)
            .expect("valid"));
        assert!(!capacity
            .is_client_provisioned(MarketRole::MarketState)
            .expect("valid"));
    }

    #[test]
    fn test_capacity_validate() {
        assert!(MarketCapacity::default().validate().is_ok());
        let capacity = MarketCapacity::default().with_request_queue_slots(0);
        assert!(capacity.validate().is_err());
    }
}
