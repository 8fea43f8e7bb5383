//! Transaction building for the deployer.
//!
//! Builds the account-creation batch and the initialize transaction.

use marketdeploy_sdk::instructions::{required_signers, InitializeMarketBuilder};
use marketdeploy_sdk::{MarketAccounts, MarketParameters};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use super::error::DeployError;
use super::provisioner::AccountSpec;

/// Base fee per signature in lamports.
pub const FEE_PER_SIGNATURE: u64 = 5000;

/// System-program account creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccount {
    /// Funding account.
    pub payer: Pubkey,
    /// New account address.
    pub address: Pubkey,
    /// Lamports transferred to the new account.
    pub lamports: u64,
    /// Data length in bytes.
    pub space: u64,
    /// Program that will own the account.
    pub owner: Pubkey,
}

/// One operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create and fund an account.
    CreateAccount(CreateAccount),
    /// Invoke a program instruction.
    Invoke(Instruction),
}

/// What a transaction is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Phase 1 account batch.
    Provision,
    /// Phase 2 initialize instruction.
    Initialize,
}

/// A built transaction ready for submission.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// Transaction purpose.
    pub kind: TransactionKind,

    /// Account paying the fees.
    pub fee_payer: Pubkey,

    /// Operations, applied in order and atomically.
    pub operations: Vec<Operation>,

    /// Addresses whose signatures are required, fee payer first.
    pub required_signers: Vec<Pubkey>,
}

impl BuiltTransaction {
    /// Returns the number of signatures.
    #[must_use]
    pub fn signature_count(&self) -> u64 {
        self.required_signers.len() as u64
    }

    /// Returns the transaction fee.
    #[must_use]
    pub fn fee(&self) -> u64 {
        FEE_PER_SIGNATURE.saturating_mul(self.signature_count())
    }

    /// Returns the lamports moved into new accounts by this transaction.
    #[must_use]
    pub fn lamports_committed(&self) -> u64 {
        self.operations
            .iter()
            .map(|op| match op {
                Operation::CreateAccount(create) => create.lamports,
                Operation::Invoke(_) => 0,
            })
            .fold(0, u64::saturating_add)
    }

    /// Returns the estimated cost to the fee payer.
    #[must_use]
    pub fn estimated_cost(&self) -> u64 {
        self.fee().saturating_add(self.lamports_committed())
    }
}

/// Transaction builder for bootstrap operations.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    /// Program receiving the initialize instruction.
    program_id: Pubkey,

    /// Program that owns the market accounts.
    exchange_program: Pubkey,
}

impl TransactionBuilder {
    /// Creates a new transaction builder.
    #[must_use]
    pub fn new(program_id: Pubkey, exchange_program: Pubkey) -> Self {
        Self {
            program_id,
            exchange_program,
        }
    }

    /// Returns the exchange program.
    #[must_use]
    pub const fn exchange_program(&self) -> &Pubkey {
        &self.exchange_program
    }

    /// Builds one batch creating every account in `specs`.
    ///
    /// # Arguments
    ///
    /// * `payer` - Owner funding the accounts
    /// * `specs` - Account specs paired with the fresh address for each
    #[must_use]
    pub fn build_create_accounts(
        &self,
        payer: Pubkey,
        specs: &[(AccountSpec, Pubkey)],
    ) -> BuiltTransaction {
        let mut required_signers = Vec::with_capacity(specs.len() + 1);
        required_signers.push(payer);

        let operations = specs
            .iter()
            .map(|(spec, address)| {
                required_signers.push(*address);
                Operation::CreateAccount(CreateAccount {
                    payer,
                    address: *address,
                    lamports: spec.required_balance,
                    space: spec.byte_size,
                    owner: spec.owning_program,
                })
            })
            .collect();

        BuiltTransaction {
            kind: TransactionKind::Provision,
            fee_payer: payer,
            operations,
            required_signers,
        }
    }

    /// Builds the initialize transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn build_initialize(
        &self,
        owner: Pubkey,
        params: &MarketParameters,
        accounts: &MarketAccounts,
    ) -> Result<BuiltTransaction, DeployError> {
        let ix = InitializeMarketBuilder::new(self.program_id, self.exchange_program)
            .owner(owner)
            .params(*params)
            .accounts(*accounts)
            .build()?;

        Ok(BuiltTransaction {
            kind: TransactionKind::Initialize,
            fee_payer: owner,
            required_signers: required_signers(&ix),
            operations: vec![Operation::Invoke(ix)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketdeploy_sdk::MarketRole;

    fn spec(role: MarketRole, byte_size: u64, required_balance: u64, owner: Pubkey) -> AccountSpec {
        AccountSpec {
            role,
            byte_size,
            required_balance,
            owning_program: owner,
        }
    }

    #[test]
    fn test_build_create_accounts() {
        let exchange = Pubkey::new_unique();
        let builder = TransactionBuilder::new(exchange, exchange);
        let payer = Pubkey::new_unique();
        let bids = Pubkey::new_unique();
        let asks = Pubkey::new_unique();

        let tx = builder.build_create_accounts(
            payer,
            &[
                (spec(MarketRole::Bids, 65_548, 100, exchange), bids),
                (spec(MarketRole::Asks, 65_548, 100, exchange), asks),
            ],
        );

        assert_eq!(tx.kind, TransactionKind::Provision);
        assert_eq!(tx.operations.len(), 2);
        assert_eq!(tx.required_signers, vec![payer, bids, asks]);
        assert_eq!(tx.lamports_committed(), 200);
        assert_eq!(tx.fee(), 15_000);
        assert_eq!(tx.estimated_cost(), 15_200);

        match &tx.operations[0] {
            Operation::CreateAccount(create) => {
                assert_eq!(create.address, bids);
                assert_eq!(create.space, 65_548);
                assert_eq!(create.owner, exchange);
            }
            Operation::Invoke(_) => panic!("expected create account"),
        }
    }

    #[test]
    fn test_build_initialize() {
        let exchange = Pubkey::new_unique();
        let builder = TransactionBuilder::new(exchange, exchange);
        let owner = Pubkey::new_unique();
        let params = MarketParameters::new(Pubkey::new_unique(), Pubkey::new_unique());
        let accounts = MarketAccounts {
            market_state: Pubkey::new_unique(),
            request_queue: Pubkey::new_unique(),
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            coin_wallet: Pubkey::new_unique(),
            price_wallet: Pubkey::new_unique(),
        };

        let tx = builder
            .build_initialize(owner, &params, &accounts)
            .expect("build");

        assert_eq!(tx.kind, TransactionKind::Initialize);
        assert_eq!(tx.fee_payer, owner);
        assert_eq!(tx.signature_count(), 8);
        assert_eq!(tx.lamports_committed(), 0);
    }

    #[test]
    fn test_build_initialize_matching_mints() {
        let exchange = Pubkey::new_unique();
        let builder = TransactionBuilder::new(exchange, exchange);
        let mint = Pubkey::new_unique();
        let accounts = MarketAccounts {
            market_state: Pubkey::new_unique(),
            request_queue: Pubkey::new_unique(),
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            coin_wallet: Pubkey::new_unique(),
            price_wallet: Pubkey::new_unique(),
        };

        let result = builder.build_initialize(
            Pubkey::new_unique(),
            &MarketParameters::new(mint, mint),
            &accounts,
        );
        assert_eq!(result.err(), Some(DeployError::MatchingMints));
    }
}
