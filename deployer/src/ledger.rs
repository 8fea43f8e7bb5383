//! In-memory execution environment.
//!
//! `LocalLedger` executes bootstrap transactions against an in-process
//! account map and runs the exchange program's initialize instruction. Every
//! transaction is staged on a copy of the account map and committed in one
//! step, so a rejected transaction leaves no trace.
//!
//! Faults can be injected to rehearse failure paths: rejecting the Nth
//! operation of the next transaction, withholding its confirmation (with or
//! without applying it) and refusing the next N sends.

use std::collections::{HashMap, HashSet};

use marketdeploy_sdk::instructions::initialize_market::{
    account_index, INITIALIZE_ACCOUNT_COUNT,
};
use marketdeploy_sdk::instructions::{find_vault_signer, InitializeMarketArgs, TOKEN_PROGRAM_ID};
use marketdeploy_sdk::sizing::{MAX_PROGRAM_ALLOCATION, TOKEN_ACCOUNT_LEN};
use marketdeploy_sdk::types::state::{is_zeroed, write_flags};
use marketdeploy_sdk::{
    size_for, InitializedEvent, MarketAccounts, MarketParameters, MarketRole, MarketStateRecord,
    HEADER_OVERHEAD,
};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::builder::{BuiltTransaction, CreateAccount, Operation};
use super::environment::{
    AccountSnapshot, EnvironmentError, ExecutionEnvironment, RejectReason, RentEstimator,
    Submission, TransactionOutcome,
};
use super::notifier::{InitializationNotifier, Listener, ListenerId, ProgramLog};

/// Length of a token mint account.
pub const MINT_LEN: u64 = 82;

/// Bytes charged for every account on top of its data.
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

/// Rent rate in lamports per byte-year.
const LAMPORTS_PER_BYTE_YEAR: u64 = 3_480;

/// Years of rent an account must hold to be exempt.
const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Returns the rent-exempt minimum for an account of `byte_size` bytes.
#[must_use]
pub const fn rent_exempt_minimum(byte_size: u64) -> u64 {
    ACCOUNT_STORAGE_OVERHEAD
        .saturating_add(byte_size)
        .saturating_mul(LAMPORTS_PER_BYTE_YEAR)
        .saturating_mul(EXEMPTION_THRESHOLD_YEARS)
}

type Accounts = HashMap<Pubkey, AccountSnapshot>;

#[derive(Debug, Default)]
struct Faults {
    /// 1-based operation index to reject in the next transaction.
    reject_operation: Option<usize>,
    /// Withhold the next confirmation; `true` still applies the transaction.
    withhold_confirmation: Option<bool>,
    /// Sends to refuse before accepting again.
    outage_calls: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: Accounts,
    slot: u64,
    transactions: u64,
    faults: Faults,
    /// Sender of the withheld confirmation, replaced by the next one.
    withheld: Option<oneshot::Sender<TransactionOutcome>>,
}

impl LedgerState {
    fn take_outage(&mut self) -> Result<(), EnvironmentError> {
        if self.faults.outage_calls > 0 {
            self.faults.outage_calls -= 1;
            return Err(EnvironmentError::Unavailable(
                "local ledger outage".to_string(),
            ));
        }
        Ok(())
    }

    fn next_signature(&mut self, seed: &Pubkey) -> String {
        self.transactions += 1;
        let mut bytes = [0u8; 64];
        let (counter, rest) = bytes.split_at_mut(8);
        counter.copy_from_slice(&self.transactions.to_le_bytes());
        let (key, _) = rest.split_at_mut(32);
        key.copy_from_slice(seed.as_ref());
        bs58::encode(bytes).into_string()
    }
}

/// In-memory ledger with a built-in exchange program.
#[derive(Debug)]
pub struct LocalLedger {
    exchange_program: Pubkey,
    state: Mutex<LedgerState>,
    notifier: InitializationNotifier,
}

impl LocalLedger {
    /// Creates an empty ledger whose exchange program lives at
    /// `exchange_program`.
    #[must_use]
    pub fn new(exchange_program: Pubkey) -> Self {
        Self {
            exchange_program,
            state: Mutex::new(LedgerState::default()),
            notifier: InitializationNotifier::new(),
        }
    }

    /// Returns the exchange program id.
    #[must_use]
    pub const fn exchange_program(&self) -> &Pubkey {
        &self.exchange_program
    }

    /// Credits lamports to an address, creating a system account if needed.
    pub async fn airdrop(&self, address: &Pubkey, lamports: u64) {
        let mut state = self.state.lock().await;
        credit(&mut state.accounts, address, lamports);
    }

    /// Creates a token mint at `address`.
    pub async fn create_mint(&self, address: &Pubkey) {
        let mut state = self.state.lock().await;
        state.accounts.insert(
            *address,
            AccountSnapshot {
                lamports: rent_exempt_minimum(MINT_LEN),
                owner: TOKEN_PROGRAM_ID,
                data: vec![0u8; MINT_LEN as usize],
            },
        );
    }

    /// Returns the number of accounts on the ledger.
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    /// Returns the number of transactions accepted for processing.
    pub async fn transaction_count(&self) -> u64 {
        self.state.lock().await.transactions
    }

    /// Returns the current slot.
    pub async fn slot(&self) -> u64 {
        self.state.lock().await.slot
    }

    /// Returns the number of registered event listeners.
    pub async fn listener_count(&self) -> usize {
        self.notifier.listener_count().await
    }

    /// Rejects operation `index` (1-based) of the next transaction.
    pub async fn inject_reject_operation(&self, index: usize) {
        self.state.lock().await.faults.reject_operation = Some(index);
    }

    /// Never confirms the next transaction.
    ///
    /// With `apply` the transaction still takes effect, without it the
    /// transaction is discarded.
    pub async fn inject_withheld_confirmation(&self, apply: bool) {
        self.state.lock().await.faults.withhold_confirmation = Some(apply);
    }

    /// Refuses the next `calls` sends.
    pub async fn inject_outage(&self, calls: u32) {
        self.state.lock().await.faults.outage_calls = calls;
    }

    fn execute(
        &self,
        accounts: &Accounts,
        tx: &BuiltTransaction,
        signed: &HashSet<Pubkey>,
        reject_at: Option<usize>,
    ) -> Result<(Accounts, Vec<Vec<u8>>), RejectReason> {
        if let Some(missing) = tx.required_signers.iter().find(|k| !signed.contains(*k)) {
            return Err(RejectReason::MissingSignature(*missing));
        }

        let mut staged = accounts.clone();
        debit(&mut staged, &tx.fee_payer, tx.fee())?;

        let mut logs = Vec::new();
        for (position, op) in tx.operations.iter().enumerate() {
            if reject_at == Some(position + 1) {
                return Err(RejectReason::InvalidInstruction(format!(
                    "injected failure at operation {}",
                    position + 1
                )));
            }

            match op {
                Operation::CreateAccount(create) => create_account(&mut staged, create, signed)?,
                Operation::Invoke(ix) => logs.push(self.invoke(&mut staged, ix, signed)?),
            }
        }

        Ok((staged, logs))
    }

    fn invoke(
        &self,
        accounts: &mut Accounts,
        ix: &Instruction,
        signed: &HashSet<Pubkey>,
    ) -> Result<Vec<u8>, RejectReason> {
        if ix.program_id != self.exchange_program {
            return Err(RejectReason::InvalidInstruction(format!(
                "unknown program {}",
                ix.program_id
            )));
        }
        self.initialize_market(accounts, ix, signed)
    }

    /// Exchange program: initialize a market.
    fn initialize_market(
        &self,
        accounts: &mut Accounts,
        ix: &Instruction,
        signed: &HashSet<Pubkey>,
    ) -> Result<Vec<u8>, RejectReason> {
        if ix.accounts.len() < INITIALIZE_ACCOUNT_COUNT {
            return Err(RejectReason::InvalidInstruction(format!(
                "expected {} accounts, got {}",
                INITIALIZE_ACCOUNT_COUNT,
                ix.accounts.len()
            )));
        }
        let args = InitializeMarketArgs::unpack(&ix.data)
            .map_err(|e| RejectReason::InvalidInstruction(e.to_string()))?;

        let key = |index: usize| {
            ix.accounts
                .get(index)
                .map(|meta| meta.pubkey)
                .ok_or_else(|| RejectReason::InvalidInstruction(format!("no account {index}")))
        };

        for index in [
            account_index::OWNER,
            account_index::MARKET_STATE,
            account_index::REQUEST_QUEUE,
            account_index::EVENT_QUEUE,
            account_index::BIDS,
            account_index::ASKS,
            account_index::COIN_WALLET,
            account_index::PRICE_WALLET,
        ] {
            let signer_ok = ix
                .accounts
                .get(index)
                .is_some_and(|meta| meta.is_signer && signed.contains(&meta.pubkey));
            if !signer_ok {
                return Err(RejectReason::MissingSignature(key(index)?));
            }
        }

        let owner = key(account_index::OWNER)?;
        let params = MarketParameters {
            coin_mint: key(account_index::COIN_MINT)?,
            price_mint: key(account_index::PRICE_MINT)?,
            coin_lot_size: args.coin_lot_size,
            pc_lot_size: args.pc_lot_size,
            pc_dust_threshold: args.pc_dust_threshold,
        };
        let market = MarketAccounts {
            market_state: key(account_index::MARKET_STATE)?,
            request_queue: key(account_index::REQUEST_QUEUE)?,
            event_queue: key(account_index::EVENT_QUEUE)?,
            bids: key(account_index::BIDS)?,
            asks: key(account_index::ASKS)?,
            coin_wallet: key(account_index::COIN_WALLET)?,
            price_wallet: key(account_index::PRICE_WALLET)?,
        };

        if params.coin_mint == params.price_mint {
            return Err(RejectReason::MatchingMints);
        }
        if params.coin_lot_size == 0 || params.pc_lot_size == 0 {
            return Err(RejectReason::InvalidInstruction(
                "lot sizes must be non-zero".to_string(),
            ));
        }

        if let Some(existing) = accounts.get(&market.market_state) {
            if !is_zeroed(&existing.data) {
                return Err(RejectReason::AlreadyInitialized(market.market_state));
            }
        }

        for mint in [params.coin_mint, params.price_mint] {
            match accounts.get(&mint) {
                None => return Err(RejectReason::MissingAccount(mint)),
                Some(account) if account.owner != TOKEN_PROGRAM_ID => {
                    return Err(RejectReason::InvalidAccountOwner(mint))
                }
                Some(_) => {}
            }
        }

        let mut rent_due = 0u64;

        for role in MarketRole::ALL {
            let address = market.address_of(role);
            if let Some(existing) = accounts.get(&address) {
                self.check_role_account(role, address, existing)?;
                continue;
            }

            let size = size_for(role, role.default_slots())
                .map_err(|e| RejectReason::InvalidInstruction(e.to_string()))?;
            if size > MAX_PROGRAM_ALLOCATION {
                return Err(RejectReason::MissingAccount(address));
            }

            let lamports = rent_exempt_minimum(size);
            rent_due = rent_due.saturating_add(lamports);
            accounts.insert(
                address,
                AccountSnapshot {
                    lamports,
                    owner: self.exchange_program,
                    data: zeroed(size)?,
                },
            );
        }

        let (vault_signer, nonce) = find_vault_signer(&market.market_state, &self.exchange_program)
            .map_err(|e| RejectReason::InvalidInstruction(e.to_string()))?;

        for (wallet, mint) in [
            (market.coin_wallet, params.coin_mint),
            (market.price_wallet, params.price_mint),
        ] {
            if accounts.contains_key(&wallet) {
                return Err(RejectReason::AccountAlreadyInUse(wallet));
            }

            let lamports = rent_exempt_minimum(TOKEN_ACCOUNT_LEN);
            rent_due = rent_due.saturating_add(lamports);
            accounts.insert(
                wallet,
                AccountSnapshot {
                    lamports,
                    owner: TOKEN_PROGRAM_ID,
                    data: token_account_data(&mint, &vault_signer)?,
                },
            );
        }

        debit(accounts, &owner, rent_due)?;

        for role in MarketRole::ALL {
            let address = market.address_of(role);
            let account = accounts
                .get_mut(&address)
                .ok_or(RejectReason::MissingAccount(address))?;

            let written = match role {
                MarketRole::MarketState => {
                    MarketStateRecord::new(&params, &market, nonce).pack(&mut account.data)
                }
                _ => write_flags(&mut account.data, role),
            };
            written.map_err(|e| RejectReason::InvalidInstruction(e.to_string()))?;
        }

        debug!(
            "Exchange program initialized market {} (vault signer {}, nonce {})",
            market.market_state, vault_signer, nonce
        );

        InitializedEvent {
            coin_mint: params.coin_mint,
            price_mint: params.price_mint,
        }
        .to_log_data()
        .map_err(|e| RejectReason::InvalidInstruction(e.to_string()))
    }

    fn check_role_account(
        &self,
        role: MarketRole,
        address: Pubkey,
        account: &AccountSnapshot,
    ) -> Result<(), RejectReason> {
        if account.owner != self.exchange_program {
            return Err(RejectReason::InvalidAccountOwner(address));
        }
        if !is_zeroed(&account.data) {
            return Err(RejectReason::AlreadyInitialized(address));
        }

        let len = account.len();
        let aligned = match role {
            MarketRole::MarketState => size_for(role, 1).is_ok_and(|size| size == len),
            _ => {
                len >= HEADER_OVERHEAD + role.slot_size()
                    && (len - HEADER_OVERHEAD) % role.slot_size() == 0
            }
        };
        if !aligned {
            return Err(RejectReason::InvalidAccountSize { address, len });
        }
        Ok(())
    }
}

fn credit(accounts: &mut Accounts, address: &Pubkey, lamports: u64) {
    let account = accounts.entry(*address).or_insert_with(|| AccountSnapshot {
        lamports: 0,
        owner: marketdeploy_sdk::instructions::SYSTEM_PROGRAM_ID,
        data: Vec::new(),
    });
    account.lamports = account.lamports.saturating_add(lamports);
}

fn debit(accounts: &mut Accounts, address: &Pubkey, lamports: u64) -> Result<(), RejectReason> {
    if lamports == 0 {
        return Ok(());
    }

    let available = accounts.get(address).map_or(0, |account| account.lamports);
    if available < lamports {
        return Err(RejectReason::InsufficientFunds {
            needed: lamports,
            available,
        });
    }

    if let Some(account) = accounts.get_mut(address) {
        account.lamports = available - lamports;
    }
    Ok(())
}

fn create_account(
    accounts: &mut Accounts,
    create: &CreateAccount,
    signed: &HashSet<Pubkey>,
) -> Result<(), RejectReason> {
    if !signed.contains(&create.address) {
        return Err(RejectReason::MissingSignature(create.address));
    }
    if accounts.contains_key(&create.address) {
        return Err(RejectReason::AccountAlreadyInUse(create.address));
    }
    if create.lamports < rent_exempt_minimum(create.space) {
        return Err(RejectReason::InvalidInstruction(format!(
            "account {} funded below rent-exempt minimum",
            create.address
        )));
    }

    debit(accounts, &create.payer, create.lamports)?;
    accounts.insert(
        create.address,
        AccountSnapshot {
            lamports: create.lamports,
            owner: create.owner,
            data: zeroed(create.space)?,
        },
    );
    Ok(())
}

fn zeroed(len: u64) -> Result<Vec<u8>, RejectReason> {
    let len = usize::try_from(len)
        .map_err(|_| RejectReason::InvalidInstruction(format!("account size {len} too large")))?;
    Ok(vec![0u8; len])
}

/// Token account data: mint, then authority, then zeroed balance fields.
fn token_account_data(mint: &Pubkey, authority: &Pubkey) -> Result<Vec<u8>, RejectReason> {
    let mut data = zeroed(TOKEN_ACCOUNT_LEN)?;
    let (mint_bytes, rest) = data.split_at_mut(32);
    mint_bytes.copy_from_slice(mint.as_ref());
    let (authority_bytes, _) = rest.split_at_mut(32);
    authority_bytes.copy_from_slice(authority.as_ref());
    Ok(data)
}

impl RentEstimator for LocalLedger {
    async fn minimum_balance(&self, byte_size: u64) -> Result<u64, EnvironmentError> {
        Ok(rent_exempt_minimum(byte_size))
    }
}

impl ExecutionEnvironment for LocalLedger {
    async fn balance(&self, address: &Pubkey) -> Result<u64, EnvironmentError> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(address).map_or(0, |account| account.lamports))
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, EnvironmentError> {
        Ok(self.state.lock().await.accounts.get(address).cloned())
    }

    async fn send_transaction(
        &self,
        tx: &BuiltTransaction,
        signers: &[&Keypair],
    ) -> Result<Submission, EnvironmentError> {
        let (sender, confirmation) = oneshot::channel();
        let signed: HashSet<Pubkey> = signers.iter().map(|k| k.pubkey()).collect();

        let mut state = self.state.lock().await;
        state.take_outage()?;

        let signature = state.next_signature(&tx.fee_payer);
        let reject_at = state.faults.reject_operation.take();
        let withhold = state.faults.withhold_confirmation.take();
        let slot = state.slot + 1;

        let (outcome, logs) = match self.execute(&state.accounts, tx, &signed, reject_at) {
            Ok((accounts, logs)) => {
                if withhold.unwrap_or(true) {
                    state.accounts = accounts;
                    state.slot = slot;
                    (TransactionOutcome::Confirmed { slot }, logs)
                } else {
                    (TransactionOutcome::Confirmed { slot }, Vec::new())
                }
            }
            Err(reason) => {
                debug!("Transaction {} rejected: {}", signature, reason);
                (TransactionOutcome::Rejected(reason), Vec::new())
            }
        };

        let sender = if withhold.is_some() {
            warn!("Withholding confirmation of {}", signature);
            state.withheld = Some(sender);
            None
        } else {
            Some(sender)
        };
        drop(state);

        for data in logs {
            let log = ProgramLog {
                signature: signature.clone(),
                slot,
                data,
            };
            self.notifier.publish(&log).await;
        }

        if let Some(sender) = sender {
            // The receiver may already be gone; the outcome is recorded either way.
            let _ = sender.send(outcome);
        }

        Ok(Submission {
            signature,
            confirmation,
        })
    }

    async fn request_funding(
        &self,
        address: &Pubkey,
        lamports: u64,
    ) -> Result<Submission, EnvironmentError> {
        let (sender, confirmation) = oneshot::channel();

        let mut state = self.state.lock().await;
        state.take_outage()?;

        let signature = state.next_signature(address);
        state.slot += 1;
        let slot = state.slot;
        credit(&mut state.accounts, address, lamports);
        drop(state);

        let _ = sender.send(TransactionOutcome::Confirmed { slot });
        Ok(Submission {
            signature,
            confirmation,
        })
    }

    async fn subscribe(&self) -> Result<Listener, EnvironmentError> {
        Ok(self.notifier.subscribe().await)
    }

    async fn unsubscribe(&self, id: ListenerId) -> Result<(), EnvironmentError> {
        if !self.notifier.unsubscribe(id).await {
            debug!("Listener {} was not registered", id);
        }
        Ok(())
    }
}
