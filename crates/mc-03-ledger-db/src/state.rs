//! # Scratch State View
//!
//! A copy-on-read overlay over the wallet table. The producer runs its
//! execution pass against a view, discarding transactions that would
//! violate balance or nonce rules; validation of incoming blocks uses
//! the same rules, so both sides agree on what applies.
//!
//! Transfer rules:
//!
//! - the sender's balance must cover `amount + fee`
//! - the sender's nonce must be exactly `wallet.nonce + 1`, counting
//!   earlier transactions from the same sender in the same block
//! - transfers from the zero address mint (no debit, no nonce step)

use std::collections::HashMap;

use shared_types::{Address, Transaction, WalletAccount};

use crate::errors::LedgerError;
use crate::store::LedgerDb;

/// Overlay of pending wallet mutations on top of the ledger.
pub struct StateView<'a> {
    db: Option<&'a LedgerDb>,
    wallets: HashMap<Address, WalletAccount>,
}

impl<'a> StateView<'a> {
    /// A view reading through to `db`.
    pub fn over(db: &'a LedgerDb) -> Self {
        Self {
            db: Some(db),
            wallets: HashMap::new(),
        }
    }

    /// A detached view seeded with `accounts` (used by replay and tests).
    pub fn detached(accounts: impl IntoIterator<Item = WalletAccount>) -> Self {
        Self {
            db: None,
            wallets: accounts.into_iter().map(|a| (a.address, a)).collect(),
        }
    }

    /// Current account state, loading through to the ledger on first
    /// touch. Unknown accounts start empty.
    pub fn account(&mut self, address: &Address) -> Result<&mut WalletAccount, LedgerError> {
        if !self.wallets.contains_key(address) {
            let loaded = match self.db {
                Some(db) => db.get_wallet(address)?,
                None => None,
            };
            let account = loaded.unwrap_or(WalletAccount {
                address: *address,
                public_key: None,
                balance: 0,
                nonce: 0,
            });
            self.wallets.insert(*address, account);
        }
        // Present by construction.
        Ok(self
            .wallets
            .get_mut(address)
            .expect("account inserted above"))
    }

    /// Apply one transfer, mutating the overlay.
    ///
    /// # Errors
    ///
    /// `StateViolation` with the failing rule; the overlay is unchanged
    /// on error.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let minting = tx.from == Address::ZERO;

        if !minting {
            let sender = self.account(&tx.from)?;
            let cost = tx.cost();
            if sender.balance < cost {
                return Err(LedgerError::StateViolation {
                    address: tx.from.to_string(),
                    reason: format!("balance {} below cost {cost}", sender.balance),
                });
            }
            if tx.nonce != sender.nonce + 1 {
                return Err(LedgerError::StateViolation {
                    address: tx.from.to_string(),
                    reason: format!("nonce {} does not follow {}", tx.nonce, sender.nonce),
                });
            }
            sender.balance -= cost;
            sender.nonce = tx.nonce;
        }

        let recipient = self.account(&tx.to)?;
        recipient.balance = recipient.balance.saturating_add(tx.amount);
        Ok(())
    }

    /// Run a whole block's transactions, stopping at the first violation.
    pub fn apply_block_transactions(&mut self, txs: &[Transaction]) -> Result<(), LedgerError> {
        for tx in txs {
            self.apply_transaction(tx)?;
        }
        Ok(())
    }

    /// The touched accounts, ready for an atomic wallet upsert.
    pub fn into_accounts(self) -> Vec<WalletAccount> {
        self.wallets.into_values().collect()
    }

    /// Read-only peek at a touched account.
    pub fn touched(&self, address: &Address) -> Option<&WalletAccount> {
        self.wallets.get(address)
    }
}
