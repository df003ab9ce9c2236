//! Bank directory: users, cards and transactions
//!
//! The directory is the system of record for banking data. Every card and
//! transaction lookup is scoped to an `AuthenticatedIdentity`.

use crate::models::{AuthenticatedIdentity, CardRecord, TransactionRecord, UserRecord};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod fixtures;
pub mod postgres;

pub use postgres::PgDirectory;

/// Trait for the user/card/transaction store
#[async_trait::async_trait]
pub trait BankDirectory: Send + Sync {
    /// Exact-match lookup of an external handle
    async fn find_identity(&self, handle: &str) -> Result<Option<AuthenticatedIdentity>>;

    /// All cards owned by the identity
    async fn find_cards(&self, identity: &AuthenticatedIdentity) -> Result<Vec<CardRecord>>;

    /// Transactions of one owned card in stored order (newest first).
    /// A card not owned by the identity yields an empty list.
    async fn find_transactions(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
    ) -> Result<Vec<TransactionRecord>>;

    /// Replace the PIN hash of one owned card; returns the modified count.
    async fn update_pin_hash(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
        new_hash: &str,
    ) -> Result<u64>;
}

/// In-memory directory for development and tests
pub struct InMemoryDirectory {
    users: Arc<RwLock<Vec<UserRecord>>>,
    cards: Arc<RwLock<HashMap<String, CardRecord>>>, // card_number → card
    transactions: Arc<RwLock<HashMap<String, Vec<TransactionRecord>>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::from_records(Vec::new(), Vec::new())
    }

    pub fn from_records(
        users: Vec<UserRecord>,
        cards: Vec<(CardRecord, Vec<TransactionRecord>)>,
    ) -> Self {
        let mut card_map = HashMap::with_capacity(cards.len());
        let mut txn_map = HashMap::with_capacity(cards.len());

        for (card, transactions) in cards {
            txn_map.insert(card.card_number.clone(), transactions);
            card_map.insert(card.card_number.clone(), card);
        }

        Self {
            users: Arc::new(RwLock::new(users)),
            cards: Arc::new(RwLock::new(card_map)),
            transactions: Arc::new(RwLock::new(txn_map)),
        }
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BankDirectory for InMemoryDirectory {
    async fn find_identity(&self, handle: &str) -> Result<Option<AuthenticatedIdentity>> {
        let users = self.users.read().await;

        Ok(users
            .iter()
            .find(|u| u.handles.iter().any(|h| h == handle))
            .map(|u| AuthenticatedIdentity::new(u.client_id.clone())))
    }

    async fn find_cards(&self, identity: &AuthenticatedIdentity) -> Result<Vec<CardRecord>> {
        let cards = self.cards.read().await;

        let mut owned: Vec<CardRecord> = cards
            .values()
            .filter(|c| c.client_id == identity.client_id())
            .cloned()
            .collect();

        owned.sort_by(|a, b| a.card_token.cmp(&b.card_token));
        Ok(owned)
    }

    async fn find_transactions(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
    ) -> Result<Vec<TransactionRecord>> {
        let owned = {
            let cards = self.cards.read().await;
            cards
                .get(card_number)
                .map(|c| c.client_id == identity.client_id())
                .unwrap_or(false)
        };

        if !owned {
            return Ok(Vec::new());
        }

        let transactions = self.transactions.read().await;
        Ok(transactions.get(card_number).cloned().unwrap_or_default())
    }

    async fn update_pin_hash(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
        new_hash: &str,
    ) -> Result<u64> {
        let mut cards = self.cards.write().await;

        match cards.get_mut(card_number) {
            Some(card) if card.client_id == identity.client_id() => {
                card.pin_hash = new_hash.to_string();
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
