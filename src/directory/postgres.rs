//! PostgreSQL-backed bank directory

use crate::error::OrchestrationError;
use crate::models::{AuthenticatedIdentity, CardRecord, TransactionRecord};
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use super::BankDirectory;

pub struct PgDirectory {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgDirectory {
    /// Build a lazily-connecting pool; nothing touches the network until the
    /// first query.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Invalid database URL: {}", e))
            })?;

        info!("Bank directory backend: postgres");

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS bank_user_handles (
                      handle TEXT PRIMARY KEY,
                      client_id TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS bank_cards (
                      card_number TEXT PRIMARY KEY,
                      card_token TEXT NOT NULL,
                      client_id TEXT NOT NULL,
                      card_type TEXT NOT NULL,
                      product_type TEXT NOT NULL,
                      currency TEXT NOT NULL,
                      status TEXT NOT NULL,
                      expiry_date TEXT NOT NULL,
                      available_balance DOUBLE PRECISION NOT NULL DEFAULT 0,
                      current_balance DOUBLE PRECISION NOT NULL DEFAULT 0,
                      card_limit DOUBLE PRECISION NOT NULL DEFAULT 0,
                      cashback DOUBLE PRECISION NOT NULL DEFAULT 0,
                      pin_hash TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS card_transactions (
                      card_number TEXT NOT NULL,
                      position INTEGER NOT NULL,
                      txn_date TEXT NOT NULL,
                      txn_time TEXT NOT NULL,
                      amount TEXT NOT NULL,
                      currency TEXT NOT NULL,
                      transaction_type TEXT NOT NULL,
                      description TEXT NOT NULL,
                      terminal_location TEXT NOT NULL,
                      reference_number TEXT NOT NULL,
                      status TEXT NOT NULL,
                      PRIMARY KEY (card_number, position)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::UpstreamUnavailable(format!(
                    "Failed to initialize bank directory schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

fn unavailable(context: &str, e: sqlx::Error) -> OrchestrationError {
    OrchestrationError::UpstreamUnavailable(format!("{}: {}", context, e))
}

#[async_trait::async_trait]
impl BankDirectory for PgDirectory {
    async fn find_identity(&self, handle: &str) -> Result<Option<AuthenticatedIdentity>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT client_id FROM bank_user_handles WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("Failed to look up handle", e))?;

        match row {
            Some(row) => {
                let client_id: String = row
                    .try_get("client_id")
                    .map_err(|e| unavailable("Malformed handle row", e))?;
                Ok(Some(AuthenticatedIdentity::new(client_id)))
            }
            None => Ok(None),
        }
    }

    async fn find_cards(&self, identity: &AuthenticatedIdentity) -> Result<Vec<CardRecord>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT card_number, card_token, client_id, card_type, product_type, currency,
                   status, expiry_date, available_balance, current_balance, card_limit,
                   cashback, pin_hash
            FROM bank_cards
            WHERE client_id = $1
            ORDER BY card_token ASC
            "#,
        )
        .bind(identity.client_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("Failed to load cards", e))?;

        rows.iter()
            .map(|row| -> std::result::Result<CardRecord, sqlx::Error> {
                Ok(CardRecord {
                    card_number: row.try_get("card_number")?,
                    card_token: row.try_get("card_token")?,
                    client_id: row.try_get("client_id")?,
                    card_type: row.try_get("card_type")?,
                    product_type: row.try_get("product_type")?,
                    currency: row.try_get("currency")?,
                    status: row.try_get("status")?,
                    expiry_date: row.try_get("expiry_date")?,
                    available_balance: row.try_get("available_balance")?,
                    current_balance: row.try_get("current_balance")?,
                    card_limit: row.try_get("card_limit")?,
                    cashback: row.try_get("cashback")?,
                    pin_hash: row.try_get("pin_hash")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| unavailable("Malformed card row", e))
    }

    async fn find_transactions(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
    ) -> Result<Vec<TransactionRecord>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT t.txn_date, t.txn_time, t.amount, t.currency, t.transaction_type,
                   t.description, t.terminal_location, t.reference_number, t.status
            FROM card_transactions t
            JOIN bank_cards c ON c.card_number = t.card_number
            WHERE t.card_number = $1 AND c.client_id = $2
            ORDER BY t.position ASC
            "#,
        )
        .bind(card_number)
        .bind(identity.client_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("Failed to load transactions", e))?;

        rows.iter()
            .map(|row| -> std::result::Result<TransactionRecord, sqlx::Error> {
                Ok(TransactionRecord {
                    date: row.try_get("txn_date")?,
                    time: row.try_get("txn_time")?,
                    amount: row.try_get("amount")?,
                    currency: row.try_get("currency")?,
                    transaction_type: row.try_get("transaction_type")?,
                    description: row.try_get("description")?,
                    terminal_location: row.try_get("terminal_location")?,
                    reference_number: row.try_get("reference_number")?,
                    status: row.try_get("status")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| unavailable("Malformed transaction row", e))
    }

    async fn update_pin_hash(
        &self,
        identity: &AuthenticatedIdentity,
        card_number: &str,
        new_hash: &str,
    ) -> Result<u64> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "UPDATE bank_cards SET pin_hash = $1 WHERE card_number = $2 AND client_id = $3",
        )
        .bind(new_hash)
        .bind(card_number)
        .bind(identity.client_id())
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("Failed to update PIN", e))?;

        Ok(result.rows_affected())
    }
}
