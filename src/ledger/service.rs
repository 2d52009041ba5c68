//! Ledger service - serialized, idempotent wallet postings

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{CreditError, CreditResult};
use crate::ledger::{
    compute_posting, verify_chain, LedgerEntry, PostingOutcome, Wallet, WalletOwnerRef,
    WalletType,
};

/// Ledger service owning every wallet balance mutation
#[derive(Clone)]
pub struct LedgerService {
    db_pool: PgPool,
}

impl LedgerService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Get or create the wallet of `wallet_type` for `owner`
    pub async fn ensure_wallet(
        &self,
        owner: WalletOwnerRef,
        wallet_type: WalletType,
    ) -> CreditResult<Wallet> {
        let mut tx = self.db_pool.begin().await?;
        let wallet = Self::ensure_wallet_in_tx(&mut tx, owner, wallet_type).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    pub async fn ensure_wallet_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        owner: WalletOwnerRef,
        wallet_type: WalletType,
    ) -> CreditResult<Wallet> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, owner_kind, owner_id, wallet_type, balance, allow_credit_line, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, false, $5, $5)
            ON CONFLICT (owner_kind, owner_id, wallet_type)
            DO UPDATE SET updated_at = wallets.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner.kind)
        .bind(owner.id)
        .bind(wallet_type)
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: &Uuid) -> CreditResult<Wallet> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Wallet {}", wallet_id)))
    }

    /// Most recent entries first
    pub async fn list_ledger(&self, wallet_id: &Uuid, limit: i64) -> CreditResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM wallet_ledgers WHERE wallet_id = $1 ORDER BY sequence DESC LIMIT $2",
        )
        .bind(wallet_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(entries)
    }

    pub async fn find_by_reference(&self, reference: &str) -> CreditResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM wallet_ledgers WHERE transaction_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(entry)
    }

    /// Post a signed amount to a wallet in its own transaction.
    ///
    /// A reference that already has a ledger row yields
    /// `PostingOutcome::AlreadyApplied` with the original entry.
    pub async fn post_entry(
        &self,
        wallet_id: Uuid,
        amount: i64,
        transaction_reference: &str,
        narration: Option<&str>,
    ) -> CreditResult<PostingOutcome> {
        let mut tx = self.db_pool.begin().await?;

        match Self::post_entry_in_tx(&mut tx, wallet_id, amount, transaction_reference, narration)
            .await
        {
            Ok(entry) => {
                tx.commit().await?;
                Ok(PostingOutcome::Posted(entry))
            }
            Err(CreditError::DuplicateTransaction(reference)) => {
                tx.rollback().await?;
                tracing::info!(reference = %reference, "Ledger posting already applied");
                let existing = self.find_by_reference(&reference).await?.ok_or_else(|| {
                    CreditError::IntegrityViolation(format!(
                        "Reference {} reported duplicate but has no ledger row",
                        reference
                    ))
                })?;
                Ok(PostingOutcome::AlreadyApplied(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Post inside a caller-held transaction.
    ///
    /// Locks the wallet row so concurrent postings to the same wallet
    /// serialize on it; each computes from the committed balance.
    /// Fails with `DuplicateTransaction` if the reference is already used,
    /// in which case the caller must roll back.
    pub async fn post_entry_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: Uuid,
        amount: i64,
        transaction_reference: &str,
        narration: Option<&str>,
    ) -> CreditResult<LedgerEntry> {
        if transaction_reference.trim().is_empty() {
            return Err(CreditError::validation("transaction_reference is required"));
        }

        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Wallet {}", wallet_id)))?;

        let already_used: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM wallet_ledgers WHERE transaction_reference = $1")
                .bind(transaction_reference)
                .fetch_optional(&mut **tx)
                .await?;

        if already_used.is_some() {
            return Err(CreditError::DuplicateTransaction(
                transaction_reference.to_string(),
            ));
        }

        let posting = compute_posting(&wallet, amount)?;
        let now = Utc::now();

        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO wallet_ledgers (
                id, wallet_id, transaction_reference, amount,
                balance_before, balance_after, narration, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(wallet.id)
        .bind(transaction_reference)
        .bind(amount)
        .bind(posting.balance_before)
        .bind(posting.balance_after)
        .bind(narration)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            // Same reference raced in on another wallet
            if CreditError::is_unique_violation(&e) {
                CreditError::DuplicateTransaction(transaction_reference.to_string())
            } else {
                e.into()
            }
        })?;

        sqlx::query("UPDATE wallets SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(posting.balance_after)
            .bind(now)
            .bind(wallet.id)
            .execute(&mut **tx)
            .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            reference = %transaction_reference,
            amount = amount,
            balance_before = posting.balance_before,
            balance_after = posting.balance_after,
            "Ledger entry posted"
        );

        Ok(entry)
    }

    /// Re-check the full before/after chain of a wallet
    pub async fn verify_wallet(&self, wallet_id: &Uuid) -> CreditResult<()> {
        let wallet = self.get_wallet(wallet_id).await?;
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM wallet_ledgers WHERE wallet_id = $1 ORDER BY sequence ASC",
        )
        .bind(wallet_id)
        .fetch_all(&self.db_pool)
        .await?;

        verify_chain(&wallet, &entries).map_err(|e| {
            tracing::error!(wallet_id = %wallet_id, error = %e, "Wallet ledger integrity violation");
            e
        })
    }
}
