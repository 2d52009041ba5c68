//! Wallet and ledger models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{CreditError, CreditResult};

/// Kind of entity owning a wallet
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "wallet_owner_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Business,
    Lender,
    Ecommerce,
}

/// Explicit wallet owner reference
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletOwnerRef {
    pub kind: OwnerKind,
    pub id: Uuid,
}

impl WalletOwnerRef {
    pub fn business(id: Uuid) -> Self {
        Self {
            kind: OwnerKind::Business,
            id,
        }
    }

    pub fn lender(id: Uuid) -> Self {
        Self {
            kind: OwnerKind::Lender,
            id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "wallet_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    Deposit,
    Payout,
    CreditVoucher,
}

/// Business-scoped wallet. `balance` mirrors the latest ledger row.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub wallet_type: WalletType,
    pub balance: i64,
    /// Deposit and voucher wallets may run negative when this is set
    pub allow_credit_line: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn owner(&self) -> WalletOwnerRef {
        WalletOwnerRef {
            kind: self.owner_kind,
            id: self.owner_id,
        }
    }

    pub fn may_go_negative(&self) -> bool {
        match self.wallet_type {
            WalletType::Payout => false,
            WalletType::Deposit | WalletType::CreditVoucher => self.allow_credit_line,
        }
    }
}

/// One immutable balance change on one wallet
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    /// Monotonic insertion order across the whole ledger
    pub sequence: i64,
    pub wallet_id: Uuid,
    pub transaction_reference: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub narration: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Before/after pair for a pending posting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Compute the balance transition for posting `amount` to `wallet`
pub fn compute_posting(wallet: &Wallet, amount: i64) -> CreditResult<Posting> {
    if amount == 0 {
        return Err(CreditError::validation("Ledger amount must be non-zero"));
    }

    let balance_after = wallet.balance.checked_add(amount).ok_or_else(|| {
        CreditError::validation(format!("Posting {} overflows wallet {}", amount, wallet.id))
    })?;

    if balance_after < 0 && amount < 0 && !wallet.may_go_negative() {
        return Err(CreditError::InsufficientFunds {
            wallet_id: wallet.id,
            balance: wallet.balance,
            amount,
        });
    }

    Ok(Posting {
        balance_before: wallet.balance,
        balance_after,
    })
}

/// Check the before/after chain of a wallet's entries (ordered by sequence)
/// and that the stored balance matches the latest row.
pub fn verify_chain(wallet: &Wallet, entries: &[LedgerEntry]) -> CreditResult<()> {
    let mut expected_before = 0i64;

    for entry in entries {
        if entry.balance_after != entry.balance_before + entry.amount {
            return Err(CreditError::IntegrityViolation(format!(
                "Ledger row {} on wallet {}: {} + {} != {}",
                entry.transaction_reference,
                wallet.id,
                entry.balance_before,
                entry.amount,
                entry.balance_after
            )));
        }
        if entry.balance_before != expected_before {
            return Err(CreditError::IntegrityViolation(format!(
                "Ledger row {} on wallet {} starts at {} but previous row ended at {}",
                entry.transaction_reference, wallet.id, entry.balance_before, expected_before
            )));
        }
        expected_before = entry.balance_after;
    }

    if wallet.balance != expected_before {
        return Err(CreditError::IntegrityViolation(format!(
            "Wallet {} balance {} diverges from ledger {}",
            wallet.id, wallet.balance, expected_before
        )));
    }

    Ok(())
}

/// Request DTO for posting a ledger entry
#[derive(Debug, Deserialize, Validate)]
pub struct PostEntryRequest {
    pub amount: i64,
    #[validate(length(min = 1, max = 128))]
    pub transaction_reference: String,
    pub narration: Option<String>,
}

/// Result of a posting: a fresh entry, or the entry already holding the reference
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum PostingOutcome {
    Posted(LedgerEntry),
    AlreadyApplied(LedgerEntry),
}

impl PostingOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            PostingOutcome::Posted(e) | PostingOutcome::AlreadyApplied(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(wallet_type: WalletType, balance: i64, allow_credit_line: bool) -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            owner_kind: OwnerKind::Business,
            owner_id: Uuid::new_v4(),
            wallet_type,
            balance,
            allow_credit_line,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(reference: &str, before: i64, amount: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            sequence: 0,
            wallet_id: Uuid::nil(),
            transaction_reference: reference.to_string(),
            amount,
            balance_before: before,
            balance_after: before + amount,
            narration: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_posting_credit_and_debit() {
        let w = wallet(WalletType::Payout, 1_000, false);

        let credit = compute_posting(&w, 500).unwrap();
        assert_eq!(credit.balance_before, 1_000);
        assert_eq!(credit.balance_after, 1_500);

        let debit = compute_posting(&w, -1_000).unwrap();
        assert_eq!(debit.balance_after, 0);
    }

    #[test]
    fn test_payout_wallet_never_negative() {
        // allow_credit_line is ignored for payout wallets
        let w = wallet(WalletType::Payout, 100, true);
        let err = compute_posting(&w, -101).unwrap_err();
        assert!(matches!(err, CreditError::InsufficientFunds { balance: 100, amount: -101, .. }));
    }

    #[test]
    fn test_deposit_wallet_credit_line() {
        let strict = wallet(WalletType::Deposit, 0, false);
        assert!(compute_posting(&strict, -1).is_err());

        let credit_line = wallet(WalletType::CreditVoucher, 0, true);
        assert_eq!(compute_posting(&credit_line, -250).unwrap().balance_after, -250);
    }

    #[test]
    fn test_credit_to_negative_wallet_is_allowed() {
        // A credit that leaves the wallet still negative is not a debit
        let w = wallet(WalletType::Deposit, -500, false);
        assert_eq!(compute_posting(&w, 200).unwrap().balance_after, -300);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let w = wallet(WalletType::Deposit, 0, false);
        assert!(matches!(compute_posting(&w, 0), Err(CreditError::Validation(_))));
    }

    #[test]
    fn test_chain_holds_for_any_sequence_of_postings() {
        let amounts = [500, -200, 1_000, -1_300, 7, 1];
        let mut w = wallet(WalletType::Payout, 0, false);
        let mut entries = Vec::new();

        for (i, amount) in amounts.iter().enumerate() {
            let posting = compute_posting(&w, *amount).unwrap();
            assert_eq!(posting.balance_after, posting.balance_before + amount);
            entries.push(entry(&format!("REF-{}", i), posting.balance_before, *amount));
            w.balance = posting.balance_after;
        }

        assert!(verify_chain(&w, &entries).is_ok());
        assert_eq!(w.balance, entries.last().unwrap().balance_after);
    }

    #[test]
    fn test_chain_detects_divergent_balance() {
        let mut w = wallet(WalletType::Deposit, 0, false);
        let entries = vec![entry("A", 0, 100), entry("B", 100, 50)];
        w.balance = 175;

        let err = verify_chain(&w, &entries).unwrap_err();
        assert!(matches!(err, CreditError::IntegrityViolation(_)));
    }

    #[test]
    fn test_chain_detects_stale_before() {
        let mut w = wallet(WalletType::Deposit, 0, false);
        // Two rows computed from the same stale "before"
        let entries = vec![entry("A", 0, 100), entry("B", 0, 50)];
        w.balance = 50;

        assert!(verify_chain(&w, &entries).is_err());
    }
}
