//! Reference and voucher number generation
//!
//! Services ask an `IdentifierGenerator` for a reference right before they
//! insert a row. Nothing is generated implicitly by the persistence layer.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of externally visible identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Application,
    Offer,
    Mandate,
    Collection,
    Voucher,
    LenderMatch,
}

impl IdentifierKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::Application => "APP",
            IdentifierKind::Offer => "OFR",
            IdentifierKind::Mandate => "MDT",
            IdentifierKind::Collection => "COL",
            IdentifierKind::Voucher => "VCH",
            IdentifierKind::LenderMatch => "LMT",
        }
    }
}

/// Capability for minting unique identifiers
pub trait IdentifierGenerator: Send + Sync {
    fn next(&self, kind: IdentifierKind) -> String;

    fn application_reference(&self) -> String {
        self.next(IdentifierKind::Application)
    }

    fn offer_reference(&self) -> String {
        self.next(IdentifierKind::Offer)
    }

    fn mandate_reference(&self) -> String {
        self.next(IdentifierKind::Mandate)
    }

    fn collection_reference(&self) -> String {
        self.next(IdentifierKind::Collection)
    }

    fn voucher_number(&self) -> String {
        self.next(IdentifierKind::Voucher)
    }

    fn lender_match_reference(&self) -> String {
        self.next(IdentifierKind::LenderMatch)
    }
}

/// `PREFIX-YYYYMMDD-XXXXXXXXXX` with a random uppercase alphanumeric tail
#[derive(Debug, Default, Clone)]
pub struct RandomIdentifierGenerator;

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn next(&self, kind: IdentifierKind) -> String {
        let tail: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect::<String>()
            .to_uppercase();

        format!(
            "{}-{}-{}",
            kind.prefix(),
            Utc::now().format("%Y%m%d"),
            tail
        )
    }
}

/// Deterministic `PREFIX-000001` identifiers, shared counter across kinds
#[derive(Debug)]
pub struct SequentialIdentifierGenerator {
    counter: AtomicU64,
    namespace: String,
}

impl SequentialIdentifierGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            namespace: namespace.into(),
        }
    }
}

impl IdentifierGenerator for SequentialIdentifierGenerator {
    fn next(&self, kind: IdentifierKind) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if self.namespace.is_empty() {
            format!("{}-{:06}", kind.prefix(), n)
        } else {
            format!("{}-{}-{:06}", kind.prefix(), self.namespace, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_generator_shape() {
        let gen = RandomIdentifierGenerator;
        let voucher = gen.voucher_number();
        let parts: Vec<&str> = voucher.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "VCH");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 10);
    }

    #[test]
    fn test_random_generator_does_not_repeat() {
        let gen = RandomIdentifierGenerator;
        let refs: HashSet<String> = (0..500).map(|_| gen.collection_reference()).collect();
        assert_eq!(refs.len(), 500);
    }

    #[test]
    fn test_sequential_generator() {
        let gen = SequentialIdentifierGenerator::new("");
        assert_eq!(gen.application_reference(), "APP-000001");
        assert_eq!(gen.offer_reference(), "OFR-000002");

        let scoped = SequentialIdentifierGenerator::new("t1");
        assert_eq!(scoped.mandate_reference(), "MDT-t1-000001");
    }
}
