//! Credit scoring collaborator. Read-only from the offer side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProviderClient;
use crate::error::CreditResult;

/// Scoring category reported by the bureau
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "score_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScoreCategory {
    Excellent,
    Good,
    Fair,
    Poor,
    Declined,
}

impl ScoreCategory {
    pub fn from_percent(score: i32) -> Self {
        match score {
            80..=100 => ScoreCategory::Excellent,
            65..=79 => ScoreCategory::Good,
            50..=64 => ScoreCategory::Fair,
            30..=49 => ScoreCategory::Poor,
            _ => ScoreCategory::Declined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEvaluation {
    pub score_percent: i32,
    pub category: ScoreCategory,
}

impl CreditEvaluation {
    /// Eligible when not declined and at or above the policy floor
    pub fn is_eligible(&self, min_score_percent: i32) -> bool {
        self.category != ScoreCategory::Declined && self.score_percent >= min_score_percent
    }
}

#[async_trait]
pub trait CreditScorer: Send + Sync {
    async fn evaluate(&self, customer_id: Uuid) -> CreditResult<CreditEvaluation>;
}

pub struct HttpCreditScorer {
    client: ProviderClient,
    base_url: String,
}

impl HttpCreditScorer {
    pub fn new(client: ProviderClient, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CreditScorer for HttpCreditScorer {
    async fn evaluate(&self, customer_id: Uuid) -> CreditResult<CreditEvaluation> {
        let url = format!("{}/{}", self.base_url, customer_id);
        self.client.get_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_bands() {
        assert_eq!(ScoreCategory::from_percent(100), ScoreCategory::Excellent);
        assert_eq!(ScoreCategory::from_percent(65), ScoreCategory::Good);
        assert_eq!(ScoreCategory::from_percent(64), ScoreCategory::Fair);
        assert_eq!(ScoreCategory::from_percent(30), ScoreCategory::Poor);
        assert_eq!(ScoreCategory::from_percent(29), ScoreCategory::Declined);
        assert_eq!(ScoreCategory::from_percent(-1), ScoreCategory::Declined);
    }

    #[test]
    fn test_eligibility() {
        let fair = CreditEvaluation {
            score_percent: 55,
            category: ScoreCategory::Fair,
        };
        assert!(fair.is_eligible(50));
        assert!(!fair.is_eligible(60));

        // A declined category wins over the numeric score
        let declined = CreditEvaluation {
            score_percent: 90,
            category: ScoreCategory::Declined,
        };
        assert!(!declined.is_eligible(50));
    }
}
