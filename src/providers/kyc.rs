//! Identity (KYC) collaborator, consumed as a pass/fail capability

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderClient;
use crate::error::CreditResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityVerification {
    pub verified: bool,
    pub profile_id: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(
        &self,
        identity_type: &str,
        identity_number: &str,
    ) -> CreditResult<IdentityVerification>;
}

pub struct HttpIdentityVerifier {
    client: ProviderClient,
    base_url: String,
}

impl HttpIdentityVerifier {
    pub fn new(client: ProviderClient, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    identity_type: &'a str,
    identity_number: &'a str,
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(
        &self,
        identity_type: &str,
        identity_number: &str,
    ) -> CreditResult<IdentityVerification> {
        let url = format!("{}/verify", self.base_url);
        self.client
            .post_json(
                &url,
                &VerifyBody {
                    identity_type,
                    identity_number,
                },
            )
            .await
    }
}
