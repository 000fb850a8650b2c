//! Azure AD client-credentials token acquisition for Azure OpenAI.
//!
//! Tokens are cached as `Arc<str>` pre-formatted `Bearer` header values, since
//! the same token serves every request for up to its ~55 minute lifetime and
//! an `Arc` clone is far cheaper than a `String` clone on every call. Inference
//! calls and the Azure Resource Manager deployment-listing call are minted
//! against two different scopes, so tokens are cached per scope rather than
//! as a single slot.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;
use tokio::sync::RwLock;

/// The scope required for Azure OpenAI / Cognitive Services inference calls.
const AZURE_COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// The scope required for Azure Resource Manager calls (deployment listing).
pub const AZURE_MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Refresh this many seconds before the token's reported expiry.
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    bearer_header: Arc<str>,
    expires_at: std::time::Instant,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        std::time::Instant::now() >= self.expires_at
    }
}

/// Fetches and caches an Azure AD access token for one service principal,
/// per scope — the Cognitive Services scope used for inference calls and
/// the management scope used for deployment listing are never the same
/// token and must not share a cache slot.
pub struct AzureTokenSource {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cached_tokens: RwLock<HashMap<&'static str, CachedToken>>,
}

impl AzureTokenSource {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            cached_tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Gets a valid access token for Cognitive Services inference calls, as
    /// a pre-formatted "Bearer {token}" header value.
    pub async fn get_bearer_header(&self, client: &reqwest::Client) -> Result<Arc<str>, String> {
        self.get_scoped_bearer_header(client, AZURE_COGNITIVE_SERVICES_SCOPE).await
    }

    /// Gets a valid access token for the Azure Resource Manager management
    /// scope, as used by the deployment-listing call.
    pub async fn get_management_bearer_header(&self, client: &reqwest::Client) -> Result<Arc<str>, String> {
        self.get_scoped_bearer_header(client, AZURE_MANAGEMENT_SCOPE).await
    }

    /// Gets a valid access token as a pre-formatted "Bearer {token}" header
    /// value for `scope`, fetching and caching a fresh one if the cached
    /// entry for that scope is absent or expired.
    async fn get_scoped_bearer_header(
        &self,
        client: &reqwest::Client,
        scope: &'static str,
    ) -> Result<Arc<str>, String> {
        {
            let cache = self.cached_tokens.read().await;
            if let Some(cached) = cache.get(scope)
                && !cached.is_expired()
            {
                return Ok(cached.bearer_header.clone());
            }
        }

        let mut cache = self.cached_tokens.write().await;
        if let Some(cached) = cache.get(scope)
            && !cached.is_expired()
        {
            return Ok(cached.bearer_header.clone());
        }

        let token_url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = client
            .post(&token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("Azure AD token request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Azure AD token request returned {status}: {body}"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Azure AD token response: {e}"))?;

        let safety_margin = std::time::Duration::from_secs(TOKEN_REFRESH_BUFFER_SECS);
        let expires_at = std::time::Instant::now()
            + std::time::Duration::from_secs(token.expires_in).saturating_sub(safety_margin);

        let bearer_header: Arc<str> = format!("Bearer {}", token.access_token).into();
        cache.insert(
            scope,
            CachedToken {
                bearer_header: bearer_header.clone(),
                expires_at,
            },
        );

        Ok(bearer_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_expiry() {
        let fresh = CachedToken {
            bearer_header: "Bearer test".into(),
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(3600),
        };
        assert!(!fresh.is_expired());

        let stale = CachedToken {
            bearer_header: "Bearer test".into(),
            expires_at: std::time::Instant::now() - std::time::Duration::from_secs(1),
        };
        assert!(stale.is_expired());
    }

    #[test]
    fn arc_str_clone_shares_allocation() {
        let bearer: Arc<str> = "Bearer eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9...".into();
        let clone = bearer.clone();
        assert!(std::ptr::eq(bearer.as_ptr(), clone.as_ptr()));
        assert_eq!(Arc::strong_count(&bearer), 2);
    }
}
