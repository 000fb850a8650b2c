use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// One or many strings; JWT `aud`/`iss` checks commonly accept either shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        match self {
            OneOrMany::One(v) => v == value,
            OneOrMany::Many(vs) => vs.contains(value),
        }
    }

    pub fn as_slice(&self) -> Vec<&T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs.iter().collect(),
        }
    }
}

/// Signing algorithms the validator will accept. Keeping this an explicit
/// allowlist (rather than "whatever the token header says") closes the
/// classic JWT algorithm-confusion hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    RS256,
    HS256,
}

impl JwtAlgorithm {
    pub fn matches(&self, alg: Algorithm) -> bool {
        self.to_jwt_algorithm() == alg
    }

    pub fn to_jwt_algorithm(&self) -> Algorithm {
        match self {
            JwtAlgorithm::RS256 => Algorithm::RS256,
            JwtAlgorithm::HS256 => Algorithm::HS256,
        }
    }
}

fn default_algorithms() -> Vec<JwtAlgorithm> {
    vec![JwtAlgorithm::RS256, JwtAlgorithm::HS256]
}

fn default_jwks_refresh_secs() -> u64 {
    300
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Configuration for validating bearer tokens issued by an external
/// identity provider (Keycloak and similar OIDC issuers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtAuthConfig {
    pub issuer: String,
    pub audience: Option<OneOrMany<String>>,
    pub jwks_url: String,

    /// How often the JWKS key set is allowed to go stale before a refresh
    /// is forced, independent of the per-entry cache TTL below.
    #[serde(default = "default_jwks_refresh_secs")]
    pub jwks_refresh_secs: u64,

    /// TTL for the [`crate::auth::principal::CachedPrincipal`] entries keyed
    /// by username, overridable via `KEYCLOAK_JWKS_CACHE_TTL`.
    #[serde(default = "default_cache_ttl_secs")]
    pub principal_cache_ttl_secs: u64,

    /// Claim to read the username from, tried in this order if absent:
    /// `preferred_username`, `username`, `name`, `sub`.
    #[serde(default)]
    pub identity_claim: Option<String>,

    #[serde(default = "default_algorithms")]
    pub allowed_algorithms: Vec<JwtAlgorithm>,

    /// Allow already-expired tokens. Only ever used in tests.
    #[serde(default)]
    pub allow_expired: bool,
}

impl JwtAuthConfig {
    pub fn jwks_cache_ttl(&self) -> std::time::Duration {
        let secs = std::env::var("KEYCLOAK_JWKS_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.principal_cache_ttl_secs);
        std::time::Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_contains() {
        let many = OneOrMany::Many(vec!["a".to_string(), "b".to_string()]);
        assert!(many.contains(&"a".to_string()));
        assert!(!many.contains(&"c".to_string()));

        let one = OneOrMany::One("a".to_string());
        assert!(one.contains(&"a".to_string()));
    }

    #[test]
    fn default_algorithms_are_exactly_rs256_and_hs256() {
        assert_eq!(default_algorithms(), vec![JwtAlgorithm::RS256, JwtAlgorithm::HS256]);
    }
}
