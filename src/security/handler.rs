//! Credential handler contract & bearer-JWT reference handler (C7)

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::config::{RequiredScopesPolicyConfig, SecurityConfig};
use crate::error::{Error, Result};
use crate::security::context::Principal;
use crate::security::RequestInfo;

const BEARER_PREFIX: &str = "Bearer ";

/// A pluggable authenticator. Handlers are stateless with respect to
/// individual requests — all request-scoped state lives in [`RequestInfo`]
/// and the returned [`Principal`].
#[async_trait]
pub trait CredentialHandler: Send + Sync {
    /// Whether this handler should process `request`. The security pipeline
    /// (C5) picks the first handler in registration order that answers true.
    fn can_handle(&self, request: &RequestInfo) -> bool;

    /// Verify credentials and produce a principal. `Ok(None)` is a valid
    /// result for handlers that authenticate without binding an identity.
    async fn authenticate(&self, request: &RequestInfo) -> Result<Option<Principal>>;

    /// Enforce per-route authorization policy given the bound principal.
    async fn authorize(&self, request: &RequestInfo, principal: Option<&Principal>) -> Result<()>;
}

/// Reference bearer-JWT handler (§4.5).
pub struct BearerJwtHandler {
    decoding_key: DecodingKey,
    validation: Validation,
    scopes_policy: RequiredScopesPolicyConfig,
}

impl BearerJwtHandler {
    /// Build a handler from the configured key material on disk.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let algorithm = parse_algorithm(&config.bearer_verifier.algorithm)?;
        let key_bytes = std::fs::read(&config.bearer_verifier.public_key_path)
            .map_err(|e| Error::Config(format!("failed to read verifier key: {e}")))?;
        let decoding_key = decoding_key_for(algorithm, &key_bytes)?;
        Ok(Self::new(decoding_key, algorithm, config))
    }

    /// Build a handler directly from an HMAC secret; used by tests and by
    /// deployments that configure a shared secret instead of a key file.
    pub fn from_hmac_secret(secret: &[u8], config: &SecurityConfig) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256, config)
    }

    fn new(decoding_key: DecodingKey, algorithm: Algorithm, config: &SecurityConfig) -> Self {
        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &config.bearer_verifier.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.bearer_verifier.audience {
            validation.set_audience(&[audience]);
        }
        validation.validate_exp = true;
        Self { decoding_key, validation, scopes_policy: config.required_scopes_policy.clone() }
    }

    fn required_scopes(&self, path: &str) -> Vec<String> {
        let is_self_service = self
            .scopes_policy
            .self_service_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));
        if is_self_service {
            Vec::new()
        } else {
            vec![self.scopes_policy.default_scope.clone()]
        }
    }

    /// Extract granted scopes from a principal's claims: `scope` (space
    /// separated string), then `scopes` (sequence of strings), then
    /// `authorized_permissions` (space separated string) — first present wins.
    fn granted_scopes(principal: &Principal) -> Vec<String> {
        if let Some(scope) = principal.attribute_str("scope") {
            return scope.split_whitespace().map(str::to_string).collect();
        }
        if let Some(Value::Array(items)) = principal.attribute("scopes") {
            return items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        }
        if let Some(permissions) = principal.attribute_str("authorized_permissions") {
            return permissions.split_whitespace().map(str::to_string).collect();
        }
        Vec::new()
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(Error::Config(format!("unsupported JWT algorithm: {other}"))),
    }
}

fn decoding_key_for(algorithm: Algorithm, key_bytes: &[u8]) -> Result<DecodingKey> {
    match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            DecodingKey::from_rsa_pem(key_bytes).map_err(|e| Error::Config(e.to_string()))
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            DecodingKey::from_ec_pem(key_bytes).map_err(|e| Error::Config(e.to_string()))
        }
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(DecodingKey::from_secret(key_bytes)),
        other => Err(Error::Config(format!("unsupported JWT algorithm: {other:?}"))),
    }
}

#[async_trait]
impl CredentialHandler for BearerJwtHandler {
    fn can_handle(&self, request: &RequestInfo) -> bool {
        request
            .authorization_header
            .as_deref()
            .is_some_and(|header| header.starts_with(BEARER_PREFIX))
    }

    async fn authenticate(&self, request: &RequestInfo) -> Result<Option<Principal>> {
        let header = request.authorization_header.as_deref().ok_or(Error::MissingAuthHeader)?;
        let token = header.strip_prefix(BEARER_PREFIX).unwrap_or_default().trim();
        if token.is_empty() {
            return Err(Error::InvalidToken("empty bearer token".to_string()));
        }

        // Signature verification and base64url JSON payload decoding happen
        // together here; jsonwebtoken rejects a malformed payload the same
        // way it rejects a bad signature, so both failure modes in §4.5
        // steps 2-3 surface as the same typed error.
        let decoded = jsonwebtoken::decode::<Value>(token, &self.decoding_key, &self.validation)
            .map_err(|e| Error::InvalidToken(e.to_string()))?;
        let claims = decoded.claims;

        let string_claim = |key: &str| claims.get(key).and_then(Value::as_str).unwrap_or("").to_string();

        Ok(Some(Principal::new(
            string_claim("sub"),
            string_claim("ou_id"),
            string_claim("app_id"),
            token.to_string(),
            claims,
        )))
    }

    async fn authorize(&self, request: &RequestInfo, principal: Option<&Principal>) -> Result<()> {
        let required = self.required_scopes(&request.path);
        if required.is_empty() {
            return Ok(());
        }
        let granted = principal.map(Self::granted_scopes).unwrap_or_default();
        if required.iter().any(|scope| granted.contains(scope)) {
            Ok(())
        } else {
            Err(Error::InsufficientScopes)
        }
    }
}
