//! HS256 JWT implementation of [`Authenticator`].

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use roomsync_core::{AuthError, Authenticator, Identity};

use crate::config::AuthConfig;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// Validates signature, issuer, audience and expiry.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = config.leeway_secs;
        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.trim().is_empty() {
            return Err(AuthError::Missing);
        }
        let data = decode::<Claims>(credential, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::Rejected(e.to_string())
        })?;
        let Claims { name, sub } = data.claims;
        let name = name.filter(|n| !n.trim().is_empty()).or(sub);
        Ok(Identity::or_anonymous(name.as_deref()))
    }
}

/// Resolve the identity for an upgrade request.
///
/// A present credential must verify. An absent one is admitted as
/// `Anonymous` only when `required` is false.
pub fn resolve_identity(
    authenticator: &dyn Authenticator,
    credential: Option<&str>,
    required: bool,
) -> Result<Identity, AuthError> {
    match credential.filter(|c| !c.is_empty()) {
        Some(token) => authenticator.verify(token),
        None if required => Err(AuthError::Missing),
        None => Ok(Identity::anonymous()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn config() -> AuthConfig {
        AuthConfig {
            secret: SECRET.into(),
            leeway_secs: 0,
            ..Default::default()
        }
    }

    fn mint(claims: serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn exp_in(secs: i64) -> i64 {
        chrono::Utc::now().timestamp() + secs
    }

    fn valid_claims() -> serde_json::Value {
        json!({
            "iss": "roomsync",
            "aud": "roomsync-clients",
            "exp": exp_in(3600),
        })
    }

    #[test]
    fn name_claim_wins() {
        let mut claims = valid_claims();
        claims["name"] = json!("alice");
        claims["sub"] = json!("user-1");
        let auth = JwtAuthenticator::new(&config());
        assert_eq!(auth.verify(&mint(claims, SECRET)).unwrap().as_str(), "alice");
    }

    #[test]
    fn falls_back_to_sub_then_anonymous() {
        let auth = JwtAuthenticator::new(&config());

        let mut claims = valid_claims();
        claims["sub"] = json!("user-1");
        claims["name"] = json!("  ");
        assert_eq!(auth.verify(&mint(claims, SECRET)).unwrap().as_str(), "user-1");

        let id = auth.verify(&mint(valid_claims(), SECRET)).unwrap();
        assert!(id.is_anonymous());
    }

    #[test]
    fn wrong_secret_rejected() {
        let auth = JwtAuthenticator::new(&config());
        let err = auth.verify(&mint(valid_claims(), "other")).unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[test]
    fn expired_rejected() {
        let mut claims = valid_claims();
        claims["exp"] = json!(exp_in(-600));
        let auth = JwtAuthenticator::new(&config());
        assert!(matches!(auth.verify(&mint(claims, SECRET)), Err(AuthError::Rejected(_))));
    }

    #[test]
    fn wrong_issuer_or_audience_rejected() {
        let auth = JwtAuthenticator::new(&config());
        let mut claims = valid_claims();
        claims["iss"] = json!("someone-else");
        assert!(auth.verify(&mint(claims, SECRET)).is_err());

        let mut claims = valid_claims();
        claims["aud"] = json!("other-clients");
        assert!(auth.verify(&mint(claims, SECRET)).is_err());
    }

    #[test]
    fn garbage_and_empty_credentials() {
        let auth = JwtAuthenticator::new(&config());
        assert!(matches!(auth.verify("not-a-jwt"), Err(AuthError::Rejected(_))));
        assert_eq!(auth.verify(""), Err(AuthError::Missing));
    }

    #[test]
    fn resolve_identity_policy() {
        let auth = JwtAuthenticator::new(&config());
        assert_eq!(resolve_identity(&auth, None, true), Err(AuthError::Missing));
        assert!(resolve_identity(&auth, None, false).unwrap().is_anonymous());
        assert!(resolve_identity(&auth, Some(""), false).unwrap().is_anonymous());
        // A bad token is never downgraded to anonymous.
        assert!(resolve_identity(&auth, Some("junk"), false).is_err());

        let mut claims = valid_claims();
        claims["name"] = json!("bob");
        let token = mint(claims, SECRET);
        assert_eq!(resolve_identity(&auth, Some(&token), true).unwrap().as_str(), "bob");
    }
}
