use convocore_core::config::{AuthConfig, AuthMode};

/// Verify a bearer token against the configured auth mode and resolve it to
/// a user id. Token issuance is out of scope for this
/// core — it only verifies a token someone else minted — so the scheme here
/// is deliberately the simplest one that still identifies a user: the token
/// is `"{user_id}.{shared_secret}"`; the secret half is compared against the
/// configured `jwt_secret`. `AuthMode::None` is local/dev only and trusts the
/// token's first half as the user id outright.
pub fn verify_token(token: &str, config: &AuthConfig) -> Result<String, String> {
    match config.mode {
        AuthMode::None => {
            let user_id = token.split('.').next().unwrap_or(token);
            if user_id.is_empty() {
                return Err("empty token".to_string());
            }
            Ok(user_id.to_string())
        }
        AuthMode::Token => {
            let secret = config.jwt_secret.as_deref().ok_or_else(|| "server has no auth secret configured".to_string())?;
            let (user_id, provided_secret) = token.split_once('.').ok_or_else(|| "malformed token".to_string())?;
            if user_id.is_empty() {
                return Err("malformed token".to_string());
            }
            if provided_secret == secret {
                Ok(user_id.to_string())
            } else {
                Err("invalid token".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: AuthMode, secret: Option<&str>) -> AuthConfig {
        AuthConfig { mode, jwt_secret: secret.map(str::to_string), access_token_expire_days: 30 }
    }

    #[test]
    fn token_mode_accepts_matching_secret() {
        let cfg = config(AuthMode::Token, Some("s3cret"));
        assert_eq!(verify_token("alice.s3cret", &cfg).unwrap(), "alice");
    }

    #[test]
    fn token_mode_rejects_wrong_secret() {
        let cfg = config(AuthMode::Token, Some("s3cret"));
        assert!(verify_token("alice.wrong", &cfg).is_err());
    }

    #[test]
    fn token_mode_rejects_malformed_token() {
        let cfg = config(AuthMode::Token, Some("s3cret"));
        assert!(verify_token("no-dot-here", &cfg).is_err());
    }

    #[test]
    fn none_mode_trusts_the_token_as_a_user_id() {
        let cfg = config(AuthMode::None, None);
        assert_eq!(verify_token("alice", &cfg).unwrap(), "alice");
    }
}
