//! Token acquisition for the connection handshake.
//!
//! Wirelink doesn't mint tokens itself. In a cluster, the bearer token
//! usually comes from an identity service; the session layer only needs
//! "give me a token string, maybe", which is the [`TokenProvider`] trait.
//!
//! A provider failing is not a reason to stop connecting. The attempt goes
//! ahead with an empty token and the remote side gets to reject the login
//! instead, which surfaces as an ordinary failed call.

use std::future::Future;

use crate::SessionError;

/// Produces bearer tokens for connection attempts.
///
/// # Example
///
/// ```rust
/// use wirelink_session::{SessionError, TokenProvider};
///
/// /// Reads the token from an environment variable.
/// struct EnvToken;
///
/// impl TokenProvider for EnvToken {
///     async fn token(&self, _account: Option<&str>) -> Result<String, SessionError> {
///         std::env::var("WIRELINK_TOKEN")
///             .map_err(|e| SessionError::TokenUnavailable(e.to_string()))
///     }
/// }
/// ```
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns a token for `account` (or the provider's default account).
    fn token(
        &self,
        account: Option<&str>,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;
}

/// A provider for deployments without authentication: always yields an
/// empty token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokenProvider;

impl TokenProvider for NoTokenProvider {
    async fn token(&self, _account: Option<&str>) -> Result<String, SessionError> {
        Ok(String::new())
    }
}

/// Asks `provider` for a token, downgrading failure to an empty token.
pub async fn acquire_token<P: TokenProvider>(
    provider: &P,
    account: Option<&str>,
) -> String {
    match provider.token(account).await {
        Ok(token) => token,
        Err(error) => on_token_acquisition_failure(&error),
    }
}

/// Policy for a failed token acquisition: proceed with no token.
pub fn on_token_acquisition_failure(error: &SessionError) -> String {
    tracing::warn!(error = %error, "token acquisition failed, connecting without a token");
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedToken(&'static str);

    impl TokenProvider for FixedToken {
        async fn token(&self, account: Option<&str>) -> Result<String, SessionError> {
            Ok(format!("{}:{}", self.0, account.unwrap_or("default")))
        }
    }

    struct BrokenProvider;

    impl TokenProvider for BrokenProvider {
        async fn token(&self, _account: Option<&str>) -> Result<String, SessionError> {
            Err(SessionError::TokenUnavailable("identity service down".into()))
        }
    }

    #[tokio::test]
    async fn test_acquire_token_passes_account_through() {
        let token = acquire_token(&FixedToken("tok"), Some("ops")).await;
        assert_eq!(token, "tok:ops");
    }

    #[tokio::test]
    async fn test_acquire_token_failure_yields_empty_token() {
        let token = acquire_token(&BrokenProvider, None).await;
        assert_eq!(token, "");
    }

    #[tokio::test]
    async fn test_no_token_provider_yields_empty_token() {
        let token = acquire_token(&NoTokenProvider, Some("anyone")).await;
        assert!(token.is_empty());
    }

    #[test]
    fn test_on_token_acquisition_failure_returns_empty() {
        let err = SessionError::TokenUnavailable("nope".into());
        assert_eq!(on_token_acquisition_failure(&err), "");
    }
}
