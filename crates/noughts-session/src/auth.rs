//! Identity validation.
//!
//! Tokens are issued by a separate identity service; this layer only asks
//! "who does this token belong to?" through the [`IdentityGateway`] trait.
//! [`TokenTable`] answers from a fixed table and backs the demo server and
//! the tests.

use std::collections::HashMap;
use std::future::Future;

use noughts_match::UserId;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// A verified user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Validates a bearer token and returns the identity it belongs to.
///
/// Called once per connection attempt, before the WebSocket upgrade.
///
/// ```rust
/// use noughts_match::UserId;
/// use noughts_session::{Identity, IdentityGateway, SessionError};
///
/// /// Treats the token as a numeric user id. Development only.
/// struct NumericTokens;
///
/// impl IdentityGateway for NumericTokens {
///     async fn validate(&self, token: &str) -> Result<Identity, SessionError> {
///         let id: u64 = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
///         Ok(Identity { id: UserId(id), name: format!("user{id}"), is_admin: false })
///     }
/// }
/// ```
pub trait IdentityGateway: Send + Sync + 'static {
    /// # Errors
    /// [`SessionError::AuthFailed`] if the token is not valid.
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;
}

/// An [`IdentityGateway`] backed by a fixed token → identity map.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Identity>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a token.
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.insert(token, identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, Identity)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (String, Identity)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl IdentityGateway for TokenTable {
    async fn validate(&self, token: &str) -> Result<Identity, SessionError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            id: UserId(1),
            name: "alice".into(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_token_table_validates_known_token() {
        let table = TokenTable::new().with("tok-a", alice());
        assert_eq!(table.validate("tok-a").await.unwrap(), alice());
    }

    #[tokio::test]
    async fn test_token_table_rejects_unknown_token() {
        let table = TokenTable::new().with("tok-a", alice());
        let err = table.validate("tok-b").await.unwrap_err();
        assert!(matches!(err, SessionError::AuthFailed(_)));
        assert!(table.validate("").await.is_err());
    }

    #[test]
    fn test_token_table_from_iter() {
        let table: TokenTable = vec![("a".to_string(), alice())].into_iter().collect();
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
