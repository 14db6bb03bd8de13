//! Credential resolution and the authentication gate.
//!
//! The gate runs before every handler, including the `/ws` upgrade. All
//! failures — missing header, wrong scheme, unknown token, store outage —
//! produce the same `401 Unauthorized` response so a caller cannot probe
//! which credentials exist.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use guildcast_core::GuildId;
use guildcast_store::TokenStore;

/// The guild a request was authenticated for, carried in request
/// extensions from the gate to the upgrade handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthedGuild(pub GuildId);

/// Resolves a presented bearer credential to the guild it authorizes.
/// Reloads the table from the store on every attempt; a load failure is
/// indistinguishable from an unknown credential.
pub struct TokenResolver {
    store: Arc<dyn TokenStore>,
}

impl TokenResolver {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, credential: &str) -> Option<GuildId> {
        let table = match self.store.load().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "token store load failed");
                return None;
            }
        };
        table.get(credential).cloned()
    }
}

/// Pull the credential out of an `Authorization: Bearer <token>` header
/// value. Anything else fails without consulting the store.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.split_once(' ')?;
    if scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token)
}

pub type AuthState = Arc<TokenResolver>;

pub async fn auth_middleware(
    State(resolver): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let guild = match bearer_token(header) {
        Some(credential) => resolver.resolve(credential).await,
        None => None,
    };

    match guild {
        Some(guild) => {
            request.extensions_mut().insert(AuthedGuild(guild));
            next.run(request).await
        }
        None => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildcast_store::{FailingTokenStore, MemoryTokenStore};

    fn resolver() -> TokenResolver {
        TokenResolver::new(Arc::new(
            MemoryTokenStore::new().with_token("tok-1", "guild-42"),
        ))
    }

    #[test]
    fn bearer_token_well_formed() {
        assert_eq!(bearer_token(Some("Bearer tok-1")), Some("tok-1"));
    }

    #[test]
    fn bearer_token_missing_header() {
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn bearer_token_no_scheme_separator() {
        assert_eq!(bearer_token(Some("tok-1")), None);
    }

    #[test]
    fn bearer_token_wrong_scheme() {
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(Some("bearer tok-1")), None);
    }

    #[test]
    fn bearer_token_empty_value() {
        assert_eq!(bearer_token(Some("Bearer ")), None);
    }

    #[tokio::test]
    async fn resolve_known_credential() {
        let guild = resolver().resolve("tok-1").await.unwrap();
        assert_eq!(guild.as_str(), "guild-42");
    }

    #[tokio::test]
    async fn resolve_unknown_credential() {
        assert!(resolver().resolve("unknown").await.is_none());
    }

    #[tokio::test]
    async fn resolve_store_outage_looks_like_unknown() {
        let resolver = TokenResolver::new(Arc::new(FailingTokenStore));
        assert!(resolver.resolve("tok-1").await.is_none());
    }

    #[tokio::test]
    async fn resolve_sees_store_updates_between_attempts() {
        let store = Arc::new(MemoryTokenStore::new());
        let resolver = TokenResolver::new(store.clone());
        assert!(resolver.resolve("tok-1").await.is_none());

        let mut table = guildcast_store::TokenTable::new();
        table.insert("tok-1".into(), GuildId::from_raw("guild-42"));
        store.store(&table).await.unwrap();

        assert!(resolver.resolve("tok-1").await.is_some());
    }
}
