use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ServiceError;

/// Header carrying the caller's anonymous player identity.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Source of the identity of the user issuing a command.
pub trait IdentityProvider: Send + Sync {
    /// Stable opaque identity, `None` when the caller is anonymous.
    fn current_identity(&self) -> Option<String>;

    /// Identity or [`ServiceError::IdentityUnavailable`].
    fn require_identity(&self) -> Result<String, ServiceError> {
        self.current_identity()
            .ok_or(ServiceError::IdentityUnavailable)
    }
}

/// Identity resolved from the `x-player-id` request header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity(Option<String>);

impl CallerIdentity {
    /// Known caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    /// Caller without an identity.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for CallerIdentity {
    fn current_identity(&self) -> Option<String> {
        self.0.clone()
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(PLAYER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= 64)
            .map(str::to_owned);
        Ok(Self(identity))
    }
}

/// Issue a fresh anonymous identity for a client signing in on demand.
pub fn issue_identity() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> CallerIdentity {
        let (mut parts, _) = request.into_parts();
        CallerIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reads_identity_from_header() {
        let request = Request::builder()
            .header(PLAYER_ID_HEADER, " player-1 ")
            .body(())
            .unwrap();
        let identity = extract(request).await;
        assert_eq!(identity.require_identity().unwrap(), "player-1");
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_anonymous() {
        let identity = extract(Request::builder().body(()).unwrap()).await;
        assert!(matches!(
            identity.require_identity(),
            Err(ServiceError::IdentityUnavailable)
        ));

        let blank = Request::builder()
            .header(PLAYER_ID_HEADER, "   ")
            .body(())
            .unwrap();
        assert_eq!(extract(blank).await, CallerIdentity::anonymous());
    }

    #[test]
    fn issued_identities_are_unique() {
        assert_ne!(issue_identity(), issue_identity());
    }
}
