//! Per-interaction correlation identifier.
//!
//! A [`RequestId`] is minted once per user-facing interaction and passed by
//! reference to every model call, tool call, and memory write made on its
//! behalf, so log lines can be joined back to the turn that caused them.
//!
//! Only the outermost boundary (the session driver) should use the ambient
//! slot via [`RequestId::scope`]. The slot is task-local: it does **not**
//! follow work onto `tokio::spawn`ed tasks, so deferred work must capture the
//! id explicitly.

use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT: RequestId;
}

/// Opaque correlation token for one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Run `fut` with `self` installed as the ambient request id.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// The ambient request id, if the current task runs inside [`RequestId::scope`].
    pub fn current() -> Option<RequestId> {
        CURRENT.try_with(|rid| rid.clone()).ok()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn serializes_as_plain_string() {
        let rid = RequestId::from("req-1");
        assert_eq!(serde_json::to_value(&rid).unwrap(), serde_json::json!("req-1"));
    }

    #[test]
    fn converts_from_str() {
        let rid: RequestId = "req-2".into();
        assert_eq!(rid.as_str(), "req-2");
        assert_eq!(rid.to_string(), "req-2");
    }

    #[tokio::test]
    async fn scope_exposes_current() {
        assert!(RequestId::current().is_none());
        let rid = RequestId::from("scoped");
        let seen = rid.clone().scope(async { RequestId::current() }).await;
        assert_eq!(seen, Some(rid));
        assert!(RequestId::current().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scope_does_not_cross_spawn() {
        let rid = RequestId::from("outer");
        let inner = rid
            .clone()
            .scope(async { tokio::spawn(async { RequestId::current() }).await.unwrap() })
            .await;
        assert!(inner.is_none());

        // Captured explicitly, the id does travel.
        let captured = rid
            .clone()
            .scope(async {
                let rid = RequestId::current().unwrap();
                tokio::spawn(async move { rid }).await.unwrap()
            })
            .await;
        assert_eq!(captured, rid);
    }
}
