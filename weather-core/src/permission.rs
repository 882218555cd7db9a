use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::Mutex;

use crate::config::PermissionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Source of the user's answer to "may this app read your location?".
#[async_trait]
pub trait PermissionGate: Send + Sync + Debug {
    async fn ensure_location_permission(&self) -> PermissionStatus;
}

/// Always answers the same way. Used for `granted`/`denied` config modes and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub PermissionStatus);

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn ensure_location_permission(&self) -> PermissionStatus {
        self.0
    }
}

impl StaticPermission {
    /// `None` for `ask`, which needs an interactive gate.
    pub fn from_mode(mode: PermissionMode) -> Option<Self> {
        match mode {
            PermissionMode::Ask => None,
            PermissionMode::Granted => Some(Self(PermissionStatus::Granted)),
            PermissionMode::Denied => Some(Self(PermissionStatus::Denied)),
        }
    }
}

/// Asks the inner gate at most once and remembers the answer until [`reset`].
///
/// A denial stays in force for the rest of the session.
///
/// [`reset`]: SessionPermission::reset
#[derive(Debug)]
pub struct SessionPermission<G> {
    inner: G,
    decided: Mutex<Option<PermissionStatus>>,
}

impl<G: PermissionGate> SessionPermission<G> {
    pub fn new(inner: G) -> Self {
        Self { inner, decided: Mutex::new(None) }
    }

    /// Forget the remembered answer so the next call prompts again.
    pub async fn reset(&self) {
        *self.decided.lock().await = None;
    }
}

#[async_trait]
impl<G: PermissionGate> PermissionGate for SessionPermission<G> {
    async fn ensure_location_permission(&self) -> PermissionStatus {
        // Held across the prompt so concurrent callers share one answer.
        let mut decided = self.decided.lock().await;
        if let Some(status) = *decided {
            return status;
        }

        let status = self.inner.ensure_location_permission().await;
        tracing::info!(?status, "location permission decided");
        *decided = Some(status);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingGate {
        answer: Option<PermissionStatus>,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl PermissionGate for CountingGate {
        async fn ensure_location_permission(&self) -> PermissionStatus {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer.unwrap_or(PermissionStatus::Denied)
        }
    }

    #[tokio::test]
    async fn denial_is_remembered_for_the_session() {
        let gate = SessionPermission::new(CountingGate::default());

        assert_eq!(gate.ensure_location_permission().await, PermissionStatus::Denied);
        assert_eq!(gate.ensure_location_permission().await, PermissionStatus::Denied);
        assert_eq!(gate.inner.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_prompts_again() {
        let gate = SessionPermission::new(CountingGate {
            answer: Some(PermissionStatus::Granted),
            ..Default::default()
        });

        gate.ensure_location_permission().await;
        gate.reset().await;
        gate.ensure_location_permission().await;
        assert_eq!(gate.inner.asked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn static_permission_from_mode() {
        assert!(StaticPermission::from_mode(PermissionMode::Ask).is_none());
        assert_eq!(
            StaticPermission::from_mode(PermissionMode::Denied).map(|p| p.0),
            Some(PermissionStatus::Denied)
        );
    }
}
