//! Session registry.
//!
//! Each session id maps to one [`Workflow`] behind its own async mutex, so
//! operations against the same session run one at a time while separate
//! sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use crate::workflow::Workflow;

/// Handle to a session's workflow.
pub type SharedWorkflow = Arc<Mutex<Workflow>>;

/// Session id used when a caller does not supply one.
pub const DEFAULT_SESSION: &str = "default";

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SharedWorkflow>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session's workflow, creating an idle one on first use.
    pub fn get_or_create(&self, id: &str) -> SharedWorkflow {
        if let Some(existing) = self.sessions.read().get(id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session = %id, "Creating session");
                Arc::new(Mutex::new(Workflow::new(id)))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<SharedWorkflow> {
        self.sessions.read().get(id).cloned()
    }

    /// Reset a session to `idle`, waiting for any in-flight operation on it.
    ///
    /// Unknown ids are already idle and are not registered.
    pub async fn reset(&self, id: &str) {
        if let Some(workflow) = self.get(id) {
            workflow.lock().await.reset();
        }
    }

    /// Drop a session entirely.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageModel;
    use crate::workflow::Phase;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");

        a.lock()
            .await
            .record_exploration(PageModel::skeleton("https://a.test"), PathBuf::from("a.json"));

        assert_eq!(a.lock().await.phase(), Phase::Explored);
        assert_eq!(b.lock().await.phase(), Phase::Idle);
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_same_id_returns_same_workflow() {
        let registry = SessionRegistry::new();
        let first = registry.get_or_create(DEFAULT_SESSION);
        let second = registry.get_or_create(DEFAULT_SESSION);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let registry = SessionRegistry::new();
        let wf = registry.get_or_create("s");
        wf.lock()
            .await
            .record_exploration(PageModel::skeleton("https://a.test"), PathBuf::from("a.json"));
        registry.reset("s").await;
        assert_eq!(wf.lock().await.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_reset_unknown_session_registers_nothing() {
        let registry = SessionRegistry::new();
        registry.reset("never-seen").await;
        assert!(registry.is_empty());
        assert!(registry.get("never-seen").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_operations_serialize() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let wf = registry.get_or_create("shared");
                let mut guard = wf.lock().await;
                let before = guard.metrics().iteration_count;
                tokio::task::yield_now().await;
                guard.record_call(1.0, 1);
                assert_eq!(guard.metrics().iteration_count, before + 1);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let wf = registry.get_or_create("shared");
        assert_eq!(wf.lock().await.metrics().iteration_count, 8);
    }
}
