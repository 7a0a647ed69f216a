//! Session store: lifecycle, TTL sweep, ordered teardown
//!
//! The store's map is the one globally shared mutable structure in the
//! runtime. All map access is a single lookup/insert/remove under the lock;
//! no check-then-act spans an await. Each session sits behind its own
//! `tokio::sync::Mutex`, so overlapping calls against one session serialize
//! instead of racing its reference cache and page stack.

use crate::config::SessionConfig;
use crate::error::DroverResult;
use crate::report::ArtifactSink;
use crate::session::{Session, SessionId};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Operational counters exposed for visibility, not control flow
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionMetrics {
    /// Sessions created over the store's lifetime
    pub total_created: u64,
    /// Sessions currently live
    pub active_sessions: usize,
    /// Identity and age in seconds of the oldest live session
    pub oldest: Option<(SessionId, i64)>,
    /// Sum of cached references across all live sessions
    pub cached_references: usize,
}

/// Owns every live session and its lifecycle
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    artifacts: Arc<dyn ArtifactSink>,
    session_timeout: Duration,
    total_created: AtomicU64,
}

impl SessionStore {
    pub fn new(session_timeout: Duration, artifacts: Arc<dyn ArtifactSink>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            artifacts,
            session_timeout,
            total_created: AtomicU64::new(0),
        }
    }

    /// Fetch the session for `id`, allocating a fresh one on first use
    pub async fn get_or_create(&self, id: &str, config: &SessionConfig) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }

        let session = Arc::new(Mutex::new(Session::new(id, config.clone())));
        sessions.insert(id.to_string(), session.clone());
        self.total_created.fetch_add(1, Ordering::Relaxed);
        info!(session = id, "created session");
        session
    }

    /// Fetch an existing session, refreshing its activity timestamp
    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.lock().await.touch();
        Some(session)
    }

    /// Refresh a session's last-activity timestamp, if it exists
    pub async fn update_activity(&self, id: &str) {
        if let Some(session) = self.sessions.read().await.get(id).cloned() {
            session.lock().await.touch();
        }
    }

    /// Remove the session from the map, then await its teardown.
    ///
    /// Unknown ids are a no-op. Teardown failures propagate as the typed
    /// aggregate; the session is gone from the map either way.
    pub async fn delete(&self, id: &str) -> DroverResult<()> {
        let session = self.sessions.write().await.remove(id);
        let session = match session {
            Some(session) => session,
            None => return Ok(()),
        };

        info!(session = id, "deleting session");
        let mut session = session.lock().await;
        session.teardown(self.artifacts.as_ref()).await?;
        Ok(())
    }

    /// One sweep pass: remove every session idle past the timeout and tear
    /// each down in its own background task. Sessions mid-call hold their
    /// mutex and are skipped; they are not idle.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let timeout =
            chrono::Duration::from_std(self.session_timeout).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<(SessionId, Arc<Mutex<Session>>)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, session)| match session.try_lock() {
                    Ok(guard) => now - guard.last_activity > timeout,
                    Err(_) => false,
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        for (id, session) in expired {
            info!(session = %id, "session expired, tearing down");
            let artifacts = self.artifacts.clone();
            tokio::spawn(async move {
                let mut session = session.lock().await;
                if let Err(failure) = session.teardown(artifacts.as_ref()).await {
                    warn!(session = %id, %failure, "expired session teardown failed");
                }
            });
        }
    }

    /// Spawn the periodic TTL sweep task. Abort the handle on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                store.sweep().await;
            }
        })
    }

    /// Tear down every remaining session concurrently, best-effort.
    /// Individual failures are logged, never propagated.
    pub async fn dispose(&self) {
        let drained: Vec<(SessionId, Arc<Mutex<Session>>)> =
            self.sessions.write().await.drain().collect();

        if drained.is_empty() {
            return;
        }

        debug!(count = drained.len(), "disposing all sessions");
        let artifacts = &self.artifacts;
        join_all(drained.into_iter().map(|(id, session)| async move {
            let mut session = session.lock().await;
            if let Err(failure) = session.teardown(artifacts.as_ref()).await {
                warn!(session = %id, %failure, "teardown failed during dispose");
            }
        }))
        .await;
    }

    /// Counts for operational visibility
    pub async fn metrics(&self) -> SessionMetrics {
        let sessions = self.sessions.read().await;
        let now = Utc::now();

        let mut oldest: Option<(SessionId, chrono::DateTime<Utc>)> = None;
        let mut cached_references = 0;

        for (id, session) in sessions.iter() {
            // a busy session is mid-call; skip its details rather than wait
            if let Ok(guard) = session.try_lock() {
                cached_references += guard.refs.len();
                if oldest
                    .as_ref()
                    .is_none_or(|(_, created)| guard.created_at < *created)
                {
                    oldest = Some((id.clone(), guard.created_at));
                }
            }
        }

        SessionMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            active_sessions: sessions.len(),
            oldest: oldest.map(|(id, created)| (id, (now - created).num_seconds())),
            cached_references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StubDriver;
    use crate::report::FsArtifactSink;
    use serde_json::json;

    fn store_with(timeout: Duration) -> (Arc<SessionStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FsArtifactSink::new(dir.path()));
        (Arc::new(SessionStore::new(timeout, sink)), dir)
    }

    #[tokio::test]
    async fn get_or_create_allocates_once_per_identity() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        let config = SessionConfig::default();

        let a = store.get_or_create("client-1", &config).await;
        let b = store.get_or_create("client-1", &config).await;
        assert!(Arc::ptr_eq(&a, &b));

        store.get_or_create("client-2", &config).await;
        let metrics = store.metrics().await;
        assert_eq!(metrics.total_created, 2);
        assert_eq!(metrics.active_sessions, 2);
    }

    #[tokio::test]
    async fn get_refreshes_activity_and_misses_unknown_ids() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        let config = SessionConfig::default();

        store.get_or_create("client-1", &config).await;
        let before = store.get("client-1").await.unwrap().lock().await.last_activity;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.update_activity("client-1").await;
        let after = store.get("client-1").await.unwrap().lock().await.last_activity;
        assert!(after > before);

        assert!(store.get("unknown").await.is_none());
        store.update_activity("unknown").await; // no-op
    }

    #[tokio::test]
    async fn sweep_removes_idle_sessions_and_tears_them_down() {
        let (store, dir) = store_with(Duration::from_millis(20));
        let config = SessionConfig::default();

        {
            let session = store.get_or_create("idle", &config).await;
            let mut session = session.lock().await;
            // failing disconnect must not stop the other teardown steps
            session.attach_driver(Box::new(StubDriver::failing_disconnect()));
            session.report = Some(crate::report::SessionReport::new("idle"));
            session.refs.put("element", json!({}));
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        store.sweep().await;

        assert!(store.get("idle").await.is_none());
        assert_eq!(store.metrics().await.active_sessions, 0);

        // teardown ran in the background: report persisted despite step 3 failing
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dir.path().join("idle/report.json").exists());
    }

    #[tokio::test]
    async fn sweep_keeps_recently_active_sessions() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        store.get_or_create("busy", &SessionConfig::default()).await;

        store.sweep().await;
        assert!(store.get("busy").await.is_some());
    }

    #[tokio::test]
    async fn delete_awaits_teardown_and_propagates_failures() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        let config = SessionConfig::default();

        {
            let session = store.get_or_create("doomed", &config).await;
            session
                .lock()
                .await
                .attach_driver(Box::new(StubDriver::failing_disconnect()));
        }

        let error = store.delete("doomed").await.unwrap_err();
        assert!(error.to_string().contains("disconnect"));
        assert!(store.get("doomed").await.is_none());

        // deleting an unknown id is a no-op
        store.delete("doomed").await.unwrap();
    }

    #[tokio::test]
    async fn dispose_tears_down_everything_without_failing() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        let config = SessionConfig::default();

        for id in ["a", "b", "c"] {
            let session = store.get_or_create(id, &config).await;
            session
                .lock()
                .await
                .attach_driver(Box::new(StubDriver::failing_disconnect()));
        }

        store.dispose().await;
        assert_eq!(store.metrics().await.active_sessions, 0);
    }

    #[tokio::test]
    async fn metrics_reports_oldest_session_and_reference_totals() {
        let (store, _dir) = store_with(Duration::from_secs(60));
        let config = SessionConfig::default();

        let first = store.get_or_create("first", &config).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.get_or_create("second", &config).await;

        first.lock().await.refs.put("element", json!(1));
        second.lock().await.refs.put("element", json!(2));
        second.lock().await.refs.put("element", json!(3));

        let metrics = store.metrics().await;
        assert_eq!(metrics.cached_references, 3);
        assert_eq!(metrics.oldest.unwrap().0, "first");
    }
}
