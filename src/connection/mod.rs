//! Connection manager
//!
//! Keeps the freshest obtainable snapshot available. On start it pulls
//! immediately and opens the push channel concurrently. The poll keeps
//! running on its interval even while push is healthy, so a silently dead
//! push channel still heals. Failures are logged and swallowed; the last
//! good snapshot stays published.
//!
//! ```text
//!   ┌────────────┐ pull every N s  ┌──────────────┐
//!   │ poll task  │────────────────►│              │
//!   └────────────┘                 │  watch<Arc<  │──► subscribers
//!   ┌────────────┐ on server push  │  Snapshot>>  │    (last write wins)
//!   │ push task  │────────────────►│              │
//!   └────────────┘                 └──────────────┘
//! ```

use crate::config::AppConfig;
use crate::gateway::{RemoteSessionSnapshot, SessionSource};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// First push reconnect delay
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Pull,
    Push,
}

/// One complete set of sessions as received from the gateway
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source: SnapshotSource,
    pub sessions: Vec<RemoteSessionSnapshot>,
    pub received_at: DateTime<Utc>,
    /// Increases by one per published snapshot
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub poll_interval: Duration,
    pub pull_limit: usize,
    pub push_enabled: bool,
    pub max_backoff: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            pull_limit: 50,
            push_enabled: true,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for ConnectionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            pull_limit: config.pull_limit,
            push_enabled: config.push_enabled,
            ..Default::default()
        }
    }
}

struct Shared {
    refreshing: AtomicBool,
    push_connected: AtomicBool,
    refresh: Notify,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Shared {
    fn new() -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            refreshing: AtomicBool::new(false),
            push_connected: AtomicBool::new(false),
            refresh: Notify::new(),
            snapshots,
        }
    }

    /// Numbering and sending happen under the channel's write lock, so the
    /// published revision never goes backwards.
    fn publish(&self, source: SnapshotSource, sessions: Vec<RemoteSessionSnapshot>) {
        self.snapshots.send_modify(|slot| {
            let revision = slot.as_ref().map_or(0, |s| s.revision) + 1;
            tracing::debug!(
                "Snapshot r{} from {:?}: {} session(s)",
                revision,
                source,
                sessions.len()
            );
            *slot = Some(Arc::new(Snapshot {
                source,
                sessions,
                received_at: Utc::now(),
                revision,
            }));
        });
    }
}

/// Resets the refreshing flag even if the pull is cancelled
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the poll timer and push subscription for one dashboard instance
pub struct ConnectionManager {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start polling and pushing. Must be called inside a tokio runtime.
    pub fn start(source: Arc<dyn SessionSource>, settings: ConnectionSettings) -> Self {
        let shared = Arc::new(Shared::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(poll_loop(
            source.clone(),
            shared.clone(),
            settings.clone(),
            shutdown_rx.clone(),
        ))];
        if settings.push_enabled {
            tasks.push(tokio::spawn(push_loop(
                source,
                shared.clone(),
                settings,
                shutdown_rx,
            )));
        }

        Self {
            shared,
            shutdown,
            tasks,
        }
    }

    /// Receiver of the latest snapshot; `None` until the first success
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.shared.snapshots.subscribe()
    }

    /// Last known-good snapshot
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.shared.snapshots.borrow().clone()
    }

    /// True once any snapshot has arrived during this manager's lifetime
    pub fn is_connected(&self) -> bool {
        self.shared.snapshots.borrow().is_some()
    }

    /// True while a pull is in flight
    pub fn is_refreshing(&self) -> bool {
        self.shared.refreshing.load(Ordering::SeqCst)
    }

    pub fn is_push_connected(&self) -> bool {
        self.shared.push_connected.load(Ordering::SeqCst)
    }

    /// Pull now instead of waiting for the next tick
    pub fn refresh_now(&self) {
        self.shared.refresh.notify_one();
    }

    /// Stop the poll timer and close the push channel
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::debug!("Connection manager stopped");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn poll_loop(
    source: Arc<dyn SessionSource>,
    shared: Arc<Shared>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(settings.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // first tick completes immediately: that is the initial paint
        tokio::select! {
            _ = interval.tick() => {}
            _ = shared.refresh.notified() => interval.reset(),
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = pull_once(source.as_ref(), &shared, settings.pull_limit) => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn pull_once(source: &dyn SessionSource, shared: &Shared, limit: usize) {
    shared.refreshing.store(true, Ordering::SeqCst);
    let _guard = RefreshGuard(&shared.refreshing);

    match source.pull(limit).await {
        Ok(sessions) => shared.publish(SnapshotSource::Pull, sessions),
        Err(e) if e.is_offline() => tracing::debug!("Pull failed, keeping last snapshot: {}", e),
        Err(e) => tracing::warn!("Pull failed, keeping last snapshot: {}", e),
    }
}

async fn push_loop(
    source: Arc<dyn SessionSource>,
    shared: Arc<Shared>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = INITIAL_BACKOFF.min(settings.max_backoff);

    loop {
        let connect = tokio::select! {
            result = source.subscribe() => result,
            _ = shutdown.changed() => break,
        };

        match connect {
            Ok(mut stream) => {
                tracing::info!("Push channel connected");
                backoff = INITIAL_BACKOFF.min(settings.max_backoff);
                shared.push_connected.store(true, Ordering::SeqCst);

                let stop = loop {
                    tokio::select! {
                        item = stream.next() => match item {
                            Some(Ok(sessions)) => shared.publish(SnapshotSource::Push, sessions),
                            Some(Err(e)) => {
                                tracing::warn!("Push channel error: {}", e);
                                break false;
                            }
                            None => {
                                tracing::info!("Push channel closed by gateway");
                                break false;
                            }
                        },
                        _ = shutdown.changed() => break true,
                    }
                };

                shared.push_connected.store(false, Ordering::SeqCst);
                if stop {
                    break;
                }
            }
            Err(e) => tracing::debug!("Push connect failed: {}", e),
        }

        tracing::debug!("Push reconnect in {:?}", backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        backoff = next_backoff(backoff, settings.max_backoff);
    }

    shared.push_connected.store(false, Ordering::SeqCst);
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PushStream;
    use crate::{FleetError, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Scripted pulls (errors once the script runs out) and one push channel
    struct FakeSource {
        pulls: Mutex<VecDeque<Result<Vec<RemoteSessionSnapshot>>>>,
        pull_count: AtomicUsize,
        push: Mutex<Option<mpsc::UnboundedReceiver<Vec<RemoteSessionSnapshot>>>>,
    }

    impl FakeSource {
        fn new(pulls: Vec<Result<Vec<RemoteSessionSnapshot>>>) -> (Arc<Self>, mpsc::UnboundedSender<Vec<RemoteSessionSnapshot>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let source = Arc::new(Self {
                pulls: Mutex::new(pulls.into()),
                pull_count: AtomicUsize::new(0),
                push: Mutex::new(Some(rx)),
            });
            (source, tx)
        }
    }

    #[async_trait]
    impl SessionSource for FakeSource {
        async fn pull(&self, _limit: usize) -> Result<Vec<RemoteSessionSnapshot>> {
            self.pull_count.fetch_add(1, Ordering::SeqCst);
            self.pulls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FleetError::ConnectionUnavailable("script exhausted".into())))
        }

        async fn subscribe(&self) -> Result<PushStream> {
            let rx = self
                .push
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FleetError::ConnectionUnavailable("already subscribed".into()))?;
            let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|sessions| (Ok(sessions), rx))
            });
            Ok(stream.boxed())
        }
    }

    fn sessions(keys: &[&str]) -> Vec<RemoteSessionSnapshot> {
        keys.iter()
            .map(|k| RemoteSessionSnapshot {
                key: k.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn keys(snapshot: &Snapshot) -> Vec<String> {
        snapshot.sessions.iter().map(|s| s.key.clone()).collect()
    }

    fn settings(poll_ms: u64) -> ConnectionSettings {
        ConnectionSettings {
            poll_interval: Duration::from_millis(poll_ms),
            max_backoff: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<Option<Arc<Snapshot>>>, mut done: F) -> Arc<Snapshot>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    if done(&snapshot) {
                        return snapshot;
                    }
                }
                rx.changed().await.expect("manager alive");
            }
        })
        .await
        .expect("snapshot in time")
    }

    #[tokio::test]
    async fn test_initial_pull_paints_immediately() {
        let (source, _push) = FakeSource::new(vec![Ok(sessions(&["a", "b", "c"]))]);
        let manager = ConnectionManager::start(source, settings(3_600_000));

        let mut rx = manager.subscribe();
        let snapshot = wait_for(&mut rx, |_| true).await;
        assert_eq!(keys(&snapshot), vec!["a", "b", "c"]);
        assert_eq!(snapshot.source, SnapshotSource::Pull);
        assert!(manager.is_connected());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_never_publish() {
        let (source, _push) = FakeSource::new(vec![Err(FleetError::Unauthorized)]);
        let manager = ConnectionManager::start(source.clone(), settings(10));

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.pull_count.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(manager.latest().is_none());
        assert!(!manager.is_connected());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_pull_is_a_valid_snapshot() {
        let (source, _push) = FakeSource::new(vec![
            Ok(sessions(&["a", "b", "c"])),
            Ok(Vec::new()),
        ]);
        let manager = ConnectionManager::start(source.clone(), settings(10));
        let mut rx = manager.subscribe();

        let snapshot = wait_for(&mut rx, |s| s.sessions.is_empty()).await;
        assert_eq!(snapshot.revision, 2);

        // later failures keep the empty snapshot
        while source.pull_count.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.is_connected());
        assert!(manager.latest().unwrap().sessions.is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_push_and_poll_last_write_wins() {
        let (source, push) = FakeSource::new(vec![Ok(sessions(&["polled"]))]);
        let manager = ConnectionManager::start(source, settings(3_600_000));
        let mut rx = manager.subscribe();

        wait_for(&mut rx, |s| s.source == SnapshotSource::Pull).await;
        push.send(sessions(&["pushed-1", "pushed-2"])).unwrap();

        let snapshot = wait_for(&mut rx, |s| s.source == SnapshotSource::Push).await;
        assert_eq!(keys(&snapshot), vec!["pushed-1", "pushed-2"]);
        assert_eq!(keys(&manager.latest().unwrap()), vec!["pushed-1", "pushed-2"]);
        assert!(manager.is_push_connected());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_now_pulls_out_of_band() {
        let (source, _push) = FakeSource::new(vec![Ok(sessions(&["a"])), Ok(sessions(&["b"]))]);
        let manager = ConnectionManager::start(source, settings(3_600_000));
        let mut rx = manager.subscribe();

        wait_for(&mut rx, |s| s.revision == 1).await;
        manager.refresh_now();
        let snapshot = wait_for(&mut rx, |s| s.revision == 2).await;
        assert_eq!(keys(&snapshot), vec!["b"]);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_push_and_stops_polling() {
        let (source, push) = FakeSource::new(vec![Ok(sessions(&["a"]))]);
        let manager = ConnectionManager::start(source.clone(), settings(10));
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |_| true).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !manager.is_push_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown().await;
        assert!(push.is_closed());

        let pulls = source.pull_count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.pull_count.load(Ordering::SeqCst), pulls);
    }

    #[test]
    fn test_concurrent_publishes_keep_revisions_ordered() {
        let shared = Arc::new(Shared::new());
        let mut rx = shared.snapshots.subscribe();

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let source = if n % 2 == 0 { SnapshotSource::Pull } else { SnapshotSource::Push };
                        shared.publish(source, Vec::new());
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let latest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(latest.revision, 400);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let max = Duration::from_secs(30);
        assert_eq!(next_backoff(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(20), max), max);
    }
}
