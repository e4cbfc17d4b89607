use crate::connection::{LineChannel, LineReceiver};
use crate::error::{AmpError, Result};
use crate::protocol::encode_query;
use crate::status::{decode_status_line, is_query_echo, ZoneStatus};
use crate::subscription::StatusReceiver;
use crate::types::{Zone, ZoneState};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STATUS_CHANNEL_CAPACITY: usize = 100;

/// A caller waiting for the next status of one zone
struct Waiter {
    id: u64,
    tx: oneshot::Sender<ZoneStatus>,
}

/// Dequeues a waiter when its query finishes or is dropped
struct WaiterGuard<'a> {
    monitor: &'a ZoneMonitor,
    zone: Zone,
    id: u64,
}

impl WaiterGuard<'_> {
    /// Dequeue now; returns whether the waiter was still queued
    fn dequeue(self) -> bool {
        let removed = self.monitor.remove_waiter(self.zone, self.id);
        std::mem::forget(self);
        removed
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.monitor.remove_waiter(self.zone, self.id);
    }
}

/// Cache and waiter queues, always mutated together under one lock
#[derive(Default)]
struct MonitorState {
    /// Last status seen per zone
    cache: HashMap<Zone, ZoneStatus>,
    /// Waiters per zone, oldest first
    waiters: HashMap<Zone, VecDeque<Waiter>>,
    next_waiter_id: u64,
}

/// Correlates status replies with the queries that asked for them
///
/// The amplifier's replies carry no request id, so a query is answered by the
/// next status line for its zone. Every caller waiting on that zone is
/// resolved by the same line; a caller whose deadline passes first gets the
/// last cached status, or [`ZoneState::Unknown`] if the zone never reported.
pub struct ZoneMonitor {
    channel: Arc<dyn LineChannel>,
    zones: Vec<Zone>,
    state: Mutex<MonitorState>,
    status_tx: broadcast::Sender<ZoneStatus>,
}

impl ZoneMonitor {
    /// Create a monitor for the given zones with an empty cache
    pub fn new(channel: Arc<dyn LineChannel>, zones: impl IntoIterator<Item = Zone>) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            channel,
            zones: zones.into_iter().collect(),
            state: Mutex::new(MonitorState::default()),
            status_tx,
        }
    }

    /// Feed every line from `lines` into [`handle_line`](Self::handle_line)
    ///
    /// The task ends when the line stream closes or the monitor is dropped.
    pub fn spawn_listener(self: &Arc<Self>, mut lines: LineReceiver) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                match monitor.upgrade() {
                    Some(monitor) => monitor.handle_line(&line),
                    None => break,
                }
            }
            tracing::debug!("Line listener stopped");
        })
    }

    /// Configured zones
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Whether `zone` is one of the configured zones
    pub fn has_zone(&self, zone: Zone) -> bool {
        self.zones.contains(&zone)
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process one received line
    ///
    /// A status line replaces the cached status for its zone and resolves
    /// every waiter queued for that zone, in queue order. Anything else is
    /// logged and dropped.
    pub fn handle_line(&self, line: &str) {
        let Some(status) = decode_status_line(line) else {
            if is_query_echo(line) {
                tracing::debug!("Ignoring query echo: {}", line);
            } else {
                tracing::warn!("Unrecognized line: {:?}", line);
            }
            return;
        };

        tracing::debug!("Parsed status for zone {}: {:?}", status.zone, status);

        let resolved = {
            let mut state = self.lock_state();
            state.cache.insert(status.zone, status.clone());
            let waiters = state.waiters.remove(&status.zone).unwrap_or_default();
            let count = waiters.len();
            // Sent while locked so a timing-out waiter sees either its queue
            // entry or a value in its receiver
            for waiter in waiters {
                let _ = waiter.tx.send(status.clone());
            }
            count
        };

        if resolved > 0 {
            tracing::debug!("Resolved {} waiter(s) for zone {}", resolved, status.zone);
        }

        let _ = self.status_tx.send(status);
    }

    /// Send raw command text on the line channel
    pub async fn send(&self, command: &str) -> Result<()> {
        self.channel.send(command).await
    }

    /// Query a zone and wait for its next status reply
    ///
    /// Resolves exactly once: with the next status line for `zone`, or after
    /// `wait` with the previously cached status (or [`ZoneState::Unknown`]).
    /// Only an unknown zone or a failed send is an error.
    pub async fn query_and_await(&self, zone: Zone, wait: Duration) -> Result<ZoneState> {
        if !self.has_zone(zone) {
            return Err(AmpError::UnknownZone(zone));
        }

        // Registered before sending so a fast reply cannot slip past
        let (id, mut rx, fallback) = self.register_waiter(zone);
        let guard = WaiterGuard {
            monitor: self,
            zone,
            id,
        };

        // A failed send drops the guard, which dequeues the waiter
        self.channel.send(&encode_query(zone)).await?;

        match timeout(wait, &mut rx).await {
            Ok(Ok(status)) => Ok(ZoneState::Reported(status)),
            Ok(Err(_)) => Ok(fallback),
            Err(_) => Ok(self.expire(guard, &mut rx, fallback, wait)),
        }
    }

    /// Queue a waiter for `zone`, capturing the current cache entry as its fallback
    fn register_waiter(&self, zone: Zone) -> (u64, oneshot::Receiver<ZoneStatus>, ZoneState) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock_state();
        let fallback = match state.cache.get(&zone) {
            Some(status) => ZoneState::Reported(status.clone()),
            None => ZoneState::Unknown { zone },
        };
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.waiters.entry(zone).or_default().push_back(Waiter { id, tx });
        (id, rx, fallback)
    }

    /// Settle a waiter whose deadline has passed
    fn expire(
        &self,
        guard: WaiterGuard<'_>,
        rx: &mut oneshot::Receiver<ZoneStatus>,
        fallback: ZoneState,
        wait: Duration,
    ) -> ZoneState {
        let zone = guard.zone;
        if guard.dequeue() {
            tracing::warn!(
                "No reply from zone {} within {:?}, using {}",
                zone,
                wait,
                if fallback.is_known() { "cached status" } else { "placeholder" }
            );
            return fallback;
        }
        // Resolved by a line between the deadline and taking the lock
        match rx.try_recv() {
            Ok(status) => ZoneState::Reported(status),
            Err(_) => fallback,
        }
    }

    /// Remove a waiter if it is still queued; returns whether it was
    fn remove_waiter(&self, zone: Zone, id: u64) -> bool {
        let mut state = self.lock_state();
        let Some(queue) = state.waiters.get_mut(&zone) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|waiter| waiter.id == id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            state.waiters.remove(&zone);
        }
        true
    }

    /// Last cached status of a zone
    pub fn cached(&self, zone: Zone) -> Option<ZoneStatus> {
        self.lock_state().cache.get(&zone).cloned()
    }

    /// Copy of the whole status cache, ordered by zone
    pub fn snapshot(&self) -> BTreeMap<Zone, ZoneStatus> {
        self.lock_state()
            .cache
            .iter()
            .map(|(zone, status)| (*zone, status.clone()))
            .collect()
    }

    /// Number of callers currently waiting on a zone
    pub fn pending_waiters(&self, zone: Zone) -> usize {
        self.lock_state().waiters.get(&zone).map_or(0, VecDeque::len)
    }

    /// Subscribe to every decoded status line
    pub fn subscribe(&self) -> StatusReceiver {
        StatusReceiver::new(self.status_tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FieldValue;
    use async_trait::async_trait;

    const ZONE_11: &str = "#>1100010000302007100500";
    const ZONE_11_LOUDER: &str = "#>1100010000452007100500";

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LineChannel for RecordingChannel {
        async fn send(&self, command: &str) -> Result<()> {
            if self.fail {
                return Err(AmpError::TransportSend(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "port closed",
                )));
            }
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }

    fn monitor_with(channel: RecordingChannel) -> (Arc<ZoneMonitor>, Arc<RecordingChannel>) {
        let channel = Arc::new(channel);
        let monitor = Arc::new(ZoneMonitor::new(channel.clone(), [11, 12]));
        (monitor, channel)
    }

    async fn wait_for_waiters(monitor: &ZoneMonitor, zone: Zone, count: usize) {
        while monitor.pending_waiters(zone) < count {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn status_line_updates_cache() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        monitor.handle_line(ZONE_11);

        let cached = monitor.cached(11).unwrap();
        assert_eq!(cached.volume, FieldValue::Number(30));
        assert_eq!(monitor.snapshot().keys().copied().collect::<Vec<_>>(), vec![11]);
    }

    #[test]
    fn newer_status_replaces_older() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        monitor.handle_line(ZONE_11);
        monitor.handle_line(ZONE_11_LOUDER);
        assert_eq!(monitor.cached(11).unwrap().volume, FieldValue::Number(45));
    }

    #[test]
    fn noise_leaves_cache_untouched() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        for line in ["hello", "#?11", "12345", ""] {
            monitor.handle_line(line);
        }
        assert!(monitor.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn query_sends_and_resolves_on_reply() {
        let (monitor, channel) = monitor_with(RecordingChannel::default());

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.query_and_await(11, Duration::from_secs(1)).await })
        };
        wait_for_waiters(&monitor, 11, 1).await;
        monitor.handle_line(ZONE_11);

        let state = task.await.unwrap().unwrap();
        assert_eq!(state, ZoneState::Reported(decode_status_line(ZONE_11).unwrap()));
        assert_eq!(channel.sent(), vec!["?11"]);
        assert_eq!(monitor.pending_waiters(11), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_reply_resolves_every_waiter() {
        let (monitor, _) = monitor_with(RecordingChannel::default());

        let spawn_query = |wait_ms| {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                monitor
                    .query_and_await(11, Duration::from_millis(wait_ms))
                    .await
            })
        };
        let first = spawn_query(1000);
        let second = spawn_query(5000);

        wait_for_waiters(&monitor, 11, 2).await;
        monitor.handle_line(ZONE_11);

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first, second);
        assert!(first.is_known());
        assert_eq!(monitor.pending_waiters(11), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_for_other_zone_does_not_resolve() {
        let (monitor, _) = monitor_with(RecordingChannel::default());

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.query_and_await(12, Duration::from_millis(200)).await })
        };
        wait_for_waiters(&monitor, 12, 1).await;
        monitor.handle_line(ZONE_11);

        assert_eq!(task.await.unwrap().unwrap(), ZoneState::Unknown { zone: 12 });
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back_to_cached_status() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        monitor.handle_line(ZONE_11);

        let state = monitor
            .query_and_await(11, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(state, ZoneState::Reported(decode_status_line(ZONE_11).unwrap()));
        assert_eq!(monitor.pending_waiters(11), 0);

        // A late reply only refreshes the cache
        monitor.handle_line(ZONE_11_LOUDER);
        assert_eq!(monitor.cached(11).unwrap().volume, FieldValue::Number(45));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_for_unseen_zone_yields_placeholder() {
        let (monitor, _) = monitor_with(RecordingChannel::default());

        let state = monitor
            .query_and_await(12, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(state, ZoneState::Unknown { zone: 12 });
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"zone":12}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_queries_leave_no_waiters() {
        let (monitor, _) = monitor_with(RecordingChannel::default());

        for _ in 0..1000 {
            let abandoned = tokio::time::timeout(
                Duration::from_millis(10),
                monitor.query_and_await(11, Duration::from_secs(1)),
            )
            .await;
            assert!(abandoned.is_err());
        }
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(monitor.pending_waiters(11), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_query_task_dequeues_its_waiter() {
        let (monitor, _) = monitor_with(RecordingChannel::default());

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.query_and_await(12, Duration::from_secs(60)).await })
        };
        wait_for_waiters(&monitor, 12, 1).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(monitor.pending_waiters(12), 0);
    }

    #[test]
    fn expiry_after_reply_returns_the_reply() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        monitor.handle_line(ZONE_11);

        // The reply lands after the deadline but before the waiter is dequeued
        let (id, mut rx, fallback) = monitor.register_waiter(11);
        monitor.handle_line(ZONE_11_LOUDER);
        let guard = WaiterGuard {
            monitor: monitor.as_ref(),
            zone: 11,
            id,
        };
        let state = monitor.expire(guard, &mut rx, fallback, Duration::from_millis(100));

        assert_eq!(state.status().unwrap().volume, FieldValue::Number(45));
        assert_eq!(monitor.pending_waiters(11), 0);
    }

    #[test]
    fn expiry_without_reply_returns_the_fallback() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        monitor.handle_line(ZONE_11);

        let (id, mut rx, fallback) = monitor.register_waiter(11);
        let guard = WaiterGuard {
            monitor: monitor.as_ref(),
            zone: 11,
            id,
        };
        let state = monitor.expire(guard, &mut rx, fallback, Duration::from_millis(100));

        assert_eq!(state.status().unwrap().volume, FieldValue::Number(30));
        assert_eq!(monitor.pending_waiters(11), 0);

        // A later reply has no waiter left to resolve
        monitor.handle_line(ZONE_11_LOUDER);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_failure_is_immediate_and_leaves_no_waiter() {
        let (monitor, _) = monitor_with(RecordingChannel::failing());

        let err = monitor
            .query_and_await(11, Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, AmpError::TransportSend(_)));
        assert_eq!(monitor.pending_waiters(11), 0);

        monitor.handle_line(ZONE_11);
        assert!(monitor.cached(11).is_some());
        assert_eq!(monitor.pending_waiters(11), 0);
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected_before_sending() {
        let (monitor, channel) = monitor_with(RecordingChannel::default());

        let err = monitor
            .query_and_await(42, Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(err, AmpError::UnknownZone(42)));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_every_status() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        let mut updates = monitor.subscribe();

        monitor.handle_line("#?11");
        monitor.handle_line(ZONE_11);

        let status = updates.recv().await.unwrap();
        assert_eq!(status.zone, 11);
        assert!(updates.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn listener_feeds_lines_until_stream_closes() {
        let (monitor, _) = monitor_with(RecordingChannel::default());
        let (line_tx, line_rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = monitor.spawn_listener(line_rx);

        line_tx.send(ZONE_11.to_string()).unwrap();
        drop(line_tx);
        listener.await.unwrap();

        assert!(monitor.cached(11).is_some());
    }
}
