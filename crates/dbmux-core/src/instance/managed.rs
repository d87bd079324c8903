//! Runtime state machine for one logical database.
//!
//! Two independent pieces of state:
//!
//! - **Engine slot**: `Empty → Booting → Ready`, plus terminal `Closed`. Boot
//!   is lazy and single-flight: the first `initialize` installs a `Booting`
//!   marker and every concurrent caller waits on it instead of booting again.
//!   A failed or abandoned boot puts the slot back to `Empty`.
//! - **Access lock**: `free ⇄ locked`, with a FIFO queue of waiters. Release
//!   hands the lock straight to the head of the queue inside one critical
//!   section, so nobody can observe a free-but-unclaimed instance in between.
//!
//! Critical sections use `std::sync::Mutex` and never span an `.await`.

use super::engine::{Engine, EngineFactory, StorageLocation};
use super::events::{EventListeners, InstanceEventKind};
use super::lease::{HolderId, InstanceLease};
use crate::error::{DbmuxError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

type BootOutcome = std::result::Result<Arc<dyn Engine>, String>;

enum EngineSlot {
    Empty,
    Booting(watch::Receiver<Option<BootOutcome>>),
    Ready(Arc<dyn Engine>),
    Closed,
}

struct Waiter {
    id: u64,
    holder: HolderId,
    grant: oneshot::Sender<()>,
}

struct LockState {
    holder: Option<HolderId>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    last_access: Instant,
    closed: bool,
}

/// Point-in-time view of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStats {
    pub name: String,
    pub storage: StorageLocation,
    pub initialized: bool,
    pub locked: bool,
    pub holder: Option<HolderId>,
    pub queue_depth: usize,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub closed: bool,
}

/// One logical database: a lazily booted engine guarded by an exclusive lock.
pub struct ManagedInstance {
    name: String,
    storage: StorageLocation,
    factory: Arc<dyn EngineFactory>,
    listeners: EventListeners,
    engine: Mutex<EngineSlot>,
    lock: Mutex<LockState>,
    created_at: Instant,
}

impl ManagedInstance {
    /// Create an instance. No engine is booted until [`Self::initialize`].
    pub fn new(
        name: impl Into<String>,
        storage: StorageLocation,
        factory: Arc<dyn EngineFactory>,
        listeners: EventListeners,
    ) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            storage,
            factory,
            listeners,
            engine: Mutex::new(EngineSlot::Empty),
            lock: Mutex::new(LockState {
                holder: None,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                last_access: now,
                closed: false,
            }),
            created_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &StorageLocation {
        &self.storage
    }

    fn lock_engine(&self) -> MutexGuard<'_, EngineSlot> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> DbmuxError {
        DbmuxError::InstanceClosed {
            instance: self.name.clone(),
        }
    }

    /// The engine handle, if booted and not closed.
    pub fn engine(&self) -> Option<Arc<dyn Engine>> {
        match &*self.lock_engine() {
            EngineSlot::Ready(engine) => Some(engine.clone()),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(&*self.lock_engine(), EngineSlot::Ready(_))
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().holder.is_some()
    }

    /// The holder currently granted access, if any.
    pub fn current_holder(&self) -> Option<HolderId> {
        self.lock_state().holder
    }

    // ========================================
    // Engine lifecycle
    // ========================================

    /// Boot the engine if needed and return it.
    ///
    /// Idempotent: once booted, returns the same handle without side effects.
    /// Concurrent callers share a single in-flight boot. On failure the
    /// instance stays uninitialized and a later call boots again.
    pub async fn initialize(&self) -> Result<Arc<dyn Engine>> {
        let pending = {
            let mut slot = self.lock_engine();
            let in_flight = match &*slot {
                EngineSlot::Ready(engine) => return Ok(engine.clone()),
                EngineSlot::Closed => return Err(self.closed_error()),
                EngineSlot::Booting(rx) => Some(rx.clone()),
                EngineSlot::Empty => None,
            };
            match in_flight {
                Some(rx) => Ok(rx),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = EngineSlot::Booting(rx);
                    Err(tx)
                }
            }
        };

        match pending {
            Ok(rx) => self.await_boot(rx).await,
            Err(tx) => self.boot(tx).await,
        }
    }

    async fn await_boot(&self, mut rx: watch::Receiver<Option<BootOutcome>>) -> Result<Arc<dyn Engine>> {
        debug!("Waiting for in-flight boot of {}", self.name);
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(engine)) => Ok(engine),
            _ if self.is_closed() => Err(self.closed_error()),
            Some(Err(message)) => Err(DbmuxError::EngineBoot {
                instance: self.name.clone(),
                message,
            }),
            None => Err(DbmuxError::EngineBoot {
                instance: self.name.clone(),
                message: "boot was abandoned before completing".to_string(),
            }),
        }
    }

    async fn boot(&self, tx: watch::Sender<Option<BootOutcome>>) -> Result<Arc<dyn Engine>> {
        let mut guard = BootGuard {
            instance: self,
            armed: true,
        };

        info!("Booting engine for {} ({})", self.name, self.storage);
        let result = self.run_boot().await;
        guard.armed = false;

        match result {
            Ok(engine) => {
                let closed = {
                    let mut slot = self.lock_engine();
                    if matches!(&*slot, EngineSlot::Closed) {
                        true
                    } else {
                        *slot = EngineSlot::Ready(engine.clone());
                        false
                    }
                };

                if closed {
                    tx.send_replace(Some(Err("instance closed during boot".to_string())));
                    warn!("Instance {} closed while booting, closing fresh engine", self.name);
                    if let Err(e) = engine.close().await {
                        warn!("Failed to close engine for {}: {}", self.name, e);
                    }
                    return Err(self.closed_error());
                }

                tx.send_replace(Some(Ok(engine.clone())));
                info!("Engine ready for {}", self.name);
                self.listeners.emit(InstanceEventKind::Initialized, &self.name);
                Ok(engine)
            }
            Err(e) => {
                {
                    let mut slot = self.lock_engine();
                    if matches!(&*slot, EngineSlot::Booting(_)) {
                        *slot = EngineSlot::Empty;
                    }
                }

                let message = match e {
                    DbmuxError::EngineBoot { message, .. } => message,
                    other => other.to_string(),
                };
                warn!("Engine boot failed for {}: {}", self.name, message);
                tx.send_replace(Some(Err(message.clone())));
                Err(DbmuxError::EngineBoot {
                    instance: self.name.clone(),
                    message,
                })
            }
        }
    }

    async fn run_boot(&self) -> Result<Arc<dyn Engine>> {
        if let StorageLocation::Durable(path) = &self.storage {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| DbmuxError::io_with_path(e, path))?;
        }
        self.factory.boot(&self.name, &self.storage).await
    }

    /// Tear the instance down.
    ///
    /// Unconditional: a current holder loses access, and every queued waiter
    /// fails immediately with [`DbmuxError::InstanceClosed`]. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let abandoned = {
            let mut state = self.lock_state();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.holder = None;
            std::mem::take(&mut state.waiters)
        };
        if !abandoned.is_empty() {
            debug!(
                "Failing {} queued waiter(s) on {} due to close",
                abandoned.len(),
                self.name
            );
        }
        // Dropping the senders wakes each waiter with a closed channel
        drop(abandoned);

        let engine = {
            let mut slot = self.lock_engine();
            match std::mem::replace(&mut *slot, EngineSlot::Closed) {
                EngineSlot::Ready(engine) => Some(engine),
                _ => None,
            }
        };

        let result = match engine {
            Some(engine) => engine.close().await,
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("Engine close failed for {}: {}", self.name, e);
        }

        info!("Closed instance {}", self.name);
        self.listeners.emit(InstanceEventKind::Closed, &self.name);
        result
    }

    // ========================================
    // Access arbitration
    // ========================================

    /// Obtain exclusive access for `holder`.
    ///
    /// Grants immediately when free. Otherwise queues behind earlier callers
    /// and waits up to `timeout`; on expiry the request leaves the queue and
    /// fails with [`DbmuxError::Busy`]. A request promoted at the same moment
    /// its timer fires keeps the grant.
    pub async fn acquire(self: &Arc<Self>, holder: HolderId, timeout: Duration) -> Result<InstanceLease> {
        let queued = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(self.closed_error());
            }
            if state.holder.is_none() {
                state.holder = Some(holder);
                state.last_access = Instant::now();
                None
            } else {
                let id = state.next_waiter_id;
                state.next_waiter_id += 1;
                let (grant, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { id, holder, grant });
                Some((id, rx, state.waiters.len()))
            }
        };

        let Some((id, rx, depth)) = queued else {
            debug!("{} acquired {}", holder, self.name);
            self.listeners.emit(InstanceEventKind::Locked, &self.name);
            return Ok(InstanceLease::new(self.clone(), holder));
        };

        debug!("{} queued for {} (position {})", holder, self.name, depth);

        // Disarmed only once the outcome is in hand; if this future is
        // dropped first, the guard leaves the queue or hands a grant back.
        let mut wait = QueuedWait {
            instance: &**self,
            id,
            holder,
            rx,
            armed: true,
        };
        let outcome = tokio::time::timeout(timeout, &mut wait.rx).await;
        wait.armed = false;

        match outcome {
            Ok(Ok(())) => {
                debug!("{} promoted on {}", holder, self.name);
                Ok(InstanceLease::new(self.clone(), holder))
            }
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => {
                if self.leave_queue(id) {
                    debug!("{} timed out waiting for {}", holder, self.name);
                    return Err(DbmuxError::Busy {
                        instance: self.name.clone(),
                        waited: timeout,
                    });
                }

                // Left the queue under the lock before we looked: either
                // promoted or failed by close. The outcome is already sent.
                match wait.rx.try_recv() {
                    Ok(()) => Ok(InstanceLease::new(self.clone(), holder)),
                    Err(_) => Err(self.closed_error()),
                }
            }
        }
    }

    /// Remove waiter `id` from the queue. Returns false if it already left,
    /// either promoted by `release` or failed by `close`.
    fn leave_queue(&self, id: u64) -> bool {
        let mut state = self.lock_state();
        match state.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Give up access held by `holder` and promote the next waiter.
    ///
    /// A release by anyone other than the current holder is ignored and
    /// returns `false`.
    pub fn release(&self, holder: HolderId) -> bool {
        let promoted = {
            let mut state = self.lock_state();
            if state.holder != Some(holder) {
                return false;
            }
            state.holder = None;
            state.last_access = Instant::now();

            let mut promoted = None;
            while let Some(waiter) = state.waiters.pop_front() {
                // A waiter whose acquire was dropped has hung up; skip it
                if waiter.grant.send(()).is_ok() {
                    state.holder = Some(waiter.holder);
                    promoted = Some(waiter.holder);
                    break;
                }
            }
            promoted
        };

        debug!("{} released {}", holder, self.name);
        self.listeners.emit(InstanceEventKind::Unlocked, &self.name);
        if let Some(next) = promoted {
            debug!("Handing {} to {}", self.name, next);
            self.listeners.emit(InstanceEventKind::Locked, &self.name);
        }
        true
    }

    // ========================================
    // Observability
    // ========================================

    /// Snapshot of lock, queue, and age state. Does not count as an access.
    pub fn stats(&self) -> InstanceStats {
        let initialized = self.is_initialized();
        let state = self.lock_state();
        let now = Instant::now();
        InstanceStats {
            name: self.name.clone(),
            storage: self.storage.clone(),
            initialized,
            locked: state.holder.is_some(),
            holder: state.holder,
            queue_depth: state.waiters.iter().filter(|w| !w.grant.is_closed()).count(),
            age_ms: duration_ms(now.duration_since(self.created_at)),
            idle_ms: duration_ms(now.duration_since(state.last_access)),
            closed: state.closed,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A queued `acquire` that may be dropped before it observes its outcome.
///
/// On drop while armed: a waiter still in the queue is removed; a waiter that
/// was already promoted releases the grant nobody will ever hold.
struct QueuedWait<'a> {
    instance: &'a ManagedInstance,
    id: u64,
    holder: HolderId,
    rx: oneshot::Receiver<()>,
    armed: bool,
}

impl Drop for QueuedWait<'_> {
    fn drop(&mut self) {
        if !self.armed || self.instance.leave_queue(self.id) {
            return;
        }
        if self.rx.try_recv().is_ok() {
            debug!(
                "{} dropped its acquire after promotion on {}, releasing",
                self.holder, self.instance.name
            );
            self.instance.release(self.holder);
        }
    }
}

/// Resets a `Booting` slot if the boot future is dropped before finishing.
struct BootGuard<'a> {
    instance: &'a ManagedInstance,
    armed: bool,
}

impl Drop for BootGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.instance.lock_engine();
        if matches!(&*slot, EngineSlot::Booting(_)) {
            *slot = EngineSlot::Empty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestEngine {
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Engine for TestEngine {
        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct TestFactory {
        boots: AtomicUsize,
        fail_next: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl EngineFactory for TestFactory {
        async fn boot(&self, _name: &str, _storage: &StorageLocation) -> Result<Arc<dyn Engine>> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(DbmuxError::Other("disk on fire".to_string()));
            }
            Ok(Arc::new(TestEngine {
                closed: AtomicBool::new(false),
            }))
        }
    }

    fn instance_with(factory: Arc<TestFactory>) -> Arc<ManagedInstance> {
        Arc::new(ManagedInstance::new(
            "test",
            StorageLocation::Ephemeral,
            factory,
            EventListeners::new(),
        ))
    }

    fn instance() -> Arc<ManagedInstance> {
        instance_with(Arc::new(TestFactory::default()))
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let factory = Arc::new(TestFactory::default());
        let inst = instance_with(factory.clone());
        assert!(!inst.is_initialized());

        let first = inst.initialize().await.unwrap();
        let second = inst.initialize().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.boots.load(Ordering::SeqCst), 1);
        assert!(inst.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_boots_once() {
        let factory = Arc::new(TestFactory {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let inst = instance_with(factory.clone());

        let (a, b, c) = tokio::join!(inst.initialize(), inst.initialize(), inst.initialize());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(factory.boots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_boot_leaves_instance_retryable() {
        let factory = Arc::new(TestFactory::default());
        factory.fail_next.store(true, Ordering::SeqCst);
        let inst = instance_with(factory.clone());

        let err = inst.initialize().await.err().unwrap();
        assert!(matches!(err, DbmuxError::EngineBoot { .. }));
        assert!(err.to_string().contains("disk on fire"));
        assert!(!inst.is_initialized());

        inst.initialize().await.unwrap();
        assert_eq!(factory.boots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_boot_resets_slot() {
        let factory = Arc::new(TestFactory {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let inst = instance_with(factory.clone());

        let abandoned = tokio::time::timeout(Duration::from_millis(10), inst.initialize()).await;
        assert!(abandoned.is_err());
        assert!(!inst.is_initialized());

        inst.initialize().await.unwrap();
        assert_eq!(factory.boots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_durable_boot_creates_storage_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("db");
        let inst = Arc::new(ManagedInstance::new(
            "db",
            StorageLocation::Durable(dir.clone()),
            Arc::new(TestFactory::default()),
            EventListeners::new(),
        ));

        inst.initialize().await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_acquire_free_grants_immediately() {
        let inst = instance();
        let holder = HolderId::next();

        let lease = inst.acquire(holder, Duration::from_secs(1)).await.unwrap();
        assert_eq!(lease.holder(), holder);
        assert_eq!(inst.current_holder(), Some(holder));
        assert!(inst.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_with_busy() {
        let inst = instance();
        let _held = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();

        let timeout = Duration::from_millis(500);
        let start = tokio::time::Instant::now();
        let result = inst.acquire(HolderId::next(), timeout).await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(DbmuxError::Busy { .. })));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(50));
        assert_eq!(inst.stats().queue_depth, 0);
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_ignored() {
        let inst = instance();
        let holder = HolderId::next();
        let _lease = inst.acquire(holder, Duration::from_secs(1)).await.unwrap();

        assert!(!inst.release(HolderId::next()));
        assert_eq!(inst.current_holder(), Some(holder));
    }

    #[tokio::test]
    async fn test_lease_releases_exactly_once() {
        let inst = instance();
        let lease = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();

        assert!(lease.release());
        assert!(!lease.release());
        assert!(!inst.is_locked());

        // Someone else takes it; dropping the old lease must not free it
        let other = HolderId::next();
        let _other_lease = inst.acquire(other, Duration::from_secs(1)).await.unwrap();
        drop(lease);
        assert_eq!(inst.current_holder(), Some(other));
    }

    #[tokio::test]
    async fn test_release_promotes_without_free_window() {
        let inst = instance();
        let first = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();

        let waiter = HolderId::next();
        let inst2 = inst.clone();
        let pending = tokio::spawn(async move { inst2.acquire(waiter, Duration::from_secs(5)).await });

        while inst.stats().queue_depth == 0 {
            tokio::task::yield_now().await;
        }

        first.release();
        // Promotion happened inside release: the waiter already holds it
        assert_eq!(inst.current_holder(), Some(waiter));
        assert!(inst.is_locked());

        let lease = pending.await.unwrap().unwrap();
        assert_eq!(lease.holder(), waiter);
    }

    #[tokio::test]
    async fn test_dropped_acquire_after_promotion_frees_instance() {
        use futures::FutureExt;

        let inst = instance();
        let first = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();

        let waiter = HolderId::next();
        let mut pending = Box::pin(inst.acquire(waiter, Duration::from_millis(200)));
        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(inst.stats().queue_depth, 1);

        // Promoted inside release, then abandoned before it could see the grant
        first.release();
        assert_eq!(inst.current_holder(), Some(waiter));
        drop(pending);

        assert_eq!(inst.current_holder(), None);
        let next = HolderId::next();
        let lease = inst.acquire(next, Duration::from_millis(200)).await.unwrap();
        assert_eq!(lease.holder(), next);
    }

    #[tokio::test]
    async fn test_dropped_acquire_while_queued_leaves_queue() {
        use futures::FutureExt;

        let inst = instance();
        let holder = HolderId::next();
        let first = inst.acquire(holder, Duration::from_secs(1)).await.unwrap();

        let mut pending = Box::pin(inst.acquire(HolderId::next(), Duration::from_secs(5)));
        assert!((&mut pending).now_or_never().is_none());
        drop(pending);

        assert!(inst.lock_state().waiters.is_empty());
        assert_eq!(inst.current_holder(), Some(holder));
        first.release();
        assert!(!inst.is_locked());
    }

    #[tokio::test]
    async fn test_close_fails_queued_waiters() {
        let inst = instance();
        inst.initialize().await.unwrap();
        let _held = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();

        let inst2 = inst.clone();
        let pending =
            tokio::spawn(async move { inst2.acquire(HolderId::next(), Duration::from_secs(30)).await });
        while inst.stats().queue_depth == 0 {
            tokio::task::yield_now().await;
        }

        inst.close().await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(DbmuxError::InstanceClosed { .. })));
        assert!(inst.is_closed());
        assert!(!inst.is_locked());
        assert!(inst.engine().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_closes_engine() {
        let inst = instance();
        let engine = inst.initialize().await.unwrap();

        inst.close().await.unwrap();
        inst.close().await.unwrap();

        let engine = engine.as_any().downcast_ref::<TestEngine>().unwrap();
        assert!(engine.closed.load(Ordering::SeqCst));
        assert!(matches!(
            inst.initialize().await,
            Err(DbmuxError::InstanceClosed { .. })
        ));
        assert!(matches!(
            inst.acquire(HolderId::next(), Duration::from_millis(10)).await,
            Err(DbmuxError::InstanceClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let listeners = EventListeners::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        listeners.register(move |e| sink.lock().unwrap().push(e.kind));

        let inst = Arc::new(ManagedInstance::new(
            "ev",
            StorageLocation::Ephemeral,
            Arc::new(TestFactory::default()),
            listeners,
        ));
        inst.initialize().await.unwrap();
        let lease = inst.acquire(HolderId::next(), Duration::from_secs(1)).await.unwrap();
        lease.release();
        inst.close().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                InstanceEventKind::Initialized,
                InstanceEventKind::Locked,
                InstanceEventKind::Unlocked,
                InstanceEventKind::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_stats_do_not_mutate() {
        let inst = instance();
        let before = inst.stats();
        let after = inst.stats();
        assert!(!before.locked);
        assert!(!before.initialized);
        assert_eq!(before.queue_depth, 0);
        assert!(after.idle_ms >= before.idle_ms);
    }
}
