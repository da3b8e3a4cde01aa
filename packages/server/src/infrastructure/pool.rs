//! Bounded connection pool for the persistence layer.
//!
//! Callers block (with a bounded wait) until a slot is free. Every slot is in
//! exactly one of three states: in use, idle with an open connection, or idle
//! and already reaped. All bookkeeping happens under one mutex; opening and
//! validating connections happens outside it.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Opens and checks connections on behalf of the pool.
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: fmt::Display;

    /// Open a fresh connection
    fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Cheap liveness check run before an idle connection is handed out
    fn is_valid(&self, connection: &mut Self::Connection) -> bool;
}

/// Pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on used + idle slots
    pub max_connections: usize,
    /// Total time `acquire` may block
    pub max_wait: Duration,
    /// Re-check period while blocked
    pub wait_interval: Duration,
    /// Period of the idle reaper
    pub reap_interval: Duration,
    /// Probe idle connections before reuse
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            max_wait: Duration::from_millis(1000),
            wait_interval: Duration::from_millis(200),
            reap_interval: Duration::from_secs(300),
            test_on_borrow: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every slot stayed busy for the whole wait
    #[error("no connection became available within {0:?}")]
    Timeout(Duration),

    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("connection pool is closed")]
    Closed,
}

/// Snapshot of slot counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub in_use: usize,
    pub idle: usize,
    pub reaped: usize,
}

struct IdleSlot<C> {
    name: Uuid,
    connection: Option<C>,
    released: bool,
}

struct PoolState<C> {
    used: HashSet<Uuid>,
    unused: VecDeque<IdleSlot<C>>,
    closed: bool,
}

impl<C> PoolState<C> {
    fn total(&self) -> usize {
        self.used.len() + self.unused.len()
    }
}

enum Claim<C> {
    Reuse(IdleSlot<C>),
    Create(Uuid),
}

struct Reaper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: thread::JoinHandle<()>,
}

impl Reaper {
    fn stop(self) {
        let (flag, signal) = &*self.stop;
        *flag.lock() = true;
        signal.notify_one();
        if self.handle.join().is_err() {
            tracing::warn!("Connection reaper thread panicked");
        }
    }
}

/// Bounded, blocking connection pool.
///
/// Constructed explicitly at startup and shared through `Arc`; call
/// [`ConnectionPool::close`] during shutdown.
pub struct ConnectionPool<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
    available: Condvar,
    reaper: Mutex<Option<Reaper>>,
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, mut config: PoolConfig) -> Arc<Self> {
        config.max_connections = config.max_connections.max(1);
        Arc::new(Self {
            manager,
            config,
            state: Mutex::new(PoolState {
                used: HashSet::new(),
                unused: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            reaper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Start the background thread that tears down idle connections every
    /// `reap_interval`. Calling it twice keeps the first reaper.
    pub fn start_reaper(self: &Arc<Self>) -> std::io::Result<()> {
        let mut reaper = self.reaper.lock();
        if reaper.is_some() {
            return Ok(());
        }

        let pool = Arc::downgrade(self);
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let interval = self.config.reap_interval;

        let handle = thread::Builder::new()
            .name("pool-reaper".to_string())
            .spawn(move || {
                let (flag, signal) = &*thread_stop;
                let mut stopped = flag.lock();
                while !*stopped {
                    let timed_out = signal.wait_for(&mut stopped, interval).timed_out();
                    if *stopped {
                        break;
                    }
                    if timed_out {
                        match pool.upgrade() {
                            Some(pool) => {
                                pool.reap_idle();
                            }
                            None => break,
                        }
                    }
                }
            })?;

        *reaper = Some(Reaper { stop, handle });
        Ok(())
    }

    /// Borrow a connection, blocking up to `max_wait`.
    ///
    /// Returns [`PoolError::Timeout`] when no slot frees up in time; callers treat
    /// that as "persistence temporarily unavailable".
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection<M>, PoolError> {
        let deadline = Instant::now() + self.config.max_wait;

        let mut state = self.state.lock();
        let claim = loop {
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(slot) = state.unused.pop_front() {
                state.used.insert(slot.name);
                break Claim::Reuse(slot);
            }
            if state.total() < self.config.max_connections {
                let name = Uuid::new_v4();
                state.used.insert(name);
                break Claim::Create(name);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "Cannot create more connections: all {} are busy",
                    self.config.max_connections
                );
                return Err(PoolError::Timeout(self.config.max_wait));
            }
            let wait = self.config.wait_interval.min(deadline - now);
            self.available.wait_for(&mut state, wait);
        };
        drop(state);

        let (name, idle) = match claim {
            Claim::Reuse(slot) => (slot.name, slot.connection),
            Claim::Create(name) => (name, None),
        };

        let opened = match idle {
            Some(mut connection) => {
                if !self.config.test_on_borrow || self.manager.is_valid(&mut connection) {
                    Ok(connection)
                } else {
                    tracing::info!("Connection {} failed validation, reopening", name);
                    drop(connection);
                    self.manager.connect()
                }
            }
            None => {
                let opened = self.manager.connect();
                if opened.is_ok() {
                    tracing::info!("Opened connection {}", name);
                }
                opened
            }
        };

        match opened {
            Ok(connection) => Ok(PooledConnection {
                pool: Arc::clone(self),
                name,
                connection: Some(connection),
            }),
            Err(e) => {
                tracing::warn!("Failed to open connection {}: {}", name, e);
                self.return_slot(name, None);
                Err(PoolError::Connect(e.to_string()))
            }
        }
    }

    /// Hand a connection back. Equivalent to dropping it.
    pub fn release(&self, connection: PooledConnection<M>) {
        drop(connection);
    }

    /// Move a used slot back to idle (or forget it when `connection` is `None`)
    /// and wake one waiter. Slots not currently in use are rejected.
    fn return_slot(&self, name: Uuid, connection: Option<M::Connection>) -> bool {
        let mut discarded = None;
        {
            let mut state = self.state.lock();
            if !state.used.remove(&name) {
                tracing::warn!("Ignoring release of connection {} that is not in use", name);
                return false;
            }
            match connection {
                Some(connection) if !state.closed => state.unused.push_back(IdleSlot {
                    name,
                    connection: Some(connection),
                    released: false,
                }),
                other => discarded = other,
            }
        }
        self.available.notify_one();
        drop(discarded);
        true
    }

    /// Tear down every idle connection not already torn down.
    ///
    /// Idempotent, and never touches slots that are in use. Returns how many
    /// connections were closed.
    pub fn reap_idle(&self) -> usize {
        let mut torn_down = Vec::new();
        {
            let mut state = self.state.lock();
            for slot in state.unused.iter_mut().filter(|slot| !slot.released) {
                slot.released = true;
                if let Some(connection) = slot.connection.take() {
                    torn_down.push((slot.name, connection));
                }
            }
        }

        let count = torn_down.len();
        for (name, connection) in torn_down {
            drop(connection);
            tracing::info!("Released idle connection {}", name);
        }
        count
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let reaped = state.unused.iter().filter(|slot| slot.released).count();
        PoolStatus {
            in_use: state.used.len(),
            idle: state.unused.len() - reaped,
            reaped,
        }
    }

    /// Stop the reaper, fail all current and future waiters with
    /// [`PoolError::Closed`] and drop every idle connection. Connections still
    /// in use are dropped when they come back.
    pub fn close(&self) {
        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.stop();
        }

        let drained: Vec<IdleSlot<M::Connection>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.unused.drain(..).collect()
        };
        self.available.notify_all();
        tracing::info!(
            "Connection pool closed, dropped {} idle slot(s)",
            drained.len()
        );
    }
}

/// A borrowed connection; goes back to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    pool: Arc<ConnectionPool<M>>,
    name: Uuid,
    connection: Option<M::Connection>,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Opaque slot name
    pub fn name(&self) -> Uuid {
        self.name
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        self.connection
            .as_ref()
            .expect("connection is present until the guard is dropped")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        self.connection
            .as_mut()
            .expect("connection is present until the guard is dropped")
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        self.pool.return_slot(self.name, self.connection.take());
    }
}

impl<M: ConnectionManager> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 上限数を超えて接続が払い出されないこと
    // - 待機が上限時間で打ち切られ、解放があれば待機者が再開すること
    // - アイドル回収が使用中の接続に触れないこと
    // - 借用時の検証に失敗した接続が作り直されること
    // ========================================

    struct TestConnection {
        id: usize,
        closed: Arc<AtomicUsize>,
    }

    impl Drop for TestConnection {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestManager {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        unhealthy: AtomicBool,
        refuse_connect: AtomicBool,
    }

    impl ConnectionManager for Arc<TestManager> {
        type Connection = TestConnection;
        type Error = String;

        fn connect(&self) -> Result<TestConnection, String> {
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err("refused".to_string());
            }
            let id = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(TestConnection {
                id,
                closed: Arc::clone(&self.closed),
            })
        }

        fn is_valid(&self, _connection: &mut TestConnection) -> bool {
            !self.unhealthy.load(Ordering::SeqCst)
        }
    }

    fn pool_with(
        max_connections: usize,
        max_wait_ms: u64,
        wait_interval_ms: u64,
    ) -> (Arc<ConnectionPool<Arc<TestManager>>>, Arc<TestManager>) {
        let manager = Arc::new(TestManager::default());
        let pool = ConnectionPool::new(
            Arc::clone(&manager),
            PoolConfig {
                max_connections,
                max_wait: Duration::from_millis(max_wait_ms),
                wait_interval: Duration::from_millis(wait_interval_ms),
                reap_interval: Duration::from_secs(300),
                test_on_borrow: true,
            },
        );
        (pool, manager)
    }

    #[test]
    fn test_released_connection_is_reused() {
        // テスト項目: 返却された接続が次の取得で再利用される
        // given (前提条件):
        let (pool, manager) = pool_with(2, 100, 20);
        let first = pool.acquire().unwrap();
        let first_id = first.id;
        pool.release(first);

        // when (操作):
        let second = pool.acquire().unwrap();

        // then (期待する結果):
        assert_eq!(second.id, first_id);
        assert_eq!(manager.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquire_times_out_when_all_slots_busy() {
        // テスト項目: 全スロット使用中なら待機上限後にタイムアウトする
        // given (前提条件):
        let (pool, _manager) = pool_with(2, 1000, 200);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        // when (操作):
        let started = Instant::now();
        let result = pool.acquire();

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            PoolError::Timeout(Duration::from_millis(1000))
        );
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(pool.status().in_use, 2);
    }

    #[test]
    fn test_blocked_acquire_resumes_after_release() {
        // テスト項目: 待機中の取得は解放後、ポーリング間隔以内に再開する
        // given (前提条件):
        let (pool, _manager) = pool_with(1, 1000, 200);
        let held = pool.acquire().unwrap();

        let waiter_pool = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
            let started = Instant::now();
            let result = waiter_pool.acquire().map(|conn| conn.id);
            (result, started.elapsed())
        });

        // when (操作):
        thread::sleep(Duration::from_millis(500));
        pool.release(held);

        // then (期待する結果):
        let (result, elapsed) = waiter.join().unwrap();
        assert_eq!(result, Ok(0));
        assert!(elapsed < Duration::from_millis(900), "waited {:?}", elapsed);
    }

    #[test]
    fn test_every_waiter_is_served_and_bound_holds() {
        // テスト項目: N 個の待機者と N 回の解放で全員が接続を得て、上限を超えない
        // given (前提条件):
        let (pool, _manager) = pool_with(1, 3000, 50);
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let held = pool.acquire().unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let in_use = Arc::clone(&in_use);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let conn = pool.acquire()?;
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    in_use.fetch_sub(1, Ordering::SeqCst);
                    drop(conn);
                    Ok::<(), PoolError>(())
                })
            })
            .collect();

        // when (操作):
        thread::sleep(Duration::from_millis(100));
        pool.release(held);

        // then (期待する結果):
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(()));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().in_use, 0);
    }

    #[test]
    fn test_reap_never_touches_used_slots() {
        // テスト項目: アイドル回収は使用中の接続に影響しない
        // given (前提条件):
        let (pool, manager) = pool_with(2, 100, 20);
        let used = pool.acquire().unwrap();
        let idle = pool.acquire().unwrap();
        pool.release(idle);

        // when (操作):
        let reaped = pool.reap_idle();
        let reaped_again = pool.reap_idle();

        // then (期待する結果):
        assert_eq!(reaped, 1);
        assert_eq!(reaped_again, 0);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
        assert_eq!(
            pool.status(),
            PoolStatus {
                in_use: 1,
                idle: 0,
                reaped: 1
            }
        );
        assert_eq!(used.id, 0);
    }

    #[test]
    fn test_reaped_slot_is_reopened_on_acquire() {
        // テスト項目: 回収済みスロットは取得時に接続が作り直される
        // given (前提条件):
        let (pool, manager) = pool_with(1, 100, 20);
        let conn = pool.acquire().unwrap();
        let name = conn.name();
        pool.release(conn);
        pool.reap_idle();

        // when (操作):
        let reopened = pool.acquire().unwrap();

        // then (期待する結果):
        assert_eq!(reopened.name(), name);
        assert_eq!(reopened.id, 1);
        assert_eq!(manager.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_idle_connection_is_replaced() {
        // テスト項目: 借用時の検証に失敗した接続は作り直される
        // given (前提条件):
        let (pool, manager) = pool_with(1, 100, 20);
        let conn = pool.acquire().unwrap();
        pool.release(conn);
        manager.unhealthy.store(true, Ordering::SeqCst);

        // when (操作):
        let replaced = pool.acquire().unwrap();

        // then (期待する結果):
        assert_eq!(replaced.id, 1);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_of_unknown_slot_is_rejected() {
        // テスト項目: 使用中でないスロットの返却は受け付けない
        // given (前提条件):
        let (pool, _manager) = pool_with(1, 100, 20);

        // when (操作):
        let accepted = pool.return_slot(Uuid::new_v4(), None);

        // then (期待する結果):
        assert!(!accepted);
        assert_eq!(
            pool.status(),
            PoolStatus {
                in_use: 0,
                idle: 0,
                reaped: 0
            }
        );
    }

    #[test]
    fn test_failed_connect_frees_reserved_slot() {
        // テスト項目: 接続作成に失敗した場合、予約したスロットが解放される
        // given (前提条件):
        let (pool, manager) = pool_with(1, 100, 20);
        manager.refuse_connect.store(true, Ordering::SeqCst);

        // when (操作):
        let result = pool.acquire();

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), PoolError::Connect("refused".to_string()));
        assert_eq!(pool.status().in_use, 0);

        manager.refuse_connect.store(false, Ordering::SeqCst);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_close_wakes_waiters() {
        // テスト項目: クローズすると待機中の取得が Closed で終了する
        // given (前提条件):
        let (pool, manager) = pool_with(1, 5000, 100);
        let held = pool.acquire().unwrap();
        let waiter_pool = Arc::clone(&pool);
        let waiter = thread::spawn(move || waiter_pool.acquire().map(|conn| conn.id));
        thread::sleep(Duration::from_millis(50));

        // when (操作):
        pool.close();

        // then (期待する結果):
        assert_eq!(waiter.join().unwrap(), Err(PoolError::Closed));
        drop(held);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().in_use, 0);
    }

    #[test]
    fn test_reaper_thread_reaps_on_interval() {
        // テスト項目: 回収スレッドが周期的にアイドル接続を回収する
        // given (前提条件):
        let manager = Arc::new(TestManager::default());
        let pool = ConnectionPool::new(
            Arc::clone(&manager),
            PoolConfig {
                reap_interval: Duration::from_millis(50),
                ..PoolConfig::default()
            },
        );
        pool.start_reaper().unwrap();
        let conn = pool.acquire().unwrap();
        pool.release(conn);

        // when (操作):
        thread::sleep(Duration::from_millis(200));

        // then (期待する結果):
        assert_eq!(pool.status().reaped, 1);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
        pool.close();
    }
}
