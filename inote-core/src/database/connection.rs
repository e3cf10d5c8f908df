//! Connection manager
//!
//! Owns the one live handle to the embedded store. The handle is opened
//! lazily on first use, health-checked before it is handed out, and rebuilt
//! from scratch when the store file turns out to be corrupt.
//!
//! All acquisition goes through a single async mutex, so callers that
//! arrive while an open is in flight wait for that open instead of starting
//! a second one against the same file.

use crate::config::StoreConfig;
use crate::database::schema::initialize_database;
use crate::error::{Result, StoreErrorKind};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, Mutex};

/// Files SQLite keeps next to the main database in WAL mode
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm"];

/// Lifecycle of the managed handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    /// Corruption detected; the store is being deleted and recreated
    Degraded,
}

/// A live handle plus the generation it was opened in
#[derive(Debug, Clone)]
pub struct Handle {
    pool: SqlitePool,
    generation: u64,
}

impl Handle {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Build connection options for the store file.
fn connect_options(config: &StoreConfig) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
}

pub struct ConnectionManager {
    config: StoreConfig,
    slot: Mutex<Option<Handle>>,
    state: watch::Sender<ConnectionState>,
    generation: AtomicU64,
    opens: AtomicU64,
    recoveries: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager; nothing is opened until the first [`acquire`](Self::acquire)
    pub fn new(config: StoreConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        Self {
            config,
            slot: Mutex::new(None),
            state,
            generation: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Number of times the store has been opened (including reopens after recovery)
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of delete-and-recreate recoveries performed
    pub fn recovery_count(&self) -> u64 {
        self.recoveries.load(Ordering::SeqCst)
    }

    /// Get a healthy handle, opening or reopening the store as needed
    pub async fn acquire(&self) -> Result<Handle> {
        let mut slot = self.slot.lock().await;

        if let Some(handle) = slot.clone() {
            match sqlx::query("SELECT 1").execute(handle.pool()).await {
                Ok(_) => return Ok(handle),
                Err(e) => {
                    tracing::warn!(
                        "Database health check failed on generation {}, reinitializing: {}",
                        handle.generation,
                        e
                    );
                    if let Some(stale) = slot.take() {
                        stale.pool.close().await;
                    }
                    self.set_state(ConnectionState::Uninitialized);
                }
            }
        }

        self.initialize(&mut slot).await
    }

    /// Discard the handle if it is still the one from `generation`.
    ///
    /// A newer handle installed by another caller is left alone.
    pub async fn invalidate(&self, generation: u64) {
        let mut slot = self.slot.lock().await;

        if slot.as_ref().is_some_and(|h| h.generation == generation) {
            if let Some(handle) = slot.take() {
                tracing::info!("Invalidating database handle generation {}", generation);
                handle.pool.close().await;
            }
            self.set_state(ConnectionState::Uninitialized);
        }
    }

    /// Delete and recreate the store after corruption was seen on `failed_generation`.
    ///
    /// Skipped when a newer handle has already replaced the failed one.
    pub async fn recover(&self, failed_generation: Option<u64>) -> Result<()> {
        let mut slot = self.slot.lock().await;

        if let (Some(current), Some(failed)) = (slot.as_ref(), failed_generation) {
            if current.generation > failed {
                tracing::debug!(
                    "Skipping recovery: generation {} already replaced by {}",
                    failed,
                    current.generation
                );
                return Ok(());
            }
        }

        self.recover_locked(&mut slot).await.map(|_| ())
    }

    /// Close the handle, if any. The next acquire reopens the store.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;

        if let Some(handle) = slot.take() {
            handle.pool.close().await;
            tracing::info!("Database closed");
        }
        self.set_state(ConnectionState::Uninitialized);
    }

    async fn initialize(&self, slot: &mut Option<Handle>) -> Result<Handle> {
        self.set_state(ConnectionState::Initializing);

        match self.open_and_migrate().await {
            Ok(pool) => Ok(self.install(slot, pool)),
            Err(e) if e.store_kind() == StoreErrorKind::Corruption => {
                tracing::warn!("Database corruption detected while opening, attempting recovery: {}", e);
                self.recover_locked(slot).await
            }
            Err(e) => {
                tracing::error!("Failed to open database: {}", e);
                self.set_state(ConnectionState::Uninitialized);
                Err(e)
            }
        }
    }

    async fn recover_locked(&self, slot: &mut Option<Handle>) -> Result<Handle> {
        self.set_state(ConnectionState::Degraded);
        self.recoveries.fetch_add(1, Ordering::SeqCst);

        if let Some(handle) = slot.take() {
            handle.pool.close().await;
        }

        tokio::time::sleep(self.config.recovery_close_delay).await;

        self.remove_store_files().await;

        tokio::time::sleep(self.config.recovery_reopen_delay).await;

        self.set_state(ConnectionState::Initializing);
        match self.open_and_migrate().await {
            Ok(pool) => {
                tracing::info!("Database recovered with a fresh store");
                Ok(self.install(slot, pool))
            }
            Err(e) => {
                tracing::error!("Database recovery failed: {}", e);
                self.set_state(ConnectionState::Uninitialized);
                Err(e)
            }
        }
    }

    async fn open_and_migrate(&self) -> Result<SqlitePool> {
        tracing::info!("Opening database at: {:?}", self.config.path);

        if let Some(parent) = self.config.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.opens.fetch_add(1, Ordering::SeqCst);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect_with(connect_options(&self.config))
            .await?;

        if let Err(e) = initialize_database(&pool).await {
            pool.close().await;
            return Err(e);
        }

        Ok(pool)
    }

    /// Remove the store file and its WAL sidecars. Failures are logged only.
    async fn remove_store_files(&self) {
        let mut targets = vec![self.config.path.clone()];
        targets.extend(SIDECAR_SUFFIXES.iter().map(|suffix| sidecar_path(&self.config.path, suffix)));

        for target in targets {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => tracing::info!("Deleted corrupted store file {:?}", target),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not delete store file {:?}: {}", target, e),
            }
        }
    }

    fn install(&self, slot: &mut Option<Handle>, pool: SqlitePool) -> Handle {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = Handle { pool, generation };

        *slot = Some(handle.clone());
        self.set_state(ConnectionState::Ready);

        tracing::info!("Database ready (generation {})", generation);
        handle
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!("Connection state {:?} -> {:?}", previous, next);
        }
    }
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
