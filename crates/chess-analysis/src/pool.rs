//! Fixed-capacity pool of engine clients.
//!
//! Every slot holds one started [`EngineClient`]. A caller borrows a client
//! through [`EnginePool::acquire`], which waits on a semaphore whose permit
//! count always equals the number of idle clients. The returned
//! [`PooledEngine`] hands the client back when released or dropped.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use crate::engine::{EngineClient, EngineError, Timeouts};
use crate::settings::EngineSettings;

/// Errors from pool construction and use.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Engine pool size must be at least 1")]
    EmptyPool,
    /// Starting one of the pool's engines failed.
    #[error("Failed to start pooled engine: {0}")]
    Launch(#[source] EngineError),
    #[error("Engine pool is closed")]
    Closed,
    /// Every slot was retired after its engine could not be relaunched.
    #[error("No engines left in the pool")]
    Exhausted,
    /// One or more engines failed to shut down.
    #[error("Failed to close {} engine(s)", .0.len())]
    Close(Vec<EngineError>),
}

/// Starts new engine clients for a pool.
pub trait EngineLauncher: Send + Sync + 'static {
    /// Start one client and complete its handshake.
    fn launch(&self) -> impl Future<Output = Result<EngineClient, EngineError>> + Send;
}

/// Launches engines by spawning an executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub path: PathBuf,
    pub settings: EngineSettings,
    pub timeouts: Timeouts,
}

impl ProcessLauncher {
    pub fn new(path: impl Into<PathBuf>, settings: EngineSettings) -> Self {
        Self {
            path: path.into(),
            settings,
            timeouts: Timeouts::default(),
        }
    }
}

impl EngineLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<EngineClient, EngineError> {
        EngineClient::start(&self.path, &self.settings, self.timeouts).await
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Live slots. Drops below the configured size only when a broken
    /// client could not be replaced.
    pub size: usize,
    /// Clients idle right now.
    pub available: usize,
}

struct PoolInner<L> {
    launcher: L,
    engine_name: String,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<EngineClient>>,
    size: AtomicUsize,
    closed: AtomicBool,
}

impl<L> PoolInner<L> {
    fn idle(&self) -> MutexGuard<'_, Vec<EngineClient>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<L: EngineLauncher> PoolInner<L> {
    /// Return a client to its slot. The permit is released only after the
    /// client is idle again, so a woken waiter always finds one.
    fn give_back(self: &Arc<Self>, client: EngineClient, permit: OwnedSemaphorePermit) {
        if self.is_closed() {
            // Dropping the client kills its process.
            drop(client);
            return;
        }

        if client.is_ready() {
            self.idle().push(client);
            drop(permit);
            return;
        }

        warn!(
            engine = %client.name(),
            state = %client.state(),
            "discarding engine returned in unusable state"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(self).replace(client, permit));
            }
            Err(_) => {
                error!("no runtime available to replace engine, retiring slot");
                self.retire(permit);
            }
        }
    }

    async fn replace(self: Arc<Self>, mut broken: EngineClient, permit: OwnedSemaphorePermit) {
        if let Err(e) = broken.close().await {
            warn!(error = %e, "failed to close discarded engine");
        }

        match self.launcher.launch().await {
            Ok(mut fresh) => {
                if self.is_closed() {
                    let _ = fresh.close().await;
                    return;
                }
                info!(engine = %fresh.name(), "replacement engine ready");
                self.idle().push(fresh);
                drop(permit);
            }
            Err(e) => {
                error!(error = %e, "failed to launch replacement engine, retiring slot");
                self.retire(permit);
            }
        }
    }

    fn retire(&self, permit: OwnedSemaphorePermit) {
        permit.forget();
        if self.size.fetch_sub(1, Ordering::SeqCst) == 1 {
            error!("last engine slot retired, pool exhausted");
            // Wakes every waiter with an error.
            self.semaphore.close();
        }
    }
}

/// Bounded pool of engine clients with blocking acquire.
pub struct EnginePool<L: EngineLauncher> {
    inner: Arc<PoolInner<L>>,
}

impl<L: EngineLauncher> Clone for EnginePool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: EngineLauncher> EnginePool<L> {
    /// Start `size` engines up front.
    ///
    /// If any engine fails to start, the ones already started are closed
    /// and the whole construction fails.
    pub async fn new(launcher: L, size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }

        let mut clients = Vec::with_capacity(size);
        for slot in 0..size {
            match launcher.launch().await {
                Ok(client) => clients.push(client),
                Err(e) => {
                    error!(slot, error = %e, "engine failed to start, aborting pool");
                    for mut client in clients {
                        let _ = client.close().await;
                    }
                    return Err(PoolError::Launch(e));
                }
            }
        }

        let engine_name = clients
            .first()
            .map(|c| c.name().to_string())
            .unwrap_or_default();
        info!(size, engine = %engine_name, "engine pool started");
        Ok(Self {
            inner: Arc::new(PoolInner {
                launcher,
                engine_name,
                semaphore: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(clients),
                size: AtomicUsize::new(size),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Wait until a client is idle and take it.
    pub async fn acquire(&self) -> Result<PooledEngine<L>, PoolError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| self.unavailable())?;

        let client = self.inner.idle().pop().ok_or_else(|| self.unavailable())?;
        Ok(PooledEngine {
            client: Some(client),
            permit: Some(permit),
            pool: Arc::clone(&self.inner),
        })
    }

    fn unavailable(&self) -> PoolError {
        if self.is_closed() || self.size() > 0 {
            PoolError::Closed
        } else {
            PoolError::Exhausted
        }
    }

    /// A closed pool reports no available engines.
    pub fn status(&self) -> PoolStatus {
        let available = if self.is_closed() {
            0
        } else {
            self.inner.semaphore.available_permits()
        };
        PoolStatus {
            size: self.inner.size.load(Ordering::SeqCst),
            available,
        }
    }

    /// Name the pooled engines reported during their handshake.
    pub fn engine_name(&self) -> &str {
        &self.inner.engine_name
    }

    /// Number of live slots.
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close every idle client and refuse further acquires.
    ///
    /// All clients are closed even if some fail; the failures are returned
    /// together. Clients that are checked out at this point are terminated
    /// when they come back. Calling `close` again is a no-op.
    pub async fn close(&self) -> Result<(), PoolError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.semaphore.close();

        let clients = std::mem::take(&mut *self.inner.idle());
        let mut errors = Vec::new();
        for mut client in clients {
            if let Err(e) = client.close().await {
                errors.push(e);
            }
        }

        info!(failures = errors.len(), "engine pool closed");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Close(errors))
        }
    }
}

/// A client checked out of an [`EnginePool`].
///
/// Returned to the pool on [`release`](Self::release) or drop. A client
/// that is no longer `Ready` at that point is discarded and replaced.
pub struct PooledEngine<L: EngineLauncher> {
    client: Option<EngineClient>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<L>>,
}

impl<L: EngineLauncher> PooledEngine<L> {
    pub fn release(self) {
        drop(self);
    }
}

impl<L: EngineLauncher> Deref for PooledEngine<L> {
    type Target = EngineClient;

    fn deref(&self) -> &EngineClient {
        self.client.as_ref().expect("client is present until drop")
    }
}

impl<L: EngineLauncher> DerefMut for PooledEngine<L> {
    fn deref_mut(&mut self) -> &mut EngineClient {
        self.client.as_mut().expect("client is present until drop")
    }
}

impl<L: EngineLauncher> Drop for PooledEngine<L> {
    fn drop(&mut self) {
        if let (Some(client), Some(permit)) = (self.client.take(), self.permit.take()) {
            self.pool.give_back(client, permit);
        }
    }
}
