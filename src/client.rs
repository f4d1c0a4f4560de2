//! Public client
//!
//! [`OrraClient`] ties the pieces together: registration resolves the service
//! id, the session actor keeps the connection alive and delivers results, the
//! idempotency cache and the installed [`TaskHandler`] execute tasks.
//!
//! ```no_run
//! use orra_sdk::{ClientOptions, OrraClient, RegistrationOptions, TaskRequest};
//! use serde_json::json;
//!
//! # async fn run() -> orra_sdk::Result<()> {
//! let client = OrraClient::new("http://localhost:8005", "sk-orra-...", ClientOptions::default())?;
//! client.register_service("delivery-agent", RegistrationOptions::new()).await?;
//! client.start_handler(|task: TaskRequest| async move {
//!     Ok::<_, anyhow::Error>(json!({"handled": task.id}))
//! });
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::delivery::DeliveryStats;
use crate::error::{Error, Result};
use crate::executor::{HandlerSlot, TaskHandler};
use crate::idempotency::{spawn_sweeper, IdempotencyCache, IdempotencyConfig};
use crate::registration::{
    FileIdentityStore, IdentityStore, RegistrationClient, RegistrationOptions, ServiceIdentity,
    ServiceKind, DEFAULT_IDENTITY_FILE,
};
use crate::session::{spawn_session, ConnectionState, SessionConfig, SessionHandle, SessionState};

// ─────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────

/// Where the service identity is kept between runs
#[derive(Clone)]
pub enum Persistence {
    /// JSON file (`orra-service-key.json` in the working directory by default)
    File(PathBuf),
    /// Caller-supplied store
    Custom(Arc<dyn IdentityStore>),
}

impl Default for Persistence {
    fn default() -> Self {
        Persistence::File(PathBuf::from(DEFAULT_IDENTITY_FILE))
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Persistence::File(path) => f.debug_tuple("File").field(path).finish(),
            Persistence::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Persistence {
    fn into_store(self) -> Arc<dyn IdentityStore> {
        match self {
            Persistence::File(path) => Arc::new(FileIdentityStore::new(path)),
            Persistence::Custom(store) => store,
        }
    }
}

/// Tunables for [`OrraClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identity persistence
    pub persistence: Persistence,

    /// Reconnect, connect timeout and ack timeout
    pub session: SessionConfig,

    /// Result retention and sweep period
    pub idempotency: IdempotencyConfig,

    /// Timeout for registration requests
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persistence: Persistence::default(),
            session: SessionConfig::default(),
            idempotency: IdempotencyConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

struct RunningSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Client runtime for one service or agent
pub struct OrraClient {
    api_url: String,
    api_key: String,
    options: ClientOptions,
    registration: RegistrationClient,
    store: Arc<dyn IdentityStore>,
    identity: RwLock<Option<ServiceIdentity>>,
    cache: Arc<IdempotencyCache>,
    handler: HandlerSlot,
    state: Arc<RwLock<SessionState>>,
    running: Mutex<Option<RunningSession>>,
}

impl OrraClient {
    /// Create a client. Nothing connects until a registration succeeds.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let api_url = api_url.into();
        let api_key = api_key.into();

        if api_url.trim().is_empty() {
            return Err(Error::Config("platform API URL must not be empty".to_string()));
        }
        if api_key.trim().is_empty() {
            return Err(Error::Config("platform API key must not be empty".to_string()));
        }

        let registration = RegistrationClient::new(&api_url, &api_key, options.request_timeout)?;
        let store = options.persistence.clone().into_store();
        let cache = Arc::new(IdempotencyCache::new(&options.idempotency));

        Ok(Self {
            api_url,
            api_key,
            options,
            registration,
            store,
            identity: RwLock::new(None),
            cache,
            handler: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(SessionState::default())),
            running: Mutex::new(None),
        })
    }

    /// Register as a service and open the session
    pub async fn register_service(&self, name: &str, options: RegistrationOptions) -> Result<ServiceIdentity> {
        self.register(ServiceKind::Service, name, options).await
    }

    /// Register as an agent and open the session
    pub async fn register_agent(&self, name: &str, options: RegistrationOptions) -> Result<ServiceIdentity> {
        self.register(ServiceKind::Agent, name, options).await
    }

    /// Register as `kind`. On failure no session is opened.
    pub async fn register(
        &self,
        kind: ServiceKind,
        name: &str,
        options: RegistrationOptions,
    ) -> Result<ServiceIdentity> {
        let identity = self
            .registration
            .register(self.store.as_ref(), kind, name, &options)
            .await?;

        *self.identity.write() = Some(identity.clone());
        self.session().connect(identity.service_id.clone());

        Ok(identity)
    }

    /// Install the task handler. Replaces any previous handler; tasks that
    /// arrive before a handler is installed are dropped and redelivered by
    /// the platform.
    pub fn start_handler<H: TaskHandler>(&self, handler: H) {
        *self.handler.write() = Some(Arc::new(handler));
        debug!("Task handler installed");
    }

    /// Close the session: send a close frame, cancel every timer and the
    /// cache sweep. Idempotent.
    pub async fn close(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        running.sweeper.abort();
        running.handle.shutdown().await;
        let _ = running.task.await;
        info!("Client closed");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    /// Full state snapshot
    pub fn session_state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn identity(&self) -> Option<ServiceIdentity> {
        self.identity.read().clone()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.state.read().delivery
    }

    /// Shared idempotency cache
    pub fn cache(&self) -> &Arc<IdempotencyCache> {
        &self.cache
    }

    /// Handle to the running session, starting it on first use
    fn session(&self) -> SessionHandle {
        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref().filter(|r| !r.handle.is_closed()) {
            return existing.handle.clone();
        }

        let (handle, task) = spawn_session(
            self.options.session.clone(),
            self.api_url.clone(),
            self.api_key.clone(),
            self.state.clone(),
            self.cache.clone(),
            self.handler.clone(),
        );
        let sweeper = spawn_sweeper(self.cache.clone(), self.options.idempotency.cleanup_interval);

        *running = Some(RunningSession {
            handle: handle.clone(),
            task,
            sweeper,
        });
        handle
    }
}

impl Drop for OrraClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.sweeper.abort();
            running.handle.abandon();
        }
    }
}
