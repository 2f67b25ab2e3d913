//! Engine assembly.
//!
//! [`Engine`] wires the collaborators together and owns the background
//! tasks: the state task, the retry timer and the forwarder that hands retry
//! requests to the router.

use std::sync::Arc;

use bytes::Bytes;
use sealpost_crypto::CryptoProvider;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    cache::{CacheStore, MemoryStore, MessageCache},
    config::EngineConfig,
    decrypt::Decryptor,
    env::{Environment, SystemEnv},
    error::EngineError,
    event::{Notification, Notifier},
    handler::{DomainEventHandler, LoggingEventHandler},
    retry::{RetryRequest, RetryScheduler},
    rewrap::RewrapClient,
    router::Router,
    state::{StateHandle, StateStats, StateTask},
    transport::Transport,
};

/// Builder for [`Engine`].
///
/// Defaults: [`SystemEnv`], an in-memory cache store, a
/// [`LoggingEventHandler`] and [`EngineConfig::default`].
pub struct EngineBuilder<E: Environment = SystemEnv> {
    config: EngineConfig,
    env: E,
    store: Option<Box<dyn CacheStore>>,
    transport: Arc<dyn Transport>,
    crypto: Arc<dyn CryptoProvider>,
    events: Arc<dyn DomainEventHandler>,
}

impl EngineBuilder<SystemEnv> {
    fn new(transport: Arc<dyn Transport>, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            config: EngineConfig::default(),
            env: SystemEnv::new(),
            store: None,
            transport,
            crypto,
            events: Arc::new(LoggingEventHandler),
        }
    }
}

impl<E: Environment> EngineBuilder<E> {
    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the environment.
    #[must_use]
    pub fn env<E2: Environment>(self, env: E2) -> EngineBuilder<E2> {
        EngineBuilder {
            config: self.config,
            env,
            store: self.store,
            transport: self.transport,
            crypto: self.crypto,
            events: self.events,
        }
    }

    /// Back the cache with `store`.
    #[must_use]
    pub fn store(mut self, store: impl CacheStore) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Deliver domain events to `events`.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn DomainEventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Load the cache and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `EngineError::Store` if the cache store cannot be read
    pub fn start(self) -> Result<Engine, EngineError> {
        let Self { config, env, store, transport, crypto, events } = self;

        let store = store.unwrap_or_else(|| Box::new(MemoryStore::new()));
        let cache = MessageCache::open(config.cache.clone(), env.clone(), store)?;
        let notifier = Notifier::new(config.notification_capacity);

        let (state, state_task) =
            StateTask::spawn(cache, env, config.pending_ttl, config.command_capacity);

        let decryptor = Decryptor::new(crypto, notifier.clone());
        let rewrap = RewrapClient::new(state.clone(), transport, decryptor);
        let router = Router::new(rewrap, state.clone(), notifier.clone(), events);

        let (sink, requests) = mpsc::channel(config.command_capacity.max(1));
        let scheduler = RetryScheduler::new(state.clone(), sink, config.retry_interval).spawn();
        let forwarder = tokio::spawn(forward_retries(router.clone(), requests));

        tracing::info!(
            max_cache_bytes = config.cache.max_bytes,
            ttl_secs = config.cache.ttl.as_secs(),
            max_retries = config.cache.max_retries,
            retry_interval_secs = config.retry_interval.as_secs(),
            "engine started"
        );

        Ok(Engine { router, state, notifier, tasks: vec![scheduler, forwarder, state_task] })
    }
}

async fn forward_retries(router: Router, mut requests: mpsc::Receiver<RetryRequest>) {
    while let Some(request) = requests.recv().await {
        router.redeliver(request);
    }
}

/// Running engine.
pub struct Engine {
    router: Router,
    state: StateHandle,
    notifier: Notifier,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start building an engine around a transport and a crypto provider.
    pub fn builder(
        transport: Arc<dyn Transport>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> EngineBuilder<SystemEnv> {
        EngineBuilder::new(transport, crypto)
    }

    /// Process one inbound transport message (type tag included) on its own
    /// task.
    pub fn deliver(&self, message: Bytes) -> JoinHandle<()> {
        self.router.deliver(message)
    }

    /// Router, for callers that want to process messages inline.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handle to the state task.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Current state sizes.
    pub async fn stats(&self) -> Result<StateStats, EngineError> {
        self.state.stats().await
    }

    /// Run a retry sweep now and process every due message inline.
    ///
    /// Returns how many messages were offered again.
    pub async fn retry_now(&self) -> Result<usize, EngineError> {
        let due = self.state.due_for_retry().await?;
        let count = due.len();
        for entry in due {
            let request = RetryRequest { id: entry.id, raw: entry.raw, type_tag: entry.type_tag };
            self.router.process_retry(request).await;
        }
        Ok(count)
    }

    /// Wait until every cache mutation so far has been persisted.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.state.flush().await
    }

    /// Flush the cache, then stop the background tasks.
    ///
    /// Message tasks still in flight fail with `EngineError::StateClosed`
    /// and are dropped without a notification.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        let flushed = self.state.flush().await;
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("engine stopped");
        flushed
    }
}
