//! The reporting facade.
//!
//! [`Dispatcher`] is the only entry point host integrations call. It owns
//! configuration and persisted user/environment overrides, runs the
//! pipeline, and contains every failure:
//!
//! ```text
//! publish(error, request?)
//!   ├─ credentials check ── disabled / missing → return
//!   ├─ ContextAggregator::build  ┐ concurrently
//!   ├─ StackTraceResolver        ┘
//!   ├─ Payload::build
//!   └─ Transport::send ── failure → logged, return
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::DispatcherConfig;
use crate::context::{AppContextProvider, ContextAggregator, RuntimeInfo};
use crate::error::ReportError;
use crate::event::{EnvironmentDescriptor, ErrorEvent, RequestData, UserRecord};
use crate::payload::Payload;
use crate::stack::{DefaultSourceFetcher, SourceFetcher, StackTraceResolver};
use crate::transport::{HttpTransport, Transport};

/// Captures errors and delivers them to the configured endpoint.
///
/// Instances are independent: overrides set on one dispatcher never affect
/// another. Share one across tasks with `Arc<Dispatcher>`.
pub struct Dispatcher {
    config: DispatcherConfig,
    provider: Option<Arc<dyn AppContextProvider>>,
    user: RwLock<Option<UserRecord>>,
    environment: RwLock<Option<EnvironmentDescriptor>>,
    aggregator: ContextAggregator,
    resolver: StackTraceResolver,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("domain", &self.config.domain)
            .field("enabled", &self.config.enabled)
            .field("has_provider", &self.provider.is_some())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher delivering over HTTP.
    pub fn new(config: DispatcherConfig) -> Self {
        Self::builder(config).build()
    }

    /// Starts a builder for swapping in a provider, transport or source fetcher.
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            provider: None,
            transport: None,
            fetcher: None,
            runtime: None,
        }
    }

    /// Configuration this dispatcher was built with.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Sets the user reported with every subsequent error.
    ///
    /// Takes precedence over [`AppContextProvider::user`].
    pub fn set_user(&self, user: UserRecord) {
        *self.user.write() = Some(user);
    }

    /// Forgets the persisted user; the provider is consulted again.
    pub fn clear_user(&self) {
        *self.user.write() = None;
    }

    /// The persisted user, if any.
    pub fn user(&self) -> Option<UserRecord> {
        self.user.read().clone()
    }

    /// Sets the environment reported with every subsequent error.
    ///
    /// Takes precedence over [`AppContextProvider::environment`].
    pub fn set_environment(&self, environment: EnvironmentDescriptor) {
        *self.environment.write() = Some(environment);
    }

    /// Forgets the persisted environment.
    pub fn clear_environment(&self) {
        *self.environment.write() = None;
    }

    /// The persisted environment, if any.
    pub fn environment(&self) -> Option<EnvironmentDescriptor> {
        self.environment.read().clone()
    }

    /// Reports `error`, never failing.
    ///
    /// Does nothing when `error` is `None`, reporting is disabled, or
    /// credentials are missing. Delivery failures are logged and dropped.
    pub async fn publish(&self, error: Option<&ErrorEvent>, request: Option<&RequestData>) {
        let Some(error) = error else {
            debug!("No error supplied, nothing to report");
            return;
        };

        match self.try_publish(error, request).await {
            Ok(()) => debug!(
                exception = error.name.as_deref().unwrap_or("unknown"),
                "Error report delivered"
            ),
            Err(ReportError::Config(reason)) => debug!(%reason, "Skipping error report"),
            Err(ReportError::Transport(e)) => error!(
                error = %e,
                status = ?e.status(),
                "Failed to deliver error report"
            ),
        }
    }

    /// Runs [`publish`](Self::publish) as an independent task.
    pub fn spawn_publish(self: &Arc<Self>, error: ErrorEvent, request: Option<RequestData>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.publish(Some(&error), request.as_ref()).await;
        })
    }

    /// Runs the pipeline and returns its outcome instead of logging it.
    pub async fn try_publish(&self, error: &ErrorEvent, request: Option<&RequestData>) -> Result<(), ReportError> {
        let (domain, token) = self.config.credentials()?;

        let payload = self.build_payload(error, request).await;
        self.transport.send(&payload, domain, token).await?;
        Ok(())
    }

    /// Builds the payload for `error` without delivering it.
    pub async fn build_payload(&self, error: &ErrorEvent, request: Option<&RequestData>) -> Payload {
        let user = self.user();
        let environment = self.environment();

        let context = async move {
            self.aggregator
                .build(user, environment, self.provider.as_deref(), request)
        };
        let frames = self.resolver.resolve_enriched(error);

        let (context, frames) = tokio::join!(context, frames);
        Payload::build(error, frames, context)
    }
}

/// Assembles a [`Dispatcher`] with non-default collaborators.
#[must_use]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    provider: Option<Arc<dyn AppContextProvider>>,
    transport: Option<Arc<dyn Transport>>,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    runtime: Option<RuntimeInfo>,
}

impl DispatcherBuilder {
    /// Supplies ambient user, environment and location data.
    pub fn provider(mut self, provider: Arc<dyn AppContextProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replaces the default [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Source access for previews; only used when previews are enabled.
    pub fn source_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Overrides the detected runtime facts.
    pub fn runtime(mut self, runtime: RuntimeInfo) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Finishes the dispatcher, defaulting to HTTP delivery.
    pub fn build(self) -> Dispatcher {
        let mut resolver = StackTraceResolver::new().with_radius(self.config.preview_radius);
        if self.config.previews {
            let fetcher: Arc<dyn SourceFetcher> = match self.fetcher {
                Some(fetcher) => fetcher,
                None => Arc::new(DefaultSourceFetcher::default()),
            };
            resolver = resolver.with_fetcher(fetcher);
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()),
        };

        Dispatcher {
            aggregator: ContextAggregator::new(self.runtime.unwrap_or_default()),
            resolver,
            transport,
            provider: self.provider,
            user: RwLock::new(None),
            environment: RwLock::new(None),
            config: self.config,
        }
    }
}
