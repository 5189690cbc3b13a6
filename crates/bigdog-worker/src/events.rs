//! Lifecycle and fetch event dispatch
//!
//! The host raises three kinds of events. Handlers registered for a kind run
//! in registration order, each receiving the event by reference. Install and
//! activate handlers extend the event's lifetime with `wait_until`; fetch
//! handlers supply a response with `respond_with`. The dispatcher then awaits
//! whatever the handlers registered.

use crate::coordinator::{CacheCoordinator, FetchOutcome};
use crate::error::{Result, WorkerError};
use crate::request::Request;
use cache_storage::ResponseSnapshot;
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
}

/// Install or activate event
pub struct ExtendableEvent {
    kind: EventKind,
    pending: Mutex<Vec<BoxFuture<'static, Result<()>>>>,
}

impl ExtendableEvent {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Keep the phase open until `work` finishes. A failure fails the phase.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::pin(work));
    }

    /// Await all registered work; the first failure in registration order wins
    async fn settle(self) -> Result<()> {
        let pending = self
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        join_all(pending).await.into_iter().collect()
    }
}

/// A request the page issued
pub struct FetchEvent {
    request: Request,
    response: Mutex<Option<BoxFuture<'static, ResponseSnapshot>>>,
}

impl FetchEvent {
    fn new(request: Request) -> Self {
        Self {
            request,
            response: Mutex::new(None),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Answer the request. Only the first call on an event takes effect.
    pub fn respond_with<F>(&self, response: F) -> Result<()>
    where
        F: Future<Output = ResponseSnapshot> + Send + 'static,
    {
        let mut slot = self
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(WorkerError::AlreadyResponded);
        }
        *slot = Some(Box::pin(response));
        Ok(())
    }

    async fn into_outcome(self) -> FetchOutcome {
        let response = self
            .response
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match response {
            Some(response) => FetchOutcome::Respond(response.await),
            None => FetchOutcome::Passthrough,
        }
    }
}

type LifecycleHandler = Box<dyn Fn(&ExtendableEvent) + Send + Sync>;
type FetchHandler = Box<dyn Fn(&FetchEvent) + Send + Sync>;

/// Registration table of event handlers
#[derive(Default)]
pub struct Dispatcher {
    install: Vec<LifecycleHandler>,
    activate: Vec<LifecycleHandler>,
    fetch: Vec<FetchHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_install(&mut self, handler: impl Fn(&ExtendableEvent) + Send + Sync + 'static) {
        self.install.push(Box::new(handler));
    }

    pub fn on_activate(&mut self, handler: impl Fn(&ExtendableEvent) + Send + Sync + 'static) {
        self.activate.push(Box::new(handler));
    }

    pub fn on_fetch(&mut self, handler: impl Fn(&FetchEvent) + Send + Sync + 'static) {
        self.fetch.push(Box::new(handler));
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Install => self.install.len(),
            EventKind::Activate => self.activate.len(),
            EventKind::Fetch => self.fetch.len(),
        }
    }

    /// Raise install. An error means the host should retry later.
    pub async fn install(&self) -> Result<()> {
        Self::run_lifecycle(EventKind::Install, &self.install).await
    }

    pub async fn activate(&self) -> Result<()> {
        Self::run_lifecycle(EventKind::Activate, &self.activate).await
    }

    async fn run_lifecycle(kind: EventKind, handlers: &[LifecycleHandler]) -> Result<()> {
        let event = ExtendableEvent::new(kind);
        for handler in handlers {
            handler(&event);
        }
        event.settle().await
    }

    /// Raise fetch. Without a `respond_with` the request passes through.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        let event = FetchEvent::new(request);
        for handler in &self.fetch {
            handler(&event);
        }
        event.into_outcome().await
    }
}

impl CacheCoordinator {
    /// Register install, activate and fetch handlers backed by this coordinator
    pub fn register(self: &Arc<Self>, dispatcher: &mut Dispatcher) {
        let this = Arc::clone(self);
        dispatcher.on_install(move |event| {
            let this = Arc::clone(&this);
            event.wait_until(async move { this.install().await });
        });

        let this = Arc::clone(self);
        dispatcher.on_activate(move |event| {
            let this = Arc::clone(&this);
            event.wait_until(async move {
                this.activate().await;
                Ok(())
            });
        });

        let this = Arc::clone(self);
        dispatcher.on_fetch(move |event| {
            if !this.intercepts(event.request()) {
                return;
            }
            let this = Arc::clone(&this);
            let request = event.request().clone();
            if let Err(e) = event.respond_with(async move { this.respond(&request).await }) {
                warn!(url = %event.request().url, error = %e, "Fetch already answered");
            }
        });
    }
}
