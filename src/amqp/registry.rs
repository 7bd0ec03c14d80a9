//! Handler registration against topic patterns
//!
//! Every service builds one `HandlerRegistry` at startup by calling `on` for each
//! pattern it cares about. The consumer binds its queue with every distinct
//! pattern and the dispatcher walks the registry in registration order.

use crate::amqp::matcher;
use crate::error::Result;
use crate::types::Event;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Trait implemented by everything that reacts to events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one decoded event. Returning an error requeues the delivery.
    async fn handle(&self, event: &Event) -> Result<()>;
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

/// Handler backed by a plain synchronous closure
pub struct SyncFnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> EventHandler for SyncFnHandler<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event)
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Wrap a synchronous closure as a shareable handler
pub fn sync_handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(SyncFnHandler { f })
}

/// Ordered mapping of pattern -> handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: Vec<(String, Vec<Arc<dyn EventHandler>>)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern` and hand it back to the caller
    pub fn on(
        &mut self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Arc<dyn EventHandler> {
        let pattern = pattern.into();

        match self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, handlers)) => handlers.push(handler.clone()),
            None => self.entries.push((pattern, vec![handler.clone()])),
        }

        handler
    }

    /// Distinct patterns in first-registration order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(pattern, _)| pattern.as_str())
    }

    /// Handlers registered under exactly this pattern string
    pub fn handlers_for(&self, pattern: &str) -> &[Arc<dyn EventHandler>] {
        self.entries
            .iter()
            .find(|(p, _)| p == pattern)
            .map(|(_, handlers)| handlers.as_slice())
            .unwrap_or(&[])
    }

    /// Every (pattern, handlers) entry whose pattern matches the routing key
    pub fn matching<'a>(
        &'a self,
        routing_key: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [Arc<dyn EventHandler>])> + 'a {
        self.entries
            .iter()
            .filter(move |(pattern, _)| matcher::matches(routing_key, pattern))
            .map(|(pattern, handlers)| (pattern.as_str(), handlers.as_slice()))
    }

    /// Number of distinct patterns
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of registrations across all patterns
    pub fn handler_count(&self) -> usize {
        self.entries.iter().map(|(_, handlers)| handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(pattern, handlers)| (pattern, handlers.len())),
            )
            .finish()
    }
}
