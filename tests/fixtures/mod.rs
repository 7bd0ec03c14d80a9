//! Test fixtures and in-memory broker for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use league_bus::amqp::dispatcher::{DispatchReport, Dispatcher};
use league_bus::amqp::matcher;
use league_bus::amqp::messages::MessageUtils;
use league_bus::error::Result;
use league_bus::types::{Disposition, Event};
use league_bus::EventHandler;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handler that remembers every event it was given
#[derive(Debug, Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events().len()
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) -> Result<()> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(event.clone());
        }
        Ok(())
    }
}

/// Handler that fails a fixed number of times before succeeding
#[derive(Debug)]
pub struct FlakyHandler {
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for FlakyHandler {
    async fn handle(&self, event: &Event) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("transient failure handling {}", event.name);
        }
        Ok(())
    }
}

/// One message sitting in an in-memory queue
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    pub deliveries: usize,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    bindings: Vec<String>,
    ready: VecDeque<QueuedMessage>,
    unacked: Vec<QueuedMessage>,
    acked: usize,
    discarded: usize,
}

/// Topic exchange with durable queues, enough to drive a `Dispatcher`
/// through requeue and redelivery without RabbitMQ
#[derive(Debug, Default)]
pub struct InMemoryExchange {
    queues: Mutex<HashMap<String, MemoryQueue>>,
}

/// Outcome of draining a queue
#[derive(Debug, Default)]
pub struct DrainSummary {
    pub deliveries: usize,
    pub acked: usize,
    pub requeued: usize,
    pub discarded: usize,
    pub left_unacked: usize,
    pub reports: Vec<DispatchReport>,
}

impl InMemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a queue (idempotent) and bind it with each pattern
    pub fn bind(&self, queue: &str, patterns: &[&str]) {
        let mut queues = self.queues.lock().unwrap();
        let entry = queues.entry(queue.to_string()).or_default();
        for pattern in patterns {
            if !entry.bindings.iter().any(|b| b == pattern) {
                entry.bindings.push(pattern.to_string());
            }
        }
    }

    /// Route a JSON payload to every queue with a matching binding
    pub fn publish(&self, routing_key: &str, payload: &Value) -> usize {
        let body = MessageUtils::encode_payload(payload).unwrap();
        self.publish_raw(routing_key, body)
    }

    /// Route an arbitrary body, as a foreign producer could
    pub fn publish_raw(&self, routing_key: &str, body: Vec<u8>) -> usize {
        let mut queues = self.queues.lock().unwrap();
        let mut routed = 0;

        for queue in queues.values_mut() {
            // A queue receives one copy even when several bindings match
            if queue
                .bindings
                .iter()
                .any(|b| matcher::matches(routing_key, b))
            {
                queue.ready.push_back(QueuedMessage {
                    routing_key: routing_key.to_string(),
                    body: body.clone(),
                    redelivered: false,
                    deliveries: 0,
                });
                routed += 1;
            }
        }

        routed
    }

    pub fn ready_count(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Deliver messages to the dispatcher until the queue is empty or the
    /// delivery limit is reached, settling each one like the broker would
    pub async fn drain(&self, queue: &str, dispatcher: &Dispatcher, max_deliveries: usize) -> DrainSummary {
        let mut summary = DrainSummary::default();

        while summary.deliveries < max_deliveries {
            let next = {
                let mut queues = self.queues.lock().unwrap();
                queues.get_mut(queue).and_then(|q| q.ready.pop_front())
            };
            let Some(mut message) = next else {
                break;
            };

            message.deliveries += 1;
            summary.deliveries += 1;

            let report = dispatcher.dispatch(&message.routing_key, &message.body).await;

            let mut queues = self.queues.lock().unwrap();
            let state = queues.get_mut(queue).unwrap();
            match report.disposition {
                Disposition::Ack => {
                    state.acked += 1;
                    summary.acked += 1;
                }
                Disposition::Reject { requeue: true } => {
                    message.redelivered = true;
                    state.ready.push_back(message);
                    summary.requeued += 1;
                }
                Disposition::Reject { requeue: false } => {
                    state.discarded += 1;
                    summary.discarded += 1;
                }
                Disposition::Leave => {
                    state.unacked.push(message);
                    summary.left_unacked += 1;
                }
            }
            summary.reports.push(report);
        }

        summary
    }
}
