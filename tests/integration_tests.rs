//! Integration tests for league-bus
//!
//! These tests drive the registry, matcher and dispatcher together through an
//! in-memory topic exchange, covering:
//! - Fan-out of one event to several matching patterns
//! - Discarding undecodable payloads
//! - Requeue and redelivery after handler failures
//! - Per-service queue isolation
//! - Publisher capture and dispatch metrics

mod fixtures;

use fixtures::{FlakyHandler, InMemoryExchange, RecordingHandler};
use league_bus::amqp::dispatcher::Dispatcher;
use league_bus::amqp::messages::*;
use league_bus::amqp::publisher::{EventPublisher, MockEventPublisher};
use league_bus::metrics::MetricsCollector;
use league_bus::types::{Disposition, Event, UnmatchedPolicy};
use league_bus::utils::queue_name;
use league_bus::{EventHandler, HandlerRegistry};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub Handler {}

    #[async_trait::async_trait]
    impl EventHandler for Handler {
        async fn handle(&self, event: &Event) -> league_bus::Result<()>;
    }
}

/// Bind a service queue with every registered pattern, the way the consumer does
fn bind_service(exchange: &InMemoryExchange, service: &str, registry: &HandlerRegistry) -> String {
    let queue = queue_name(service);
    let patterns: Vec<&str> = registry.patterns().collect();
    exchange.bind(&queue, &patterns);
    queue
}

#[tokio::test]
async fn test_one_event_reaches_every_matching_pattern() {
    let exchange = InMemoryExchange::new();
    let exact = RecordingHandler::new();
    let single = RecordingHandler::new();
    let multi = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on("match.created", exact.clone());
    registry.on("match.*", single.clone());
    registry.on("#", multi.clone());
    let queue = bind_service(&exchange, "read-model-updater", &registry);

    let payload = json!({ "match_id": 42 });
    assert_eq!(exchange.publish(MATCH_CREATED, &payload), 1);

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let summary = exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(summary.deliveries, 1);
    assert_eq!(summary.acked, 1);
    assert_eq!(summary.reports[0].matched_patterns, 3);

    for handler in [&exact, &single, &multi] {
        let events = handler.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, MATCH_CREATED);
        assert_eq!(events[0].payload, payload);
    }
}

#[tokio::test]
async fn test_malformed_payload_is_discarded_without_handlers() {
    let exchange = InMemoryExchange::new();
    let handler = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on("#", handler.clone());
    let queue = bind_service(&exchange, "ranking", &registry);

    exchange.publish_raw(MATCH_UPDATED, b"{not json".to_vec());

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let summary = exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(summary.deliveries, 1);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.requeued, 0);
    assert_eq!(handler.count(), 0);
    assert_eq!(exchange.ready_count(&queue), 0);
}

#[tokio::test]
async fn test_failing_handler_is_redelivered_until_success() {
    let exchange = InMemoryExchange::new();
    let flaky = FlakyHandler::failing(2);

    let mut registry = HandlerRegistry::new();
    registry.on(TOURNAMENT_FINISHED, flaky.clone());
    let queue = bind_service(&exchange, "ranking", &registry);

    exchange.publish(TOURNAMENT_FINISHED, &json!({ "tournamentId": "cup-2024" }));

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let summary = exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(summary.deliveries, 3);
    assert_eq!(summary.requeued, 2);
    assert_eq!(summary.acked, 1);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(
        summary.reports[0].disposition,
        Disposition::Reject { requeue: true }
    );
    assert_eq!(
        summary.reports[0].failed_pattern.as_deref(),
        Some(TOURNAMENT_FINISHED)
    );
    assert_eq!(summary.reports[2].disposition, Disposition::Ack);
    assert_eq!(exchange.ready_count(&queue), 0);
}

#[tokio::test]
async fn test_earlier_handlers_rerun_on_redelivery() {
    let exchange = InMemoryExchange::new();
    let first = RecordingHandler::new();
    let flaky = FlakyHandler::failing(1);

    let mut registry = HandlerRegistry::new();
    registry.on("match.*", first.clone());
    registry.on("match.deleted", flaky.clone());
    let queue = bind_service(&exchange, "public-api", &registry);

    exchange.publish(MATCH_DELETED, &json!({ "matchId": "m-7" }));

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let summary = exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(summary.deliveries, 2);
    assert_eq!(summary.acked, 1);
    // At-least-once: the handler ahead of the failing one sees the event twice
    assert_eq!(first.count(), 2);
    assert_eq!(flaky.calls(), 2);
}

#[tokio::test]
async fn test_two_handlers_on_one_pattern_each_run_once() {
    let exchange = InMemoryExchange::new();
    let a = RecordingHandler::new();
    let b = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on(SEASON_FINISHED, a.clone());
    registry.on(SEASON_FINISHED, b.clone());
    assert_eq!(registry.len(), 1);
    let queue = bind_service(&exchange, "ranking", &registry);

    exchange.publish(SEASON_FINISHED, &json!({ "season": 2024 }));

    let dispatcher = Dispatcher::new(Arc::new(registry));
    let summary = exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(summary.acked, 1);
    assert_eq!(summary.reports[0].handlers_succeeded, 2);
    assert_eq!(a.count(), 1);
    assert_eq!(b.count(), 1);
}

#[tokio::test]
async fn test_same_handler_under_two_matching_patterns_runs_twice() {
    let exchange = InMemoryExchange::new();
    let handler = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on("team.*", handler.clone());
    registry.on("*.deleted", handler.clone());
    let queue = bind_service(&exchange, "read-model-updater", &registry);

    // The queue holds a single copy even though two bindings match
    assert_eq!(exchange.publish(TEAM_DELETED, &json!({ "teamId": "t-9" })), 1);

    let dispatcher = Dispatcher::new(Arc::new(registry));
    exchange.drain(&queue, &dispatcher, 10).await;

    assert_eq!(handler.count_named(TEAM_DELETED), 2);
}

#[tokio::test]
async fn test_each_service_gets_its_own_copy() {
    let exchange = InMemoryExchange::new();
    let ranking_handler = RecordingHandler::new();
    let api_handler = RecordingHandler::new();
    let courses_handler = RecordingHandler::new();

    let mut ranking = HandlerRegistry::new();
    ranking.on("match.#", ranking_handler.clone());
    let mut api = HandlerRegistry::new();
    api.on("#", api_handler.clone());
    let mut courses = HandlerRegistry::new();
    courses.on(COURSE_DELETED, courses_handler.clone());

    let ranking_queue = bind_service(&exchange, "ranking", &ranking);
    let api_queue = bind_service(&exchange, "public-api", &api);
    let courses_queue = bind_service(&exchange, "courses", &courses);
    assert_ne!(ranking_queue, api_queue);

    assert_eq!(exchange.publish(MATCH_CREATED, &json!({ "matchId": "m-1" })), 2);

    exchange
        .drain(&ranking_queue, &Dispatcher::new(Arc::new(ranking)), 10)
        .await;
    exchange
        .drain(&api_queue, &Dispatcher::new(Arc::new(api)), 10)
        .await;
    exchange
        .drain(&courses_queue, &Dispatcher::new(Arc::new(courses)), 10)
        .await;

    assert_eq!(ranking_handler.count(), 1);
    assert_eq!(api_handler.count(), 1);
    assert_eq!(courses_handler.count(), 0);
}

#[tokio::test]
async fn test_unmatched_policy_on_a_wide_binding() {
    let exchange = InMemoryExchange::new();
    let handler = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on("rankings.updated", handler.clone());
    let registry = Arc::new(registry);
    // Queue bound wider than the registry, e.g. by another deployment
    let queue = queue_name("ranking");
    exchange.bind(&queue, &["#"]);

    exchange.publish(MATCH_CREATED, &json!({}));
    let acked = exchange
        .drain(&queue, &Dispatcher::new(registry.clone()), 10)
        .await;
    assert_eq!(acked.acked, 1);
    assert_eq!(acked.reports[0].matched_patterns, 0);

    exchange.publish(MATCH_CREATED, &json!({}));
    let ignored = exchange
        .drain(
            &queue,
            &Dispatcher::new(registry).with_unmatched_policy(UnmatchedPolicy::Ignore),
            10,
        )
        .await;
    assert_eq!(ignored.left_unacked, 1);
    assert_eq!(handler.count(), 0);
}

#[tokio::test]
async fn test_multi_hash_patterns_route_deep_keys() {
    let exchange = InMemoryExchange::new();
    let handler = RecordingHandler::new();

    let mut registry = HandlerRegistry::new();
    registry.on("#.stats.#", handler.clone());
    let queue = bind_service(&exchange, "stats-sink", &registry);

    exchange.publish("league.a.stats.player.goals", &json!({}));
    exchange.publish("stats", &json!({}));
    exchange.publish("league.standings", &json!({}));

    let summary = exchange
        .drain(&queue, &Dispatcher::new(Arc::new(registry)), 10)
        .await;

    assert_eq!(summary.deliveries, 2);
    assert_eq!(handler.count(), 2);
}

#[tokio::test]
async fn test_mocked_handler_expectations() {
    let mut first = MockHandler::new();
    first
        .expect_handle()
        .withf(|event| event.name == RANKINGS_UPDATED && event.payload["season"] == 2024)
        .times(1)
        .returning(|_| Ok(()));

    let mut never = MockHandler::new();
    never.expect_handle().times(0);

    let mut registry = HandlerRegistry::new();
    registry.on("rankings.*", Arc::new(first));
    registry.on("match.#", Arc::new(never));

    let body = MessageUtils::encode_payload(&json!({ "season": 2024 })).unwrap();
    let report = Dispatcher::new(Arc::new(registry))
        .dispatch(RANKINGS_UPDATED, &body)
        .await;

    assert_eq!(report.disposition, Disposition::Ack);
    assert_eq!(report.matched_patterns, 1);
}

#[tokio::test]
async fn test_dispatch_metrics_follow_dispositions() {
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let flaky = FlakyHandler::failing(1);

    let mut registry = HandlerRegistry::new();
    registry.on("#", flaky.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry)).with_metrics(metrics.clone());

    let body = MessageUtils::encode_payload(&json!({ "x": 1 })).unwrap();
    dispatcher.dispatch(MATCH_UPDATED, &body).await;
    dispatcher.dispatch(MATCH_UPDATED, &body).await;
    dispatcher.dispatch(MATCH_UPDATED, b"garbage").await;

    let messages = &metrics.consumer().messages_total;
    assert_eq!(messages.with_label_values(&["requeue"]).get(), 1);
    assert_eq!(messages.with_label_values(&["ack"]).get(), 1);
    assert_eq!(messages.with_label_values(&["discard"]).get(), 1);
}

#[tokio::test]
async fn test_mock_publisher_captures_events() {
    let publisher = MockEventPublisher::new();

    publisher
        .publish(MATCH_CREATED, json!({ "matchId": "m-1" }))
        .await
        .unwrap();
    publisher
        .publish(MATCH_CREATED, json!({ "matchId": "m-2" }))
        .await
        .unwrap();
    publisher
        .publish(RANKINGS_UPDATED, json!({ "season": 2024 }))
        .await
        .unwrap();

    assert_eq!(publisher.count_events_named(MATCH_CREATED), 2);
    assert_eq!(publisher.get_published_events().len(), 3);

    publisher.clear_events();
    assert!(publisher.get_published_events().is_empty());
}
