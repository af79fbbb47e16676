// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the reqwest backend using wiremock.

use std::sync::Arc;
use std::time::Duration;

use hass_sync_lib::subscription::Subscribable;
use hass_sync_lib::transport::{HttpBackend, HttpRequest, Method, ReqwestBackend};
use hass_sync_lib::{
    Error, FetchPath, RetryPolicy, ServiceCallRequest, SyncConfig, SyncEngine, SyncStatus,
    TransportError,
};
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";
const SWITCHES: [&str; 3] = ["switch.pump", "switch.fan", "switch.heater"];

fn config_for(server: &MockServer) -> SyncConfig {
    let address = server.address();
    SyncConfig::new(address.ip().to_string(), TOKEN)
        .with_port(address.port())
        .with_switches(SWITCHES)
        .with_scene("scene.evening")
        .with_timeout(Duration::from_secs(2))
        .with_retry(RetryPolicy::linear(3, Duration::from_millis(10)))
        .with_request_spacing(Duration::from_millis(1), Duration::from_millis(1))
}

fn engine_for(config: SyncConfig) -> SyncEngine<ReqwestBackend> {
    SyncEngine::builder(config, ReqwestBackend::new())
        .build()
        .unwrap()
}

fn entity(id: &str, state: &str) -> serde_json::Value {
    json!({
        "entity_id": id,
        "state": state,
        "attributes": {"friendly_name": id.trim_start_matches("switch.")},
        "last_updated": "2024-05-01T10:00:00.000000+00:00"
    })
}

fn record_synced(engine: &SyncEngine<ReqwestBackend>) -> Arc<Mutex<Vec<Vec<bool>>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    engine.on_states_synced(move |states| sink.lock().push(states.to_vec()));
    received
}

// ============================================================================
// State reads
// ============================================================================

mod state_reads {
    use super::*;

    #[tokio::test]
    async fn bulk_sync_reports_all_switches() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                entity("sun.sun", "above_horizon"),
                entity("switch.pump", "on"),
                entity("switch.fan", "off"),
                entity("switch.heater", "on"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        let received = record_synced(&engine);

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.path, FetchPath::Bulk);
        assert_eq!(outcome.matched, 3);
        assert_eq!(*received.lock(), vec![vec![true, false, true]]);
        assert_eq!(engine.status(), SyncStatus::StatesSynced);
        assert_eq!(
            engine.switch("switch.pump").unwrap().state,
            hass_sync_lib::SwitchState::On
        );
    }

    #[tokio::test]
    async fn bulk_failure_falls_back_to_individual_reads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/switch.pump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entity("switch.pump", "on")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/switch.fan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entity("switch.fan", "on")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/switch.heater"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        let received = record_synced(&engine);

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.path, FetchPath::Individual);
        assert_eq!(outcome.matched, 2);
        assert_eq!(engine.status(), SyncStatus::PartialSync);
        assert_eq!(*received.lock(), vec![vec![true, true, false]]);
    }

    #[tokio::test]
    async fn nothing_readable_is_sync_failed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        let received = record_synced(&engine);

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.matched, 0);
        assert!(outcome.switch_states.is_none());
        assert_eq!(engine.status(), SyncStatus::SyncFailed);
        assert!(received.lock().is_empty());
        // Three attempts for the bulk read and three for each switch.
        assert_eq!(server.received_requests().await.unwrap().len(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn large_bulk_response_is_parsed_in_background() {
        let server = MockServer::start().await;

        let mut entities: Vec<serde_json::Value> = (0..400)
            .map(|i| entity(&format!("sensor.s{i}"), "12.5"))
            .collect();
        entities.push(entity("switch.pump", "off"));
        entities.push(entity("switch.fan", "on"));
        entities.push(entity("switch.heater", "off"));

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entities))
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server).with_async_parse_threshold(1024));

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.switch_states, Some(vec![false, true, false]));
        let stats = engine.parser_stats();
        assert_eq!(stats.async_jobs, 1);
        assert!(stats.largest_response_bytes > 1024);
        assert_eq!(engine.parse_queue_depth(), 0);
    }

    #[tokio::test]
    async fn oversize_response_is_rejected_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/switch.pump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entity("switch.pump", "on")))
            .mount(&server)
            .await;

        let engine = engine_for(
            config_for(&server)
                .with_switches(["switch.pump"])
                .with_max_response_bytes(1024),
        );

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.path, FetchPath::Individual);
        assert_eq!(engine.status(), SyncStatus::StatesSynced);
    }
}

// ============================================================================
// Backend
// ============================================================================

mod backend {
    use super::*;

    #[tokio::test]
    async fn read_timeout_follows_each_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/switch.slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(entity("switch.slow", "on"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let backend = ReqwestBackend::new();
        let base_url = config_for(&server).base_url();

        // The persistent client is built by a request with a long timeout.
        let first = HttpRequest::new(Method::Get, base_url.clone(), "/api/states", TOKEN)
            .with_timeout(Duration::from_secs(30));
        assert!(backend.send(&first).await.unwrap().is_success());

        let slow = HttpRequest::new(Method::Get, base_url, "/api/states/switch.slow", TOKEN)
            .with_timeout(Duration::from_millis(200));
        let err = backend.send(&slow).await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout(200)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exhausted_scratch_pool_parses_inline() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                entity("switch.pump", "on"),
                entity("switch.fan", "on"),
                entity("switch.heater", "off"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(
            config_for(&server)
                .with_async_parse_threshold(64)
                .with_scratch_pool_bytes(50),
        );

        let outcome = engine.sync_now().await.unwrap();

        assert_eq!(outcome.path, FetchPath::Bulk);
        assert_eq!(outcome.status, SyncStatus::StatesSynced);
        let stats = engine.parser_stats();
        assert_eq!(stats.async_jobs, 0);
        assert_eq!(stats.jobs_processed, 1);
    }
}

// ============================================================================
// Service calls
// ============================================================================

mod service_calls {
    use super::*;

    #[tokio::test]
    async fn set_switch_posts_entity_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/switch/turn_on"))
            .and(header("Authorization", "Bearer test-token"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({"entity_id": "switch.pump"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        engine.set_switch("switch.pump", true).await.unwrap();

        // The call alone does not change what the engine reports.
        assert_eq!(engine.switch_states(), vec![false, false, false]);
        assert_eq!(engine.status(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn trigger_scene_posts_scene_turn_on() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/scene/turn_on"))
            .and(body_json(json!({"entity_id": "scene.evening"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        engine.trigger_scene().await.unwrap();
    }

    #[tokio::test]
    async fn call_service_merges_extra_fields() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .and(body_json(json!({"entity_id": "light.hall", "brightness": 128})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        let request =
            ServiceCallRequest::new("light", "turn_on", "light.hall").with_field("brightness", 128);
        engine.call_service(&request).await.unwrap();
    }

    #[tokio::test]
    async fn failed_service_call_is_retried_and_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/switch/turn_off"))
            .respond_with(ResponseTemplate::new(401))
            .expect(3)
            .mount(&server)
            .await;

        let engine = engine_for(config_for(&server));
        let err = engine.set_switch("switch.fan", false).await.unwrap_err();

        match err {
            Error::Transport(TransportError::HttpStatus { status, reason }) => {
                assert_eq!(status, 401);
                assert_eq!(reason, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Service calls never move the sync status.
        assert_eq!(engine.status(), SyncStatus::Offline);
    }
}
