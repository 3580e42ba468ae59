//! Integration Tests for apibench
//!
//! These tests run the proxy routes and the load driver against mock
//! upstream servers bound to ephemeral local ports.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::time::{Duration, Instant};
use tower::util::ServiceExt;

mod common;
use common::*;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

// ============================================================================
// Proxy Route Integration Tests
// ============================================================================

mod proxy_routes {
    use super::*;

    #[tokio::test]
    async fn test_call_wraps_upstream_body() {
        let upstream = spawn_upstream("42", Duration::ZERO).await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let (status, body) = get(app, "/api/call").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"{"result":"42"}"#);
    }

    #[tokio::test]
    async fn test_raw_call_passes_body_through() {
        let upstream = spawn_upstream("ok", Duration::ZERO).await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let (status, body) = get(app, "/call").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_hanging_upstream_times_out() {
        let upstream = spawn_hanging_upstream().await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let start = Instant::now();
        let (status, body) = get(app, "/api/call").await;
        let elapsed = start.elapsed();

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(elapsed >= Duration::from_millis(1900), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "hung for {:?}", elapsed);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "upstream_timeout");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let upstream = closed_port().await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let (status, body) = get(app, "/api/call").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "upstream_unreachable");
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_bad_gateway() {
        let upstream = spawn_failing_upstream(StatusCode::INTERNAL_SERVER_ERROR).await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let (status, body) = get(app, "/call").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "upstream_bad_status");
        assert_eq!(json["error"], "Upstream returned status 500");
    }

    #[tokio::test]
    async fn test_simulated_io_endpoint() {
        let upstream = closed_port().await;
        let app = create_proxy_app(upstream, Duration::from_secs(2));

        let (status, body) = get(app, "/io").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }
}

// ============================================================================
// Load Driver Integration Tests
// ============================================================================

mod load_driver {
    use super::*;
    use apibench::config::LoadConfig;
    use apibench::load::metrics::{Stat, builtin, spawn_collector};
    use apibench::load::{
        IterationContext, LoadRunner, Profile, ProfileKind, RunOptions, Script, Stage,
        THRESHOLDS_FAILED_EXIT_CODE, Target, TargetScript,
    };
    use apibench::summary::{Comparison, render_run_report};

    fn short_run_config(profile: ProfileKind) -> LoadConfig {
        LoadConfig {
            profile,
            stages: Some(vec![Stage::new(Duration::from_secs(2), 2)]),
            start_vus: 1,
            think_time: Duration::from_millis(100),
            graceful_stop: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn short_run_options() -> RunOptions {
        RunOptions {
            think_time: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
            graceful_stop: Duration::from_secs(5),
            trend_stats: Stat::default_trend_stats(),
        }
    }

    #[tokio::test]
    async fn test_single_target_iteration_records_passing_checks() {
        let upstream = spawn_upstream("ok", Duration::from_millis(50)).await;
        let script = TargetScript::new(
            vec![Target::new(format!("http://{}/io", upstream))],
            Duration::from_millis(2000),
        );

        let (sink, collector) = spawn_collector(64);
        let mut ctx = IterationContext {
            vu: 0,
            iteration: 0,
            client: reqwest::Client::new(),
            metrics: sink,
        };
        script.iteration(&mut ctx).await;
        drop(ctx);

        let mut registry = collector.await.unwrap();
        registry.finalize();

        let checks: Vec<_> = registry.checks().collect();
        assert_eq!(checks.len(), 2);
        for (name, counts) in checks {
            assert_eq!(counts.passes, 1, "check {}", name);
            assert_eq!(counts.fails, 0, "check {}", name);
        }

        let failed = registry.metric(builtin::HTTP_REQ_FAILED).unwrap();
        assert_eq!(failed.stat(Stat::Rate, Duration::ZERO), Some(0.0));
        let duration = registry.metric(builtin::HTTP_REQ_DURATION).unwrap();
        let max = duration.stat(Stat::Max, Duration::ZERO).unwrap();
        assert!(max >= 50.0 && max < 500.0, "duration {}ms", max);
    }

    #[tokio::test]
    async fn test_failed_request_is_recorded_not_raised() {
        let upstream = closed_port().await;
        let script = TargetScript::new(
            vec![
                Target::new(format!("http://{}/io", upstream))
                    .with_label("Go API")
                    .with_metric_prefix("go_api"),
            ],
            Duration::from_millis(2000),
        );

        let (sink, collector) = spawn_collector(64);
        let mut ctx = IterationContext {
            vu: 0,
            iteration: 0,
            client: reqwest::Client::new(),
            metrics: sink,
        };
        script.iteration(&mut ctx).await;
        drop(ctx);

        let mut registry = collector.await.unwrap();
        registry.finalize();

        let success = registry.metric("go_api_success_rate").unwrap();
        assert_eq!(success.stat(Stat::Rate, Duration::ZERO), Some(0.0));
        let failed = registry.metric(builtin::HTTP_REQ_FAILED).unwrap();
        assert_eq!(failed.stat(Stat::Rate, Duration::ZERO), Some(1.0));
    }

    #[tokio::test]
    async fn test_laravel_only_run_passes_thresholds() {
        let upstream = spawn_upstream("ok", Duration::from_millis(20)).await;
        let config = LoadConfig {
            laravel_api_url: format!("http://{}/io", upstream),
            ..short_run_config(ProfileKind::LaravelOnly)
        };
        let profile = Profile::from_config(&config).unwrap();

        let outcome = LoadRunner::new(short_run_options())
            .run(&profile)
            .await
            .unwrap();

        assert!(outcome.thresholds_passed);
        assert_eq!(outcome.exit_code(), 0);
        let summary = &outcome.summary;
        let reqs = summary.metric(builtin::HTTP_REQS).unwrap();
        assert!(reqs.value("count").unwrap() >= 2.0);
        assert!(summary.metric(builtin::ITERATIONS).is_some());
        assert!(summary.root_group.checks.iter().all(|c| c.fails == 0));
        assert!(summary.state.test_run_duration_ms >= 2000.0);

        let report = render_run_report(summary);
        assert!(report.contains("✓ status is 200"));
        assert!(report.contains("result: passed"));
    }

    #[tokio::test]
    async fn test_failing_upstream_fails_thresholds() {
        let upstream = spawn_failing_upstream(StatusCode::INTERNAL_SERVER_ERROR).await;
        let config = LoadConfig {
            laravel_api_url: format!("http://{}/io", upstream),
            ..short_run_config(ProfileKind::LaravelOnly)
        };
        let profile = Profile::from_config(&config).unwrap();

        let outcome = LoadRunner::new(short_run_options())
            .run(&profile)
            .await
            .unwrap();

        assert!(!outcome.thresholds_passed);
        assert_eq!(outcome.exit_code(), THRESHOLDS_FAILED_EXIT_CODE);
        let failed = outcome.summary.metric(builtin::HTTP_REQ_FAILED).unwrap();
        assert_eq!(failed.value("rate"), Some(1.0));
        assert!(!failed.thresholds["rate<0.05"].ok);
    }

    #[tokio::test]
    async fn test_comparison_run_renders_report() {
        let go = spawn_upstream("ok", Duration::from_millis(10)).await;
        let laravel = spawn_upstream("{\"result\":\"ok\"}", Duration::from_millis(60)).await;
        let config = LoadConfig {
            go_api_url: format!("http://{}/io", go),
            laravel_api_url: format!("http://{}/io", laravel),
            ..short_run_config(ProfileKind::Comparison)
        };
        let profile = Profile::from_config(&config).unwrap();

        let outcome = LoadRunner::new(short_run_options())
            .run(&profile)
            .await
            .unwrap();

        assert!(outcome.thresholds_passed);
        let summary = &outcome.summary;
        assert!(summary.metric("go_api_duration").is_some());
        assert!(summary.metric("laravel_api_duration").is_some());
        assert_eq!(
            summary.metric("go_api_success_rate").unwrap().value("rate"),
            Some(1.0)
        );

        let comparison = profile.comparison.clone().unwrap_or_else(Comparison::go_vs_laravel);
        let report = comparison.render(summary);
        assert!(report.contains("🚀 Go API Performance"));
        assert!(report.contains("Success rate:  100.00%"));
        assert!(report.contains("✅ Go API has the faster average response time"));
    }

    #[tokio::test]
    async fn test_summary_json_is_written() {
        let upstream = spawn_upstream("ok", Duration::ZERO).await;
        let config = LoadConfig {
            laravel_api_url: format!("http://{}/io", upstream),
            stages: Some(vec![Stage::new(Duration::from_millis(500), 1)]),
            ..short_run_config(ProfileKind::LaravelOnly)
        };
        let profile = Profile::from_config(&config).unwrap();
        let outcome = LoadRunner::new(short_run_options())
            .run(&profile)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        outcome.summary.write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["metrics"]["http_req_duration"]["type"], "trend");
        assert_eq!(json["metrics"]["http_req_duration"]["contains"], "time");
        assert!(json["metrics"]["http_req_duration"]["values"]["p(95)"].is_number());
        assert!(json["state"]["testRunDurationMs"].is_number());
    }

    #[tokio::test]
    async fn test_graceful_stop_aborts_hanging_iterations() {
        let upstream = spawn_hanging_upstream().await;
        let config = LoadConfig {
            laravel_api_url: format!("http://{}/io", upstream),
            stages: Some(vec![Stage::new(Duration::from_millis(500), 1)]),
            ..short_run_config(ProfileKind::LaravelOnly)
        };
        let profile = Profile::from_config(&config).unwrap();
        let options = RunOptions {
            request_timeout: Duration::from_secs(60),
            graceful_stop: Duration::from_secs(1),
            ..short_run_options()
        };

        let start = Instant::now();
        let outcome = LoadRunner::new(options).run(&profile).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(1500), "stopped after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10), "hung for {:?}", elapsed);

        // The aborted request never produced a sample
        let summary = &outcome.summary;
        assert!(summary.metric(builtin::HTTP_REQS).is_none());
        assert!(summary.metric(builtin::VUS).is_some());
        assert!(!outcome.thresholds_passed);
        assert_eq!(outcome.exit_code(), THRESHOLDS_FAILED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_vus_follow_ramp_down_and_back_up() {
        let upstream = spawn_upstream("ok", Duration::ZERO).await;
        let config = LoadConfig {
            laravel_api_url: format!("http://{}/io", upstream),
            start_vus: 3,
            stages: Some(vec![
                Stage::new(Duration::from_secs(1), 3),
                Stage::new(Duration::from_secs(1), 1),
                Stage::new(Duration::from_secs(1), 3),
            ]),
            ..short_run_config(ProfileKind::LaravelOnly)
        };
        let profile = Profile::from_config(&config).unwrap();

        let outcome = LoadRunner::new(short_run_options())
            .run(&profile)
            .await
            .unwrap();

        let vus = outcome.summary.metric(builtin::VUS).unwrap();
        // Surplus VUs exited while the target was at 1
        assert!(vus.value("min").unwrap() < 3.0, "vus {:?}", vus.values);
        assert_eq!(vus.value("max"), Some(3.0));
        // and were spawned again for the final stage
        assert_eq!(vus.value("value"), Some(3.0));

        let vus_max = outcome.summary.metric(builtin::VUS_MAX).unwrap();
        assert_eq!(vus_max.value("value"), Some(3.0));
        assert!(outcome.thresholds_passed);
    }
}
