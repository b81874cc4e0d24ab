mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{Behavior, EICAR_THREAT, FakeClamd, eicar, refused_port};
use filenest::config::{ScanConfig, Strictness};
use filenest::models::{PipelineDecision, RejectReason, ScanAnnotation, UploadCandidate};
use filenest::services::scan_policy::ScanPolicyEngine;
use filenest::services::scanner::{ClamAvScanner, ScanResult};
use filenest::services::upload_pipeline::UploadPipeline;
use filenest::utils::validation::MAX_FILE_SIZE;
use filenest::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn config_for(host: String, port: u16, strictness: Strictness) -> ScanConfig {
    ScanConfig {
        daemon_host: host,
        daemon_port: port,
        timeout_secs: 5,
        strictness,
        ..ScanConfig::default()
    }
}

fn pipeline_for(config: &ScanConfig) -> UploadPipeline {
    UploadPipeline::new(
        Arc::new(ClamAvScanner::from_config(config)),
        ScanPolicyEngine::from_config(config),
    )
}

#[tokio::test]
async fn test_markdown_upload_accepted() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let config = config_for(daemon.host(), daemon.port(), Strictness::FailClosed);
    let pipeline = pipeline_for(&config);

    let candidate = UploadCandidate::new(
        "readme.md",
        &b"# Test Markdown\n\nThis is a test markdown file.\n"[..],
    )
    .with_declared_content_type("text/markdown");

    match pipeline.process(Some(&candidate)).await {
        PipelineDecision::Accept {
            content_type,
            scan,
            annotation,
        } => {
            assert_eq!(content_type, "text/markdown");
            assert_eq!(scan.result, ScanResult::Clean);
            assert_eq!(annotation, ScanAnnotation::Scanned);
        }
        other => panic!("expected accept, got {:?}", other),
    }

    let exchanges = daemon.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].payload, candidate.bytes.to_vec());
}

#[tokio::test]
async fn test_eicar_upload_rejected() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let config = config_for(daemon.host(), daemon.port(), Strictness::FailOpen);
    let pipeline = pipeline_for(&config);

    let candidate = UploadCandidate::new("eicar.txt", eicar());
    match pipeline.process(Some(&candidate)).await {
        PipelineDecision::Reject { reason, detail, .. } => {
            assert_eq!(reason, RejectReason::ScanInfected);
            assert_eq!(detail.as_deref(), Some(EICAR_THREAT));
        }
        other => panic!("expected reject, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exe_rejected_without_network_call() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let config = config_for(daemon.host(), daemon.port(), Strictness::FailClosed);
    let pipeline = pipeline_for(&config);

    let candidate = UploadCandidate::new("app.exe", vec![0x00, 0x13, 0x37, 0x42, 0x99])
        .with_declared_content_type("application/octet-stream");

    let decision = pipeline.process(Some(&candidate)).await;
    assert_eq!(
        decision.reject_reason(),
        Some(RejectReason::UnsupportedExtension)
    );
    assert!(daemon.exchanges().is_empty());
}

#[tokio::test]
async fn test_unreachable_daemon_fail_closed() {
    let port = refused_port().await;
    let config = config_for("127.0.0.1".to_string(), port, Strictness::FailClosed);
    let pipeline = pipeline_for(&config);

    let candidate = UploadCandidate::new("notes.txt", &b"some notes"[..]);
    match pipeline.process(Some(&candidate)).await {
        PipelineDecision::Reject { reason, detail, .. } => {
            assert_eq!(reason, RejectReason::ScanUnavailable);
            assert!(detail.is_some());
        }
        other => panic!("expected reject, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_daemon_fail_open() {
    let port = refused_port().await;
    let config = config_for("127.0.0.1".to_string(), port, Strictness::FailOpen);
    let pipeline = pipeline_for(&config);

    let candidate = UploadCandidate::new("notes.txt", &b"some notes"[..]);
    match pipeline.process(Some(&candidate)).await {
        PipelineDecision::Accept {
            content_type,
            annotation,
            scan,
        } => {
            assert_eq!(content_type, "text/plain");
            assert!(annotation.warning().is_some());
            assert_eq!(scan.status(), "error");
        }
        other => panic!("expected accept, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_goes_through_policy() {
    let daemon = FakeClamd::spawn(Behavior::Silent).await;
    let pipeline = UploadPipeline::new(
        Arc::new(
            ClamAvScanner::new(daemon.host(), daemon.port())
                .with_timeout(Duration::from_millis(200)),
        ),
        ScanPolicyEngine::new(Strictness::FailClosed, false),
    );

    let candidate = UploadCandidate::new("slow.csv", &b"a,b\n1,2\n"[..]);
    assert_eq!(
        pipeline.process(Some(&candidate)).await.reject_reason(),
        Some(RejectReason::ScanUnavailable)
    );
}

// HTTP surface

const BOUNDARY: &str = "---------------------------filenest0123456789";

fn multipart_body(filename: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn app_for(config: ScanConfig) -> axum::Router {
    let pipeline = Arc::new(pipeline_for(&config));
    create_app(AppState { pipeline, config })
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_http_upload_accepted() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let app = app_for(config_for(daemon.host(), daemon.port(), Strictness::FailClosed));

    let response = app
        .oneshot(upload_request(multipart_body(
            "readme.md",
            "text/markdown",
            b"# Hello\n\nworld\n",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["message"], "File uploaded successfully");
    assert_eq!(json["file"]["filename"], "readme.md");
    assert_eq!(json["file"]["content_type"], "text/markdown");
    assert_eq!(json["file"]["is_text"], true);
    assert_eq!(json["scan"]["status"], "clean");
    assert_eq!(json["scan"]["skipped"], false);
}

#[tokio::test]
async fn test_http_reason_codes() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let app = app_for(config_for(daemon.host(), daemon.port(), Strictness::FailClosed));

    let cases: Vec<(Vec<u8>, StatusCode, &str)> = vec![
        (
            multipart_body("eicar.txt", "text/plain", &eicar()),
            StatusCode::UNPROCESSABLE_ENTITY,
            "scan_infected",
        ),
        (
            multipart_body("app.exe", "application/octet-stream", &[0x00, 0x01, 0x02]),
            StatusCode::UNPROCESSABLE_ENTITY,
            "unsupported_extension",
        ),
        (
            multipart_body("CON.txt", "text/plain", b"reserved"),
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_filename",
        ),
        (
            multipart_body("report.txt", "text/plain", b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n"),
            StatusCode::UNPROCESSABLE_ENTITY,
            "unsupported_type",
        ),
        (
            multipart_body("big.txt", "text/plain", &vec![b'a'; MAX_FILE_SIZE + 1]),
            StatusCode::PAYLOAD_TOO_LARGE,
            "too_large",
        ),
    ];

    for (body, status, reason) in cases {
        let response = app.clone().oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), status, "{}", reason);
        let json = json_body(response).await;
        assert_eq!(json["reason"], reason);
        assert!(json["message"].is_string());
    }
}

#[tokio::test]
async fn test_http_body_over_limit_is_too_large() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let app = app_for(config_for(daemon.host(), daemon.port(), Strictness::FailClosed));

    let response = app
        .oneshot(upload_request(multipart_body(
            "big.txt",
            "text/plain",
            &vec![b'a'; 3 * 1024 * 1024],
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert_eq!(json["reason"], "too_large");
    assert!(json["message"].is_string());
    assert!(daemon.exchanges().is_empty());
}

#[tokio::test]
async fn test_http_missing_file() {
    let app = app_for(ScanConfig::default());

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         no file here\r\n\
         --{BOUNDARY}--\r\n"
    );
    let response = app
        .oneshot(upload_request(body.into_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["reason"], "no_file");
}

#[tokio::test]
async fn test_http_scan_unavailable() {
    let port = refused_port().await;
    let app = app_for(config_for("127.0.0.1".to_string(), port, Strictness::FailClosed));

    let response = app
        .oneshot(upload_request(multipart_body(
            "notes.txt",
            "text/plain",
            b"notes",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = json_body(response).await;
    assert_eq!(json["reason"], "scan_unavailable");
}

#[tokio::test]
async fn test_http_health() {
    let daemon = FakeClamd::spawn(Behavior::Detect).await;
    let app = app_for(config_for(daemon.host(), daemon.port(), Strictness::FailClosed));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "FileNest");
    assert_eq!(json["scanner"]["status"], "available");
    assert_eq!(json["scanner"]["strictness"], "fail-closed");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/scanner/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_http_health_scanner_down() {
    let port = refused_port().await;
    let app = app_for(config_for("127.0.0.1".to_string(), port, Strictness::FailOpen));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["scanner"]["status"], "unavailable");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/scanner/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
