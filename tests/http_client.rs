use axum::{
    extract::{Multipart, Query},
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use lipsync_client::{
    batch::BatchRunner,
    client::DownloadOutcome,
    job::{OutputSpec, OutputType},
    ClientConfig, HttpJobClient, JobApi, JobError, JobOptions, JobOutcome, JobRunner, JobSpec,
    JobState, Profile,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

type Params = Query<HashMap<String, String>>;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/lipsync", addr)
}

fn client(base_url: &str, profile: Profile) -> HttpJobClient {
    let config = config(base_url, profile);
    HttpJobClient::new(&config, "secret").unwrap()
}

fn config(base_url: &str, profile: Profile) -> ClientConfig {
    ClientConfig {
        profile,
        base_url: Some(base_url.to_string()),
        poll_interval_ms: 0,
        request_timeout_ms: Some(5_000),
        ..Default::default()
    }
}

fn csv_spec() -> JobSpec {
    JobSpec::new("Hello", "en-GB", OutputSpec::Csv)
}

/// Service that accepts one job, reports it running twice, then finished,
/// and serves `artifact` for it.
fn lifecycle_app(artifact: &'static [u8], submitted: Arc<Mutex<Vec<Value>>>) -> Router {
    let polls = Arc::new(AtomicU32::new(0));
    Router::new()
        .route(
            "/lipsync/generate",
            post(move |Query(params): Params, Json(body): Json<Value>| {
                let submitted = submitted.clone();
                async move {
                    assert_eq!(params.get("token").map(String::as_str), Some("secret"));
                    submitted.lock().unwrap().push(body);
                    Json(json!({ "jobId": "abc123", "message": "Job submitted" }))
                }
            }),
        )
        .route(
            "/lipsync/status",
            get(move |Query(params): Params| {
                let polls = polls.clone();
                async move {
                    assert_eq!(params.get("jobId").map(String::as_str), Some("abc123"));
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    let status = if n < 2 { "running" } else { "finished" };
                    Json(json!({ "jobId": "abc123", "status": status }))
                }
            }),
        )
        .route(
            "/lipsync/download",
            get(move |Query(params): Params| async move {
                assert_eq!(params.get("jobId").map(String::as_str), Some("abc123"));
                ([(header::CONTENT_TYPE, "video/mp4")], artifact.to_vec())
            }),
        )
}

#[tokio::test]
async fn test_run_job_end_to_end() {
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let base_url = serve(lifecycle_app(b"fake mp4 bytes", submitted.clone())).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("nested").join("hello.mp4");
    let config = config(&base_url, Profile::Generic);
    let api = HttpJobClient::new(&config, "secret").unwrap();
    let runner = JobRunner::from_config(Arc::new(api), &config);

    let options = JobOptions {
        text: Some("Hello world".to_string()),
        language: Some("en-GB".to_string()),
        background_rgb: Some("0,0,255".to_string()),
        ..Default::default()
    };
    let report = runner
        .run_options(&options, &destination, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.job_id, "abc123");
    assert_eq!(report.polls, 3);
    assert_eq!(report.submission["message"], "Job submitted");
    assert_eq!(
        report.outcome,
        JobOutcome::Downloaded {
            path: destination.clone(),
            bytes: 14
        }
    );
    assert_eq!(std::fs::read(&destination).unwrap(), b"fake mp4 bytes");

    let submitted = submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["text"], "Hello world");
    assert_eq!(submitted[0]["output"]["type"], "video");
    assert_eq!(submitted[0]["output"]["background_color"]["blue"], 255);
    assert_eq!(submitted[0]["tts_params"]["engine"], "Google");
    assert!(submitted[0]["wait_time"].is_null());
}

#[tokio::test]
async fn test_submit_uploads_audio_as_multipart() {
    let parts = Arc::new(Mutex::new(HashMap::new()));
    let seen = parts.clone();
    let app = Router::new().route(
        "/lipsync/generate",
        post(move |mut multipart: Multipart| {
            let seen = seen.clone();
            async move {
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().unwrap_or_default().to_string();
                    let data = field.bytes().await.unwrap();
                    seen.lock().unwrap().insert(name, data.to_vec());
                }
                Json(json!({ "jobId": 42 }))
            }
        }),
    );
    let base_url = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("speech.wav");
    std::fs::write(&audio, b"RIFF....WAVE").unwrap();
    let spec = JobOptions {
        text: Some("Hi".to_string()),
        language: Some("en-GB".to_string()),
        output_type: Some(OutputType::Csv),
        audio_file: Some(audio),
        ..Default::default()
    }
    .build(Profile::Generic, "Google")
    .unwrap();

    let submission = client(&base_url, Profile::Generic)
        .submit(&spec)
        .await
        .unwrap();
    assert_eq!(submission.job_id, "42");

    let parts = parts.lock().unwrap();
    assert_eq!(parts["audio"], b"RIFF....WAVE");
    let job: Value = serde_json::from_slice(&parts["job"]).unwrap();
    assert_eq!(job["language"], "en-GB");
    assert_eq!(job["output"]["type"], "csv");
}

#[tokio::test]
async fn test_submit_rejection_surfaces_payload() {
    let app = Router::new().route(
        "/lipsync/generate",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid token" })),
            )
        }),
    );
    let base_url = serve(app).await;
    let err = client(&base_url, Profile::Generic)
        .submit(&csv_spec())
        .await
        .unwrap_err();
    match err {
        JobError::Service { payload } => assert_eq!(payload["error"], "invalid token"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_non_json_body_is_a_service_error() {
    let app = Router::new().route(
        "/lipsync/generate",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
    );
    let base_url = serve(app).await;
    let err = client(&base_url, Profile::Generic)
        .submit(&csv_spec())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "service");
    assert_eq!(err.payload().unwrap()["status"], 502);
    assert_eq!(err.payload().unwrap()["error"], "upstream unavailable");
}

#[tokio::test]
async fn test_status_reads_legacy_message_field() {
    let app = Router::new().route(
        "/lipsync/status",
        get(|| async { Json(json!({ "message": "Finished" })) }),
    );
    let base_url = serve(app).await;
    let status = client(&base_url, Profile::Generic)
        .poll_status("abc")
        .await
        .unwrap();
    assert_eq!(status.state, JobState::Finished);
    assert_eq!(status.job_id, "abc");
}

#[tokio::test]
async fn test_download_json_body_is_a_failure() {
    let app = Router::new().route(
        "/lipsync/download",
        get(|| async { Json(json!({ "error": "job not finished" })) }),
    );
    let base_url = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");
    let outcome = client(&base_url, Profile::Generic)
        .download("abc", &destination)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DownloadOutcome::Failed {
            payload: json!({ "error": "job not finished" })
        }
    );
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_download_by_file_name_overwrites_destination() {
    let app = Router::new().route(
        "/lipsync/download",
        get(|Query(params): Params| async move {
            assert!(params.get("jobId").is_none());
            assert_eq!(params.get("fileName").map(String::as_str), Some("abc.csv"));
            ([(header::CONTENT_TYPE, "text/csv")], "frame,jaw\n0,0.1\n")
        }),
    );
    let base_url = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("curves.csv");
    std::fs::write(&destination, "stale content that is longer than the new one").unwrap();

    let outcome = client(&base_url, Profile::Animation)
        .download("abc", &destination)
        .await
        .unwrap();
    assert!(matches!(outcome, DownloadOutcome::Saved { bytes: 16, .. }));
    assert_eq!(
        std::fs::read_to_string(&destination).unwrap(),
        "frame,jaw\n0,0.1\n"
    );
}

#[tokio::test]
async fn test_batch_file_against_service() {
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let base_url = serve(lifecycle_app(b"mp4", submitted.clone())).await;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("greetings.json");
    std::fs::write(
        &input,
        serde_json::to_string(&json!({
            "default_settings": { "language": "en-GB", "token": "ignored" },
            "samples": { "hello": { "text": "Hello" } }
        }))
        .unwrap(),
    )
    .unwrap();

    let config = config(&base_url, Profile::Generic);
    let api = HttpJobClient::new(&config, "secret").unwrap();
    let batch = BatchRunner::new(JobRunner::from_config(Arc::new(api), &config));
    let summary = batch
        .run_file(&input, Some(dir.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(std::fs::read(dir.path().join("hello.mp4")).unwrap(), b"mp4");

    let results: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("greetings_results.json")).unwrap())
            .unwrap();
    assert_eq!(results["hello"]["jobId"], "abc123");
    assert_eq!(submitted.lock().unwrap()[0]["text"], "Hello");
}

#[tokio::test]
async fn test_repeated_status_reads_are_side_effect_free() {
    let status_hits = Arc::new(AtomicU32::new(0));
    let download_hits = Arc::new(AtomicU32::new(0));
    let (statuses, downloads) = (status_hits.clone(), download_hits.clone());
    let app = Router::new()
        .route(
            "/lipsync/status",
            get(move || {
                let statuses = statuses.clone();
                async move {
                    statuses.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "jobId": "done", "status": "finished" }))
                }
            }),
        )
        .route(
            "/lipsync/download",
            get(move || {
                let downloads = downloads.clone();
                async move {
                    downloads.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "video/mp4")], b"mp4".to_vec())
                }
            }),
        );
    let base_url = serve(app).await;

    let api = client(&base_url, Profile::Generic);
    let first = api.poll_status("done").await.unwrap();
    let second = api.poll_status("done").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.state, JobState::Finished);
    assert_eq!(status_hits.load(Ordering::SeqCst), 2);
    assert_eq!(download_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_download_outlives_request_timeout() {
    let app = Router::new()
        .route(
            "/lipsync/status",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(600)).await;
                Json(json!({ "status": "finished" }))
            }),
        )
        .route(
            "/lipsync/download",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(600)).await;
                ([(header::CONTENT_TYPE, "video/mp4")], b"large video".to_vec())
            }),
        );
    let base_url = serve(app).await;
    let mut config = config(&base_url, Profile::Generic);
    config.request_timeout_ms = Some(200);
    let api = HttpJobClient::new(&config, "secret").unwrap();

    let err = api.poll_status("slow").await.unwrap_err();
    assert_eq!(err.kind(), "transport");

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("slow.mp4");
    let outcome = api.download("slow", &destination).await.unwrap();
    assert!(matches!(outcome, DownloadOutcome::Saved { bytes: 11, .. }));
}
