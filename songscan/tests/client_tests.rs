//! Scan client against a live server on an ephemeral port

#![cfg(unix)]

mod helpers;

use helpers::test_env::{RECOGNIZER_FAILS, RECOGNIZER_OK};
use helpers::{spawn_server, TestEnv};
use songscan::client::{ClientError, ScanClient};
use songscan::models::{JobStatus, ScanParameters};
use std::time::Duration;

async fn client_for(env: &TestEnv) -> ScanClient {
    let (app, _) = env.app();
    let base = spawn_server(app).await;
    ScanClient::new(&base)
        .unwrap()
        .with_poll_interval(Duration::from_millis(50))
}

#[tokio::test]
async fn test_submit_file_and_wait() {
    let env = TestEnv::with_recognizer(RECOGNIZER_OK);
    let client = client_for(&env).await;

    let media = env.dir.path().join("local.mp3");
    std::fs::write(&media, b"ID3-local-audio").unwrap();

    let job_id = client
        .submit_file(&media, &ScanParameters::default())
        .await
        .unwrap();

    let mut snapshots = 0;
    let merged = client
        .wait_for_completion(&job_id, |_| snapshots += 1)
        .await
        .unwrap();

    assert!(snapshots >= 1);
    assert_eq!(merged.len(), 2);
    assert!(merged[0].start <= merged[1].start);
    assert!(merged
        .iter()
        .filter_map(|s| s.confidence)
        .all(|c| (0.0..=1.0).contains(&c)));
    assert_eq!(merged[0].extra["start_hms"], "00:00:03");
    // The client's own file is never touched by the service
    assert!(media.exists());
}

#[tokio::test]
async fn test_failed_job_surfaces_message() {
    let env = TestEnv::with_recognizer(RECOGNIZER_FAILS);
    let client = client_for(&env).await;

    let media = env.dir.path().join("local.mp3");
    std::fs::write(&media, b"ID3").unwrap();
    let job_id = client
        .submit_file(&media, &ScanParameters::default())
        .await
        .unwrap();

    match client.wait_for_completion(&job_id, |_| {}).await {
        Err(ClientError::JobFailed(message)) => {
            assert!(message.contains("fingerprint service unreachable"), "{}", message)
        }
        other => panic!("expected JobFailed, got {:?}", other),
    }

    // Terminal state is kept for later polls
    assert!(matches!(
        client.status(&job_id).await.unwrap(),
        JobStatus::Error { .. }
    ));
}

#[tokio::test]
async fn test_server_errors_carry_status_and_message() {
    let env = TestEnv::with_recognizer(RECOGNIZER_OK);
    let client = client_for(&env).await;

    match client.status("job_00000000000000000000000000000000").await {
        Err(ClientError::Status { status, .. }) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected 404, got {:?}", other),
    }

    let bad = ScanParameters {
        concurrency: 0,
        ..Default::default()
    };
    match client.submit_url("http://127.0.0.1:9/a.mp3", &bad).await {
        Err(ClientError::Status { status, message }) => {
            assert_eq!(status.as_u16(), 400);
            assert!(message.contains("concurrency"), "{}", message);
        }
        other => panic!("expected 400, got {:?}", other),
    }
}
