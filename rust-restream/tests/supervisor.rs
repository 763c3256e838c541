//! Supervision tests against real `sh` subprocesses.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_restream::Error;
use rust_restream::domain::StreamDefinition;
use rust_restream::store::{ConfigStore, JsonFileStore, StreamStore};
use rust_restream::supervisor::{
    StopPolicy, StopReason, StreamEvent, StreamManager, SupervisorSettings,
};

use common::{ShellEngine, SlowLoadStore, manager, next_event, settings, url_stream};

const WAIT: Duration = Duration::from_secs(10);

fn is_started(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::Started { .. })
}

fn is_stopped(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::Stopped { .. })
}

#[tokio::test]
async fn looping_stream_restarts_after_cooldown() {
    let cooldown = Duration::from_millis(150);
    let engine = ShellEngine::new("exit 0");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), cooldown);
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("loop", true)).await.unwrap();

    let mut restarts = Vec::new();
    for _ in 0..3 {
        next_event(&mut rx, "loop", WAIT, |e| {
            matches!(e, StreamEvent::Started { attempt, .. } if *attempt >= 2)
        })
        .await;
        restarts.push(Instant::now());
    }
    // Observation lags emission a little, so allow some slack.
    let min_gap = cooldown.mul_f32(0.8);
    for pair in restarts.windows(2) {
        assert!(pair[1] - pair[0] >= min_gap, "restart came before the cooldown elapsed");
    }

    assert!(manager.stop_stream("loop").await.unwrap());
    assert!(!manager.is_running("loop"));
    assert!(!manager.store().contains("loop").await);
    assert!(engine.launches() >= 4);
}

#[tokio::test]
async fn non_looping_stream_is_forgotten_after_exit() {
    let engine = ShellEngine::new("exit 3");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("once", false)).await.unwrap();

    let exited = next_event(&mut rx, "once", WAIT, |e| matches!(e, StreamEvent::Exited { .. })).await;
    if let StreamEvent::Exited { exits, .. } = exited {
        assert_eq!(exits[0].code, Some(3));
    }
    let stopped = next_event(&mut rx, "once", WAIT, is_stopped).await;
    assert!(matches!(stopped, StreamEvent::Stopped { reason: StopReason::Completed, .. }));

    assert_eq!(engine.launches(), 1);
    assert!(!manager.is_running("once"));
    assert!(manager.store().list().await.is_empty());
}

#[tokio::test]
async fn stopping_an_idle_stream_still_deletes_it() {
    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));

    manager.add_stream(url_stream("idle", true)).await.unwrap();
    assert!(!manager.stop_stream("idle").await.unwrap());

    assert!(!manager.store().contains("idle").await);
    assert_eq!(engine.launches(), 0);
}

#[tokio::test]
async fn stop_during_cooldown_ends_the_loop() {
    let cooldown = Duration::from_millis(400);
    let engine = ShellEngine::new("exit 0");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), cooldown);
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("s", true)).await.unwrap();
    next_event(&mut rx, "s", WAIT, |e| matches!(e, StreamEvent::Restarting { .. })).await;

    assert!(manager.stop_stream("s").await.unwrap());
    assert!(!manager.is_running("s"));

    tokio::time::sleep(cooldown * 2).await;
    assert_eq!(engine.launches(), 1);
    assert!(!manager.store().contains("s").await);
}

#[tokio::test]
async fn stop_kills_running_processes() {
    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine, Duration::from_millis(50));

    manager.create_stream(url_stream("live", true)).await.unwrap();
    let pids = manager.get_stream("live").await.unwrap().pids;
    assert_eq!(pids.len(), 1);

    assert!(manager.stop_stream("live").await.unwrap());

    // The process has been reaped, so its pid no longer names a live process.
    let alive = std::process::Command::new("kill")
        .args(["-0", &pids[0].to_string()])
        .status()
        .unwrap()
        .success();
    assert!(!alive);
}

#[tokio::test]
async fn external_kill_is_followed_by_a_restart() {
    let cooldown = Duration::from_millis(100);
    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), cooldown);
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("k", true)).await.unwrap();
    let pid = manager.get_stream("k").await.unwrap().pids[0];

    let killed_at = Instant::now();
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let started = next_event(&mut rx, "k", WAIT, is_started).await;
    let elapsed = killed_at.elapsed();
    assert!(elapsed >= cooldown);
    assert!(elapsed < cooldown + Duration::from_secs(3));
    if let StreamEvent::Started { attempt, pids, .. } = started {
        assert_eq!(attempt, 2);
        assert_ne!(pids, vec![pid]);
    }
    assert_eq!(manager.get_stream("k").await.unwrap().restarts, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn restore_starts_every_stored_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streams.json");
    let backend = Arc::new(JsonFileStore::new(&path));
    backend
        .save(&[url_stream("a", true), url_stream("b", true), url_stream("c", false)])
        .await
        .unwrap();

    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::new(backend.clone())), engine.clone(), Duration::from_millis(50));

    assert_eq!(manager.restore().await, 3);
    assert_eq!(manager.registry().len(), 3);
    assert_eq!(engine.launches(), 3);

    // Restoring again does not duplicate anything.
    assert_eq!(manager.restore().await, 0);
    assert_eq!(manager.registry().len(), 3);

    // Shutdown keeps definitions for the next boot.
    manager.shutdown().await;
    assert!(manager.registry().is_empty());
    assert_eq!(backend.load().await.len(), 3);
}

#[tokio::test]
async fn invalid_definitions_do_not_touch_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streams.json");
    let store = Arc::new(ConfigStore::new(Arc::new(JsonFileStore::new(&path))));
    let engine = ShellEngine::new("exit 0");
    let manager = manager(store, engine.clone(), Duration::from_millis(50));

    let no_destinations = StreamDefinition::new("x", "rtmp://origin/live", vec![], true);
    let err = manager.create_stream(no_destinations).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let no_source = StreamDefinition::new("x", "  ", vec!["rtmp://edge/live".into()], true);
    let err = manager.create_stream(no_source).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(!path.exists());
    assert_eq!(engine.launches(), 0);
    assert_eq!(manager.registry().len(), 0);
}

#[tokio::test]
async fn missing_source_file_stops_the_stream() {
    let engine = ShellEngine::new("exit 0");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));
    let mut rx = manager.subscribe();

    let definition = StreamDefinition::new(
        "file",
        "/nonexistent/dir/video.mp4",
        vec!["rtmp://edge/live".into()],
        true,
    )
    .with_id("file");
    let err = manager.create_stream(definition).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ref msg) if msg.contains("File does not exist")));

    let stopped = next_event(&mut rx, "file", WAIT, is_stopped).await;
    assert!(matches!(stopped, StreamEvent::Stopped { reason: StopReason::Failed, .. }));
    assert_eq!(engine.launches(), 0);
    assert!(!manager.store().contains("file").await);
    assert!(!manager.is_running("file"));
}

#[tokio::test]
async fn local_file_sources_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("video.mp4");
    std::fs::write(&video, b"not really a video").unwrap();

    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));

    let definition = StreamDefinition::new(
        "file",
        video.to_string_lossy(),
        vec!["rtmp://edge/live".into()],
        true,
    );
    let definition = manager.create_stream(definition).await.unwrap();
    assert!(manager.is_running(&definition.id));

    manager.delete_stream(&definition.id).await.unwrap();
    assert!(!manager.is_running(&definition.id));
    assert!(manager.store().list().await.is_empty());
}

#[tokio::test]
async fn import_replaces_running_streams() {
    let engine = ShellEngine::new("exec sleep 30");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));

    manager.create_stream(url_stream("old", true)).await.unwrap();

    let mut disabled = url_stream("parked", true);
    disabled.enabled = false;
    let started = manager
        .import(vec![url_stream("new1", true), url_stream("new2", false), disabled])
        .await
        .unwrap();

    assert_eq!(started, 2);
    assert!(!manager.is_running("old"));
    assert!(manager.is_running("new1"));
    assert!(manager.is_running("new2"));
    assert!(!manager.is_running("parked"));

    let ids: Vec<_> = manager.export().await.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["new1", "new2", "parked"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn concurrent_creates_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streams.json");
    let backend = Arc::new(JsonFileStore::new(&path));
    let engine = ShellEngine::new("exec sleep 30");
    let manager = Arc::new(manager(
        Arc::new(ConfigStore::new(backend.clone())),
        engine,
        Duration::from_millis(50),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.create_stream(url_stream(&format!("s{i}"), true)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(backend.load().await.len(), 8);
    assert_eq!(manager.registry().len(), 8);
    manager.shutdown().await;
}

#[tokio::test]
async fn stop_racing_a_slow_start_leaves_nothing_running() {
    let backend = SlowLoadStore::new(Duration::from_millis(300));
    let engine = ShellEngine::new("exec sleep 30");
    let manager = Arc::new(manager(
        Arc::new(ConfigStore::new(backend.clone())),
        engine,
        Duration::from_millis(50),
    ));
    manager.add_stream(url_stream("r", true)).await.unwrap();

    backend.stall_next_load();
    let start = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start_stream("r").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped = manager.stop_stream("r").await.unwrap();
    let started = start.await.unwrap();

    assert!(stopped, "stop must see the in-flight start");
    assert!(matches!(started, Err(Error::NotFound { .. })), "{started:?}");
    assert!(!manager.is_running("r"));
    assert!(!manager.store().contains("r").await);
    assert!(manager.list_streams().await.is_empty());
}

#[tokio::test]
async fn definition_removed_behind_the_manager_ends_the_loop() {
    let engine = ShellEngine::new("sleep 0.3");
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("gone", true)).await.unwrap();
    assert!(manager.store().remove("gone").await.unwrap());

    let stopped = next_event(&mut rx, "gone", WAIT, is_stopped).await;
    assert!(matches!(stopped, StreamEvent::Stopped { reason: StopReason::Removed, .. }));
    assert_eq!(engine.launches(), 1);
    assert!(!manager.is_running("gone"));
}

#[tokio::test]
async fn failed_restart_is_retried_after_cooldown() {
    let engine = ShellEngine::failing_on("exit 0", &[2]);
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(50));
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("flaky", true)).await.unwrap();

    next_event(&mut rx, "flaky", WAIT, |e| matches!(e, StreamEvent::StartFailed { .. })).await;
    let restarted = next_event(&mut rx, "flaky", WAIT, is_started).await;
    assert!(matches!(restarted, StreamEvent::Started { attempt: 3, .. }));
    assert!(manager.store().contains("flaky").await);

    assert!(manager.stop_stream("flaky").await.unwrap());
    assert!(engine.launches() >= 3);
}

#[tokio::test]
async fn failed_restart_of_a_stream_no_longer_looping_completes() {
    let engine = ShellEngine::failing_on("exit 0", &[2]);
    let manager = manager(Arc::new(ConfigStore::in_memory()), engine.clone(), Duration::from_millis(300));
    let mut rx = manager.subscribe();

    manager.create_stream(url_stream("edited", true)).await.unwrap();
    next_event(&mut rx, "edited", WAIT, |e| matches!(e, StreamEvent::Restarting { .. })).await;
    manager
        .store()
        .update("edited", |d| d.looping = false)
        .await
        .unwrap();

    next_event(&mut rx, "edited", WAIT, |e| matches!(e, StreamEvent::StartFailed { .. })).await;
    let stopped = next_event(&mut rx, "edited", WAIT, is_stopped).await;
    assert!(matches!(stopped, StreamEvent::Stopped { reason: StopReason::Completed, .. }));
    assert_eq!(engine.launches(), 2);
    assert!(!manager.store().contains("edited").await);
}

#[tokio::test]
async fn retain_policy_disables_and_start_reenables() {
    let engine = ShellEngine::new("exec sleep 30");
    let manager = StreamManager::new(
        Arc::new(ConfigStore::in_memory()),
        engine.clone(),
        SupervisorSettings {
            stop_policy: StopPolicy::Retain,
            ..settings(Duration::from_millis(50))
        },
    );

    manager.create_stream(url_stream("kept", true)).await.unwrap();
    manager.start_stream("kept").await.unwrap();
    assert_eq!(engine.launches(), 1);

    assert!(manager.stop_stream("kept").await.unwrap());
    assert!(!manager.store().get("kept").await.unwrap().enabled);
    assert!(!manager.is_running("kept"));
    assert_eq!(manager.restore().await, 0);

    let definition = manager.start_stream("kept").await.unwrap();
    assert!(definition.enabled);
    assert!(manager.store().get("kept").await.unwrap().enabled);

    manager.shutdown().await;
    assert!(manager.store().contains("kept").await);
}
