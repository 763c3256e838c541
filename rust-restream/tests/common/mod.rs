//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::broadcast;

use rust_restream::domain::StreamDefinition;
use rust_restream::process::{ProcessGroup, StreamEngine};
use rust_restream::store::{ConfigStore, MemoryStore, StreamStore};
use rust_restream::{Error, Result};
use rust_restream::supervisor::{StopPolicy, StreamEvent, StreamManager, SupervisorSettings};

/// Engine that runs a shell script in place of the encoder.
pub struct ShellEngine {
    script: String,
    launches: AtomicUsize,
    /// 1-based launch numbers that fail as if the binary were missing.
    failing: Vec<usize>,
}

impl ShellEngine {
    pub fn new(script: &str) -> Arc<Self> {
        Self::failing_on(script, &[])
    }

    pub fn failing_on(script: &str, launches: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            script: script.to_string(),
            launches: AtomicUsize::new(0),
            failing: launches.to_vec(),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamEngine for ShellEngine {
    fn name(&self) -> &'static str {
        "sh"
    }

    async fn launch(&self, stream_id: &str, _definition: &StreamDefinition) -> Result<ProcessGroup> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&launch) {
            return Err(Error::spawn(format!("sh: launch {launch} refused")));
        }
        let mut command = Command::new("sh");
        command.args(["-c", &self.script]);
        ProcessGroup::spawn(stream_id, vec![("sh".to_string(), command)]).await
    }

    fn is_available(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some("sh".to_string())
    }
}

/// In-memory backend whose next load can be made to stall, widening
/// start/stop races.
pub struct SlowLoadStore {
    inner: MemoryStore,
    delay: Duration,
    armed: AtomicBool,
}

impl SlowLoadStore {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            delay,
            armed: AtomicBool::new(false),
        })
    }

    pub fn stall_next_load(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamStore for SlowLoadStore {
    async fn load(&self) -> Vec<StreamDefinition> {
        if self.armed.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.load().await
    }

    async fn save(&self, streams: &[StreamDefinition]) -> Result<()> {
        self.inner.save(streams).await
    }
}

pub fn settings(cooldown: Duration) -> SupervisorSettings {
    SupervisorSettings {
        restart_cooldown: cooldown,
        stop_grace: Duration::from_secs(2),
        stop_policy: StopPolicy::Delete,
    }
}

pub fn manager(
    store: Arc<ConfigStore>,
    engine: Arc<ShellEngine>,
    cooldown: Duration,
) -> StreamManager {
    StreamManager::new(store, engine, settings(cooldown))
}

/// A definition with a network source, so no file needs to exist.
pub fn url_stream(id: &str, looping: bool) -> StreamDefinition {
    StreamDefinition::new(
        id,
        "rtmp://origin.example/live/in",
        vec![format!("rtmp://edge.example/live/{id}")],
        looping,
    )
    .with_id(id)
}

/// Wait for the next event of `id` matching `pred`.
pub async fn next_event<F>(
    rx: &mut broadcast::Receiver<StreamEvent>,
    id: &str,
    timeout: Duration,
    mut pred: F,
) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.stream_id() == id && pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for stream event")
}
