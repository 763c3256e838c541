//! A set of encoder processes owned by one running stream.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use process_utils::GroupSignal;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Number of recent stderr lines kept for diagnostics.
const OUTPUT_TAIL_LINES: usize = 20;

/// Exit information for one member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberExit {
    /// What the member was serving (destination URI or `tee`).
    pub label: String,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
    pub success: bool,
}

impl MemberExit {
    fn from_status(label: &str, status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            label: label.to_string(),
            code: status.code(),
            signal,
            success: status.success(),
        }
    }

    fn unknown(label: &str) -> Self {
        Self {
            label: label.to_string(),
            code: None,
            signal: None,
            success: false,
        }
    }
}

struct Member {
    label: String,
    pid: Option<u32>,
    child: Child,
    exit: Option<MemberExit>,
}

/// Encoder processes for one stream, each leading its own OS process group.
pub struct ProcessGroup {
    stream_id: String,
    members: Vec<Member>,
    forwarders: Vec<JoinHandle<()>>,
    tail: Arc<Mutex<VecDeque<String>>>,
}

impl ProcessGroup {
    /// Spawn every command as a member of a new group.
    ///
    /// Commands are reconfigured to run in their own process group with
    /// stdin/stdout detached and stderr captured. If any member fails to
    /// spawn, the members already started are killed and no group is
    /// returned.
    pub async fn spawn(stream_id: &str, commands: Vec<(String, Command)>) -> Result<Self> {
        let mut group = Self {
            stream_id: stream_id.to_string(),
            members: Vec::with_capacity(commands.len()),
            forwarders: Vec::with_capacity(commands.len()),
            tail: Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES))),
        };

        for (label, mut command) in commands {
            use process_utils::IsolatedGroupExt;
            command
                .isolate_group()
                .kill_on_drop(true)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped());

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(stream_id = %stream_id, member = %label, error = %e, "Failed to spawn encoder");
                    group.kill().await;
                    return Err(Error::spawn(format!("{}: {}", label, e)));
                }
            };

            let pid = child.id();
            if let Some(stderr) = child.stderr.take() {
                group.forwarders.push(forward_stderr(
                    stream_id.to_string(),
                    label.clone(),
                    stderr,
                    group.tail.clone(),
                ));
            }

            debug!(stream_id = %stream_id, member = %label, pid = ?pid, "Encoder process spawned");
            group.members.push(Member {
                label,
                pid,
                child,
                exit: None,
            });
        }

        if group.members.is_empty() {
            return Err(Error::spawn("no encoder commands to run"));
        }

        Ok(group)
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Number of member processes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Pids (and process group ids) of the members.
    pub fn pids(&self) -> Vec<u32> {
        self.members.iter().filter_map(|m| m.pid).collect()
    }

    /// The last lines the members wrote to stderr.
    pub fn recent_output(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    /// Wait until every member has exited.
    ///
    /// Once a member is reaped, whatever it left behind in its process group
    /// is killed, so no descendant outlives the group.
    ///
    /// Cancel safe: members already reaped keep their recorded status.
    pub async fn wait(&mut self) -> Vec<MemberExit> {
        let stream_id = self.stream_id.as_str();
        let waits = self.members.iter_mut().map(|member| async move {
            if let Some(exit) = &member.exit {
                return exit.clone();
            }
            let exit = match member.child.wait().await {
                Ok(status) => MemberExit::from_status(&member.label, status),
                Err(e) => {
                    warn!(stream_id = %stream_id, member = %member.label, error = %e, "Failed to wait for encoder");
                    MemberExit::unknown(&member.label)
                }
            };
            if let Some(pid) = member.pid
                && let Err(e) = process_utils::signal_group(pid, GroupSignal::Kill)
            {
                debug!(stream_id = %stream_id, member = %member.label, error = %e, "Failed to sweep member process group");
            }
            member.exit = Some(exit.clone());
            exit
        });
        futures::future::join_all(waits).await
    }

    /// Ask every member group to stop, escalating to a kill after `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> Vec<MemberExit> {
        self.signal_all(GroupSignal::Terminate);
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(exits) => {
                info!(stream_id = %self.stream_id, "Encoder processes terminated");
                exits
            }
            Err(_) => {
                warn!(
                    stream_id = %self.stream_id,
                    grace_ms = grace.as_millis() as u64,
                    "Encoder processes ignored SIGTERM, killing"
                );
                self.kill().await
            }
        }
    }

    /// Kill every member group immediately and reap them.
    pub async fn kill(&mut self) -> Vec<MemberExit> {
        self.signal_all(GroupSignal::Kill);
        self.wait().await
    }

    fn signal_all(&mut self, signal: GroupSignal) {
        for member in self.members.iter_mut().filter(|m| m.exit.is_none()) {
            let Some(pid) = member.pid else {
                continue;
            };
            if let Err(e) = process_utils::signal_group(pid, signal) {
                debug!(
                    stream_id = %self.stream_id,
                    member = %member.label,
                    error = %e,
                    "Group signal failed, killing the process directly"
                );
                let _ = member.child.start_kill();
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
    }
}

/// Forward a member's stderr to the log, keeping a short tail.
fn forward_stderr(
    stream_id: String,
    label: String,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if line.to_ascii_lowercase().contains("error") {
                        warn!(target: "rust_restream::encoder", stream_id = %stream_id, member = %label, "{}", line);
                    } else {
                        debug!(target: "rust_restream::encoder", stream_id = %stream_id, member = %label, "{}", line);
                    }
                    let mut tail = tail.lock();
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(stream_id = %stream_id, member = %label, error = %e, "Stopped reading encoder output");
                    break;
                }
            }
        }
    })
}
