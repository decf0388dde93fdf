// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An Instance wraps one subprocess (§4.4): stdin/stdout/stderr piped,
//! reader tasks draining stdout+stderr and publishing chunks to the Router
//! under the instance's session-id, one dedicated reaper task awaiting exit.
//!
//! Grounded on the teacher's coop-spawn idiom (command construction, piped
//! stdio, a reaper task that logs the exit status instead of leaking a
//! zombie) but without coop's readiness handshake: nothing in this
//! specification defines a health probe for the wrapped command, so an
//! Instance is `idle` the moment its process is spawned.

use crate::credential::CredentialStore;
use crate::error::DaemonError;
use crate::router::Publisher;
use clud_core::{InstanceState, SessionId};
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{watch, Mutex as AsyncMutex};

/// The fixed command line every Instance launches (§4.4: "the command line
/// is fixed by configuration at pool construction and parameterised
/// per-instance only by working-directory and environment").
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub struct Instance {
    session_id: SessionId,
    created_at: u64,
    last_used_at: Mutex<u64>,
    state: Mutex<InstanceState>,
    pid: i32,
    stdin: AsyncMutex<Option<ChildStdin>>,
    exit_code: watch::Receiver<Option<i32>>,
}

impl Instance {
    /// Spawn a subprocess for `session_id`, wire its stdout/stderr into
    /// `publisher`, and return the running Instance. `credentials` is
    /// consulted once, at spawn time, to resolve a token for the subprocess
    /// environment (§4.4.1).
    pub async fn spawn(
        session_id: SessionId,
        command: &AgentCommand,
        cwd: &Path,
        credentials: &dyn CredentialStore,
        publisher: Publisher,
        now: u64,
    ) -> Result<Arc<Instance>, DaemonError> {
        tokio::fs::create_dir_all(cwd).await.map_err(DaemonError::Io)?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(token) = credentials.get("clud-agent", session_id.as_str()) {
            cmd.env("CLUD_AGENT_TOKEN", token);
        }

        let mut child = cmd.spawn().map_err(DaemonError::Io)?;
        let pid = child
            .id()
            .ok_or_else(|| DaemonError::internal("spawned instance process has no pid"))?
            as i32;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| DaemonError::internal("missing stdout pipe"))?;
        let stderr = child.stderr.take().ok_or_else(|| DaemonError::internal("missing stderr pipe"))?;

        let (exit_tx, exit_rx) = watch::channel(None);

        spawn_reader(stdout, publisher.clone());
        spawn_reader(stderr, publisher.clone());

        let reaper_session = session_id.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    tracing::info!(session_id = %reaper_session, exit_status = %status, "instance process exited");
                    status.code().unwrap_or(-1)
                }
                Err(e) => {
                    tracing::error!(session_id = %reaper_session, error = %e, "failed to wait on instance process");
                    -1
                }
            };
            let _ = exit_tx.send(Some(code));
            publisher.end_of_stream();
        });

        tracing::info!(session_id = %session_id, pid, program = %command.program, "instance spawned");

        Ok(Arc::new(Instance {
            session_id,
            created_at: now,
            last_used_at: Mutex::new(now),
            state: Mutex::new(InstanceState::Idle),
            pid,
            stdin: AsyncMutex::new(stdin),
            exit_code: exit_rx,
        }))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_used_at(&self) -> u64 {
        *self.last_used_at.lock()
    }

    pub fn touch(&self, now: u64) {
        *self.last_used_at.lock() = now;
    }

    /// Current state, refreshed against the exit watch so a subprocess that
    /// crashed between calls is observed as `gone` without a separate poll.
    pub fn state(&self) -> InstanceState {
        if self.exit_code.borrow().is_some() {
            *self.state.lock() = InstanceState::Gone;
        }
        *self.state.lock()
    }

    pub fn mark_idle(&self, now: u64) {
        if self.state() != InstanceState::Gone {
            *self.state.lock() = InstanceState::Idle;
        }
        self.touch(now);
    }

    /// Writes `text` followed by a newline to stdin and marks the instance
    /// busy. Fails with `InstanceGone` if the subprocess already exited.
    /// Serialized by the stdin lock: at most one outstanding write per
    /// Instance (§3's Instance invariant).
    pub async fn send(&self, text: &str) -> Result<(), DaemonError> {
        if self.state() == InstanceState::Gone {
            return Err(DaemonError::InstanceGone(self.session_id.to_string()));
        }
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| DaemonError::InstanceGone(self.session_id.to_string()))?;

        *self.state.lock() = InstanceState::Busy;
        let mut line = text.to_string();
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            *self.state.lock() = InstanceState::Gone;
            return Err(DaemonError::Io(e));
        }
        Ok(())
    }

    /// Close stdin, wait up to `grace` for exit, SIGTERM, wait another
    /// `grace`, then SIGKILL (§4.4).
    pub async fn terminate(&self, grace: Duration) {
        *self.state.lock() = InstanceState::Terminating;
        {
            let mut guard = self.stdin.lock().await;
            *guard = None;
        }

        if self.wait_timeout(grace).await {
            return;
        }
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(self.pid), nix::sys::signal::Signal::SIGTERM);

        if self.wait_timeout(grace).await {
            return;
        }
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(self.pid), nix::sys::signal::Signal::SIGKILL);
        let _ = self.wait().await;
    }

    /// Block until the subprocess exits; returns its exit code (`-1` if it
    /// could not be determined).
    pub async fn wait(&self) -> i32 {
        let mut rx = self.exit_code.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return code;
            }
            if rx.changed().await.is_err() {
                return -1;
            }
        }
    }

    async fn wait_timeout(&self, dur: Duration) -> bool {
        if self.exit_code.borrow().is_some() {
            return true;
        }
        let mut rx = self.exit_code.clone();
        tokio::time::timeout(dur, rx.changed()).await.is_ok()
    }
}

fn spawn_reader<R>(mut reader: R, publisher: Publisher)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => publisher.publish(buf[..n].to_vec()),
                Err(e) => {
                    tracing::warn!(error = %e, "instance reader task stopped early");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::NullCredentialStore;
    use crate::router::Router;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[tokio::test]
    async fn send_and_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let publisher = router.publisher(sid("s1"));
        let command = AgentCommand { program: "cat".into(), args: vec![] };
        let instance =
            Instance::spawn(sid("s1"), &command, dir.path(), &NullCredentialStore, publisher, 100)
                .await
                .unwrap();

        let (_snapshot, mut rx) = router.subscribe(&sid("s1"));
        instance.send("hello").await.unwrap();

        let mut received = Vec::new();
        while received.len() < 6 {
            if let crate::router::Frame::Chunk(chunk) =
                tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
            {
                received.extend_from_slice(&chunk);
            }
        }
        assert_eq!(received, b"hello\n");
    }

    #[tokio::test]
    async fn terminate_closes_stdin_and_the_process_exits() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let publisher = router.publisher(sid("s2"));
        let command = AgentCommand { program: "cat".into(), args: vec![] };
        let instance =
            Instance::spawn(sid("s2"), &command, dir.path(), &NullCredentialStore, publisher, 100)
                .await
                .unwrap();

        instance.terminate(Duration::from_secs(2)).await;
        assert_eq!(instance.state(), InstanceState::Gone);
    }

    #[tokio::test]
    async fn send_after_exit_fails_with_instance_gone() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(4096, 16);
        let publisher = router.publisher(sid("s3"));
        let command = AgentCommand { program: "true".into(), args: vec![] };
        let instance =
            Instance::spawn(sid("s3"), &command, dir.path(), &NullCredentialStore, publisher, 100)
                .await
                .unwrap();

        instance.wait().await;
        let err = instance.send("hi").await.unwrap_err();
        assert!(matches!(err, DaemonError::InstanceGone(_)));
    }
}
