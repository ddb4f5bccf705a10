// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-service process controller.
//!
//! Each service is driven by one worker task that owns the child process and
//! the service's [`ProcessState`]. Requests reach the worker through a FIFO
//! mailbox and are applied one at a time, so operations on the same service
//! never interleave. The worker also watches the child and records an exit
//! that nobody asked for.

use crate::error::{Result, SupervisorError};
use crate::launcher::{LaunchSettings, build_command};
use crate::mode::Mode;
use crate::registry::ServiceConfig;
use crate::state::ProcessState;
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

/// How long to wait for the process to disappear after SIGKILL.
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start(Mode),
    Stop,
    Restart,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start(mode) => write!(f, "start ({mode})"),
            Operation::Stop => write!(f, "stop"),
            Operation::Restart => write!(f, "restart"),
        }
    }
}

/// Result of an operation that completed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Started { pid: u32 },
    Stopped,
    /// Stop requested while no process was running.
    AlreadyStopped,
    Restarted { pid: u32 },
}

struct Request {
    operation: Operation,
    reply: oneshot::Sender<Result<Outcome>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Handle on a submitted operation. Dropping it does not cancel the operation.
#[derive(Debug)]
pub struct Ticket {
    service: String,
    operation: Operation,
    reply: oneshot::Receiver<Result<Outcome>>,
}

impl Ticket {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Wait for the worker to apply the operation.
    pub async fn outcome(self) -> Result<Outcome> {
        match self.reply.await {
            Ok(result) => result,
            Err(_) => Err(SupervisorError::Unavailable(self.service)),
        }
    }
}

/// Cheap, cloneable front of a service worker.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    name: Arc<str>,
    inbox: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ProcessState>,
}

impl ServiceHandle {
    /// Start the worker task for `config`. Must be called inside a tokio runtime.
    pub fn spawn(config: Arc<ServiceConfig>, settings: Arc<LaunchSettings>) -> Self {
        let (inbox, requests) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ProcessState::default());
        let name: Arc<str> = Arc::from(config.name.as_str());
        let worker = ServiceWorker {
            config,
            settings,
            state: state_tx,
            child: None,
            running_mode: None,
        };
        tokio::spawn(worker.run(requests));
        Self { name, inbox, state }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `operation` behind every operation already submitted for this
    /// service.
    pub fn submit(&self, operation: Operation) -> Ticket {
        let (reply, receiver) = oneshot::channel();
        if self.inbox.send(Request { operation, reply }).is_err() {
            // The reply sender went down with the request, so the ticket
            // resolves to Unavailable.
            warn!(service = %self.name, %operation, "service worker is gone");
        }
        Ticket {
            service: self.name.to_string(),
            operation,
            reply: receiver,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.clone()
    }
}

enum Event {
    Exited(std::io::Result<ExitStatus>),
    Request(Request),
    Closed,
}

struct ServiceWorker {
    config: Arc<ServiceConfig>,
    settings: Arc<LaunchSettings>,
    state: watch::Sender<ProcessState>,
    child: Option<Child>,
    /// Mode the current child was launched in.
    running_mode: Option<Mode>,
}

async fn wait_child(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

impl ServiceWorker {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        loop {
            let event = tokio::select! {
                biased;
                status = wait_child(&mut self.child) => Event::Exited(status),
                request = requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => Event::Closed,
                },
            };

            match event {
                Event::Exited(status) => self.on_exit(status),
                Event::Request(request) => {
                    debug!(service = %self.config.name, operation = %request.operation, "applying");
                    let result = self.apply(request.operation).await;
                    // Receiver may have been dropped (fire-and-forget).
                    let _ = request.reply.send(result);
                }
                Event::Closed => break,
            }
        }

        if let Some(child) = &self.child {
            warn!(
                service = %self.config.name,
                pid = ?child.id(),
                "controller shutting down with process still running"
            );
        }
    }

    async fn apply(&mut self, operation: Operation) -> Result<Outcome> {
        match operation {
            Operation::Start(mode) => self.start(mode),
            Operation::Stop => self.stop().await,
            Operation::Restart => self.restart().await,
        }
    }

    fn transition(&self, f: impl FnOnce(&mut ProcessState) -> Result<()>) -> Result<()> {
        let mut result = Ok(());
        self.state.send_modify(|state| result = f(state));
        result
    }

    fn start(&mut self, mode: Mode) -> Result<Outcome> {
        let status = self.state.borrow().status();
        if status.is_active() {
            let err = SupervisorError::AlreadyActive {
                service: self.config.name.clone(),
                status,
            };
            warn!(service = %self.config.name, %status, "start rejected");
            self.state.send_modify(|state| state.record_error(err.to_string()));
            return Err(err);
        }

        self.transition(|state| state.mark_starting())?;

        let spawned = build_command(&self.config, mode, &self.settings).and_then(|mut cmd| {
            cmd.spawn().map_err(|e| SupervisorError::Spawn {
                service: self.config.name.clone(),
                reason: format!("{}: {e}", self.config.command),
            })
        });

        match spawned {
            Ok(child) => {
                let pid = child.id().unwrap_or(0);
                self.child = Some(child);
                self.running_mode = Some(mode);
                self.transition(|state| state.mark_running(pid, mode))?;
                info!(service = %self.config.name, pid, %mode, command = %self.config.command, "process started");
                Ok(Outcome::Started { pid })
            }
            Err(e) => {
                error!(service = %self.config.name, %mode, "{e}");
                self.transition(|state| state.mark_failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<Outcome> {
        let Some(mut child) = self.child.take() else {
            debug!(service = %self.config.name, "stop requested but nothing is running");
            return Ok(Outcome::AlreadyStopped);
        };
        if let Err(e) = self.transition(|state| state.mark_stopping()) {
            self.child = Some(child);
            return Err(e);
        }

        let mode = self.running_mode.take().unwrap_or(self.config.mode);
        let grace = self.settings.stop_timeout_for(&self.config);
        match terminate(&self.config.name, &mut child, mode, grace).await {
            Ok(status) => {
                info!(service = %self.config.name, %status, "process stopped");
                self.transition(|state| state.mark_stopped())?;
                Ok(Outcome::Stopped)
            }
            Err(e) => {
                error!(service = %self.config.name, "{e}");
                self.transition(|state| state.mark_failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn restart(&mut self) -> Result<Outcome> {
        let mode = self.state.borrow().last_mode().unwrap_or(self.config.mode);
        self.stop().await?;
        match self.start(mode)? {
            Outcome::Started { pid } => Ok(Outcome::Restarted { pid }),
            other => Ok(other),
        }
    }

    fn on_exit(&mut self, status: std::io::Result<ExitStatus>) {
        self.child = None;
        self.running_mode = None;
        let result = match status {
            Ok(status) if status.success() => {
                info!(service = %self.config.name, %status, "process exited");
                self.transition(|state| state.mark_stopped())
            }
            Ok(status) => {
                warn!(service = %self.config.name, %status, "process exited unexpectedly");
                self.transition(|state| state.mark_failed(format!("process exited with {status}")))
            }
            Err(e) => {
                error!(service = %self.config.name, "failed to wait on process: {e}");
                self.transition(|state| state.mark_failed(format!("failed to wait on process: {e}")))
            }
        };
        if let Err(e) = result {
            error!(service = %self.config.name, "{e}");
        }
    }
}

/// SIGTERM, wait `grace`, then SIGKILL. Daemon-mode services get the signal
/// on their whole process group.
async fn terminate(service: &str, child: &mut Child, mode: Mode, grace: Duration) -> Result<ExitStatus> {
    let signal_err = |reason: String| SupervisorError::Signal {
        service: service.to_string(),
        reason,
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;

        if let Some(pid) = child.id() {
            debug!(service, pid, "sending SIGTERM");
            send_signal(pid, mode, Signal::SIGTERM).map_err(&signal_err)?;
            match timeout(grace, child.wait()).await {
                Ok(status) => return status.map_err(|e| signal_err(e.to_string())),
                Err(_) => warn!(
                    service,
                    pid,
                    "stop timeout ({}s) reached, sending SIGKILL",
                    grace.as_secs()
                ),
            }
            send_signal(pid, mode, Signal::SIGKILL).map_err(&signal_err)?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (mode, grace);
        child.start_kill().map_err(|e| signal_err(e.to_string()))?;
    }

    match timeout(KILL_TIMEOUT, child.wait()).await {
        Ok(status) => status.map_err(|e| signal_err(e.to_string())),
        Err(_) => Err(signal_err("still running after SIGKILL".to_string())),
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, mode: Mode, signal: nix::sys::signal::Signal) -> std::result::Result<(), String> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    let sent = match mode {
        Mode::Daemon => killpg(pid, signal),
        Mode::Foreground | Mode::Container => kill(pid, signal),
    };
    match sent {
        // already gone; wait() will reap it
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(format!("failed to send {signal}: {e}")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::state::ProcessStatus;
    use tempfile::TempDir;

    fn handle(dir: &TempDir, command: &str, args: &[&str]) -> ServiceHandle {
        let config = ServiceConfig::new("svc", command, dir.path()).with_args(args.iter().copied());
        handle_for(config)
    }

    fn handle_for(config: ServiceConfig) -> ServiceHandle {
        ServiceHandle::spawn(Arc::new(config), Arc::new(LaunchSettings::default()))
    }

    async fn wait_for_status(handle: &ServiceHandle, status: ProcessStatus) -> ProcessState {
        let mut rx = handle.subscribe();
        let state = timeout(Duration::from_secs(5), rx.wait_for(|s| s.status() == status))
            .await
            .expect("timed out waiting for status")
            .expect("worker gone")
            .clone();
        state
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        assert_eq!(svc.state().status(), ProcessStatus::Stopped);

        let outcome = svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap();
        let Outcome::Started { pid } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        let state = svc.state();
        assert_eq!(state.status(), ProcessStatus::Running);
        assert_eq!(state.pid(), Some(pid));
        assert_eq!(state.last_mode(), Some(Mode::Foreground));

        assert_eq!(svc.submit(Operation::Stop).outcome().await.unwrap(), Outcome::Stopped);
        let state = svc.state();
        assert_eq!(state.status(), ProcessStatus::Stopped);
        assert_eq!(state.pid(), None);
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        svc.submit(Operation::Start(Mode::Daemon)).outcome().await.unwrap();
        let pid = svc.state().pid();

        let err = svc.submit(Operation::Start(Mode::Daemon)).outcome().await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::AlreadyActive { status: ProcessStatus::Running, .. }
        ));
        let state = svc.state();
        assert_eq!(state.status(), ProcessStatus::Running);
        assert_eq!(state.pid(), pid, "no second process spawned");
        assert_eq!(state.last_error(), Some(err.to_string().as_str()));

        svc.submit(Operation::Stop).outcome().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        assert_eq!(
            svc.submit(Operation::Stop).outcome().await.unwrap(),
            Outcome::AlreadyStopped
        );
        assert_eq!(svc.state().status(), ProcessStatus::Stopped);
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/nonexistent/binary", &[]);
        let err = svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }), "{err:?}");

        let state = svc.state();
        assert_eq!(state.status(), ProcessStatus::Failed);
        assert_eq!(state.pid(), None);
        assert!(state.last_error().unwrap().contains("/nonexistent/binary"));

        // Failed is not active, a new start is attempted
        let err = svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_detected() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sh", &["-c", "exit 3"]);
        svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap();

        let state = wait_for_status(&svc, ProcessStatus::Failed).await;
        assert_eq!(state.pid(), None);
        assert!(state.last_error().unwrap().contains('3'), "{state:?}");
    }

    #[tokio::test]
    async fn test_clean_exit_is_stopped() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sh", &["-c", "exit 0"]);
        svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap();
        let state = wait_for_status(&svc, ProcessStatus::Stopped).await;
        assert_eq!(state.last_error(), None);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_sigkill() {
        let dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::new("stubborn", "/bin/sh", dir.path())
            .with_args(["-c", "trap '' TERM; sleep 60"]);
        config.stop_timeout = Some(Duration::from_secs(1));
        let svc = handle_for(config);

        svc.submit(Operation::Start(Mode::Daemon)).outcome().await.unwrap();
        assert_eq!(svc.submit(Operation::Stop).outcome().await.unwrap(), Outcome::Stopped);
        assert_eq!(svc.state().status(), ProcessStatus::Stopped);
    }

    #[tokio::test]
    async fn test_restart_reuses_last_mode() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        let Outcome::Started { pid: first } = svc
            .submit(Operation::Start(Mode::Daemon))
            .outcome()
            .await
            .unwrap()
        else {
            panic!("expected Started");
        };

        let Outcome::Restarted { pid: second } =
            svc.submit(Operation::Restart).outcome().await.unwrap()
        else {
            panic!("expected Restarted");
        };
        assert_ne!(first, second);
        let state = svc.state();
        assert_eq!(state.status(), ProcessStatus::Running);
        assert_eq!(state.last_mode(), Some(Mode::Daemon));

        svc.submit(Operation::Stop).outcome().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_of_stopped_service_starts_it() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        let outcome = svc.submit(Operation::Restart).outcome().await.unwrap();
        assert!(matches!(outcome, Outcome::Restarted { .. }));
        assert_eq!(svc.state().last_mode(), Some(Mode::Foreground));
        svc.submit(Operation::Stop).outcome().await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_apply_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        let t1 = svc.submit(Operation::Start(Mode::Foreground));
        let t2 = svc.submit(Operation::Stop);
        let t3 = svc.submit(Operation::Start(Mode::Foreground));
        let t4 = svc.submit(Operation::Stop);

        assert!(matches!(t1.outcome().await.unwrap(), Outcome::Started { .. }));
        assert_eq!(t2.outcome().await.unwrap(), Outcome::Stopped);
        assert!(matches!(t3.outcome().await.unwrap(), Outcome::Started { .. }));
        assert_eq!(t4.outcome().await.unwrap(), Outcome::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_ticket_still_applies() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sleep", &["60"]);
        drop(svc.submit(Operation::Start(Mode::Foreground)));
        assert_eq!(svc.submit(Operation::Stop).outcome().await.unwrap(), Outcome::Stopped);
    }

    #[tokio::test]
    async fn test_output_lands_in_service_log() {
        let dir = TempDir::new().unwrap();
        let svc = handle(&dir, "/bin/sh", &["-c", "echo hello from svc"]);
        svc.submit(Operation::Start(Mode::Foreground)).outcome().await.unwrap();
        wait_for_status(&svc, ProcessStatus::Stopped).await;
        let log = std::fs::read_to_string(dir.path().join("svc.log")).unwrap();
        assert!(log.contains("hello from svc"));
    }
}
