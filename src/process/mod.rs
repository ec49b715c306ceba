//! Owns the proxy child processes and every task status transition.
//!
//! All methods run on a single owner (see [`crate::state`]). Reader and
//! waiter tasks never touch the registry; they report back through
//! [`ChildEvent`]s which the owner feeds to [`Supervisor::handle_child_event`].

pub mod output;
pub mod types;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{LogLevel, Notification, NotificationSink, ProcessInfo, SYSTEM};
use crate::store::TaskStore;
use crate::tasks::args::{self, Launch};
use crate::tasks::types::{Task, TaskConfig, TaskStatus, TaskView};
use crate::tasks::TaskRegistry;
use types::{ChildEvent, OutputStream, ProcessHandle};

/// How long the waiter keeps reading output after the child has exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

pub struct Supervisor {
    registry: TaskRegistry,
    store: TaskStore,
    sink: Arc<dyn NotificationSink>,
    binary: PathBuf,
    events_tx: mpsc::UnboundedSender<ChildEvent>,
    events_rx: mpsc::UnboundedReceiver<ChildEvent>,
    next_run: u64,
}

impl Supervisor {
    /// Builds a supervisor around the tasks found in `store`, all Stopped.
    pub fn new(binary: impl Into<PathBuf>, store: TaskStore, sink: Arc<dyn NotificationSink>) -> Self {
        let registry = TaskRegistry::from_tasks(store.load());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!(tasks = registry.len(), store = %store.path().display(), "supervisor ready");
        Self {
            registry,
            store,
            sink,
            binary: binary.into(),
            events_tx,
            events_rx,
            next_run: 0,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> Vec<TaskView> {
        self.registry.snapshot()
    }

    pub fn live_count(&self) -> usize {
        self.registry.iter().filter(|task| task.process.is_some()).count()
    }

    /// Registers a new task and tries to start it. Returns the new id.
    pub fn create_task(&mut self, config: TaskConfig) -> String {
        let id = Uuid::new_v4().to_string();
        self.registry.insert(Task::new(id.clone(), config));
        self.log(&id, format!("creating task {id}"));

        self.spawn_for(&id);
        self.persist();
        self.emit_task_list();
        id
    }

    pub fn start_task(&mut self, id: &str) {
        let Some(task) = self.registry.get(id) else {
            self.log(id, "task does not exist");
            return;
        };
        if task.is_live() {
            self.log(id, "task is already running");
            return;
        }
        if task.process.is_some() {
            self.log(id, "task is still shutting down, try again shortly");
            return;
        }

        self.log(id, format!("starting task {id}"));
        self.spawn_for(id);
        self.emit_task_list();
    }

    pub fn stop_task(&mut self, id: &str) {
        if self.request_stop(id) {
            self.emit_task_list();
        }
    }

    pub fn remove_task(&mut self, id: &str) {
        let Some(mut task) = self.registry.remove(id) else {
            self.log(id, "task does not exist");
            return;
        };
        if let Some(process) = task.process.as_mut() {
            process.terminate();
        }
        info!(task_id = id, "task removed");

        self.persist();
        self.emit_task_list();
        self.log(id, "task removed");
    }

    pub fn list_tasks(&self) {
        self.emit_task_list();
    }

    /// Starts every task that is not running. Invalid tasks and tasks whose
    /// previous process has not exited yet are reported and skipped.
    pub fn start_all(&mut self) {
        for id in self.registry.ids() {
            let Some(task) = self.registry.get(&id) else {
                continue;
            };
            if task.is_live() {
                continue;
            }
            if task.process.is_some() {
                self.log(&id, "task is still shutting down, try again shortly");
                continue;
            }
            self.log(&id, format!("restarting task {id}"));
            self.spawn_for(&id);
        }
        self.emit_task_list();
    }

    pub fn stop_all(&mut self) {
        self.log(SYSTEM, "stopping all tasks");
        for id in self.registry.ids() {
            self.request_stop_if_live(&id);
        }
        self.emit_task_list();
        self.log(SYSTEM, "all tasks stopped");
    }

    /// Resolves once a child has something to report. Never yields `None`
    /// while the supervisor is alive, since it holds a sender itself.
    pub async fn next_child_event(&mut self) -> Option<ChildEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_child_event(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Output {
                task_id,
                stream,
                line,
            } => {
                if let Some((level, message)) = output::classify(stream, &line) {
                    self.notify_log(&task_id, message, level);
                }
            }
            ChildEvent::Exited { task_id, run, code } => self.on_exit(&task_id, run, code),
        }
    }

    /// Terminates every child and waits up to `grace` for their exits.
    /// Anything still alive afterwards is killed when its waiter is dropped
    /// with the runtime.
    pub async fn shutdown(&mut self, grace: Duration) {
        let mut requested = 0;
        for task in self.registry.values_mut() {
            if let Some(process) = task.process.as_mut() {
                process.terminate();
                requested += 1;
            }
        }
        if requested == 0 {
            return;
        }
        info!(count = requested, "terminating proxy processes");

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        while self.live_count() > 0 {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_child_event(event),
                _ = &mut deadline => {
                    warn!(remaining = self.live_count(), "proxy processes did not exit in time");
                    break;
                }
            }
        }
    }

    /// The one place a process gets started, for every entry point.
    fn spawn_for(&mut self, id: &str) {
        let Some(task) = self.registry.get(id) else {
            return;
        };

        let launch = match args::build(&task.config) {
            Ok(launch) => launch,
            Err(e) => {
                self.fail(id, format!("error: {e}"));
                return;
            }
        };

        self.log(
            id,
            format!("launch command: {} {}", self.binary.display(), launch.args.join(" ")),
        );

        match self.launch(id, &launch) {
            Ok(handle) => {
                let pid = handle.pid;
                if let Some(task) = self.registry.get_mut(id) {
                    task.process = Some(handle);
                    task.status = TaskStatus::Running;
                    task.url = launch.url.clone();
                }
                info!(task_id = id, pid, url = %launch.url, "proxy started");

                self.notify_status(id, TaskStatus::Running);
                self.sink.notify(Notification::TaskInfo {
                    task_id: id.to_string(),
                    info: ProcessInfo {
                        url: launch.url,
                        pid,
                    },
                });
                self.log(id, "task started");
            }
            Err(e) => self.fail(id, format!("error: {e}")),
        }
    }

    fn launch(&mut self, id: &str, launch: &Launch) -> Result<ProcessHandle, AppError> {
        let mut child = Command::new(&self.binary)
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AppError::Spawn)?;

        self.next_run += 1;
        let run = self.next_run;
        let pid = child.id();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, id, OutputStream::Stdout, self.events_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, id, OutputStream::Stderr, self.events_tx.clone()));
        }

        let (terminate_tx, terminate_rx) = oneshot::channel();
        watch_exit(child, id, run, readers, terminate_rx, self.events_tx.clone());

        Ok(ProcessHandle::new(pid, run, terminate_tx))
    }

    fn on_exit(&mut self, id: &str, run: u64, code: Option<i32>) {
        let message = match code {
            Some(code) => format!("process closed, exit code {code}"),
            None => "process closed, terminated by signal".to_string(),
        };
        self.log(id, message);

        let Some(task) = self.registry.get_mut(id) else {
            debug!(task_id = id, run, "exit for removed task");
            return;
        };
        if task.process.as_ref().map(|p| p.run) != Some(run) {
            debug!(task_id = id, run, "exit for a replaced process");
            return;
        }

        task.process = None;
        task.status = TaskStatus::Stopped;
        info!(task_id = id, code, "proxy exited");

        self.notify_status(id, TaskStatus::Stopped);
        self.emit_task_list();
    }

    /// Optimistically marks the task Stopped; the exit event follows later.
    fn request_stop(&mut self, id: &str) -> bool {
        if self.request_stop_if_live(id) {
            return true;
        }
        self.log(id, "task is not running");
        false
    }

    fn request_stop_if_live(&mut self, id: &str) -> bool {
        let Some(task) = self.registry.get_mut(id).filter(|task| task.is_live()) else {
            return false;
        };

        if let Some(process) = task.process.as_mut() {
            process.terminate();
            debug!(task_id = id, pid = process.pid, "termination requested");
        }
        task.status = TaskStatus::Stopped;

        self.log(id, "stopping task");
        self.notify_status(id, TaskStatus::Stopped);
        self.log(id, "task stopped");
        true
    }

    fn fail(&mut self, id: &str, message: String) {
        warn!(task_id = id, "{}", message);
        if let Some(task) = self.registry.get_mut(id) {
            task.status = TaskStatus::FailedToStart;
        }
        self.notify_log(id, message, LogLevel::Error);
        self.notify_status(id, TaskStatus::FailedToStart);
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.registry.stored()) {
            warn!("failed to save tasks: {}", e);
            self.notify_log(SYSTEM, format!("error: failed to save tasks: {e}"), LogLevel::Error);
        }
    }

    fn emit_task_list(&self) {
        self.sink.notify(Notification::TaskList(self.registry.snapshot()));
    }

    fn notify_status(&self, id: &str, status: TaskStatus) {
        self.sink.notify(Notification::TaskStatus {
            task_id: id.to_string(),
            status,
        });
    }

    fn log(&self, id: &str, message: impl Into<String>) {
        self.notify_log(id, message.into(), LogLevel::Info);
    }

    fn notify_log(&self, id: &str, message: String, level: LogLevel) {
        self.sink.notify(Notification::Log {
            task_id: id.to_string(),
            message,
            level,
        });
    }
}

fn forward_lines<R>(
    reader: R,
    id: &str,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<ChildEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let task_id = id.to_string();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    let event = ChildEvent::Output {
                        task_id: task_id.clone(),
                        stream,
                        line,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(task_id = %task_id, ?stream, "output read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Waits for the child, or for a termination request (or the handle being
/// dropped), then reports the exit once the readers are done.
fn watch_exit(
    mut child: Child,
    id: &str,
    run: u64,
    readers: Vec<JoinHandle<()>>,
    terminate_rx: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<ChildEvent>,
) {
    let task_id = id.to_string();
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = terminate_rx => {
                terminate(&mut child);
                child.wait().await
            }
        };

        for reader in readers {
            if tokio::time::timeout(OUTPUT_DRAIN, reader).await.is_err() {
                debug!(task_id = %task_id, "output still open after exit");
            }
        }

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(task_id = %task_id, "failed to wait for proxy process: {}", e);
                None
            }
        };
        let _ = tx.send(ChildEvent::Exited { task_id, run, code });
    });
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        None => debug!("child already reaped"),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("kill failed: {}", e);
    }
}
