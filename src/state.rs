use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::process::Supervisor;
use crate::tasks::types::TaskConfig;

#[derive(Debug)]
pub enum Command {
    Create(TaskConfig),
    Start(String),
    Stop(String),
    Remove(String),
    List,
    StartAll,
    StopAll,
}

/// Handle the front-end holds. Every call is fire-and-forget; results come
/// back through the supervisor's notification sink.
#[derive(Clone)]
pub struct AppState {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: mpsc::Sender<()>,
}

impl AppState {
    /// Moves `supervisor` onto its own owner task.
    pub fn spawn(supervisor: Supervisor, grace: Duration) -> (Self, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let owner = tokio::spawn(run_owner(supervisor, command_rx, shutdown_rx, grace));
        (Self { commands, shutdown }, owner)
    }

    pub fn create_task(&self, config: TaskConfig) {
        self.send(Command::Create(config));
    }

    pub fn start_task(&self, id: impl Into<String>) {
        self.send(Command::Start(id.into()));
    }

    pub fn stop_task(&self, id: impl Into<String>) {
        self.send(Command::Stop(id.into()));
    }

    pub fn remove_task(&self, id: impl Into<String>) {
        self.send(Command::Remove(id.into()));
    }

    pub fn list_tasks(&self) {
        self.send(Command::List);
    }

    pub fn start_all(&self) {
        self.send(Command::StartAll);
    }

    pub fn stop_all(&self) {
        self.send(Command::StopAll);
    }

    /// Asks the owner to terminate every child and stop. Await the owner's
    /// `JoinHandle` to know when it is done.
    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!("supervisor is gone, dropping {:?}", e.0);
        }
    }
}

async fn run_owner(
    mut supervisor: Supervisor,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: mpsc::Receiver<()>,
    grace: Duration,
) {
    supervisor.list_tasks();
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut supervisor, command),
                None => break,
            },
            _ = shutdown.recv() => break,
            Some(event) = supervisor.next_child_event() => supervisor.handle_child_event(event),
        }
    }

    info!("supervisor shutting down");
    supervisor.shutdown(grace).await;
}

fn dispatch(supervisor: &mut Supervisor, command: Command) {
    debug!(?command, "command");
    match command {
        Command::Create(config) => {
            supervisor.create_task(config);
        }
        Command::Start(id) => supervisor.start_task(&id),
        Command::Stop(id) => supervisor.stop_task(&id),
        Command::Remove(id) => supervisor.remove_task(&id),
        Command::List => supervisor.list_tasks(),
        Command::StartAll => supervisor.start_all(),
        Command::StopAll => supervisor.stop_all(),
    }
}
