use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Messages from a child's reader and waiter tasks back to the owner.
#[derive(Debug)]
pub enum ChildEvent {
    Output {
        task_id: String,
        stream: OutputStream,
        line: String,
    },
    /// Sent exactly once per spawn, after both output streams are drained.
    Exited {
        task_id: String,
        run: u64,
        code: Option<i32>,
    },
}

/// The supervisor's side of a live child. Dropping it also asks the child
/// to terminate.
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub run: u64,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, run: u64, terminate_tx: oneshot::Sender<()>) -> Self {
        Self {
            pid,
            run,
            terminate_tx: Some(terminate_tx),
        }
    }

    /// Requests termination once. Returns false if already requested.
    pub fn terminate(&mut self) -> bool {
        match self.terminate_tx.take() {
            Some(tx) => {
                // The waiter may already be gone if the child exited on its own.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate_tx.is_none()
    }
}
