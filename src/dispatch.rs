use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Hands closures to the UI context. Cheap to clone.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<UiTask>,
}

/// The UI context: runs dispatched closures one at a time, in order.
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<UiTask>,
}

pub fn ui_channel() -> (UiDispatcher, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiDispatcher { tx }, UiLoop { rx })
}

impl UiDispatcher {
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(task)).is_err() {
            warn!("UI loop has stopped, dropping callback");
        }
    }
}

impl UiLoop {
    pub async fn run(mut self) {
        debug!("UI loop started");
        while let Some(task) = self.rx.recv().await {
            task();
        }
        debug!("UI loop stopped");
    }

    /// Runs every task queued so far without waiting. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }
}
