use std::thread;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::trace;

/// A computation running on a worker thread whose result is picked up by the
/// UI on a later frame.
pub struct BackgroundTask<T> {
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Default for BackgroundTask<T> {
    fn default() -> Self {
        Self { rx: None }
    }
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Starts `work` on a new thread, replacing any task already running. The
    /// UI is repainted once the work is done.
    pub fn spawn(&mut self, ctx: &egui::Context, work: impl FnOnce() -> T + Send + 'static) {
        let (tx, rx) = oneshot::channel();
        self.rx = Some(rx);
        let ctx = ctx.clone();
        thread::spawn(move || {
            let result = work();
            trace!("background task complete; sending result to the UI");
            let _ = tx.send(result);
            ctx.request_repaint();
        });
    }

    pub fn is_running(&self) -> bool {
        self.rx.is_some()
    }

    /// Takes the result if the task has finished.
    pub fn poll(&mut self) -> Option<T> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                // the worker panicked before sending
                self.rx = None;
                None
            }
        }
    }
}
