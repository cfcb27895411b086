use crate::view::{ScriptRequest, SnapshotRegion, WebView};
use crate::{Error, Result, ScriptResult, Viewport};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Eval(ScriptRequest, oneshot::Sender<Result<ScriptResult>>),
    Snapshot(SnapshotRegion, f32, oneshot::Sender<Result<Vec<u8>>>),
    Metrics(oneshot::Sender<(Viewport, f32)>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly handle to a browser view owned by a dedicated worker thread.
///
/// The worker thread owns the (possibly `!Send`) view and executes commands
/// sent from async tasks one at a time, so every call here is a suspension
/// point and the view never sees two requests at once.
#[derive(Clone)]
pub struct ViewHandle {
    cmd_tx: Sender<Command>,
}

impl ViewHandle {
    /// Spawn a worker thread and build the view on it with `factory`.
    pub async fn spawn<V, F>(factory: F) -> Result<Self>
    where
        V: WebView + 'static,
        F: FnOnce() -> Result<V> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            // Initialize the view on the worker thread
            let mut view = match factory() {
                Ok(v) => v,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Eval(request, resp) => {
                        let _ = resp.send(view.evaluate(&request));
                    }
                    Command::Snapshot(region, ratio, resp) => {
                        let _ = resp.send(view.snapshot(region, ratio));
                    }
                    Command::Metrics(resp) => {
                        let _ = resp.send((view.viewport(), view.device_pixel_ratio()));
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(view.close());
                        return;
                    }
                }
            }
            log::debug!("view worker exiting: all handles dropped");
        });

        // Wait for the worker to report initialization success or failure
        let init_res = init_rx
            .await
            .map_err(|e| Error::ViewClosed(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::ViewClosed("worker is not running".into()))
    }

    /// Evaluate a script request in the page
    pub async fn evaluate(&self, request: ScriptRequest) -> Result<ScriptResult> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Eval(request, tx))?;
        rx.await
            .map_err(|e| Error::ViewClosed(format!("Eval canceled: {}", e)))?
    }

    /// Snapshot a region of the surface as PNG bytes
    pub async fn snapshot(&self, region: SnapshotRegion, pixel_ratio: f32) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(region, pixel_ratio, tx))?;
        rx.await
            .map_err(|e| Error::ViewClosed(format!("Snapshot canceled: {}", e)))?
    }

    /// Visible viewport and device pixel ratio reported by the view
    pub async fn metrics(&self) -> Result<(Viewport, f32)> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Metrics(tx))?;
        rx.await
            .map_err(|e| Error::ViewClosed(format!("Metrics canceled: {}", e)))
    }

    /// Shut down the worker and close the view.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::ViewClosed(format!("Close canceled: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ScriptedView;

    #[tokio::test]
    async fn handle_forwards_requests_to_worker() {
        let view = ScriptedView::new(375, 1200).with_pixel_ratio(2.0);
        let journal = view.journal();
        let handle = ViewHandle::spawn(move || Ok(view)).await.unwrap();

        assert!(handle.evaluate(ScriptRequest::ElementExists).await.unwrap().as_bool());
        handle.evaluate(ScriptRequest::ScrollTo(800)).await.unwrap();
        let (viewport, ratio) = handle.metrics().await.unwrap();
        assert_eq!(viewport.height, 800);
        assert_eq!(ratio, 2.0);
        assert_eq!(journal.scrolls(), vec![800]);

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn init_failure_is_reported() {
        let res = ViewHandle::spawn(|| -> Result<ScriptedView> {
            Err(Error::ConfigError("no browser".into()))
        })
        .await;
        assert!(matches!(res, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn calls_after_close_fail_with_view_closed() {
        let handle = ViewHandle::spawn(|| Ok(ScriptedView::new(10, 10))).await.unwrap();
        let other = handle.clone();
        handle.close().await.unwrap();
        let res = other.evaluate(ScriptRequest::ElementExists).await;
        assert!(matches!(res, Err(Error::ViewClosed(_))));
    }
}
