use crate::{new_renderer, Error, RenderConfig, Renderer, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Render(String, oneshot::Sender<Result<RenderedPage>>),
    Close(oneshot::Sender<Result<()>>),
}

/// Serialized page as returned by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Final URL of the page after redirects
    pub url: String,
    pub html: String,
}

/// An async-friendly renderer handle backed by a dedicated worker thread.
///
/// The worker thread owns a synchronous [`Renderer`] and executes commands
/// sent from async tasks, so callers get an async interface without the
/// renderer having to be `Send`.
#[derive(Clone)]
pub struct RenderWorker {
    cmd_tx: Sender<Command>,
}

impl RenderWorker {
    /// Spawn a worker around the default renderer backend.
    pub async fn new(config: RenderConfig) -> Result<Self> {
        Self::spawn(move || new_renderer(config)).await
    }

    /// Spawn a worker around the renderer built by `make`.
    ///
    /// `make` runs on the worker thread, so the renderer itself never crosses
    /// threads.
    pub async fn spawn<R, F>(make: F) -> Result<Self>
    where
        R: Renderer + 'static,
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            let mut renderer = match make() {
                Ok(r) => r,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Render(url, resp) => {
                        let res = render_page(&mut renderer, &url);
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let res = renderer.close();
                        let _ = resp.send(res);
                        break;
                    }
                }
            }
        });

        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    /// Load `url` and return its serialized HTML.
    pub async fn render(&self, url: &str) -> Result<RenderedPage> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Render(url.to_string(), tx))
            .map_err(|_| Error::Other("Render worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Shutdown the background worker and close the renderer.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

fn render_page<R: Renderer>(renderer: &mut R, url: &str) -> Result<RenderedPage> {
    renderer.load_url(url)?;
    let html = renderer.content()?;
    let url = renderer.current_url().unwrap_or_else(|| url.to_string());
    Ok(RenderedPage { url, html })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    /// Serves canned markup; the `Rc` keeps it `!Send` like a real browser handle.
    struct FakeRenderer {
        page: Option<String>,
        _not_send: Rc<()>,
    }

    impl Renderer for FakeRenderer {
        fn new(_config: RenderConfig) -> Result<Self> {
            Ok(Self {
                page: None,
                _not_send: Rc::new(()),
            })
        }

        fn load_url(&mut self, url: &str) -> Result<()> {
            if url.contains("missing") {
                return Err(Error::LoadError(format!("404 for {}", url)));
            }
            self.page = Some(url.to_string());
            Ok(())
        }

        fn content(&self) -> Result<String> {
            self.page
                .as_ref()
                .map(|url| format!("<html><body>{}</body></html>", url))
                .ok_or_else(|| Error::RenderError("No document loaded".into()))
        }

        fn current_url(&self) -> Option<String> {
            self.page.as_ref().map(|url| format!("{}?redirected", url))
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_renders_on_its_thread() {
        let worker = RenderWorker::spawn(|| FakeRenderer::new(RenderConfig::default()))
            .await
            .unwrap();

        let page = worker.render("https://example.com/a").await.unwrap();
        assert_eq!(page.url, "https://example.com/a?redirected");
        assert_eq!(page.html, "<html><body>https://example.com/a</body></html>");

        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_reports_load_errors() {
        let worker = RenderWorker::spawn(|| FakeRenderer::new(RenderConfig::default()))
            .await
            .unwrap();

        let err = worker.render("https://example.com/missing").await.unwrap_err();
        assert!(matches!(err, Error::LoadError(_)));

        // The worker keeps serving after a failed load
        assert!(worker.render("https://example.com/ok").await.is_ok());
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_init_failure() {
        let res = RenderWorker::spawn(|| -> Result<FakeRenderer> {
            Err(Error::InitializationError("no browser".into()))
        })
        .await;
        assert!(matches!(res, Err(Error::InitializationError(_))));
    }

    #[tokio::test]
    async fn test_render_after_close_fails() {
        let worker = RenderWorker::spawn(|| FakeRenderer::new(RenderConfig::default()))
            .await
            .unwrap();
        let handle = worker.clone();
        worker.close().await.unwrap();

        assert!(handle.render("https://example.com").await.is_err());
    }
}
