//! A lightweight, browser-less renderer that fetches the served HTML.
//!
//! This renderer performs an HTTP GET and keeps the response body as the
//! page content. Scripts are not executed, so pages that build their DOM on
//! the client should go through the `cdp` renderer instead.

use crate::{Error, RenderConfig, Renderer, Result};
use log::debug;
use reqwest::blocking::Client;
use std::time::Duration;

/// Renderer backed by a blocking `reqwest` client
pub struct HttpRenderer {
    client: Client,
    config: RenderConfig,
    last_html: Option<String>,
    last_url: Option<String>,
}

impl HttpRenderer {
    fn load_error(&self, url: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.timeout_ms)
        } else {
            Error::LoadError(format!("HTTP GET {} failed: {}", url, err))
        }
    }
}

impl Renderer for HttpRenderer {
    fn new(config: RenderConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                Error::InitializationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            last_html: None,
            last_url: None,
        })
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone());
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let res = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.load_error(url, e))?;
        let final_url = res.url().to_string();

        let body = res
            .text()
            .map_err(|e| Error::LoadError(format!("Failed to read response body: {}", e)))?;

        debug!("fetched {} bytes from {}", body.len(), final_url);
        self.last_html = Some(body);
        self.last_url = Some(final_url);
        Ok(())
    }

    fn content(&self) -> Result<String> {
        self.last_html
            .clone()
            .ok_or_else(|| Error::RenderError("No document loaded".into()))
    }

    fn current_url(&self) -> Option<String> {
        self.last_url.clone()
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_once(status: u16, body: &'static str) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();

        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });

        format!("http://{}/page", addr)
    }

    #[test]
    fn test_http_renderer_fetches_html() {
        let url = serve_once(
            200,
            "<html><head><title>Hi</title></head><body>Hello world</body></html>",
        );
        let mut renderer =
            HttpRenderer::new(RenderConfig::default()).expect("Failed to create HttpRenderer");
        assert!(renderer.content().is_err());

        renderer.load_url(&url).expect("Failed to load URL");
        let html = renderer.content().expect("Failed to read content");
        assert!(html.contains("<title>Hi</title>"));
        assert_eq!(renderer.current_url().as_deref(), Some(url.as_str()));
        renderer.close().unwrap();
    }

    #[test]
    fn test_http_error_status_is_a_load_error() {
        let url = serve_once(404, "Not Found");
        let mut renderer = HttpRenderer::new(RenderConfig::default()).unwrap();
        match renderer.load_url(&url) {
            Err(Error::LoadError(msg)) => assert!(msg.contains("404"), "{}", msg),
            other => panic!("expected a load error, got {:?}", other),
        }
    }
}
