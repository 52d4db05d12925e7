//! Chrome DevTools Protocol renderer implementation

use crate::{Error, RenderConfig, Renderer, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Time given to late scripts after the load event before the DOM is read
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// CDP-based renderer (uses the `headless_chrome` crate)
///
/// This adapter launches a headless Chrome instance, manages a single tab,
/// and serializes the DOM after navigation so client-rendered markup ends up
/// in the converted page.
pub struct CdpRenderer {
    browser: Browser,
    tab: Arc<Tab>,
    loaded: bool,
}

impl Renderer for CdpRenderer {
    fn new(config: RenderConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .build()
            .map_err(|e| {
                Error::InitializationError(format!("Failed to build launch options: {}", e))
            })?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;

        if !config.headers.is_empty() {
            // headless_chrome expects a HashMap<&str, &str>
            let headers: std::collections::HashMap<&str, &str> = config
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();

            tab.set_extra_http_headers(headers)
                .map_err(|e| Error::InitializationError(format!("Failed to set headers: {}", e)))?;
        }

        Ok(Self {
            browser,
            tab,
            loaded: false,
        })
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        std::thread::sleep(SETTLE_DELAY);
        debug!("navigated to {}", self.tab.get_url());

        self.loaded = true;
        Ok(())
    }

    fn content(&self) -> Result<String> {
        if !self.loaded {
            return Err(Error::RenderError("No document loaded".into()));
        }
        Ok(self.tab.get_content()?)
    }

    fn current_url(&self) -> Option<String> {
        self.loaded.then(|| self.tab.get_url())
    }

    fn close(self) -> Result<()> {
        // Drop the tab before the browser so the child process exits promptly
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}
