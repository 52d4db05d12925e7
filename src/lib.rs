//! Ampify
//!
//! Converts a rendered web page into an AMP document: the page is rendered,
//! validated against the AMP rules, stripped of disallowed markup, its URLs
//! are made absolute and the AMP boilerplate plus a custom stylesheet are
//! inlined.
//!
//! # Features
//!
//! - **HTTP Backend** (default): Fetches the served markup with `reqwest`
//! - **CDP Backend**: Serializes the live DOM of a headless Chrome tab
//! - **Swappable validators**: built-in rule tables or an external
//!   `amphtml-validator` process
//!
//! # Example
//!
//! ```no_run
//! use ampify::{Console, ConvertConfig, Converter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let console = Console::stdout("Main");
//! let converter = Converter::new(ConvertConfig::default(), console)?;
//! let conversion = converter.run("https://example.com").await?;
//! println!("AMP page written to {}", conversion.modified_path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{ConvertConfig, RenderConfig, ValidatorKind, Viewport};

pub mod console;
pub use console::Console;

pub mod markup;
pub mod rules;
pub mod transform;
pub mod validator;
pub use validator::{RuleValidator, ValidationError, ValidationReport, Validator};

// Plain HTTP renderer (no JavaScript)
#[cfg(feature = "http")]
pub mod http;

// Headless Chrome renderer
#[cfg(feature = "cdp")]
pub mod cdp;

// Async facade over a renderer living on a worker thread
pub mod async_api;
pub use async_api::{RenderWorker, RenderedPage};

pub mod pipeline;
pub use pipeline::{Conversion, Converter};

/// Core trait for page renderers
///
/// A renderer loads one page at a time and hands out its serialized DOM.
pub trait Renderer {
    /// Create a new renderer with the given configuration
    fn new(config: RenderConfig) -> Result<Self>
    where
        Self: Sized;

    /// Load a URL and wait for the page to be ready
    fn load_url(&mut self, url: &str) -> Result<()>;

    /// Serialized HTML of the current page
    fn content(&self) -> Result<String>;

    /// URL of the current page after redirects, if one is loaded
    fn current_url(&self) -> Option<String>;

    /// Close the renderer and clean up resources
    fn close(self) -> Result<()>;
}

/// Create a renderer with the preferred backend
///
/// This prefers the CDP backend when the `cdp` feature is enabled since it
/// sees the DOM after scripts ran. Otherwise the HTTP backend is used.
#[cfg(feature = "cdp")]
pub fn new_renderer(config: RenderConfig) -> Result<impl Renderer> {
    cdp::CdpRenderer::new(config)
}

#[cfg(all(not(feature = "cdp"), feature = "http"))]
pub fn new_renderer(config: RenderConfig) -> Result<impl Renderer> {
    http::HttpRenderer::new(config)
}

#[cfg(all(not(feature = "cdp"), not(feature = "http")))]
compile_error!("ampify needs the `http` or the `cdp` feature to render pages");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_config() {
        let config = RenderConfig::default();
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.timeout_ms, 30000);
    }

    #[test]
    fn test_viewport() {
        let viewport = Viewport {
            width: 1920,
            height: 1080,
        };
        assert_eq!(viewport.width, 1920);
        assert_eq!(viewport.height, 1080);
    }
}
