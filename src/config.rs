//! Configuration for renderers and the conversion pipeline

use std::collections::HashMap;
use std::path::PathBuf;

/// File the raw rendered DOM is written to
pub const ORIGINAL_HTML_FILE_NAME: &str = "original.html";
/// File the converted AMP document is written to
pub const MODIFIED_HTML_FILE_NAME: &str = "modified.html";
/// Stylesheet inlined into the `amp-custom` block
pub const INLINE_CSS_FILE_NAME: &str = "inline.css";

/// Configuration used when creating a `Renderer`
///
/// The defaults are conservative: a 30 second page load timeout and a
/// Chrome-compatible user agent so servers hand out the same markup a real
/// browser would get.
///
/// # Examples
///
/// ```
/// let cfg = ampify::RenderConfig::default();
/// assert!(cfg.user_agent.contains("ampify"));
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Viewport dimensions (used by the CDP backend)
    pub viewport: Viewport,
    /// Timeout for page loads in milliseconds
    pub timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 ampify/0.1".to_string(),
            viewport: Viewport::default(),
            timeout_ms: 30000,
            headers: HashMap::new(),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Which validator checks the pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorKind {
    /// The built-in rule table validator
    Builtin,
    /// An external `amphtml-validator` compatible program
    Command(String),
}

/// Configuration for a full conversion run
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Directory `original.html` and `modified.html` are written to
    pub out_dir: PathBuf,
    /// File name of the raw rendered DOM inside `out_dir`
    pub original_file: String,
    /// File name of the converted document inside `out_dir`
    pub modified_file: String,
    /// Stylesheet to inline
    pub css_path: PathBuf,
    /// Tag that replaces disallowed custom tags
    pub replacement_tag: String,
    /// Optional JSON report of the input page validation
    pub report_path: Option<PathBuf>,
    /// Validate the converted document after writing it
    pub verify_output: bool,
    /// Validator used for both passes
    pub validator: ValidatorKind,
    /// Renderer settings
    pub render: RenderConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            original_file: ORIGINAL_HTML_FILE_NAME.to_string(),
            modified_file: MODIFIED_HTML_FILE_NAME.to_string(),
            css_path: PathBuf::from(INLINE_CSS_FILE_NAME),
            replacement_tag: "div".to_string(),
            report_path: None,
            verify_output: true,
            validator: ValidatorKind::Builtin,
            render: RenderConfig::default(),
        }
    }
}

impl ConvertConfig {
    pub fn original_path(&self) -> PathBuf {
        self.out_dir.join(&self.original_file)
    }

    pub fn modified_path(&self) -> PathBuf {
        self.out_dir.join(&self.modified_file)
    }

    /// Reject settings that would produce a broken document
    pub fn check(&self) -> crate::Result<()> {
        let tag = &self.replacement_tag;
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(crate::Error::ConfigError(format!(
                "replacement tag '{}' is not a valid tag name",
                tag
            )));
        }
        if self.original_file == self.modified_file {
            return Err(crate::Error::ConfigError(
                "original and modified output files must differ".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConvertConfig::default();
        assert_eq!(config.original_path(), PathBuf::from("./original.html"));
        assert_eq!(config.modified_path(), PathBuf::from("./modified.html"));
        assert_eq!(config.css_path, PathBuf::from("inline.css"));
        assert_eq!(config.replacement_tag, "div");
        assert_eq!(config.render.viewport.width, 1280);
        assert!(config.check().is_ok());
    }

    #[test]
    fn rejects_bad_replacement_tag() {
        let config = ConvertConfig {
            replacement_tag: "di v".into(),
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn rejects_same_output_files() {
        let config = ConvertConfig {
            modified_file: ORIGINAL_HTML_FILE_NAME.into(),
            ..Default::default()
        };
        assert!(config.check().is_err());
    }
}
