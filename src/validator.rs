//! AMP validation.
//!
//! A `Validator` turns a document into a `ValidationReport`: a flat list of
//! findings with a line, a column and a human readable message. The message
//! wording follows the official AMP validator, since the transform step
//! decides what to strip by pattern-matching these messages.

use crate::markup::{LineIndex, Scanner, Tag};
use crate::rules::{
    self, AMP_CDN, AMP_RUNTIME_SRC, HTML_TAGS_SPEC_URL, REQUIRED_MARKUP_SPEC_URL,
};
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    #[serde(other)]
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

/// One validator finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub severity: Severity,
    pub line: usize,
    pub col: usize,
    pub message: String,
    #[serde(rename = "specUrl", default)]
    pub spec_url: Option<String>,
}

impl ValidationError {
    pub fn error(line: usize, col: usize, message: impl Into<String>, spec_url: &str) -> Self {
        Self {
            severity: Severity::Error,
            line,
            col,
            message: message.into(),
            spec_url: Some(spec_url.to_string()),
        }
    }

    /// `line L, col C: MESSAGE`
    pub fn summary(&self) -> String {
        format!("line {}, col {}: {}", self.line, self.col, self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        if let Some(url) = &self.spec_url {
            write!(f, " (see {})", url)?;
        }
        Ok(())
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: Status,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Build a report; it fails as soon as one finding is an error
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        let status = if errors.iter().any(|e| e.severity == Severity::Error) {
            Status::Fail
        } else {
            Status::Pass
        };
        Self { status, errors }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.len() - self.error_count()
    }

    /// Findings as `line L, col C: MESSAGE` strings
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ValidationError::summary).collect()
    }
}

/// Something that can check a document against the AMP rules
pub trait Validator {
    fn validate(&self, html: &str) -> Result<ValidationReport>;
}

/// Validator backed by the rule tables in [`crate::rules`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleValidator;

impl RuleValidator {
    pub fn new() -> Self {
        RuleValidator
    }
}

impl Validator for RuleValidator {
    fn validate(&self, html: &str) -> Result<ValidationReport> {
        let index = LineIndex::new(html);
        let mut findings = Vec::new();
        let mut required = RequiredMarkup::default();
        let mut noscript_depth = 0usize;
        let mut in_head = false;

        for tag in Scanner::new(html) {
            if tag.closing {
                match tag.name.as_str() {
                    "noscript" => noscript_depth = noscript_depth.saturating_sub(1),
                    "head" => in_head = false,
                    _ => {}
                }
                continue;
            }

            let in_noscript = noscript_depth > 0;
            required.observe(&tag, in_head, in_noscript);

            let (line, col) = index.position(tag.offset);
            for message in check_tag(&tag, in_noscript) {
                findings.push(ValidationError::error(line, col, message, HTML_TAGS_SPEC_URL));
            }

            if !tag.self_closing {
                match tag.name.as_str() {
                    "noscript" => noscript_depth += 1,
                    "head" => in_head = true,
                    _ => {}
                }
            }
        }

        let (line, col) = index.position(required.anchor.unwrap_or(0));
        for message in required.missing() {
            findings.push(ValidationError::error(line, col, message, REQUIRED_MARKUP_SPEC_URL));
        }

        debug!("built-in validator produced {} findings", findings.len());
        Ok(ValidationReport::from_errors(findings))
    }
}

/// Findings for a single start tag
fn check_tag(tag: &Tag<'_>, in_noscript: bool) -> Vec<String> {
    let name = tag.name.as_str();

    if !rules::is_known_tag(name) {
        return vec![format!("The tag '{}' is disallowed.", name)];
    }

    if let Some(alternative) = rules::lookup(name).and_then(|r| r.amp_alternative) {
        if !in_noscript {
            return vec![format!(
                "The tag '{}' may only appear as a descendant of tag 'noscript'. Did you mean '{}'?",
                name, alternative
            )];
        }
    }

    match name {
        "script" if !script_allowed(tag) => {
            return vec!["The tag 'script' is disallowed except in specific forms.".to_string()];
        }
        "style" if !style_allowed(tag) => {
            return vec!["The tag 'style' is disallowed except in specific forms.".to_string()];
        }
        _ => {}
    }

    let mut messages = Vec::new();

    if name == "link" {
        if let Some(rel) = tag.attr_value("rel") {
            let stylesheet = rel
                .split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("stylesheet"));
            let href = tag.attr_value("href").unwrap_or("");
            if stylesheet && !rules::is_font_provider(href) {
                messages.push(format!(
                    "The attribute 'rel' in tag 'link' is set to the invalid value '{}'.",
                    rel
                ));
            }
        }
    }

    for attr in &tag.attributes {
        if !rules::attribute_allowed(name, attr.name) {
            messages.push(format!(
                "The attribute '{}' may not appear in tag '{}'.",
                attr.name.to_ascii_lowercase(),
                name
            ));
        }
    }

    messages
}

/// Runtime and extension scripts from the AMP CDN, or inline JSON
fn script_allowed(tag: &Tag<'_>) -> bool {
    match tag.attr_value("src") {
        Some(src) => src.starts_with(AMP_CDN) && tag.has_attr("async"),
        None => tag.attr_value("type").is_some_and(|t| {
            t.eq_ignore_ascii_case("application/ld+json")
                || t.eq_ignore_ascii_case("application/json")
        }),
    }
}

fn style_allowed(tag: &Tag<'_>) -> bool {
    ["amp-custom", "amp-boilerplate", "amp-keyframes"]
        .iter()
        .any(|a| tag.has_attr(a))
}

/// Markup every AMP document must carry
#[derive(Debug, Default)]
struct RequiredMarkup {
    html_is_amp: bool,
    canonical: bool,
    charset: bool,
    viewport: bool,
    runtime: bool,
    boilerplate: bool,
    noscript_boilerplate: bool,
    /// Where missing-markup findings are reported (the `<head>` tag)
    anchor: Option<usize>,
}

impl RequiredMarkup {
    fn observe(&mut self, tag: &Tag<'_>, in_head: bool, in_noscript: bool) {
        match tag.name.as_str() {
            "html" => self.html_is_amp = tag.has_attr("amp") || tag.has_attr("\u{26a1}"),
            "head" => self.anchor = self.anchor.or(Some(tag.offset)),
            "link" => {
                let rel = tag.attr_value("rel").unwrap_or("");
                if rel
                    .split_ascii_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("canonical"))
                    && tag.has_attr("href")
                {
                    self.canonical = true;
                }
            }
            "meta" => {
                if tag
                    .attr_value("charset")
                    .is_some_and(|c| c.eq_ignore_ascii_case("utf-8"))
                {
                    self.charset = true;
                }
                if tag
                    .attr_value("name")
                    .is_some_and(|n| n.eq_ignore_ascii_case("viewport"))
                {
                    self.viewport = true;
                }
            }
            "script" => {
                if tag.attr_value("src") == Some(AMP_RUNTIME_SRC) && tag.has_attr("async") {
                    self.runtime = true;
                }
            }
            "style" if tag.has_attr("amp-boilerplate") => {
                if in_noscript {
                    self.noscript_boilerplate = true;
                } else if in_head {
                    self.boilerplate = true;
                }
            }
            _ => {}
        }
    }

    fn missing(&self) -> Vec<String> {
        let checks = [
            (self.html_is_amp, "The mandatory attribute '\u{26a1}' is missing in tag 'html'."),
            (self.charset, "The mandatory tag 'meta charset=utf-8' is missing or incorrect."),
            (self.viewport, "The mandatory tag 'meta name=viewport' is missing or incorrect."),
            (self.canonical, "The mandatory tag 'link rel=canonical' is missing or incorrect."),
            (self.runtime, "The mandatory tag 'amphtml engine v0.js script' is missing or incorrect."),
            (self.boilerplate, "The mandatory tag 'head > style[amp-boilerplate]' is missing or incorrect."),
            (self.noscript_boilerplate, "The mandatory tag 'noscript > style[amp-boilerplate]' is missing or incorrect."),
        ];
        checks
            .into_iter()
            .filter(|(present, _)| !present)
            .map(|(_, message)| message.to_string())
            .collect()
    }
}

/// Runs an `amphtml-validator` compatible program.
///
/// The document goes in on stdin (`-`) and a JSON report keyed by input name
/// is expected on stdout.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

#[derive(Deserialize)]
struct CommandOutput {
    #[serde(default)]
    errors: Vec<ValidationError>,
}

impl CommandValidator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["--format=json".to_string(), "-".to_string()],
        }
    }

    /// Replace the default `--format=json -` arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn parse(stdout: &str) -> Result<ValidationReport> {
        let by_input: HashMap<String, CommandOutput> = serde_json::from_str(stdout)
            .map_err(|e| Error::ValidationError(format!("Unreadable validator output: {}", e)))?;
        let errors = by_input.into_values().flat_map(|o| o.errors).collect();
        Ok(ValidationReport::from_errors(errors))
    }
}

impl Validator for CommandValidator {
    fn validate(&self, html: &str) -> Result<ValidationReport> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::InitializationError(format!("Failed to start {}: {}", self.program, e))
            })?;

        // Feed stdin from its own thread so a chatty validator cannot block us
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ValidationError("validator stdin unavailable".into()))?;
        let input = html.as_bytes().to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| Error::ValidationError(format!("Validator did not finish: {}", e)))?;
        if let Ok(Err(e)) = writer.join() {
            debug!("validator closed stdin early: {}", e);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "{} exited with {} and no report: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // A failing document also makes the validator exit non-zero
        Self::parse(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMP_PAGE: &str = r#"<!doctype html>
<html amp lang="en">
<head>
<meta charset="utf-8">
<script async src="https://cdn.ampproject.org/v0.js"></script>
<title>Hello</title>
<link rel="canonical" href="https://example.com/">
<meta name="viewport" content="width=device-width,minimum-scale=1,initial-scale=1">
<style amp-boilerplate>body{visibility:hidden}</style>
<noscript><style amp-boilerplate>body{visibility:visible}</style></noscript>
<style amp-custom>p{color:red}</style>
</head>
<body><p class="x">Hi</p><amp-img src="a.png" width="1" height="1" layout="responsive"></amp-img></body>
</html>"#;

    fn messages(html: &str) -> Vec<String> {
        RuleValidator::new()
            .validate(html)
            .unwrap()
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn valid_document_passes() {
        let report = RuleValidator::new().validate(AMP_PAGE).unwrap();
        assert!(report.passed(), "{:#?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn reports_disallowed_custom_tag_with_position() {
        let html = AMP_PAGE.replace(
            "<p class=\"x\">Hi</p>",
            "<p>Hi</p>\n  <my-widget>x</my-widget>",
        );
        let report = RuleValidator::new().validate(&html).unwrap();
        assert!(!report.passed());
        let finding = report
            .errors
            .iter()
            .find(|e| e.message == "The tag 'my-widget' is disallowed.")
            .expect("custom tag reported");
        assert_eq!(finding.line, 14);
        assert_eq!(finding.col, 2);
    }

    #[test]
    fn reports_disallowed_attributes() {
        let html = AMP_PAGE.replace(
            "<p class=\"x\">",
            "<p class=\"x\" onclick=\"go()\" v-if=\"ok\">",
        );
        let found = messages(&html);
        assert!(found.contains(&"The attribute 'onclick' may not appear in tag 'p'.".to_string()));
        assert!(found.contains(&"The attribute 'v-if' may not appear in tag 'p'.".to_string()));
    }

    #[test]
    fn images_only_inside_noscript() {
        let html = AMP_PAGE.replace(
            "<p class=\"x\">Hi</p>",
            "<img src=a.png><noscript><img src=b.png></noscript>",
        );
        let found = messages(&html);
        let img: Vec<_> = found.iter().filter(|m| m.contains("'img'")).collect();
        assert_eq!(img.len(), 1);
        assert!(img[0].contains("Did you mean 'amp-img'?"));
    }

    #[test]
    fn scripts_and_styles_need_amp_forms() {
        let html = AMP_PAGE.replace(
            "</body>",
            "<script>alert(1)</script><script type=\"application/ld+json\">{}</script><style>p{}</style></body>",
        );
        let found = messages(&html);
        assert_eq!(
            found
                .iter()
                .filter(|m| *m == "The tag 'script' is disallowed except in specific forms.")
                .count(),
            1
        );
        assert!(found
            .contains(&"The tag 'style' is disallowed except in specific forms.".to_string()));
    }

    #[test]
    fn stylesheet_links_only_from_font_providers() {
        let html = AMP_PAGE.replace(
            "<title>",
            "<link rel=\"stylesheet\" href=\"/site.css\"><link rel=\"stylesheet\" href=\"https://fonts.googleapis.com/css?family=Roboto\"><title>",
        );
        let found = messages(&html);
        assert_eq!(
            found,
            vec!["The attribute 'rel' in tag 'link' is set to the invalid value 'stylesheet'.".to_string()]
        );
    }

    #[test]
    fn plain_html_misses_required_markup() {
        let found = messages("<html><head><title>x</title></head><body></body></html>");
        assert!(found.iter().any(|m| m.contains("mandatory attribute")));
        assert!(found.iter().any(|m| m.contains("'link rel=canonical'")));
        assert!(found.iter().any(|m| m.contains("v0.js")));
        assert!(found.iter().any(|m| m.contains("noscript > style[amp-boilerplate]")));
    }

    #[test]
    fn summary_and_display() {
        let e = ValidationError::error(3, 7, "The tag 'foo' is disallowed.", "https://x.test");
        assert_eq!(e.summary(), "line 3, col 7: The tag 'foo' is disallowed.");
        assert_eq!(e.to_string(), "line 3, col 7: The tag 'foo' is disallowed. (see https://x.test)");
    }

    #[test]
    fn report_status_follows_severity() {
        let mut warning = ValidationError::error(1, 0, "meh", "u");
        warning.severity = Severity::Warning;
        let report = ValidationReport::from_errors(vec![warning.clone()]);
        assert!(report.passed());
        assert_eq!(report.warning_count(), 1);

        let report =
            ValidationReport::from_errors(vec![warning, ValidationError::error(1, 0, "bad", "u")]);
        assert!(!report.passed());
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn parses_command_output() {
        let json = r#"{"-":{"status":"FAIL","errors":[
            {"severity":"ERROR","line":1,"col":0,"message":"The tag 'foo' is disallowed.","specUrl":null,"code":"DISALLOWED_TAG","params":["foo"]},
            {"severity":"WARNING","line":2,"col":4,"message":"Something odd.","specUrl":"https://amp.dev"}
        ]}}"#;
        let report = CommandValidator::parse(json).unwrap();
        assert!(!report.passed());
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].spec_url, None);
        assert_eq!(report.errors[1].severity, Severity::Warning);
        assert!(CommandValidator::parse("not json").is_err());
    }

    #[test]
    fn missing_program_is_an_init_error() {
        let validator = CommandValidator::new("ampify-no-such-validator-binary");
        match validator.validate("<html></html>") {
            Err(Error::InitializationError(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
