//! End-to-end conversion of one page.
//!
//! `Converter` drives the whole run: render the page, keep the raw DOM in
//! `original.html`, validate it, rewrite it into an AMP document and write
//! that to `modified.html`.

use crate::async_api::RenderWorker;
use crate::console::{trim_url, Console};
use crate::transform::{parse_page_url, Transformer};
use crate::validator::{CommandValidator, RuleValidator, ValidationReport, Validator};
use crate::{ConvertConfig, Error, Result, ValidatorKind};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Findings listed under a failed validation before the rest are summarized
const MAX_LISTED_ERRORS: usize = 20;

/// What a finished conversion produced
#[derive(Debug, Clone)]
pub struct Conversion {
    /// URL the page was finally served from
    pub page_url: Url,
    pub original_path: PathBuf,
    pub modified_path: PathBuf,
    /// Validation of the rendered page, which drove the rewrite
    pub input_report: ValidationReport,
    /// Validation of the converted page, when enabled
    pub output_report: Option<ValidationReport>,
}

pub struct Converter {
    config: ConvertConfig,
    console: Console,
    validator: Box<dyn Validator + Send + Sync>,
}

impl Converter {
    pub fn new(config: ConvertConfig, console: Console) -> Result<Self> {
        config.check()?;
        let validator: Box<dyn Validator + Send + Sync> = match &config.validator {
            ValidatorKind::Builtin => Box::new(RuleValidator::new()),
            ValidatorKind::Command(program) => Box::new(CommandValidator::new(program.clone())),
        };
        Ok(Self {
            config,
            console,
            validator,
        })
    }

    /// Use `validator` for both validation passes
    pub fn with_validator(mut self, validator: Box<dyn Validator + Send + Sync>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Render `url` and convert it.
    pub async fn run(&self, url: &str) -> Result<Conversion> {
        let requested = parse_page_url(url)?;

        self.console.instruction("Getting rendered HTML");
        self.console
            .grouped(|| self.console.status(&format!("Rendering {}", trim_url(url, 80))));

        let worker = RenderWorker::new(self.config.render.clone()).await?;
        let rendered = worker.render(requested.as_str()).await;
        if let Err(e) = worker.close().await {
            debug!("renderer did not close cleanly: {}", e);
        }
        let page = rendered?;

        let page_url = match parse_page_url(&page.url) {
            Ok(final_url) => final_url,
            Err(e) => {
                debug!("keeping requested URL, final one is unusable: {}", e);
                requested
            }
        };
        self.convert(&page_url, &page.html)
    }

    /// Convert already rendered `html` served from `page_url`.
    pub fn convert(&self, page_url: &Url, html: &str) -> Result<Conversion> {
        let console = &self.console;
        fs::create_dir_all(&self.config.out_dir)
            .map_err(|e| Error::io(&self.config.out_dir, e))?;

        let original_path = self.config.original_path();
        write_file(&original_path, html)?;
        console.grouped(|| console.status(&format!("Wrote {}", original_path.display())));

        console.instruction("Running AMP validation");
        let input_report = self.validator.validate(html)?;
        console.grouped(|| {
            console.status(&format!(
                "{} errors, {} warnings",
                input_report.error_count(),
                input_report.warning_count()
            ))
        });
        for message in input_report.messages() {
            debug!("{}", message);
        }

        if let Some(path) = &self.config.report_path {
            write_report(path, &input_report)?;
            console.grouped(|| console.status(&format!("Report written to {}", path.display())));
        }

        let css = self.read_css()?;
        let modified = Transformer::new(console.clone())
            .replacement_tag(&self.config.replacement_tag)
            .apply(html, &input_report, page_url, &css)?;

        let modified_path = self.config.modified_path();
        write_file(&modified_path, &modified)?;
        console.grouped(|| console.status(&format!("Wrote {}", modified_path.display())));

        let output_report = if self.config.verify_output {
            console.instruction("Validating converted page");
            let report = self.validator.validate(&modified)?;
            self.print_outcome(&report);
            Some(report)
        } else {
            None
        };

        console.complete("Finished!");
        Ok(Conversion {
            page_url: page_url.clone(),
            original_path,
            modified_path,
            input_report,
            output_report,
        })
    }

    /// Stylesheet for `amp-custom`; a missing file leaves it empty
    fn read_css(&self) -> Result<String> {
        let path = &self.config.css_path;
        match fs::read_to_string(path) {
            Ok(css) => Ok(css),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} not found, amp-custom stays empty", path.display());
                Ok(String::new())
            }
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn print_outcome(&self, report: &ValidationReport) {
        let console = &self.console;
        if report.passed() {
            console.pass("AMP validation PASS");
            return;
        }

        console.fail(&format!(
            "AMP validation FAIL ({} errors)",
            report.error_count()
        ));
        let messages = report.messages();
        console.grouped(|| {
            let listed = messages.len().min(MAX_LISTED_ERRORS);
            console.print_table(&messages[..listed]);
            if messages.len() > listed {
                console.plain(&format!("... and {} more", messages.len() - listed));
            }
        });
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::io(path, e))
}

fn write_report(path: &Path, report: &ValidationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| Error::Other(format!("Failed to serialize report: {}", e)))?;
    write_file(path, &json)
}
