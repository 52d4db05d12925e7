use ampify::config::{INLINE_CSS_FILE_NAME, MODIFIED_HTML_FILE_NAME, ORIGINAL_HTML_FILE_NAME};
use ampify::console::init_logger;
use ampify::{Console, ConvertConfig, Converter, RenderConfig, ValidatorKind};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ValidatorChoice {
    /// Built-in rule tables
    Builtin,
    /// External amphtml-validator program
    Command,
}

/// Convert a rendered web page into an AMP document
#[derive(Parser, Debug)]
#[command(name = "ampify", version, about)]
struct Cli {
    /// Page to convert
    #[arg(long)]
    url: Option<String>,

    /// Directory the output files are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Stylesheet inlined into <style amp-custom>
    #[arg(long, default_value = INLINE_CSS_FILE_NAME)]
    css: PathBuf,

    /// File name of the raw rendered page
    #[arg(long, default_value = ORIGINAL_HTML_FILE_NAME)]
    original: String,

    /// File name of the converted page
    #[arg(long, default_value = MODIFIED_HTML_FILE_NAME)]
    modified: String,

    /// Write the validation report of the rendered page as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ValidatorChoice::Builtin)]
    validator: ValidatorChoice,

    /// Program used by `--validator command`
    #[arg(long, value_name = "PROG", default_value = "amphtml-validator")]
    validator_cmd: String,

    #[arg(long)]
    user_agent: Option<String>,

    /// Page load timeout
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Tag that replaces disallowed custom tags
    #[arg(long, default_value = "div")]
    replacement_tag: String,

    /// Skip validating the converted page
    #[arg(long)]
    no_verify: bool,

    #[arg(long)]
    no_color: bool,

    /// Print debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn convert_config(&self) -> ConvertConfig {
        let mut render = RenderConfig {
            timeout_ms: self.timeout_ms,
            ..Default::default()
        };
        if let Some(user_agent) = &self.user_agent {
            render.user_agent = user_agent.clone();
        }

        ConvertConfig {
            out_dir: self.out_dir.clone(),
            original_file: self.original.clone(),
            modified_file: self.modified.clone(),
            css_path: self.css.clone(),
            replacement_tag: self.replacement_tag.clone(),
            report_path: self.report.clone(),
            verify_output: !self.no_verify,
            validator: match self.validator {
                ValidatorChoice::Builtin => ValidatorKind::Builtin,
                ValidatorChoice::Command => ValidatorKind::Command(self.validator_cmd.clone()),
            },
            render,
        }
    }
}

fn print_usage(console: &Console) {
    console.plain("Must provide a url parameter. Example:");
    console.grouped(|| console.plain("ampify --url https://www.example.com"));
}

async fn run(cli: &Cli, url: &str, console: &Console) -> anyhow::Result<()> {
    let converter = Converter::new(cli.convert_config(), console.clone())?;
    let conversion = converter
        .run(url)
        .await
        .with_context(|| format!("converting {}", url))?;
    log::debug!(
        "converted {} into {}",
        conversion.page_url,
        conversion.modified_path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let console = Console::stdout("Main").verbose(cli.verbose);
    let console = if cli.no_color {
        console.color(false)
    } else {
        console
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = init_logger(console.for_tag("Log"), level) {
        eprintln!("Failed to install logger: {}", e);
    }

    let Some(url) = cli.url.as_deref() else {
        print_usage(&console);
        console.flush();
        return ExitCode::SUCCESS;
    };

    console.title(&format!("ampify {}", env!("CARGO_PKG_VERSION")));
    match run(&cli, url, &console).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            console.flush();
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_optional() {
        let cli = Cli::try_parse_from(["ampify"]).unwrap();
        assert!(cli.url.is_none());
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "ampify",
            "--url",
            "https://example.com",
            "--out-dir",
            "out",
            "--validator",
            "command",
            "--validator-cmd",
            "/usr/bin/amphtml-validator",
            "--timeout-ms",
            "500",
            "--replacement-tag",
            "section",
            "--no-verify",
        ])
        .unwrap();
        let config = cli.convert_config();

        assert_eq!(config.out_dir, PathBuf::from("out"));
        assert_eq!(
            config.validator,
            ValidatorKind::Command("/usr/bin/amphtml-validator".into())
        );
        assert_eq!(config.render.timeout_ms, 500);
        assert_eq!(config.replacement_tag, "section");
        assert!(!config.verify_output);
        assert_eq!(config.original_file, "original.html");
    }
}
