//! Grouped, colored console output.
//!
//! `Console` prints progress messages in a fixed set of styles (instruction,
//! status, completion, ...) and indents them by a group depth that is shared
//! between every clone of the console, so nested steps line up no matter
//! which part of the pipeline prints them. `ConsoleLogger` plugs the same
//! output into the `log` facade so `log::warn!` and friends end up in the
//! same stream with matching indentation.

use log::{Level, LevelFilter, Metadata, Record};
use owo_colors::{AnsiColors, OwoColorize, Style};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Width of the `[TAG]` column printed in front of info messages
pub const TAG_FIELD_SIZE: usize = 10;
/// Indentation per group level
const GROUP_INDENT: &str = "  ";

/// Base colors available to message styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Blue,
    Red,
    Cyan,
    Magenta,
    Yellow,
    Green,
    White,
    Gray,
}

impl Color {
    fn ansi(self, bright: bool) -> AnsiColors {
        match (self, bright) {
            (Color::Blue, false) => AnsiColors::Blue,
            (Color::Blue, true) => AnsiColors::BrightBlue,
            (Color::Red, false) => AnsiColors::Red,
            (Color::Red, true) => AnsiColors::BrightRed,
            (Color::Cyan, false) => AnsiColors::Cyan,
            (Color::Cyan, true) => AnsiColors::BrightCyan,
            (Color::Magenta, false) => AnsiColors::Magenta,
            (Color::Magenta, true) => AnsiColors::BrightMagenta,
            (Color::Yellow, false) => AnsiColors::Yellow,
            (Color::Yellow, true) => AnsiColors::BrightYellow,
            (Color::Green, false) => AnsiColors::Green,
            (Color::Green, true) => AnsiColors::BrightGreen,
            (Color::White, false) => AnsiColors::White,
            (Color::White, true) => AnsiColors::BrightWhite,
            // gray has no brighter variant
            (Color::Gray, _) => AnsiColors::BrightBlack,
        }
    }
}

/// Text style of a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStyle {
    pub color: Color,
    pub bright: bool,
    pub bold: bool,
    pub underline: bool,
}

impl MessageStyle {
    pub const fn new(color: Color, bright: bool) -> Self {
        Self {
            color,
            bright,
            bold: false,
            underline: false,
        }
    }

    fn to_owo(self) -> Style {
        let mut style = Style::new().color(self.color.ansi(self.bright));
        if self.bold {
            style = style.bold();
        }
        if self.underline {
            style = style.underline();
        }
        style
    }
}

impl Default for MessageStyle {
    fn default() -> Self {
        MessageStyle::new(Color::White, false)
    }
}

/// The kinds of messages the converter prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Instruction,
    Status,
    Complete,
    Info,
    Update,
    Pass,
    Fail,
    Error,
    Title,
}

impl MessageType {
    pub fn style(self) -> MessageStyle {
        match self {
            MessageType::Instruction => MessageStyle::new(Color::Cyan, true),
            MessageType::Status => MessageStyle::new(Color::Yellow, false),
            MessageType::Complete => MessageStyle::new(Color::Green, true),
            MessageType::Info => MessageStyle::new(Color::Gray, false),
            MessageType::Update => MessageStyle::new(Color::Yellow, true),
            MessageType::Pass => MessageStyle::new(Color::Green, true),
            MessageType::Fail => MessageStyle::new(Color::Red, true),
            MessageType::Error => MessageStyle::new(Color::Red, true),
            MessageType::Title => MessageStyle {
                color: Color::Magenta,
                bright: true,
                bold: true,
                underline: true,
            },
        }
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Console printer with a shared group depth.
///
/// Clones (and consoles made with [`Console::for_tag`]) share the output sink
/// and the group depth.
#[derive(Clone)]
pub struct Console {
    tag: String,
    verbose: bool,
    use_color: bool,
    style: MessageStyle,
    group: Arc<AtomicUsize>,
    out: Sink,
}

impl Console {
    /// Console writing to stdout. Colors are on unless `NO_COLOR` is set.
    pub fn stdout(tag: &str) -> Self {
        let use_color = std::env::var_os("NO_COLOR").is_none();
        Self::with_writer(tag, std::io::stdout()).color(use_color)
    }

    /// Console writing to an arbitrary sink, without colors.
    pub fn with_writer<W: Write + Send + 'static>(tag: &str, writer: W) -> Self {
        Self {
            tag: tag.to_string(),
            verbose: false,
            use_color: false,
            style: MessageStyle::default(),
            group: Arc::new(AtomicUsize::new(0)),
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Default style for [`Console::log`]
    pub fn default_style(mut self, style: MessageStyle) -> Self {
        self.style = style;
        self
    }

    /// A console with another tag sharing this one's sink and group depth
    pub fn for_tag(&self, tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..self.clone()
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn group(&self) -> usize {
        self.group.load(Ordering::SeqCst)
    }

    pub fn add_group(&self) {
        let depth = self.group.fetch_add(1, Ordering::SeqCst);
        self.info(&format!("add_group(): group = {} -> {}", depth, depth + 1));
    }

    pub fn end_group(&self) {
        let depth = self.group();
        self.info(&format!(
            "end_group(): group = {} -> {}",
            depth,
            depth.saturating_sub(1)
        ));
        self.set_group(depth.saturating_sub(1));
    }

    pub fn set_group(&self, depth: usize) {
        self.group.store(depth, Ordering::SeqCst);
    }

    /// Run `f` one group deeper
    pub fn grouped<T>(&self, f: impl FnOnce() -> T) -> T {
        self.add_group();
        let out = f();
        self.end_group();
        out
    }

    /// Print `msg` in `style` at the current group depth
    pub fn log(&self, msg: &str, style: MessageStyle) {
        let painted = self.paint(msg, style);
        self.write_indented(&painted, self.group());
    }

    /// Print `msg` in this console's default style
    pub fn plain(&self, msg: &str) {
        self.log(msg, self.style);
    }

    pub fn title(&self, msg: &str) {
        self.log(msg, MessageType::Title.style());
    }

    pub fn status(&self, msg: &str) {
        self.log(msg, MessageType::Status.style());
    }

    pub fn instruction(&self, msg: &str) {
        self.log(msg, MessageType::Instruction.style());
    }

    pub fn update(&self, msg: &str) {
        self.log(msg, MessageType::Update.style());
    }

    pub fn complete(&self, msg: &str) {
        self.log(msg, MessageType::Complete.style());
    }

    pub fn pass(&self, msg: &str) {
        self.log(msg, MessageType::Pass.style());
    }

    pub fn fail(&self, msg: &str) {
        self.log(msg, MessageType::Fail.style());
    }

    pub fn error(&self, msg: &str) {
        self.log(msg, MessageType::Error.style());
    }

    /// Tagged diagnostic line, printed flush left and only when verbose
    pub fn info(&self, msg: &str) {
        if self.verbose {
            self.tagged(&self.tag, msg);
        }
    }

    /// `[TAG]` column followed by a gray message, always at depth 0
    pub fn tagged(&self, tag: &str, msg: &str) {
        let style = MessageType::Info.style();
        let label = pad_field(&format!("[{}]", tag), TAG_FIELD_SIZE, false, ' ');
        let line = format!(
            "{} {}",
            self.paint(&label, MessageStyle { bold: true, ..style }),
            self.paint(msg, style)
        );
        self.write_indented(&line, 0);
    }

    /// Apply `style` to `msg` (no-op when colors are off)
    pub fn paint(&self, msg: &str, style: MessageStyle) -> String {
        if self.use_color {
            msg.style(style.to_owo()).to_string()
        } else {
            msg.to_string()
        }
    }

    /// Print pre-formatted rows as they are
    pub fn print_table<S: AsRef<str>>(&self, rows: &[S]) {
        for row in rows {
            self.write_indented(row.as_ref(), self.group());
        }
    }

    /// Print `count` empty lines
    pub fn line(&self, count: usize) {
        if let Ok(mut out) = self.out.lock() {
            for _ in 0..count {
                let _ = writeln!(out);
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }

    fn write_indented(&self, text: &str, depth: usize) {
        let indent = GROUP_INDENT.repeat(depth);
        if let Ok(mut out) = self.out.lock() {
            for line in text.split('\n') {
                let _ = writeln!(out, "{}{}", indent, line);
            }
        }
    }
}

/// Fit `msg` into a field of `size` characters, padding with `spacer`.
///
/// Longer messages are cut to `size`. When `centered`, the padding is split
/// around the message with the odd character going to the right.
pub fn pad_field(msg: &str, size: usize, centered: bool, spacer: char) -> String {
    let cut: String = msg.chars().take(size).collect();
    let len = msg.chars().count();
    let fill = |n: usize| spacer.to_string().repeat(n);

    if centered {
        let start = size.saturating_sub(len) / 2;
        let end = size.saturating_sub(len + start);
        format!("{}{}{}", fill(start), cut, fill(end))
    } else {
        format!("{}{}", cut, fill(size.saturating_sub(len)))
    }
}

/// Shorten `url` to `len` characters by replacing its middle with `...`.
///
/// The head keeps slightly more than half of the budget since that is where
/// the host name lives.
pub fn trim_url(url: &str, len: usize) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() <= len {
        return url.to_string();
    }
    if len <= 3 {
        return chars[..len].iter().collect();
    }
    let first = (len / 2 + 10).min(len);
    let head = first.saturating_sub(3);
    let tail = len - first;

    let mut out: String = chars[..head].iter().collect();
    out.push_str("...");
    out.extend(&chars[chars.len() - tail..]);
    out
}

/// `log` backend that prints through a [`Console`]
pub struct ConsoleLogger {
    console: Console,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(console: Console, level: LevelFilter) -> Self {
        Self { console, level }
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = record.args().to_string();
        match record.level() {
            Level::Error => self.console.error(&msg),
            Level::Warn => self.console.update(&msg),
            Level::Info => self.console.status(&msg),
            Level::Debug | Level::Trace => {
                let target = record.target();
                let tag = target.rsplit("::").next().unwrap_or(target);
                self.console.tagged(tag, &msg);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Install a [`ConsoleLogger`] as the global `log` backend
pub fn init_logger(console: Console, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(ConsoleLogger::new(console, level)))?;
    log::set_max_level(level);
    Ok(())
}
