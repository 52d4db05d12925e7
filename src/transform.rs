//! String rewrites that turn a rendered page into an AMP document.
//!
//! Every rewrite is a plain function over the document text. [`Transformer`]
//! chains them in a fixed order, driven by the findings of a validation
//! report, and narrates each step on the console.

use crate::console::Console;
use crate::markup::{Scanner, SPACED_ATTRIBUTE, START_TAG};
use crate::validator::ValidationReport;
use crate::{Error, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};
use scraper::{Html, Selector};
use std::collections::{BTreeSet, HashSet};
use url::Url;

/// Maximum size of the `amp-custom` stylesheet
pub const AMP_CUSTOM_CSS_LIMIT: usize = 75_000;

pub const TITLE_PLACEHOLDER: &str = "PLACEHOLDER_TITLE";
pub const CANONICAL_PLACEHOLDER: &str = "PLACEHOLDER_CANONICAL_URL";
pub const CSS_PLACEHOLDER: &str = "PLACEHOLDER_INLINE_CSS";

/// Elements removed together with their content (`link` has none)
pub const DISALLOWED_TAGS: &[&str] = &["script", "style", "iframe", "link"];

/// Replacement for the document's `<html>` tag
pub const TAG_HTML: &str = r#"<html amp lang="en">"#;

/// Replacement for the document's `<head>` tag
pub const TAG_HEAD: &str = r#"<head>
<meta charset="utf-8">
<script async src="https://cdn.ampproject.org/v0.js"></script>
<title>PLACEHOLDER_TITLE</title>
<link rel="canonical" href="PLACEHOLDER_CANONICAL_URL">
<meta name="viewport" content="width=device-width,minimum-scale=1,initial-scale=1">
<style amp-boilerplate>body{-webkit-animation:-amp-start 8s steps(1,end) 0s 1 normal both;-moz-animation:-amp-start 8s steps(1,end) 0s 1 normal both;-ms-animation:-amp-start 8s steps(1,end) 0s 1 normal both;animation:-amp-start 8s steps(1,end) 0s 1 normal both}@-webkit-keyframes -amp-start{from{visibility:hidden}to{visibility:visible}}@-moz-keyframes -amp-start{from{visibility:hidden}to{visibility:visible}}@-ms-keyframes -amp-start{from{visibility:hidden}to{visibility:visible}}@-o-keyframes -amp-start{from{visibility:hidden}to{visibility:visible}}@keyframes -amp-start{from{visibility:hidden}to{visibility:visible}}</style>
<noscript>
<style amp-boilerplate>body{-webkit-animation:none;-moz-animation:none;-ms-animation:none;animation:none}</style>
</noscript>
<style amp-custom>PLACEHOLDER_INLINE_CSS</style>"#;

static ATTRIBUTE_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"The attribute '([^']*)' may not appear in tag").unwrap());
static TAG_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"The tag '([^']*)' is disallowed\.").unwrap());

static PROTOCOL_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b((?:href|src)\s*=\s*["'])//"#).unwrap());
static ROOT_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b((?:href|src)\s*=\s*["'])/([^/])"#).unwrap());
static URL_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b((?:href|src)\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap());

static HTML_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("(?i){}", open_tag_pattern("html"))).unwrap());
static HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("(?i){}", open_tag_pattern("head"))).unwrap());
static DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*<!doctype[^>]*>").unwrap());

/// Elements that may sit in the head; any other start tag ends it
const HEAD_CONTENT: &[&str] = &[
    "html", "head", "title", "meta", "link", "base", "style", "script", "noscript", "template",
];

/// Head elements the boilerplate brings its own copy of
static HEAD_DUPLICATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)<title(?:[\s/][^>]*)?>.*?</title\s*>").unwrap(),
        Regex::new(r"(?i)<meta\s[^>]*\bcharset\s*=[^>]*>").unwrap(),
        Regex::new(r#"(?i)<meta\s[^>]*\bname\s*=\s*["']?viewport\b[^>]*>"#).unwrap(),
    ]
});

static IMPORTANT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*!\s*important").unwrap());
static STYLE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</style").unwrap());

static HEAD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("head > title").unwrap());
static ANY_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Start tag named `name`, with or without attributes
fn open_tag_pattern(name: &str) -> String {
    format!(
        r#"<{}(?:[\s/](?:"[^"]*"|'[^']*'|[^'">])*)?>"#,
        regex::escape(name)
    )
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Other(format!("bad pattern {}: {}", pattern, e)))
}

/// Remove every `name` element including its content; for `link`, the tag.
pub fn remove_disallowed_tag(html: &str, name: &str) -> Result<String> {
    let pattern = if name.eq_ignore_ascii_case("link") {
        format!("(?i){}", open_tag_pattern(name))
    } else {
        format!(
            r"(?is){}.*?</{}\s*>",
            open_tag_pattern(name),
            regex::escape(name)
        )
    };
    let re = compile(&pattern)?;
    let count = re.find_iter(html).count();
    debug!("removing {} <{}> element(s)", count, name);
    Ok(re.replace_all(html, "").into_owned())
}

/// Remove all `<script>`, `<style>`, `<iframe>` and `<link>` elements
pub fn remove_disallowed_tags(html: &str) -> Result<String> {
    DISALLOWED_TAGS
        .iter()
        .try_fold(html.to_string(), |html, name| remove_disallowed_tag(&html, name))
}

/// Attribute names from "The attribute 'X' may not appear in tag" findings,
/// unique and in descending order.
pub fn disallowed_attributes<I, S>(messages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: BTreeSet<String> = messages
        .into_iter()
        .filter_map(|m| ATTRIBUTE_ERROR.captures(m.as_ref()).map(|c| c[1].to_string()))
        .collect();
    names.into_iter().rev().collect()
}

/// Tag names from "The tag 'X' is disallowed." findings
pub fn disallowed_tags<I, S>(messages: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    messages
        .into_iter()
        .filter_map(|m| TAG_ERROR.captures(m.as_ref()).map(|c| c[1].to_string()))
        .collect()
}

/// Delete the named attributes (ASCII case-insensitive) from every start tag
pub fn remove_attributes<S: AsRef<str>>(html: &str, names: &[S]) -> String {
    if names.is_empty() {
        return html.to_string();
    }
    let names: HashSet<String> = names
        .iter()
        .map(|n| n.as_ref().to_ascii_lowercase())
        .collect();

    START_TAG
        .replace_all(html, |tag: &Captures| {
            let tag = &tag[0];
            let name_end = tag[1..]
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .map_or(tag.len(), |i| i + 1);
            let (head, rest) = tag.split_at(name_end);
            let rest = SPACED_ATTRIBUTE.replace_all(rest, |attr: &Captures| {
                if names.contains(&attr[2].to_ascii_lowercase()) {
                    String::new()
                } else {
                    attr[0].to_string()
                }
            });
            format!("{}{}", head, rest)
        })
        .into_owned()
}

pub fn remove_attribute(html: &str, name: &str) -> String {
    remove_attributes(html, &[name])
}

/// Turn every `<tag …>` into `<replacement>` and `</tag>` into `</replacement>`
pub fn replace_tag(html: &str, tag: &str, replacement: &str) -> Result<String> {
    let open = compile(&format!("(?i){}", open_tag_pattern(tag)))?;
    let close = compile(&format!(r"(?i)</{}\s*>", regex::escape(tag)))?;

    let html = open.replace_all(html, |m: &Captures| {
        if m[0].ends_with("/>") {
            format!("<{0}></{0}>", replacement)
        } else {
            format!("<{}>", replacement)
        }
    });
    let closing = format!("</{}>", replacement);
    Ok(close.replace_all(&html, NoExpand(&closing)).into_owned())
}

/// `href="//host/…"` and `src="//host/…"` become `https://host/…`
pub fn absolutize_protocol_relative(html: &str) -> String {
    PROTOCOL_RELATIVE
        .replace_all(html, "${1}https://")
        .into_owned()
}

/// `href="/path"` and `src="/path"` become `DOMAIN/path`
pub fn absolutize_root_relative(html: &str, domain: &str) -> String {
    let domain = domain.trim_end_matches('/');
    ROOT_RELATIVE
        .replace_all(html, |c: &Captures| format!("{}{}/{}", &c[1], domain, &c[2]))
        .into_owned()
}

/// Resolve `href="page.html"`-style references against the page URL.
///
/// Fragments, template expressions and values that already carry a scheme
/// are left alone.
pub fn absolutize_document_relative(html: &str, base: &Url) -> String {
    URL_ATTRIBUTE
        .replace_all(html, |c: &Captures| {
            let (value, quote) = match (c.get(2), c.get(3)) {
                (Some(v), _) => (v.as_str(), '"'),
                (None, Some(v)) => (v.as_str(), '\''),
                (None, None) => return c[0].to_string(),
            };
            let trimmed = value.trim();
            let skip = trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with('/')
                || trimmed.contains("{{")
                || Url::parse(trimmed).is_ok();
            if skip {
                return c[0].to_string();
            }
            match base.join(trimmed) {
                Ok(resolved) => format!("{}{}{}{}", &c[1], quote, resolved, quote),
                Err(_) => c[0].to_string(),
            }
        })
        .into_owned()
}

/// `scheme://host[:port]` of an http(s) URL
pub fn domain_of(url: &str) -> Result<String> {
    let parsed = parse_page_url(url)?;
    Ok(parsed.origin().ascii_serialization())
}

/// Parse and check a page URL: absolute, http(s), with a host
pub fn parse_page_url(url: &str) -> Result<Url> {
    let invalid = |reason: String| Error::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(parsed)
}

/// Text of the document's `<title>`, whitespace collapsed
pub fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&HEAD_TITLE)
        .next()
        .or_else(|| document.select(&ANY_TITLE).next())
        .map(|t| t.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Byte range of the head's content.
///
/// Starts after the `<head>` tag, or at the top when the tag was omitted. Ends
/// at `</head>` or at the first start tag that cannot live in a head, such as
/// `<body>`.
fn head_range(html: &str) -> (usize, usize) {
    let start = HEAD_OPEN.find(html).map_or(0, |m| m.end());
    let end = Scanner::new(&html[start..])
        .find(|t| {
            if t.closing {
                t.name == "head"
            } else {
                !HEAD_CONTENT.contains(&t.name.as_str())
            }
        })
        .map_or(html.len(), |t| start + t.offset);
    (start, end)
}

/// Drop `<title>`, `<meta charset>` and `<meta name=viewport>` from the head
pub fn strip_head_duplicates(html: &str) -> String {
    let (start, end) = head_range(html);

    let mut head = html[start..end].to_string();
    for re in HEAD_DUPLICATES.iter() {
        head = re.replace_all(&head, "").into_owned();
    }
    format!("{}{}{}", &html[..start], head, &html[end..])
}

/// Swap the first `<html>` and `<head>` tags for the AMP versions.
///
/// Exactly one occurrence of each is replaced; `<header>` never counts as
/// a head tag. Omitted tags are added: `<html>` after the doctype, and the
/// head block right after `<html>`, closed where the implied head ends.
pub fn add_amp_boilerplate(html: &str, title: &str, canonical: &str) -> String {
    let head = TAG_HEAD
        .replace(CANONICAL_PLACEHOLDER, &escape_html(canonical))
        .replace(TITLE_PLACEHOLDER, &escape_html(title));

    let html = if HTML_OPEN.is_match(html) {
        HTML_OPEN.replace(html, NoExpand(TAG_HTML)).into_owned()
    } else {
        let at = DOCTYPE.find(html).map_or(0, |m| m.end());
        format!("{}{}{}", &html[..at], TAG_HTML, &html[at..])
    };

    if HEAD_OPEN.is_match(&html) {
        return HEAD_OPEN.replace(&html, NoExpand(&head)).into_owned();
    }
    let after_html = html.find(TAG_HTML).map_or(0, |i| i + TAG_HTML.len());
    let (_, end) = head_range(&html);
    let end = end.max(after_html);
    format!(
        "{}{}{}</head>{}",
        &html[..after_html],
        head,
        &html[after_html..end],
        &html[end..]
    )
}

/// Make a stylesheet acceptable for `<style amp-custom>`
pub fn sanitize_css(css: &str) -> String {
    let css = IMPORTANT.replace_all(css, "");
    let css = STYLE_END.replace_all(&css, r"<\/style");
    if css.len() > AMP_CUSTOM_CSS_LIMIT {
        warn!(
            "inline CSS is {} bytes, AMP allows {}",
            css.len(),
            AMP_CUSTOM_CSS_LIMIT
        );
    }
    css.into_owned()
}

/// Put `css` into the `amp-custom` placeholder
pub fn inline_css(html: &str, css: &str) -> String {
    html.replacen(CSS_PLACEHOLDER, &sanitize_css(css), 1)
}

/// Runs the full rewrite sequence over a rendered page
#[derive(Clone)]
pub struct Transformer {
    console: Console,
    replacement_tag: String,
}

impl Transformer {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            replacement_tag: "div".to_string(),
        }
    }

    /// Tag that replaces disallowed custom tags (default `div`)
    pub fn replacement_tag(mut self, tag: &str) -> Self {
        self.replacement_tag = tag.to_string();
        self
    }

    /// Apply every rewrite to `html`, using `report` (the validation of
    /// `html`) to decide which attributes and tags have to go.
    pub fn apply(
        &self,
        html: &str,
        report: &ValidationReport,
        page_url: &Url,
        css: &str,
    ) -> Result<String> {
        let console = &self.console;
        let messages = report.messages();
        let title = page_title(html);
        let domain = page_url.origin().ascii_serialization();
        let mut html = html.to_string();

        console.instruction("Checking for disallowed tags");
        console.add_group();
        for name in DISALLOWED_TAGS {
            console.status(&format!("Removing disallowed tag: <{}>", name));
            html = remove_disallowed_tag(&html, name)?;
        }
        console.end_group();

        console.instruction("Checking for disallowed attributes");
        console.grouped(|| {
            let attributes = disallowed_attributes(&messages);
            for attribute in &attributes {
                console.status(&format!("Removing attribute: {}", attribute));
            }
            html = remove_attributes(&html, &attributes);
        });

        console.instruction("Checking for disallowed custom tags");
        console.add_group();
        for tag in disallowed_tags(&messages) {
            console.status(&format!(
                "Replacing custom tag <{}> with a <{}>",
                tag, self.replacement_tag
            ));
            html = replace_tag(&html, &tag, &self.replacement_tag)?;
        }
        console.end_group();

        console.instruction("Changing protocol relative URLs to absolute URLs");
        html = absolutize_protocol_relative(&html);

        console.instruction(&format!(
            "Replacing relative URLs with absolute URLs using domain: {}",
            domain
        ));
        html = absolutize_root_relative(&html, &domain);

        console.instruction(&format!("Resolving document relative URLs against: {}", page_url));
        html = absolutize_document_relative(&html, page_url);

        console.instruction("Adding AMP boilerplate");
        html = add_amp_boilerplate(&strip_head_duplicates(&html), &title, page_url.as_str());

        console.instruction(&format!("Inlining CSS ({} bytes)", css.len()));
        Ok(inline_css(&html, css))
    }
}
