//! Regex-driven markup scanning.
//!
//! This is not an HTML parser: it walks the start and end tags of a document
//! in source order, skipping comments, doctypes and the bodies of raw text
//! elements, and keeps the byte offset of every tag so findings can be
//! reported with a line and column.

use once_cell::sync::Lazy;
use regex::Regex;

/// A start tag, attributes included. Quoted values may contain `>`.
pub(crate) static START_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<[A-Za-z][^\s/>]*(?:"[^"]*"|'[^']*'|[^'">])*>"#).unwrap()
});

/// One attribute with its leading whitespace, as found inside a start tag.
pub(crate) static SPACED_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\s+)([^\s"'>/=]+)(\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?"#).unwrap()
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|</?[A-Za-z][^\s/>]*(?:"[^"]*"|'[^']*'|[^'">])*>"#)
        .unwrap()
});

/// Elements whose content is text, not markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "xmp"];

/// An attribute as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
}

/// A start or end tag found in the source
#[derive(Debug, Clone)]
pub struct Tag<'a> {
    /// Lowercased tag name
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    pub attributes: Vec<Attribute<'a>>,
    /// Byte offset of the `<`
    pub offset: usize,
    pub raw: &'a str,
}

impl<'a> Tag<'a> {
    fn parse(raw: &'a str, offset: usize) -> Self {
        let closing = raw.starts_with("</");
        let name_start = if closing { 2 } else { 1 };
        let name_end = raw[name_start..]
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .map(|i| i + name_start)
            .unwrap_or(raw.len());
        let name = raw[name_start..name_end].to_ascii_lowercase();

        let mut attributes = Vec::new();
        if !closing {
            let body = &raw[name_end..raw.len() - 1];
            for caps in ATTRIBUTE.captures_iter(body) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str());
                attributes.push(Attribute { name, value });
            }
        }

        Tag {
            name,
            closing,
            self_closing: !closing && raw.ends_with("/>"),
            attributes,
            offset,
            raw,
        }
    }

    /// Look up an attribute by name, ignoring ASCII case
    pub fn attr(&self, name: &str) -> Option<&Attribute<'a>> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Value of an attribute; `Some("")` for a bare attribute
    pub fn attr_value(&self, name: &str) -> Option<&'a str> {
        self.attr(name).map(|a| a.value.unwrap_or(""))
    }
}

/// Iterator over the tags of a document, in source order
pub struct Scanner<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(html: &'a str) -> Self {
        Self { html, pos: 0 }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let m = TOKEN.find_at(self.html, self.pos)?;
            self.pos = m.end();
            let raw = m.as_str();
            if raw.starts_with("<!") || raw.starts_with("<?") {
                continue;
            }

            let tag = Tag::parse(raw, m.start());
            if !tag.closing && !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                self.pos = find_end_tag(self.html, self.pos, &tag.name).unwrap_or(self.html.len());
            }
            return Some(tag);
        }
    }
}

/// Byte offset of the next `</name` end tag at or after `from`
fn find_end_tag(html: &str, from: usize, name: &str) -> Option<usize> {
    let rest = &html[from..];
    rest.match_indices("</").map(|(i, _)| i).find_map(|i| {
        let after = &rest[i + 2..];
        let candidate = after.get(..name.len())?;
        let boundary = after[name.len()..]
            .chars()
            .next()
            .map_or(true, |c| c == '>' || c == '/' || c.is_whitespace());
        (candidate.eq_ignore_ascii_case(name) && boundary).then_some(from + i)
    })
}

/// Maps byte offsets to 1-based lines and 0-based columns
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&s| s <= offset).max(1) - 1;
        let start = self.starts[line];
        let col = self
            .text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line + 1, col)
    }
}
