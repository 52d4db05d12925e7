//! Tag and attribute tables for the built-in AMP validator.
//!
//! Only HTML elements listed here (plus `amp-*` components and inline SVG)
//! may appear in an AMP document. Attributes are checked against the global
//! list first and then against the per-tag list.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Documentation page every finding links to
pub const HTML_TAGS_SPEC_URL: &str =
    "https://amp.dev/documentation/guides-and-tutorials/learn/spec/amphtml/#html-tags";
pub const REQUIRED_MARKUP_SPEC_URL: &str =
    "https://amp.dev/documentation/guides-and-tutorials/learn/spec/amphtml/#required-markup";

/// Prefix of the AMP runtime and extension scripts
pub const AMP_CDN: &str = "https://cdn.ampproject.org/";
pub const AMP_RUNTIME_SRC: &str = "https://cdn.ampproject.org/v0.js";

/// Stylesheet hosts AMP accepts in `<link rel=stylesheet>`
pub const FONT_PROVIDERS: &[&str] = &[
    "https://cloud.typography.com",
    "https://fast.fonts.net",
    "https://fonts.googleapis.com",
    "https://maxcdn.bootstrapcdn.com",
    "https://p.typekit.net",
    "https://pro.fontawesome.com",
    "https://use.fontawesome.com",
    "https://use.typekit.net",
];

/// Attributes allowed on every HTML element
const GLOBAL_ATTRIBUTES: &[&str] = &[
    "about", "accesskey", "class", "content", "datatype", "dir", "draggable", "hidden", "id",
    "inlist", "itemid", "itemprop", "itemref", "itemscope", "itemtype", "lang", "on", "prefix",
    "property", "rel", "resource", "rev", "role", "slot", "style", "tabindex", "title",
    "translate", "typeof", "vocab",
];

const TABLE_CELL: &[&str] = &[
    "abbr", "align", "bgcolor", "colspan", "headers", "height", "rowspan", "scope", "sorted",
    "valign", "width",
];

const MEDIA: &[&str] = &[
    "autoplay", "controls", "crossorigin", "height", "loop", "muted", "playsinline", "poster",
    "preload", "src", "width",
];

/// Rule for one HTML element
#[derive(Debug)]
pub struct TagRule {
    pub name: &'static str,
    pub attributes: &'static [&'static str],
    /// Replaced by an AMP component outside of `<noscript>`
    pub amp_alternative: Option<&'static str>,
}

const fn tag(name: &'static str, attributes: &'static [&'static str]) -> TagRule {
    TagRule {
        name,
        attributes,
        amp_alternative: None,
    }
}

const fn noscript_only(
    name: &'static str,
    attributes: &'static [&'static str],
    alternative: &'static str,
) -> TagRule {
    TagRule {
        name,
        attributes,
        amp_alternative: Some(alternative),
    }
}

#[rustfmt::skip]
static TAG_RULES: &[TagRule] = &[
    tag("html", &["amp", "\u{26a1}", "amp4ads", "\u{26a1}4ads", "amp4email", "\u{26a1}4email", "transformed", "xmlns"]),
    tag("head", &[]),
    tag("title", &[]),
    tag("base", &["href", "target"]),
    tag("link", &["as", "color", "crossorigin", "href", "hreflang", "media", "sizes", "type"]),
    tag("meta", &["charset", "content", "http-equiv", "name", "scheme"]),
    tag("style", &["amp-boilerplate", "amp-custom", "amp-keyframes", "media", "nonce"]),
    tag("script", &["async", "crossorigin", "custom-element", "custom-template", "nonce", "src", "type"]),
    tag("noscript", &[]),
    tag("body", &[]),
    tag("article", &[]),
    tag("section", &[]),
    tag("nav", &[]),
    tag("aside", &[]),
    tag("h1", &["align"]),
    tag("h2", &["align"]),
    tag("h3", &["align"]),
    tag("h4", &["align"]),
    tag("h5", &["align"]),
    tag("h6", &["align"]),
    tag("header", &[]),
    tag("footer", &[]),
    tag("address", &[]),
    tag("hgroup", &[]),
    tag("main", &[]),
    tag("p", &["align"]),
    tag("hr", &[]),
    tag("pre", &[]),
    tag("blockquote", &["align", "cite"]),
    tag("ol", &["reversed", "start", "type"]),
    tag("ul", &[]),
    tag("li", &["value"]),
    tag("dl", &[]),
    tag("dt", &[]),
    tag("dd", &[]),
    tag("figure", &[]),
    tag("figcaption", &[]),
    tag("div", &["align"]),
    tag("a", &["border", "download", "href", "hreflang", "media", "name", "referrerpolicy", "target", "type"]),
    tag("em", &[]),
    tag("strong", &[]),
    tag("small", &[]),
    tag("s", &[]),
    tag("cite", &[]),
    tag("q", &["cite"]),
    tag("dfn", &[]),
    tag("abbr", &[]),
    tag("data", &["value"]),
    tag("time", &["datetime"]),
    tag("code", &[]),
    tag("var", &[]),
    tag("samp", &[]),
    tag("kbd", &[]),
    tag("sub", &[]),
    tag("sup", &[]),
    tag("i", &[]),
    tag("b", &[]),
    tag("u", &[]),
    tag("mark", &[]),
    tag("ruby", &[]),
    tag("rb", &[]),
    tag("rt", &[]),
    tag("rtc", &[]),
    tag("rp", &[]),
    tag("bdi", &[]),
    tag("bdo", &[]),
    tag("span", &[]),
    tag("br", &[]),
    tag("wbr", &[]),
    tag("ins", &["cite", "datetime"]),
    tag("del", &["cite", "datetime"]),
    tag("source", &["media", "sizes", "src", "srcset", "type"]),
    tag("track", &["default", "kind", "label", "src", "srclang"]),
    tag("table", &["align", "bgcolor", "border", "cellpadding", "cellspacing", "sortable", "width"]),
    tag("caption", &[]),
    tag("colgroup", &["span"]),
    tag("col", &["span"]),
    tag("tbody", &[]),
    tag("thead", &[]),
    tag("tfoot", &[]),
    tag("tr", &["align", "bgcolor", "height", "valign"]),
    tag("td", TABLE_CELL),
    tag("th", TABLE_CELL),
    tag("form", &["accept", "accept-charset", "action", "action-xhr", "autocomplete", "custom-validation-reporting", "enctype", "method", "name", "novalidate", "target", "verify-xhr", "xssi-prefix"]),
    tag("fieldset", &["disabled", "name"]),
    tag("legend", &[]),
    tag("label", &["for"]),
    tag("input", &["accept", "autocomplete", "autofocus", "checked", "disabled", "height", "inputmode", "list", "max", "maxlength", "min", "minlength", "multiple", "name", "pattern", "placeholder", "readonly", "required", "selectiondirection", "size", "spellcheck", "step", "type", "value", "width"]),
    tag("button", &["disabled", "name", "type", "value"]),
    tag("select", &["autofocus", "disabled", "multiple", "name", "required", "size"]),
    tag("datalist", &[]),
    tag("optgroup", &["disabled", "label"]),
    tag("option", &["disabled", "label", "selected", "value"]),
    tag("textarea", &["autocomplete", "autofocus", "cols", "disabled", "maxlength", "minlength", "name", "placeholder", "readonly", "required", "rows", "selectiondirection", "selectionend", "selectionstart", "spellcheck", "wrap"]),
    tag("output", &["for", "form", "name"]),
    tag("progress", &["max", "value"]),
    tag("meter", &["high", "low", "max", "min", "optimum", "value"]),
    tag("details", &["open"]),
    tag("summary", &[]),
    tag("template", &["type"]),
    tag("slot", &["name"]),
    tag("acronym", &[]),
    tag("big", &[]),
    tag("center", &[]),
    tag("dir", &[]),
    tag("font", &["color", "face", "size"]),
    tag("strike", &[]),
    tag("tt", &[]),
    noscript_only("img", &["alt", "attribution", "border", "decoding", "height", "ismap", "longdesc", "loading", "sizes", "src", "srcset", "width"], "amp-img"),
    noscript_only("video", MEDIA, "amp-video"),
    noscript_only("audio", MEDIA, "amp-audio"),
    noscript_only("iframe", &["allow", "allowfullscreen", "frameborder", "height", "name", "referrerpolicy", "sandbox", "src", "srcdoc", "width"], "amp-iframe"),
];

const SVG_ELEMENTS: &[&str] = &[
    "svg", "g", "path", "glyph", "glyphref", "marker", "view", "circle", "line", "polygon",
    "polyline", "rect", "text", "textpath", "tref", "tspan", "clippath", "filter", "ellipse",
    "hkern", "lineargradient", "mask", "pattern", "radialgradient", "stop", "symbol", "use",
    "vkern", "defs", "desc", "metadata", "image", "feblend", "fecolormatrix",
    "fecomponenttransfer", "fecomposite", "feconvolvematrix", "fediffuselighting",
    "fedisplacementmap", "fedistantlight", "feflood", "fefunca", "fefuncb", "fefuncg", "fefuncr",
    "fegaussianblur", "femerge", "femergenode", "femorphology", "feoffset", "fepointlight",
    "fespecularlighting", "fespotlight", "fetile", "feturbulence", "foreignobject", "switch",
    "solidcolor", "animate", "animatemotion", "animatetransform", "set", "mpath",
];

static RULES_BY_NAME: Lazy<HashMap<&'static str, &'static TagRule>> =
    Lazy::new(|| TAG_RULES.iter().map(|r| (r.name, r)).collect());

/// Rule for a (lowercase) HTML tag name, if the tag exists in AMP
pub fn lookup(tag: &str) -> Option<&'static TagRule> {
    RULES_BY_NAME.get(tag).copied()
}

pub fn is_amp_component(tag: &str) -> bool {
    tag.starts_with("amp-")
}

pub fn is_svg_element(tag: &str) -> bool {
    SVG_ELEMENTS.contains(&tag)
}

/// Whether `tag` may appear at all (ignoring context such as `<noscript>`)
pub fn is_known_tag(tag: &str) -> bool {
    is_amp_component(tag) || is_svg_element(tag) || lookup(tag).is_some()
}

/// Whether `attr` may appear on `tag`. Both names are compared lowercase.
pub fn attribute_allowed(tag: &str, attr: &str) -> bool {
    let attr = attr.to_ascii_lowercase();
    if attr.starts_with("on") && attr != "on" {
        return false;
    }
    if attr.starts_with("data-") || attr.starts_with("aria-") || attr.starts_with('[') {
        return true;
    }
    if is_amp_component(tag) || is_svg_element(tag) {
        return true;
    }
    if GLOBAL_ATTRIBUTES.contains(&attr.as_str()) {
        return true;
    }
    lookup(tag).is_some_and(|rule| rule.attributes.contains(&attr.as_str()))
}

/// Whether a `<link rel=stylesheet>` pointing at `href` is allowed
pub fn is_font_provider(href: &str) -> bool {
    FONT_PROVIDERS.iter().any(|p| {
        href.strip_prefix(p)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_duplicate_rules() {
        assert_eq!(RULES_BY_NAME.len(), TAG_RULES.len());
    }

    #[test]
    fn known_tags() {
        assert!(is_known_tag("div"));
        assert!(is_known_tag("amp-carousel"));
        assert!(is_known_tag("lineargradient"));
        assert!(!is_known_tag("my-widget"));
        assert!(!is_known_tag("frameset"));
        assert!(!is_known_tag("object"));
    }

    #[test]
    fn noscript_only_tags_suggest_components() {
        assert_eq!(lookup("img").and_then(|r| r.amp_alternative), Some("amp-img"));
        assert_eq!(lookup("div").and_then(|r| r.amp_alternative), None);
    }

    #[test]
    fn attribute_rules() {
        assert!(attribute_allowed("div", "class"));
        assert!(attribute_allowed("div", "data-anything"));
        assert!(attribute_allowed("div", "aria-label"));
        assert!(attribute_allowed("div", "on"));
        assert!(attribute_allowed("a", "HREF"));
        assert!(attribute_allowed("td", "colspan"));
        assert!(attribute_allowed("amp-img", "layout"));
        assert!(!attribute_allowed("div", "onclick"));
        assert!(!attribute_allowed("amp-img", "onload"));
        assert!(!attribute_allowed("div", "href"));
        assert!(!attribute_allowed("div", "v-if"));
        assert!(!attribute_allowed("span", "contenteditable"));
    }

    #[test]
    fn font_providers() {
        assert!(is_font_provider("https://fonts.googleapis.com/css?family=Roboto"));
        assert!(!is_font_provider("https://fonts.googleapis.com.evil.test/x.css"));
        assert!(!is_font_provider("/static/site.css"));
    }
}
