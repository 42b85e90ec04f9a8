//! HTML and CSS minification.
//!
//! Both run through `minify_html`. Stylesheets are wrapped in a `<style>`
//! element so the embedded CSS minifier handles them.

use std::borrow::Cow;

/// Output minifier, a no-op when minification is disabled.
#[derive(Debug, Clone, Copy)]
pub struct Minifier {
    enabled: bool,
}

impl Minifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn html<'a>(&self, html: &'a str) -> Cow<'a, str> {
        if !self.enabled {
            return Cow::Borrowed(html);
        }
        let minified = minify_html::minify(html.as_bytes(), &html_cfg());
        match String::from_utf8(minified) {
            Ok(s) => Cow::Owned(s),
            Err(_) => Cow::Borrowed(html),
        }
    }

    pub fn css<'a>(&self, css: &'a str) -> Cow<'a, str> {
        if !self.enabled {
            return Cow::Borrowed(css);
        }
        let wrapped = format!("<style>{css}</style>");
        let minified = minify_html::minify(wrapped.as_bytes(), &css_cfg());
        let Ok(result) = String::from_utf8(minified) else {
            return Cow::Borrowed(css);
        };
        match result
            .strip_prefix("<style>")
            .and_then(|s| s.strip_suffix("</style>"))
        {
            Some(inner) => Cow::Owned(inner.to_string()),
            None => Cow::Borrowed(css),
        }
    }
}

fn html_cfg() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = false;
    cfg
}

fn css_cfg() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    cfg.minify_css = true;
    cfg
}
