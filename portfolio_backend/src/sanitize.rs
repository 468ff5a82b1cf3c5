//! HTML allow-list applied to user-supplied rich text before it is stored.

use ammonia::{Builder, UrlRelative};
use std::collections::{HashMap, HashSet};

pub const ALLOWED_TAGS: [&str; 10] = ["b", "i", "em", "strong", "a", "p", "br", "ul", "ol", "li"];

pub const ALLOWED_URL_SCHEMES: [&str; 2] = ["http", "https"];

/// Tags removed together with everything inside them.
const STRIPPED_WITH_CONTENT: [&str; 2] = ["script", "style"];

fn policy() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.into_iter().collect())
        .clean_content_tags(STRIPPED_WITH_CONTENT.into_iter().collect())
        .generic_attributes(HashSet::new())
        .tag_attributes(HashMap::from([("a", HashSet::from(["href"]))]))
        .url_schemes(ALLOWED_URL_SCHEMES.into_iter().collect())
        .url_relative(UrlRelative::PassThrough)
        .link_rel(None);
    builder
}

/// Reduces arbitrary markup to the allow-listed tags, keeps only `href` on
/// anchors and drops any `href` whose scheme is not http(s). Relative links
/// pass through unchanged.
pub fn sanitize_html(input: &str) -> String {
    policy().clean(input).to_string()
}

/// Strips every tag, dropping script and style content, and returns the
/// remaining text unescaped.
pub fn plain_text(input: &str) -> String {
    let mut builder = Builder::empty();
    builder.clean_content_tags(STRIPPED_WITH_CONTENT.into_iter().collect());
    builder
        .clean(input)
        .to_string()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

/// Escapes text for inclusion in an HTML document.
pub fn escape_text(input: &str) -> String {
    ammonia::clean_text(input)
}
