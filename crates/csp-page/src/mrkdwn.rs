//! Slack mrkdwn → sanitized HTML.
//!
//! Slack's dialect differs from Markdown: `*bold*`, `_italic_`, `~strike~`,
//! and links are written `<url|label>`. The pipeline is:
//!
//! 1. Undo Slack's entity escaping (`&lt;`, `&gt;`, `&amp;`)
//! 2. Protect code spans/fences and links from the inline passes
//! 3. Inline passes: bold, then italic, then strikethrough
//! 4. Restore protected spans, render with pulldown-cmark
//! 5. Sanitize with ammonia; nothing reaches the page unsanitized

use once_cell::sync::Lazy;
use pulldown_cmark::{html, Event, Options, Parser};
use regex::{Captures, Regex};

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(.*?)```").expect("code fence regex"));
static RE_INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("inline code regex"));
static RE_LABELED_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<((?:https?://|mailto:)[^|>\s]+)\|([^>]+)>").expect("labeled link regex")
});
static RE_BARE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<((?:https?://|mailto:)[^|>\s]+)>").expect("bare link regex"));
static RE_CHANNEL_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#[A-Z0-9]+\|([^>]+)>").expect("channel ref regex"));
static RE_SPECIAL_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<!(here|channel|everyone)(?:\|[^>]*)?>").expect("special mention regex")
});

// Delimiters must hug non-space text and follow a non-word boundary,
// so `1 * 2 * 3` and `snake_case` are left alone.
static RE_BOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w*])\*([^\s*](?:[^*\n]*?[^\s*])?)\*").expect("bold regex")
});
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w_])_([^\s_](?:[^_\n]*?[^\s_])?)_").expect("italic regex")
});
static RE_STRIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w~])~([^\s~](?:[^~\n]*?[^\s~])?)~").expect("strike regex")
});

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x00(\d+)\x00").expect("placeholder regex"));

/// Render a Slack message body to sanitized HTML.
pub fn render(text: &str) -> String {
    let text = unescape(text);

    let mut protected: Vec<String> = Vec::new();
    let mut stash = |s: String| {
        let idx = protected.len();
        protected.push(s);
        format!("\x00{idx}\x00")
    };

    let text = RE_CODE_FENCE.replace_all(&text, |caps: &Captures| {
        stash(format!("\n```\n{}\n```\n", caps[1].trim_matches('\n')))
    });
    let text = RE_INLINE_CODE.replace_all(&text, |caps: &Captures| stash(caps[0].to_string()));
    let text = RE_LABELED_LINK.replace_all(&text, |caps: &Captures| {
        stash(anchor(&caps[1], &caps[2]))
    });
    let text = RE_BARE_LINK.replace_all(&text, |caps: &Captures| {
        let url = &caps[1];
        stash(anchor(url, url.strip_prefix("mailto:").unwrap_or(url)))
    });
    let text = RE_CHANNEL_REF.replace_all(&text, "#$1");
    let text = RE_SPECIAL_MENTION.replace_all(&text, "@$1");

    let text = RE_BOLD.replace_all(&text, "$1<strong>$2</strong>");
    let text = RE_ITALIC.replace_all(&text, "$1<em>$2</em>");
    let text = RE_STRIKE.replace_all(&text, "$1<del>$2</del>");

    let text = RE_PLACEHOLDER.replace_all(&text, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| protected.get(i))
            .cloned()
            .unwrap_or_default()
    });

    ammonia::clean(&markdown_to_html(&text))
}

/// Slack escapes exactly these three characters.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn anchor(href: &str, label: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, escape_html(href), escape_html(label))
}

/// CommonMark rendering. Newlines in Slack are line breaks, not soft wraps.
fn markdown_to_html(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::empty()).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_brackets_stay_escaped() {
        assert_eq!(render("<>"), "<p>&lt;&gt;</p>\n");
    }

    #[test]
    fn test_already_escaped_input() {
        let html = render("Test String 03: Hello &lt; World.");
        assert_eq!(html, "<p>Test String 03: Hello &lt; World.</p>\n");
    }

    #[test]
    fn test_plain_text_is_paragraph_wrapped() {
        assert_eq!(render("database maintenance tonight"), "<p>database maintenance tonight</p>\n");
    }

    #[test]
    fn test_bold_italic_strike() {
        let html = render("*down* and _slow_ and ~fixed~");
        assert!(html.contains("<strong>down</strong>"));
        assert!(html.contains("<em>slow</em>"));
        assert!(html.contains("<del>fixed</del>"));
    }

    #[test]
    fn test_bold_inside_italic() {
        let html = render("_very *bad* day_");
        assert!(html.contains("<em>very <strong>bad</strong> day</em>"));
    }

    #[test]
    fn test_arithmetic_and_snake_case_untouched() {
        assert_eq!(render("1 * 2 * 3"), "<p>1 * 2 * 3</p>\n");
        assert_eq!(render("run snake_case_name"), "<p>run snake_case_name</p>\n");
    }

    #[test]
    fn test_labeled_link() {
        let html = render("see <https://status.example.com/_x_y_|the docs>");
        assert!(html.contains(r#"href="https://status.example.com/_x_y_""#));
        assert!(html.contains(">the docs</a>"));
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn test_bare_and_mailto_links() {
        let html = render("<https://example.com> or <mailto:ops@example.com>");
        assert!(html.contains(r#"href="https://example.com""#));
        assert!(html.contains(">https://example.com</a>"));
        assert!(html.contains(r#"href="mailto:ops@example.com""#));
        assert!(html.contains(">ops@example.com</a>"));
    }

    #[test]
    fn test_escaped_link_is_unescaped_first() {
        let html = render("&lt;https://example.com|site&gt;");
        assert!(html.contains(r#"<a href="https://example.com""#));
    }

    #[test]
    fn test_javascript_links_are_not_links() {
        let html = render("<javascript:alert(1)|click>");
        assert!(!html.contains("href"));
    }

    #[test]
    fn test_code_is_protected() {
        let html = render("run `rm *all* files` now");
        assert!(html.contains("<code>rm *all* files</code>"));
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn test_code_fence() {
        let html = render("```let x = *y*;```");
        assert!(html.contains("<pre><code>let x = *y*;\n</code></pre>"));
    }

    #[test]
    fn test_script_is_stripped() {
        let html = render("&lt;script&gt;alert('x')&lt;/script&gt; hi");
        assert!(!html.contains("<script"));
        assert!(!html.contains("alert"));
    }

    #[test]
    fn test_event_handlers_are_stripped() {
        let html = render(r#"<img src="x" onerror="alert(1)">"#);
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn test_channel_refs_and_here() {
        let html = render("<!here> see <#C123|ops>");
        assert_eq!(html, "<p>@here see #ops</p>\n");
    }

    #[test]
    fn test_newlines_become_breaks() {
        let html = render("line one\nline two");
        assert!(html.contains("<br>"));
    }
}
