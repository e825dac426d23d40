//! Link extraction and rendering.
//!
//! Internal targets (relative paths, or the host page's own host) become
//! navigation buttons carrying an in-app route; everything else becomes a
//! new-tab anchor.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use super::RenderOptions;
use super::escape_html;
use super::placeholders::{PlaceholderTable, TokenKind};

static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s<)\]\x{E000}\x{E001}]+").expect("valid bare url regex")
});

const LIST_ICON: &str = r#"<svg viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><line x1="8" y1="6" x2="21" y2="6"></line><line x1="8" y1="12" x2="21" y2="12"></line><line x1="8" y1="18" x2="21" y2="18"></line><line x1="3" y1="6" x2="3.01" y2="6"></line><line x1="3" y1="12" x2="3.01" y2="12"></line><line x1="3" y1="18" x2="3.01" y2="18"></line></svg>"#;
const DOCUMENT_ICON: &str = r#"<svg viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><path d="M14 2H6a2 2 0 0 0-2 2v16a2 2 0 0 0 2 2h12a2 2 0 0 0 2-2V8z"></path><polyline points="14 2 14 8 20 8"></polyline></svg>"#;

/// Schemes an external anchor may point at.
const LINKABLE_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Replaces `[text](url)` links, then bare `http(s)://` URLs, with tokens.
pub fn extract_links(text: &str, options: &RenderOptions, table: &mut PlaceholderTable) -> String {
    let text = MARKDOWN_LINK_RE.replace_all(text, |caps: &Captures<'_>| {
        table.insert(TokenKind::Url, render_link(&caps[2], &caps[1], options))
    });
    BARE_URL_RE
        .replace_all(&text, |caps: &Captures<'_>| {
            table.insert(TokenKind::Url, render_link(&caps[0], &caps[0], options))
        })
        .into_owned()
}

/// Whether `url` points into the host application.
pub fn is_internal_url(url: &str, page_origin: Option<&Url>) -> bool {
    if url.starts_with('/') {
        return true;
    }
    let Some(origin) = page_origin else {
        return false;
    };
    match origin.join(url) {
        Ok(resolved) => resolved.host_str().is_some() && resolved.host_str() == origin.host_str(),
        Err(_) => false,
    }
}

/// In-app route for an internal URL: path, query and fragment, with the
/// route prefix (or a bare leading `/`) removed.
pub fn route_for(url: &str, route_prefix: &str) -> String {
    let mut path = url.to_string();
    if url.starts_with("http")
        && let Ok(parsed) = Url::parse(url)
    {
        path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }
        if let Some(fragment) = parsed.fragment() {
            path.push('#');
            path.push_str(fragment);
        }
    }

    if !route_prefix.is_empty()
        && let Some(rest) = path.strip_prefix(route_prefix)
    {
        return rest.to_string();
    }
    path.strip_prefix('/').map_or(path.clone(), str::to_string)
}

/// Renders one link. `text` is raw and gets escaped here.
pub fn render_link(url: &str, text: &str, options: &RenderOptions) -> String {
    let display = escape_html(text);

    if is_internal_url(url, options.page_origin.as_ref()) {
        let icon = if url.to_lowercase().contains("list") {
            LIST_ICON
        } else {
            DOCUMENT_ICON
        };
        return format!(
            r#"<button type="button" class="chatz-internal-link-btn" data-route="{route}" title="{title}">{icon}<span>{display}</span></button>"#,
            route = escape_html(&route_for(url, &options.route_prefix)),
            title = escape_html(url),
        );
    }

    if !is_linkable(url) {
        return display;
    }

    format!(
        r#"<a href="{href}" target="_blank" rel="noopener noreferrer" class="chatz-external-link">{display}</a>"#,
        href = escape_html(url),
    )
}

/// Rejects script-capable schemes such as `javascript:`.
fn is_linkable(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => LINKABLE_SCHEMES.contains(&parsed.scheme()),
        // Relative references without a base have no scheme to abuse.
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(origin: Option<&str>) -> RenderOptions {
        RenderOptions {
            page_origin: origin.map(|o| Url::parse(o).unwrap()),
            ..RenderOptions::default()
        }
    }

    #[test]
    fn test_is_internal_url() {
        let origin = Url::parse("https://erp.example.com/app/home").unwrap();
        assert!(is_internal_url("/app/todo", None));
        assert!(is_internal_url("https://erp.example.com/app/todo", Some(&origin)));
        assert!(is_internal_url("todo/1", Some(&origin)));
        assert!(!is_internal_url("https://other.example.com/x", Some(&origin)));
        assert!(!is_internal_url("https://erp.example.com/x", None));
        assert!(!is_internal_url("mailto:a@b.c", Some(&origin)));
    }

    #[test]
    fn test_route_for() {
        assert_eq!(route_for("/app/some-doc", "/app/"), "some-doc");
        assert_eq!(route_for("/desk/x", "/app/"), "desk/x");
        assert_eq!(
            route_for("https://erp.example.com/app/sales-invoice?status=Paid#top", "/app/"),
            "sales-invoice?status=Paid#top"
        );
        assert_eq!(route_for("relative", "/app/"), "relative");
    }

    #[test]
    fn test_internal_link_button() {
        let html = render_link("/app/customer/list", "Customers & more", &options(None));
        assert!(html.starts_with(
            r#"<button type="button" class="chatz-internal-link-btn" data-route="customer/list" title="/app/customer/list">"#
        ));
        assert!(html.contains(LIST_ICON));
        assert!(html.ends_with("<span>Customers &amp; more</span></button>"));
    }

    #[test]
    fn test_document_icon_when_not_a_list() {
        let html = render_link("/app/todo/1", "Todo", &options(None));
        assert!(html.contains(DOCUMENT_ICON));
    }

    #[test]
    fn test_external_link_escapes_href() {
        let html = render_link("https://example.com/?a=1&b=\"2\"", "x", &options(None));
        assert_eq!(
            html,
            r#"<a href="https://example.com/?a=1&amp;b=&quot;2&quot;" target="_blank" rel="noopener noreferrer" class="chatz-external-link">x</a>"#
        );
    }

    #[test]
    fn test_script_scheme_is_not_linked() {
        assert_eq!(
            render_link("javascript:alert(1)", "<b>click</b>", &options(None)),
            "&lt;b&gt;click&lt;/b&gt;"
        );
    }

    #[test]
    fn test_bare_url_stops_at_delimiters() {
        let mut table = PlaceholderTable::new();
        let out = extract_links("see https://a.io/x) and (https://b.io]", &options(None), &mut table);
        assert_eq!(table.len(), 2);
        assert!(out.contains(") and ("));
        assert!(out.ends_with(']'));
    }

    #[test]
    fn test_markdown_link_consumes_its_url() {
        let mut table = PlaceholderTable::new();
        let out = extract_links("[docs](https://docs.rs)", &options(None), &mut table);
        assert_eq!(table.len(), 1);
        let html = table.restore(&out, TokenKind::Url);
        assert!(html.contains(">docs</a>"));
    }
}
