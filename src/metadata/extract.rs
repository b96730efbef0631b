use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::metadata::types::{BodyKind, FetchError, IconCandidate};

/// Synthetic size for conventional `/favicon.*` fallbacks.
const CONVENTIONAL_ICON_SIZE: u32 = 32;

/// Size hint for the favicon-service fallback URL.
pub const FAVICON_SERVICE_SIZE: u32 = 128;

const FAVICON_SERVICE_BASE: &str = "https://www.google.com/s2/favicons";

/// Short TLDs that read as part of the name ("Example IO") rather than noise.
const UPPERCASE_TLDS: [&str; 7] = ["ai", "io", "tv", "fm", "so", "app", "dev"];

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("static selector"));
static OG_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("static selector"));
static TWITTER_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="twitter:title"]"#).expect("static selector"));
static MANIFEST_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="manifest"]"#).expect("static selector"));
// rel is a token list, so `~=` catches "shortcut icon" through its "icon" token
static ICON_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"link[rel~="icon"], link[rel~="apple-touch-icon"], link[rel~="apple-touch-icon-precomposed"], link[rel~="mask-icon"]"#,
    )
    .expect("static selector")
});

/// Readability proxies flatten the page to text but keep a `Title:` line.
static READABLE_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|\n)\s*Title:\s*([^\n]+)").expect("static regex"));

/// Title precedence: `<title>` → readable-text `Title:` line (text-proxy
/// bodies only) → og:title → twitter:title → hostname-derived.
pub fn extract_title(doc: &Html, page_url: &Url, raw_text: &str, kind: BodyKind) -> String {
    let mut raw_title = doc
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    if raw_title.is_empty() && kind == BodyKind::ReadableText {
        if let Some(caps) = READABLE_TITLE_RE.captures(raw_text) {
            raw_title = caps[1].trim().to_string();
            log::debug!("extracted title from readable text: {raw_title}");
        }
    }

    if !raw_title.is_empty() {
        return raw_title;
    }

    meta_content(doc, &OG_TITLE_SELECTOR)
        .or_else(|| meta_content(doc, &TWITTER_TITLE_SELECTOR))
        .unwrap_or_else(|| pretty_title_from_hostname(page_url.host_str().unwrap_or_default()))
}

fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    let content = doc.select(selector).next()?.value().attr("content")?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `sub.example.io` → `Example IO`, `example.com` → `Example`. Second-level
/// domain capitalized, dashes and underscores turned into word breaks.
pub fn pretty_title_from_hostname(hostname: &str) -> String {
    let parts: Vec<&str> = hostname.split('.').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return hostname.to_string();
    }
    let tld = parts[parts.len() - 1].to_lowercase();
    let sld = if parts.len() >= 2 {
        parts[parts.len() - 2]
    } else {
        parts[0]
    };
    let pretty = capitalize_words(sld);
    if UPPERCASE_TLDS.contains(&tld.as_str()) {
        format!("{pretty} {}", tld.to_uppercase()).trim().to_string()
    } else {
        pretty
    }
}

fn capitalize_words(s: &str) -> String {
    s.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Max dimension across `WxH` tokens ("192x192 512x512" → 512). Malformed
/// tokens are skipped, never fatal.
pub fn parse_size(sizes_attr: &str) -> u32 {
    sizes_attr
        .split_whitespace()
        .filter_map(|token| {
            let (w, h) = token.split_once(['x', 'X'])?;
            let w: u32 = w.trim().parse().ok()?;
            let h: u32 = h.trim().parse().ok()?;
            Some(w.max(h))
        })
        .max()
        .unwrap_or(0)
}

/// Rel preference. The classic `shortcut icon` pair outranks everything; a
/// bare rel value still beats no rel at all.
pub fn rel_score(rel: &str) -> u32 {
    let tokens: Vec<String> = rel
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return 0;
    }
    let has = |needle: &str| tokens.iter().any(|t| t == needle);
    if has("icon") && has("shortcut") {
        return 100;
    }
    if has("icon") {
        return 80;
    }
    if has("apple-touch-icon") || has("apple-touch-icon-precomposed") {
        return 60;
    }
    if has("mask-icon") {
        return 40;
    }
    10
}

/// Format preference, judged from a MIME type or the URL itself.
pub fn file_type_score(url_or_type: &str) -> u32 {
    let u = url_or_type.to_lowercase();
    if u.contains("image/svg") || u.ends_with(".svg") {
        return 40;
    }
    if u.contains("image/png") || u.ends_with(".png") {
        return 20;
    }
    if u.contains("image/x-icon") || u.ends_with(".ico") {
        return 10;
    }
    0
}

/// Resolves `href` against `base` and appends an unscored candidate.
/// Unresolvable references are dropped, never stored as empty entries.
fn push_candidate(out: &mut Vec<IconCandidate>, base: &Url, href: &str, size: u32) {
    if let Ok(abs) = base.join(href) {
        out.push(IconCandidate {
            url: abs.to_string(),
            size,
            rel_score: 0,
            file_type_score: 0,
        });
    }
}

fn push_candidate_with_meta(
    out: &mut Vec<IconCandidate>,
    base: &Url,
    href: &str,
    size: u32,
    rel: &str,
    mime: &str,
) {
    if let Ok(abs) = base.join(href) {
        let type_hint = if mime.is_empty() { abs.as_str() } else { mime };
        out.push(IconCandidate {
            url: abs.to_string(),
            size,
            rel_score: rel_score(rel),
            file_type_score: file_type_score(type_hint),
        });
    }
}

/// `<link rel>` icon candidates of a document, resolved against `base`.
pub fn link_icon_candidates(doc: &Html, base: &Url) -> Vec<IconCandidate> {
    let mut out = Vec::new();
    for link in doc.select(&ICON_LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let size = parse_size(link.value().attr("sizes").unwrap_or_default());
        let rel = link.value().attr("rel").unwrap_or_default();
        let mime = link.value().attr("type").unwrap_or_default();
        push_candidate_with_meta(&mut out, base, href, size, rel, mime);
    }
    out
}

/// Web-app manifest location declared by the page, if any.
pub fn manifest_url(doc: &Html, base: &Url) -> Option<Url> {
    let href = doc.select(&MANIFEST_SELECTOR).next()?.value().attr("href")?;
    base.join(href).ok()
}

/// Icon entries of a fetched manifest. Manifest icons carry no rel
/// attribute, so they compete on size alone.
pub fn manifest_icon_candidates(
    manifest_text: &str,
    manifest_url: &Url,
) -> Result<Vec<IconCandidate>, FetchError> {
    let value: serde_json::Value = serde_json::from_str(manifest_text)
        .map_err(|err| FetchError::ManifestParse(err.to_string()))?;

    let mut out = Vec::new();
    if let Some(icons) = value.get("icons").and_then(|v| v.as_array()) {
        for icon in icons {
            let Some(src) = icon.get("src").and_then(|v| v.as_str()) else {
                continue;
            };
            let size = icon
                .get("sizes")
                .and_then(|v| v.as_str())
                .map(parse_size)
                .unwrap_or(0);
            push_candidate(&mut out, manifest_url, src, size);
        }
    }
    Ok(out)
}

/// Conventional favicon filenames at the site root, tried blind when nothing
/// else turned up.
pub fn conventional_candidates(base: &Url) -> Vec<IconCandidate> {
    let mut out = Vec::new();
    for name in [
        "/favicon.ico",
        "/favicon.png",
        "/favicon.jpg",
        "/favicon.jpeg",
        "/favicon.svg",
    ] {
        push_candidate(&mut out, base, name, CONVENTIONAL_ICON_SIZE);
    }
    out
}

/// Score descending, ties broken by size descending; pooled order never
/// matters beyond that.
pub fn select_best(mut candidates: Vec<IconCandidate>) -> Option<String> {
    candidates.sort_by(|a, b| {
        b.score()
            .cmp(&a.score())
            .then_with(|| b.size.cmp(&a.size))
    });
    candidates.into_iter().next().map(|c| c.url)
}

pub fn favicon_service_url(hostname: &str, size: u32) -> String {
    format!("{FAVICON_SERVICE_BASE}?domain={hostname}&sz={size}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://sub.example.io/articles/1").unwrap()
    }

    #[test]
    fn parse_size_picks_largest_dimension() {
        assert_eq!(parse_size("192x192 512x512"), 512);
        assert_eq!(parse_size("16x32"), 32);
    }

    #[test]
    fn parse_size_ignores_malformed_tokens() {
        assert_eq!(parse_size("bogus"), 0);
        assert_eq!(parse_size("any"), 0);
        assert_eq!(parse_size("junk 64x64 wat"), 64);
    }

    #[test]
    fn rel_scoring_matches_policy() {
        assert_eq!(rel_score("shortcut icon"), 100);
        assert_eq!(rel_score("icon"), 80);
        assert_eq!(rel_score("ICON"), 80);
        assert_eq!(rel_score("apple-touch-icon"), 60);
        assert_eq!(rel_score("apple-touch-icon-precomposed"), 60);
        assert_eq!(rel_score("mask-icon"), 40);
        assert_eq!(rel_score("stylesheet"), 10);
        assert_eq!(rel_score(""), 0);
    }

    #[test]
    fn file_type_scoring_accepts_urls_and_mime_types() {
        assert_eq!(file_type_score("https://x.example/icon.svg"), 40);
        assert_eq!(file_type_score("image/svg+xml"), 40);
        assert_eq!(file_type_score("image/png"), 20);
        assert_eq!(file_type_score("https://x.example/favicon.ico"), 10);
        assert_eq!(file_type_score("image/x-icon"), 10);
        assert_eq!(file_type_score("https://x.example/logo.gif"), 0);
    }

    #[test]
    fn rel_preference_is_a_total_order_over_size() {
        // "icon shortcut" outranks apple-touch-icon regardless of size
        let candidates = vec![
            IconCandidate {
                url: "https://x.example/apple.png".into(),
                size: 512,
                rel_score: rel_score("apple-touch-icon"),
                file_type_score: 0,
            },
            IconCandidate {
                url: "https://x.example/fav.ico".into(),
                size: 16,
                rel_score: rel_score("icon shortcut"),
                file_type_score: 0,
            },
        ];
        assert_eq!(
            select_best(candidates).unwrap(),
            "https://x.example/fav.ico"
        );
    }

    #[test]
    fn same_rel_ties_break_on_size() {
        let make = |url: &str, size| IconCandidate {
            url: url.into(),
            size,
            rel_score: 80,
            file_type_score: 0,
        };
        let candidates = vec![
            make("https://x.example/small.png", 192),
            make("https://x.example/large.png", 512),
        ];
        assert_eq!(
            select_best(candidates).unwrap(),
            "https://x.example/large.png"
        );
    }

    #[test]
    fn pretty_title_uppercases_short_tlds() {
        assert_eq!(pretty_title_from_hostname("sub.example.io"), "Example IO");
        assert_eq!(pretty_title_from_hostname("example.com"), "Example");
        assert_eq!(pretty_title_from_hostname("my-cool_site.dev"), "My Cool Site DEV");
        assert_eq!(pretty_title_from_hostname("localhost"), "Localhost");
        assert_eq!(pretty_title_from_hostname(""), "");
    }

    #[test]
    fn title_prefers_title_tag() {
        let doc = Html::parse_document(
            r#"<head><title> The Page </title><meta property="og:title" content="OG"></head>"#,
        );
        assert_eq!(
            extract_title(&doc, &page_url(), "", BodyKind::Html),
            "The Page"
        );
    }

    #[test]
    fn title_falls_through_og_then_twitter() {
        let doc = Html::parse_document(
            r#"<head><meta name="twitter:title" content="TW"></head>"#,
        );
        assert_eq!(extract_title(&doc, &page_url(), "", BodyKind::Html), "TW");

        let doc = Html::parse_document(
            r#"<head><meta property="og:title" content="OG"><meta name="twitter:title" content="TW"></head>"#,
        );
        assert_eq!(extract_title(&doc, &page_url(), "", BodyKind::Html), "OG");
    }

    #[test]
    fn readable_text_title_line_is_used_for_text_bodies_only() {
        let doc = Html::parse_document("<p>no title here</p>");
        let raw = "Some preamble\n  Title: Readable Title\nMore text";
        assert_eq!(
            extract_title(&doc, &page_url(), raw, BodyKind::ReadableText),
            "Readable Title"
        );
        // an html body ignores the raw-text pattern
        assert_eq!(
            extract_title(&doc, &page_url(), raw, BodyKind::Html),
            "Example IO"
        );
    }

    #[test]
    fn title_falls_back_to_hostname() {
        let doc = Html::parse_document("<p>nothing</p>");
        assert_eq!(
            extract_title(&doc, &page_url(), "", BodyKind::Html),
            "Example IO"
        );
    }

    #[test]
    fn link_candidates_resolve_relative_hrefs() {
        let doc = Html::parse_document(
            r#"<head>
                <link rel="icon" href="/fav.png" sizes="32x32">
                <link rel="shortcut icon" href="fav.ico">
                <link rel="apple-touch-icon" href="https://cdn.example.com/touch.png" sizes="180x180">
            </head>"#,
        );
        let candidates = link_icon_candidates(&doc, &page_url());
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].url, "https://sub.example.io/fav.png");
        assert_eq!(candidates[1].url, "https://sub.example.io/articles/fav.ico");
        assert_eq!(candidates[1].rel_score, 100);
        assert_eq!(candidates[2].url, "https://cdn.example.com/touch.png");
        assert_eq!(candidates[2].size, 180);
    }

    #[test]
    fn link_candidates_skip_missing_href() {
        let doc = Html::parse_document(r#"<head><link rel="icon"></head>"#);
        assert!(link_icon_candidates(&doc, &page_url()).is_empty());
    }

    #[test]
    fn manifest_icons_score_on_size_only() {
        let manifest_url = Url::parse("https://sub.example.io/site.webmanifest").unwrap();
        let manifest = r#"{"icons":[
            {"src": "icon-192.png", "sizes": "192x192"},
            {"src": "/icon-512.png", "sizes": "512x512"},
            {"sizes": "64x64"}
        ]}"#;
        let candidates = manifest_icon_candidates(manifest, &manifest_url).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://sub.example.io/icon-192.png");
        assert_eq!(candidates[1].size, 512);
        assert_eq!(candidates[1].rel_score, 0);
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let manifest_url = Url::parse("https://sub.example.io/site.webmanifest").unwrap();
        assert!(matches!(
            manifest_icon_candidates("not json", &manifest_url),
            Err(FetchError::ManifestParse(_))
        ));
    }

    #[test]
    fn manifest_without_icons_contributes_nothing() {
        let manifest_url = Url::parse("https://sub.example.io/site.webmanifest").unwrap();
        let candidates = manifest_icon_candidates(r#"{"name": "App"}"#, &manifest_url).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn conventional_candidates_cover_the_usual_names() {
        let candidates = conventional_candidates(&page_url());
        assert_eq!(candidates.len(), 5);
        assert!(candidates
            .iter()
            .all(|c| c.url.starts_with("https://sub.example.io/favicon.")));
        assert!(candidates.iter().all(|c| c.size == 32 && c.score() == 0));
    }

    #[test]
    fn favicon_service_url_shape() {
        assert_eq!(
            favicon_service_url("example.com", 128),
            "https://www.google.com/s2/favicons?domain=example.com&sz=128"
        );
    }

    #[test]
    fn select_best_of_empty_pool_is_none() {
        assert_eq!(select_best(Vec::new()), None);
    }
}
