//! IndieAuth / Micropub endpoint discovery
//!
//! A user's identifier URL advertises the servers that act on its behalf.
//! Discovery fetches the identifier and looks for three relations:
//!
//! | `rel` value              | Meaning                                  |
//! |--------------------------|------------------------------------------|
//! | `authorization_endpoint` | Authenticates the user, issues codes     |
//! | `token_endpoint`         | Exchanges codes for access tokens        |
//! | `micropub`               | Resource the access token is valid for   |
//!
//! # Discovery sequence
//!
//! 1. `GET` the identifier. A non-2xx status or a transport failure yields an
//!    empty [`EndpointSet`]; callers decide how to react.
//! 2. Each relation is looked up in the HTTP `Link` headers first.
//! 3. Relations still missing are looked up in the HTML body's `<link>`
//!    elements.
//!
//! Relations are resolved independently, so partial discovery is normal. Each
//! value is resolved against the identifier URL and kept only if the result
//! is an `http` or `https` URL.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::http::{HttpClient, HttpResponse};

/// `rel` value advertising the authorization endpoint.
pub const REL_AUTHORIZATION_ENDPOINT: &str = "authorization_endpoint";

/// `rel` value advertising the token endpoint.
pub const REL_TOKEN_ENDPOINT: &str = "token_endpoint";

/// `rel` value advertising the Micropub resource endpoint.
pub const REL_MICROPUB: &str = "micropub";

// ---------------------------------------------------------------------------
// EndpointSet
// ---------------------------------------------------------------------------

/// The endpoints discovered for one identifier.
///
/// # Examples
///
/// ```
/// use indieauth_client::auth::discovery::EndpointSet;
///
/// let endpoints = EndpointSet {
///     authorization_endpoint: Some("https://auth.example/a".to_string()),
///     ..Default::default()
/// };
///
/// assert!(!endpoints.is_empty());
/// assert!(!endpoints.supports_micropub());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    /// Where the user is sent to sign in and where codes are verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Where authorization codes are exchanged for access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// The Micropub endpoint the issued token is meant for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub micropub_endpoint: Option<String>,
}

impl EndpointSet {
    /// Returns `true` when no endpoint was discovered.
    pub fn is_empty(&self) -> bool {
        self.authorization_endpoint.is_none()
            && self.token_endpoint.is_none()
            && self.micropub_endpoint.is_none()
    }

    /// Returns `true` when both endpoints needed for a token exchange exist.
    pub fn supports_micropub(&self) -> bool {
        self.token_endpoint.is_some() && self.micropub_endpoint.is_some()
    }

    /// Drops every endpoint that is not an `https` URL.
    pub fn require_https(mut self) -> Self {
        for slot in [
            &mut self.authorization_endpoint,
            &mut self.token_endpoint,
            &mut self.micropub_endpoint,
        ] {
            if slot.as_deref().is_some_and(|u| !u.starts_with("https://")) {
                tracing::warn!(endpoint = ?slot, "dropping non-https endpoint");
                *slot = None;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Fetches `me` and extracts its advertised endpoints.
///
/// Never fails: an unreachable identifier, a non-2xx response, or a page
/// without any advertised relation all produce an empty [`EndpointSet`].
///
/// # Examples
///
/// ```no_run
/// use indieauth_client::auth::discovery::discover_endpoints;
/// use indieauth_client::auth::http::ReqwestHttpClient;
///
/// # async fn example() {
/// let http = ReqwestHttpClient::new(reqwest::Client::new());
/// let endpoints = discover_endpoints(&http, "https://alice.example/").await;
/// println!("{:?}", endpoints.authorization_endpoint);
/// # }
/// ```
pub async fn discover_endpoints(http: &dyn HttpClient, me: &str) -> EndpointSet {
    let resp = match http.get(me).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(me, error = %e, "endpoint discovery request failed");
            return EndpointSet::default();
        }
    };

    if !resp.is_success() {
        tracing::debug!(me, status = resp.status, "identifier returned non-success status");
        return EndpointSet::default();
    }

    let endpoints = extract_endpoints(me, &resp);
    tracing::debug!(me, ?endpoints, "endpoint discovery complete");
    endpoints
}

/// Extracts endpoints from an already fetched response.
///
/// `Link` headers take precedence over HTML `<link>` elements for the same
/// relation. The body is only scanned when a relation is still missing.
pub fn extract_endpoints(base_url: &str, resp: &HttpResponse) -> EndpointSet {
    let base = Url::parse(base_url).ok();

    let mut header_links = Vec::new();
    for value in resp.header_values("link") {
        header_links.extend(parse_link_header(value));
    }

    let mut html_links: Option<Vec<(Vec<String>, String)>> = None;
    let mut lookup = |rel: &str| -> Option<String> {
        let raw = find_rel(&header_links, rel).or_else(|| {
            let links = html_links.get_or_insert_with(|| parse_html_links(&resp.body));
            find_rel(links, rel)
        })?;
        resolve_endpoint(base.as_ref(), &raw)
    };

    EndpointSet {
        authorization_endpoint: lookup(REL_AUTHORIZATION_ENDPOINT),
        token_endpoint: lookup(REL_TOKEN_ENDPOINT),
        micropub_endpoint: lookup(REL_MICROPUB),
    }
}

/// Returns the first target whose rel list contains `rel`.
fn find_rel(links: &[(Vec<String>, String)], rel: &str) -> Option<String> {
    links
        .iter()
        .find(|(rels, _)| rels.iter().any(|r| r.eq_ignore_ascii_case(rel)))
        .map(|(_, target)| target.clone())
}

/// Resolves a raw link target against the identifier URL.
///
/// Returns `None` for empty targets and for anything that does not resolve to
/// an `http` or `https` URL (e.g. `javascript:` or `data:` targets).
fn resolve_endpoint(base: Option<&Url>, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        other => {
            tracing::warn!(scheme = other, "ignoring endpoint with unsupported scheme");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Link header parsing (RFC 8288)
// ---------------------------------------------------------------------------

/// Parses one `Link` header value into `(rels, target)` pairs.
///
/// Handles several comma-separated links, quoted and unquoted `rel`
/// parameters, and space-separated rel lists. Commas inside `<...>` or quoted
/// strings do not split links.
fn parse_link_header(value: &str) -> Vec<(Vec<String>, String)> {
    let mut links = Vec::new();

    for link in split_outside(value, ',') {
        let link = link.trim();
        let Some(rest) = link.strip_prefix('<') else {
            continue;
        };
        let Some(end) = rest.find('>') else {
            continue;
        };
        let target = rest[..end].trim().to_string();
        let params = &rest[end + 1..];

        let mut rels = Vec::new();
        for param in split_outside(params, ';') {
            let Some((name, val)) = param.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            let val = val.trim().trim_matches('"');
            rels.extend(val.split_whitespace().map(str::to_string));
        }

        if !rels.is_empty() {
            links.push((rels, target));
        }
    }

    links
}

/// Splits `s` on `sep`, ignoring separators inside `<...>` or double quotes.
fn split_outside(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_angle = false;
    let mut in_quote = false;

    for (i, c) in s.char_indices() {
        match c {
            '"' if !in_angle => in_quote = !in_quote,
            '<' if !in_quote => in_angle = true,
            '>' if !in_quote => in_angle = false,
            c if c == sep && !in_angle && !in_quote => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

// ---------------------------------------------------------------------------
// HTML <link> scanning
// ---------------------------------------------------------------------------

fn link_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b([^>]*)>").expect("link tag pattern is valid"))
}

/// Comments and raw-text elements whose contents are not markup.
fn inert_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<template\b[^>]*>.*?</template\s*>",
        )
        .expect("inert block pattern is valid")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z][a-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("attribute pattern is valid")
    })
}

/// Collects `(rels, href)` pairs from every `<link>` element in document
/// order. Elements missing either attribute are skipped, as is anything
/// inside comments, `<script>`, `<style>` or `<template>`.
fn parse_html_links(body: &str) -> Vec<(Vec<String>, String)> {
    let mut links = Vec::new();
    let markup = inert_block_regex().replace_all(body, "");

    for tag in link_tag_regex().captures_iter(&markup) {
        let mut rel = None;
        let mut href = None;

        for attr in attribute_regex().captures_iter(&tag[1]) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match attr[1].to_ascii_lowercase().as_str() {
                "rel" if rel.is_none() => rel = Some(value.to_string()),
                "href" if href.is_none() => href = Some(decode_entities(value)),
                _ => {}
            }
        }

        if let (Some(rel), Some(href)) = (rel, href) {
            let rels = rel.split_whitespace().map(str::to_string).collect();
            links.push((rels, href));
        }
    }

    links
}

/// Decodes the handful of character references that show up in URLs.
fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn html_response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            body: body.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // parse_link_header
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_link_header_multiple_links() {
        let header = "<http://foo.bar/auth>;rel=authorization_endpoint, <http://baz.bux/token>;rel=token_endpoint, <http://do.re/micropub>;rel=micropub";
        let links = parse_link_header(header);
        assert_eq!(links.len(), 3);
        assert_eq!(find_rel(&links, "authorization_endpoint").unwrap(), "http://foo.bar/auth");
        assert_eq!(find_rel(&links, "token_endpoint").unwrap(), "http://baz.bux/token");
        assert_eq!(find_rel(&links, "micropub").unwrap(), "http://do.re/micropub");
    }

    #[test]
    fn test_parse_link_header_quoted_multi_rel() {
        let header = r#"<https://auth.example/>; rel="authorization_endpoint token_endpoint""#;
        let links = parse_link_header(header);
        assert_eq!(find_rel(&links, "authorization_endpoint").unwrap(), "https://auth.example/");
        assert_eq!(find_rel(&links, "token_endpoint").unwrap(), "https://auth.example/");
    }

    #[test]
    fn test_parse_link_header_comma_inside_target() {
        let header = r#"<https://auth.example/a?x=1,2>; rel="authorization_endpoint", <https://t.example/>; rel=token_endpoint"#;
        let links = parse_link_header(header);
        assert_eq!(links.len(), 2);
        assert_eq!(find_rel(&links, "authorization_endpoint").unwrap(), "https://auth.example/a?x=1,2");
    }

    #[test]
    fn test_parse_link_header_ignores_links_without_rel() {
        let header = r#"<https://a.example/>; title="no rel here", garbage"#;
        assert!(parse_link_header(header).is_empty());
    }

    // -----------------------------------------------------------------------
    // parse_html_links
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_html_links_any_attribute_order_and_quoting() {
        let body = r#"
            <LINK rel='authorization_endpoint' href='https://auth.example/a'>
            <link href=https://auth.example/t rel=token_endpoint />
            <link type="text/html" href="https://pub.example/m?a=1&amp;b=2" rel="micropub">
        "#;
        let links = parse_html_links(body);
        assert_eq!(find_rel(&links, "authorization_endpoint").unwrap(), "https://auth.example/a");
        assert_eq!(find_rel(&links, "token_endpoint").unwrap(), "https://auth.example/t");
        assert_eq!(find_rel(&links, "micropub").unwrap(), "https://pub.example/m?a=1&b=2");
    }

    #[test]
    fn test_parse_html_links_first_match_wins() {
        let body = r#"<link rel="micropub" href="https://first.example/"><link rel="micropub" href="https://second.example/">"#;
        let links = parse_html_links(body);
        assert_eq!(find_rel(&links, "micropub").unwrap(), "https://first.example/");
    }

    #[test]
    fn test_parse_html_links_skips_incomplete_tags() {
        let body = r#"<link rel="micropub"><link href="https://x.example/">"#;
        assert!(parse_html_links(body).is_empty());
    }

    #[test]
    fn test_parse_html_links_ignores_comments_and_raw_text() {
        let body = r#"<html><head>
            <!-- <link rel="micropub" href="https://commented.example/"> -->
            <script>document.write('<link rel="micropub" href="https://script.example/">')</script>
            <STYLE>/* <link rel="micropub" href="https://style.example/"> */</STYLE>
            <template><link rel="micropub" href="https://template.example/"></template>
            <link rel="micropub" href="https://live.example/">
        </head></html>"#;

        let links = parse_html_links(body);
        assert_eq!(links.len(), 1);
        assert_eq!(find_rel(&links, "micropub").unwrap(), "https://live.example/");
    }

    // -----------------------------------------------------------------------
    // extract_endpoints
    // -----------------------------------------------------------------------

    #[test]
    fn test_extract_endpoints_header_wins_over_html() {
        let mut resp = html_response(
            r#"<link rel="authorization_endpoint" href="https://html.example/auth">
               <link rel="token_endpoint" href="https://html.example/token">"#,
        );
        resp.headers.push((
            "Link".to_string(),
            "<https://header.example/auth>; rel=\"authorization_endpoint\"".to_string(),
        ));

        let endpoints = extract_endpoints("https://alice.example/", &resp);
        assert_eq!(
            endpoints.authorization_endpoint.as_deref(),
            Some("https://header.example/auth")
        );
        assert_eq!(
            endpoints.token_endpoint.as_deref(),
            Some("https://html.example/token")
        );
        assert!(endpoints.micropub_endpoint.is_none());
    }

    #[test]
    fn test_extract_endpoints_skips_commented_out_endpoint() {
        let resp = html_response(
            "<!-- <link rel=authorization_endpoint href=https://stale.example/auth> -->\
             <link rel=authorization_endpoint href=https://real.example/auth>",
        );
        let endpoints = extract_endpoints("https://alice.example/", &resp);
        assert_eq!(
            endpoints.authorization_endpoint.as_deref(),
            Some("https://real.example/auth")
        );
    }

    #[test]
    fn test_extract_endpoints_only_token_endpoint() {
        let resp = html_response(r#"<link rel="token_endpoint" href="https://auth.example/t">"#);
        let endpoints = extract_endpoints("https://alice.example/", &resp);
        assert!(endpoints.authorization_endpoint.is_none());
        assert!(endpoints.micropub_endpoint.is_none());
        assert_eq!(endpoints.token_endpoint.as_deref(), Some("https://auth.example/t"));
    }

    #[test]
    fn test_extract_endpoints_resolves_relative_targets() {
        let resp = html_response(r#"<link rel="micropub" href="/micropub">"#);
        let endpoints = extract_endpoints("https://alice.example/blog/", &resp);
        assert_eq!(
            endpoints.micropub_endpoint.as_deref(),
            Some("https://alice.example/micropub")
        );
    }

    #[test]
    fn test_extract_endpoints_drops_non_http_schemes() {
        let resp = html_response(r#"<link rel="authorization_endpoint" href="javascript:alert(1)">"#);
        let endpoints = extract_endpoints("https://alice.example/", &resp);
        assert!(endpoints.is_empty());
    }

    // -----------------------------------------------------------------------
    // EndpointSet
    // -----------------------------------------------------------------------

    #[test]
    fn test_require_https_drops_plain_http() {
        let endpoints = EndpointSet {
            authorization_endpoint: Some("https://auth.example/a".to_string()),
            token_endpoint: Some("http://auth.example/t".to_string()),
            micropub_endpoint: Some("http://pub.example/m".to_string()),
        }
        .require_https();

        assert_eq!(
            endpoints.authorization_endpoint.as_deref(),
            Some("https://auth.example/a")
        );
        assert!(endpoints.token_endpoint.is_none());
        assert!(endpoints.micropub_endpoint.is_none());
    }

    #[test]
    fn test_endpoint_set_serializes_without_absent_fields() {
        let endpoints = EndpointSet {
            token_endpoint: Some("https://auth.example/t".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&endpoints).unwrap();
        assert_eq!(json, r#"{"token_endpoint":"https://auth.example/t"}"#);
    }
}
