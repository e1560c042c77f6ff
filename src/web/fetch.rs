//! Page fetching for the web fallback.
//!
//! Targets are checked before any connection is made: only http(s), no
//! denylisted hosts, and every resolved address must be publicly routable.
//! Redirects are not followed so a public URL cannot bounce to a private one.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use super::{FetchedPage, PageFetcher, WebError};
use crate::core::config::settings::WebSettings;

const DEFAULT_DENYLIST: &[&str] = &["localhost", "*.localhost", "*.local", "*.internal"];

pub struct HttpPageFetcher {
    client: Client,
    max_bytes: usize,
    denylist: Vec<String>,
}

impl HttpPageFetcher {
    pub fn new(settings: &WebSettings) -> Result<Self, WebError> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("annals-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WebError::Transport(e.to_string()))?;

        let mut denylist: Vec<String> = DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect();
        denylist.extend(
            settings
                .url_denylist
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty()),
        );

        Ok(Self {
            client,
            max_bytes: settings.max_bytes.max(1024),
            denylist,
        })
    }

    async fn check_target(&self, url: &Url) -> Result<(), WebError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WebError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| WebError::InvalidUrl("missing host".to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if self.denylist.iter().any(|p| host_matches(host, p)) {
            return Err(WebError::Blocked(host.to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return reject_non_public(host, ip);
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| WebError::Transport(format!("dns lookup for {}: {}", host, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(WebError::InvalidUrl(format!("{} did not resolve", host)));
        }
        for addr in addrs {
            reject_non_public(host, addr.ip())?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, WebError> {
        let parsed = Url::parse(url.trim()).map_err(|e| WebError::InvalidUrl(e.to_string()))?;
        self.check_target(&parsed).await?;

        let response = self.client.get(parsed).send().await?;
        if !response.status().is_success() {
            return Err(WebError::Http(response.status().as_u16()));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(WebError::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&body);
        Ok(FetchedPage {
            title: extract_title(&html),
            text: strip_html(&html),
        })
    }
}

fn reject_non_public(host: &str, ip: IpAddr) -> Result<(), WebError> {
    if is_public_ip(ip) {
        Ok(())
    } else {
        Err(WebError::Blocked(format!("{} ({})", host, ip)))
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let reserved = ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_multicast()
        || a == 0
        || a >= 240
        // carrier-grade NAT
        || (a == 100 && (64..=127).contains(&b))
        // benchmarking
        || (a == 198 && (b == 18 || b == 19))
        // documentation ranges
        || (a == 192 && b == 0 && c == 2)
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113);
    !reserved
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let second = ip.segments()[1];
    let reserved = ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
        || (first == 0x2001 && second == 0x0db8);
    !reserved
}

/// `*.example.org` matches subdomains and the apex, `10.*` matches by prefix.
fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{}", suffix));
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return host.starts_with(prefix);
    }
    host == pattern
}

pub(crate) fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = collapse_whitespace(&decode_entities(&html[start..end]));
    (!title.is_empty()).then_some(title)
}

/// Plain text of an HTML document with markup, scripts and styles removed.
pub(crate) fn strip_html(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() / 2);
    let mut i = 0;

    while i < html.len() {
        let rest = &lower[i..];
        if rest.starts_with("<!--") {
            i = skip_past(&lower, i, "-->");
            continue;
        }
        if let Some(tag) = ["script", "style", "noscript"]
            .into_iter()
            .find(|tag| opens_element(rest, tag))
        {
            i = skip_past(&lower, i, &format!("</{}", tag));
            i = skip_past(&lower, i, ">");
            out.push(' ');
            continue;
        }
        if rest.starts_with('<') {
            i = skip_past(&lower, i, ">");
            out.push(' ');
            continue;
        }
        let next = rest.find('<').map(|n| i + n).unwrap_or(html.len());
        out.push_str(&html[i..next]);
        i = next;
    }

    collapse_whitespace(&decode_entities(&out))
}

fn opens_element(rest: &str, tag: &str) -> bool {
    rest.strip_prefix('<')
        .and_then(|r| r.strip_prefix(tag))
        .map(|r| r.starts_with(|c: char| c == '>' || c.is_ascii_whitespace()))
        .unwrap_or(false)
}

/// Index just past the next `needle` at or after `from`, or the end of input.
fn skip_past(haystack: &str, from: usize, needle: &str) -> usize {
    haystack[from..]
        .find(needle)
        .map(|n| from + n + needle.len())
        .unwrap_or(haystack.len())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(denylist: &[&str]) -> HttpPageFetcher {
        let settings = WebSettings {
            url_denylist: denylist.iter().map(|s| s.to_string()).collect(),
            ..WebSettings::default()
        };
        HttpPageFetcher::new(&settings).unwrap()
    }

    #[test]
    fn private_and_reserved_addresses_are_not_public() {
        for ip in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "169.254.1.1", "100.64.0.1", "0.0.0.0"] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{ip} should be blocked");
        }
        for ip in ["::1", "fd00::1", "fe80::1", "::ffff:127.0.0.1", "2001:db8::1"] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{ip} should be blocked");
        }
        assert!(is_public_ip("8.8.8.8".parse().unwrap()));
        assert!(is_public_ip("2606:4700:4700::1111".parse().unwrap()));
    }

    #[test]
    fn host_patterns_cover_wildcards() {
        assert!(host_matches("api.example.org", "*.example.org"));
        assert!(host_matches("example.org", "*.example.org"));
        assert!(!host_matches("badexample.org", "*.example.org"));
        assert!(host_matches("10.0.0.1", "10.*"));
        assert!(host_matches("LOCALHOST", "localhost"));
    }

    #[tokio::test]
    async fn rejects_targets_without_touching_the_network() {
        let fetcher = fetcher(&["archive.example.org"]);

        let err = fetcher.fetch("ftp://example.org/file").await.unwrap_err();
        assert!(matches!(err, WebError::InvalidUrl(_)));

        let err = fetcher.fetch("http://127.0.0.1:8080/").await.unwrap_err();
        assert!(matches!(err, WebError::Blocked(_)));

        let err = fetcher.fetch("http://[::1]/").await.unwrap_err();
        assert!(matches!(err, WebError::Blocked(_)));

        let err = fetcher.fetch("https://archive.example.org/").await.unwrap_err();
        assert!(matches!(err, WebError::Blocked(_)));

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, WebError::InvalidUrl(_)));
    }

    #[test]
    fn strips_markup_scripts_and_entities() {
        let html = r#"<html><head><title> Ming &amp; Treasure  Fleet </title>
            <style>body { color: red; }</style>
            <script type="text/javascript">var x = "<p>";</script></head>
            <body><!-- nav --><h1>Zheng&nbsp;He</h1><p>Commanded seven voyages.</p>
            <noscript>Enable JS</noscript></body></html>"#;

        assert_eq!(extract_title(html).as_deref(), Some("Ming & Treasure Fleet"));
        let text = strip_html(html);
        assert_eq!(text, "Ming & Treasure Fleet Zheng He Commanded seven voyages.");
    }

    #[test]
    fn unterminated_markup_does_not_panic() {
        assert_eq!(strip_html("Text <b"), "Text");
        assert_eq!(strip_html("<script>never closed"), "");
        assert_eq!(strip_html("é<p>ü"), "é ü");
        assert_eq!(extract_title("<p>none</p>"), None);
    }
}
