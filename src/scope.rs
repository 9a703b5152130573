// src/scope.rs
//! URL hygiene and host scoping: which links the crawler may follow and
//! which pages count as first-party for a vendor.

use url::Url;

/// Subdomains of the root host the crawler may enter.
pub const ALLOWED_SUBDOMAIN_PREFIXES: &[&str] = &[
    "docs.", "help.", "support.", "status.", "trust.", "security.", "partners.",
];

const SKIPPED_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "json", "xml", "rss", "atom", "png", "jpg", "jpeg", "gif", "svg",
    "webp", "ico", "bmp", "avif", "woff", "woff2", "ttf", "otf", "eot", "zip", "gz", "tgz", "tar",
    "rar", "7z", "dmg", "exe", "msi", "pkg", "deb", "rpm", "pdf", "mp3", "mp4", "m4a", "mov",
    "avi", "webm", "wav", "ogg", "csv", "xls", "xlsx", "doc", "docx", "ppt", "pptx",
];

/// Lowercased host without a leading `www.`.
pub fn bare_host(host: &str) -> String {
    let h = host.trim().trim_end_matches('.').to_ascii_lowercase();
    h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
}

/// Second-level labels that sit under a two-letter country TLD (`co.uk`, `com.au`).
const COUNTRY_SLDS: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu", "ne", "or"];

/// The domain a site owner registers: `docs.acme.co.uk` and `www.acme.co.uk`
/// both give `acme.co.uk`. IP literals come back unchanged.
pub fn registrable_domain(host: &str) -> String {
    let h = bare_host(host);
    if h.parse::<std::net::IpAddr>().is_ok() || h.starts_with('[') {
        return h;
    }
    let labels: Vec<&str> = h.split('.').filter(|l| !l.is_empty()).collect();
    let keep = match labels.as_slice() {
        [.., sld, tld] if tld.len() == 2 && COUNTRY_SLDS.contains(sld) && labels.len() >= 3 => 3,
        _ => 2,
    };
    if labels.len() <= keep {
        return labels.join(".");
    }
    labels[labels.len() - keep..].join(".")
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// True if `url`'s host is the vendor domain or one of its subdomains.
pub fn is_first_party(url: &str, vendor_domain: &str) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    let domain = bare_host(vendor_domain);
    if domain.is_empty() {
        return false;
    }
    let host = host.trim_end_matches('.');
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Strip fragment and trailing slash; lowercase scheme/host (done by `Url`).
pub fn normalize(u: &Url) -> String {
    let mut u = u.clone();
    u.set_fragment(None);
    let s = u.to_string();
    if u.query().is_none() {
        s.trim_end_matches('/').to_string()
    } else {
        s
    }
}

fn has_skipped_extension(u: &Url) -> bool {
    let last = u.path().rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => SKIPPED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Crawl scope anchored at the root URL's host.
#[derive(Debug, Clone)]
pub struct DomainScope {
    root_host: String,
    bare: String,
}

impl DomainScope {
    pub fn new(root_host: &str) -> Self {
        let root_host = root_host.trim().trim_end_matches('.').to_ascii_lowercase();
        let bare = bare_host(&root_host);
        Self { root_host, bare }
    }

    pub fn from_url(root: &Url) -> Option<Self> {
        root.host_str().map(Self::new)
    }

    /// Root host, its `www.` twin, or an allow-listed subdomain of the root.
    pub fn admits(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host == self.root_host || host == self.bare || host == format!("www.{}", self.bare) {
            return true;
        }
        ALLOWED_SUBDOMAIN_PREFIXES
            .iter()
            .any(|p| host.starts_with(p) && host.ends_with(&format!(".{}", self.bare)))
    }

    /// Resolve `href` against `base` and return the normalized URL if it is
    /// an in-scope http(s) page link.
    pub fn resolve(&self, base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("mailto:")
            || lower.starts_with("tel:")
            || lower.starts_with("javascript:")
            || lower.starts_with("data:")
            || href.starts_with('#')
        {
            return None;
        }
        let u = base.join(href).ok()?;
        if u.scheme() != "http" && u.scheme() != "https" {
            return None;
        }
        if !self.admits(u.host_str()?) || has_skipped_extension(&u) {
            return None;
        }
        Some(normalize(&u))
    }
}
