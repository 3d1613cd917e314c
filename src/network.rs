//! Request filtering applied to every request a render session issues.

use serde::{Deserialize, Serialize};
use url::Url;

/// Resource categories a render session distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Xhr,
    Fetch,
    Image,
    Font,
    Stylesheet,
    Media,
    WebSocket,
    Manifest,
    Other,
}

/// Whether a request may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block(BlockReason),
}

/// Why a request was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Resource type never affects extracted data.
    ResourceType,
    /// URL belongs to an analytics, ad or tracking host.
    Tracker,
    /// Image loading is disabled for this session.
    Image,
}

/// Resource types blocked regardless of configuration.
const ALWAYS_BLOCKED: &[ResourceKind] = &[
    ResourceKind::Font,
    ResourceKind::Stylesheet,
    ResourceKind::Media,
    ResourceKind::WebSocket,
    ResourceKind::Manifest,
];

/// Analytics, ad and tracking host fragments. Matched against the host only.
const TRACKER_DENYLIST: &[&str] = &[
    "google-analytics",
    "googletagmanager",
    "googlesyndication",
    "doubleclick",
    "adservice",
    "adsystem",
    "facebook",
    "twitter",
    "scorecardresearch",
    "hotjar",
    "quantserve",
    "criteo",
    "taboola",
    "outbrain",
];

const FONT_EXTENSIONS: &[&str] = &[".woff", ".woff2", ".ttf", ".eot", ".otf"];

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif", ".bmp", ".svg", ".ico",
];

/// Network policy for one session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    load_images: bool,
}

impl RequestPolicy {
    /// Creates a policy; `load_images = false` additionally blocks images.
    pub fn new(load_images: bool) -> Self {
        Self { load_images }
    }

    /// Decides whether `url` of kind `kind` may be fetched.
    ///
    /// Trackers are recognized by host, so a query string naming one (a
    /// search for `twitter`, say) does not block the page.
    pub fn decide(&self, url: &str, kind: ResourceKind) -> Verdict {
        let parsed = Url::parse(url).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .map(str::to_ascii_lowercase);
        let path = match parsed {
            Some(ref u) => u.path().to_ascii_lowercase(),
            None => url.to_ascii_lowercase(),
        };

        if ALWAYS_BLOCKED.contains(&kind) || has_extension(&path, FONT_EXTENSIONS) {
            return Verdict::Block(BlockReason::ResourceType);
        }

        if let Some(ref host) = host {
            if TRACKER_DENYLIST.iter().any(|fragment| host.contains(fragment)) {
                return Verdict::Block(BlockReason::Tracker);
            }
        }

        if !self.load_images
            && (kind == ResourceKind::Image || has_extension(&path, IMAGE_EXTENSIONS))
        {
            return Verdict::Block(BlockReason::Image);
        }

        Verdict::Allow
    }

    /// Shorthand for `decide(..) == Verdict::Allow`.
    pub fn allows(&self, url: &str, kind: ResourceKind) -> bool {
        self.decide(url, kind) == Verdict::Allow
    }
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| path.ends_with(ext))
}
