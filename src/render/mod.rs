//! Page rendering capability.
//!
//! The extraction engine and the deep scraper only see these traits. Two
//! backends exist:
//!
//! | Backend | Module | Scripts | Notes |
//! |---------|--------|---------|-------|
//! | Plain HTTP | [`http`] | no | Default; waits inspect the static document, clicks are no-ops |
//! | Headless Chromium | `chromium` | yes | Behind the `chromium` feature |

use std::time::Duration;

use crate::error::ScrapeError;

pub mod http;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use http::HttpRenderer;

/// Desktop browser user agent sent by every backend.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Subresource categories a renderer may refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Script,
    Image,
    Stylesheet,
    Font,
    Media,
}

impl ResourceType {
    /// Documents and scripts are needed to build the DOM and are never blocked.
    #[cfg(any(test, feature = "chromium"))]
    pub fn is_blockable(&self) -> bool {
        !matches!(self, ResourceType::Document | ResourceType::Script)
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub blocked: Vec<ResourceType>,
    pub load_timeout: Duration,
}

impl RenderOptions {
    /// Block images, stylesheets, fonts and media.
    pub fn lightweight(load_timeout: Duration) -> Self {
        Self {
            blocked: vec![
                ResourceType::Image,
                ResourceType::Stylesheet,
                ResourceType::Font,
                ResourceType::Media,
            ],
            load_timeout,
        }
    }

    #[cfg(test)]
    pub fn blocks(&self, resource: ResourceType) -> bool {
        resource.is_blockable() && self.blocked.contains(&resource)
    }

    /// Blockable resource types, in declaration order, without duplicates.
    #[cfg(any(test, feature = "chromium"))]
    pub fn effective_blocklist(&self) -> Vec<ResourceType> {
        let mut out = Vec::new();
        for r in &self.blocked {
            if r.is_blockable() && !out.contains(r) {
                out.push(*r);
            }
        }
        out
    }
}

/// Produces loaded pages.
pub trait PageRenderer {
    type Page: RenderedPage;

    /// Load `url`, failing with [`ScrapeError::LoadTimeout`] or
    /// [`ScrapeError::Navigation`] when the target cannot be reached.
    async fn open(&self, url: &str, options: &RenderOptions) -> Result<Self::Page, ScrapeError>;

    /// Close any long-lived session. Called on the shutdown path.
    async fn shutdown(&self);
}

/// A loaded page.
pub trait RenderedPage {
    /// Wait until `selector` matches, up to `timeout`. Never errors.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool;

    /// Click the first match of `selector`; `Ok(false)` when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool, ScrapeError>;

    async fn scroll_by(&self, pixels: i64) -> Result<(), ScrapeError>;

    /// Serialized DOM at this moment.
    async fn content(&self) -> Result<String, ScrapeError>;

    /// URL relative links are resolved against.
    fn url(&self) -> &str;

    async fn close(self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_and_script_never_blocked() {
        let opts = RenderOptions {
            blocked: vec![
                ResourceType::Document,
                ResourceType::Script,
                ResourceType::Image,
                ResourceType::Image,
            ],
            load_timeout: Duration::from_secs(1),
        };
        assert!(!opts.blocks(ResourceType::Document));
        assert!(!opts.blocks(ResourceType::Script));
        assert!(opts.blocks(ResourceType::Image));
        assert_eq!(opts.effective_blocklist(), vec![ResourceType::Image]);
    }

    #[test]
    fn test_lightweight_blocks_heavy_types() {
        let opts = RenderOptions::lightweight(Duration::from_secs(60));
        for r in [
            ResourceType::Image,
            ResourceType::Stylesheet,
            ResourceType::Font,
            ResourceType::Media,
        ] {
            assert!(opts.blocks(r));
        }
    }
}
