//! Fallback: take every table link and filter by its action client-side.

use async_trait::async_trait;
use mfdocs_shared::Result;

use super::LocatorStrategy;
use crate::page::{ElementHandle, PageAutomation};

/// Every `table a`, kept when its `href` or `onclick` references the signature
/// once case and whitespace are ignored.
pub struct LinkFilterLocator;

/// Lowercase with all whitespace removed.
fn normalize(action: &str) -> String {
    action
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn references_signature(href: &str, onclick: &str, signature: &str) -> bool {
    let needle = normalize(signature);
    if needle.is_empty() {
        return false;
    }
    normalize(href).contains(&needle) || normalize(onclick).contains(&needle)
}

#[async_trait]
impl LocatorStrategy for LinkFilterLocator {
    async fn locate(
        &self,
        page: &mut dyn PageAutomation,
        signature: &str,
    ) -> Result<Vec<ElementHandle>> {
        let links = page.find_all("table a").await?;
        tracing::debug!(count = links.len(), "checking table links for script triggers");

        let mut kept = Vec::new();
        for link in links {
            let href = page.attribute(link, "href").await?.unwrap_or_default();
            let onclick = page.attribute(link, "onclick").await?.unwrap_or_default();
            if references_signature(&href, &onclick, signature) {
                kept.push(link);
            }
        }
        Ok(kept)
    }

    fn name(&self) -> &str {
        "link-filter"
    }
}
