//! Locator strategies for finding clickable entries on portal pages.
//!
//! The portal's markup is inconsistent about where it puts its JavaScript
//! triggers, so discovery is an ordered list of strategies: each is tried in
//! turn and the first non-empty result wins.

mod link_filter;
mod signature;

use async_trait::async_trait;
use mfdocs_shared::Result;
use tracing::{debug, warn};

use crate::page::{ElementHandle, PageAutomation};

pub use link_filter::LinkFilterLocator;
pub use signature::SignatureLocator;

/// Script function behind each category link on a listing page.
pub const CATEGORY_SIGNATURE: &str = "getmutuakFund";

/// Script function behind each fund link on a category page.
pub const FUND_SIGNATURE: &str = "getfundDetails";

/// Structure whose presence means a listing has rendered.
pub const STRUCTURE_SELECTOR: &str = "table";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One way of turning a trigger signature into clickable elements.
#[async_trait]
pub trait LocatorStrategy: Send + Sync {
    /// Find elements whose action invokes `signature`, in document order.
    async fn locate(
        &self,
        page: &mut dyn PageAutomation,
        signature: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Holds strategies in preference order.
pub struct LocatorChain {
    strategies: Vec<Box<dyn LocatorStrategy>>,
}

impl LocatorChain {
    /// Exact selector match first, client-side link filtering second.
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(SignatureLocator),
            Box::new(LinkFilterLocator),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn LocatorStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run strategies in order until one finds something.
    ///
    /// A failing strategy is logged and the next one tried; the error is only
    /// returned if every strategy failed.
    pub async fn locate(
        &self,
        page: &mut dyn PageAutomation,
        signature: &str,
    ) -> Result<Vec<ElementHandle>> {
        let mut last_error = None;
        let mut any_succeeded = false;

        for strategy in &self.strategies {
            match strategy.locate(page, signature).await {
                Ok(found) if !found.is_empty() => {
                    debug!(
                        strategy = strategy.name(),
                        signature,
                        count = found.len(),
                        "located entries"
                    );
                    return Ok(found);
                }
                Ok(_) => {
                    any_succeeded = true;
                    debug!(strategy = strategy.name(), signature, "no matches, trying next strategy");
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), signature, error = %e, "locator failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !any_succeeded => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

impl Default for LocatorChain {
    fn default() -> Self {
        Self::new()
    }
}
