//! Exact selector match on the trigger signature.

use async_trait::async_trait;
use mfdocs_shared::Result;

use super::LocatorStrategy;
use crate::page::{ElementHandle, PageAutomation};

/// Links inside a table whose `onclick` or `javascript:` href names the signature.
pub struct SignatureLocator;

impl SignatureLocator {
    pub(crate) fn selector(signature: &str) -> String {
        let sig = signature.replace('"', "\\\"");
        format!(r#"table a[onclick*="{sig}"], table a[href*="javascript:{sig}"]"#)
    }
}

#[async_trait]
impl LocatorStrategy for SignatureLocator {
    async fn locate(
        &self,
        page: &mut dyn PageAutomation,
        signature: &str,
    ) -> Result<Vec<ElementHandle>> {
        page.find_all(&Self::selector(signature)).await
    }

    fn name(&self) -> &str {
        "signature"
    }
}
