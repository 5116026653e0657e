//! Core domain types for mfdocs.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PortalConfig;
use crate::error::{MfDocsError, Result};

// ---------------------------------------------------------------------------
// DocumentType
// ---------------------------------------------------------------------------

/// The two regulatory document categories published per fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Key Information Memorandum.
    #[serde(rename = "KIM")]
    Kim,
    /// Scheme Information Document.
    #[serde(rename = "SID")]
    Sid,
}

impl DocumentType {
    /// Fixed traversal order.
    pub const ORDER: [DocumentType; 2] = [DocumentType::Kim, DocumentType::Sid];

    /// Short tag used in checkpoints and artifact filenames.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Kim => "KIM",
            Self::Sid => "SID",
        }
    }

    /// The type processed after this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Kim => Some(Self::Sid),
            Self::Sid => None,
        }
    }

    /// Whether this is the first type in [`DocumentType::ORDER`].
    pub fn is_first(self) -> bool {
        self == Self::ORDER[0]
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = MfDocsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KIM" => Ok(Self::Kim),
            "SID" => Ok(Self::Sid),
            other => Err(MfDocsError::validation(format!(
                "unknown document type '{other}': expected KIM or SID"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentDescriptor
// ---------------------------------------------------------------------------

/// Everything the traversal needs to know about one document-type pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDescriptor {
    /// Which document type this pass collects.
    pub doc_type: DocumentType,
    /// The portal's fund-type code for this listing.
    pub fund_type_code: u32,
    /// Fully resolved listing page URL.
    pub listing_url: Url,
}

impl DocumentDescriptor {
    /// Build the descriptor for `doc_type` from portal settings.
    pub fn new(doc_type: DocumentType, portal: &PortalConfig) -> Result<Self> {
        let fund_type_code = match doc_type {
            DocumentType::Kim => portal.kim_fund_type,
            DocumentType::Sid => portal.sid_fund_type,
        };

        let mut listing_url = Url::parse(&portal.listing_url).map_err(|e| {
            MfDocsError::config(format!("invalid listing_url '{}': {e}", portal.listing_url))
        })?;
        listing_url
            .query_pairs_mut()
            .append_pair("mftype", &fund_type_code.to_string());

        Ok(Self {
            doc_type,
            fund_type_code,
            listing_url,
        })
    }

    /// Descriptors for every document type, in traversal order.
    pub fn all(portal: &PortalConfig) -> Result<Vec<Self>> {
        DocumentType::ORDER
            .iter()
            .map(|doc_type| Self::new(*doc_type, portal))
            .collect()
    }
}
