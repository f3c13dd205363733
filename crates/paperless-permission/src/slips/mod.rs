//! Permission slips, their signature links, signing and notification content.

pub mod domain;
pub mod link;
pub mod notifications;
pub mod report;
pub mod signature;

pub use domain::{GuardianSignature, PermissionSlip, Signature, SignerRole};
pub use link::{InvalidLinkSubject, LinkSubject, LinkToken, NewSlipLink, PermissionSlipLink};
pub use notifications::{render_email, OutboundEmail};
pub use report::{SlipStatusRow, TripStatusReport};
pub use signature::{SignatureSubmission, SlipPage, MAX_SIGNATURE_NAME};

/// Deployment settings the slip service needs, passed in at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlipSettings {
    /// Secret mixed into every link token. Empty is allowed outside production.
    pub link_salt: String,
    pub base_url: String,
    pub from_address: String,
    pub signature: String,
}

impl SlipSettings {
    pub fn slip_url(&self, token: &LinkToken) -> String {
        format!("{}/slip/{}", self.base_url.trim_end_matches('/'), token)
    }
}

impl Default for SlipSettings {
    fn default() -> Self {
        Self {
            link_salt: String::new(),
            base_url: "http://localhost:8000".to_string(),
            from_address: "activities@localhost".to_string(),
            signature: "Activities Office".to_string(),
        }
    }
}
