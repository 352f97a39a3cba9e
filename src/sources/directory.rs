//! Business directory client.
//!
//! Stands in for a paid places API: returns the contact profile a
//! directory listing would carry, derived from the declared provider
//! name so results are stable across runs.

use async_trait::async_trait;
use tracing::debug;

use crate::request::ValidationRequest;

use super::{SourceClient, SourceError, SourceFields, SourceTag};

/// Deterministic stand-in for business-directory lookups.
#[derive(Debug, Default)]
pub struct DirectoryClient;

impl DirectoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceClient for DirectoryClient {
    fn tag(&self) -> SourceTag {
        SourceTag::BusinessDirectory
    }

    async fn fetch(&self, request: &ValidationRequest) -> Result<SourceFields, SourceError> {
        debug!(name = %request.name, "looking up directory listing");

        let email = format!(
            "{}@healthcare.com",
            request.name.to_lowercase().replace(' ', ".")
        );

        Ok(SourceFields {
            phone: Some("+1-555-0123".to_string()),
            email: Some(email),
            address: Some("123 Medical Plaza".to_string()),
            rating: Some(4.5),
            ..SourceFields::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn derives_contact_profile_from_name() {
        let request = ValidationRequest::builder()
            .provider_id(7)
            .npi("1234567890")
            .name("Jane Smith")
            .specialty("Cardiology")
            .state("CA")
            .build()
            .unwrap();

        let fields = DirectoryClient::new().fetch(&request).await.unwrap();
        assert_eq!(fields.email.as_deref(), Some("jane.smith@healthcare.com"));
        assert_eq!(fields.phone.as_deref(), Some("+1-555-0123"));
        assert_eq!(fields.rating, Some(4.5));
    }
}
