//! Cross-origin fetch policy for resources the browser has to fetch itself.
//!
//! A resource is fetch-safe when the platform hosts it, or when its external
//! host is an allow-listed host or one of its subdomains.

use meshdepot_core::config::is_bare_host;
use meshdepot_core::models::Resource;
use meshdepot_core::{AppError, Config};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorsConfigError {
    #[error("Invalid download allow-list entry '{0}': expected a bare host name")]
    InvalidHost(String),

    #[error("Invalid platform storage URL '{0}'")]
    InvalidPlatformUrl(String),
}

impl From<CorsConfigError> for AppError {
    fn from(err: CorsConfigError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CorsGate {
    platform_host: String,
    allowed_hosts: Vec<String>,
}

impl CorsGate {
    /// `platform_base_url` is the URL prefix the byte store serves objects under.
    pub fn new<I, S>(allowlist: I, platform_base_url: &str) -> Result<Self, CorsConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let platform_host = host_of(platform_base_url)
            .ok_or_else(|| CorsConfigError::InvalidPlatformUrl(platform_base_url.to_string()))?;

        let allowed_hosts = allowlist
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref();
                let normalized = entry.trim().to_lowercase();
                if normalized.len() != entry.len() || !is_bare_host(&normalized) {
                    return Err(CorsConfigError::InvalidHost(entry.to_string()));
                }
                Ok(normalized)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            platform_host,
            allowed_hosts,
        })
    }

    pub fn from_config(config: &Config, platform_base_url: &str) -> Result<Self, CorsConfigError> {
        Self::new(config.download_cors_allowlist(), platform_base_url)
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    fn host_allowed(&self, host: &str) -> bool {
        host == self.platform_host
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    /// Unparseable URLs are never safe.
    pub fn is_url_fetch_safe(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| self.host_allowed(&host))
    }

    pub fn is_fetch_safe(&self, resource: &Resource) -> bool {
        if resource.file.is_some() {
            return true;
        }
        resource
            .external_url
            .as_deref()
            .is_some_and(|url| self.is_url_fetch_safe(url))
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshdepot_core::models::StoredFile;

    fn gate(allow: &[&str]) -> CorsGate {
        CorsGate::new(allow.iter().copied(), "https://files.meshdepot.test/assets").unwrap()
    }

    fn external(url: &str) -> Resource {
        Resource {
            id: 1,
            asset_id: 1,
            format_id: Some(1),
            file: None,
            external_url: Some(url.to_string()),
            file_name: "model.gltf".to_string(),
            content_type: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_host_and_subdomains_are_allowed() {
        let gate = gate(&["archive.org"]);
        assert!(gate.is_url_fetch_safe("https://archive.org/download/a.bin"));
        assert!(gate.is_url_fetch_safe("https://ia800.us.archive.org/a.bin"));
        assert!(!gate.is_url_fetch_safe("https://notarchive.org/a.bin"));
        assert!(!gate.is_url_fetch_safe("https://archive.org.evil.test/a.bin"));
    }

    #[test]
    fn test_platform_hosted_resources_are_safe() {
        let gate = gate(&[]);
        let mut resource = external("https://elsewhere.test/a.bin");
        assert!(!gate.is_fetch_safe(&resource));

        resource.external_url = Some("https://FILES.meshdepot.test/assets/1/a.bin".to_string());
        assert!(gate.is_fetch_safe(&resource));

        resource.external_url = None;
        resource.file = Some(StoredFile {
            key: "assets/1/a.bin".to_string(),
            url: "http://localhost:4000/files/assets/1/a.bin".to_string(),
        });
        assert!(gate.is_fetch_safe(&resource));
    }

    #[test]
    fn test_unresolvable_resource_is_not_safe() {
        let gate = gate(&["archive.org"]);
        let mut resource = external("not a url");
        assert!(!gate.is_fetch_safe(&resource));
        resource.external_url = None;
        assert!(!gate.is_fetch_safe(&resource));
    }

    #[test]
    fn test_malformed_entries_are_rejected() {
        for bad in ["", "https://archive.org", "archive.org/path", "arch ive.org", " archive.org"] {
            let err = CorsGate::new([bad], "https://files.meshdepot.test").unwrap_err();
            assert_eq!(err, CorsConfigError::InvalidHost(bad.to_string()));
        }
        assert!(matches!(
            CorsGate::new(Vec::<String>::new(), "files"),
            Err(CorsConfigError::InvalidPlatformUrl(_))
        ));
    }
}
