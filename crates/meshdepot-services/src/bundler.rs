//! Download menu assembly.
//!
//! Each downloadable Format becomes one entry keyed by its human label: a
//! pre-built archive, a single direct URL, or a list of URLs the browser zips
//! itself. The last option only works when every URL is fetch-safe; Formats
//! that cannot be served consistently are left out.

use meshdepot_core::models::{Asset, AssetId, Format, FormatId, License, Resource, Role};
use meshdepot_core::AppError;
use meshdepot_db::AssetStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::cors::CorsGate;

/// Which sibling Format supplied the dependent resources of a zip entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Remediation {
    pub sibling_format_id: FormatId,
    pub sibling_role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadEntry {
    Direct {
        url: String,
    },
    Archive {
        url: String,
    },
    Zip {
        urls: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remediation: Option<Remediation>,
    },
}

/// Older glTF exports and their re-exports each carry the other's known-good buffers.
fn remediation_sibling_role(role: Role) -> Option<Role> {
    match role {
        Role::UpdatedGltf => Some(Role::Gltf),
        Role::Gltf => Some(Role::UpdatedGltf),
        _ => None,
    }
}

fn sorted_by_id(resources: &[Resource]) -> Vec<&Resource> {
    let mut sorted: Vec<&Resource> = resources.iter().collect();
    sorted.sort_by_key(|r| r.id);
    sorted
}

fn entry_for(format: &Format, formats: &[Format], gate: &CorsGate) -> Option<DownloadEntry> {
    if let Some(url) = &format.archive_url {
        return Some(DownloadEntry::Archive { url: url.clone() });
    }

    let sibling = remediation_sibling_role(format.role).and_then(|role| {
        formats
            .iter()
            .filter(|f| f.id != format.id && f.role == role)
            .min_by_key(|f| f.id)
    });

    let dependents = match sibling {
        Some(sibling) => sorted_by_id(sibling.state.resources()),
        None => sorted_by_id(format.state.resources()),
    };

    let resolved: Vec<&Resource> = format
        .root()
        .into_iter()
        .chain(dependents)
        .filter(|r| r.is_resolvable())
        .collect();

    match resolved.as_slice() {
        [] => {
            tracing::debug!(format_id = %format.id, "No resolvable resources, omitting download");
            None
        }
        [only] => only.resolved_url().map(|url| DownloadEntry::Direct {
            url: url.to_string(),
        }),
        many if many.iter().all(|r| gate.is_fetch_safe(r)) => Some(DownloadEntry::Zip {
            urls: many
                .iter()
                .filter_map(|r| r.resolved_url().map(String::from))
                .collect(),
            remediation: sibling.map(|s| Remediation {
                sibling_format_id: s.id,
                sibling_role: s.role,
            }),
        }),
        _ => {
            tracing::debug!(
                format_id = %format.id,
                "Resources not all fetch-safe, omitting download"
            );
            None
        }
    }
}

/// Build the label-ordered download menu for an asset.
///
/// Formats are visited in ascending id; the first one producing an entry owns
/// its label.
pub fn bundle(asset: &Asset, formats: &[Format], gate: &CorsGate) -> BTreeMap<String, DownloadEntry> {
    let mut ordered: Vec<&Format> = formats.iter().collect();
    ordered.sort_by_key(|f| f.id);

    let mut menu = BTreeMap::new();
    for format in ordered {
        if !License::permits_download(asset.license, format.role, format.format_type) {
            continue;
        }

        let label = format.download_label();
        if menu.contains_key(&label) {
            tracing::debug!(format_id = %format.id, label = %label, "Duplicate download label dropped");
            continue;
        }

        if let Some(entry) = entry_for(format, formats, gate) {
            menu.insert(label, entry);
        }
    }
    menu
}

#[derive(Clone)]
pub struct DownloadBundler {
    store: Arc<dyn AssetStore>,
    gate: Arc<CorsGate>,
}

impl DownloadBundler {
    pub fn new(store: Arc<dyn AssetStore>, gate: Arc<CorsGate>) -> Self {
        Self { store, gate }
    }

    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn downloads(
        &self,
        asset_id: AssetId,
    ) -> Result<BTreeMap<String, DownloadEntry>, AppError> {
        let asset = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;
        let formats = self.store.list_formats(asset_id).await?;
        Ok(bundle(&asset, &formats, &self.gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshdepot_core::models::{AssetStatus, FormatState, FormatType, StoredFile};
    use uuid::Uuid;

    fn gate() -> CorsGate {
        CorsGate::new(["archive.org"], "https://files.meshdepot.test").unwrap()
    }

    fn asset(license: Option<License>) -> Asset {
        Asset {
            id: 1,
            owner_id: Uuid::nil(),
            name: "model".to_string(),
            description: None,
            license,
            status: AssetStatus::Complete,
            is_blocks_origin: false,
            thumbnail: None,
            preferred_viewer_override_id: None,
            preferred_viewer_format_id: None,
            is_viewer_compatible: false,
            upload_manifest: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn remote(id: i64, url: &str) -> Resource {
        Resource {
            id,
            asset_id: 1,
            format_id: None,
            file: None,
            external_url: Some(url.to_string()),
            file_name: url.rsplit('/').next().unwrap_or(url).to_string(),
            content_type: None,
            created_at: Utc::now(),
        }
    }

    fn hosted(id: i64, name: &str) -> Resource {
        Resource {
            file: Some(StoredFile {
                key: format!("assets/1/{}", name),
                url: format!("http://localhost:4000/files/assets/1/{}", name),
            }),
            external_url: None,
            ..remote(id, name)
        }
    }

    fn dangling(id: i64) -> Resource {
        Resource {
            external_url: None,
            ..remote(id, "lost.bin")
        }
    }

    fn format(id: FormatId, role: Role, root: Option<Resource>, extras: Vec<Resource>) -> Format {
        Format {
            id,
            asset_id: 1,
            format_type: FormatType::Gltf2,
            role,
            archive_url: None,
            state: FormatState::from_parts(root, extras),
            is_preferred_for_viewer: false,
            is_preferred_for_download: false,
            triangle_count: None,
            lineage_id: None,
            created_at: Utc::now(),
        }
    }

    const CC_BY: Option<License> = Some(License::CcBy);

    #[test]
    fn test_allow_listed_resources_are_zipped() {
        let formats = vec![format(
            1,
            Role::Gltf,
            Some(remote(10, "https://archive.org/a.gltf")),
            vec![remote(11, "https://ia801.archive.org/a.bin")],
        )];
        let menu = bundle(&asset(CC_BY), &formats, &gate());
        assert_eq!(
            menu.get("glTF File"),
            Some(&DownloadEntry::Zip {
                urls: vec![
                    "https://archive.org/a.gltf".to_string(),
                    "https://ia801.archive.org/a.bin".to_string(),
                ],
                remediation: None,
            })
        );
    }

    #[test]
    fn test_mixed_safety_omits_format() {
        let formats = vec![format(
            1,
            Role::Gltf,
            Some(remote(10, "https://archive.org/a.gltf")),
            vec![remote(11, "https://elsewhere.test/a.bin")],
        )];
        assert!(bundle(&asset(CC_BY), &formats, &gate()).is_empty());
    }

    #[test]
    fn test_single_resource_is_direct_regardless_of_host() {
        let formats = vec![format(
            1,
            Role::UserSubmitted,
            Some(remote(10, "https://elsewhere.test/a.gltf")),
            vec![dangling(11)],
        )];
        let menu = bundle(&asset(CC_BY), &formats, &gate());
        assert_eq!(
            menu.get("GLTF2 File"),
            Some(&DownloadEntry::Direct {
                url: "https://elsewhere.test/a.gltf".to_string()
            })
        );
    }

    #[test]
    fn test_unresolvable_resources_never_yield_urls() {
        let formats = vec![format(1, Role::Gltf, Some(dangling(10)), vec![dangling(11)])];
        assert!(bundle(&asset(CC_BY), &formats, &gate()).is_empty());
    }

    #[test]
    fn test_archive_url_wins() {
        let mut f = format(1, Role::Gltf, Some(dangling(10)), Vec::new());
        f.archive_url = Some("https://archive.org/model.zip".to_string());
        let menu = bundle(&asset(CC_BY), &[f], &gate());
        assert_eq!(
            menu.get("glTF File"),
            Some(&DownloadEntry::Archive {
                url: "https://archive.org/model.zip".to_string()
            })
        );
    }

    #[test]
    fn test_updated_gltf_uses_sibling_buffers_and_vice_versa() {
        let formats = vec![
            format(
                1,
                Role::Gltf,
                Some(hosted(10, "old.gltf")),
                vec![hosted(12, "old.bin")],
            ),
            format(
                2,
                Role::UpdatedGltf,
                Some(hosted(20, "new.gltf")),
                vec![hosted(21, "new.bin")],
            ),
        ];
        let menu = bundle(&asset(CC_BY), &formats, &gate());

        let Some(DownloadEntry::Zip { urls, remediation }) = menu.get("Updated glTF File") else {
            panic!("expected zip entry");
        };
        assert!(urls[0].ends_with("new.gltf"));
        assert!(urls[1].ends_with("old.bin"));
        assert_eq!(
            *remediation,
            Some(Remediation {
                sibling_format_id: 1,
                sibling_role: Role::Gltf
            })
        );

        let Some(DownloadEntry::Zip { urls, remediation }) = menu.get("glTF File") else {
            panic!("expected zip entry");
        };
        assert!(urls[0].ends_with("old.gltf"));
        assert!(urls[1].ends_with("new.bin"));
        assert_eq!(remediation.map(|r| r.sibling_format_id), Some(2));
    }

    #[test]
    fn test_first_format_per_label_wins() {
        let formats = vec![
            format(7, Role::Gltf, Some(hosted(70, "late.gltf")), Vec::new()),
            format(3, Role::Gltf, Some(hosted(30, "early.gltf")), Vec::new()),
        ];
        let menu = bundle(&asset(CC_BY), &formats, &gate());
        assert_eq!(menu.len(), 1);
        let Some(DownloadEntry::Direct { url }) = menu.get("glTF File") else {
            panic!("expected direct entry");
        };
        assert!(url.ends_with("early.gltf"));
    }

    #[test]
    fn test_license_filters_formats() {
        let mut tilt = format(2, Role::Tilt, Some(hosted(20, "a.tilt")), Vec::new());
        tilt.format_type = FormatType::Tilt;
        let formats = vec![format(1, Role::Gltf, Some(hosted(10, "a.gltf")), Vec::new()), tilt];

        assert!(bundle(&asset(None), &formats, &gate()).is_empty());
        assert!(bundle(&asset(Some(License::AllRightsReserved)), &formats, &gate()).is_empty());

        let no_derivatives = bundle(&asset(Some(License::CcByNd)), &formats, &gate());
        assert_eq!(no_derivatives.keys().collect::<Vec<_>>(), vec!["glTF File"]);

        let open = bundle(&asset(CC_BY), &formats, &gate());
        assert_eq!(open.keys().collect::<Vec<_>>(), vec!["Tilt File", "glTF File"]);
    }
}
