use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::format::{FormatId, FormatType, Role};
use super::resource::StoredFile;

pub type AssetId = i64;

/// Publication license attached to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum License {
    #[serde(rename = "CC_BY")]
    CcBy,
    #[serde(rename = "CC_BY_SA")]
    CcBySa,
    #[serde(rename = "CC_BY_ND")]
    CcByNd,
    #[serde(rename = "CC0")]
    Cc0,
    #[serde(rename = "ALL_RIGHTS_RESERVED")]
    AllRightsReserved,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            License::CcBy => "CC_BY",
            License::CcBySa => "CC_BY_SA",
            License::CcByNd => "CC_BY_ND",
            License::Cc0 => "CC0",
            License::AllRightsReserved => "ALL_RIGHTS_RESERVED",
        }
    }

    /// Whether a Format with the given role and type may be offered for download.
    ///
    /// No-derivatives licenses hide the source files (`.tilt`, Blocks) and
    /// expose every other role; reserved or missing licenses expose nothing.
    pub fn permits_download(license: Option<License>, role: Role, format_type: FormatType) -> bool {
        match license {
            None | Some(License::AllRightsReserved) => false,
            Some(License::CcByNd) => !role.is_source(format_type),
            Some(_) => true,
        }
    }
}

impl Display for License {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for License {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CC_BY" => Ok(License::CcBy),
            "CC_BY_SA" => Ok(License::CcBySa),
            "CC_BY_ND" => Ok(License::CcByNd),
            "CC0" => Ok(License::Cc0),
            "ALL_RIGHTS_RESERVED" => Ok(License::AllRightsReserved),
            _ => Err(anyhow::anyhow!("Invalid license: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Uploading,
    Complete,
    Failed,
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::Uploading => write!(f, "uploading"),
            AssetStatus::Complete => write!(f, "complete"),
            AssetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(AssetStatus::Uploading),
            "complete" => Ok(AssetStatus::Complete),
            "failed" => Ok(AssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub license: Option<License>,
    pub status: AssetStatus,
    pub is_blocks_origin: bool,
    pub thumbnail: Option<StoredFile>,
    /// Format chosen by a curator or pipeline; wins over ranking when its root resolves.
    pub preferred_viewer_override_id: Option<FormatId>,
    /// Written by reconciliation only.
    pub preferred_viewer_format_id: Option<FormatId>,
    /// Written by reconciliation only.
    pub is_viewer_compatible: bool,
    pub upload_manifest: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub license: Option<License>,
    pub is_blocks_origin: bool,
}

impl NewAsset {
    pub fn untitled(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            name: "Untitled".to_string(),
            description: None,
            license: None,
            is_blocks_origin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_license_string_round_trip() {
        for license in [
            License::CcBy,
            License::CcBySa,
            License::CcByNd,
            License::Cc0,
            License::AllRightsReserved,
        ] {
            assert_eq!(license.as_str().parse::<License>().unwrap(), license);
            assert_eq!(
                serde_json::to_value(license).unwrap(),
                serde_json::Value::String(license.as_str().to_string())
            );
        }
    }

    #[test]
    fn test_reserved_and_missing_licenses_permit_nothing() {
        for role in [Role::Tilt, Role::Gltf, Role::UserSubmitted] {
            assert!(!License::permits_download(None, role, FormatType::Glb));
            assert!(!License::permits_download(
                Some(License::AllRightsReserved),
                role,
                FormatType::Tilt
            ));
        }
    }

    #[test]
    fn test_no_derivatives_excludes_sources() {
        let nd = Some(License::CcByNd);
        assert!(!License::permits_download(nd, Role::Tilt, FormatType::Tilt));
        assert!(!License::permits_download(nd, Role::Blocks, FormatType::Blocks));
        assert!(!License::permits_download(nd, Role::UserSubmitted, FormatType::Tilt));
        assert!(License::permits_download(nd, Role::Gltf, FormatType::Gltf2));
        assert!(License::permits_download(nd, Role::UserSubmitted, FormatType::Glb));
        assert!(License::permits_download(nd, Role::UpdatedGltf, FormatType::Gltf2));
    }

    #[test]
    fn test_open_licenses_permit_everything() {
        assert!(License::permits_download(
            Some(License::CcBy),
            Role::UpdatedGltf,
            FormatType::Gltf2
        ));
        assert!(License::permits_download(
            Some(License::Cc0),
            Role::OriginalObj,
            FormatType::Obj
        ));
    }

    #[test]
    fn test_asset_status_parse() {
        assert_eq!("failed".parse::<AssetStatus>().unwrap(), AssetStatus::Failed);
        assert!("done".parse::<AssetStatus>().is_err());
    }
}
