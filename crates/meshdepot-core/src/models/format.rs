use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;

use super::asset::AssetId;
use super::resource::{Resource, ResourceId};
use crate::error::{AppError, IntegrityError};

pub type FormatId = i64;

/// Renderable file formats known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatType {
    Tilt,
    Blocks,
    Glb,
    Gltf1,
    Gltf2,
    Obj,
    ObjNgon,
    Fbx,
    Usdz,
    Ply,
    Stl,
    Ksplat,
    Sog,
    Spz,
    Splat,
    Vox,
}

impl FormatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatType::Tilt => "TILT",
            FormatType::Blocks => "BLOCKS",
            FormatType::Glb => "GLB",
            FormatType::Gltf1 => "GLTF1",
            FormatType::Gltf2 => "GLTF2",
            FormatType::Obj => "OBJ",
            FormatType::ObjNgon => "OBJ_NGON",
            FormatType::Fbx => "FBX",
            FormatType::Usdz => "USDZ",
            FormatType::Ply => "PLY",
            FormatType::Stl => "STL",
            FormatType::Ksplat => "KSPLAT",
            FormatType::Sog => "SOG",
            FormatType::Spz => "SPZ",
            FormatType::Splat => "SPLAT",
            FormatType::Vox => "VOX",
        }
    }
}

impl Display for FormatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TILT" => Ok(FormatType::Tilt),
            "BLOCKS" => Ok(FormatType::Blocks),
            "GLB" => Ok(FormatType::Glb),
            "GLTF1" => Ok(FormatType::Gltf1),
            "GLTF2" => Ok(FormatType::Gltf2),
            "OBJ" => Ok(FormatType::Obj),
            "OBJ_NGON" => Ok(FormatType::ObjNgon),
            "FBX" => Ok(FormatType::Fbx),
            "USDZ" => Ok(FormatType::Usdz),
            "PLY" => Ok(FormatType::Ply),
            "STL" => Ok(FormatType::Stl),
            "KSPLAT" => Ok(FormatType::Ksplat),
            "SOG" => Ok(FormatType::Sog),
            "SPZ" => Ok(FormatType::Spz),
            "SPLAT" => Ok(FormatType::Splat),
            "VOX" => Ok(FormatType::Vox),
            _ => Err(anyhow::anyhow!("Invalid format type: {}", s)),
        }
    }
}

/// Provenance of a Format, independent of its file type.
///
/// Historic rows stored roles as integers; `from_legacy_code` maps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(rename = "ORIGINAL_OBJ_FORMAT")]
    OriginalObj,
    #[serde(rename = "TILT_FORMAT")]
    Tilt,
    #[serde(rename = "ORIGINAL_FBX_FORMAT")]
    OriginalFbx,
    #[serde(rename = "USD_FORMAT")]
    Usd,
    #[serde(rename = "BLOCKS_FORMAT")]
    Blocks,
    #[serde(rename = "GLTF_FORMAT")]
    Gltf,
    #[serde(rename = "ORIGINAL_TRIANGULATED_OBJ_FORMAT")]
    OriginalTriangulatedObj,
    #[serde(rename = "UPDATED_GLTF_FORMAT")]
    UpdatedGltf,
    #[serde(rename = "USDZ_FORMAT")]
    Usdz,
    #[serde(rename = "USER_SUBMITTED")]
    UserSubmitted,
}

const LEGACY_ROLE_CODES: &[(i32, Role)] = &[
    (1, Role::OriginalObj),
    (2, Role::Tilt),
    (4, Role::OriginalFbx),
    (6, Role::Usd),
    (7, Role::Blocks),
    (12, Role::Gltf),
    (24, Role::OriginalTriangulatedObj),
    (30, Role::UpdatedGltf),
    (32, Role::Usdz),
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OriginalObj => "ORIGINAL_OBJ_FORMAT",
            Role::Tilt => "TILT_FORMAT",
            Role::OriginalFbx => "ORIGINAL_FBX_FORMAT",
            Role::Usd => "USD_FORMAT",
            Role::Blocks => "BLOCKS_FORMAT",
            Role::Gltf => "GLTF_FORMAT",
            Role::OriginalTriangulatedObj => "ORIGINAL_TRIANGULATED_OBJ_FORMAT",
            Role::UpdatedGltf => "UPDATED_GLTF_FORMAT",
            Role::Usdz => "USDZ_FORMAT",
            Role::UserSubmitted => "USER_SUBMITTED",
        }
    }

    pub fn from_legacy_code(code: i32) -> Result<Self, AppError> {
        LEGACY_ROLE_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, role)| *role)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown legacy role code: {}", code)))
    }

    /// `None` for roles introduced after integer codes were retired.
    pub fn legacy_code(&self) -> Option<i32> {
        LEGACY_ROLE_CODES
            .iter()
            .find(|(_, role)| role == self)
            .map(|(code, _)| *code)
    }

    /// Source files are the editable originals rather than exported derivatives.
    pub fn is_source(&self, format_type: FormatType) -> bool {
        match self {
            Role::Tilt | Role::Blocks => true,
            Role::UserSubmitted => matches!(format_type, FormatType::Tilt | FormatType::Blocks),
            _ => false,
        }
    }

    /// Human label shown on the download menu.
    pub fn download_label(&self, format_type: FormatType) -> String {
        match self {
            Role::OriginalObj => "Original OBJ File".to_string(),
            Role::Tilt => "Tilt File".to_string(),
            Role::OriginalFbx => "Original FBX File".to_string(),
            Role::Usd => "USD File".to_string(),
            Role::Blocks => "Blocks File".to_string(),
            Role::Gltf => "glTF File".to_string(),
            Role::OriginalTriangulatedObj => "Triangulated OBJ File".to_string(),
            Role::UpdatedGltf => "Updated glTF File".to_string(),
            Role::Usdz => "USDZ File".to_string(),
            Role::UserSubmitted => format!("{} File", format_type.as_str()),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORIGINAL_OBJ_FORMAT" => Ok(Role::OriginalObj),
            "TILT_FORMAT" => Ok(Role::Tilt),
            "ORIGINAL_FBX_FORMAT" => Ok(Role::OriginalFbx),
            "USD_FORMAT" => Ok(Role::Usd),
            "BLOCKS_FORMAT" => Ok(Role::Blocks),
            "GLTF_FORMAT" => Ok(Role::Gltf),
            "ORIGINAL_TRIANGULATED_OBJ_FORMAT" => Ok(Role::OriginalTriangulatedObj),
            "UPDATED_GLTF_FORMAT" => Ok(Role::UpdatedGltf),
            "USDZ_FORMAT" => Ok(Role::Usdz),
            "USER_SUBMITTED" => Ok(Role::UserSubmitted),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// Which resources a Format holds.
///
/// A root, once promoted, is never part of `resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FormatState {
    /// No root yet; importers may have attached loose resources.
    Bare { resources: Vec<Resource> },
    RootOnly { root: Resource },
    RootWithExtras {
        root: Resource,
        resources: Vec<Resource>,
    },
}

impl Default for FormatState {
    fn default() -> Self {
        FormatState::Bare {
            resources: Vec::new(),
        }
    }
}

impl FormatState {
    pub fn from_parts(root: Option<Resource>, resources: Vec<Resource>) -> Self {
        match (root, resources.is_empty()) {
            (None, _) => FormatState::Bare { resources },
            (Some(root), true) => FormatState::RootOnly { root },
            (Some(root), false) => FormatState::RootWithExtras { root, resources },
        }
    }

    pub fn root(&self) -> Option<&Resource> {
        match self {
            FormatState::Bare { .. } => None,
            FormatState::RootOnly { root } | FormatState::RootWithExtras { root, .. } => {
                Some(root)
            }
        }
    }

    /// Non-root resources.
    pub fn resources(&self) -> &[Resource] {
        match self {
            FormatState::Bare { resources } | FormatState::RootWithExtras { resources, .. } => {
                resources
            }
            FormatState::RootOnly { .. } => &[],
        }
    }

    /// Root first, then the remaining resources in stored order.
    pub fn all(&self) -> impl Iterator<Item = &Resource> {
        self.root().into_iter().chain(self.resources().iter())
    }

    pub fn attach(&mut self, resource: Resource) {
        *self = match std::mem::take(self) {
            FormatState::Bare { mut resources } => {
                resources.push(resource);
                FormatState::Bare { resources }
            }
            FormatState::RootOnly { root } => FormatState::RootWithExtras {
                root,
                resources: vec![resource],
            },
            FormatState::RootWithExtras {
                root,
                mut resources,
            } => {
                resources.push(resource);
                FormatState::RootWithExtras { root, resources }
            }
        };
    }

    /// Detach `resource_id` from the collection and make it the root.
    ///
    /// On error the state is left unchanged.
    pub fn promote_root(
        &mut self,
        format_id: FormatId,
        resource_id: ResourceId,
    ) -> Result<(), IntegrityError> {
        let resources = match self {
            FormatState::Bare { resources } => resources,
            _ => return Err(IntegrityError::RootAlreadyAssigned { format_id }),
        };

        let position = resources
            .iter()
            .position(|r| r.id == resource_id)
            .ok_or(IntegrityError::ResourceNotAttached {
                resource_id,
                format_id,
            })?;

        let mut root = resources.remove(position);
        root.format_id = None;
        let rest = std::mem::take(resources);
        *self = FormatState::from_parts(Some(root), rest);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub id: FormatId,
    pub asset_id: AssetId,
    pub format_type: FormatType,
    pub role: Role,
    /// Pre-built remote zip of every resource, when an importer provided one.
    pub archive_url: Option<String>,
    pub state: FormatState,
    pub is_preferred_for_viewer: bool,
    pub is_preferred_for_download: bool,
    pub triangle_count: Option<i64>,
    pub lineage_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Format {
    pub fn root(&self) -> Option<&Resource> {
        self.state.root()
    }

    pub fn download_label(&self) -> String {
        self.role.download_label(self.format_type)
    }
}

#[derive(Debug, Clone)]
pub struct NewFormat {
    pub asset_id: AssetId,
    pub format_type: FormatType,
    pub role: Role,
    pub archive_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: ResourceId, format_id: Option<FormatId>, name: &str) -> Resource {
        Resource {
            id,
            asset_id: 1,
            format_id,
            file: None,
            external_url: Some(format!("https://example.com/{}", name)),
            file_name: name.to_string(),
            content_type: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_legacy_codes_map_to_roles() {
        assert_eq!(Role::from_legacy_code(1).unwrap(), Role::OriginalObj);
        assert_eq!(Role::from_legacy_code(2).unwrap(), Role::Tilt);
        assert_eq!(Role::from_legacy_code(4).unwrap(), Role::OriginalFbx);
        assert_eq!(Role::from_legacy_code(6).unwrap(), Role::Usd);
        assert_eq!(Role::from_legacy_code(7).unwrap(), Role::Blocks);
        assert_eq!(Role::from_legacy_code(12).unwrap(), Role::Gltf);
        assert_eq!(
            Role::from_legacy_code(24).unwrap(),
            Role::OriginalTriangulatedObj
        );
        assert_eq!(Role::from_legacy_code(30).unwrap(), Role::UpdatedGltf);
        assert_eq!(Role::from_legacy_code(32).unwrap(), Role::Usdz);
    }

    #[test]
    fn test_unknown_legacy_code_is_invalid_input() {
        let err = Role::from_legacy_code(3).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(Role::UserSubmitted.legacy_code(), None);
        assert_eq!(Role::UpdatedGltf.legacy_code(), Some(30));
    }

    #[test]
    fn test_role_and_type_serialize_as_wire_names() {
        assert_eq!(
            serde_json::to_value(Role::OriginalTriangulatedObj).unwrap(),
            "ORIGINAL_TRIANGULATED_OBJ_FORMAT"
        );
        assert_eq!(serde_json::to_value(FormatType::ObjNgon).unwrap(), "OBJ_NGON");
        assert_eq!(serde_json::to_value(FormatType::Gltf2).unwrap(), "GLTF2");
        assert_eq!("KSPLAT".parse::<FormatType>().unwrap(), FormatType::Ksplat);
    }

    #[test]
    fn test_download_labels() {
        assert_eq!(Role::Gltf.download_label(FormatType::Gltf2), "glTF File");
        assert_eq!(Role::UserSubmitted.download_label(FormatType::Glb), "GLB File");
    }

    #[test]
    fn test_promote_root_detaches_resource() {
        let mut state = FormatState::Bare {
            resources: vec![resource(1, Some(9), "a.obj"), resource(2, Some(9), "a.mtl")],
        };
        state.promote_root(9, 1).unwrap();

        let root = state.root().unwrap();
        assert_eq!(root.id, 1);
        assert_eq!(root.format_id, None);
        assert_eq!(state.resources().len(), 1);
        assert_eq!(state.resources()[0].id, 2);
    }

    #[test]
    fn test_promote_sole_resource_gives_root_only() {
        let mut state = FormatState::Bare {
            resources: vec![resource(1, Some(9), "a.glb")],
        };
        state.promote_root(9, 1).unwrap();
        assert!(matches!(state, FormatState::RootOnly { .. }));
    }

    #[test]
    fn test_promote_unattached_resource_is_integrity_error() {
        let mut state = FormatState::default();
        let err = state.promote_root(9, 42).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::ResourceNotAttached {
                resource_id: 42,
                format_id: 9
            }
        );
        assert_eq!(state, FormatState::default());
    }

    #[test]
    fn test_promote_twice_is_integrity_error() {
        let mut state = FormatState::Bare {
            resources: vec![resource(1, Some(9), "a.glb"), resource(2, Some(9), "a.bin")],
        };
        state.promote_root(9, 1).unwrap();
        let err = state.promote_root(9, 2).unwrap_err();
        assert_eq!(err, IntegrityError::RootAlreadyAssigned { format_id: 9 });
    }

    #[test]
    fn test_attach_moves_root_only_to_root_with_extras() {
        let mut state = FormatState::RootOnly {
            root: resource(1, None, "a.gltf"),
        };
        state.attach(resource(2, Some(9), "a.bin"));
        assert!(matches!(state, FormatState::RootWithExtras { .. }));
        let ids: Vec<_> = state.all().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
