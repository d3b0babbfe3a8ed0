//! File classification by extension.

use meshdepot_core::models::FormatType;
use std::path::Path;

/// Families a classified upload file can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFamily {
    Tilt,
    Gltf2,
    Obj,
    Fbx,
    Bin,
    Mtl,
    Fbm,
    Image,
}

impl FileFamily {
    /// Main files become the root of their own Format.
    pub fn is_main(&self) -> bool {
        matches!(
            self,
            FileFamily::Tilt | FileFamily::Gltf2 | FileFamily::Obj | FileFamily::Fbx
        )
    }

    /// Whether a dependent file of family `sub` may be attached to a Format
    /// rooted at a main file of this family.
    pub fn accepts(&self, sub: FileFamily) -> bool {
        matches!(
            (self, sub),
            (FileFamily::Gltf2, FileFamily::Bin)
                | (FileFamily::Gltf2, FileFamily::Image)
                | (FileFamily::Obj, FileFamily::Mtl)
                | (FileFamily::Obj, FileFamily::Image)
                | (FileFamily::Fbx, FileFamily::Fbm)
                | (FileFamily::Fbx, FileFamily::Image)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub family: FileFamily,
    /// Set for main files only.
    pub format_type: Option<FormatType>,
}

impl Classification {
    pub fn is_main(&self) -> bool {
        self.format_type.is_some()
    }
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Classify a file by its extension. Unknown extensions yield `None` and the
/// file is dropped from the upload.
pub fn classify(file_name: &str) -> Option<Classification> {
    let ext = extension_of(file_name)?;
    let (family, format_type) = match ext.as_str() {
        "tilt" => (FileFamily::Tilt, Some(FormatType::Tilt)),
        "glb" => (FileFamily::Gltf2, Some(FormatType::Glb)),
        "gltf" => (FileFamily::Gltf2, Some(FormatType::Gltf2)),
        "obj" => (FileFamily::Obj, Some(FormatType::Obj)),
        "fbx" => (FileFamily::Fbx, Some(FormatType::Fbx)),
        "bin" => (FileFamily::Bin, None),
        "mtl" => (FileFamily::Mtl, None),
        "fbm" => (FileFamily::Fbm, None),
        "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp" | "bmp" => (FileFamily::Image, None),
        _ => return None,
    };
    Some(Classification {
        family,
        format_type,
    })
}

pub fn is_archive(file_name: &str) -> bool {
    extension_of(file_name).as_deref() == Some("zip")
}

/// True when the name alone identifies a main file, before any unpacking.
pub fn is_main_file(file_name: &str) -> bool {
    classify(file_name).is_some_and(|c| c.is_main())
}

pub fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("glb") => "model/gltf-binary",
        Some("gltf") => "model/gltf+json",
        Some("obj") => "model/obj",
        Some("mtl") => "model/mtl",
        Some("fbx") => "application/octet-stream",
        Some("tilt") => "application/octet-stream",
        Some("bin") => "application/octet-stream",
        Some("usdz") => "model/vnd.usdz+zip",
        Some("ply") => "application/ply",
        Some("stl") => "model/stl",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FAMILIES: [FileFamily; 8] = [
        FileFamily::Tilt,
        FileFamily::Gltf2,
        FileFamily::Obj,
        FileFamily::Fbx,
        FileFamily::Bin,
        FileFamily::Mtl,
        FileFamily::Fbm,
        FileFamily::Image,
    ];

    #[test]
    fn test_main_files() {
        let cases = [
            ("sketch.tilt", FileFamily::Tilt, FormatType::Tilt),
            ("model.glb", FileFamily::Gltf2, FormatType::Glb),
            ("model.GLTF", FileFamily::Gltf2, FormatType::Gltf2),
            ("statue.obj", FileFamily::Obj, FormatType::Obj),
            ("rig.fbx", FileFamily::Fbx, FormatType::Fbx),
        ];
        for (name, family, format_type) in cases {
            let c = classify(name).unwrap();
            assert_eq!(c.family, family, "{}", name);
            assert_eq!(c.format_type, Some(format_type), "{}", name);
            assert!(c.is_main());
        }
    }

    #[test]
    fn test_dependent_files() {
        for (name, family) in [
            ("buffer.bin", FileFamily::Bin),
            ("statue.mtl", FileFamily::Mtl),
            ("rig.fbm", FileFamily::Fbm),
            ("a.jpg", FileFamily::Image),
            ("a.JPEG", FileFamily::Image),
            ("a.png", FileFamily::Image),
            ("a.tif", FileFamily::Image),
            ("a.tiff", FileFamily::Image),
            ("a.webp", FileFamily::Image),
            ("a.bmp", FileFamily::Image),
        ] {
            let c = classify(name).unwrap();
            assert_eq!(c.family, family, "{}", name);
            assert!(!c.is_main());
        }
    }

    #[test]
    fn test_unclassified() {
        assert!(classify("readme.txt").is_none());
        assert!(classify("noextension").is_none());
        assert!(classify("scene.usdz").is_none());
    }

    #[test]
    fn test_compatibility_table_is_exact() {
        let allowed = [
            (FileFamily::Gltf2, FileFamily::Bin),
            (FileFamily::Gltf2, FileFamily::Image),
            (FileFamily::Obj, FileFamily::Mtl),
            (FileFamily::Obj, FileFamily::Image),
            (FileFamily::Fbx, FileFamily::Fbm),
            (FileFamily::Fbx, FileFamily::Image),
        ];
        for main in ALL_FAMILIES {
            for sub in ALL_FAMILIES {
                assert_eq!(
                    main.accepts(sub),
                    allowed.contains(&(main, sub)),
                    "{:?} <- {:?}",
                    main,
                    sub
                );
            }
        }
    }

    #[test]
    fn test_archive_detection() {
        assert!(is_archive("upload.ZIP"));
        assert!(!is_archive("upload.tilt"));
        assert!(is_main_file("x.fbx"));
        assert!(!is_main_file("x.mtl"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.glb"), "model/gltf-binary");
        assert_eq!(content_type_for("a.gltf"), "model/gltf+json");
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a.unknown"), "application/octet-stream");
    }
}
