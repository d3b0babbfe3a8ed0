//! Upload payload builders.

use axum_test::multipart::{MultipartForm, Part};
use std::io::{Cursor, Write};
use zip::write::FileOptions;

/// Multipart form with one `file` part per entry.
pub fn upload_form(files: &[(&str, &[u8])]) -> MultipartForm {
    files
        .iter()
        .fold(MultipartForm::new(), |form, (name, data)| {
            form.add_part(
                "file",
                Part::bytes(data.to_vec())
                    .file_name(*name)
                    .mime_type("application/octet-stream"),
            )
        })
}

pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub const OBJ: &[u8] = b"mtllib statue.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
pub const MTL: &[u8] = b"newmtl stone\nmap_Kd statue_diffuse.png\n";
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";
pub const GLB: &[u8] = b"glTF\x02\x00\x00\x00";
pub const GLTF: &[u8] = br#"{"asset":{"version":"2.0"},"buffers":[{"uri":"model.bin"}]}"#;
pub const BIN: &[u8] = &[0, 1, 2, 3];
pub const FBX: &[u8] = b"Kaydara FBX Binary  \x00";
