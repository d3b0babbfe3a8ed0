//! Shared key generation for storage backends.
//!
//! Key format: `assets/{asset_id}/{filename}`.

use crate::traits::{StorageError, StorageResult};

/// Generate the storage key for a file uploaded to an asset.
///
/// `filename` must already be a bare file name; anything that could escape the
/// asset prefix is rejected.
pub fn asset_file_key(asset_id: i64, filename: &str) -> StorageResult<String> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename == "."
        || filename == ".."
    {
        return Err(StorageError::InvalidKey(format!(
            "Invalid file name for storage: {}",
            filename
        )));
    }
    Ok(format!("assets/{}/{}", asset_id, filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_file_key() {
        assert_eq!(
            asset_file_key(42, "statue.obj").unwrap(),
            "assets/42/statue.obj"
        );
    }

    #[test]
    fn test_accepts_dots_inside_names() {
        assert_eq!(
            asset_file_key(7, "statue..obj").unwrap(),
            "assets/7/statue..obj"
        );
        assert!(asset_file_key(7, "a..b.png").is_ok());
        assert!(asset_file_key(7, "..").is_err());
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(asset_file_key(1, "../etc/passwd").is_err());
        assert!(asset_file_key(1, "dir/file.bin").is_err());
        assert!(asset_file_key(1, "").is_err());
    }
}
