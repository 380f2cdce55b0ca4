pub mod in_memory;
pub mod local;

use crate::core::errors::TripsplitError;
use async_trait::async_trait;

/// Storage for attachment payloads, addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), TripsplitError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TripsplitError>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TripsplitError>;
}

/// Build a unique key for an uploaded file, keeping a filesystem-safe
/// version of its original name for readability.
pub fn blob_key(id: &str, original_filename: &str) -> String {
    let safe: String = original_filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect();
    let safe = safe.trim_start_matches('.');
    if safe.is_empty() {
        id.to_string()
    } else {
        format!("{}_{}", id, safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_path_safe() {
        assert_eq!(blob_key("k1", "receipt 01.pdf"), "k1_receipt_01.pdf");
        assert_eq!(blob_key("k1", "../../etc/passwd"), "k1__.._etc_passwd");
        assert_eq!(blob_key("k1", "..."), "k1");
    }
}
