pub mod archive;
pub mod description;
pub mod engine;
pub mod optimize;
pub mod profile;

use serde::Serialize;

use crate::error::{Result, TourError};

/// Pretty JSON for a document shipped inside an export
pub(crate) fn json_document<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| TourError::EncodingFailure(format!("json document: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unserializable_document_is_encoding_failure() {
        // JSON object keys must be strings
        let mut document = BTreeMap::new();
        document.insert(vec![1u8, 2], "value");

        assert!(matches!(json_document(&document), Err(TourError::EncodingFailure(_))));
    }

    #[test]
    fn test_document_is_pretty_printed() {
        let bytes = json_document(&serde_json::json!({"rooms": 2})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"rooms\": 2\n}");
    }
}
