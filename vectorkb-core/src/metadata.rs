//! Companion metadata handling.
//!
//! Every document object `<key>` has a sidecar `<key>.metadata.json` with
//! required `category` (string or list) and `industry` fields plus arbitrary
//! extras. Consolidation adds system fields and derives the three labeled
//! columns that get their own 256-dim embeddings:
//! - `category`  — the joined category list
//! - `provider`  — explicit `provider` field, falling back to `industry`
//! - `doc_type`  — explicit `type` field, falling back to the file extension

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::KbError;

/// Suffix appended to a document key to locate its companion metadata object.
pub const METADATA_SUFFIX: &str = ".metadata.json";

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub category: Vec<String>,
    pub industry: String,
    pub provider: String,
    pub doc_type: String,
    pub source_file: String,
    pub file_extension: String,
    pub processed_at: DateTime<Utc>,
    pub extra: serde_json::Map<String, Value>,
}

impl DocumentMetadata {
    /// Parse a companion metadata JSON document for the given object key.
    pub fn from_companion_json(raw: &str, key: &str) -> Result<Self, KbError> {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| {
            KbError::validation(format!("Invalid JSON in metadata file for {key}: {e}"))
        })?;

        let obj = parsed.as_object().ok_or_else(|| {
            KbError::validation(format!("Metadata file for {key} must be a JSON object"))
        })?;

        for field in ["category", "industry"] {
            if !obj.contains_key(field) {
                return Err(KbError::validation(format!(
                    "Missing required field in metadata: {field}"
                )));
            }
        }

        let category = normalize_category(&obj["category"]);
        let industry = text_value(&obj["industry"]);

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let file_extension = match filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        };

        let provider = obj
            .get("provider")
            .map(text_value)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| industry.clone());

        let doc_type = obj
            .get("type")
            .map(text_value)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| file_extension.clone());

        let extra: serde_json::Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "category" && k.as_str() != "industry")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            category,
            industry,
            provider,
            doc_type,
            source_file: filename,
            file_extension,
            processed_at: Utc::now(),
            extra,
        })
    }

    /// The joined category list, as stored in the `category` column and
    /// embedded at 256 dims.
    pub fn category_text(&self) -> String {
        self.category.join(", ")
    }

    /// Consolidated metadata with system fields, keys in sorted order.
    pub fn consolidated_map(&self) -> BTreeMap<String, Value> {
        let mut map: BTreeMap<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert("category".to_string(), Value::from(self.category.clone()));
        map.insert("industry".to_string(), Value::from(self.industry.clone()));
        map.insert(
            "source_file".to_string(),
            Value::from(self.source_file.clone()),
        );
        map.insert(
            "file_extension".to_string(),
            Value::from(self.file_extension.clone()),
        );
        map.insert(
            "processed_at".to_string(),
            Value::from(self.processed_at.to_rfc3339()),
        );
        map
    }

    /// Consolidated metadata as a JSON value (what lands in the JSONB column).
    pub fn consolidated_json(&self) -> Value {
        Value::Object(self.consolidated_map().into_iter().collect())
    }

    /// Canonical sorted-keys JSON string, embedded at 512 dims.
    pub fn consolidated_text(&self) -> String {
        serde_json::to_string(&self.consolidated_map()).unwrap_or_default()
    }
}

/// Coerce a JSON value into category strings: comma-split strings, arrays of
/// values, or a single stringified fallback.
fn normalize_category(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split(',').map(|c| c.trim().to_string()).collect(),
        Value::Array(items) => items.iter().map(text_value).collect(),
        other => vec![text_value(other)],
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_category_is_validation_error() {
        let raw = r#"{"industry": "finance"}"#;
        let err = DocumentMetadata::from_companion_json(raw, "docs/report.txt").unwrap_err();
        assert_eq!(err.error_type(), "validation_error");
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_missing_industry_is_validation_error() {
        let raw = r#"{"category": "pricing"}"#;
        let err = DocumentMetadata::from_companion_json(raw, "docs/report.txt").unwrap_err();
        assert!(err.to_string().contains("industry"));
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = DocumentMetadata::from_companion_json("{not json", "a.txt").unwrap_err();
        assert_eq!(err.error_type(), "validation_error");
    }

    #[test]
    fn test_comma_separated_category_is_split() {
        let raw = r#"{"category": "pricing, compute , storage", "industry": "cloud"}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        assert_eq!(meta.category, vec!["pricing", "compute", "storage"]);
        assert_eq!(meta.category_text(), "pricing, compute, storage");
    }

    #[test]
    fn test_category_list_is_preserved() {
        let raw = r#"{"category": ["pricing", "compute"], "industry": "cloud"}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        assert_eq!(meta.category, vec!["pricing", "compute"]);
    }

    #[test]
    fn test_file_info_derived_from_key() {
        let raw = r#"{"category": "x", "industry": "cloud"}"#;
        let meta =
            DocumentMetadata::from_companion_json(raw, "docs/2024/EC2-Pricing.TXT").unwrap();
        assert_eq!(meta.source_file, "EC2-Pricing.TXT");
        assert_eq!(meta.file_extension, "txt");
        // doc_type falls back to the extension
        assert_eq!(meta.doc_type, "txt");
    }

    #[test]
    fn test_provider_falls_back_to_industry() {
        let raw = r#"{"category": "x", "industry": "healthcare"}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        assert_eq!(meta.provider, "healthcare");

        let raw = r#"{"category": "x", "industry": "healthcare", "provider": "aws"}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        assert_eq!(meta.provider, "aws");
    }

    #[test]
    fn test_explicit_type_overrides_extension() {
        let raw = r#"{"category": "x", "industry": "cloud", "type": "whitepaper"}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        assert_eq!(meta.doc_type, "whitepaper");
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let raw = r#"{"category": "x", "industry": "cloud", "author": "ops", "rev": 3}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        let json = meta.consolidated_json();
        assert_eq!(json["author"], "ops");
        assert_eq!(json["rev"], 3);
        assert_eq!(json["industry"], "cloud");
        assert!(json["processed_at"].is_string());
    }

    #[test]
    fn test_consolidated_text_has_sorted_keys() {
        let raw = r#"{"category": "x", "industry": "cloud", "zeta": 1, "alpha": 2}"#;
        let meta = DocumentMetadata::from_companion_json(raw, "a.txt").unwrap();
        let text = meta.consolidated_text();
        let alpha = text.find("\"alpha\"").unwrap();
        let zeta = text.find("\"zeta\"").unwrap();
        let category = text.find("\"category\"").unwrap();
        assert!(alpha < category);
        assert!(category < zeta);
    }
}
