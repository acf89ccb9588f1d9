use serde::{Deserialize, Serialize};

/// Queue message requesting ingestion of one S3 object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    pub s3_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_token() {
        let raw = r#"{"s3_uri": "s3://kb/docs/guide.txt", "jwt_token": "abc.def.ghi"}"#;
        let msg: IngestMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.s3_uri, "s3://kb/docs/guide.txt");
        assert_eq!(msg.jwt_token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_serialize_omits_missing_token() {
        let msg = IngestMessage {
            s3_uri: "s3://kb/docs/guide.txt".to_string(),
            jwt_token: None,
        };
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(!raw.contains("jwt_token"));
    }
}
