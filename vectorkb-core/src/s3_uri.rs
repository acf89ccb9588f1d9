use crate::error::KbError;

/// Split an `s3://bucket/key` URI into its bucket and key components.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String), KbError> {
    let path = s3_uri
        .strip_prefix("s3://")
        .ok_or_else(|| KbError::validation(format!("Invalid S3 URI format: {s3_uri}")))?;

    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| KbError::validation(format!("Invalid S3 URI format: {s3_uri}")))?;

    if bucket.is_empty() || key.is_empty() {
        return Err(KbError::validation(format!(
            "Invalid S3 URI format: {s3_uri}"
        )));
    }

    Ok((bucket.to_string(), key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_uri() {
        let (bucket, key) = parse_s3_uri("s3://my-bucket/docs/file.txt").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "docs/file.txt");
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        assert!(parse_s3_uri("https://bucket/key").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        assert!(parse_s3_uri("s3://bucket").is_err());
        assert!(parse_s3_uri("s3://bucket/").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_bucket() {
        assert!(parse_s3_uri("s3:///key").is_err());
    }
}
