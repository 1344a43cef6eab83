use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Parsed storage account connection string.
///
/// Supports the standard `Key=Value;` form with `AccountName`/`AccountKey`
/// pairs plus the optional `BlobEndpoint` override used by emulators and
/// sovereign clouds.
#[derive(Clone, Debug)]
pub struct ConnectionString {
    pub account_name: String,
    account_key: SecretString,
    pub blob_endpoint: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("connection string is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("connection string segment `{0}` is not a Key=Value pair")]
    MalformedSegment(String),
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ConnectionStringError> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = "https".to_string();
        let mut endpoint_suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;

        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            // AccountKey values are base64 and may contain `=` padding, so
            // only the first `=` separates key from value.
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;

            match key {
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => endpoint_suffix = value.to_string(),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let account_name =
            account_name.ok_or(ConnectionStringError::MissingField("AccountName"))?;
        let account_key = account_key.ok_or(ConnectionStringError::MissingField("AccountKey"))?;
        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{protocol}://{account_name}.blob.{endpoint_suffix}"));

        Ok(Self { account_name, account_key: account_key.into(), blob_endpoint })
    }

    pub(crate) fn account_key(&self) -> &str {
        self.account_key.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionString, ConnectionStringError};

    #[test]
    fn parses_standard_connection_string() {
        let conn = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=pptacct;AccountKey=a2V5bWF0ZXJpYWw=;EndpointSuffix=core.windows.net",
        )
        .expect("well-formed connection string");

        assert_eq!(conn.account_name, "pptacct");
        assert_eq!(conn.blob_endpoint, "https://pptacct.blob.core.windows.net");
        assert_eq!(conn.account_key(), "a2V5bWF0ZXJpYWw=");
    }

    #[test]
    fn blob_endpoint_override_wins() {
        let conn = ConnectionString::parse(
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/",
        )
        .expect("emulator-style connection string");

        assert_eq!(conn.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn missing_account_name_is_rejected() {
        let result = ConnectionString::parse("AccountKey=a2V5");
        assert_eq!(result.unwrap_err(), ConnectionStringError::MissingField("AccountName"));
    }

    #[test]
    fn missing_account_key_is_rejected() {
        let result = ConnectionString::parse("AccountName=pptacct");
        assert_eq!(result.unwrap_err(), ConnectionStringError::MissingField("AccountKey"));
    }

    #[test]
    fn segment_without_separator_is_rejected() {
        let result = ConnectionString::parse("AccountName=pptacct;garbage");
        assert_eq!(
            result.unwrap_err(),
            ConnectionStringError::MalformedSegment("garbage".to_string())
        );
    }

    #[test]
    fn key_material_is_not_leaked_by_debug() {
        let conn = ConnectionString::parse("AccountName=pptacct;AccountKey=dG9wc2VjcmV0")
            .expect("well-formed connection string");
        assert!(!format!("{conn:?}").contains("dG9wc2VjcmV0"));
    }
}
