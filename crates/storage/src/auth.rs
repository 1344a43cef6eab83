//! SharedKey request signing for the blob REST surface.
//!
//! The signature covers the verb, a fixed list of standard headers, every
//! `x-ms-*` header in sorted order, and the canonicalized resource path
//! with its query parameters.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub(crate) enum SignError {
    #[error("account key is not valid base64")]
    InvalidAccountKey,
}

pub(crate) struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub content_length: usize,
    pub content_type: &'a str,
    /// `x-ms-*` headers, lowercase names; sorted here before signing.
    pub ms_headers: &'a [(&'a str, &'a str)],
    pub account: &'a str,
    /// Resource path below the account, starting with `/`.
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
}

pub(crate) fn string_to_sign(request: &CanonicalRequest<'_>) -> String {
    // Content-Length is signed as the empty string when there is no body.
    let content_length = if request.content_length == 0 {
        String::new()
    } else {
        request.content_length.to_string()
    };

    let mut sorted_headers: Vec<&(&str, &str)> = request.ms_headers.iter().collect();
    sorted_headers.sort_by_key(|(name, _)| *name);
    let canonical_headers: String = sorted_headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    let mut canonical_resource = format!("/{}{}", request.account, request.path);
    let mut sorted_query: Vec<&(&str, &str)> = request.query.iter().collect();
    sorted_query.sort_by_key(|(name, _)| *name);
    for (name, value) in sorted_query {
        canonical_resource.push_str(&format!("\n{name}:{value}"));
    }

    format!(
        "{verb}\n\n\n{content_length}\n\n{content_type}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}",
        verb = request.method,
        content_type = request.content_type,
    )
}

/// Value for the `Authorization` header.
pub(crate) fn authorization(
    account: &str,
    account_key: &str,
    string_to_sign: &str,
) -> Result<String, SignError> {
    let key = BASE64.decode(account_key).map_err(|_| SignError::InvalidAccountKey)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SignError::InvalidAccountKey)?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    Ok(format!("SharedKey {account}:{signature}"))
}

#[cfg(test)]
mod tests {
    use super::{authorization, string_to_sign, CanonicalRequest, SignError};

    #[test]
    fn string_to_sign_orders_standard_fields() {
        let request = CanonicalRequest {
            method: "PUT",
            content_length: 1024,
            content_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ms_headers: &[
                ("x-ms-version", "2021-08-06"),
                ("x-ms-date", "Fri, 01 Jan 2025 00:00:00 GMT"),
                ("x-ms-blob-type", "BlockBlob"),
            ],
            account: "pptacct",
            path: "/pptstorage/generated/20250101-090000_auto_docs.pptx",
            query: &[],
        };

        let sts = string_to_sign(&request);
        let lines: Vec<&str> = sts.split('\n').collect();

        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[3], "1024");
        assert_eq!(
            lines[5],
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        );
        // x-ms headers sorted by name, one per line, before the resource.
        assert_eq!(lines[12], "x-ms-blob-type:BlockBlob");
        assert_eq!(lines[13], "x-ms-date:Fri, 01 Jan 2025 00:00:00 GMT");
        assert_eq!(lines[14], "x-ms-version:2021-08-06");
        assert_eq!(
            lines[15],
            "/pptacct/pptstorage/generated/20250101-090000_auto_docs.pptx"
        );
    }

    #[test]
    fn empty_body_signs_blank_content_length() {
        let request = CanonicalRequest {
            method: "GET",
            content_length: 0,
            content_type: "",
            ms_headers: &[("x-ms-date", "d"), ("x-ms-version", "v")],
            account: "pptacct",
            path: "/pptstorage",
            query: &[("restype", "container")],
        };

        let sts = string_to_sign(&request);
        let lines: Vec<&str> = sts.split('\n').collect();
        assert_eq!(lines[0], "GET");
        assert_eq!(lines[3], "", "zero content length must sign as empty");
        assert_eq!(lines.last(), Some(&"restype:container"));
        assert!(sts.contains("/pptacct/pptstorage\nrestype:container"));
    }

    #[test]
    fn authorization_is_shared_key_with_base64_signature() {
        let header = authorization("pptacct", "a2V5bWF0ZXJpYWw=", "GET\n\n\n")
            .expect("valid base64 key");
        assert!(header.starts_with("SharedKey pptacct:"));
        let signature = header.trim_start_matches("SharedKey pptacct:");
        assert!(!signature.is_empty());
    }

    #[test]
    fn invalid_key_material_is_rejected() {
        let result = authorization("pptacct", "not base64 !!!", "GET\n");
        assert!(matches!(result, Err(SignError::InvalidAccountKey)));
    }
}
