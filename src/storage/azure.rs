/// Azure Blob Storage graph store
///
/// Uploads use the Put Blob operation, authorised with a SharedKey signature
/// derived from the account key of the storage connection string.
use std::str::FromStr;

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use sha2::Sha256;

use crate::{
    error::{AppError, AppResult},
    storage::{GraphStore, GRAPH_CONTENT_TYPE},
};

type HmacSha256 = Hmac<Sha256>;

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Parsed storage account connection string
///
/// `DefaultEndpointsProtocol=https;AccountName=..;AccountKey=..;EndpointSuffix=core.windows.net`
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionString {
    pub protocol: String,
    pub account_name: String,
    pub account_key: String,
    pub endpoint_suffix: String,
    pub blob_endpoint: Option<String>,
}

impl FromStr for ConnectionString {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut blob_endpoint = None;

        for part in s.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            // Account keys are base64 and may end with '='
            let Some((key, value)) = part.split_once('=') else {
                return Err(AppError::Storage(
                    "malformed connection string segment".to_string(),
                ));
            };

            match key {
                "DefaultEndpointsProtocol" => protocol = Some(value.to_string()),
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "EndpointSuffix" => endpoint_suffix = Some(value.to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        Ok(Self {
            protocol: protocol.unwrap_or_else(|| "https".to_string()),
            account_name: account_name.ok_or_else(|| {
                AppError::Storage("connection string has no AccountName".to_string())
            })?,
            account_key: account_key.ok_or_else(|| {
                AppError::Storage("connection string has no AccountKey".to_string())
            })?,
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| "core.windows.net".to_string()),
            blob_endpoint,
        })
    }
}

impl ConnectionString {
    /// Blob service endpoint, e.g. `https://account.blob.core.windows.net`
    pub fn blob_endpoint(&self) -> String {
        self.blob_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            )
        })
    }
}

#[derive(Clone)]
pub struct AzureBlobStore {
    http_client: reqwest::Client,
    account_name: String,
    account_key: Vec<u8>,
    endpoint: String,
    container: String,
}

impl AzureBlobStore {
    pub fn new(
        http_client: reqwest::Client,
        connection_string: &ConnectionString,
        container: String,
    ) -> AppResult<Self> {
        let account_key = base64::engine::general_purpose::STANDARD
            .decode(&connection_string.account_key)
            .map_err(|e| AppError::Storage(format!("account key is not base64: {}", e)))?;

        Ok(Self {
            http_client,
            account_name: connection_string.account_name.clone(),
            account_key,
            endpoint: connection_string.blob_endpoint(),
            container,
        })
    }

    fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, blob_name)
    }

    fn sign(&self, string_to_sign: &str) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.account_key)
            .map_err(|e| AppError::Storage(format!("invalid account key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// SharedKey string-to-sign of a Put Blob request.
///
/// `ms_headers` must already be sorted by name.
fn put_blob_string_to_sign(
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> String {
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "PUT\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        content_length, content_type, canonical_headers, canonical_resource
    )
}

#[async_trait::async_trait]
impl GraphStore for AzureBlobStore {
    async fn upload_graph(&self, blob_name: &str, png: Vec<u8>) -> AppResult<()> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", STORAGE_API_VERSION),
        ];
        let resource = format!("/{}/{}/{}", self.account_name, self.container, blob_name);
        let signature = self.sign(&put_blob_string_to_sign(
            png.len(),
            GRAPH_CONTENT_TYPE,
            &ms_headers,
            &resource,
        ))?;

        let size_bytes = png.len();
        let mut request = self
            .http_client
            .put(self.blob_url(blob_name))
            .header(CONTENT_TYPE, GRAPH_CONTENT_TYPE)
            .header(
                AUTHORIZATION,
                format!("SharedKey {}:{}", self.account_name, signature),
            );
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }

        let response = request.body(png).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Put Blob returned status {}: {}",
                status, body
            )));
        }

        tracing::info!(
            blob = %blob_name,
            container = %self.container,
            size_bytes,
            "Graph uploaded"
        );

        Ok(())
    }

    fn public_base_url(&self) -> Option<String> {
        Some(format!("{}/{}", self.endpoint, self.container))
    }

    fn name(&self) -> &'static str {
        "azure_blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION_STRING: &str = "DefaultEndpointsProtocol=https;AccountName=myaccount;\
AccountKey=dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5;EndpointSuffix=core.windows.net";

    #[test]
    fn test_parse_connection_string() {
        let parsed: ConnectionString = CONNECTION_STRING.parse().unwrap();

        assert_eq!(parsed.account_name, "myaccount");
        assert_eq!(parsed.account_key, "dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5");
        assert_eq!(parsed.blob_endpoint(), "https://myaccount.blob.core.windows.net");
    }

    #[test]
    fn test_parse_connection_string_with_blob_endpoint() {
        let parsed: ConnectionString =
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/"
                .parse()
                .unwrap();

        assert_eq!(parsed.blob_endpoint(), "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_parse_connection_string_requires_key() {
        let err = "AccountName=myaccount".parse::<ConnectionString>().unwrap_err();
        assert!(err.to_string().contains("AccountKey"));
        assert!("garbage".parse::<ConnectionString>().is_err());
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = put_blob_string_to_sign(
            4,
            "image/png",
            &[("x-ms-blob-type", "BlockBlob"), ("x-ms-version", "v")],
            "/acct/graphs/1_graph.png",
        );

        assert_eq!(
            sts,
            "PUT\n\n\n4\n\nimage/png\n\n\n\n\n\n\nx-ms-blob-type:BlockBlob\nx-ms-version:v\n/acct/graphs/1_graph.png"
        );
        assert!(put_blob_string_to_sign(0, "image/png", &[], "/r").starts_with("PUT\n\n\n\n\n"));
    }

    #[test]
    fn test_shared_key_signature() {
        let parsed: ConnectionString = CONNECTION_STRING.parse().unwrap();
        let store =
            AzureBlobStore::new(reqwest::Client::new(), &parsed, "graphs".to_string()).unwrap();

        let sts = put_blob_string_to_sign(
            4,
            "image/png",
            &[
                ("x-ms-blob-type", "BlockBlob"),
                ("x-ms-date", "Mon, 19 Oct 2026 12:00:00 GMT"),
                ("x-ms-version", STORAGE_API_VERSION),
            ],
            "/myaccount/graphs/42_graph.png",
        );

        assert_eq!(
            store.sign(&sts).unwrap(),
            "PPa91pijywdN5J6M9iJnld+gsAx4UcUNo+Rjl+Lw4jI="
        );
        assert_eq!(
            store.blob_url("42_graph.png"),
            "https://myaccount.blob.core.windows.net/graphs/42_graph.png"
        );
        assert_eq!(
            store.public_base_url().as_deref(),
            Some("https://myaccount.blob.core.windows.net/graphs")
        );
    }
}
