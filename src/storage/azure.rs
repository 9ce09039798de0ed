// dbbackup/src/storage/azure.rs
use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{ArtifactStore, check_upload_response, object_key};
use crate::config::{CloudProvider, StoredArtifact};
use crate::errors::{BackupError, Result};

const API_VERSION: &str = "2021-08-06";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

#[derive(Clone)]
enum AzureAuth {
    SharedKey(Vec<u8>),
    Sas(String),
}

/// Pieces of an Azure Storage connection string needed for Put Blob.
#[derive(Clone)]
pub struct AzureAccount {
    account_name: String,
    blob_endpoint: url::Url,
    auth: AzureAuth,
}

impl AzureAccount {
    /// Parses `Key=Value;Key=Value` connection strings as issued by the
    /// portal or Azurite. Either `AccountKey` or `SharedAccessSignature`
    /// must be present.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            BackupError::InvalidConfig(format!("Azure connection string {reason}"))
        };

        let mut account_name = None;
        let mut account_key = None;
        let mut sas = None;
        let mut protocol = "https".to_string();
        let mut suffix = DEFAULT_ENDPOINT_SUFFIX.to_string();
        let mut blob_endpoint = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid("has a segment without '='"))?;
            match key {
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "SharedAccessSignature" => sas = Some(value.trim_start_matches('?').to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                "BlobEndpoint" => blob_endpoint = Some(value.to_string()),
                _ => {}
            }
        }

        let account_name = account_name.ok_or_else(|| invalid("is missing AccountName"))?;
        let auth = match (sas, account_key) {
            (Some(sas), _) => AzureAuth::Sas(sas),
            (None, Some(key)) => AzureAuth::SharedKey(
                BASE64
                    .decode(key)
                    .map_err(|_| invalid("has an AccountKey that is not valid base64"))?,
            ),
            (None, None) => {
                return Err(invalid("needs AccountKey or SharedAccessSignature"));
            }
        };
        let endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{protocol}://{account_name}.blob.{suffix}"));
        let blob_endpoint =
            url::Url::parse(&endpoint).map_err(|_| invalid("has an invalid blob endpoint"))?;

        Ok(Self {
            account_name,
            blob_endpoint,
            auth,
        })
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> Result<url::Url> {
        let mut url = self.blob_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BackupError::InvalidConfig("Azure blob endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend([container, blob_name]);
        if let AzureAuth::Sas(sas) = &self.auth {
            url.set_query(Some(sas));
        }
        Ok(url)
    }
}

/// Builds the Shared Key string-to-sign for a request without query
/// parameters. `canonical_headers` must already be the `x-ms-*` headers.
fn string_to_sign(
    verb: &str,
    content_length: u64,
    content_type: &str,
    canonical_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let mut headers: Vec<(String, &str)> = canonical_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort();

    let mut sts = format!(
        "{verb}\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n"
    );
    for (name, value) in headers {
        sts.push_str(&format!("{name}:{value}\n"));
    }
    sts.push_str(canonical_resource);
    sts
}

fn sign(key: &[u8], string_to_sign: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| BackupError::InvalidConfig(format!("unusable Azure account key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Uploads backups as block blobs with a single Put Blob request.
pub struct AzureStore {
    account: AzureAccount,
    container: String,
    http_client: reqwest::Client,
}

impl AzureStore {
    pub fn from_connection_string(connection_string: &str, container: String) -> Result<Self> {
        Ok(Self {
            account: AzureAccount::parse(connection_string)?,
            container,
            http_client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ArtifactStore for AzureStore {
    async fn store(&self, artifact: &Path) -> Result<StoredArtifact> {
        let blob_name = object_key(artifact)?;
        let url = self.account.blob_url(&self.container, &blob_name)?;
        tracing::info!(
            file = %artifact.display(),
            container = %self.container,
            blob = %blob_name,
            "uploading backup to Azure Blob Storage"
        );

        let body = tokio::fs::read(artifact).await?;
        let content_type = "application/octet-stream";
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
        ];

        let mut request = self
            .http_client
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type);
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }
        if let AzureAuth::SharedKey(key) = &self.account.auth {
            let resource = format!("/{}{}", self.account.account_name, url.path());
            let sts = string_to_sign("PUT", body.len() as u64, content_type, &ms_headers, &resource);
            let signature = sign(key, &sts)?;
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("SharedKey {}:{signature}", self.account.account_name),
            );
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Upload {
                provider: CloudProvider::Azure,
                cause: e.to_string(),
            })?;
        check_upload_response(CloudProvider::Azure, response).await?;

        tracing::info!(container = %self.container, blob = %blob_name, "✓ uploaded to Azure");
        Ok(StoredArtifact::Remote {
            provider: CloudProvider::Azure,
            bucket: self.container.clone(),
            key: blob_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use wiremock::matchers::{body_bytes, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Well-known Azurite development account key.
    const DEV_KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    #[test]
    fn test_parse_account_key_connection_string() -> anyhow::Result<()> {
        let account = AzureAccount::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey={DEV_KEY};EndpointSuffix=core.windows.net"
        ))?;
        assert_eq!(account.account_name, "acme");
        assert_eq!(account.blob_endpoint.as_str(), "https://acme.blob.core.windows.net/");
        assert!(matches!(account.auth, AzureAuth::SharedKey(ref k) if k.len() == 64));

        let url = account.blob_url("backups", "shop.sql.gz")?;
        assert_eq!(
            url.as_str(),
            "https://acme.blob.core.windows.net/backups/shop.sql.gz"
        );
        Ok(())
    }

    #[test]
    fn test_parse_azurite_blob_endpoint() -> anyhow::Result<()> {
        let account = AzureAccount::parse(&format!(
            "AccountName=devstoreaccount1;AccountKey={DEV_KEY};BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1;"
        ))?;
        let url = account.blob_url("backups", "pg.dump")?;
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/backups/pg.dump"
        );
        Ok(())
    }

    #[test]
    fn test_sas_connection_string() -> anyhow::Result<()> {
        let account = AzureAccount::parse(
            "BlobEndpoint=https://acme.blob.core.windows.net;AccountName=acme;SharedAccessSignature=?sv=2021-08-06&sig=abc%3D",
        )?;
        let url = account.blob_url("backups", "pg.dump")?;
        assert_eq!(url.query(), Some("sv=2021-08-06&sig=abc%3D"));
        Ok(())
    }

    #[test]
    fn test_parse_rejects_incomplete_strings() {
        for bad in [
            "AccountKey=a2V5",
            "AccountName=acme",
            "AccountName=acme;AccountKey=***not-base64***",
            "AccountName=acme;garbage",
        ] {
            assert!(
                matches!(AzureAccount::parse(bad), Err(BackupError::InvalidConfig(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = string_to_sign(
            "PUT",
            11,
            "application/octet-stream",
            &[
                ("x-ms-version", API_VERSION),
                ("x-ms-date", "Mon, 03 Jun 2024 10:00:00 GMT"),
                ("x-ms-blob-type", "BlockBlob"),
            ],
            "/acme/backups/shop.sql",
        );
        let expected = "PUT\n\n\n11\n\napplication/octet-stream\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Mon, 03 Jun 2024 10:00:00 GMT\n\
             x-ms-version:2021-08-06\n\
             /acme/backups/shop.sql";
        assert_eq!(sts, expected);
        assert_eq!(sts.lines().count(), 16);
    }

    #[test]
    fn test_zero_length_is_blank() {
        let sts = string_to_sign("PUT", 0, "", &[], "/acme/c/b");
        assert!(sts.starts_with("PUT\n\n\n\n"));
    }

    #[test]
    fn test_signature_is_deterministic() -> anyhow::Result<()> {
        let key = BASE64.decode(DEV_KEY)?;
        let first = sign(&key, "PUT\n")?;
        assert_eq!(first, sign(&key, "PUT\n")?);
        assert_ne!(first, sign(&key, "GET\n")?);
        assert_eq!(BASE64.decode(&first)?.len(), 32);
        Ok(())
    }

    fn azurite_store(server: &MockServer) -> anyhow::Result<AzureStore> {
        Ok(AzureStore::from_connection_string(
            &format!(
                "AccountName=devstoreaccount1;AccountKey={DEV_KEY};BlobEndpoint={}/devstoreaccount1",
                server.uri()
            ),
            "backups".to_string(),
        )?)
    }

    #[tokio::test]
    async fn test_put_blob_is_signed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("shop.sql.gz");
        fs::write(&file, b"gzip-bytes")?;

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/devstoreaccount1/backups/shop.sql.gz"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("x-ms-version", API_VERSION))
            .and(header("content-type", "application/octet-stream"))
            .and(header_exists("x-ms-date"))
            .and(body_bytes(b"gzip-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let stored = azurite_store(&server)?.store(&file).await?;
        assert_eq!(
            stored,
            StoredArtifact::Remote {
                provider: CloudProvider::Azure,
                bucket: "backups".to_string(),
                key: "shop.sql.gz".to_string(),
            }
        );

        let requests = server.received_requests().await.unwrap_or_default();
        let request = &requests[0];
        let date = request.headers.get("x-ms-date").and_then(|v| v.to_str().ok());
        let authorization = request.headers.get("authorization").and_then(|v| v.to_str().ok());
        let expected = sign(
            &BASE64.decode(DEV_KEY)?,
            &string_to_sign(
                "PUT",
                10,
                "application/octet-stream",
                &[
                    ("x-ms-blob-type", "BlockBlob"),
                    ("x-ms-date", date.unwrap_or_default()),
                    ("x-ms-version", API_VERSION),
                ],
                "/devstoreaccount1/devstoreaccount1/backups/shop.sql.gz",
            ),
        )?;
        assert_eq!(
            authorization,
            Some(format!("SharedKey devstoreaccount1:{expected}").as_str())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_put_reports_status() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("pg.dump");
        fs::write(&file, b"PGDMP")?;

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AuthenticationFailed"))
            .mount(&server)
            .await;

        match azurite_store(&server)?.store(&file).await {
            Err(BackupError::Upload {
                provider: CloudProvider::Azure,
                cause,
            }) => assert!(cause.starts_with("HTTP 403"), "{cause}"),
            other => panic!("expected an upload error, got {other:?}"),
        }
        Ok(())
    }
}
