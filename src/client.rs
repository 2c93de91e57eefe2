use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::batch::Batch;
use crate::config::ResolverConfig;
use crate::domain::{DatasetId, FileDescriptor, GenotypeRecord};
use crate::error::ResolverError;

/// Remote endpoints the resolver depends on.
pub trait GenotypeApi: Send + Sync {
    fn list_files(
        &self,
        token: &str,
        dataset: &DatasetId,
    ) -> impl Future<Output = Result<Vec<FileDescriptor>, ResolverError>> + Send;

    fn query_genotypes(
        &self,
        token: &str,
        dataset: &DatasetId,
        batch: &Batch,
        quality: f64,
    ) -> impl Future<Output = Result<Vec<GenotypeRecord>, ResolverError>> + Send;

    /// Streams `url` into the file at `destination`.
    fn download(
        &self,
        url: &str,
        destination: &Path,
    ) -> impl Future<Output = Result<(), ResolverError>> + Send;
}

#[derive(Clone)]
pub struct HttpGenotypeApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpGenotypeApi {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolverError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("snp-resolve/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ResolverError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|err| ResolverError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn files_url(&self, dataset: &DatasetId) -> String {
        format!("{}/datasets/{}/files", self.base_url, dataset.as_str())
    }

    pub fn snps_url(&self, dataset: &DatasetId) -> String {
        format!("{}/datasets/{}/SNP", self.base_url, dataset.as_str())
    }

    fn files_request(&self, token: &str, dataset: &DatasetId) -> RequestBuilder {
        self.client
            .get(self.files_url(dataset))
            .bearer_auth(token)
            .timeout(self.request_timeout)
    }

    /// Builds `GET {base}/datasets/{id}/SNP?names=rs1 rs2&quality=..`.
    fn query_request(
        &self,
        token: &str,
        dataset: &DatasetId,
        batch: &Batch,
        quality: f64,
    ) -> RequestBuilder {
        self.client
            .get(self.snps_url(dataset))
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .query(&[("names", batch.joined()), ("quality", quality.to_string())])
    }

    async fn send(request: RequestBuilder) -> Result<Response, ResolverError> {
        let response = request
            .send()
            .await
            .map_err(|err| ResolverError::Transport(err.to_string()))?;
        handle_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ResolverError> {
        let response = Self::send(request).await?;
        let body: Listing<T> = response
            .json()
            .await
            .map_err(|err| ResolverError::Transport(format!("decode response: {err}")))?;
        Ok(body.into_inner())
    }
}

impl GenotypeApi for HttpGenotypeApi {
    async fn list_files(
        &self,
        token: &str,
        dataset: &DatasetId,
    ) -> Result<Vec<FileDescriptor>, ResolverError> {
        Self::get_json(self.files_request(token, dataset)).await
    }

    async fn query_genotypes(
        &self,
        token: &str,
        dataset: &DatasetId,
        batch: &Batch,
        quality: f64,
    ) -> Result<Vec<GenotypeRecord>, ResolverError> {
        Self::get_json(self.query_request(token, dataset, batch, quality)).await
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<(), ResolverError> {
        let mut response = Self::send(self.client.get(url)).await?;
        let mut file = tokio::fs::File::create(destination).await.map_err(|err| {
            ResolverError::Filesystem(format!("create {}: {err}", destination.display()))
        })?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ResolverError::Transport(err.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|err| ResolverError::Filesystem(err.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|err| ResolverError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Accepts both a bare JSON array and a `{"data": [...]}` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Enveloped { data: T },
    Bare(T),
}

impl<T> Listing<T> {
    fn into_inner(self) -> T {
        match self {
            Listing::Enveloped { data } => data,
            Listing::Bare(value) => value,
        }
    }
}

async fn handle_status(response: Response) -> Result<Response, ResolverError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "request failed".to_string());
    Err(ResolverError::TransportStatus { status, message })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reqwest::header::AUTHORIZATION;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::domain::SnpId;

    fn api(base_url: &str) -> HttpGenotypeApi {
        let config = ResolverConfig {
            base_url: base_url.to_string(),
            ..ResolverConfig::default()
        };
        HttpGenotypeApi::new(&config).unwrap()
    }

    /// Serves one canned HTTP response and returns the base url.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn listing_accepts_envelope_and_bare_array() {
        let bare: Listing<Vec<FileDescriptor>> =
            serde_json::from_str(r#"[{"id":"https://x/a.gen.zip"}]"#).unwrap();
        let enveloped: Listing<Vec<FileDescriptor>> =
            serde_json::from_str(r#"{"data":[{"id":"https://x/a.gen.zip","type":"file"}]}"#)
                .unwrap();
        assert_eq!(bare.into_inner(), enveloped.into_inner());
    }

    #[test]
    fn endpoint_urls_ignore_trailing_slash() {
        let config = ResolverConfig {
            base_url: "https://api.example.org/v1/".to_string(),
            ..ResolverConfig::default()
        };
        let api = HttpGenotypeApi::new(&config).unwrap();
        let dataset: DatasetId = "ds-42".parse().unwrap();
        assert_eq!(
            api.snps_url(&dataset),
            "https://api.example.org/v1/datasets/ds-42/SNP"
        );
        assert_eq!(
            api.files_url(&dataset),
            "https://api.example.org/v1/datasets/ds-42/files"
        );
    }

    #[test]
    fn query_request_carries_names_quality_and_token() {
        let api = api("https://api.example.org");
        let dataset: DatasetId = "ds-42".parse().unwrap();
        let ids: Vec<SnpId> = ["rs1", "rs2"].iter().map(|v| v.parse().unwrap()).collect();
        let batch = crate::batch::split(&ids, 100).remove(0);

        let request = api
            .query_request("tok", &dataset, &batch, 0.8)
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/datasets/ds-42/SNP");
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("names".to_string(), "rs1 rs2".to_string()),
                ("quality".to_string(), "0.8".to_string()),
            ]
        );
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert!(request.timeout().is_some());
    }

    #[test]
    fn files_request_is_authorized() {
        let api = api("https://api.example.org/");
        let dataset: DatasetId = "ds-42".parse().unwrap();
        let request = api.files_request("tok", &dataset).build().unwrap();
        assert_eq!(request.url().as_str(), "https://api.example.org/datasets/ds-42/files");
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[tokio::test]
    async fn non_success_status_becomes_transport_status() {
        let base = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 11\r\nConnection: close\r\n\r\nmaintenance",
        )
        .await;
        let dataset: DatasetId = "ds-42".parse().unwrap();
        let err = api(&base).list_files("tok", &dataset).await.unwrap_err();
        assert_matches!(
            err,
            ResolverError::TransportStatus { status: 503, message } if message == "maintenance"
        );
    }

    #[tokio::test]
    async fn download_streams_body_to_destination() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\nPK\x03\x04abc",
        )
        .await;
        let temp = tempfile::tempdir().unwrap();
        let destination = temp.path().join("archive.zip");
        api(&base)
            .download(&format!("{base}/files/a.gen.zip"), &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"PK\x03\x04abc");
    }
}
