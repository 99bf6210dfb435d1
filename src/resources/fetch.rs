// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Download and verification of the CLI archives shipped with a release

use crate::error::{ReconcilerError, Result};
use crate::types::release::{BinaryResource, Release};
use clap::ValueEnum;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// CPU architectures upstream publishes Linux archives for
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn asset_name(binary: &BinaryResource, arch: Arch) -> String {
    format!("{}-linux-{}.tar.gz", binary.asset_prefix, arch)
}

/// `<host>/<repository>/releases/download/v<version>/<file>`
pub fn download_url(host: &Url, binary: &BinaryResource, file: &str) -> Result<Url> {
    let mut base = host.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(&format!(
        "{}/releases/download/v{}/{}",
        binary.repository, binary.version, file
    ))
    .map_err(|e| ReconcilerError::Fetch(format!("invalid download URL for {}: {}", file, e)))
}

/// Check `data` against a published `sha256sum` line (`<digest>  <file>`)
pub fn verify_checksum(data: &[u8], published: &str, asset: &str) -> Result<()> {
    let fail = |reason: String| ReconcilerError::Checksum {
        asset: asset.to_string(),
        reason,
    };

    let mut fields = published.split_whitespace();
    let expected = fields
        .next()
        .ok_or_else(|| fail("checksum file is empty".to_string()))?;
    if expected.len() != 64 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(fail(format!("'{}' is not a SHA-256 digest", expected)));
    }
    if let Some(file) = fields.next() {
        // sha256sum marks binary mode with a leading '*'
        let file = file.trim_start_matches('*');
        if file != asset {
            return Err(fail(format!("checksum is published for {}", file)));
        }
    }

    let actual = hex::encode(Sha256::digest(data));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(fail(format!("expected {}, got {}", expected, actual)));
    }
    Ok(())
}

/// Downloads release archives over HTTP
pub struct ResourceFetcher {
    http: reqwest::Client,
    host: Url,
}

impl ResourceFetcher {
    pub fn new(host: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcilerError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, host })
    }

    /// Fetch every CLI archive of `release` into `out_dir`
    #[instrument(skip(self, release, out_dir), fields(release = %release.version()))]
    pub async fn fetch_release(&self, release: &Release, arch: Arch, out_dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| ReconcilerError::Fetch(format!("Failed to create {}: {}", out_dir.display(), e)))?;

        let mut written = Vec::with_capacity(release.binaries().len());
        for binary in release.binaries() {
            written.push(self.fetch(binary, arch, out_dir).await?);
        }
        Ok(written)
    }

    /// Download one archive, verify it and write it to `out_dir`
    #[instrument(skip(self, binary, out_dir), fields(binary = %binary.name))]
    pub async fn fetch(&self, binary: &BinaryResource, arch: Arch, out_dir: &Path) -> Result<PathBuf> {
        let asset = asset_name(binary, arch);
        let checksum_file = format!("{}.sha256sum", asset);

        let published = self
            .download(download_url(&self.host, binary, &checksum_file)?)
            .await?
            .ok_or_else(|| ReconcilerError::Checksum {
                asset: asset.clone(),
                reason: format!("{} is not published", checksum_file),
            })?;
        let published = String::from_utf8(published).map_err(|_| ReconcilerError::Checksum {
            asset: asset.clone(),
            reason: "checksum file is not text".to_string(),
        })?;

        let data = self
            .download(download_url(&self.host, binary, &asset)?)
            .await?
            .ok_or_else(|| ReconcilerError::Fetch(format!("{} {} has no asset {}", binary.name, binary.version, asset)))?;
        verify_checksum(&data, &published, &asset)?;

        let path = out_dir.join(&asset);
        let partial = out_dir.join(format!("{}.part", asset));
        tokio::fs::write(&partial, &data)
            .await
            .map_err(|e| ReconcilerError::Fetch(format!("Failed to write {}: {}", partial.display(), e)))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| ReconcilerError::Fetch(format!("Failed to write {}: {}", path.display(), e)))?;

        info!("Fetched {} ({} bytes) to {}", asset, data.len(), path.display());
        Ok(path)
    }

    /// Body of `url`, `None` on 404
    async fn download(&self, url: Url) -> Result<Option<Vec<u8>>> {
        debug!("Downloading {}", url);
        let fetch_error = |e: reqwest::Error| ReconcilerError::Fetch(format!("{}: {}", url, e));

        let response = self.http.get(url.clone()).send().await.map_err(fetch_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .error_for_status()
            .map_err(fetch_error)?
            .bytes()
            .await
            .map_err(fetch_error)?;
        Ok(Some(body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::release::Version;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hubble() -> BinaryResource {
        BinaryResource {
            name: "hubble".to_string(),
            repository: "cilium/hubble".to_string(),
            version: Version::new(1, 16, 6),
            asset_prefix: "hubble".to_string(),
        }
    }

    fn digest(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    const RELEASE_PATH: &str = "/cilium/hubble/releases/download/v1.16.6";

    /// Serve `body` at `file` under the hubble release path; anything else is a 404
    async fn publish(server: &MockServer, file: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", RELEASE_PATH, file)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    fn fetcher(server: &MockServer) -> ResourceFetcher {
        ResourceFetcher::new(server.uri().parse().unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_asset_name_and_url() {
        let host: Url = "https://github.com".parse().unwrap();
        assert_eq!(asset_name(&hubble(), Arch::Arm64), "hubble-linux-arm64.tar.gz");
        assert_eq!(
            download_url(&host, &hubble(), "hubble-linux-arm64.tar.gz").unwrap().as_str(),
            "https://github.com/cilium/hubble/releases/download/v1.16.6/hubble-linux-arm64.tar.gz"
        );
    }

    #[test]
    fn test_download_url_keeps_mirror_path() {
        let host: Url = "https://mirror.example.com/github".parse().unwrap();
        assert_eq!(
            download_url(&host, &hubble(), "x.tar.gz").unwrap().as_str(),
            "https://mirror.example.com/github/cilium/hubble/releases/download/v1.16.6/x.tar.gz"
        );
    }

    #[test]
    fn test_verify_checksum_accepts_sha256sum_output() {
        let data = b"archive";
        let asset = "hubble-linux-amd64.tar.gz";
        verify_checksum(data, &format!("{}  {}\n", digest(data), asset), asset).unwrap();
        verify_checksum(data, &digest(data).to_uppercase(), asset).unwrap();
        verify_checksum(data, &format!("{} *{}", digest(data), asset), asset).unwrap();
    }

    #[test]
    fn test_verify_checksum_rejects_mismatch() {
        let err = verify_checksum(b"archive", &digest(b"other"), "a.tar.gz").unwrap_err();
        assert!(matches!(err, ReconcilerError::Checksum { .. }));
    }

    #[test]
    fn test_verify_checksum_rejects_malformed_files() {
        let not_hex = "z".repeat(64);
        for published in ["", "   \n", "abc123  a.tar.gz", not_hex.as_str()] {
            assert!(
                verify_checksum(b"archive", published, "a.tar.gz").is_err(),
                "'{}' should be rejected",
                published
            );
        }
    }

    #[test]
    fn test_verify_checksum_rejects_other_file() {
        let line = format!("{}  cilium-linux-amd64.tar.gz", digest(b"archive"));
        assert!(verify_checksum(b"archive", &line, "hubble-linux-amd64.tar.gz").is_err());
    }

    #[tokio::test]
    async fn test_fetch_writes_verified_archive() {
        let data = b"hubble archive".to_vec();
        let server = MockServer::start().await;
        publish(&server, "hubble-linux-amd64.tar.gz", data.clone()).await;
        publish(
            &server,
            "hubble-linux-amd64.tar.gz.sha256sum",
            format!("{}  hubble-linux-amd64.tar.gz\n", digest(&data)).into_bytes(),
        )
        .await;
        let out = tempfile::tempdir().unwrap();

        let path = fetcher(&server).fetch(&hubble(), Arch::Amd64, out.path()).await.unwrap();

        assert_eq!(path, out.path().join("hubble-linux-amd64.tar.gz"));
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert!(!out.path().join("hubble-linux-amd64.tar.gz.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_requires_published_checksum() {
        let server = MockServer::start().await;
        publish(&server, "hubble-linux-amd64.tar.gz", b"hubble archive".to_vec()).await;
        let out = tempfile::tempdir().unwrap();

        let err = fetcher(&server)
            .fetch(&hubble(), Arch::Amd64, out.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcilerError::Checksum { .. }), "{}", err);
        assert!(!out.path().join("hubble-linux-amd64.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_fetch_rejects_tampered_archive() {
        let server = MockServer::start().await;
        publish(&server, "hubble-linux-amd64.tar.gz", b"tampered".to_vec()).await;
        publish(
            &server,
            "hubble-linux-amd64.tar.gz.sha256sum",
            digest(b"original").into_bytes(),
        )
        .await;
        let out = tempfile::tempdir().unwrap();

        let err = fetcher(&server)
            .fetch(&hubble(), Arch::Amd64, out.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcilerError::Checksum { .. }));
        assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_fetch_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let out = tempfile::tempdir().unwrap();

        let err = fetcher(&server)
            .fetch(&hubble(), Arch::Amd64, out.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcilerError::Fetch(_)), "{}", err);
    }
}
