//! Asset fetching
//!
//! Downloads one asset to a temp file inside the managed directory and
//! reports its content hash. Supported URI schemes: `http(s)://` and
//! `file://` (local fixtures and tests). Installation is a rename, so a
//! reader never observes a half-written asset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::AssetError;

/// A fetched-but-not-yet-installed asset.
#[derive(Debug)]
pub struct FetchedAsset {
    /// Temp file holding the downloaded content.
    pub temp_path: PathBuf,
    /// Hex-encoded SHA-256 of the content.
    pub hash: String,
    pub bytes: usize,
}

pub struct AssetClient {
    http: reqwest::Client,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl AssetClient {
    /// Create a client writing temp files under `directory/.tmp`.
    pub fn new(directory: &Path, timeout: Duration) -> Result<Self, AssetError> {
        let temp_dir = directory.join(".tmp");
        std::fs::create_dir_all(&temp_dir)?;

        Ok(Self {
            http: reqwest::Client::new(),
            timeout,
            temp_dir,
        })
    }

    /// Fetch one asset into a temp file.
    pub async fn fetch(&self, uri: &str) -> Result<FetchedAsset, AssetError> {
        let content = if let Some(path) = uri.strip_prefix("file://") {
            tokio::fs::read(path)
                .await
                .map_err(|e| AssetError::fetch(uri, e))?
        } else {
            self.fetch_http(uri).await?
        };

        let mut hasher = Sha256::new();
        hasher.update(&content);
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        let temp_path = self.temp_dir.join(format!("fetch-{}", Uuid::new_v4()));
        tokio::fs::write(&temp_path, &content).await?;

        debug!(uri = %uri, bytes = content.len(), hash = %hash, "fetched asset");

        Ok(FetchedAsset {
            temp_path,
            hash,
            bytes: content.len(),
        })
    }

    async fn fetch_http(&self, uri: &str) -> Result<Vec<u8>, AssetError> {
        let request = self.http.get(uri).timeout(self.timeout);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(AssetError::Timeout { uri: uri.into() });
            }
            Err(e) => return Err(AssetError::fetch(uri, e)),
        };

        if !response.status().is_success() {
            return Err(AssetError::HttpStatus {
                uri: uri.into(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::fetch(uri, e))?;
        Ok(bytes.to_vec())
    }

    /// Atomically install a fetched asset at its final path.
    pub async fn install(&self, fetched: &FetchedAsset, dest: &Path) -> Result<(), AssetError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&fetched.temp_path, dest).await?;
        Ok(())
    }

    /// Remove any temp files left behind by abandoned refreshes.
    pub async fn clean_temp(&self) {
        if let Ok(mut entries) = tokio::fs::read_dir(&self.temp_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dir: &Path) -> AssetClient {
        AssetClient::new(dir, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_file_uris_and_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("db.tsv");
        tokio::fs::write(&source, b"81.2.69.\tGB\n").await.unwrap();

        let client = client(dir.path());
        let uri = format!("file://{}", source.display());
        let fetched = client.fetch(&uri).await.unwrap();

        assert_eq!(fetched.bytes, 12);
        assert_eq!(fetched.hash.len(), 64);
        assert!(fetched.temp_path.exists());
    }

    #[tokio::test]
    async fn identical_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("db.tsv");
        tokio::fs::write(&source, b"same bytes").await.unwrap();

        let client = client(dir.path());
        let uri = format!("file://{}", source.display());
        let first = client.fetch(&uri).await.unwrap();
        let second = client.fetch(&uri).await.unwrap();
        assert_eq!(first.hash, second.hash);
        assert_ne!(first.temp_path, second.temp_path);
    }

    #[tokio::test]
    async fn install_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("db.tsv");
        tokio::fs::write(&source, b"content").await.unwrap();

        let client = client(dir.path());
        let fetched = client
            .fetch(&format!("file://{}", source.display()))
            .await
            .unwrap();

        let dest = dir.path().join("ip_lookup").join("db.tsv");
        client.install(&fetched, &dest).await.unwrap();

        assert!(dest.exists());
        assert!(!fetched.temp_path.exists());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn missing_file_uri_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path());
        let err = client.fetch("file:///does/not/exist").await.unwrap_err();
        assert!(matches!(err, AssetError::Fetch { .. }));
    }

    #[tokio::test]
    async fn clean_temp_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("db.tsv");
        tokio::fs::write(&source, b"content").await.unwrap();

        let client = client(dir.path());
        let fetched = client
            .fetch(&format!("file://{}", source.display()))
            .await
            .unwrap();
        assert!(fetched.temp_path.exists());

        client.clean_temp().await;
        assert!(!fetched.temp_path.exists());
    }
}
