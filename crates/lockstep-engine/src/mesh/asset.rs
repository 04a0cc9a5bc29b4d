use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::AssetError;

/// Downloads asset bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let fail = |reason: String| AssetError::Fetch {
            url: url.to_string(),
            reason,
        };

        let res = self.client.get(url).send().map_err(|e| fail(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        let bytes = res.bytes().map_err(|e| fail(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Refuses every fetch; for runs that must not touch the network.
struct Offline;

impl Fetcher for Offline {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        Err(AssetError::Fetch {
            url: url.to_string(),
            reason: "network access disabled".to_string(),
        })
    }
}

/// A remote file mirrored at `path` and pinned by content hash.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CachedAsset {
    pub url: String,
    /// Lowercase or uppercase hex SHA-256 of the expected content.
    pub sha256: String,
    pub path: PathBuf,
}

/// Keeps hash-verified local copies of remote assets.
pub struct AssetCache {
    fetcher: Box<dyn Fetcher>,
}

impl AssetCache {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn http() -> Self {
        Self::new(Box::new(HttpFetcher::new()))
    }

    pub fn offline() -> Self {
        Self::new(Box::new(Offline))
    }

    /// Returns a path holding the asset's verified content.
    ///
    /// A cached file whose hash matches is reused. A missing or mismatching
    /// file is fetched again; the new bytes must match or the call fails and
    /// the cached file is left untouched.
    pub fn ensure(&self, asset: &CachedAsset) -> Result<PathBuf, AssetError> {
        let expected = asset.sha256.trim().to_ascii_lowercase();
        let io_err = |path: &Path, source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        };

        match std::fs::read(&asset.path) {
            Ok(bytes) => {
                let actual = sha256_hex(&bytes);
                if actual == expected {
                    log::debug!("asset cache hit: {}", asset.path.display());
                    return Ok(asset.path.clone());
                }
                log::warn!(
                    "cached {} does not match its hash (got {actual}); re-fetching",
                    asset.path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("fetching {}", asset.url);
            }
            Err(e) => return Err(io_err(&asset.path, e)),
        }

        let bytes = self.fetcher.fetch(&asset.url)?;
        let actual = sha256_hex(&bytes);
        if actual != expected {
            return Err(AssetError::HashMismatch { expected, actual });
        }

        if let Some(parent) = asset.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = asset.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &asset.path).map_err(|e| io_err(&asset.path, e))?;

        log::info!("cached {} ({} bytes)", asset.path.display(), bytes.len());
        Ok(asset.path.clone())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Canned {
        body: Vec<u8>,
        calls: Arc<AtomicUsize>,
    }

    impl Fetcher for Canned {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, AssetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn cache_with(body: &[u8]) -> (AssetCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = AssetCache::new(Box::new(Canned {
            body: body.to_vec(),
            calls: Arc::clone(&calls),
        }));
        (cache, calls)
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lockstep-asset-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn missing_file_is_fetched_and_written() {
        let dir = scratch("fetch");
        let (cache, calls) = cache_with(b"mesh-bytes");
        let asset = CachedAsset {
            url: "https://example.invalid/a.obj".into(),
            sha256: sha256_hex(b"mesh-bytes").to_uppercase(),
            path: dir.join("a.obj"),
        };

        let path = cache.ensure(&asset).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"mesh-bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dir.join("a.tmp").exists());

        // Second call hits the cache.
        cache.ensure(&asset).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_file_is_refetched() {
        let dir = scratch("stale");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.obj");
        std::fs::write(&path, b"old").unwrap();

        let (cache, calls) = cache_with(b"new");
        let asset = CachedAsset {
            url: "https://example.invalid/a.obj".into(),
            sha256: sha256_hex(b"new"),
            path: path.clone(),
        };
        cache.ensure(&asset).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_mismatch_is_an_error() {
        let dir = scratch("mismatch");
        let (cache, _) = cache_with(b"tampered");
        let asset = CachedAsset {
            url: "https://example.invalid/a.obj".into(),
            sha256: sha256_hex(b"original"),
            path: dir.join("a.obj"),
        };
        let err = cache.ensure(&asset).unwrap_err();
        assert!(matches!(err, AssetError::HashMismatch { .. }));
        assert!(!asset.path.exists());
    }

    #[test]
    fn offline_cache_reports_fetch_error() {
        let dir = scratch("offline");
        let asset = CachedAsset {
            url: "https://example.invalid/a.obj".into(),
            sha256: sha256_hex(b"x"),
            path: dir.join("a.obj"),
        };
        assert!(matches!(
            AssetCache::offline().ensure(&asset),
            Err(AssetError::Fetch { .. })
        ));
    }
}
