use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, info, warn};

/// File-backed cache for the last-known-good session token.
///
/// The token itself is an opaque signed string handed out by the host chat
/// platform; this cache only stores and discards it, never inspects it.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Last cached token, if any. An empty or whitespace-only file counts
    /// as no token.
    pub fn load(&self) -> Option<String> {
        if !self.path.exists() {
            debug!(file = %self.path.display(), "no cached session token");
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    debug!(file = %self.path.display(), "loaded cached session token");
                    Some(trimmed.to_string())
                }
            }
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "failed reading token cache");
                None
            }
        }
    }

    pub fn store(&self, token: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, token)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(file = %self.path.display(), "cached session token");
        Ok(())
    }

    /// Drops a token the server has rejected, so the next attempt does not
    /// reuse a known-bad value.
    pub fn discard(&self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => info!(file = %self.path.display(), "discarded cached session token"),
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "failed discarding token cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::TokenCache;

    #[test]
    fn store_then_load_round_trips() {
        let temp = tempdir().expect("tempdir");
        let cache = TokenCache::new(temp.path().join("nested").join("session.token"));

        assert_eq!(cache.load(), None);
        cache.store("tok-abc123").expect("store");
        assert_eq!(cache.load(), Some("tok-abc123".to_string()));
    }

    #[test]
    fn whitespace_only_file_counts_as_no_token() {
        let temp = tempdir().expect("tempdir");
        let cache = TokenCache::new(temp.path().join("session.token"));
        cache.store("   \n").expect("store");
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn discard_removes_the_cached_value() {
        let temp = tempdir().expect("tempdir");
        let cache = TokenCache::new(temp.path().join("session.token"));
        cache.store("tok-old").expect("store");

        cache.discard();
        assert_eq!(cache.load(), None);

        // Discarding twice is fine.
        cache.discard();
    }
}
