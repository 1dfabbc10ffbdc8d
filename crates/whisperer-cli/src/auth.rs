//! Stored session and identity-provider token cache for the CLI.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use whisperer_client::{ClientError, ClientResult, IdentityClient};

use crate::config::config_dir;

/// Key the CLI adds to the session file to remember which server issued it.
pub const SERVER_KEY: &str = "api_url";

pub fn session_path(profile: &str) -> Result<PathBuf> {
    Ok(config_dir()?.join(format!("session.{profile}.json")))
}

pub fn id_token_path(profile: &str) -> Result<PathBuf> {
    Ok(config_dir()?.join(format!("id-token.{profile}")))
}

/// Identity provider stand-in for a terminal.
///
/// A browser-based provider keeps its own account cache; here the cache is a
/// file holding the last ID token. Interactive sign-in takes the token from
/// `--id-token` / `WHISPERER_ID_TOKEN` or asks for it on stdin.
pub struct TerminalIdentity {
    cache: PathBuf,
    supplied: Option<String>,
}

impl TerminalIdentity {
    pub fn new(cache: impl Into<PathBuf>, supplied: Option<String>) -> Self {
        Self {
            cache: cache.into(),
            supplied: supplied.filter(|t| !t.trim().is_empty()),
        }
    }

    fn read_cache(&self) -> ClientResult<Option<String>> {
        match fs::read_to_string(&self.cache) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ClientError::storage(format!(
                "failed to read {}: {err}",
                self.cache.display()
            ))),
        }
    }

    fn write_cache(&self, token: &str) -> ClientResult<()> {
        fs::write(&self.cache, token).map_err(|err| {
            ClientError::storage(format!("failed to write {}: {err}", self.cache.display()))
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache
    }
}

fn prompt_for_token() -> ClientResult<String> {
    print!("Paste the ID token from your identity provider: ");
    io::stdout()
        .flush()
        .map_err(|e| ClientError::identity_provider(e.to_string()))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| ClientError::identity_provider(e.to_string()))?;
    Ok(line.trim().to_string())
}

#[async_trait]
impl IdentityClient for TerminalIdentity {
    async fn acquire_token_silent(&self) -> ClientResult<String> {
        if let Some(token) = &self.supplied {
            return Ok(token.clone());
        }
        self.read_cache()?.ok_or(ClientError::InteractionRequired)
    }

    async fn login_interactive(&self) -> ClientResult<String> {
        let token = match &self.supplied {
            Some(token) => token.clone(),
            None => tokio::task::spawn_blocking(prompt_for_token)
                .await
                .map_err(|e| ClientError::identity_provider(e.to_string()))??,
        };
        if token.is_empty() {
            return Err(ClientError::identity_provider("No ID token provided"));
        }
        self.write_cache(&token)?;
        Ok(token)
    }

    async fn clear_cache(&self) -> ClientResult<()> {
        match fs::remove_file(&self.cache) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ClientError::storage(format!(
                "failed to remove {}: {err}",
                self.cache.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_silent_needs_cache_or_supplied_token() {
        let dir = tempfile::tempdir().unwrap();
        let identity = TerminalIdentity::new(dir.path().join("id-token"), None);

        assert!(matches!(
            identity.acquire_token_silent().await,
            Err(ClientError::InteractionRequired)
        ));

        fs::write(identity.cache_path(), "cached\n").unwrap();
        assert_eq!(identity.acquire_token_silent().await.unwrap(), "cached");

        identity.clear_cache().await.unwrap();
        assert!(!identity.cache_path().exists());
        identity.clear_cache().await.unwrap();
    }

    #[tokio::test]
    async fn test_interactive_caches_supplied_token() {
        let dir = tempfile::tempdir().unwrap();
        let identity = TerminalIdentity::new(dir.path().join("id-token"), Some("fresh".into()));

        assert_eq!(identity.login_interactive().await.unwrap(), "fresh");
        assert_eq!(fs::read_to_string(identity.cache_path()).unwrap(), "fresh");
    }
}
