use std::sync::Arc;

use anyhow::{Context, Result, bail};
use whisperer_client::{
    ApiClient, AuthFlow, ClientConfig, FileStore, PersistedStore, Route, RouteDecision, Session,
    SessionStore, TokenValidator, User, guard,
};

use crate::auth::{self, SERVER_KEY, TerminalIdentity};
use crate::cli::{Cli, OutputFormat};
use crate::config::{self, ProfileConfig};

/// Everything a command needs: the API client, the session persisted for
/// the active profile and the resolved settings.
pub struct AppContext {
    pub profile: String,
    pub server: String,
    pub format: OutputFormat,
    pub config: ClientConfig,
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionStore>,
    storage: Arc<FileStore>,
}

impl AppContext {
    pub fn open(cli: &Cli) -> Result<Self> {
        let profile_cfg = config::load_profile(&cli.profile)?;
        let client_cfg = config::load_client_config()?;
        let storage = Arc::new(FileStore::new(auth::session_path(&cli.profile)?));
        Self::build(cli, &profile_cfg, client_cfg, storage)
    }

    fn build(
        cli: &Cli,
        profile_cfg: &ProfileConfig,
        mut client_cfg: ClientConfig,
        storage: Arc<FileStore>,
    ) -> Result<Self> {
        let remembered = storage.get(SERVER_KEY).unwrap_or_default();
        let server =
            config::resolve_server(cli.server.as_deref(), profile_cfg, remembered, &client_cfg);
        client_cfg.api_url = server.clone();
        client_cfg
            .validate()
            .with_context(|| format!("Invalid server URL: {server}"))?;

        let api = Arc::new(ApiClient::from_config(&client_cfg)?);
        let format = cli
            .format
            .or_else(|| profile_cfg.output_format())
            .unwrap_or_default();
        tracing::debug!(profile = %cli.profile, %server, "opening session store");

        Ok(Self {
            profile: cli.profile.clone(),
            server,
            format,
            config: client_cfg,
            api,
            session: Arc::new(SessionStore::open(storage.clone())),
            storage,
        })
    }

    pub fn auth_flow(&self) -> Result<AuthFlow> {
        Ok(AuthFlow::new(self.api.clone(), self.session.clone())
            .with_identity(Arc::new(self.identity(None)?)))
    }

    pub fn identity(&self, supplied: Option<String>) -> Result<TerminalIdentity> {
        Ok(TerminalIdentity::new(auth::id_token_path(&self.profile)?, supplied))
    }

    /// Confirms the stored token with the backend.
    pub async fn reconcile(&self) -> Session {
        self.session
            .reconcile(&TokenValidator::new(self.api.clone()))
            .await
    }

    /// Remembers the server alongside the session so later commands find it.
    pub fn remember_server(&self) {
        if let Err(err) = self.storage.set(SERVER_KEY, &self.server) {
            tracing::warn!(error = %err, "failed to remember server URL");
        }
    }

    /// Confirms the session and checks that it may open `route`. Returns the
    /// token and user on success.
    pub async fn require(&self, route: Route) -> Result<(String, User)> {
        let session = self.reconcile().await;
        match guard(route, &session) {
            RouteDecision::Render => {}
            RouteDecision::Redirect(Route::Login) | RouteDecision::Loading => {
                bail!("Not logged in (profile: \"{}\"). Run: whisperer login", self.profile)
            }
            RouteDecision::Redirect(_) => bail!("This command requires an administrator account"),
        }
        match (session.token(), session.user()) {
            (Some(token), Some(user)) => Ok((token.to_string(), user.clone())),
            _ => bail!("Not logged in (profile: \"{}\")", self.profile),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use whisperer_client::storage::keys;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["whisperer"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_remembered_server_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStore::new(dir.path().join("session.json")));
        storage.set(SERVER_KEY, "http://remembered:5000").unwrap();

        let ctx = AppContext::build(
            &cli(&["--profile", "t", "status"]),
            &ProfileConfig::default(),
            ClientConfig::default(),
            storage,
        );
        // WHISPERER_URL may be set in the environment running the tests.
        if std::env::var_os("WHISPERER_URL").is_none() {
            assert_eq!(ctx.unwrap().server, "http://remembered:5000");
        }
    }

    #[test]
    fn test_invalid_server_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStore::new(dir.path().join("session.json")));
        let result = AppContext::build(
            &cli(&["--server", "ftp://nowhere", "status"]),
            &ProfileConfig::default(),
            ClientConfig::default(),
            storage,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_require_without_session_fails_offline() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStore::new(dir.path().join("session.json")));
        let ctx = AppContext::build(
            &cli(&["--server", "http://127.0.0.1:9", "courses"]),
            &ProfileConfig::default(),
            ClientConfig::default(),
            storage.clone(),
        )
        .unwrap();

        let err = ctx.require(Route::Chat).await.unwrap_err();
        assert!(err.to_string().contains("Not logged in"));
        assert!(!storage.contains(keys::TOKEN).unwrap());
    }
}
