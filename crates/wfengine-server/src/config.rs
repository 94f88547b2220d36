//! Environment-based configuration, grounded on the teacher's `Config::from_env`.

use std::env;
use std::sync::Arc;

use wfengine_core::credentials::CredentialService;
use wfengine_core::dispatcher::StepDispatcher;
use wfengine_core::engine::Engine;
use wfengine_core::expression::SandboxedExpr;
use wfengine_core::llm::LlmProviderFactory;
use wfengine_store::{MemoryStore, PostgresStore, Store};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub credential_encryption_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse().unwrap_or(8080);

        Self {
            host,
            port,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|s| !s.is_empty()),
            credential_encryption_key: env::var("CREDENTIAL_ENCRYPTION_KEY")
                .unwrap_or_else(|_| "dev-only-insecure-key".to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared application state threaded through every handler via `axum::State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine>,
    pub credentials: CredentialService,
}

impl AppState {
    /// Builds the store backend (Postgres if `DATABASE_URL` is set, memory
    /// otherwise), runs migrations, and wires the engine's dependencies per
    /// the credential resolution order in §4.5.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pg = PostgresStore::connect(url).await?;
                pg.migrate().await?;
                Arc::new(pg)
            }
            None => Arc::new(MemoryStore::new()),
        };

        let http_client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        let llm = LlmProviderFactory::from_credential(http_client, config.anthropic_api_key.clone());
        let sandbox = SandboxedExpr::new(std::time::Duration::from_secs(2));
        let engine = Arc::new(Engine::new(StepDispatcher::new(), llm, sandbox));
        let credentials = CredentialService::new(&config.credential_encryption_key);

        Ok(Self { config: Arc::new(config), store, engine, credentials })
    }
}
