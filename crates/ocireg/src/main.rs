use std::fs::File;
use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use ocireg_client::{AuthProvider, HttpRegistry, StaticToken, Token};
use ocireg_compose::Unifier;
use ocireg_core::registry::Registry;
use ocireg_http::OciRegistryServer;
use ocireg_memory::{MemoryConfig, MemoryRegistry};

mod config;
use crate::config::{Backend, Config, RemoteConfig};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let mut file = File::open(cli.config_file.unwrap_or_else(|| "./dev-config.yml".into()))
        .context("opening config file")?;
    let mut s = String::new();
    file.read_to_string(&mut s).context("reading config file")?;
    let config: Config = serde_yaml::from_str(&s).context("parsing config file")?;

    let static_repositories = config.static_repositories;
    let listen_address = config.listen_address;
    let server_config: ocireg_http::ServerConfig = config.server.into();

    let registry: Arc<dyn Registry> = match config.backend {
        Backend::Memory(cfg) => {
            let memory = MemoryRegistry::new(MemoryConfig {
                immutable_tags: cfg.immutable_tags,
                lax_child_references: cfg.lax_child_references,
            });
            if let Some(repos) = &static_repositories {
                for repo in repos {
                    tracing::info!(repo, "initializing static repository");
                    memory.ensure_repository(repo).await;
                }
            }
            Arc::new(memory)
        }
        Backend::Unified(cfg) => {
            if static_repositories.is_some() {
                tracing::warn!("static_repositories is only supported by the memory backend; ignoring");
            }
            let r0 = remote_registry(&cfg.remote_0)?;
            let r1 = remote_registry(&cfg.remote_1)?;
            Arc::new(Unifier::new(Arc::new(r0), Arc::new(r1), cfg.read_policy.into()))
        }
    };

    let server = OciRegistryServer::new(registry, server_config);
    let router = server.router();

    tracing::info!(address = %listen_address, "starting ocireg");
    axum::Server::bind(&listen_address.parse()?)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

fn remote_registry(cfg: &RemoteConfig) -> Result<HttpRegistry> {
    let base_url = Url::parse(&cfg.base_url).with_context(|| format!("parsing base_url {}", cfg.base_url))?;
    Ok(match &cfg.bearer_token {
        Some(token) => {
            let auth: Arc<dyn AuthProvider> = Arc::new(StaticToken(Token::Bearer(token.clone())));
            HttpRegistry::with_auth(base_url, auth)
        }
        None => HttpRegistry::new(base_url),
    })
}
