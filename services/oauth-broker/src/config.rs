//! Configuration types and loading
//!
//! Precedence: environment variables > config file > defaults. The config
//! file is optional; with no `--config` flag and no CONFIG_PATH the broker
//! runs from the environment alone. Client secrets are wrapped in `Secret`
//! as soon as they are read.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{Error, Secret};
use provider::constants::{
    SNOWFLAKE_SCOPES, WEBEX_AUTHORIZE_ENDPOINT, WEBEX_SCOPES, WEBEX_TOKEN_ENDPOINT,
};
use provider::{ProviderConfig, ProviderKind};
use serde::Deserialize;
use url::Url;

const REDIRECT_URI_VAR: &str = "REDIRECT_URI";
const PORT_VAR: &str = "PORT";

/// Environment variable names for one provider's settings
struct ProviderVars {
    client_id: &'static str,
    client_secret: &'static str,
    auth_url: &'static str,
    token_url: &'static str,
}

fn provider_vars(kind: ProviderKind) -> ProviderVars {
    match kind {
        ProviderKind::Webex => ProviderVars {
            client_id: "WEBEX_CLIENT_ID",
            client_secret: "WEBEX_CLIENT_SECRET",
            auth_url: "WEBEX_AUTH_URL",
            token_url: "WEBEX_TOKEN_URL",
        },
        ProviderKind::Snowflake => ProviderVars {
            client_id: "SNOWFLAKE_CLIENT_ID",
            client_secret: "SNOWFLAKE_CLIENT_SECRET",
            auth_url: "SNOWFLAKE_AUTH_URL",
            token_url: "SNOWFLAKE_TOKEN_URL",
        },
    }
}

/// Config file shape. Everything is optional so the environment can fill gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub redirect_uri: Option<String>,
    pub server: ServerConfig,
    pub webex: ProviderSection,
    pub snowflake: ProviderSection,
}

/// Per-provider overrides from the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub scope: Option<String>,
}

/// HTTP listener and flow timing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on one token endpoint call
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
    /// How long a PKCE login may stay pending before its state is rejected
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3000
}

fn default_exchange_timeout() -> u64 {
    10
}

fn default_pending_ttl() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            exchange_timeout_secs: default_exchange_timeout(),
            pending_ttl_secs: default_pending_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_connections: default_max_connections(),
        }
    }
}

/// Fully resolved broker configuration
#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    /// Shared callback URL registered with every provider
    pub redirect_uri: String,
    pub providers: HashMap<ProviderKind, ProviderConfig>,
}

impl Config {
    /// Load the optional config file, then overlay environment variables.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let file = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup and validate.
    ///
    /// Empty or whitespace-only environment values count as unset.
    pub fn from_sources<F>(file: FileConfig, env: F) -> common::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut server = file.server;
        if let Some(port) = env(PORT_VAR) {
            server.port = port.trim().parse().map_err(|e| Error::Invalid {
                name: PORT_VAR,
                reason: format!("{port:?}: {e}"),
            })?;
        }
        validate_server(&server)?;

        let redirect_uri = env(REDIRECT_URI_VAR)
            .or(file.redirect_uri)
            .ok_or(Error::Missing(REDIRECT_URI_VAR))?;
        validate_url(REDIRECT_URI_VAR, &redirect_uri)?;

        let mut providers = HashMap::new();
        for (kind, section) in [
            (ProviderKind::Webex, file.webex),
            (ProviderKind::Snowflake, file.snowflake),
        ] {
            providers.insert(kind, resolve_provider(kind, section, &env)?);
        }

        Ok(Self {
            server,
            redirect_uri,
            providers,
        })
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// `None` means no file: configuration comes from the environment only.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        std::env::var("CONFIG_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.server.exchange_timeout_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.server.pending_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.server.sweep_interval_secs)
    }
}

fn resolve_provider(
    kind: ProviderKind,
    section: ProviderSection,
    env: &dyn Fn(&str) -> Option<String>,
) -> common::Result<ProviderConfig> {
    let vars = provider_vars(kind);
    let (default_auth, default_token, default_scope) = match kind {
        ProviderKind::Webex => (
            Some(WEBEX_AUTHORIZE_ENDPOINT),
            Some(WEBEX_TOKEN_ENDPOINT),
            WEBEX_SCOPES,
        ),
        ProviderKind::Snowflake => (None, None, SNOWFLAKE_SCOPES),
    };

    let client_id = env(vars.client_id)
        .or(section.client_id)
        .ok_or(Error::Missing(vars.client_id))?;
    let client_secret = env(vars.client_secret)
        .map(Secret::new)
        .or(section.client_secret)
        .ok_or(Error::Missing(vars.client_secret))?;
    let authorize_url = env(vars.auth_url)
        .or(section.auth_url)
        .or_else(|| default_auth.map(str::to_owned))
        .ok_or(Error::Missing(vars.auth_url))?;
    let token_url = env(vars.token_url)
        .or(section.token_url)
        .or_else(|| default_token.map(str::to_owned))
        .ok_or(Error::Missing(vars.token_url))?;

    validate_url(vars.auth_url, &authorize_url)?;
    validate_url(vars.token_url, &token_url)?;

    Ok(ProviderConfig {
        kind,
        authorize_url,
        token_url,
        client_id,
        client_secret,
        scope: section.scope.unwrap_or_else(|| default_scope.to_owned()),
        pkce: kind == ProviderKind::Snowflake,
    })
}

fn validate_url(name: &'static str, value: &str) -> common::Result<()> {
    let url = Url::parse(value).map_err(|e| Error::Invalid {
        name,
        reason: format!("{value:?}: {e}"),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Invalid {
            name,
            reason: format!("must start with http:// or https://, got: {value}"),
        });
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> common::Result<()> {
    for (name, value) in [
        ("exchange_timeout_secs", server.exchange_timeout_secs),
        ("pending_ttl_secs", server.pending_ttl_secs),
        ("sweep_interval_secs", server.sweep_interval_secs),
    ] {
        if value == 0 {
            return Err(Error::Config(format!("{name} must be greater than 0")));
        }
    }
    if server.max_connections == 0 {
        return Err(Error::Config(
            "max_connections must be greater than 0".into(),
        ));
    }
    Ok(())
}
