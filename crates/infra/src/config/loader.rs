//! Realm configuration loading
//!
//! [`load`] reads an [`AuthConfig`] from `REALMKEY_*` variables and falls
//! back to a `realmkey.json` / `realmkey.toml` file when `REALMKEY_CLIENT_ID`
//! is unset. Either way the result passes [`AuthConfig::validate`] before
//! it is handed out.
//!
//! ## Variables
//! - `REALMKEY_CLIENT_ID`: OAuth client id (required)
//! - `REALMKEY_REDIRECT_URI`: Redirect URI (required)
//! - `REALMKEY_FRONTEND_URL`: Identity provider base URL
//! - `REALMKEY_REALM`: Realm name (required with `REALMKEY_FRONTEND_URL`)
//! - `REALMKEY_DISCOVERY_URL`: Explicit discovery document URL
//! - `REALMKEY_CLIENT_SECRET`: Client secret for confidential clients
//! - `REALMKEY_SCOPES`: Space- or comma-separated scopes (default `openid`)
//! - `REALMKEY_REDIRECT_PORT`: Loopback redirect port (default 10000)
//! - `REALMKEY_AUTHORIZATION_ENDPOINT` / `REALMKEY_TOKEN_ENDPOINT`: Custom
//!   endpoint pair (both or neither)
//! - `REALMKEY_EPHEMERAL_SESSION`: Prefer an ephemeral browser session
//! - `REALMKEY_ALLOW_INSECURE`: Allow plain-HTTP identity provider URLs
//!
//! ## Files
//! Searched in order, JSON before TOML in each directory: the working
//! directory and its parent, the executable's directory and its parent, then
//! the per-user config directory.

use std::path::{Path, PathBuf};

use realmkey_domain::constants::DEFAULT_REDIRECT_PORT;
use realmkey_domain::{AuthConfig, AuthError, CustomEndpoints, Result};

const FILE_STEM: &str = "realmkey";

/// Environment when `REALMKEY_CLIENT_ID` is set, otherwise the first config
/// file found.
///
/// # Errors
/// `AuthError::Config` naming the bad variable when the environment is
/// partially set, or when no config file yields a valid configuration.
pub fn load() -> Result<AuthConfig> {
    if env_opt("REALMKEY_CLIENT_ID").is_none() {
        tracing::debug!("REALMKEY_CLIENT_ID unset; searching for a config file");
        return load_from_file(None);
    }

    let config = load_from_env()?;
    tracing::info!(source = "env", "realm configuration loaded");
    Ok(config)
}

/// Build the configuration from `REALMKEY_*` variables only.
///
/// # Errors
/// `AuthError::Config` naming the missing or malformed variable.
pub fn load_from_env() -> Result<AuthConfig> {
    let client_id = env_var("REALMKEY_CLIENT_ID")?;
    let redirect_uri = env_var("REALMKEY_REDIRECT_URI")?;
    let frontend_url = env_opt("REALMKEY_FRONTEND_URL");
    let discovery_url = env_opt("REALMKEY_DISCOVERY_URL");

    if frontend_url.is_none() && discovery_url.is_none() {
        return Err(AuthError::Config(
            "REALMKEY_FRONTEND_URL or REALMKEY_DISCOVERY_URL must be set".to_string(),
        ));
    }

    let redirect_port = match env_opt("REALMKEY_REDIRECT_PORT") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|e| AuthError::Config(format!("REALMKEY_REDIRECT_PORT is not a port: {e}")))?,
        None => DEFAULT_REDIRECT_PORT,
    };

    let endpoints = match (
        env_opt("REALMKEY_AUTHORIZATION_ENDPOINT"),
        env_opt("REALMKEY_TOKEN_ENDPOINT"),
    ) {
        (Some(authorization_endpoint), Some(token_endpoint)) => {
            Some(CustomEndpoints { authorization_endpoint, token_endpoint })
        }
        (None, None) => None,
        _ => {
            return Err(AuthError::Config(
                "REALMKEY_AUTHORIZATION_ENDPOINT and REALMKEY_TOKEN_ENDPOINT must be set together"
                    .to_string(),
            ))
        }
    };

    let mut config = AuthConfig {
        frontend_url,
        discovery_url,
        realm: env_opt("REALMKEY_REALM").unwrap_or_default(),
        client_secret: env_opt("REALMKEY_CLIENT_SECRET"),
        endpoints,
        redirect_port,
        prefer_ephemeral_session: env_bool("REALMKEY_EPHEMERAL_SESSION", false),
        allow_insecure_connections: env_bool("REALMKEY_ALLOW_INSECURE", false),
        ..AuthConfig::new(client_id, redirect_uri, "", "")
    };

    if let Some(scopes) = env_opt("REALMKEY_SCOPES") {
        config = config.with_scopes(split_scopes(&scopes));
    }

    config.validate()?;
    Ok(config)
}

/// Read the configuration from `path`, or from the first file
/// [`probe_config_paths`] finds. The extension selects the format.
///
/// # Errors
/// `AuthError::Config` for a missing file, a parse failure or an invalid
/// configuration.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AuthConfig> {
    let file = match path {
        Some(explicit) if explicit.exists() => explicit,
        Some(missing) => {
            return Err(AuthError::Config(format!("config file {} does not exist", missing.display())))
        }
        None => probe_config_paths()
            .ok_or_else(|| AuthError::Config(format!("no {FILE_STEM}.json or {FILE_STEM}.toml found")))?,
    };

    tracing::info!(source = %file.display(), "realm configuration loaded");

    let raw = std::fs::read_to_string(&file)
        .map_err(|e| AuthError::Config(format!("cannot read {}: {e}", file.display())))?;

    let config = parse_config(&raw, &file)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(raw: &str, path: &Path) -> Result<AuthConfig> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            toml::from_str(raw).map_err(|e| AuthError::Config(format!("malformed TOML: {e}")))
        }
        Some("json") | None => {
            serde_json::from_str(raw).map_err(|e| AuthError::Config(format!("malformed JSON: {e}")))
        }
        Some(other) => Err(AuthError::Config(format!("unsupported config extension '{other}'"))),
    }
}

/// First existing config file in the search order, if any.
pub fn probe_config_paths() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf));
    let mut dirs: Vec<PathBuf> = Vec::new();

    for base in [std::env::current_dir().ok(), exe_dir].into_iter().flatten() {
        let parent = base.join("..");
        dirs.extend([base, parent]);
    }

    if let Some(project) = directories::ProjectDirs::from("com", "realmkey", "realmkey") {
        dirs.push(project.config_dir().to_path_buf());
    }

    dirs.into_iter()
        .flat_map(|dir| {
            ["json", "toml"].map(|ext| dir.join(format!("{FILE_STEM}.{ext}")))
        })
        .find(|path| path.exists())
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| AuthError::Config(format!("{key} is not set")))
}

/// Optional environment variable; blank counts as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// `1`, `true`, `yes` and `on` (any case) are true; any other set value is
/// false.
fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key).map_or(default, |raw| {
        ["1", "true", "yes", "on"].iter().any(|t| raw.trim().eq_ignore_ascii_case(t))
    })
}
