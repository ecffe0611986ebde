//! Domain constants
//!
//! Centralized location for key names and protocol defaults shared by the
//! session core and its adapters.

// Persistence keys
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const HAS_RUN_BEFORE_KEY: &str = "has_run_before";

// Configuration defaults
pub const DEFAULT_SCOPE: &str = "openid";
pub const DEFAULT_REDIRECT_PORT: u16 = 10000;

// Keycloak-style realm URL layout
pub const REALMS_PATH: &str = "realms";
pub const DISCOVERY_SUFFIX: &str = "/.well-known/openid-configuration";
pub const USERINFO_SUFFIX: &str = "/protocol/openid-connect/userinfo";

// Prompt hint forced on interactive login
pub const PROMPT_LOGIN: &str = "login";
