//! Provider endpoint defaults
//!
//! Webex publishes fixed public endpoints. Snowflake endpoints are
//! account-specific (`https://<account>.snowflakecomputing.com/oauth/...`)
//! and have no default; they must come from configuration.

/// Webex authorization endpoint
pub const WEBEX_AUTHORIZE_ENDPOINT: &str = "https://webexapis.com/v1/authorize";

/// Webex token endpoint for code exchange
pub const WEBEX_TOKEN_ENDPOINT: &str = "https://webexapis.com/v1/access_token";

/// OIDC identity scopes requested from Webex
pub const WEBEX_SCOPES: &str = "openid email profile";

/// Snowflake session role requested during authorization
pub const SNOWFLAKE_SCOPES: &str = "session:role:PUBLIC";

/// PKCE challenge method. Only S256 is ever sent.
pub const CODE_CHALLENGE_METHOD: &str = "S256";
