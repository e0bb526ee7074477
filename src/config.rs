//! Provider configuration.
//!
//! The configuration block carries the dbt Cloud account, an API token and
//! the API base URL. Values missing from the block can be filled from
//! `DBT_CLOUD_*` variables, but only through a lookup function the caller
//! passes in. Nothing here reads the process environment on its own.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema, ValueValidator};
use crate::validation::validate;

/// Default dbt Cloud API base URL.
pub const DEFAULT_HOST_URL: &str = "https://cloud.getdbt.com/api";

/// Environment variable names consulted by [`ProviderConfig::from_value_with_env`].
pub const ENV_ACCOUNT_ID: &str = "DBT_CLOUD_ACCOUNT_ID";
/// See [`ENV_ACCOUNT_ID`].
pub const ENV_TOKEN: &str = "DBT_CLOUD_TOKEN";
/// See [`ENV_ACCOUNT_ID`].
pub const ENV_HOST_URL: &str = "DBT_CLOUD_HOST_URL";

/// Settings for talking to one dbt Cloud account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The account every resource belongs to.
    pub account_id: i64,
    /// API token used as a bearer credential.
    pub token: String,
    /// API base URL.
    #[serde(default = "default_host_url")]
    pub host_url: String,
}

fn default_host_url() -> String {
    DEFAULT_HOST_URL.to_string()
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("account_id", &self.account_id)
            .field("token", &"<redacted>")
            .field("host_url", &self.host_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Build a configuration directly.
    pub fn new(account_id: i64, token: impl Into<String>) -> Self {
        Self {
            account_id,
            token: token.into(),
            host_url: default_host_url(),
        }
    }

    /// Override the API base URL.
    pub fn with_host_url(mut self, host_url: impl Into<String>) -> Self {
        self.host_url = host_url.into();
        self
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Connection settings for a dbt Cloud account")
            .with_attribute(
                "account_id",
                Attribute::required_int64()
                    .with_description("Account identifier")
                    .with_validator(ValueValidator::AtLeast(1)),
            )
            .with_attribute(
                "token",
                Attribute::required_string()
                    .with_description("API token")
                    .with_validator(ValueValidator::NotEmpty)
                    .sensitive(),
            )
            .with_attribute(
                "host_url",
                Attribute::optional_string()
                    .with_description("API base URL")
                    .with_default(Value::String(DEFAULT_HOST_URL.to_string())),
            )
    }

    /// Validate a configuration block without building a config.
    pub fn validate(config: &Value) -> Vec<Diagnostic> {
        validate(&Self::schema(), config)
    }

    /// Parse a configuration block.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        let diagnostics = Self::validate(config);
        if let Some(first) = diagnostics.first() {
            return Err(ProviderError::Configuration(match &first.detail {
                Some(detail) => format!("{}: {}", first.summary, detail),
                None => first.summary.clone(),
            }));
        }
        let mut cleaned = config.clone();
        if let Value::Object(map) = &mut cleaned {
            map.retain(|_, v| !v.is_null());
        }
        Ok(serde_json::from_value(cleaned)?)
    }

    /// Parse a configuration block, filling unset values through `lookup`.
    ///
    /// `lookup` is called with [`ENV_ACCOUNT_ID`], [`ENV_TOKEN`] and
    /// [`ENV_HOST_URL`]. Values set in `config` always win.
    pub fn from_value_with_env<F>(config: &Value, lookup: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = match config {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => return Self::from_value(other),
        };

        fill(&mut merged, "token", || lookup(ENV_TOKEN).map(Value::String));
        fill(&mut merged, "host_url", || lookup(ENV_HOST_URL).map(Value::String));
        fill(&mut merged, "account_id", || {
            lookup(ENV_ACCOUNT_ID).map(|raw| match raw.trim().parse::<i64>() {
                Ok(id) => Value::from(id),
                // Left as a string so validation reports the bad value.
                Err(_) => Value::String(raw),
            })
        });

        Self::from_value(&Value::Object(merged))
    }
}

fn fill(map: &mut Map<String, Value>, key: &str, value: impl FnOnce() -> Option<Value>) {
    let unset = map.get(key).map(Value::is_null).unwrap_or(true);
    if unset {
        if let Some(value) = value() {
            map.insert(key.to_string(), value);
        }
    }
}
