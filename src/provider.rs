//! The dbt Cloud provider.
//!
//! [`DbtCloudProvider`] routes [`ProviderService`] calls to the resource
//! modules. It holds the client and, once `configure` has run, the account
//! configuration every resource call needs.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::client::DbtCloudClient;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::resources::{ensure_valid, extended_attributes, job};
use crate::schema::{has_errors, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Provider for dbt Cloud resources.
pub struct DbtCloudProvider<C: DbtCloudClient> {
    client: Arc<C>,
    config: RwLock<Option<ProviderConfig>>,
    env_lookup: Option<Box<EnvLookup>>,
}

impl<C: DbtCloudClient> DbtCloudProvider<C> {
    /// Create an unconfigured provider talking through `client`.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            config: RwLock::new(None),
            env_lookup: None,
        }
    }

    /// Fill configuration values the block leaves unset through `lookup`.
    ///
    /// Pass `|key| std::env::var(key).ok()` to honor `DBT_CLOUD_*` variables.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Some(Box::new(lookup));
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// The active configuration, if `configure` has succeeded.
    pub async fn config(&self) -> Option<ProviderConfig> {
        self.config.read().await.clone()
    }

    async fn require_config(&self) -> Result<ProviderConfig, ProviderError> {
        self.config().await.ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    fn parse_config(&self, config: &Value) -> Result<ProviderConfig, ProviderError> {
        match &self.env_lookup {
            Some(lookup) => ProviderConfig::from_value_with_env(config, |key| lookup(key)),
            None => ProviderConfig::from_value(config),
        }
    }
}

fn resource_schema(resource_type: &str) -> Result<Schema, ProviderError> {
    match resource_type {
        job::TYPE_NAME => Ok(job::schema()),
        extended_attributes::TYPE_NAME => Ok(extended_attributes::schema()),
        other => Err(ProviderError::UnknownResource(other.to_string())),
    }
}

fn data_source_schema(data_source_type: &str) -> Result<Schema, ProviderError> {
    match data_source_type {
        extended_attributes::TYPE_NAME => Ok(extended_attributes::data_source_schema()),
        other => Err(ProviderError::UnknownResource(other.to_string())),
    }
}

#[async_trait::async_trait]
impl<C: DbtCloudClient> ProviderService for DbtCloudProvider<C> {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(job::TYPE_NAME, job::schema())
            .with_resource(extended_attributes::TYPE_NAME, extended_attributes::schema())
            .with_data_source(
                extended_attributes::TYPE_NAME,
                extended_attributes::data_source_schema(),
            )
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.env_lookup.is_some() {
            // Values may still arrive through the lookup; check the merged result.
            return Ok(match self.parse_config(&config) {
                Ok(_) => vec![],
                Err(err) => vec![err.to_diagnostic()],
            });
        }
        Ok(ProviderConfig::validate(&config))
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match self.parse_config(&config) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "rejected provider configuration");
                return Ok(vec![err.to_diagnostic()]);
            },
        };

        if let Err(err) = self.client.verify_credentials(&config).await {
            let err = ProviderError::from(err);
            warn!(error = %err, account_id = config.account_id, "credential check failed");
            return Ok(vec![err.to_diagnostic()]);
        }

        info!(
            account_id = config.account_id,
            host_url = %config.host_url,
            "provider configured"
        );
        *self.config.write().await = Some(config);
        Ok(vec![])
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = resource_schema(resource_type)?;
        let diagnostics = validate(&schema, &config);
        if has_errors(&diagnostics) {
            debug!(diagnostics = diagnostics.len(), "resource config has errors");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = resource_schema(resource_type)?;
        if !proposed_state.is_null() {
            ensure_valid(&schema, &proposed_state)?;
        }

        let plan = match resource_type {
            job::TYPE_NAME => job::plan(prior_state.as_ref(), proposed_state)?,
            _ => extended_attributes::plan(prior_state.as_ref(), proposed_state),
        };
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "plan computed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let config = self.require_config().await?;
        match resource_type {
            job::TYPE_NAME => job::create(self.client.as_ref(), &config, planned_state).await,
            extended_attributes::TYPE_NAME => {
                extended_attributes::create(self.client.as_ref(), &config, planned_state).await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.require_config().await?;
        match resource_type {
            job::TYPE_NAME => job::read(self.client.as_ref(), current_state).await,
            extended_attributes::TYPE_NAME => {
                extended_attributes::read(self.client.as_ref(), current_state).await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let config = self.require_config().await?;
        match resource_type {
            job::TYPE_NAME => {
                job::update(self.client.as_ref(), &config, prior_state, planned_state).await
            },
            extended_attributes::TYPE_NAME => {
                extended_attributes::update(self.client.as_ref(), &config, prior_state, planned_state)
                    .await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.require_config().await?;
        match resource_type {
            job::TYPE_NAME => job::delete(self.client.as_ref(), current_state).await,
            extended_attributes::TYPE_NAME => {
                extended_attributes::delete(self.client.as_ref(), current_state).await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.require_config().await?;
        match resource_type {
            job::TYPE_NAME => job::import(self.client.as_ref(), id).await,
            extended_attributes::TYPE_NAME => {
                extended_attributes::import(self.client.as_ref(), id).await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = data_source_schema(data_source_type)?;
        Ok(validate(&schema, &config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.require_config().await?;
        match data_source_type {
            extended_attributes::TYPE_NAME => {
                extended_attributes::read_data_source(self.client.as_ref(), config).await
            },
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }
}
