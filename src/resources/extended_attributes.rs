//! The `dbtcloud_extended_attributes` resource and data source.
//!
//! Extended attributes are a free-form JSON document of adapter settings
//! attached to a project. Configuration carries the document as a string, so
//! planning and refresh both compare it semantically: reformatting the
//! document, or dbt Cloud re-encoding it, is not a change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{decode, encode, ensure_valid, found, state_id};
use crate::client::{DbtCloudClient, ExtendedAttributes};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::plan::Planner;
use crate::schema::{Attribute, AttributeFlags, Schema};
use crate::semantic_json::{canonicalize, suppress_if_equivalent};
use crate::types::{ImportedResource, PlanResult};

/// Resource and data source type name.
pub const TYPE_NAME: &str = "dbtcloud_extended_attributes";

/// Schema of the `dbtcloud_extended_attributes` resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("Adapter settings layered over an environment's connection")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("<project_id>:<extended_attributes_id>"),
        )
        .with_attribute("extended_attributes_id", Attribute::computed_int64())
        .with_attribute(
            "project_id",
            Attribute::required_int64().with_force_new(),
        )
        .with_attribute(
            "extended_attributes",
            Attribute::json_string(AttributeFlags::required())
                .with_description("JSON object of adapter settings"),
        )
        .with_attribute("state", Attribute::computed_int64())
}

/// Schema of the `dbtcloud_extended_attributes` data source.
pub fn data_source_schema() -> Schema {
    Schema::v0()
        .with_attribute("project_id", Attribute::required_int64())
        .with_attribute("extended_attributes_id", Attribute::required_int64())
        .with_attribute("extended_attributes", Attribute::computed_string())
        .with_attribute("environment_id", Attribute::computed_int64())
        .with_attribute("state", Attribute::computed_int64())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExtendedAttributesState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extended_attributes_id: Option<i64>,
    project_id: i64,
    extended_attributes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<i64>,
}

impl ExtendedAttributesState {
    fn new(remote: &ExtendedAttributes, text: String) -> Self {
        Self {
            id: remote.id.map(|id| format!("{}:{}", remote.project_id, id)),
            extended_attributes_id: remote.id,
            project_id: remote.project_id,
            extended_attributes: text,
            state: Some(remote.state),
        }
    }

    fn document(&self) -> Result<Value, ProviderError> {
        serde_json::from_str(&self.extended_attributes).map_err(|err| {
            ProviderError::invalid_attribute("extended_attributes", format!("not valid JSON: {}", err))
        })
    }
}

/// The text dbt Cloud's copy of the document should be stored as.
///
/// Keeps `stored` when it says the same thing, so formatting chosen in
/// configuration survives a refresh.
fn reconcile_text(stored: Option<&str>, remote: &Value) -> Result<String, ProviderError> {
    let remote_text = serde_json::to_string(remote)?;
    let remote_text = canonicalize(&remote_text).unwrap_or(remote_text);
    let outcome = suppress_if_equivalent(stored, Some(&remote_text));
    Ok(match (outcome.is_suppressed(), stored) {
        (true, Some(stored)) => stored.to_string(),
        _ => remote_text,
    })
}

/// Plan a change; reformatting-only edits plan as no change.
pub fn plan(prior: Option<&Value>, proposed: Value) -> PlanResult {
    Planner::new(&schema()).plan(prior, proposed)
}

/// Create extended attributes from `planned`.
pub async fn create<C: DbtCloudClient + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    planned: Value,
) -> Result<Value, ProviderError> {
    let state: ExtendedAttributesState = decode(&planned)?;
    let created = client
        .create_extended_attributes(ExtendedAttributes {
            id: None,
            account_id: config.account_id,
            project_id: state.project_id,
            environment_id: None,
            extended_attributes: state.document()?,
            state: 1,
        })
        .await?;
    info!(id = ?created.id, project_id = created.project_id, "created extended attributes");
    encode(&ExtendedAttributesState::new(&created, state.extended_attributes))
}

/// Refresh extended attributes. Returns [`Value::Null`] when they no longer exist.
pub async fn read<C: DbtCloudClient + ?Sized>(
    client: &C,
    current: Value,
) -> Result<Value, ProviderError> {
    let project_id = state_id(&current, "project_id")?;
    let id = state_id(&current, "extended_attributes_id")?;
    let Some(remote) = found(client.get_extended_attributes(project_id, id).await)? else {
        info!(id, project_id, "extended attributes no longer exist");
        return Ok(Value::Null);
    };

    let stored = current.get("extended_attributes").and_then(Value::as_str);
    let text = reconcile_text(stored, &remote.extended_attributes)?;
    encode(&ExtendedAttributesState::new(&remote, text))
}

/// Apply `planned` to existing extended attributes.
pub async fn update<C: DbtCloudClient + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    prior: Value,
    planned: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&prior, "extended_attributes_id")?;
    let state: ExtendedAttributesState = decode(&planned)?;
    let updated = client
        .update_extended_attributes(ExtendedAttributes {
            id: Some(id),
            account_id: config.account_id,
            project_id: state.project_id,
            environment_id: None,
            extended_attributes: state.document()?,
            state: state.state.unwrap_or(1),
        })
        .await?;
    info!(id, project_id = updated.project_id, "updated extended attributes");
    encode(&ExtendedAttributesState::new(&updated, state.extended_attributes))
}

/// Delete extended attributes. Already-deleted ones count as deleted.
pub async fn delete<C: DbtCloudClient + ?Sized>(
    client: &C,
    current: Value,
) -> Result<(), ProviderError> {
    let project_id = state_id(&current, "project_id")?;
    let id = state_id(&current, "extended_attributes_id")?;
    found(client.delete_extended_attributes(project_id, id).await)?;
    info!(id, project_id, "deleted extended attributes");
    Ok(())
}

/// Import by `<project_id>:<extended_attributes_id>`.
pub async fn import<C: DbtCloudClient + ?Sized>(
    client: &C,
    id: &str,
) -> Result<Vec<ImportedResource>, ProviderError> {
    let parsed = id
        .split_once(':')
        .and_then(|(p, e)| Some((p.trim().parse::<i64>().ok()?, e.trim().parse::<i64>().ok()?)));
    let Some((project_id, ext_id)) = parsed else {
        return Err(ProviderError::InvalidRequest(format!(
            "expected '<project_id>:<extended_attributes_id>', got '{}'",
            id
        )));
    };

    let remote = client.get_extended_attributes(project_id, ext_id).await?;
    let text = reconcile_text(None, &remote.extended_attributes)?;
    Ok(vec![ImportedResource::new(
        TYPE_NAME,
        encode(&ExtendedAttributesState::new(&remote, text))?,
    )])
}

/// Read the data source.
pub async fn read_data_source<C: DbtCloudClient + ?Sized>(
    client: &C,
    config: Value,
) -> Result<Value, ProviderError> {
    ensure_valid(&data_source_schema(), &config)?;
    let project_id = state_id(&config, "project_id")?;
    let id = state_id(&config, "extended_attributes_id")?;

    let remote = client.get_extended_attributes(project_id, id).await?;
    let text = reconcile_text(None, &remote.extended_attributes)?;
    Ok(serde_json::json!({
        "project_id": project_id,
        "extended_attributes_id": id,
        "extended_attributes": text,
        "environment_id": remote.environment_id,
        "state": remote.state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClient;
    use serde_json::json;

    const PRETTY: &str = "{\n  \"type\": \"databricks\",\n  \"catalog\": \"main\"\n}";

    fn config() -> ProviderConfig {
        ProviderConfig::new(1, "token")
    }

    async fn created(client: &InMemoryClient) -> Value {
        let planned = plan(None, json!({"project_id": 10, "extended_attributes": PRETTY})).planned_state;
        create(client, &config(), planned).await.unwrap()
    }

    #[test]
    fn test_reconcile_text() {
        let remote = json!({"catalog": "main", "type": "databricks"});
        assert_eq!(reconcile_text(Some(PRETTY), &remote).unwrap(), PRETTY);
        assert_eq!(
            reconcile_text(Some(r#"{"catalog":"dev"}"#), &remote).unwrap(),
            r#"{"catalog":"main","type":"databricks"}"#
        );
        assert_eq!(
            reconcile_text(None, &remote).unwrap(),
            r#"{"catalog":"main","type":"databricks"}"#
        );
    }

    #[tokio::test]
    async fn test_create_keeps_user_formatting() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;

        assert_eq!(state["extended_attributes"], PRETTY);
        assert_eq!(state["project_id"], 10);
        assert_eq!(state["state"], 1);
        let ext_id = state["extended_attributes_id"].as_i64().unwrap();
        assert_eq!(state["id"], format!("10:{}", ext_id));
    }

    #[tokio::test]
    async fn test_read_preserves_equivalent_text() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;
        let refreshed = read(&client, state.clone()).await.unwrap();
        assert_eq!(refreshed, state);
    }

    #[tokio::test]
    async fn test_read_picks_up_remote_drift() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;
        let ext_id = state["extended_attributes_id"].as_i64().unwrap();

        client
            .update_extended_attributes(ExtendedAttributes {
                id: Some(ext_id),
                account_id: 1,
                project_id: 10,
                environment_id: None,
                extended_attributes: json!({"catalog": "prod"}),
                state: 1,
            })
            .await
            .unwrap();

        let refreshed = read(&client, state).await.unwrap();
        assert_eq!(refreshed["extended_attributes"], r#"{"catalog":"prod"}"#);
    }

    #[tokio::test]
    async fn test_reformatted_plan_has_no_changes() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;

        let plan = plan(
            Some(&state),
            json!({"project_id": 10, "extended_attributes": r#"{"catalog":"main","type":"databricks"}"#}),
        );
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_project_change_requires_replace() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;

        let plan = plan(Some(&state), json!({"project_id": 11, "extended_attributes": PRETTY}));
        assert!(plan.requires_replace);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;

        let planned = plan(
            Some(&state),
            json!({"project_id": 10, "extended_attributes": r#"{"catalog": "dev"}"#}),
        )
        .planned_state;
        let updated = update(&client, &config(), state.clone(), planned).await.unwrap();
        assert_eq!(updated["extended_attributes"], r#"{"catalog": "dev"}"#);
        assert_eq!(updated["id"], state["id"]);

        delete(&client, updated.clone()).await.unwrap();
        assert_eq!(read(&client, updated.clone()).await.unwrap(), Value::Null);
        delete(&client, updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_json() {
        let client = InMemoryClient::new(1, "token");
        let err = create(
            &client,
            &config(),
            json!({"project_id": 10, "extended_attributes": "{oops"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.attribute(), Some("extended_attributes"));
    }

    #[tokio::test]
    async fn test_import() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;
        let id = state["id"].as_str().unwrap().to_string();

        let imported = import(&client, &id).await.unwrap();
        assert_eq!(imported[0].state["id"], state["id"]);
        assert_eq!(
            imported[0].state["extended_attributes"],
            r#"{"catalog":"main","type":"databricks"}"#
        );

        assert!(matches!(
            import(&client, "10").await,
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_data_source() {
        let client = InMemoryClient::new(1, "token");
        let state = created(&client).await;

        let data = read_data_source(
            &client,
            json!({"project_id": 10, "extended_attributes_id": state["extended_attributes_id"]}),
        )
        .await
        .unwrap();
        assert_eq!(data["extended_attributes"], r#"{"catalog":"main","type":"databricks"}"#);
        assert!(data["environment_id"].is_null());

        let err = read_data_source(&client, json!({"project_id": 10})).await.unwrap_err();
        assert_eq!(err.attribute(), Some("extended_attributes_id"));
    }
}
