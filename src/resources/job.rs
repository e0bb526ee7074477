//! The `dbtcloud_job` resource.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{decode, encode, found, state_id};
use crate::client::{DbtCloudClient, Job, JobTriggers};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::job_type::{validate_transition, JobCategory};
use crate::plan::Planner;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, ValueValidator,
};
use crate::types::{AttributeChange, ImportedResource, PlanResult};

/// Resource type name.
pub const TYPE_NAME: &str = "dbtcloud_job";

const TRIGGER_NAMES: [&str; 4] = ["github_webhook", "git_provider_webhook", "schedule", "on_merge"];

/// Schema of `dbtcloud_job`.
pub fn schema() -> Schema {
    let triggers = TRIGGER_NAMES
        .iter()
        .fold(Block::new(), |block, name| {
            block.with_attribute(*name, Attribute::optional_bool())
        })
        .with_description("Events that start the job");

    Schema::v0()
        .with_description("A dbt Cloud job")
        .with_attribute("id", Attribute::computed_int64())
        .with_attribute(
            "project_id",
            Attribute::required_int64()
                .with_description("Project the job belongs to")
                .with_force_new(),
        )
        .with_attribute("environment_id", Attribute::required_int64())
        .with_attribute(
            "name",
            Attribute::required_string().with_validator(ValueValidator::NotEmpty),
        )
        .with_attribute("description", Attribute::optional_string())
        .with_attribute(
            "execute_steps",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::required(),
            ),
        )
        .with_attribute("schedule_cron", Attribute::optional_string())
        .with_attribute(
            "job_type",
            Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                .with_description("Inferred from triggers when not set")
                .with_validator(ValueValidator::one_of(
                    JobCategory::ALL.iter().map(|c| c.as_str()),
                )),
        )
        .with_attribute(
            "is_active",
            Attribute::new(AttributeType::Bool, AttributeFlags::optional_computed())
                .with_default(Value::Bool(true)),
        )
        .with_block("triggers", NestedBlock::single(triggers).with_min_items(1))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    project_id: i64,
    environment_id: i64,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    execute_steps: Vec<String>,
    #[serde(default)]
    triggers: JobTriggers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schedule_cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_type: Option<JobCategory>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

impl JobState {
    fn into_job(self, account_id: i64, id: Option<i64>) -> Job {
        let job_type = self
            .job_type
            .unwrap_or_else(|| self.triggers.infer_category());
        Job {
            id,
            account_id,
            project_id: self.project_id,
            environment_id: self.environment_id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            execute_steps: self.execute_steps,
            triggers: self.triggers,
            schedule_cron: self.schedule_cron,
            job_type,
            is_active: self.is_active,
        }
    }
}

impl From<Job> for JobState {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            project_id: job.project_id,
            environment_id: job.environment_id,
            name: job.name,
            description: Some(job.description).filter(|d| !d.is_empty()),
            execute_steps: job.execute_steps,
            triggers: job.triggers,
            schedule_cron: job.schedule_cron,
            job_type: Some(job.job_type),
            is_active: job.is_active,
        }
    }
}

/// Spell out every trigger flag so a partial block compares equal to state.
fn normalize_triggers(proposed: &mut Value) {
    let Some(obj) = proposed.as_object_mut() else {
        return;
    };
    let Some(Value::Object(triggers)) = obj.get_mut("triggers") else {
        return;
    };
    for name in TRIGGER_NAMES {
        let entry = triggers.entry(name).or_insert(Value::Bool(false));
        if entry.is_null() {
            *entry = Value::Bool(false);
        }
    }
}

fn category_in(state: &Map<String, Value>) -> Result<Option<JobCategory>, ProviderError> {
    let label = state.get("job_type").and_then(Value::as_str).unwrap_or_default();
    Ok(JobCategory::from_state(label)?)
}

fn prior_category(prior: &Value) -> Result<Option<JobCategory>, ProviderError> {
    match prior.as_object() {
        Some(obj) => category_in(obj),
        None => Ok(None),
    }
}

fn triggers_in(state: &Map<String, Value>) -> Result<JobTriggers, ProviderError> {
    match state.get("triggers") {
        Some(triggers) if !triggers.is_null() => decode(triggers),
        _ => Ok(JobTriggers::default()),
    }
}

/// Plan a change to a job.
///
/// A job whose configuration leaves `job_type` unset gets the category its
/// triggers imply: on create, and on update when the triggers change. With
/// unchanged triggers an update keeps the recorded category. Updates are
/// refused when they would move `job_type` somewhere the established
/// category does not allow.
pub fn plan(prior: Option<&Value>, mut proposed: Value) -> Result<PlanResult, ProviderError> {
    let schema = schema();
    normalize_triggers(&mut proposed);

    let prior = prior.filter(|p| !p.is_null());
    let prior_obj = prior.and_then(Value::as_object);
    let retargeted = match (prior_obj, proposed.as_object()) {
        (Some(prior), Some(proposed)) => {
            proposed.get("job_type").map_or(true, Value::is_null)
                && triggers_in(prior)? != triggers_in(proposed)?
        },
        _ => false,
    };

    let mut plan = Planner::new(&schema).plan(prior, proposed);
    let Some(planned) = plan.planned_state.as_object_mut() else {
        return Ok(plan);
    };

    let proposed_type = match category_in(planned)? {
        Some(category) if !retargeted => category,
        _ => {
            let inferred = triggers_in(planned)?.infer_category();
            debug!(job_type = %inferred, "inferred job_type from triggers");
            let after = Value::from(inferred.as_str());
            let before = prior_obj
                .and_then(|p| p.get("job_type"))
                .filter(|v| !v.is_null())
                .cloned();
            planned.insert("job_type".to_string(), after.clone());
            if before.as_ref() != Some(&after) {
                plan.changes
                    .push(AttributeChange::new("job_type", before, Some(after)));
            }
            inferred
        },
    };

    if let Some(prior) = prior {
        validate_transition(prior_category(prior)?, proposed_type)?;
    }
    Ok(plan)
}

/// Create the job described by `planned`.
pub async fn create<C: DbtCloudClient + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    planned: Value,
) -> Result<Value, ProviderError> {
    let state: JobState = decode(&planned)?;
    let created = client.create_job(state.into_job(config.account_id, None)).await?;
    info!(job_id = ?created.id, job_type = %created.job_type, "created job");
    encode(&JobState::from(created))
}

/// Refresh a job. Returns [`Value::Null`] when it no longer exists.
pub async fn read<C: DbtCloudClient + ?Sized>(
    client: &C,
    current: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&current, "id")?;
    match found(client.get_job(id).await)? {
        Some(job) => encode(&JobState::from(job)),
        None => {
            info!(job_id = id, "job no longer exists");
            Ok(Value::Null)
        },
    }
}

/// Apply `planned` to an existing job.
pub async fn update<C: DbtCloudClient + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    prior: Value,
    planned: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&prior, "id")?;
    let state: JobState = decode(&planned)?;
    let job = state.into_job(config.account_id, Some(id));
    validate_transition(prior_category(&prior)?, job.job_type)?;

    let updated = client.update_job(job).await?;
    info!(job_id = id, "updated job");
    encode(&JobState::from(updated))
}

/// Delete a job. A job that is already gone counts as deleted.
pub async fn delete<C: DbtCloudClient + ?Sized>(
    client: &C,
    current: Value,
) -> Result<(), ProviderError> {
    let id = state_id(&current, "id")?;
    found(client.delete_job(id).await)?;
    info!(job_id = id, "deleted job");
    Ok(())
}

/// Import a job by its numeric id.
pub async fn import<C: DbtCloudClient + ?Sized>(
    client: &C,
    id: &str,
) -> Result<Vec<ImportedResource>, ProviderError> {
    let id: i64 = id.trim().parse().map_err(|_| {
        ProviderError::InvalidRequest(format!("job import id must be a number, got '{}'", id))
    })?;
    let job = client.get_job(id).await?;
    Ok(vec![ImportedResource::new(
        TYPE_NAME,
        encode(&JobState::from(job))?,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClient;
    use crate::validation::validate;
    use serde_json::json;

    fn config() -> ProviderConfig {
        ProviderConfig::new(1, "token")
    }

    fn scheduled_job() -> Value {
        json!({
            "project_id": 10,
            "environment_id": 20,
            "name": "nightly",
            "execute_steps": ["dbt build"],
            "triggers": {"schedule": true},
            "schedule_cron": "0 2 * * *"
        })
    }

    fn state_with(job_type: &str) -> Value {
        json!({
            "id": 5,
            "project_id": 10,
            "environment_id": 20,
            "name": "nightly",
            "execute_steps": ["dbt build"],
            "triggers": {
                "github_webhook": false,
                "git_provider_webhook": false,
                "schedule": true,
                "on_merge": false
            },
            "schedule_cron": "0 2 * * *",
            "job_type": job_type,
            "is_active": true
        })
    }

    #[test]
    fn test_schema_accepts_job() {
        assert!(validate(&schema(), &scheduled_job()).is_empty());

        let mut bad = scheduled_job();
        bad["job_type"] = json!("hourly");
        let diagnostics = validate(&schema(), &bad);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("job_type"));
    }

    #[test]
    fn test_schema_requires_triggers() {
        let mut job = scheduled_job();
        job.as_object_mut().unwrap().remove("triggers");
        let diagnostics = validate(&schema(), &job);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("triggers"));
    }

    #[test]
    fn test_plan_create_infers_job_type() {
        let created = plan(None, scheduled_job()).unwrap();
        assert_eq!(created.planned_state["job_type"], "scheduled");
        assert_eq!(created.planned_state["triggers"]["on_merge"], false);
        assert!(created.changes.iter().any(|c| c.path == "job_type"));

        let mut ci = scheduled_job();
        ci["triggers"] = json!({"github_webhook": true});
        assert_eq!(plan(None, ci).unwrap().planned_state["job_type"], "ci");
    }

    #[test]
    fn test_plan_create_keeps_explicit_job_type() {
        let mut job = scheduled_job();
        job["job_type"] = json!("adaptive");
        let plan = plan(None, job).unwrap();
        assert_eq!(plan.planned_state["job_type"], "adaptive");
    }

    #[test]
    fn test_plan_update_without_changes() {
        let mut proposed = scheduled_job();
        proposed["job_type"] = json!("scheduled");
        let plan = plan(Some(&state_with("scheduled")), proposed).unwrap();
        assert!(plan.changes.is_empty(), "{:?}", plan.changes);
        assert_eq!(plan.planned_state["id"], 5);
    }

    #[test]
    fn test_plan_update_keeps_unset_job_type() {
        let plan = plan(Some(&state_with("other")), scheduled_job()).unwrap();
        assert_eq!(plan.planned_state["job_type"], "other");
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_plan_update_allows_scheduled_to_other() {
        let mut proposed = scheduled_job();
        proposed["job_type"] = json!("other");
        let plan = plan(Some(&state_with("scheduled")), proposed).unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "job_type");
    }

    #[test]
    fn test_plan_update_rejects_ci_to_scheduled() {
        let mut proposed = scheduled_job();
        proposed["job_type"] = json!("scheduled");
        let err = plan(Some(&state_with("ci")), proposed).unwrap_err();
        assert_eq!(err.attribute(), Some("job_type"));
        assert!(err.message().contains("can only be set to 'ci'"));
    }

    #[test]
    fn test_plan_update_from_unset_job_type() {
        let prior = state_with("");
        let mut proposed = scheduled_job();
        proposed["job_type"] = json!("merge");
        assert!(plan(Some(&prior), proposed).is_ok());
    }

    #[test]
    fn test_plan_update_records_prior_empty_job_type() {
        let prior = state_with("");
        let plan = plan(Some(&prior), scheduled_job()).unwrap();
        let change = plan.changes.iter().find(|c| c.path == "job_type").unwrap();
        assert_eq!(change.before, Some(json!("")));
        assert_eq!(change.after, Some(json!("scheduled")));
    }

    #[test]
    fn test_plan_update_infers_from_changed_triggers() {
        let mut prior = state_with("ci");
        prior["triggers"] = json!({
            "github_webhook": true,
            "git_provider_webhook": false,
            "schedule": false,
            "on_merge": false
        });
        let err = plan(Some(&prior), scheduled_job()).unwrap_err();
        assert_eq!(err.attribute(), Some("job_type"));
        assert!(err.message().contains("can only be set to 'ci'"));

        let mut unscheduled = scheduled_job();
        unscheduled["triggers"] = json!({"schedule": false});
        let plan = plan(Some(&state_with("scheduled")), unscheduled).unwrap();
        assert_eq!(plan.planned_state["job_type"], "other");
        let change = plan.changes.iter().find(|c| c.path == "job_type").unwrap();
        assert_eq!(change.before, Some(json!("scheduled")));
    }

    #[test]
    fn test_plan_update_explicit_job_type_wins_over_triggers() {
        let mut proposed = scheduled_job();
        proposed["triggers"] = json!({"schedule": false});
        proposed["job_type"] = json!("scheduled");
        let plan = plan(Some(&state_with("scheduled")), proposed).unwrap();
        assert_eq!(plan.planned_state["job_type"], "scheduled");
        assert!(plan.changes.iter().all(|c| c.path != "job_type"));
    }

    #[test]
    fn test_plan_delete() {
        let plan = plan(Some(&state_with("ci")), Value::Null).unwrap();
        assert!(plan.planned_state.is_null());
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }

    #[tokio::test]
    async fn test_create_read_update_delete() {
        let client = InMemoryClient::new(1, "token");
        let planned = plan(None, scheduled_job()).unwrap().planned_state;

        let created = create(&client, &config(), planned).await.unwrap();
        assert!(created["id"].is_i64());
        assert_eq!(created["job_type"], "scheduled");
        assert!(created.get("description").is_none());

        let read_back = read(&client, created.clone()).await.unwrap();
        assert_eq!(read_back, created);

        let mut proposed = scheduled_job();
        proposed["name"] = json!("nightly-v2");
        proposed["job_type"] = json!("other");
        let planned = plan(Some(&created), proposed).unwrap().planned_state;
        let updated = update(&client, &config(), created.clone(), planned).await.unwrap();
        assert_eq!(updated["name"], "nightly-v2");
        assert_eq!(updated["job_type"], "other");

        delete(&client, updated.clone()).await.unwrap();
        assert_eq!(read(&client, updated.clone()).await.unwrap(), Value::Null);
        // Deleting twice is fine.
        delete(&client, updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_rechecks_transition() {
        let client = InMemoryClient::new(1, "token");
        let planned = plan(None, scheduled_job()).unwrap().planned_state;
        let created = create(&client, &config(), planned).await.unwrap();

        let mut illegal = created.clone();
        illegal["job_type"] = json!("ci");
        let err = update(&client, &config(), created, illegal).await.unwrap_err();
        assert_eq!(err.attribute(), Some("job_type"));
    }

    #[tokio::test]
    async fn test_import() {
        let client = InMemoryClient::new(1, "token");
        let planned = plan(None, scheduled_job()).unwrap().planned_state;
        let created = create(&client, &config(), planned).await.unwrap();
        let id = created["id"].as_i64().unwrap();

        let imported = import(&client, &id.to_string()).await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, TYPE_NAME);
        assert_eq!(imported[0].state, created);

        assert!(matches!(
            import(&client, "abc").await,
            Err(ProviderError::InvalidRequest(_))
        ));
        assert!(matches!(
            import(&client, "999").await,
            Err(ProviderError::NotFound(_))
        ));
    }
}
