//! The dbt Cloud API boundary.
//!
//! [`DbtCloudClient`] is what the resources call to reach dbt Cloud. The
//! HTTP transport behind it is not part of this crate. [`InMemoryClient`]
//! implements the same contract over in-process maps and is what the tests
//! and the `testing` harness run against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::job_type::JobCategory;

/// Errors reported by a [`DbtCloudClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The object does not exist (or no longer exists).
    #[error("not found: {0}")]
    NotFound(String),

    /// The token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The object already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other non-success response.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Which events start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobTriggers {
    /// Run on GitHub pull request webhooks.
    #[serde(default)]
    pub github_webhook: bool,
    /// Run on GitLab/Azure DevOps pull request webhooks.
    #[serde(default)]
    pub git_provider_webhook: bool,
    /// Run on the cron schedule.
    #[serde(default)]
    pub schedule: bool,
    /// Run when a pull request is merged.
    #[serde(default)]
    pub on_merge: bool,
}

impl JobTriggers {
    /// The category a new job with these triggers falls into.
    pub fn infer_category(&self) -> JobCategory {
        JobCategory::infer(
            self.github_webhook,
            self.git_provider_webhook,
            self.schedule,
            self.on_merge,
        )
    }
}

/// A dbt Cloud job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by dbt Cloud on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owning account.
    pub account_id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Environment the job runs in.
    pub environment_id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// dbt commands run in order.
    #[serde(default)]
    pub execute_steps: Vec<String>,
    /// Events that start the job.
    #[serde(default)]
    pub triggers: JobTriggers,
    /// Cron expression used when `triggers.schedule` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_cron: Option<String>,
    /// The job's category.
    pub job_type: JobCategory,
    /// Inactive jobs are kept but never triggered.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Adapter-specific connection settings attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    /// Assigned by dbt Cloud on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owning account.
    pub account_id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Set when an environment links to these attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<i64>,
    /// The attribute document, always a JSON object.
    pub extended_attributes: Value,
    /// 1 is active.
    #[serde(default = "default_state")]
    pub state: i64,
}

fn default_state() -> i64 {
    1
}

/// Calls the provider makes against dbt Cloud.
#[async_trait::async_trait]
pub trait DbtCloudClient: Send + Sync + 'static {
    /// Check that `config` grants access to its account.
    async fn verify_credentials(&self, config: &ProviderConfig) -> Result<(), ClientError>;

    /// Create a job. The returned job carries its id.
    async fn create_job(&self, job: Job) -> Result<Job, ClientError>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: i64) -> Result<Job, ClientError>;

    /// Replace a job. `job.id` must be set.
    async fn update_job(&self, job: Job) -> Result<Job, ClientError>;

    /// Delete a job.
    async fn delete_job(&self, job_id: i64) -> Result<(), ClientError>;

    /// Create extended attributes. The returned value carries its id.
    async fn create_extended_attributes(
        &self,
        attributes: ExtendedAttributes,
    ) -> Result<ExtendedAttributes, ClientError>;

    /// Fetch extended attributes by project and id.
    async fn get_extended_attributes(
        &self,
        project_id: i64,
        id: i64,
    ) -> Result<ExtendedAttributes, ClientError>;

    /// Replace extended attributes. `attributes.id` must be set.
    async fn update_extended_attributes(
        &self,
        attributes: ExtendedAttributes,
    ) -> Result<ExtendedAttributes, ClientError>;

    /// Delete extended attributes.
    async fn delete_extended_attributes(&self, project_id: i64, id: i64) -> Result<(), ClientError>;
}

#[derive(Default)]
struct Store {
    jobs: HashMap<i64, Job>,
    extended_attributes: HashMap<i64, ExtendedAttributes>,
}

/// A [`DbtCloudClient`] backed by in-process maps.
///
/// Accepts a single account and token, hands out increasing ids and keeps
/// deleted jobs out of reads the same way the API does.
pub struct InMemoryClient {
    account_id: i64,
    token: String,
    next_id: AtomicI64,
    store: Mutex<Store>,
}

impl InMemoryClient {
    /// Create an empty account that accepts `token`.
    pub fn new(account_id: i64, token: impl Into<String>) -> Self {
        Self {
            account_id,
            token: token.into(),
            next_id: AtomicI64::new(1),
            store: Mutex::new(Store::default()),
        }
    }

    /// Number of jobs currently stored.
    pub async fn job_count(&self) -> usize {
        self.store.lock().await.jobs.len()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_account(&self, account_id: i64) -> Result<(), ClientError> {
        if account_id == self.account_id {
            Ok(())
        } else {
            Err(ClientError::Unauthorized(format!(
                "token has no access to account {}",
                account_id
            )))
        }
    }
}

#[async_trait::async_trait]
impl DbtCloudClient for InMemoryClient {
    async fn verify_credentials(&self, config: &ProviderConfig) -> Result<(), ClientError> {
        if config.token != self.token {
            return Err(ClientError::Unauthorized("invalid token".to_string()));
        }
        self.check_account(config.account_id)
    }

    async fn create_job(&self, mut job: Job) -> Result<Job, ClientError> {
        self.check_account(job.account_id)?;
        if job.id.is_some() {
            return Err(ClientError::Api {
                status: 400,
                message: "id must not be set on create".to_string(),
            });
        }
        let id = self.allocate_id();
        job.id = Some(id);
        debug!(job_id = id, "stored job");
        self.store.lock().await.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: i64) -> Result<Job, ClientError> {
        self.store
            .lock()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("job {}", job_id)))
    }

    async fn update_job(&self, job: Job) -> Result<Job, ClientError> {
        self.check_account(job.account_id)?;
        let id = job.id.ok_or_else(|| ClientError::Api {
            status: 400,
            message: "job id is required".to_string(),
        })?;
        let mut store = self.store.lock().await;
        let slot = store
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ClientError::NotFound(format!("job {}", id)))?;
        *slot = job.clone();
        Ok(job)
    }

    async fn delete_job(&self, job_id: i64) -> Result<(), ClientError> {
        self.store
            .lock()
            .await
            .jobs
            .remove(&job_id)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("job {}", job_id)))
    }

    async fn create_extended_attributes(
        &self,
        mut attributes: ExtendedAttributes,
    ) -> Result<ExtendedAttributes, ClientError> {
        self.check_account(attributes.account_id)?;
        if !attributes.extended_attributes.is_object() {
            return Err(ClientError::Api {
                status: 400,
                message: "extended_attributes must be an object".to_string(),
            });
        }
        let id = self.allocate_id();
        attributes.id = Some(id);
        self.store
            .lock()
            .await
            .extended_attributes
            .insert(id, attributes.clone());
        Ok(attributes)
    }

    async fn get_extended_attributes(
        &self,
        project_id: i64,
        id: i64,
    ) -> Result<ExtendedAttributes, ClientError> {
        self.store
            .lock()
            .await
            .extended_attributes
            .get(&id)
            .filter(|a| a.project_id == project_id)
            .cloned()
            .ok_or_else(|| {
                ClientError::NotFound(format!(
                    "extended attributes {} in project {}",
                    id, project_id
                ))
            })
    }

    async fn update_extended_attributes(
        &self,
        attributes: ExtendedAttributes,
    ) -> Result<ExtendedAttributes, ClientError> {
        self.check_account(attributes.account_id)?;
        let id = attributes.id.ok_or_else(|| ClientError::Api {
            status: 400,
            message: "extended attributes id is required".to_string(),
        })?;
        let mut store = self.store.lock().await;
        match store.extended_attributes.get_mut(&id) {
            Some(slot) if slot.project_id == attributes.project_id => {
                *slot = attributes.clone();
                Ok(attributes)
            },
            _ => Err(ClientError::NotFound(format!(
                "extended attributes {} in project {}",
                id, attributes.project_id
            ))),
        }
    }

    async fn delete_extended_attributes(&self, project_id: i64, id: i64) -> Result<(), ClientError> {
        let mut store = self.store.lock().await;
        match store.extended_attributes.get(&id) {
            Some(existing) if existing.project_id == project_id => {
                store.extended_attributes.remove(&id);
                Ok(())
            },
            _ => Err(ClientError::NotFound(format!(
                "extended attributes {} in project {}",
                id, project_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(account_id: i64) -> Job {
        Job {
            id: None,
            account_id,
            project_id: 10,
            environment_id: 20,
            name: "nightly".to_string(),
            description: String::new(),
            execute_steps: vec!["dbt build".to_string()],
            triggers: JobTriggers {
                schedule: true,
                ..Default::default()
            },
            schedule_cron: Some("0 2 * * *".to_string()),
            job_type: JobCategory::Scheduled,
            is_active: true,
        }
    }

    #[test]
    fn test_verify_credentials() {
        let client = InMemoryClient::new(1, "token");
        tokio_test::block_on(async {
            assert!(client
                .verify_credentials(&ProviderConfig::new(1, "token"))
                .await
                .is_ok());
            assert!(matches!(
                client.verify_credentials(&ProviderConfig::new(1, "wrong")).await,
                Err(ClientError::Unauthorized(_))
            ));
            assert!(matches!(
                client.verify_credentials(&ProviderConfig::new(2, "token")).await,
                Err(ClientError::Unauthorized(_))
            ));
        });
    }

    #[tokio::test]
    async fn test_job_crud() {
        let client = InMemoryClient::new(1, "token");

        let created = client.create_job(job(1)).await.unwrap();
        let id = created.id.unwrap();
        assert_eq!(client.get_job(id).await.unwrap(), created);

        let mut changed = created.clone();
        changed.name = "hourly".to_string();
        client.update_job(changed).await.unwrap();
        assert_eq!(client.get_job(id).await.unwrap().name, "hourly");

        client.delete_job(id).await.unwrap();
        assert!(matches!(client.get_job(id).await, Err(ClientError::NotFound(_))));
        assert!(matches!(client.delete_job(id).await, Err(ClientError::NotFound(_))));
        assert_eq!(client.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_job_wrong_account() {
        let client = InMemoryClient::new(1, "token");
        assert!(matches!(
            client.create_job(job(2)).await,
            Err(ClientError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_extended_attributes_scoped_by_project() {
        let client = InMemoryClient::new(1, "token");
        let created = client
            .create_extended_attributes(ExtendedAttributes {
                id: None,
                account_id: 1,
                project_id: 10,
                environment_id: None,
                extended_attributes: json!({"catalog": "main"}),
                state: 1,
            })
            .await
            .unwrap();
        let id = created.id.unwrap();

        assert!(client.get_extended_attributes(10, id).await.is_ok());
        assert!(matches!(
            client.get_extended_attributes(11, id).await,
            Err(ClientError::NotFound(_))
        ));
        assert!(client.delete_extended_attributes(11, id).await.is_err());
        assert!(client.delete_extended_attributes(10, id).await.is_ok());
    }

    #[tokio::test]
    async fn test_extended_attributes_must_be_object() {
        let client = InMemoryClient::new(1, "token");
        let result = client
            .create_extended_attributes(ExtendedAttributes {
                id: None,
                account_id: 1,
                project_id: 10,
                environment_id: None,
                extended_attributes: json!([1, 2]),
                state: 1,
            })
            .await;
        assert!(matches!(result, Err(ClientError::Api { status: 400, .. })));
    }

    #[test]
    fn test_triggers_infer_category() {
        let triggers = JobTriggers {
            github_webhook: true,
            ..Default::default()
        };
        assert_eq!(triggers.infer_category(), JobCategory::Ci);
        assert_eq!(JobTriggers::default().infer_category(), JobCategory::Other);
    }
}
