//! dbt Cloud provider
//!
//! Resource handlers for managing dbt Cloud jobs and extended attributes
//! through a plan/apply reconciliation host.
//!
//! # Overview
//!
//! - **Job type guard**: [`validate_transition`] refuses `job_type` changes
//!   dbt Cloud would reject, before any API call is made
//! - **Semantic JSON**: [`suppress_if_equivalent`] keeps reformatted JSON
//!   documents from planning a change
//! - **Schema types**: describe provider, resource and data source schemas
//! - **Planning**: [`plan::Planner`] diffs proposed against prior state and
//!   runs per-attribute plan modifiers
//! - **ProviderService trait**: the operations a host calls, implemented by
//!   [`DbtCloudProvider`]
//! - **Client**: [`client::DbtCloudClient`] abstracts the dbt Cloud API;
//!   [`client::InMemoryClient`] backs tests
//! - **Logging**: `tracing` events on stderr, filtered by `RUST_LOG`
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use dbtcloud_provider::{init_logging, DbtCloudProvider, ProviderService};
//! use dbtcloud_provider::client::InMemoryClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = DbtCloudProvider::new(Arc::new(InMemoryClient::new(1, "token")))
//!         .with_env_lookup(|key| std::env::var(key).ok());
//!     provider.configure(json!({"account_id": 1})).await?;
//!
//!     let plan = provider
//!         .plan(
//!             "dbtcloud_job",
//!             None,
//!             json!({
//!                 "project_id": 10,
//!                 "environment_id": 20,
//!                 "name": "nightly",
//!                 "execute_steps": ["dbt build"],
//!                 "triggers": {"schedule": true}
//!             }),
//!             json!({}),
//!         )
//!         .await?;
//!     assert_eq!(plan.planned_state["job_type"], "scheduled");
//!     Ok(())
//! }
//! ```
//!
//! # Job type transitions
//!
//! | from        | allowed targets        |
//! |-------------|------------------------|
//! | `ci`        | `ci`                   |
//! | `merge`     | `merge`                |
//! | `adaptive`  | `adaptive`             |
//! | `scheduled` | `scheduled`, `other`   |
//! | `other`     | `scheduled`, `other`   |
//!
//! A job with no recorded category accepts any target.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod job_type;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod semantic_json;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ClientError, DbtCloudClient, InMemoryClient};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use job_type::{validate_transition, JobCategory, TransitionError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::{PlanModifier, Planner};
pub use provider::DbtCloudProvider;
pub use schema::ProviderSchema;
pub use semantic_json::{suppress_if_equivalent, ComparatorOutcome};
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;

pub use serde_json;
pub use tracing;
