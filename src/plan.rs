//! Planning: turning prior state and a proposal into a [`PlanResult`].
//!
//! The [`Planner`] walks the attributes of a resource schema, lets the
//! [`PlanModifier`]s registered for each attribute adjust or suppress the
//! pending value, and records an [`AttributeChange`] for everything that is
//! left different.
//!
//! Modifiers only see the prior and proposed value of one attribute, so they
//! stay independent of the rest of the provider.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};
use tracing::debug;

use crate::schema::Schema;
use crate::semantic_json::{suppress_if_equivalent, ComparatorOutcome};
use crate::types::{AttributeChange, PlanResult};

/// The value a [`PlanModifier`] settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedValue {
    /// The pending change should not be reported.
    pub suppressed: bool,
    /// The value to plan with.
    pub value: Value,
}

impl ModifiedValue {
    /// Keep `value` and let normal change detection decide.
    pub fn unchanged(value: Value) -> Self {
        Self {
            suppressed: false,
            value,
        }
    }

    /// Plan with `value` and report no change for the attribute.
    pub fn suppressed(value: Value) -> Self {
        Self {
            suppressed: true,
            value,
        }
    }
}

/// A hook that can rewrite or suppress the planned value of one attribute.
///
/// `prior` is `None` when the resource is being created. `proposed` is
/// [`Value::Null`] when the configuration leaves the attribute unset.
pub trait PlanModifier: Send + Sync {
    /// Inspect the change and return the effective value.
    fn modify(&self, prior: Option<&Value>, proposed: &Value) -> ModifiedValue;
}

/// Hide reformatting-only edits of JSON-encoded string attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticJson;

impl PlanModifier for SemanticJson {
    fn modify(&self, prior: Option<&Value>, proposed: &Value) -> ModifiedValue {
        let stored = prior.and_then(Value::as_str);
        match suppress_if_equivalent(stored, proposed.as_str()) {
            ComparatorOutcome::Equivalent(text) => ModifiedValue::suppressed(Value::String(text)),
            ComparatorOutcome::Changed => ModifiedValue::unchanged(proposed.clone()),
        }
    }
}

/// Keep the prior value of a computed attribute the configuration leaves unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn modify(&self, prior: Option<&Value>, proposed: &Value) -> ModifiedValue {
        match prior {
            Some(prior) if proposed.is_null() && !prior.is_null() => {
                ModifiedValue::suppressed(prior.clone())
            },
            _ => ModifiedValue::unchanged(proposed.clone()),
        }
    }
}

/// Computes plans for one resource schema.
pub struct Planner<'a> {
    schema: &'a Schema,
    modifiers: HashMap<String, Vec<Box<dyn PlanModifier>>>,
}

impl<'a> Planner<'a> {
    /// Create a planner for `schema`.
    ///
    /// Attributes flagged `semantic_json` get [`SemanticJson`] and computed
    /// attributes get [`UseStateForUnknown`].
    pub fn new(schema: &'a Schema) -> Self {
        let mut planner = Self {
            schema,
            modifiers: HashMap::new(),
        };
        for (name, attr) in &schema.block.attributes {
            if attr.semantic_json {
                planner.push_modifier(name, SemanticJson);
            }
            if attr.flags.computed {
                planner.push_modifier(name, UseStateForUnknown);
            }
        }
        planner
    }

    /// Register an extra modifier for `attribute`, run after the built-in ones.
    pub fn with_modifier(
        mut self,
        attribute: impl Into<String>,
        modifier: impl PlanModifier + 'static,
    ) -> Self {
        self.push_modifier(attribute, modifier);
        self
    }

    fn push_modifier(&mut self, attribute: impl Into<String>, modifier: impl PlanModifier + 'static) {
        self.modifiers
            .entry(attribute.into())
            .or_default()
            .push(Box::new(modifier));
    }

    /// Plan the move from `prior` to `proposed`.
    ///
    /// A missing or null `prior` plans a create; a null `proposed` plans a
    /// delete.
    pub fn plan(&self, prior: Option<&Value>, proposed: Value) -> PlanResult {
        let prior = prior.filter(|p| !p.is_null());
        match (prior, proposed) {
            (Some(prior), Value::Null) => self.plan_delete(prior),
            (prior, Value::Object(proposed)) => self.plan_object(prior, proposed),
            (_, other) => PlanResult::no_change(other),
        }
    }

    fn plan_delete(&self, prior: &Value) -> PlanResult {
        let changes = prior
            .as_object()
            .map(|obj| {
                sorted(obj)
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        PlanResult::with_changes(Value::Null, changes, false)
    }

    fn plan_object(&self, prior: Option<&Value>, mut planned: Map<String, Value>) -> PlanResult {
        let prior_obj = prior.and_then(Value::as_object);
        let block = &self.schema.block;

        let names: BTreeSet<String> = block
            .attributes
            .keys()
            .chain(block.blocks.keys())
            .chain(planned.keys())
            .cloned()
            .collect();

        let mut changes = Vec::new();
        let mut requires_replace = false;

        for name in names {
            let attr = block.attributes.get(&name);
            let prior_value = prior_obj.and_then(|p| p.get(&name));

            let mut value = planned.get(&name).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                if let Some(default) = attr.and_then(|a| a.default.as_ref()) {
                    value = default.clone();
                }
            }

            let mut suppressed = false;
            for modifier in self.modifiers.get(&name).into_iter().flatten() {
                let modified = modifier.modify(prior_value, &value);
                value = modified.value;
                if modified.suppressed {
                    suppressed = true;
                    break;
                }
            }

            let before = prior_value.filter(|v| !v.is_null()).cloned();
            let after = (!value.is_null()).then(|| value.clone());

            if value.is_null() {
                planned.remove(&name);
            } else {
                planned.insert(name.clone(), value);
            }

            if suppressed || before == after {
                continue;
            }
            // Creates never replace; on update a changed force_new attribute does.
            if prior.is_some() && attr.map(|a| a.force_new).unwrap_or(false) {
                debug!(attribute = %name, "change forces replacement");
                requires_replace = true;
            }
            changes.push(AttributeChange::new(name, before, after));
        }

        PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
    }
}

fn sorted(obj: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = obj.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
}
