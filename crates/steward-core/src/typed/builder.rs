//! RegistryBuilder - TaskRegistry の構築と起動時検証
//!
//! # Fail-fast
//! build() 時に「handler 集合 == label 集合」をチェックします。
//! label のない handler、handler のない label はどちらも起動時エラー。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::registry::{Entry, RegistryError, TaskRegistry};
use super::task::Task;
use crate::domain::TaskIdentity;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("tasks registered without a label: {0:?}")]
    UnlabeledTasks(Vec<String>),

    #[error("labels without a registered task: {0:?}")]
    OrphanLabels(Vec<String>),

    #[error("label for '{0}' is given more than once")]
    DuplicateLabel(String),

    #[error("label for '{0}' is empty")]
    EmptyLabel(String),
}

/// ```ignore
/// let registry = RegistryBuilder::new()
///     .register::<PopulateScheduler, _>(PopulateSchedulerHandler)?
///     .label("PopulateSchedulerTask", "Populate schedule from program data")
///     .build()?;
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
    labels: HashMap<String, String>,
    duplicate_label: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        let identity = T::IDENTITY.to_string();
        if self.handlers.contains_key(&identity) {
            return Err(RegistryError::AlreadyRegistered(identity));
        }
        self.handlers
            .insert(identity, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(self)
    }

    pub fn label(mut self, identity: &str, label: &str) -> Self {
        if self
            .labels
            .insert(identity.to_string(), label.to_string())
            .is_some()
        {
            self.duplicate_label.get_or_insert_with(|| identity.to_string());
        }
        self
    }

    pub fn labels(self, pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(self, |builder, (identity, label)| builder.label(identity, label))
    }

    pub fn build(self) -> Result<TaskRegistry, BuildError> {
        if let Some(identity) = self.duplicate_label {
            return Err(BuildError::DuplicateLabel(identity));
        }
        if let Some((identity, _)) = self.labels.iter().find(|(_, l)| l.trim().is_empty()) {
            return Err(BuildError::EmptyLabel(identity.clone()));
        }

        let registered: BTreeSet<&String> = self.handlers.keys().collect();
        let labelled: BTreeSet<&String> = self.labels.keys().collect();

        let unlabeled: Vec<String> = registered.difference(&labelled).map(|s| s.to_string()).collect();
        if !unlabeled.is_empty() {
            return Err(BuildError::UnlabeledTasks(unlabeled));
        }
        let orphans: Vec<String> = labelled.difference(&registered).map(|s| s.to_string()).collect();
        if !orphans.is_empty() {
            return Err(BuildError::OrphanLabels(orphans));
        }

        let mut labels = self.labels;
        let entries: BTreeMap<TaskIdentity, Entry> = self
            .handlers
            .into_iter()
            .filter_map(|(identity, handler)| {
                let label = labels.remove(&identity)?;
                Some((TaskIdentity::new(identity), Entry { handler, label }))
            })
            .collect();

        Ok(TaskRegistry::from_entries(entries))
    }
}
