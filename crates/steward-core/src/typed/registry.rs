//! TaskRegistry - identity → handler + label の閉じた対応表
//!
//! RegistryBuilder でしか作れず、build 後は登録できません。
//! lookup は純粋（副作用なし）。

use std::collections::BTreeMap;
use std::sync::Arc;

use super::handler::DynHandler;
use crate::domain::TaskIdentity;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for task identity '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown task identity '{0}'")]
    UnknownTask(TaskIdentity),
}

pub(crate) struct Entry {
    pub(crate) handler: Arc<dyn DynHandler>,
    pub(crate) label: String,
}

/// Closed mapping from identity to implementation and display label.
pub struct TaskRegistry {
    entries: BTreeMap<TaskIdentity, Entry>,
}

impl TaskRegistry {
    pub(crate) fn from_entries(entries: BTreeMap<TaskIdentity, Entry>) -> Self {
        Self { entries }
    }

    pub fn resolve(&self, identity: &TaskIdentity) -> Result<Arc<dyn DynHandler>, RegistryError> {
        self.entries
            .get(identity)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or_else(|| RegistryError::UnknownTask(identity.clone()))
    }

    pub fn contains(&self, identity: &TaskIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn label(&self, identity: &TaskIdentity) -> Option<&str> {
        self.entries.get(identity).map(|entry| entry.label.as_str())
    }

    /// `(identity, label)` pairs in identity order.
    pub fn entries(&self) -> impl Iterator<Item = (&TaskIdentity, &str)> {
        self.entries
            .iter()
            .map(|(identity, entry)| (identity, entry.label.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}
