use crate::{CoreError, CoreResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// Distinct values seen per semantic tag (e.g. `ehr_id/value` → EHR ids).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TouchedResources(BTreeMap<String, BTreeSet<String>>);

impl TouchedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tag: &str, value: impl Into<String>) {
        self.0.entry(tag.to_owned()).or_default().insert(value.into());
    }

    pub fn merge(&mut self, other: &TouchedResources) {
        for (tag, values) in &other.0 {
            self.0
                .entry(tag.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    pub fn values(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.0.get(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Process-wide accumulation of touched resources, shared by clones.
///
/// Each dispatch builds its own [`TouchedResources`] and merges it here in one critical section,
/// so concurrent queries never interleave partial updates.
#[derive(Clone, Debug, Default)]
pub struct AuditLog {
    inner: Arc<Mutex<TouchedResources>>,
}

impl AuditLog {
    pub fn merge(&self, touched: &TouchedResources) -> CoreResult<()> {
        if touched.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().map_err(|_| CoreError::LockPoisoned)?;
        inner.merge(touched);
        Ok(())
    }

    pub fn snapshot(&self) -> CoreResult<TouchedResources> {
        let inner = self.inner.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(inner.clone())
    }

    pub fn values(&self, tag: &str) -> CoreResult<BTreeSet<String>> {
        Ok(self.snapshot()?.values(tag).cloned().unwrap_or_default())
    }
}
