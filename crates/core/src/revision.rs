//! Revision history of a versioned resource.
//!
//! A [`RevisionHistory`] is the ordered, append-only list of commits for one object id. Every
//! entry records who committed it, what kind of change it was, when it was committed and which
//! version it superseded. Entries are never modified or removed once appended.
//!
//! Ordering invariants enforced by [`RevisionHistory::append`]:
//! - ordinals are contiguous starting at 1,
//! - each entry's `preceding_version` is the previous entry's version,
//! - `committed_at` never decreases.
//!
//! Because `committed_at` is monotonic, [`RevisionHistory::active_at`] can binary search.

use crate::constants::SYSTEM_COMMITTER;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use vrs_identifiers::{ObjectId, ObjectVersionId, Ordinal};
use vrs_types::NonEmptyText;

/// What a commit did to the resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Creation,
    Modification,
    Deleted,
}

impl ChangeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Modification => "modification",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made a change and why.
///
/// Descriptions are single-line labels; do not put record content in them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    committer: NonEmptyText,
    change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<NonEmptyText>,
}

impl AuditDetails {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the committer is blank or the description spans
    /// more than one line. A blank description is treated as absent.
    pub fn new(
        committer: impl AsRef<str>,
        change_type: ChangeType,
        description: Option<&str>,
    ) -> CoreResult<Self> {
        let committer = NonEmptyText::new(committer)
            .map_err(|_| CoreError::InvalidInput("committer must be non-empty".into()))?;

        let description = match description.map(str::trim) {
            Some(text) if text.contains(['\n', '\r']) => {
                return Err(CoreError::InvalidInput(
                    "change description must be single-line".into(),
                ));
            }
            Some(text) => NonEmptyText::new(text).ok(),
            None => None,
        };

        Ok(Self {
            committer,
            change_type,
            description,
        })
    }

    /// Audit details for commits VRS makes on its own behalf.
    pub fn system(change_type: ChangeType) -> Self {
        Self {
            // SAFETY: SYSTEM_COMMITTER is a non-blank constant
            committer: NonEmptyText::new(SYSTEM_COMMITTER).expect("system committer is valid"),
            change_type,
            description: None,
        }
    }

    pub fn committer(&self) -> &NonEmptyText {
        &self.committer
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().map(NonEmptyText::as_str)
    }

    /// Same committer and description with a different change type.
    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = change_type;
        self
    }
}

/// One commit in a resource's history.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub version: ObjectVersionId,
    pub committed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceding_version: Option<ObjectVersionId>,
    pub audit: AuditDetails,
    /// Identifies the contribution (change set) this commit belonged to.
    pub contribution_id: Uuid,
}

impl RevisionEntry {
    pub fn ordinal(&self) -> Ordinal {
        self.version.ordinal()
    }
}

/// Ordered commits of one resource.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RevisionHistory {
    object_id: ObjectId,
    entries: Vec<RevisionEntry>,
}

impl RevisionHistory {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            entries: Vec::new(),
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Appends a commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfOrderVersion`] if the entry belongs to another object, its
    /// ordinal is not `latest + 1` (or 1 for an empty history), its `preceding_version` is not
    /// the current latest, or it was committed before the current latest.
    pub fn append(&mut self, entry: RevisionEntry) -> CoreResult<()> {
        let out_of_order = |reason: String| CoreError::OutOfOrderVersion {
            object_id: self.object_id,
            reason,
        };

        if entry.version.object_id() != self.object_id {
            return Err(out_of_order(format!(
                "version {} belongs to another object",
                entry.version
            )));
        }

        let last = self.entries.last();
        let expected = last.map_or(1, |e| e.ordinal().get().saturating_add(1));
        if entry.ordinal().get() != expected {
            return Err(out_of_order(format!(
                "expected ordinal {expected}, got {}",
                entry.ordinal()
            )));
        }

        let latest_version = last.map(|e| &e.version);
        if entry.preceding_version.as_ref() != latest_version {
            return Err(out_of_order(format!(
                "preceding version {:?} does not match latest {:?}",
                entry.preceding_version.as_ref().map(ToString::to_string),
                latest_version.map(ToString::to_string)
            )));
        }

        if let Some(last) = last {
            if entry.committed_at < last.committed_at {
                return Err(out_of_order(format!(
                    "committed at {} before latest commit {}",
                    entry.committed_at, last.committed_at
                )));
            }
        }

        self.entries.push(entry);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CoreError::EmptyHistory`] if nothing has been committed.
    pub fn latest(&self) -> CoreResult<&RevisionEntry> {
        self.entries
            .last()
            .ok_or(CoreError::EmptyHistory(self.object_id))
    }

    /// The entry with the greatest `committed_at <= instant`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoVersionBeforeInstant`] if `instant` predates the first commit
    /// (including when the history is empty).
    pub fn active_at(&self, instant: DateTime<Utc>) -> CoreResult<&RevisionEntry> {
        let idx = self.entries.partition_point(|e| e.committed_at <= instant);
        idx.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or(CoreError::NoVersionBeforeInstant {
                object_id: self.object_id,
                instant,
            })
    }

    /// The entry with the given ordinal, if committed.
    pub fn get(&self, ordinal: Ordinal) -> Option<&RevisionEntry> {
        self.entries.get(ordinal.get() as usize - 1)
    }

    pub fn first(&self) -> Option<&RevisionEntry> {
        self.entries.first()
    }

    /// All entries in ascending ordinal order. Each call starts from the first entry.
    pub fn all(&self) -> impl Iterator<Item = &RevisionEntry> + '_ {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[RevisionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use vrs_identifiers::OriginId;

    pub(crate) fn audit() -> AuditDetails {
        AuditDetails::new("Dr Test", ChangeType::Creation, Some("test commit")).expect("audit")
    }

    fn entry(
        object_id: ObjectId,
        ordinal: u32,
        committed_at: DateTime<Utc>,
        preceding: Option<&RevisionEntry>,
    ) -> RevisionEntry {
        let origin = OriginId::parse("node").expect("origin");
        RevisionEntry {
            version: ObjectVersionId::new(
                object_id,
                origin,
                Ordinal::new(ordinal).expect("non-zero"),
            ),
            committed_at,
            preceding_version: preceding.map(|p| p.version.clone()),
            audit: audit(),
            contribution_id: Uuid::new_v4(),
        }
    }

    fn history_with_three(t0: DateTime<Utc>) -> RevisionHistory {
        let id = ObjectId::new();
        let mut history = RevisionHistory::new(id);
        let e1 = entry(id, 1, t0, None);
        let e2 = entry(id, 2, t0 + Duration::seconds(10), Some(&e1));
        let e3 = entry(id, 3, t0 + Duration::seconds(20), Some(&e2));
        for e in [e1, e2, e3] {
            history.append(e).expect("append in order");
        }
        history
    }

    #[test]
    fn latest_fails_on_empty_history() {
        let history = RevisionHistory::new(ObjectId::new());
        assert!(matches!(history.latest(), Err(CoreError::EmptyHistory(_))));
    }

    #[test]
    fn append_rejects_gaps_and_wrong_predecessor() {
        let t0 = Utc::now();
        let id = ObjectId::new();
        let mut history = RevisionHistory::new(id);
        let e1 = entry(id, 1, t0, None);
        history.append(e1.clone()).expect("first");

        let gap = entry(id, 3, t0, Some(&e1));
        assert!(matches!(
            history.append(gap),
            Err(CoreError::OutOfOrderVersion { .. })
        ));

        let orphan = entry(id, 2, t0, None);
        assert!(matches!(
            history.append(orphan),
            Err(CoreError::OutOfOrderVersion { .. })
        ));

        let foreign = entry(ObjectId::new(), 2, t0, Some(&e1));
        assert!(history.append(foreign).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn append_rejects_commit_time_going_backwards() {
        let t0 = Utc::now();
        let id = ObjectId::new();
        let mut history = RevisionHistory::new(id);
        let e1 = entry(id, 1, t0, None);
        history.append(e1.clone()).expect("first");
        let e2 = entry(id, 2, t0 - Duration::seconds(1), Some(&e1));
        assert!(history.append(e2).is_err());
    }

    #[test]
    fn active_at_picks_greatest_commit_not_after_instant() {
        let t0 = Utc::now();
        let history = history_with_three(t0);

        let at = |offset: i64| {
            history
                .active_at(t0 + Duration::seconds(offset))
                .expect("version exists")
                .ordinal()
                .get()
        };

        assert_eq!(at(0), 1);
        assert_eq!(at(5), 1);
        assert_eq!(at(10), 2);
        assert_eq!(at(15), 2);
        assert_eq!(at(1000), 3);
    }

    #[test]
    fn active_at_before_first_commit_fails() {
        let t0 = Utc::now();
        let history = history_with_three(t0);
        assert!(matches!(
            history.active_at(t0 - Duration::milliseconds(1)),
            Err(CoreError::NoVersionBeforeInstant { .. })
        ));
    }

    #[test]
    fn all_is_ascending_and_restartable() {
        let history = history_with_three(Utc::now());
        let first: Vec<u32> = history.all().map(|e| e.ordinal().get()).collect();
        let second: Vec<u32> = history.all().map(|e| e.ordinal().get()).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn audit_rejects_multiline_description() {
        let err = AuditDetails::new("a", ChangeType::Modification, Some("line\nbreak"))
            .expect_err("multiline");
        assert!(matches!(err, CoreError::InvalidInput(_)));
        let blank = AuditDetails::new("a", ChangeType::Modification, Some("  ")).expect("ok");
        assert_eq!(blank.description(), None);
    }
}
