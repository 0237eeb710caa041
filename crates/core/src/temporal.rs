//! Point-in-time resolution of versioned resources.
//!
//! [`TemporalResolver`] maps "latest", an explicit ordinal or an instant onto one
//! [`RevisionEntry`] of a resource's history and loads the matching snapshot.

use crate::revision::RevisionEntry;
use crate::store::{ResourceSnapshot, VersionStore};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use vrs_identifiers::{ObjectId, VersionQuery};

/// A resolved history entry together with the content committed by it.
#[derive(Clone, Debug)]
pub struct OriginalVersion<T> {
    pub entry: RevisionEntry,
    pub snapshot: ResourceSnapshot<T>,
}

pub struct TemporalResolver<'a, T> {
    store: &'a dyn VersionStore<T>,
}

impl<'a, T> TemporalResolver<'a, T> {
    pub fn new(store: &'a dyn VersionStore<T>) -> Self {
        Self { store }
    }

    /// The snapshot active at `at_time`, or the latest one when `at_time` is `None`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ResourceNotFound`] if `object_id` has no history at all.
    /// - [`CoreError::NoVersionBeforeInstant`] if `at_time` predates the first commit.
    pub fn resolve(
        &self,
        object_id: &ObjectId,
        at_time: Option<DateTime<Utc>>,
    ) -> CoreResult<ResourceSnapshot<T>> {
        Ok(self
            .resolve_query(object_id, &VersionQuery::at_time(at_time))?
            .snapshot)
    }

    /// Resolves `query` against the history of `object_id`.
    ///
    /// # Errors
    ///
    /// As [`Self::resolve`], plus [`CoreError::VersionNotFound`] when an ordinal lies beyond the
    /// history.
    pub fn resolve_query(
        &self,
        object_id: &ObjectId,
        query: &VersionQuery,
    ) -> CoreResult<OriginalVersion<T>> {
        let history = self
            .store
            .history(object_id)?
            .ok_or_else(|| CoreError::ResourceNotFound(object_id.to_string()))?;

        let entry = match query {
            VersionQuery::Latest => history.latest()?,
            VersionQuery::AtTime(instant) => history.active_at(*instant)?,
            VersionQuery::AtOrdinal(ordinal) => {
                let latest = history.latest()?;
                history.get(*ordinal).ok_or_else(|| {
                    CoreError::VersionNotFound(latest.version.with_ordinal(*ordinal))
                })?
            }
        }
        .clone();

        let snapshot = self
            .store
            .snapshot(&entry.version)?
            .ok_or_else(|| CoreError::VersionNotFound(entry.version.clone()))?;

        Ok(OriginalVersion { entry, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ResourceLocator;
    use crate::revision::tests::audit;
    use crate::store::memory::MemoryStore;
    use crate::store::{Commit, NewResource};
    use chrono::Duration;
    use vrs_identifiers::{Ordinal, OriginId, VersionIdentifier};

    fn store_with_two_versions() -> (MemoryStore<&'static str>, RevisionEntry, RevisionEntry) {
        let store = MemoryStore::new(OriginId::parse("node").expect("origin"));
        let object_id = ObjectId::new();
        let v1 = store
            .create(NewResource {
                object_id,
                owner_id: ObjectId::new(),
                content: "v1",
                audit: audit(),
            })
            .expect("create");
        let expected = VersionIdentifier::from(v1.version.clone());
        let v2 = store
            .append(
                &object_id,
                Commit {
                    locator: &ResourceLocator::Composition,
                    expected: Some(&expected),
                    content: "v2",
                    audit: audit(),
                },
            )
            .expect("append");
        (store, v1, v2)
    }

    #[test]
    fn resolves_commit_instants_and_gaps_between_them() {
        let (store, v1, v2) = store_with_two_versions();
        let resolver = TemporalResolver::new(&store);
        let object_id = v1.version.object_id();

        let at_v1 = resolver.resolve(&object_id, Some(v1.committed_at)).expect("at v1");
        assert_eq!(*at_v1.content, "v1");

        let between = v1.committed_at + (v2.committed_at - v1.committed_at) / 2;
        let mid = resolver.resolve(&object_id, Some(between)).expect("between");
        assert_eq!(mid.version, v1.version);

        let at_v2 = resolver.resolve(&object_id, Some(v2.committed_at)).expect("at v2");
        assert_eq!(*at_v2.content, "v2");

        let latest = resolver.resolve(&object_id, None).expect("latest");
        assert_eq!(latest.version, v2.version);
    }

    #[test]
    fn instant_before_creation_is_distinct_from_unknown_resource() {
        let (store, v1, _) = store_with_two_versions();
        let resolver = TemporalResolver::new(&store);

        let early = v1.committed_at - Duration::seconds(1);
        let err = resolver
            .resolve(&v1.version.object_id(), Some(early))
            .expect_err("before creation");
        assert!(matches!(err, CoreError::NoVersionBeforeInstant { .. }));

        let err = resolver.resolve(&ObjectId::new(), None).expect_err("unknown");
        assert!(matches!(err, CoreError::ResourceNotFound(_)));
    }

    #[test]
    fn ordinal_beyond_history_is_version_not_found() {
        let (store, v1, _) = store_with_two_versions();
        let resolver = TemporalResolver::new(&store);
        let object_id = v1.version.object_id();

        let first = resolver
            .resolve_query(&object_id, &VersionQuery::AtOrdinal(Ordinal::FIRST))
            .expect("first");
        assert_eq!(first.entry.version, v1.version);
        assert!(first.entry.preceding_version.is_none());

        let three = Ordinal::new(3).expect("ordinal");
        let err = resolver
            .resolve_query(&object_id, &VersionQuery::AtOrdinal(three))
            .expect_err("missing");
        assert!(matches!(err, CoreError::VersionNotFound(v) if v.ordinal() == three));
    }
}
