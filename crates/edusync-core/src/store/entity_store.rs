// ── Central entity store ──
//
// One process-wide mirror of the server-owned collections every page reads.
// Any component may trigger a refresh affecting all others; consumers must
// treat snapshots as eventually-consistent reads, never as private copies.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::error::SyncError;
use crate::model::{Course, School, Student, Teacher, User};

/// The named collections the store mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Users,
    Schools,
    Students,
    Teachers,
    Courses,
}

impl CollectionKind {
    pub const ALL: [Self; 5] = [
        Self::Users,
        Self::Schools,
        Self::Students,
        Self::Teachers,
        Self::Courses,
    ];

    /// Endpoint path the collection refreshes from.
    pub fn path(self) -> &'static str {
        match self {
            Self::Users => "/users",
            Self::Schools => "/schools",
            Self::Students => "/students",
            Self::Teachers => "/teachers",
            Self::Courses => "/courses",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Schools => "schools",
            Self::Students => "students",
            Self::Teachers => "teachers",
            Self::Courses => "courses",
        }
    }
}

/// Reactive store for all mirrored collections.
///
/// The `loading` and `error` pair is deliberately ONE flag shared by the
/// whole store, not per-collection: a pending refresh of any collection
/// reads as loading (and an error as erroring) for all of them. A known
/// trade-off -- consumers needing isolation should watch the collection
/// snapshots instead.
pub struct EntityStore {
    users: EntityCollection<User>,
    schools: EntityCollection<School>,
    students: EntityCollection<Student>,
    teachers: EntityCollection<Teacher>,
    courses: EntityCollection<Course>,
    loading: watch::Sender<bool>,
    error: watch::Sender<Option<SyncError>>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl EntityStore {
    pub fn new() -> Self {
        let (loading, _) = watch::channel(false);
        let (error, _) = watch::channel(None);
        let (last_refresh, _) = watch::channel(None);

        Self {
            users: EntityCollection::new(),
            schools: EntityCollection::new(),
            students: EntityCollection::new(),
            teachers: EntityCollection::new(),
            courses: EntityCollection::new(),
            loading,
            error,
            last_refresh,
        }
    }

    // ── Collections ──────────────────────────────────────────────────

    pub fn users(&self) -> &EntityCollection<User> {
        &self.users
    }

    pub fn schools(&self) -> &EntityCollection<School> {
        &self.schools
    }

    pub fn students(&self) -> &EntityCollection<Student> {
        &self.students
    }

    pub fn teachers(&self) -> &EntityCollection<Teacher> {
        &self.teachers
    }

    pub fn courses(&self) -> &EntityCollection<Course> {
        &self.courses
    }

    // ── Shared status pair ───────────────────────────────────────────

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.error.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<SyncError>> {
        self.error.subscribe()
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        let _ = self.loading.send(loading);
    }

    pub(crate) fn set_error(&self, error: Option<SyncError>) {
        let _ = self.error.send(error);
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    /// How long ago the last applied refresh occurred, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_refresh().map(|t| Utc::now() - t)
    }

    pub(crate) fn stamp_refresh(&self) {
        let _ = self.last_refresh.send(Some(Utc::now()));
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_pair_is_shared_across_collections() {
        let store = EntityStore::new();
        assert!(!store.is_loading());

        store.set_loading(true);
        assert!(store.is_loading());

        store.set_error(Some(SyncError::Transport { message: "down".into() }));
        assert!(store.last_error().is_some());

        store.set_error(None);
        assert!(store.last_error().is_none());
    }

    #[test]
    fn refresh_stamp_feeds_data_age() {
        let store = EntityStore::new();
        assert!(store.last_refresh().is_none());
        assert!(store.data_age().is_none());

        store.stamp_refresh();
        assert!(store.last_refresh().is_some());
        assert!(store.data_age().unwrap() >= chrono::Duration::zero());
    }
}
