// edusync-core: Data-synchronization layer between edusync-api and UI surfaces.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod mutation;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{PollHandle, QueryOptions, ResourceCache};
pub use config::{SyncConfig, TlsVerification};
pub use error::SyncError;
pub use mutation::{Mutation, WriteVerb};
pub use store::{CollectionKind, EntityCollection, EntityStore};
pub use sync::SyncClient;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Course, Entity, School, SchoolStatus, StaffStatus, Student, StudentStatus, Teacher, User,
};

// The session/notification surface comes from the api crate; re-export the
// pieces consumers wire against so most apps depend on core alone.
pub use edusync_api::{
    ChannelState, CurrentUser, Notice, NoticeLevel, Notifier, PushMessage, SessionStore, UserRole,
};
