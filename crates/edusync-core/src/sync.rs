// ── Sync client ──
//
// The one explicitly constructed object the embedding app's root owns.
// Wires the session slot, notifier, HTTP transport, resource cache, entity
// store, and realtime channel together, and runs the background refresh.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use edusync_api::{
    ApiClient, ChannelConfig, ChannelState, Notice, Notifier, PushMessage, RealtimeChannel,
    SessionStore, TlsMode, TransportConfig,
};

use crate::cache::{PollHandle, QueryOptions, ResourceCache};
use crate::config::{SyncConfig, TlsVerification};
use crate::error::SyncError;
use crate::model::Entity;
use crate::mutation::Mutation;
use crate::store::{CollectionKind, EntityCollection, EntityStore};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SyncInner>`. Construct one per backend and
/// hand clones to whatever owns each UI surface; tests construct their own
/// isolated instances.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    session: Arc<SessionStore>,
    notifier: Notifier,
    api: Arc<ApiClient>,
    cache: ResourceCache,
    store: EntityStore,
    channel: RealtimeChannel,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    /// Wire up a client from configuration. Performs no I/O -- call
    /// [`start()`](Self::start) to load data and open the realtime channel.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let session = Arc::new(SessionStore::new());
        let notifier = Notifier::new();

        let transport = TransportConfig {
            tls: tls_to_transport(&config.tls),
            timeout: config.timeout,
        };
        let api = Arc::new(
            ApiClient::new(
                config.base_url.clone(),
                Arc::clone(&session),
                notifier.clone(),
                &transport,
            )
            .map_err(SyncError::from)?,
        );

        let cache = ResourceCache::new(config.timeout);
        let store = EntityStore::new();

        let mut channel_config = ChannelConfig::new(config.realtime_url()?);
        channel_config.reconnect_interval = config.reconnect_interval;
        channel_config.max_reconnect_attempts = config.max_reconnect_attempts;
        let channel = RealtimeChannel::new(channel_config, Arc::clone(&session), notifier.clone());

        Ok(Self {
            inner: Arc::new(SyncInner {
                config,
                session,
                notifier,
                api,
                cache,
                store,
                channel,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.inner.api
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.inner.cache
    }

    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.inner.channel
    }

    /// Subscribe to user-visible notices (the toast stream).
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notifier.subscribe()
    }

    /// Subscribe to inbound push messages.
    pub fn push_messages(&self) -> broadcast::Receiver<Arc<PushMessage>> {
        self.inner.channel.subscribe()
    }

    /// Subscribe to realtime channel state changes.
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.state()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load all collections, open the realtime channel, and start the
    /// periodic store refresh (when configured).
    pub async fn start(&self) -> Result<(), SyncError> {
        self.refresh_all().await?;
        self.inner.channel.connect();

        let interval_secs = self.inner.config.refresh_interval_secs;
        if interval_secs > 0 {
            let client = self.clone();
            let cancel = self.inner.cancel.clone();
            let handle = tokio::spawn(refresh_task(client, interval_secs, cancel));
            self.inner.task_handles.lock().await.push(handle);
        }

        info!("sync client started");
        Ok(())
    }

    /// Stop background work and close the realtime channel.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.channel.disconnect();
        debug!("sync client shut down");
    }

    // ── Cached reads over the transport ──────────────────────────────

    /// Read `path` through the resource cache, fetching over HTTP on a
    /// miss. The path doubles as the cache key.
    pub async fn query(
        &self,
        path: &str,
        options: &QueryOptions,
    ) -> Result<Option<Arc<Value>>, SyncError> {
        let api = Arc::clone(&self.inner.api);
        let endpoint = path.to_owned();
        self.inner
            .cache
            .query(
                path,
                move || async move { api.get::<Value>(&endpoint).await.map_err(SyncError::from) },
                options,
            )
            .await
    }

    /// Re-fetch `path`, bypassing the cached-entry short-circuit.
    pub async fn refetch(
        &self,
        path: &str,
        options: &QueryOptions,
    ) -> Result<Option<Arc<Value>>, SyncError> {
        let api = Arc::clone(&self.inner.api);
        let endpoint = path.to_owned();
        self.inner
            .cache
            .refetch(
                path,
                move || async move { api.get::<Value>(&endpoint).await.map_err(SyncError::from) },
                options,
            )
            .await
    }

    /// Periodically refetch `path` until the handle is dropped.
    pub fn poll_query(&self, path: &str, options: QueryOptions) -> PollHandle {
        let api = Arc::clone(&self.inner.api);
        let endpoint = path.to_owned();
        self.inner.cache.poll(
            path,
            move || {
                let api = Arc::clone(&api);
                let endpoint = endpoint.clone();
                async move { api.get::<Value>(&endpoint).await.map_err(SyncError::from) }
            },
            options,
        )
    }

    /// Build a write against `endpoint`, wired to this client's transport
    /// and cache.
    pub fn mutation(&self, endpoint: impl Into<String>) -> Mutation {
        Mutation::new(
            Arc::clone(&self.inner.api),
            self.inner.cache.clone(),
            endpoint,
        )
    }

    // ── Entity store refresh ─────────────────────────────────────────

    pub async fn refresh(&self, kind: CollectionKind) -> Result<(), SyncError> {
        match kind {
            CollectionKind::Users => self.refresh_users().await,
            CollectionKind::Schools => self.refresh_schools().await,
            CollectionKind::Students => self.refresh_students().await,
            CollectionKind::Teachers => self.refresh_teachers().await,
            CollectionKind::Courses => self.refresh_courses().await,
        }
    }

    pub async fn refresh_users(&self) -> Result<(), SyncError> {
        self.refresh_collection(self.inner.store.users(), CollectionKind::Users)
            .await
    }

    pub async fn refresh_schools(&self) -> Result<(), SyncError> {
        self.refresh_collection(self.inner.store.schools(), CollectionKind::Schools)
            .await
    }

    pub async fn refresh_students(&self) -> Result<(), SyncError> {
        self.refresh_collection(self.inner.store.students(), CollectionKind::Students)
            .await
    }

    pub async fn refresh_teachers(&self) -> Result<(), SyncError> {
        self.refresh_collection(self.inner.store.teachers(), CollectionKind::Teachers)
            .await
    }

    pub async fn refresh_courses(&self) -> Result<(), SyncError> {
        self.refresh_collection(self.inner.store.courses(), CollectionKind::Courses)
            .await
    }

    /// Refresh every collection in parallel.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        let (users, schools, students, teachers, courses) = tokio::join!(
            self.refresh_users(),
            self.refresh_schools(),
            self.refresh_students(),
            self.refresh_teachers(),
            self.refresh_courses(),
        );
        users?;
        schools?;
        students?;
        teachers?;
        courses?;

        debug!(
            students = self.inner.store.students().len(),
            courses = self.inner.store.courses().len(),
            "store refresh complete"
        );
        Ok(())
    }

    /// Fetch one full collection and apply it wholesale, guarded by the
    /// refresh ticket so an overtaken response never clobbers newer data.
    async fn refresh_collection<T: Entity>(
        &self,
        collection: &EntityCollection<T>,
        kind: CollectionKind,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.set_loading(true);

        let ticket = collection.begin_refresh();
        let result: Result<Vec<T>, edusync_api::Error> = self.inner.api.get(kind.path()).await;

        let outcome = match result {
            Ok(items) => {
                if collection.apply_refresh(ticket, items) {
                    store.stamp_refresh();
                } else {
                    debug!(collection = kind.as_str(), ticket, "discarding stale refresh response");
                }
                store.set_error(None);
                Ok(())
            }
            Err(e) => {
                let e = SyncError::from(e);
                store.set_error(Some(e.clone()));
                Err(e)
            }
        };

        store.set_loading(false);
        outcome
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically refresh the entity store.
async fn refresh_task(client: SyncClient, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = client.refresh_all().await {
                    warn!(error = %e, "periodic store refresh failed");
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
