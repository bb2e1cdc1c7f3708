// ── Mutation executor ──
//
// One write per call, no deduplication: reads may be merged, writes never
// are. On success the caller-declared cache keys are invalidated so the
// next read of each is fresh; on failure nothing is invalidated and the
// error is re-raised so call sites can branch (e.g. keep a form open).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use edusync_api::ApiClient;

use crate::cache::ResourceCache;
use crate::error::SyncError;

type SuccessCallback = Arc<dyn Fn(&Arc<Value>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// HTTP verb a mutation issues. `Post` covers creation and most actions;
/// `Put`/`Delete` cover the update and remove endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteVerb {
    #[default]
    Post,
    Put,
    Delete,
}

/// A configured write operation against one endpoint.
///
/// Loading state is scoped to this instance, not shared globally --
/// independent mutations stay independent.
pub struct Mutation {
    api: Arc<ApiClient>,
    cache: ResourceCache,
    endpoint: String,
    verb: WriteVerb,
    invalidates: Vec<String>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    loading: watch::Sender<bool>,
}

impl Mutation {
    pub fn new(api: Arc<ApiClient>, cache: ResourceCache, endpoint: impl Into<String>) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            api,
            cache,
            endpoint: endpoint.into(),
            verb: WriteVerb::default(),
            invalidates: Vec::new(),
            on_success: None,
            on_error: None,
            loading,
        }
    }

    pub fn verb(mut self, verb: WriteVerb) -> Self {
        self.verb = verb;
        self
    }

    /// Cache keys whose entries are discarded after a successful write.
    pub fn invalidates(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.invalidates = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_success(mut self, f: impl Fn(&Arc<Value>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Issue the write. Exactly one request per call.
    ///
    /// `variables` is ignored for [`WriteVerb::Delete`], which carries no
    /// body; its result settles as `Value::Null`.
    pub async fn mutate<V: Serialize + Sync>(&self, variables: &V) -> Result<Arc<Value>, SyncError> {
        let _ = self.loading.send(true);
        let result = self.execute(variables).await;
        let _ = self.loading.send(false);

        match result {
            Ok(value) => {
                for key in &self.invalidates {
                    self.cache.invalidate(key);
                }
                if let Some(cb) = &self.on_success {
                    cb(&value);
                }
                Ok(value)
            }
            Err(e) => {
                if let Some(cb) = &self.on_error {
                    cb(&e);
                }
                Err(e)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Observe this mutation's loading flag.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    async fn execute<V: Serialize + Sync>(&self, variables: &V) -> Result<Arc<Value>, SyncError> {
        let value = match self.verb {
            WriteVerb::Post => self.api.post::<Value, V>(&self.endpoint, variables).await?,
            WriteVerb::Put => self.api.put::<Value, V>(&self.endpoint, variables).await?,
            WriteVerb::Delete => {
                self.api.delete(&self.endpoint).await?;
                Value::Null
            }
        };
        Ok(Arc::new(value))
    }
}
