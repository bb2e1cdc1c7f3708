// Authenticated HTTP client for the edusync backend.
//
// Wraps `reqwest::Client` with bearer-token injection from the ambient
// session store, `{ detail, type }` error-body parsing, and the one
// cross-cutting side effect the transport performs: a user-visible error
// notice on any failure. Callers still receive the typed error and may
// react on top of the generic toast.

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::notify::Notifier;
use crate::session::SessionStore;
use crate::transport::TransportConfig;

/// Structured error body the server sends on non-2xx responses.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Authenticated JSON transport. All paths are absolute against the base
/// URL (e.g. `"/students"` against `https://host/api/v1`).
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
    notifier: Notifier,
    timeout_secs: u64,
}

impl ApiClient {
    /// Build a client from a transport config.
    pub fn new(
        base_url: Url,
        session: Arc<SessionStore>,
        notifier: Notifier,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            session,
            notifier,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Wrap a pre-built `reqwest::Client` (tests, shared pools).
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        session: Arc<SessionStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            http,
            base_url,
            session,
            notifier,
            timeout_secs: 30,
        }
    }

    /// The ambient session store this client reads tokens from.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// The notifier this client reports failures through.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    /// Send a GET request and parse the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");
        self.execute(self.http.get(url)).await
    }

    /// Send a POST request with a JSON body and parse the JSON response.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");
        self.execute(self.http.post(url).json(body)).await
    }

    /// Send a bodyless POST request and parse the JSON response.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");
        self.execute(self.http.post(url)).await
    }

    /// Send a PUT request with a JSON body and parse the JSON response.
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");
        self.execute(self.http.put(url).json(body)).await
    }

    /// Send a DELETE request, discarding any response body.
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("DELETE {url}");
        match self.dispatch(self.http.delete(url)).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.report(e)),
        }
    }

    /// Upload a file as `multipart/form-data` under the `file` field.
    ///
    /// Differs from [`post`](Self::post) only in encoding — no JSON
    /// content-type header, the boundary header comes from the form.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url} (multipart, {} bytes)", bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);

        self.execute(self.http.post(url).multipart(form)).await
    }

    // ── Request pipeline ─────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    /// Run a request through the full pipeline: auth header, dispatch,
    /// status handling, JSON parse. Any failure emits one error notice.
    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let resp = match self.dispatch(builder).await {
            Ok(resp) => resp,
            Err(e) => return Err(self.report(e)),
        };

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return Err(self.report(Error::Transport(e))),
        };

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                let preview = &body[..body.len().min(200)];
                Err(self.report(Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }))
            }
        }
    }

    /// Attach the bearer token (when present), send, and map the response
    /// status. Returns the successful response without consuming its body.
    async fn dispatch(
        &self,
        mut builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout { timeout_secs: self.timeout_secs }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let raw = resp.text().await.unwrap_or_default();
        let (detail, kind) = match serde_json::from_str::<ApiErrorBody>(&raw) {
            Ok(body) => (
                body.detail.unwrap_or_else(|| format!("Request failed with status {status}")),
                body.kind,
            ),
            Err(_) => (format!("Request failed with status {status}"), None),
        };

        // The token is dead server-side; drop it so the embedding app can
        // route back to login.
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("received 401, clearing ambient session");
            self.session.sign_out();
        }

        Err(Error::RequestFailed {
            status: status.as_u16(),
            detail,
            kind,
        })
    }

    /// Emit the generic failure notice, then hand the error back.
    fn report(&self, error: Error) -> Error {
        let message = match &error {
            Error::RequestFailed { detail, .. } => detail.clone(),
            other => other.to_string(),
        };
        warn!(error = %error, "request failed");
        self.notifier.error(message);
        error
    }
}
