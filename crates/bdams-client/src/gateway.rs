//! Backend API gateway.
//!
//! Every call resolves a fresh token from the [`IdentityClient`] and sends it
//! as `Authorization: Bearer <token>`. HTTP failures are normalized into
//! [`ClientError`]; nothing is retried here.

use std::sync::{Arc, RwLock};

use http::StatusCode;
use http::header::AUTHORIZATION;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use bdams_domain::id::RequestId;
use bdams_domain::request::{BloodRequest, NewBloodRequest, RespondInput};
use bdams_domain::user::{BloodType, Profile, ProfileUpdate, Registration};
use bdams_domain::wire::{Envelope, ErrorBody};

use crate::config::ClientConfig;
use crate::domain::provider::IdentityProvider;
use crate::error::ClientError;
use crate::identity::IdentityClient;

/// Invoked when a call that carried a token comes back 401.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    blood_type: Option<BloodType>,
}

pub struct ApiGateway<P> {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<IdentityClient<P>>,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

impl<P: IdentityProvider> ApiGateway<P> {
    pub fn new(config: &ClientConfig, identity: Arc<IdentityClient<P>>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Internal(anyhow::Error::new(e).context("build HTTP client")))?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            identity,
            on_unauthorized: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install the forced-logout hook. Replaces any previous hook.
    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        *self
            .on_unauthorized
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(hook);
    }

    // ── profile ────────────────────────────────────────────────────────────

    /// `POST /register`, always unauthenticated.
    pub async fn register(&self, registration: &Registration) -> Result<Profile, ClientError> {
        let body = self
            .dispatch(Method::POST, "/register", Some(registration), Auth::Anonymous)
            .await?;
        decode(&body)
    }

    pub async fn fetch_profile(&self) -> Result<Profile, ClientError> {
        let body = self.get("/profile").await?;
        decode(&body)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientError> {
        let body = self
            .dispatch(Method::PUT, "/profile", Some(update), Auth::Bearer)
            .await?;
        decode(&body)
    }

    // ── requests ───────────────────────────────────────────────────────────

    pub async fn create_request(&self, request: &NewBloodRequest) -> Result<BloodRequest, ClientError> {
        let body = self
            .dispatch(Method::POST, "/requests", Some(request), Auth::Bearer)
            .await?;
        decode(&body)
    }

    /// `GET /requests`: active requests, optionally for one blood type.
    pub async fn list_active_requests(
        &self,
        blood_type: Option<BloodType>,
    ) -> Result<Vec<BloodRequest>, ClientError> {
        let body = self.get(&list_path(blood_type)?).await?;
        decode(&body)
    }

    /// `GET /requests/my-requests`: a recipient's own requests, or the
    /// requests a donor has responded to.
    pub async fn list_my_requests(&self) -> Result<Vec<BloodRequest>, ClientError> {
        let body = self.get("/requests/my-requests").await?;
        decode(&body)
    }

    pub async fn fetch_request(&self, id: &RequestId) -> Result<BloodRequest, ClientError> {
        let body = self.get(&format!("/requests/{id}")).await?;
        decode(&body)
    }

    /// `POST /requests/{id}/respond`. Returns the updated request when the
    /// backend echoes it.
    pub async fn respond(
        &self,
        id: &RequestId,
        input: &RespondInput,
    ) -> Result<Option<BloodRequest>, ClientError> {
        let body = self
            .dispatch(
                Method::POST,
                &format!("/requests/{id}/respond"),
                Some(input),
                Auth::Bearer,
            )
            .await?;
        Ok(decode_echo(&body))
    }

    pub async fn complete(&self, id: &RequestId) -> Result<Option<BloodRequest>, ClientError> {
        let body = self
            .dispatch::<()>(
                Method::POST,
                &format!("/requests/{id}/complete"),
                None,
                Auth::Bearer,
            )
            .await?;
        Ok(decode_echo(&body))
    }

    /// `DELETE /requests/{id}`: cancels the request.
    pub async fn cancel(&self, id: &RequestId) -> Result<Option<BloodRequest>, ClientError> {
        let body = self
            .dispatch::<()>(Method::DELETE, &format!("/requests/{id}"), None, Auth::Bearer)
            .await?;
        Ok(decode_echo(&body))
    }

    // ── transport ──────────────────────────────────────────────────────────

    async fn get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        self.dispatch::<()>(Method::GET, path, None, Auth::Bearer)
            .await
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<Vec<u8>, ClientError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{path}", self.base_url));

        let mut authenticated = false;
        if auth == Auth::Bearer {
            let token = match self.identity.get_token().await {
                Ok(token) => token,
                Err(ClientError::Unauthorized) => {
                    self.invalidate_session();
                    return Err(ClientError::Unauthorized);
                }
                Err(e) => return Err(e),
            };
            if let Some(token) = token {
                let value = bdams_auth_types::bearer::header_value(&token)
                    .map_err(|e| ClientError::Internal(e.into()))?;
                request = request.header(AUTHORIZATION, value);
                authenticated = true;
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::Network)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::Network)?;
        debug!(%method, path, status = status.as_u16(), authenticated, "backend call");

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let err = classify(status, &bytes);
        if authenticated && matches!(err, ClientError::Unauthorized) {
            warn!(%method, path, "token rejected by backend");
            self.invalidate_session();
        }
        Err(err)
    }

    fn invalidate_session(&self) {
        let hook = self
            .on_unauthorized
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

fn list_path(blood_type: Option<BloodType>) -> Result<String, ClientError> {
    let query = serde_qs::to_string(&ListQuery { blood_type })
        .map_err(|e| ClientError::Internal(anyhow::anyhow!("encode query: {e}")))?;
    if query.is_empty() {
        Ok("/requests".to_owned())
    } else {
        Ok(format!("/requests?{query}"))
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(ClientError::Decode)
}

/// Mutations may answer with the updated request or with a bare
/// acknowledgement; only the former is useful.
fn decode_echo(body: &[u8]) -> Option<BloodRequest> {
    if body.is_empty() {
        return None;
    }
    decode(body).ok()
}

/// Map a non-success status and its body to the client taxonomy.
pub(crate) fn classify(status: StatusCode, body: &[u8]) -> ClientError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
    match status.as_u16() {
        401 => ClientError::Unauthorized,
        403 => ClientError::Forbidden(message),
        404 => ClientError::NotFound,
        409 => ClientError::RequestConflict,
        400..=499 => ClientError::Validation {
            message,
            fields: parsed.fields,
        },
        code => ClientError::Server {
            status: code,
            message,
        },
    }
}
