//! In-process mock of the BDAMS backend.
//!
//! Serves the REST surface under `/api` from in-memory state. One lock
//! serializes every write, so concurrent responses to the same request are
//! decided by arrival order: the first wins, the rest get `409`.
//!
//! Faults can be injected per test: slow profile loads, failing mutations,
//! revoked users and acknowledgement-only mutation responses.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use bdams_auth_types::identity::{BearerIdentity, JwtSecret};
use bdams_domain::id::{RequestId, UserId};
use bdams_domain::policy::{AccessPolicy, Action};
use bdams_domain::request::{
    BloodRequest, DonorResponse, NewBloodRequest, RequestStatus, RespondInput, Transition,
};
use bdams_domain::user::{BloodType, Profile, ProfileUpdate, Registration, Role};
use bdams_domain::wire::FieldError;

use crate::accounts::AccountDirectory;
use crate::error::BackendError;
use crate::provider::MockIdentityProvider;
use crate::{TEST_JWT_SECRET, lock};

#[derive(Default)]
struct Store {
    profiles: HashMap<UserId, Profile>,
    /// Creation order.
    requests: Vec<BloodRequest>,
}

impl Store {
    fn find_mut(&mut self, id: &str) -> Result<&mut BloodRequest, BackendError> {
        self.requests
            .iter_mut()
            .find(|r| r.id.0 == id)
            .ok_or(BackendError::NotFound)
    }
}

#[derive(Default)]
struct Faults {
    profile_delay: HashMap<UserId, Duration>,
    failing_mutations: Option<StatusCode>,
    revoked: HashSet<UserId>,
    acknowledge_only: bool,
}

/// Shared state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct BackendState {
    secret: JwtSecret,
    accounts: AccountDirectory,
    store: Arc<Mutex<Store>>,
    faults: Arc<Mutex<Faults>>,
}

impl FromRef<BackendState> for JwtSecret {
    fn from_ref(state: &BackendState) -> Self {
        state.secret.clone()
    }
}

impl BackendState {
    fn new(accounts: AccountDirectory) -> Self {
        Self {
            secret: JwtSecret(Arc::from(TEST_JWT_SECRET)),
            accounts,
            store: Arc::default(),
            faults: Arc::default(),
        }
    }

    /// The caller's profile. Revoked users get `401`.
    fn caller(&self, identity: &BearerIdentity) -> Result<Profile, BackendError> {
        let user_id = UserId(identity.user_id.clone());
        if lock(&self.faults).revoked.contains(&user_id) {
            return Err(BackendError::Unauthorized);
        }
        lock(&self.store)
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    fn injected_failure(&self) -> Result<(), BackendError> {
        match lock(&self.faults).failing_mutations {
            Some(status) => Err(BackendError::Injected(status)),
            None => Ok(()),
        }
    }

    fn acknowledge(&self, updated: BloodRequest, message: &str) -> Json<Value> {
        if lock(&self.faults).acknowledge_only {
            Json(json!({ "message": message }))
        } else {
            Json(json!(updated))
        }
    }

    fn create_profile(&self, registration: &Registration) -> Result<Profile, BackendError> {
        let mut fields = Vec::new();
        if !registration.email.contains('@') {
            fields.push(FieldError::new("email", "must be a valid email"));
        }
        if registration.password.len() < 6 {
            fields.push(FieldError::new("password", "must be at least 6 characters"));
        }
        if registration.name.trim().is_empty() {
            fields.push(FieldError::new("name", "must not be empty"));
        }
        if !fields.is_empty() {
            return Err(BackendError::Validation(fields));
        }

        let account = self
            .accounts
            .create(&registration.email, &registration.password)
            .ok_or_else(|| BackendError::field("email", "is already registered"))?;
        let profile = Profile {
            id: account.user_id,
            name: registration.name.trim().to_owned(),
            email: registration.email.clone(),
            role: registration.role,
            blood_type: registration.blood_type,
            phone: registration.phone.clone(),
        };
        lock(&self.store)
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }
}

fn require(profile: &Profile, action: Action) -> Result<(), BackendError> {
    if AccessPolicy::is_allowed(profile.role, action) {
        Ok(())
    } else {
        Err(BackendError::Forbidden("role may not perform this action"))
    }
}

fn newest_first(requests: &mut [BloodRequest]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub fn build_router(state: BackendState) -> Router {
    let api = Router::new()
        .route("/register", post(register))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/requests", get(list_active).post(create_request))
        .route("/requests/my-requests", get(list_mine))
        .route("/requests/{id}", get(get_request).delete(cancel_request))
        .route("/requests/{id}/respond", post(respond))
        .route("/requests/{id}/complete", post(complete))
        .with_state(state);
    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

// ── POST /register ───────────────────────────────────────────────────────────

async fn register(
    State(state): State<BackendState>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<Value>), BackendError> {
    let profile = state.create_profile(&body)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "data": profile })),
    ))
}

// ── GET/PUT /profile ─────────────────────────────────────────────────────────

async fn get_profile(
    identity: BearerIdentity,
    State(state): State<BackendState>,
) -> Result<Json<Profile>, BackendError> {
    let user_id = UserId(identity.user_id.clone());
    let delay = lock(&state.faults).profile_delay.get(&user_id).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Ok(Json(state.caller(&identity)?))
}

async fn update_profile(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, BackendError> {
    let mut profile = state.caller(&identity)?;
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(BackendError::field("name", "must not be empty"));
        }
        profile.name = name.trim().to_owned();
    }
    if let Some(blood_type) = update.blood_type {
        profile.blood_type = Some(blood_type);
    }
    if let Some(phone) = update.phone {
        profile.phone = Some(phone).filter(|p| !p.trim().is_empty());
    }
    lock(&state.store)
        .profiles
        .insert(profile.id.clone(), profile.clone());
    Ok(Json(profile))
}

// ── /requests ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "bloodType")]
    blood_type: Option<BloodType>,
}

async fn list_active(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, BackendError> {
    let profile = state.caller(&identity)?;
    require(&profile, Action::ViewAllActiveRequests)?;
    let mut requests: Vec<BloodRequest> = lock(&state.store)
        .requests
        .iter()
        .filter(|r| r.status == RequestStatus::Active)
        .filter(|r| query.blood_type.is_none_or(|wanted| r.blood_type == wanted))
        .cloned()
        .collect();
    newest_first(&mut requests);
    Ok(Json(json!({ "data": requests })))
}

async fn list_mine(
    identity: BearerIdentity,
    State(state): State<BackendState>,
) -> Result<Json<Vec<BloodRequest>>, BackendError> {
    let profile = state.caller(&identity)?;
    require(&profile, Action::ViewOwnRequests)?;
    let mut requests: Vec<BloodRequest> = lock(&state.store)
        .requests
        .iter()
        .filter(|r| match profile.role {
            Role::Recipient => r.is_owned_by(&profile.id),
            Role::Donor => r.has_response_from(&profile.id),
        })
        .cloned()
        .collect();
    newest_first(&mut requests);
    Ok(Json(requests))
}

async fn create_request(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Json(body): Json<NewBloodRequest>,
) -> Result<(StatusCode, Json<BloodRequest>), BackendError> {
    let profile = state.caller(&identity)?;
    require(&profile, Action::CreateRequest)?;
    state.injected_failure()?;
    if body.location.trim().is_empty() {
        return Err(BackendError::field("location", "must not be empty"));
    }

    let request = BloodRequest {
        id: RequestId(Uuid::now_v7().to_string()),
        requester_id: profile.id,
        blood_type: body.blood_type,
        location: body.location.trim().to_owned(),
        urgency: body.urgency,
        status: RequestStatus::Active,
        created_at: Utc::now(),
        responses: Vec::new(),
    };
    lock(&state.store).requests.push(request.clone());
    tracing::debug!(request_id = %request.id, "mock backend created request");
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Path(id): Path<String>,
) -> Result<Json<BloodRequest>, BackendError> {
    state.caller(&identity)?;
    let mut store = lock(&state.store);
    Ok(Json(store.find_mut(&id)?.clone()))
}

async fn respond(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Path(id): Path<String>,
    Json(body): Json<RespondInput>,
) -> Result<Json<Value>, BackendError> {
    let donor = state.caller(&identity)?;
    require(&donor, Action::RespondToRequest)?;
    state.injected_failure()?;

    let updated = {
        let mut store = lock(&state.store);
        let request = store.find_mut(&id)?;
        request
            .apply(Transition::Respond)
            .map_err(|e| BackendError::Conflict(e.to_string()))?;
        request.responses.push(DonorResponse {
            donor_id: donor.id.clone(),
            donor_name: donor.name.clone(),
            contact: donor.contact(),
            message: body.message,
            created_at: Utc::now(),
        });
        request.clone()
    };
    Ok(state.acknowledge(updated, "Response recorded"))
}

async fn complete(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, BackendError> {
    owner_transition(&state, &identity, &id, Action::ConfirmCompletion, Transition::Complete)
        .map(|updated| state.acknowledge(updated, "Request completed"))
}

async fn cancel_request(
    identity: BearerIdentity,
    State(state): State<BackendState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, BackendError> {
    owner_transition(&state, &identity, &id, Action::CancelRequest, Transition::Cancel)
        .map(|updated| state.acknowledge(updated, "Request cancelled"))
}

fn owner_transition(
    state: &BackendState,
    identity: &BearerIdentity,
    id: &str,
    action: Action,
    transition: Transition,
) -> Result<BloodRequest, BackendError> {
    let profile = state.caller(identity)?;
    require(&profile, action)?;
    state.injected_failure()?;

    let mut store = lock(&state.store);
    let request = store.find_mut(id)?;
    if !request.is_owned_by(&profile.id) {
        return Err(BackendError::Forbidden("only the requester may do this"));
    }
    request
        .apply(transition)
        .map_err(|e| BackendError::Conflict(e.to_string()))?;
    Ok(request.clone())
}

// ── handle ───────────────────────────────────────────────────────────────────

/// A running mock backend. The server stops when this is dropped.
pub struct MockBackend {
    base_url: String,
    state: BackendState,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind `127.0.0.1:0` and serve with a fresh account directory.
    pub async fn spawn() -> std::io::Result<Self> {
        Self::with_accounts(AccountDirectory::new()).await
    }

    pub async fn with_accounts(accounts: AccountDirectory) -> std::io::Result<Self> {
        let state = BackendState::new(accounts);
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = build_router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "mock backend stopped");
            }
        });
        Ok(Self {
            base_url: format!("http://{addr}/api"),
            state,
            server,
        })
    }

    /// Base URL including the `/api` prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.state.accounts
    }

    /// A provider whose tokens this backend accepts.
    pub fn provider(&self) -> MockIdentityProvider {
        MockIdentityProvider::new(self.state.accounts.clone())
    }

    /// Create an account and profile directly, bypassing HTTP.
    pub fn register(&self, registration: &Registration) -> Result<Profile, BackendError> {
        self.state.create_profile(registration)
    }

    pub fn request(&self, id: &RequestId) -> Option<BloodRequest> {
        lock(&self.state.store)
            .requests
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    pub fn delay_profile(&self, user: &UserId, delay: Duration) {
        lock(&self.state.faults)
            .profile_delay
            .insert(user.clone(), delay);
    }

    /// Make every mutating endpoint answer `status` (or behave again on `None`).
    pub fn fail_mutations(&self, status: Option<StatusCode>) {
        lock(&self.state.faults).failing_mutations = status;
    }

    /// Reject every call from `user` with `401`.
    pub fn revoke(&self, user: &UserId) {
        lock(&self.state.faults).revoked.insert(user.clone());
    }

    /// Answer mutations with `{"message": ...}` instead of the updated request.
    pub fn acknowledge_only(&self, enabled: bool) {
        lock(&self.state.faults).acknowledge_only = enabled;
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
