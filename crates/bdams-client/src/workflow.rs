//! Blood-request workflow: listings, creation and the three lifecycle
//! transitions, applied optimistically against a local cache.
//!
//! A transition snapshots the cached request, applies the change locally,
//! then issues the mutating call. On failure the snapshot is restored. The
//! backend decides races; a `409` means someone else got there first.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use bdams_domain::id::{RequestId, UserId};
use bdams_domain::policy::{AccessPolicy, Action};
use bdams_domain::request::{
    BloodRequest, DonorResponse, NewBloodRequest, RequestStatus, RespondInput, Transition,
    TransitionError,
};
use bdams_domain::user::{BloodType, Profile};
use bdams_domain::wire::FieldError;

use crate::domain::provider::IdentityProvider;
use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::lock;
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OpKey {
    Request(RequestId),
    Available,
    Own,
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(id) => write!(f, "request {id}"),
            Self::Available => f.write_str("available requests"),
            Self::Own => f.write_str("own requests"),
        }
    }
}

/// Requests seen by one user, plus the operations currently running.
#[derive(Default)]
struct Cache {
    owner: Option<UserId>,
    requests: HashMap<RequestId, BloodRequest>,
    in_flight: HashSet<OpKey>,
}

impl Cache {
    /// Forget everything cached for a previous user.
    fn adopt(&mut self, owner: &UserId) {
        if self.owner.as_ref() != Some(owner) {
            self.requests.clear();
            self.owner = Some(owner.clone());
        }
    }

    /// Whether `viewer` may read the cache. Entries held for anyone else,
    /// or for a signed-out session, are dropped.
    fn visible_to(&mut self, viewer: Option<&UserId>) -> bool {
        if viewer.is_some_and(|v| self.owned_by(v)) {
            return true;
        }
        self.requests.clear();
        self.owner = None;
        false
    }

    fn owned_by(&self, owner: &UserId) -> bool {
        self.owner.as_ref() == Some(owner)
    }

    fn put(&mut self, owner: &UserId, request: BloodRequest) {
        if self.owned_by(owner) {
            self.requests.insert(request.id.clone(), request);
        }
    }

    /// Store a listing. Cached entries matching `covered` but absent from
    /// the listing are evicted.
    fn merge_listing<F>(&mut self, owner: &UserId, listing: &[BloodRequest], covered: F)
    where
        F: Fn(&BloodRequest) -> bool,
    {
        if !self.owned_by(owner) {
            return;
        }
        let present: HashSet<&RequestId> = listing.iter().map(|r| &r.id).collect();
        self.requests
            .retain(|id, cached| present.contains(id) || !covered(cached));
        for request in listing {
            self.requests.insert(request.id.clone(), request.clone());
        }
    }

    /// Put `snapshot` back unless something newer replaced `tentative`.
    fn restore(&mut self, owner: &UserId, snapshot: &BloodRequest, tentative: &BloodRequest) -> bool {
        if !self.owned_by(owner) || self.requests.get(&snapshot.id) != Some(tentative) {
            return false;
        }
        self.requests.insert(snapshot.id.clone(), snapshot.clone());
        true
    }
}

/// Releases its operation key on drop.
struct InFlight<'a> {
    cache: &'a Mutex<Cache>,
    key: OpKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.cache).in_flight.remove(&self.key);
    }
}

enum Command<'a> {
    Respond(&'a RespondInput),
    Cancel,
    Complete,
}

impl Command<'_> {
    fn transition(&self) -> Transition {
        match self {
            Self::Respond(_) => Transition::Respond,
            Self::Cancel => Transition::Cancel,
            Self::Complete => Transition::Complete,
        }
    }

    fn action(&self) -> Action {
        match self {
            Self::Respond(_) => Action::RespondToRequest,
            Self::Cancel => Action::CancelRequest,
            Self::Complete => Action::ConfirmCompletion,
        }
    }
}

pub struct RequestWorkflowController<P: IdentityProvider> {
    gateway: Arc<ApiGateway<P>>,
    session: Arc<SessionStore<P>>,
    cache: Mutex<Cache>,
}

impl<P: IdentityProvider> RequestWorkflowController<P> {
    pub fn new(gateway: Arc<ApiGateway<P>>, session: Arc<SessionStore<P>>) -> Self {
        Self {
            gateway,
            session,
            cache: Mutex::new(Cache::default()),
        }
    }

    // ── reads ──────────────────────────────────────────────────────────────

    /// Active requests, optionally for one blood type. Donors only.
    pub async fn fetch_available_requests(
        &self,
        blood_type: Option<BloodType>,
    ) -> Result<Vec<BloodRequest>, ClientError> {
        let actor = self.actor(Action::ViewAllActiveRequests)?;
        let _op = self.begin(OpKey::Available)?;

        let requests = self.gateway.list_active_requests(blood_type).await?;
        debug!(count = requests.len(), ?blood_type, "fetched active requests");
        lock(&self.cache).merge_listing(&actor.id, &requests, |cached| {
            cached.status == RequestStatus::Active
                && blood_type.is_none_or(|wanted| cached.blood_type == wanted)
        });
        Ok(requests)
    }

    /// A recipient's own requests, or a donor's donation history.
    pub async fn fetch_own_requests(&self) -> Result<Vec<BloodRequest>, ClientError> {
        let actor = self.actor(Action::ViewOwnRequests)?;
        let _op = self.begin(OpKey::Own)?;

        let requests = self.gateway.list_my_requests().await?;
        debug!(count = requests.len(), "fetched own requests");
        lock(&self.cache).merge_listing(&actor.id, &requests, |_| false);
        Ok(requests)
    }

    pub async fn fetch_request(&self, id: &RequestId) -> Result<BloodRequest, ClientError> {
        let actor = self.signed_in()?;
        let _op = self.begin(OpKey::Request(id.clone()))?;
        self.load(&actor.id, id).await
    }

    /// Last known copy of a request, without a network call.
    /// Nothing is returned once the session no longer has this user's profile.
    pub fn cached(&self, id: &RequestId) -> Option<BloodRequest> {
        let viewer = self.session.profile().map(|p| p.id);
        let mut cache = lock(&self.cache);
        if !cache.visible_to(viewer.as_ref()) {
            return None;
        }
        cache.requests.get(id).cloned()
    }

    /// Every cached request, newest first.
    pub fn cached_requests(&self) -> Vec<BloodRequest> {
        let viewer = self.session.profile().map(|p| p.id);
        let mut requests: Vec<BloodRequest> = {
            let mut cache = lock(&self.cache);
            if !cache.visible_to(viewer.as_ref()) {
                return Vec::new();
            }
            cache.requests.values().cloned().collect()
        };
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    // ── writes ─────────────────────────────────────────────────────────────

    pub async fn create_request(&self, new: &NewBloodRequest) -> Result<BloodRequest, ClientError> {
        let actor = self.actor(Action::CreateRequest)?;
        if new.location.trim().is_empty() {
            return Err(ClientError::Validation {
                message: "invalid input".to_owned(),
                fields: vec![FieldError::new("location", "must not be empty")],
            });
        }

        let created = self.gateway.create_request(new).await?;
        info!(
            request_id = %created.id,
            blood_type = %created.blood_type,
            urgency = %created.urgency,
            "request created"
        );
        lock(&self.cache).put(&actor.id, created.clone());
        Ok(created)
    }

    /// Donor offers to donate: `active → pending_confirmation`.
    pub async fn respond(&self, id: &RequestId, message: &str) -> Result<BloodRequest, ClientError> {
        let input = RespondInput {
            message: message.to_owned(),
        };
        self.run(id, Command::Respond(&input)).await
    }

    /// Owner withdraws the request: `active → cancelled`.
    pub async fn cancel(&self, id: &RequestId) -> Result<BloodRequest, ClientError> {
        self.run(id, Command::Cancel).await
    }

    /// Owner confirms the donation happened: `pending_confirmation → completed`.
    pub async fn complete(&self, id: &RequestId) -> Result<BloodRequest, ClientError> {
        self.run(id, Command::Complete).await
    }

    async fn run(&self, id: &RequestId, command: Command<'_>) -> Result<BloodRequest, ClientError> {
        let transition = command.transition();
        let action = command.action();
        let actor = self.actor(action)?;
        let _op = self.begin(OpKey::Request(id.clone()))?;

        let (mut snapshot, from_cache) = match self.cached(id) {
            Some(request) => (request, true),
            None => (self.load(&actor.id, id).await?, false),
        };

        let mut tentative = snapshot.clone();
        match tentative.apply(transition) {
            Ok(()) => {}
            // Statuses only move forward: the cached copy is behind the backend.
            Err(TransitionError::Premature { status, .. }) if from_cache => {
                debug!(request_id = %id, %status, %transition, "cached copy is stale; refetching");
                snapshot = self.load(&actor.id, id).await?;
                tentative = snapshot.clone();
                tentative
                    .apply(transition)
                    .map_err(|e| precondition_error(id, e))?;
            }
            Err(err) => return Err(precondition_error(id, err)),
        }
        if !AccessPolicy::permits(actor.role, action, &actor.id, Some(&snapshot)) {
            return Err(ClientError::denied(action));
        }
        if let Command::Respond(input) = &command {
            tentative.responses.push(DonorResponse {
                donor_id: actor.id.clone(),
                donor_name: actor.name.clone(),
                contact: actor.contact(),
                message: input.message.clone(),
                created_at: Utc::now(),
            });
        }
        lock(&self.cache).put(&actor.id, tentative.clone());
        debug!(request_id = %id, %transition, "applied optimistically");

        let outcome = match &command {
            Command::Respond(input) => self.gateway.respond(id, input).await,
            Command::Cancel => self.gateway.cancel(id).await,
            Command::Complete => self.gateway.complete(id).await,
        };

        match outcome {
            Ok(Some(updated)) => {
                info!(request_id = %id, %transition, status = %updated.status, "transition accepted");
                lock(&self.cache).put(&actor.id, updated.clone());
                Ok(updated)
            }
            Ok(None) => {
                info!(request_id = %id, %transition, "transition accepted");
                match self.gateway.fetch_request(id).await {
                    Ok(fresh) => {
                        lock(&self.cache).put(&actor.id, fresh.clone());
                        Ok(fresh)
                    }
                    Err(err) => {
                        debug!(request_id = %id, error = %err, "could not reconcile; keeping local copy");
                        Ok(tentative)
                    }
                }
            }
            Err(ClientError::RequestConflict) => {
                warn!(request_id = %id, %transition, "request already taken; rolling back");
                lock(&self.cache).restore(&actor.id, &snapshot, &tentative);
                match self.gateway.fetch_request(id).await {
                    Ok(fresh) => lock(&self.cache).put(&actor.id, fresh),
                    Err(err) => debug!(request_id = %id, error = %err, "refetch after conflict failed"),
                }
                Err(ClientError::RequestConflict)
            }
            Err(err) => {
                warn!(request_id = %id, %transition, error = %err, "transition failed; rolling back");
                lock(&self.cache).restore(&actor.id, &snapshot, &tentative);
                Err(err)
            }
        }
    }

    // ── helpers ────────────────────────────────────────────────────────────

    fn signed_in(&self) -> Result<Profile, ClientError> {
        let profile = self.session.require_profile()?;
        lock(&self.cache).adopt(&profile.id);
        Ok(profile)
    }

    /// The signed-in profile, if its role may ever perform `action`.
    fn actor(&self, action: Action) -> Result<Profile, ClientError> {
        let profile = self.signed_in()?;
        if !AccessPolicy::is_allowed(profile.role, action) {
            debug!(role = %profile.role, %action, "denied by policy");
            return Err(ClientError::denied(action));
        }
        Ok(profile)
    }

    fn begin(&self, key: OpKey) -> Result<InFlight<'_>, ClientError> {
        let mut cache = lock(&self.cache);
        if !cache.in_flight.insert(key.clone()) {
            return Err(ClientError::OperationInFlight(key.to_string()));
        }
        Ok(InFlight {
            cache: &self.cache,
            key,
        })
    }

    async fn load(&self, owner: &UserId, id: &RequestId) -> Result<BloodRequest, ClientError> {
        let request = self.gateway.fetch_request(id).await?;
        lock(&self.cache).put(owner, request.clone());
        Ok(request)
    }
}

fn precondition_error(id: &RequestId, err: TransitionError) -> ClientError {
    match err {
        TransitionError::Superseded { status, transition } => {
            warn!(request_id = %id, %status, %transition, "request already moved on");
            ClientError::RequestConflict
        }
        TransitionError::Premature { .. } => ClientError::InvalidTransition(err),
    }
}
