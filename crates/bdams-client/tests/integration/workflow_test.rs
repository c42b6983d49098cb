use bdams_client::ClientError;
use bdams_client::session::SessionState;
use bdams_domain::id::RequestId;
use bdams_domain::request::{BloodRequest, NewBloodRequest, RequestStatus, Urgency};
use bdams_domain::user::BloodType;
use bdams_testing::{MockBackend, fixtures};
use http::StatusCode;

use crate::helpers::{Client, backend, signed_in};

fn city_hospital() -> NewBloodRequest {
    NewBloodRequest {
        blood_type: BloodType::ONegative,
        location: "City Hospital".to_owned(),
        urgency: Urgency::High,
    }
}

async fn recipient_with_request(backend: &MockBackend) -> (Client, BloodRequest) {
    let (recipient, _) = signed_in(backend, &fixtures::recipient("hospital@example.com")).await;
    let request = recipient
        .workflow
        .create_request(&city_hospital())
        .await
        .unwrap();
    (recipient, request)
}

async fn donor(backend: &MockBackend, email: &str) -> Client {
    signed_in(backend, &fixtures::donor(email, BloodType::ONegative))
        .await
        .0
}

#[tokio::test]
async fn should_walk_request_from_creation_to_completion() {
    let backend = backend().await;
    let (recipient, request) = recipient_with_request(&backend).await;
    assert_eq!(request.status, RequestStatus::Active);
    assert!(request.responses.is_empty());
    assert_eq!(request.location, "City Hospital");
    assert_eq!(request.urgency, Urgency::High);

    let donor = donor(&backend, "ram@example.com").await;
    let available = donor
        .workflow
        .fetch_available_requests(Some(BloodType::ONegative))
        .await
        .unwrap();
    assert_eq!(available.len(), 1);

    let responded = donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap();
    assert_eq!(responded.status, RequestStatus::PendingConfirmation);
    assert_eq!(responded.responses.len(), 1);
    assert_eq!(responded.responses[0].message, "Available today");
    assert_eq!(responded.responses[0].donor_name, "Ram");

    // The recipient's cached copy is still `active`; completing refetches it.
    assert_eq!(
        recipient.workflow.cached(&request.id).unwrap().status,
        RequestStatus::Active
    );
    let completed = recipient.workflow.complete(&request.id).await.unwrap();
    assert_eq!(completed.status, RequestStatus::Completed);
    assert_eq!(completed.responses.len(), 1);
    assert_eq!(
        recipient.workflow.cached(&request.id).unwrap().status,
        RequestStatus::Completed
    );

    let err = donor
        .workflow
        .respond(&request.id, "Still available")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RequestConflict));
    let err = recipient.workflow.cancel(&request.id).await.unwrap_err();
    assert!(matches!(err, ClientError::RequestConflict));

    let stored = backend.request(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Completed);
    assert_eq!(stored.responses.len(), 1);
}

#[tokio::test]
async fn should_report_conflict_when_responding_to_cancelled_request() {
    let backend = backend().await;
    let (recipient, request) = recipient_with_request(&backend).await;
    let donor = donor(&backend, "ram@example.com").await;
    donor.workflow.fetch_available_requests(None).await.unwrap();

    let cancelled = recipient.workflow.cancel(&request.id).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    assert!(cancelled.responses.is_empty());

    let err = donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RequestConflict));

    // Rolled back, then replaced by the authoritative copy.
    let cached = donor.workflow.cached(&request.id).unwrap();
    assert_eq!(cached.status, RequestStatus::Cancelled);
    assert!(cached.responses.is_empty());
}

#[tokio::test]
async fn should_accept_exactly_one_of_two_concurrent_donors() {
    let backend = backend().await;
    let (_recipient, request) = recipient_with_request(&backend).await;
    let first = donor(&backend, "first@example.com").await;
    let second = donor(&backend, "second@example.com").await;
    first.workflow.fetch_available_requests(None).await.unwrap();
    second.workflow.fetch_available_requests(None).await.unwrap();

    let (a, b) = futures::join!(
        first.workflow.respond(&request.id, "On my way"),
        second.workflow.respond(&request.id, "Can come tomorrow"),
    );

    let (winner, loser) = match (&a, &b) {
        (Ok(_), Err(_)) => (&first, &second),
        (Err(_), Ok(_)) => (&second, &first),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert!(matches!(
        a.as_ref().err().or(b.as_ref().err()),
        Some(ClientError::RequestConflict)
    ));

    let stored = backend.request(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::PendingConfirmation);
    assert_eq!(stored.responses.len(), 1);
    let winner_id = winner.identity.current().unwrap().id;
    assert_eq!(stored.responses[0].donor_id, winner_id);

    let loser_copy = loser.workflow.cached(&request.id).unwrap();
    assert_eq!(loser_copy, stored);
}

#[tokio::test]
async fn should_roll_back_when_mutation_fails() {
    let backend = backend().await;
    let (_recipient, request) = recipient_with_request(&backend).await;
    let donor = donor(&backend, "ram@example.com").await;
    donor.workflow.fetch_available_requests(None).await.unwrap();

    backend.fail_mutations(Some(StatusCode::INTERNAL_SERVER_ERROR));
    let err = donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap_err();

    match &err {
        ClientError::Server { status, .. } => assert_eq!(*status, 500),
        other => panic!("expected server error, got {other:?}"),
    }
    assert!(err.is_retryable());
    let cached = donor.workflow.cached(&request.id).unwrap();
    assert_eq!(cached, request);

    backend.fail_mutations(None);
    let responded = donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap();
    assert_eq!(responded.status, RequestStatus::PendingConfirmation);
}

#[tokio::test]
async fn should_reconcile_when_backend_only_acknowledges() {
    let backend = backend().await;
    let (recipient, request) = recipient_with_request(&backend).await;
    backend.acknowledge_only(true);

    let cancelled = recipient.workflow.cancel(&request.id).await.unwrap();

    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    assert_eq!(cancelled, backend.request(&request.id).unwrap());
}

#[tokio::test]
async fn should_forbid_cancelling_someone_elses_request() {
    let backend = backend().await;
    let (_owner, request) = recipient_with_request(&backend).await;
    let (other, _) = signed_in(&backend, &fixtures::recipient("clinic@example.com")).await;

    let err = other.workflow.cancel(&request.id).await.unwrap_err();

    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(
        backend.request(&request.id).unwrap().status,
        RequestStatus::Active
    );
    assert_eq!(
        other.workflow.cached(&request.id).unwrap().status,
        RequestStatus::Active
    );
}

#[tokio::test]
async fn should_refuse_overlapping_operations_on_same_request() {
    let backend = backend().await;
    let (recipient, request) = recipient_with_request(&backend).await;

    let (a, b) = futures::join!(
        recipient.workflow.cancel(&request.id),
        recipient.workflow.cancel(&request.id),
    );

    assert!(a.is_ok());
    assert!(matches!(b, Err(ClientError::OperationInFlight(_))));
}

#[tokio::test]
async fn should_validate_location_locally() {
    let backend = backend().await;
    let (recipient, _) = signed_in(&backend, &fixtures::recipient("hospital@example.com")).await;

    let err = recipient
        .workflow
        .create_request(&NewBloodRequest {
            location: "   ".to_owned(),
            ..city_hospital()
        })
        .await
        .unwrap_err();

    match err {
        ClientError::Validation { fields, .. } => assert_eq!(fields[0].field, "location"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn should_filter_available_requests_by_blood_type() {
    let backend = backend().await;
    let (recipient, o_negative) = recipient_with_request(&backend).await;
    let a_positive = recipient
        .workflow
        .create_request(&NewBloodRequest {
            blood_type: BloodType::APositive,
            location: "Teaching Hospital".to_owned(),
            urgency: Urgency::Low,
        })
        .await
        .unwrap();
    let donor = donor(&backend, "ram@example.com").await;

    let filtered = donor
        .workflow
        .fetch_available_requests(Some(BloodType::APositive))
        .await
        .unwrap();
    assert_eq!(filtered, vec![a_positive.clone()]);

    let all = donor.workflow.fetch_available_requests(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let cached: Vec<RequestId> = donor
        .workflow
        .cached_requests()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(cached, vec![a_positive.id, o_negative.id]);
}

#[tokio::test]
async fn should_list_responded_requests_as_donor_history() {
    let backend = backend().await;
    let (_recipient, request) = recipient_with_request(&backend).await;
    let donor = donor(&backend, "ram@example.com").await;
    assert!(donor.workflow.fetch_own_requests().await.unwrap().is_empty());

    donor.workflow.fetch_available_requests(None).await.unwrap();
    donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap();

    let history = donor.workflow.fetch_own_requests().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, request.id);
}

#[tokio::test]
async fn should_return_not_found_for_unknown_request() {
    let backend = backend().await;
    let donor = donor(&backend, "ram@example.com").await;

    let err = donor
        .workflow
        .fetch_request(&RequestId::from("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NotFound));
}

#[tokio::test]
async fn should_reject_completion_before_any_donor_responds() {
    let backend = backend().await;
    let (recipient, request) = recipient_with_request(&backend).await;

    let err = recipient.workflow.complete(&request.id).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidTransition(_)));
    assert_eq!(
        backend.request(&request.id).unwrap().status,
        RequestStatus::Active
    );
    assert_eq!(recipient.workflow.cached(&request.id).unwrap(), request);
}

#[tokio::test]
async fn should_forget_cached_requests_on_logout() {
    let backend = backend().await;
    let registration = fixtures::recipient("hospital@example.com");
    let (recipient, request) = recipient_with_request(&backend).await;
    assert_eq!(recipient.workflow.cached_requests().len(), 1);

    recipient.logout();

    assert!(recipient.session.profile().is_none());
    assert!(recipient.workflow.cached_requests().is_empty());
    assert!(recipient.workflow.cached(&request.id).is_none());

    // Signing back in starts from an empty cache.
    recipient
        .sign_in(&registration.email, &registration.password)
        .await
        .unwrap();
    assert!(recipient.workflow.cached_requests().is_empty());
}

#[tokio::test]
async fn should_roll_back_and_sign_out_when_mutation_is_unauthorized() {
    let backend = backend().await;
    let (_recipient, request) = recipient_with_request(&backend).await;
    let donor = donor(&backend, "ram@example.com").await;
    donor.workflow.fetch_available_requests(None).await.unwrap();
    let donor_id = donor.identity.current().unwrap().id;

    backend.revoke(&donor_id);
    let err = donor
        .workflow
        .respond(&request.id, "Available today")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert!(err.is_auth());
    assert_eq!(donor.session.state(), SessionState::SignedOut);
    assert!(donor.identity.current().is_none());
    // Neither the optimistic copy nor the rolled-back one outlives the session.
    assert!(donor.workflow.cached(&request.id).is_none());
    let stored = backend.request(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Active);
    assert!(stored.responses.is_empty());
}
