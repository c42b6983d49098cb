use bdams_client::ClientError;
use bdams_client::session::SessionState;
use bdams_domain::policy::Action;
use bdams_domain::user::{BloodType, Role};
use bdams_testing::fixtures;

use crate::helpers::{backend, client, signed_in};

#[tokio::test]
async fn should_register_profile_then_sign_in() {
    let backend = backend().await;
    let client = client(&backend);

    let profile = client
        .sign_up(&fixtures::donor("ram@example.com", BloodType::ONegative))
        .await
        .unwrap();

    assert_eq!(profile.role, Role::Donor);
    assert_eq!(profile.blood_type, Some(BloodType::ONegative));
    let identity = client.identity.current().unwrap();
    assert_eq!(identity.id, profile.id);
    assert!(matches!(client.session.state(), SessionState::Ready { .. }));
}

#[tokio::test]
async fn should_not_create_session_when_registration_is_rejected() {
    let backend = backend().await;
    let client = client(&backend);
    let mut registration = fixtures::recipient("short@example.com");
    registration.password = "123".to_owned();

    let err = client.sign_up(&registration).await.unwrap_err();

    match err {
        ClientError::Validation { fields, .. } => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "password");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(client.identity.current().is_none());
    assert_eq!(client.session.state(), SessionState::SignedOut);
}

#[tokio::test]
async fn should_reject_duplicate_registration() {
    let backend = backend().await;
    let client = client(&backend);
    let registration = fixtures::recipient("dup@example.com");
    backend.register(&registration).unwrap();

    let err = client.sign_up(&registration).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation { .. }));
    assert!(client.identity.current().is_none());
}

#[tokio::test]
async fn should_reject_wrong_password() {
    let backend = backend().await;
    let registration = fixtures::recipient("hospital@example.com");
    backend.register(&registration).unwrap();
    let client = client(&backend);

    let err = client
        .sign_in(&registration.email, "not-the-password")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidCredentials));
    assert_eq!(client.session.state(), SessionState::SignedOut);
}

#[tokio::test]
async fn should_fetch_a_fresh_token_for_every_call() {
    let backend = backend().await;
    let (client, _) = signed_in(&backend, &fixtures::recipient("hospital@example.com")).await;
    let before = client.identity.provider().tokens_issued();

    client.workflow.fetch_own_requests().await.unwrap();
    client.workflow.fetch_own_requests().await.unwrap();

    assert_eq!(client.identity.provider().tokens_issued(), before + 2);
}

#[tokio::test]
async fn should_deny_by_role_before_touching_the_network() {
    let backend = backend().await;
    let (donor, _) = signed_in(
        &backend,
        &fixtures::donor("ram@example.com", BloodType::APositive),
    )
    .await;
    let (recipient, _) = signed_in(&backend, &fixtures::recipient("hospital@example.com")).await;
    let donor_tokens = donor.identity.provider().tokens_issued();

    let err = donor
        .workflow
        .create_request(&bdams_domain::request::NewBloodRequest {
            blood_type: BloodType::APositive,
            location: "Bir Hospital".to_owned(),
            urgency: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));

    let err = recipient
        .workflow
        .fetch_available_requests(None)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("forbidden: {} is not permitted", Action::ViewAllActiveRequests)
    );

    assert_eq!(donor.identity.provider().tokens_issued(), donor_tokens);
}
