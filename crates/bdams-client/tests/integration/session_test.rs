use std::time::Duration;

use bdams_client::ClientError;
use bdams_client::session::{LoadFailure, SessionState};
use bdams_domain::user::{BloodType, ProfileUpdate};
use bdams_testing::fixtures;

use crate::helpers::{backend, client, client_with_timeout, signed_in};

#[tokio::test]
async fn should_publish_loading_then_ready() {
    let backend = backend().await;
    let registration = fixtures::recipient("hospital@example.com");
    let profile = backend.register(&registration).unwrap();
    backend.delay_profile(&profile.id, Duration::from_millis(200));
    let client = client(&backend);
    let mut states = client.session.subscribe();

    client
        .identity
        .sign_in(&registration.email, &registration.password)
        .await
        .unwrap();
    assert!(matches!(
        client.session.state(),
        SessionState::ProfileLoading { .. }
    ));
    assert!(matches!(
        client.session.require_profile(),
        Err(ClientError::ProfileLoading)
    ));

    let ready = client.session.wait_ready().await.unwrap();
    assert_eq!(ready, profile);
    states.changed().await.unwrap();
    assert_eq!(states.borrow().profile(), Some(&profile));
}

#[tokio::test]
async fn should_fail_with_timeout_when_profile_is_slow() {
    let backend = backend().await;
    let registration = fixtures::recipient("slow@example.com");
    let profile = backend.register(&registration).unwrap();
    backend.delay_profile(&profile.id, Duration::from_secs(5));
    let client = client_with_timeout(&backend, Duration::from_millis(100));

    let err = client
        .sign_in(&registration.email, &registration.password)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ProfileLoadTimeout));
    match client.session.state() {
        SessionState::ProfileLoadFailed { identity, failure } => {
            assert_eq!(identity.id, profile.id);
            assert_eq!(failure, LoadFailure::Timeout);
        }
        other => panic!("expected load failure, got {other:?}"),
    }

    client.logout();
    assert_eq!(client.session.state(), SessionState::SignedOut);
    assert!(client.identity.current().is_none());
}

#[tokio::test]
async fn should_report_missing_profile_as_load_failure() {
    let backend = backend().await;
    backend.accounts().create("ghost@example.com", fixtures::PASSWORD);
    let client = client(&backend);

    let err = client
        .sign_in("ghost@example.com", fixtures::PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ProfileLoadFailed(_)));
    match client.session.state() {
        SessionState::ProfileLoadFailed {
            failure: LoadFailure::Error { kind, .. },
            ..
        } => assert_eq!(kind, "NOT_FOUND"),
        other => panic!("expected load failure, got {other:?}"),
    }
}

#[tokio::test]
async fn should_clear_profile_on_sign_out_while_fetch_is_pending() {
    let backend = backend().await;
    let registration = fixtures::recipient("hospital@example.com");
    let profile = backend.register(&registration).unwrap();
    backend.delay_profile(&profile.id, Duration::from_millis(300));
    let client = client(&backend);

    client
        .identity
        .sign_in(&registration.email, &registration.password)
        .await
        .unwrap();
    let mut states = client.session.subscribe();
    client.logout();

    assert_eq!(client.session.state(), SessionState::SignedOut);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::SignedOut);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.session.state(), SessionState::SignedOut);
    assert!(client.session.profile().is_none());
}

#[tokio::test]
async fn should_discard_fetch_for_superseded_identity() {
    let backend = backend().await;
    let first = fixtures::recipient("first@example.com");
    let second = fixtures::donor("second@example.com", BloodType::BPositive);
    let first_profile = backend.register(&first).unwrap();
    let second_profile = backend.register(&second).unwrap();
    backend.delay_profile(&first_profile.id, Duration::from_millis(300));
    let client = client(&backend);

    client
        .identity
        .sign_in(&first.email, &first.password)
        .await
        .unwrap();
    let ready = client.sign_in(&second.email, &second.password).await.unwrap();
    assert_eq!(ready, second_profile);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.session.profile(), Some(second_profile));
}

#[tokio::test]
async fn should_force_logout_when_backend_rejects_token() {
    let backend = backend().await;
    let (client, profile) = signed_in(
        &backend,
        &fixtures::donor("ram@example.com", BloodType::ONegative),
    )
    .await;

    backend.revoke(&profile.id);
    let err = client
        .workflow
        .fetch_available_requests(None)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert_eq!(client.session.state(), SessionState::SignedOut);
    assert!(client.identity.current().is_none());
}

#[tokio::test]
async fn should_force_logout_when_provider_refuses_token() {
    let backend = backend().await;
    let (client, profile) = signed_in(&backend, &fixtures::recipient("gone@example.com")).await;

    backend.accounts().remove(&profile.id);
    let err = client.workflow.fetch_own_requests().await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert_eq!(client.session.state(), SessionState::SignedOut);
}

#[tokio::test]
async fn should_update_profile_and_keep_role() {
    let backend = backend().await;
    let (client, profile) = signed_in(
        &backend,
        &fixtures::donor("ram@example.com", BloodType::ONegative),
    )
    .await;

    let updated = client
        .session
        .update_profile(&ProfileUpdate {
            name: Some("Ram Bahadur".to_owned()),
            phone: Some("+977-9811111111".to_owned()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.name, "Ram Bahadur");
    assert_eq!(updated.phone.as_deref(), Some("+977-9811111111"));
    assert_eq!(updated.role, profile.role);
    assert_eq!(client.session.profile(), Some(updated.clone()));
    assert_eq!(client.session.refresh_profile().await.unwrap(), updated);
}

#[tokio::test]
async fn should_require_ready_session_for_profile_operations() {
    let backend = backend().await;
    let client = client(&backend);

    let err = client.session.refresh_profile().await.unwrap_err();
    assert!(matches!(err, ClientError::NotSignedIn));

    let err = client.workflow.fetch_own_requests().await.unwrap_err();
    assert!(matches!(err, ClientError::NotSignedIn));
}
