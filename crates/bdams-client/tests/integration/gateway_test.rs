use std::sync::Arc;

use bdams_client::ClientError;
use bdams_client::ClientConfig;
use bdams_client::gateway::ApiGateway;
use bdams_client::identity::IdentityClient;
use bdams_client::session::SessionState;
use bdams_domain::user::ProfileUpdate;
use bdams_testing::{AccountDirectory, MockIdentityProvider, fixtures};

use crate::helpers::{backend, client, signed_in, unreachable_url};

#[tokio::test]
async fn should_report_network_error_when_backend_is_unreachable() {
    let config = ClientConfig::default().with_api_url(unreachable_url().await);
    let provider = MockIdentityProvider::new(AccountDirectory::new());
    let client = bdams_client::ClientState::new(&config, provider).unwrap();

    let err = client
        .sign_up(&fixtures::recipient("hospital@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Network(_)));
    assert!(err.is_retryable());
    assert!(client.identity.current().is_none());
}

#[tokio::test]
async fn should_call_unauthenticated_when_signed_out() {
    let backend = backend().await;
    let client = client(&backend);

    let err = client.gateway.fetch_profile().await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert_eq!(client.identity.provider().tokens_issued(), 0);
    assert_eq!(client.session.state(), SessionState::SignedOut);
}

#[tokio::test]
async fn should_surface_backend_field_errors() {
    let backend = backend().await;
    let (client, _) = signed_in(&backend, &fixtures::recipient("hospital@example.com")).await;

    let err = client
        .gateway
        .update_profile(&ProfileUpdate {
            name: Some(" ".to_owned()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap_err();

    match err {
        ClientError::Validation { fields, .. } => assert_eq!(fields[0].field, "name"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn should_decode_wrapped_registration_response() {
    let backend = backend().await;
    let identity = Arc::new(IdentityClient::new(backend.provider()));
    let config = ClientConfig::default().with_api_url(backend.base_url());
    let gateway = ApiGateway::new(&config, identity).unwrap();

    let profile = gateway
        .register(&fixtures::recipient("hospital@example.com"))
        .await
        .unwrap();

    assert_eq!(profile.email, "hospital@example.com");
    assert!(backend.accounts().find(&profile.id).is_some());
}
