use std::time::Duration;

use bdams_client::{ClientConfig, ClientState};
use bdams_domain::user::{Profile, Registration};
use bdams_testing::{MockBackend, MockIdentityProvider};

pub type Client = ClientState<MockIdentityProvider>;

pub async fn backend() -> MockBackend {
    MockBackend::spawn().await.expect("bind mock backend")
}

pub fn client(backend: &MockBackend) -> Client {
    client_with_timeout(backend, Duration::from_secs(10))
}

pub fn client_with_timeout(backend: &MockBackend, timeout: Duration) -> Client {
    let config = ClientConfig::default()
        .with_api_url(backend.base_url())
        .with_profile_load_timeout(timeout);
    ClientState::new(&config, backend.provider()).expect("build client")
}

/// Seed `registration` on the backend and return a client signed in as it.
pub async fn signed_in(backend: &MockBackend, registration: &Registration) -> (Client, Profile) {
    backend.register(registration).expect("seed account");
    let client = client(backend);
    let profile = client
        .sign_in(&registration.email, &registration.password)
        .await
        .expect("sign in");
    (client, profile)
}

/// A base URL nothing is listening on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}
