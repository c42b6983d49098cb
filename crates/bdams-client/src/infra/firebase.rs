//! Firebase Authentication over its REST API.

use serde::{Deserialize, Serialize};
use tracing::debug;

use bdams_core::config::{ConfigError, process_env, required};
use bdams_domain::id::UserId;

use crate::domain::provider::IdentityProvider;
use crate::domain::types::{Credential, Identity};
use crate::error::ClientError;

const IDENTITY_TOOLKIT: &str = "identitytoolkit.googleapis.com";
const SECURE_TOKEN: &str = "securetoken.googleapis.com";

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key. Env var: `FIREBASE_API_KEY`.
    pub api_key: String,
    /// `host:port` of the Auth emulator. Env var: `FIREBASE_AUTH_EMULATOR_HOST`.
    pub emulator_host: Option<String>,
}

impl FirebaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<L>(lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_key: required(lookup, "FIREBASE_API_KEY")?,
            emulator_host: lookup("FIREBASE_AUTH_EMULATOR_HOST"),
        })
    }

    fn endpoint(&self, service: &str, path: &str) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{host}/{service}/{path}?key={}", self.api_key),
            None => format!("https://{service}/{path}?key={}", self.api_key),
        }
    }

    fn sign_in_url(&self) -> String {
        self.endpoint(IDENTITY_TOOLKIT, "v1/accounts:signInWithPassword")
    }

    fn refresh_url(&self) -> String {
        self.endpoint(SECURE_TOKEN, "v1/token")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInBody<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    refresh_token: String,
}

#[derive(Serialize)]
struct RefreshForm<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct FirebaseErrorBody {
    error: FirebaseErrorDetail,
}

#[derive(Deserialize)]
struct FirebaseErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    config: FirebaseConfig,
}

impl FirebaseIdentityProvider {
    pub fn new(config: FirebaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, ClientError> {
        let response = self
            .http
            .post(self.config.sign_in_url())
            .json(&SignInBody {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(ClientError::Network)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::Network)?;
        if !status.is_success() {
            return Err(classify(status.as_u16(), &bytes));
        }

        let body: SignInResponse = serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
        let id = body
            .local_id
            .parse::<UserId>()
            .map_err(|e| ClientError::Internal(anyhow::anyhow!("provider returned {e}")))?;
        debug!(user_id = %id, "firebase sign-in succeeded");
        Ok(Credential {
            identity: Identity {
                id,
                email: body.email,
                display_name: body.display_name.filter(|n| !n.is_empty()),
            },
            refresh_token: body.refresh_token,
        })
    }

    async fn fetch_token(&self, credential: &Credential) -> Result<String, ClientError> {
        let form = serde_qs::to_string(&RefreshForm {
            grant_type: "refresh_token",
            refresh_token: &credential.refresh_token,
        })
        .map_err(|e| ClientError::Internal(anyhow::anyhow!("encode refresh form: {e}")))?;

        let response = self
            .http
            .post(self.config.refresh_url())
            .header(
                http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form)
            .send()
            .await
            .map_err(ClientError::Network)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::Network)?;
        if !status.is_success() {
            return Err(classify(status.as_u16(), &bytes));
        }

        let body: RefreshResponse = serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
        Ok(body.id_token)
    }
}

/// Map a Firebase error response. Messages look like `INVALID_PASSWORD` or
/// `TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account ...`.
fn classify(status: u16, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<FirebaseErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_default();
    let code = message
        .split(" : ")
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned();
    match code.as_str() {
        "EMAIL_NOT_FOUND"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "USER_DISABLED"
        | "INVALID_EMAIL"
        | "MISSING_PASSWORD" => ClientError::InvalidCredentials,
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => ClientError::Unauthorized,
        _ => ClientError::Server {
            status,
            message: if message.is_empty() {
                "identity provider error".to_owned()
            } else {
                message
            },
        },
    }
}
