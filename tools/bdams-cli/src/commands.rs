use anyhow::{Context, Result};
use bdams_client::infra::firebase::{FirebaseConfig, FirebaseIdentityProvider};
use bdams_client::{ClientConfig, ClientState};
use bdams_domain::policy::{AccessPolicy, Action};
use bdams_domain::request::NewBloodRequest;
use bdams_domain::user::{ProfileUpdate, Registration, Role};
use serde::Serialize;

use crate::{Args, Command, ProfileCommand, RequestsCommand};

type Client = ClientState<FirebaseIdentityProvider>;

struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    fn from_args(email: Option<String>, password: Option<String>) -> Result<Self> {
        Ok(Self {
            email: email.context("--email (or BDAMS_EMAIL) is required")?,
            password: password.context("--password (or BDAMS_PASSWORD) is required")?,
        })
    }
}

pub async fn run(args: Args) -> Result<String> {
    let Args {
        email,
        password,
        command,
    } = args;

    let output = match command {
        Command::Policy => return Ok(policy_table()),
        Command::Register {
            name,
            role,
            blood_type,
            phone,
        } => {
            let (client, credentials) = connect(email, password)?;
            let registration = Registration {
                email: credentials.email,
                password: credentials.password,
                name,
                role,
                blood_type,
                phone,
            };
            let profile = client.sign_up(&registration).await?;
            client.logout();
            pretty(&profile)?
        }
        Command::Profile(cmd) => {
            let (client, credentials) = connect(email, password)?;
            sign_in(&client, &credentials).await?;
            let output = profile(&client, cmd).await;
            client.logout();
            output?
        }
        Command::Requests(cmd) => {
            let (client, credentials) = connect(email, password)?;
            sign_in(&client, &credentials).await?;
            let output = requests(&client, cmd).await;
            client.logout();
            output?
        }
    };
    Ok(output)
}

/// Build a client from the environment and check both credentials are set.
fn connect(email: Option<String>, password: Option<String>) -> Result<(Client, Credentials)> {
    let config = ClientConfig::from_env()?;
    let provider = FirebaseIdentityProvider::new(FirebaseConfig::from_env()?);
    let client = ClientState::new(&config, provider)?;
    Ok((client, Credentials::from_args(email, password)?))
}

async fn sign_in(client: &Client, credentials: &Credentials) -> Result<()> {
    let profile = client
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    tracing::info!(user_id = %profile.id, role = %profile.role, "signed in");
    Ok(())
}

async fn profile(client: &Client, cmd: ProfileCommand) -> Result<String> {
    match cmd {
        ProfileCommand::Show => pretty(&client.session.require_profile()?),
        ProfileCommand::Update {
            name,
            blood_type,
            phone,
        } => {
            let update = ProfileUpdate {
                name,
                blood_type,
                phone,
            };
            pretty(&client.session.update_profile(&update).await?)
        }
    }
}

async fn requests(client: &Client, cmd: RequestsCommand) -> Result<String> {
    let workflow = &client.workflow;
    match cmd {
        RequestsCommand::Available { blood_type } => {
            pretty(&workflow.fetch_available_requests(blood_type).await?)
        }
        RequestsCommand::Mine => pretty(&workflow.fetch_own_requests().await?),
        RequestsCommand::Show { id } => pretty(&workflow.fetch_request(&id).await?),
        RequestsCommand::Create {
            blood_type,
            location,
            urgency,
        } => {
            let new = NewBloodRequest {
                blood_type,
                location,
                urgency,
            };
            pretty(&workflow.create_request(&new).await?)
        }
        RequestsCommand::Respond { id, message } => {
            pretty(&workflow.respond(&id, &message).await?)
        }
        RequestsCommand::Complete { id } => pretty(&workflow.complete(&id).await?),
        RequestsCommand::Cancel { id } => pretty(&workflow.cancel(&id).await?),
    }
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn policy_table() -> String {
    let mut out = format!("{:<26}", "action");
    for role in Role::ALL {
        out.push_str(&format!("{:<28}", role.as_str()));
    }
    for action in Action::ALL {
        out.push('\n');
        out.push_str(&format!("{:<26}", action.as_str()));
        for role in Role::ALL {
            let cell = AccessPolicy::requirement(role, action).to_string();
            out.push_str(&format!("{cell:<28}"));
        }
    }
    out.trim_end().to_owned()
}
