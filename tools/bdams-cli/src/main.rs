//! `bdams`: drive the BDAMS client core from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Create a donor account (signs in afterwards)
//! bdams --email ram@example.com --password hunter22 \
//!     register --name Ram --role donor --blood-type O-
//!
//! # Browse and answer open requests
//! bdams requests available --blood-type O-
//! bdams requests respond <id> --message "Available today"
//! ```
//!
//! Credentials may also come from `BDAMS_EMAIL` / `BDAMS_PASSWORD`, and the
//! Firebase key from `FIREBASE_API_KEY` (a `.env` file is honoured).
//! Results are printed as JSON. Exits 1 on any error.

use std::process::ExitCode;

use bdams_client::ClientError;
use bdams_domain::id::RequestId;
use bdams_domain::request::Urgency;
use bdams_domain::user::{BloodType, Role};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bdams", about = "Blood donation requests from the command line")]
struct Args {
    /// Account email
    #[arg(long, env = "BDAMS_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "BDAMS_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account with its profile, then sign in
    Register {
        #[arg(long)]
        name: String,
        /// donor or recipient
        #[arg(long)]
        role: Role,
        /// Required for donors, e.g. O-
        #[arg(long)]
        blood_type: Option<BloodType>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Show or edit the signed-in profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Blood requests
    #[command(subcommand)]
    Requests(RequestsCommand),
    /// Print the role/action access table
    Policy,
}

#[derive(Subcommand)]
enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        blood_type: Option<BloodType>,
        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Subcommand)]
enum RequestsCommand {
    /// Active requests (donors only)
    Available {
        #[arg(long)]
        blood_type: Option<BloodType>,
    },
    /// Requests created by, or responded to by, the signed-in user
    Mine,
    Show {
        id: RequestId,
    },
    /// Post a new request (recipients only)
    Create {
        #[arg(long)]
        blood_type: BloodType,
        #[arg(long)]
        location: String,
        #[arg(long, default_value_t = Urgency::Medium)]
        urgency: Urgency,
    },
    Respond {
        id: RequestId,
        #[arg(long)]
        message: String,
    },
    Complete {
        id: RequestId,
    },
    Cancel {
        id: RequestId,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    bdams_core::tracing::init_tracing();

    let args = Args::parse();
    match commands::run(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    let Some(client_err) = err.downcast_ref::<ClientError>() else {
        eprintln!("error: {err:#}");
        return;
    };
    eprintln!("error [{}]: {client_err}", client_err.kind());
    if let ClientError::Validation { fields, .. } = client_err {
        for field in fields {
            eprintln!("  {}: {}", field.field, field.message);
        }
    }
}
