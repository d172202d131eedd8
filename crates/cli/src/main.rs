//! Studyforge CLI - Database migrations and account maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! sf-cli migrate
//!
//! # Create a super admin (password read from stdin)
//! sf-cli admin create -u root -e root@example.com -n "Root Admin" --super-admin
//!
//! # Clear an admin lockout
//! sf-cli admin unlock -u root
//!
//! # Mark learners verified
//! sf-cli learner verify --all
//!
//! # Delete expired admin sessions
//! sf-cli sessions purge
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(author, version, about = "Studyforge CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage learners
    Learner {
        #[command(subcommand)]
        action: LearnerAction,
    },
    /// Manage admin sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin user
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short = 'n', long, default_value = "")]
        full_name: String,

        /// Grant every permission
        #[arg(long)]
        super_admin: bool,

        /// Read the password from this environment variable instead of stdin
        #[arg(long)]
        password_env: Option<String>,
    },
    /// Clear an admin's lockout and failure counter
    Unlock {
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Subcommand)]
enum LearnerAction {
    /// Mark learners verified and active
    Verify {
        #[arg(short, long, conflicts_with_all = ["email", "all"])]
        username: Option<String>,

        #[arg(short, long, conflicts_with = "all")]
        email: Option<String>,

        /// Every learner with a pending ticket
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// Delete admin sessions past their absolute expiry
    Purge,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                username,
                email,
                full_name,
                super_admin,
                password_env,
            } => {
                let password = commands::admin::read_password(password_env.as_deref())?;
                commands::admin::create_user(&username, &email, &full_name, super_admin, &password)
                    .await?;
            }
            AdminAction::Unlock { username } => commands::admin::unlock(&username).await?,
        },
        Commands::Learner { action } => match action {
            LearnerAction::Verify {
                username,
                email,
                all,
            } => {
                let target = match (username, email, all) {
                    (Some(username), _, _) => commands::learner::Target::Username(username),
                    (None, Some(email), _) => commands::learner::Target::Email(email),
                    (None, None, true) => commands::learner::Target::All,
                    (None, None, false) => {
                        return Err("pass --username, --email or --all".into());
                    }
                };
                commands::learner::verify(target).await?;
            }
        },
        Commands::Sessions { action } => match action {
            SessionsAction::Purge => {
                commands::sessions::purge().await?;
            }
        },
    }
    Ok(())
}
