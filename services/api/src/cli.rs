//! services/api/src/cli.rs
//!
//! `portal-admin`: admin tasks from the command line, run against the same
//! backend as the HTTP service.
//!
//! Each invocation owns one session context. It restores a stored session or
//! signs in, passes the admin gate, runs one command, then disposes the context.

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use warga_core::accounts::{AccountService, DEFAULT_PROFILE_WRITE_ATTEMPTS};
use warga_core::dues::DuesEngine;
use warga_core::session::SessionError;
use warga_core::stats::dashboard_stats;
use warga_core::{
    AuthorizationGate, Caller, DatabaseService, GateDecision, GateTier, IdentityProvider,
    InvoiceFilter, InvoiceStatus, ObjectStorage, PortalError, SessionContext,
};

/// WargaSepuluh admin CLI.
#[derive(Parser, Debug)]
#[command(name = "portal-admin", about = "WargaSepuluh portal administration")]
pub struct Cli {
    /// Admin account email.
    #[arg(long, env = "PORTAL_EMAIL", global = true)]
    pub email: Option<String>,

    /// Admin account password.
    #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// A session token to restore instead of signing in.
    #[arg(long, env = "PORTAL_SESSION_TOKEN", hide_env_values = true, global = true)]
    pub session_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// IPL invoice management.
    Invoices {
        #[command(subcommand)]
        action: InvoiceAction,
    },

    /// Resident management.
    Residents {
        #[command(subcommand)]
        action: ResidentAction,
    },

    /// Show the dashboard counts.
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum InvoiceAction {
    /// Bill every resident for one month.
    Create {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        /// Amount in rupiah.
        #[arg(long)]
        amount: i64,
    },

    /// List invoices, optionally for one month and/or year.
    List {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },

    /// Set an invoice's payment status (`lunas` or `belum_bayar`).
    Mark { id: Uuid, status: InvoiceStatus },
}

#[derive(Subcommand, Debug)]
pub enum ResidentAction {
    /// List all resident profiles.
    List,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("No session to restore; set PORTAL_EMAIL and PORTAL_PASSWORD")]
    MissingCredentials,
    #[error("This account may not use the admin CLI (redirect: {0})")]
    NotAuthorized(&'static str),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Portal(#[from] PortalError),
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The backend ports a CLI run works against.
#[derive(Clone)]
pub struct Backend {
    pub db: Arc<dyn DatabaseService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

/// Runs one command and writes its result as JSON to `out`.
pub async fn run<W: Write>(cli: Cli, backend: Backend, out: &mut W) -> Result<(), CliError> {
    let context = SessionContext::launch(backend.identity.clone(), cli.session_token.clone());
    let result = run_in_context(&context, &cli, &backend, out).await;
    context.dispose().await;
    result
}

async fn run_in_context<W: Write>(
    context: &SessionContext,
    cli: &Cli,
    backend: &Backend,
    out: &mut W,
) -> Result<(), CliError> {
    // 1. Restore the stored session, or sign in
    let restored = context.ready().await?;
    let opened_here = restored.session.is_none();
    if opened_here {
        let (Some(email), Some(password)) = (&cli.email, &cli.password) else {
            return Err(CliError::MissingCredentials);
        };
        context.sign_in(email, password).await?;
    }

    // 2. Pass the admin gate, then run the command
    let result = match admit_admin(context, &backend.db).await {
        Ok(caller) => execute(&cli.command, &caller, backend, out).await,
        Err(e) => Err(e),
    };

    // 3. End sessions this run opened; restored ones belong to someone else
    if opened_here {
        if let Err(e) = context.sign_out().await {
            warn!("Failed to sign out after command: {}", e);
        }
    }
    result
}

async fn admit_admin(context: &SessionContext, db: &Arc<dyn DatabaseService>) -> Result<Caller, CliError> {
    let gate = AuthorizationGate::new(db.clone());
    let outcome = gate
        .admit(&[GateTier::Resident, GateTier::Admin], &context.snapshot())
        .await;
    match (outcome.decision, outcome.caller) {
        (GateDecision::Allow, Some(caller)) => Ok(caller),
        (decision, _) => {
            if let Some(error) = outcome.lookup_error {
                warn!("Profile lookup failed: {}", error);
            }
            Err(CliError::NotAuthorized(
                decision.redirect_target().unwrap_or("/login"),
            ))
        }
    }
}

async fn execute<W: Write>(
    command: &Command,
    caller: &Caller,
    backend: &Backend,
    out: &mut W,
) -> Result<(), CliError> {
    let dues = DuesEngine::new(backend.db.clone(), backend.storage.clone());
    match command {
        Command::Invoices { action } => match action {
            InvoiceAction::Create { month, year, amount } => {
                let batch = dues
                    .create_monthly_invoices(caller, *month, *year, *amount)
                    .await?;
                info!(created = batch.created.len(), "Invoices created from CLI");
                emit(out, &batch)
            }
            InvoiceAction::List { month, year } => {
                let filter = InvoiceFilter {
                    month: *month,
                    year: *year,
                };
                emit(out, &dues.list_invoices(caller, filter).await?)
            }
            InvoiceAction::Mark { id, status } => {
                emit(out, &dues.set_payment_status(caller, *id, *status).await?)
            }
        },
        Command::Residents {
            action: ResidentAction::List,
        } => {
            let accounts = AccountService::new(
                backend.identity.clone(),
                backend.db.clone(),
                DEFAULT_PROFILE_WRITE_ATTEMPTS,
            );
            emit(out, &accounts.list_residents(caller).await?)
        }
        Command::Stats => emit(out, &dashboard_stats(&backend.db, caller).await?),
    }
}

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warga_core::memory::MemoryBackend;
    use warga_core::Role;

    fn backend(memory: &MemoryBackend) -> Backend {
        Backend {
            db: memory.db.clone(),
            identity: memory.identity.clone(),
            storage: memory.storage.clone(),
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["portal-admin"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[tokio::test]
    async fn admin_creates_invoices_for_every_resident() {
        let memory = MemoryBackend::new();
        memory.seed_resident("admin@warga.id", "rahasia123", "Siti", Role::Admin);
        memory.seed_resident("budi@warga.id", "rahasia123", "Budi", Role::User);

        let mut out = Vec::new();
        run(
            cli(&[
                "--email", "admin@warga.id", "--password", "rahasia123",
                "invoices", "create", "--month", "8", "--year", "2025", "--amount", "150000",
            ]),
            backend(&memory),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(memory.db.invoice_count(), 2);
        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["created"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn resident_is_turned_away() {
        let memory = MemoryBackend::new();
        memory.seed_resident("budi@warga.id", "rahasia123", "Budi", Role::User);

        let mut out = Vec::new();
        let result = run(
            cli(&["--email", "budi@warga.id", "--password", "rahasia123", "stats"]),
            backend(&memory),
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(CliError::NotAuthorized("/not-authorized"))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_without_a_stored_session() {
        let memory = MemoryBackend::new();
        let result = run(cli(&["residents", "list"]), backend(&memory), &mut Vec::new()).await;
        assert!(matches!(result, Err(CliError::MissingCredentials)));
    }

    #[tokio::test]
    async fn stored_session_is_restored_and_left_open() {
        let memory = MemoryBackend::new();
        memory.seed_resident("admin@warga.id", "rahasia123", "Siti", Role::Admin);
        let session = memory
            .identity
            .sign_in("admin@warga.id", "rahasia123")
            .await
            .unwrap();

        let mut out = Vec::new();
        run(
            cli(&["--session-token", &session.token, "residents", "list"]),
            backend(&memory),
            &mut out,
        )
        .await
        .unwrap();

        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed.as_array().unwrap().len(), 1);
        assert!(memory
            .identity
            .get_session(&session.token)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_a_session_error() {
        let memory = MemoryBackend::new();
        memory.seed_resident("admin@warga.id", "rahasia123", "Siti", Role::Admin);
        let result = run(
            cli(&["--email", "admin@warga.id", "--password", "salah", "stats"]),
            backend(&memory),
            &mut Vec::new(),
        )
        .await;
        assert!(matches!(result, Err(CliError::Session(_))));
    }
}
