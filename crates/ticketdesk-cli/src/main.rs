//! ticketdesk - command-line console for the ticketdesk support backend.
//!
//! Signs in against the REST backend, keeps the session in the cookie jar
//! and OS keychain, and lists or edits tickets, attachments and incident
//! reports for the signed-in tenant.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticketdesk_core::api::Upload;
use ticketdesk_core::models::{IncidentStatus, IncidentUpdate, NewTicket, Priority, TicketStatus};
use ticketdesk_core::{Config, Desk, GuardAction, SessionState};

/// Directory for daily rolling log files; unset logs to stderr only
const ENV_LOG_DIR: &str = "TICKETDESK_LOG_DIR";

const USAGE: &str = "\
Usage: ticketdesk [--json] <command> [args]

Commands:
  login [email]                 Sign in (password is prompted)
  logout                        Sign out and forget stored credentials
  whoami                        Show the signed-in user
  tickets [status]              List tickets, optionally by status
  ticket <id>                   Show one ticket
  create <title> [priority]     Create a ticket (description read from stdin)
  assign <id> [user-id]         Assign a ticket, or unassign without a user
  attach <ticket-id> <file>     Upload an attachment
  attachments <ticket-id>       List attachments of a ticket
  engineers                     List users tickets can be assigned to
  incidents                     List vendor incident reports
  resolve <incident-id>         Mark an incident report resolved
  guard <path>                  Show the route decision for a path";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "ticketdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json = match args.iter().position(|a| a == "--json") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };
    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    let mut config = Config::load()?;
    let store = Arc::new(config.credential_store()?);
    let desk = config.desk(store.clone())?;

    if command == "guard" {
        let path = arg(rest, 0, "path")?;
        let action = config.guard.decide(path, store.has_request_visible_access());
        match action {
            GuardAction::Allow => println!("allow {}", path),
            GuardAction::Redirect(to) => println!("redirect {} -> {}", path, to),
        }
        return Ok(());
    }

    let state = desk.session().boot().await;
    info!(command = %command, authenticated = matches!(state, SessionState::Authenticated(_)), "ticketdesk starting");

    match command.as_str() {
        "login" => login(&desk, &mut config, rest.first().map(String::as_str)).await,
        "logout" => {
            desk.sign_out();
            println!("Signed out.");
            Ok(())
        }
        "whoami" => match desk.session().user() {
            Some(user) if json => print_json(&user),
            Some(user) => {
                println!("{} <{}> ({})", user.display_name(), user.email, user.role);
                if let Some(claims) = desk.session().claims() {
                    println!("Tenant: {}", claims.company_id);
                }
                Ok(())
            }
            None => bail!("Not signed in. Run `ticketdesk login`."),
        },
        other => {
            let tenant = tenant(&desk, &config)?;
            run_resource_command(&desk, &tenant, other, rest, json).await
        }
    }
}

async fn run_resource_command(desk: &Desk, tenant: &str, command: &str, rest: &[String], json: bool) -> Result<()> {
    match command {
        "tickets" => {
            let status: Option<TicketStatus> = rest.first().map(|s| parse_wire(s, "status")).transpose()?;
            let tickets = desk.tickets(tenant, status).await?;
            if json {
                return print_json(&tickets);
            }
            if tickets.is_empty() {
                println!("No tickets.");
            }
            for t in tickets {
                println!(
                    "{:<12} {:<12} {:<8} {}{}",
                    t.id,
                    t.status,
                    t.priority,
                    t.title,
                    if t.is_assigned() { "" } else { "  (unassigned)" }
                );
            }
            Ok(())
        }
        "ticket" => {
            let ticket = desk.ticket(tenant, arg(rest, 0, "ticket id")?).await?;
            if json {
                return print_json(&ticket);
            }
            println!("{}  {}", ticket.id, ticket.title);
            println!("Status:   {}", ticket.status);
            println!("Priority: {}", ticket.priority);
            println!("Assignee: {}", ticket.assignee_id.as_deref().unwrap_or("-"));
            println!("Updated:  {}", ticket.updated_at.format("%Y-%m-%d %H:%M"));
            if !ticket.description.is_empty() {
                println!("\n{}", ticket.description);
            }
            Ok(())
        }
        "create" => {
            let title = arg(rest, 0, "title")?.to_string();
            let priority: Priority = match rest.get(1) {
                Some(p) => parse_wire(p, "priority")?,
                None => Priority::Medium,
            };
            let description = io::read_to_string(io::stdin()).context("Failed to read description")?;
            let ticket = desk
                .create_ticket(
                    tenant,
                    &NewTicket {
                        title,
                        description: description.trim().to_string(),
                        priority,
                    },
                )
                .await?;
            println!("Created ticket {}.", ticket.id);
            Ok(())
        }
        "assign" => {
            let id = arg(rest, 0, "ticket id")?;
            let ticket = desk.assign_ticket(tenant, id, rest.get(1).map(String::as_str)).await?;
            match ticket.assignee_id {
                Some(assignee) => println!("Ticket {} assigned to {}.", ticket.id, assignee),
                None => println!("Ticket {} unassigned.", ticket.id),
            }
            Ok(())
        }
        "attach" => {
            let ticket_id = arg(rest, 0, "ticket id")?;
            let path = Path::new(arg(rest, 1, "file")?);
            let upload = Upload {
                filename: path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?
                    .to_string(),
                content_type: content_type(path).to_string(),
                bytes: std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
            };
            let attachment = desk.upload_attachment(tenant, ticket_id, &upload).await?;
            println!("Uploaded {} ({}).", attachment.filename, attachment.size_display());
            Ok(())
        }
        "attachments" => {
            let attachments = desk.attachments(tenant, arg(rest, 0, "ticket id")?).await?;
            if json {
                return print_json(&attachments);
            }
            for a in attachments {
                println!("{:<12} {:>10}  {}", a.id, a.size_display(), a.filename);
            }
            Ok(())
        }
        "engineers" => {
            let engineers = desk.engineers(tenant).await?;
            if json {
                return print_json(&engineers);
            }
            for user in engineers {
                println!("{:<12} {} <{}>", user.id, user.display_name(), user.email);
            }
            Ok(())
        }
        "incidents" => {
            let incidents = desk.incidents(tenant).await?;
            if json {
                return print_json(&incidents);
            }
            for i in incidents {
                println!("{:<12} {:<10} {:<10} {}: {}", i.id, i.severity, i.status, i.vendor, i.title);
            }
            Ok(())
        }
        "resolve" => {
            let update = IncidentUpdate {
                status: Some(IncidentStatus::Resolved),
                ..Default::default()
            };
            let report = desk.update_incident(tenant, arg(rest, 0, "incident id")?, &update).await?;
            println!("Incident {} is now {}.", report.id, report.status);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

/// Interactive login
async fn login(desk: &Desk, config: &mut Config, email: Option<&str>) -> Result<()> {
    let email = match email {
        Some(email) => email.to_string(),
        None => prompt_email(config.last_email.as_deref())?,
    };
    if email.is_empty() {
        bail!("Email required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    println!("Authenticating...");
    let user = desk.session().login(&email, &password).await?;

    config.last_email = Some(email);
    if config.default_tenant.is_none() {
        config.default_tenant = user.company_id.clone();
    }
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {}.", user.display_name());
    Ok(())
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    Ok(match (input.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

/// Tenant from config, else from the signed-in credential
fn tenant(desk: &Desk, config: &Config) -> Result<String> {
    if let Some(ref tenant) = config.default_tenant {
        return Ok(tenant.clone());
    }
    desk.session()
        .claims()
        .map(|c| c.company_id)
        .or_else(|| desk.session().user().and_then(|u| u.company_id))
        .ok_or_else(|| anyhow!("Not signed in. Run `ticketdesk login`."))
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument: {}\n\n{}", name, USAGE))
}

/// Parse a snake_case wire value such as `in_progress`
fn parse_wire<T: DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| anyhow!("Unknown {}: {}", what, value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn content_type(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
}
