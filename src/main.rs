//! Bookshelf CLI - sign in to the Bookshelf service and inspect the session.
//!
//! Commands:
//!   bookshelf login [email]      sign in (password is prompted)
//!   bookshelf register           create an account and sign in
//!   bookshelf whoami             show the signed-in user (refreshing if needed)
//!   bookshelf status             show local session state without network
//!   bookshelf get <path>         authenticated GET, prints the JSON response
//!   bookshelf logout             sign out

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookshelf_client::api::ApiRequest;
use bookshelf_client::{AuthEvent, AuthService, Config, GuardDecision, RouteGuard};

/// Log file name in the cache directory
const LOG_FILE: &str = "bookshelf.log";

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must live until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
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

    let mut config = Config::load()?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };

    let service = AuthService::from_config(&config)?;
    info!(command, backend = service.store().backend_name(), "Bookshelf CLI starting");

    // Report forced sign-outs that happen while a command runs
    let mut events = service.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let AuthEvent::LoginRequired { redirect_to } = event {
                eprintln!("Session expired. Sign in again ({}).", redirect_to);
            }
        }
    });

    let result = match command {
        "login" => login(&service, &mut config, args.get(1).cloned()).await,
        "register" => register(&service, &mut config).await,
        "whoami" => whoami(&service).await,
        "status" => status(&service, &config),
        "get" => match args.get(1) {
            Some(path) => get(&service, &config, path).await,
            None => Err(anyhow::anyhow!("Usage: bookshelf get <path>")),
        },
        "logout" => {
            service.logout().await;
            println!("Signed out.");
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow::anyhow!("Unknown command '{}'", other)),
    };

    watcher.abort();
    result
}

fn print_usage() {
    eprintln!("Usage: bookshelf <login [email]|register|whoami|status|get <path>|logout>");
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn prompt_password() -> Result<String> {
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

async fn login(service: &AuthService, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = prompt_password()?;

    let user = service.login(&email, &password).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
    println!("Welcome back, {}!", user.display_name());
    Ok(())
}

async fn register(service: &AuthService, config: &mut Config) -> Result<()> {
    let name = prompt("Name")?;
    let email = prompt("Email")?;
    let password = prompt_password()?;
    let confirm =
        rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let user = service.register(&name, &email, &password).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
    println!("Account created. Welcome, {}!", user.display_name());
    Ok(())
}

async fn whoami(service: &AuthService) -> Result<()> {
    let state = service.hydrate().await;
    match state.user {
        Some(user) if state.is_authenticated => {
            println!("{} <{}>", user.display_name(), user.email);
            Ok(())
        }
        _ => bail!("Not signed in. Run `bookshelf login`."),
    }
}

fn status(service: &AuthService, config: &Config) -> Result<()> {
    let session = service.store().snapshot();
    println!("API:            {}", config.api_base_url);
    println!("Storage:        {}", service.store().backend_name());
    println!("Access token:   {}", presence(&session.access_token));
    println!("Refresh token:  {}", presence(&session.refresh_token));
    match session.user {
        Some(user) => println!("User:           {} <{}>", user.display_name(), user.email),
        None => println!("User:           -"),
    }
    Ok(())
}

fn presence(token: &Option<String>) -> &'static str {
    if token.is_some() {
        "present"
    } else {
        "absent"
    }
}

async fn get(service: &AuthService, config: &Config, path: &str) -> Result<()> {
    // Same gate a front end applies before rendering a protected view
    let state = service.hydrate().await;
    let guard = RouteGuard::with_redirect(config.login_path.clone());
    if let GuardDecision::Redirect { to, from } = guard.evaluate_state(&state, path) {
        bail!("{} requires sign-in (redirect to {}?from={})", from, to, from);
    }

    let response = service.client().execute(ApiRequest::get(path)).await?;
    let status = response.status;
    let pretty = serde_json::from_str::<serde_json::Value>(&response.body)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(response.body);
    println!("{}", pretty);
    if !status.is_success() {
        bail!("Request failed with status {}", status);
    }
    Ok(())
}
