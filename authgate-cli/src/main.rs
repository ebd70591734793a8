//! AuthGate command-line client

mod cli;

use anyhow::{anyhow, bail, Context, Result};
use authgate_core::auth::{LoginRequest, RegisterRequest, SignupRequest};
use authgate_core::locale::system_language;
use authgate_core::utils::authgate_data_dir;
use authgate_core::{
    load_settings, rotate_log_if_needed, AuthError, AuthGate, AuthState, Locale, LocaleContext,
    LoggingNavigator, UserProfile,
};
use clap::Parser;
use cli::{Cli, Commands};
use log::{error, info, warn};
use std::io::BufRead;
use std::sync::Arc;

fn init_logging() {
    let log_dir = authgate_data_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file_path = log_dir.join("authgate.log");

    if let Err(e) = rotate_log_if_needed(&log_file_path) {
        eprintln!("Failed to rotate log file: {}", e);
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|_| log::LevelFilter::Debug)
        .unwrap_or(log::LevelFilter::Info);

    if let Ok(log_file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
    {
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .init();
    } else {
        // Fallback to stderr if file logging fails
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_millis()
            .init();
    }

    info!("Starting AuthGate v{}", env!("CARGO_PKG_VERSION"));
    info!("Log file: {}", log_file_path.display());
}

fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

/// Prefer the service's own message over our error wrapper
fn service_error(e: AuthError) -> anyhow::Error {
    anyhow!(e.server_message().unwrap_or_else(|| e.to_string()))
}

fn print_profile(profile: &UserProfile, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
        return Ok(());
    }
    println!("{} <{}>", profile.display_name(), profile.email);
    if let Some(roles) = &profile.roles {
        let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
        println!("roles: {}", roles.join(", "));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings();
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    if cli.ephemeral {
        settings.persist = false;
    }

    let gate = AuthGate::from_settings(settings, Arc::new(LoggingNavigator))
        .context("Failed to set up the session layer")?;
    let controller = gate.controller();

    // Locale commands never need a session
    if !matches!(cli.command, Commands::Locale { .. }) {
        if let Err(e) = controller.hydrate().await {
            warn!("Startup hydration failed: {}", e);
        }
    }

    match cli.command {
        Commands::Status => {
            let state = controller.state();
            if cli.json {
                let value = serde_json::json!({
                    "state": state.label(),
                    "user": state.profile(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                match &state {
                    AuthState::Authenticated(profile) => {
                        println!("authenticated as {}", profile.display_name())
                    }
                    other => println!("{}", other.label()),
                }
            }
        }
        Commands::Login { email, password } => {
            let password = read_password(password)?;
            let profile = gate
                .actions()
                .login(&LoginRequest { email, password })
                .await
                .map_err(service_error)?;
            print_profile(&profile, cli.json)?;
        }
        Commands::Signup {
            name,
            email,
            password,
        } => {
            let password = read_password(password)?;
            let profile = gate
                .actions()
                .signup(&SignupRequest {
                    name,
                    email,
                    password,
                })
                .await
                .map_err(service_error)?;
            print_profile(&profile, cli.json)?;
        }
        Commands::Register {
            name,
            email,
            password,
        } => {
            let password = read_password(password)?;
            let profile = gate
                .actions()
                .register(&RegisterRequest {
                    name,
                    email,
                    password,
                })
                .await
                .map_err(service_error)?;
            print_profile(&profile, cli.json)?;
        }
        Commands::Whoami { refresh } => {
            let profile = if refresh {
                Some(controller.fetch_user_data().await?)
            } else {
                controller.require_authenticated().await
            };
            match profile {
                Some(profile) => print_profile(&profile, cli.json)?,
                None => bail!("Not signed in"),
            }
        }
        Commands::Logout => {
            controller.logout();
            println!("signed out");
        }
        Commands::OauthUrl => {
            let url = gate.actions().begin_oauth_redirect().await?;
            println!("{}", url);
        }
        Commands::OauthComplete => {
            if !gate.actions().complete_oauth_redirect().await {
                bail!("No session was established");
            }
            if let Some(profile) = controller.user() {
                print_profile(&profile, cli.json)?;
            }
        }
        Commands::HasRole { role } => {
            if !controller.has_role(&role) {
                bail!("Current user does not hold role {}", role);
            }
            println!("yes");
        }
        Commands::Locale { set } => {
            let language = system_language();
            let locale = LocaleContext::initialize(gate.store().local_tier(), language.as_deref());
            if let Some(code) = set {
                let wanted: Locale = code.parse()?;
                locale.change_language(wanted)?;
            }
            println!("{}", locale.locale());
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli).await {
        error!("Command failed: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
