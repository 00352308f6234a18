//! APNS Manager CLI
//!
//! Keeps this device's push registration in sync with the remote registry:
//! - Stores the user ID, device token and display name locally
//! - Upserts the registration whenever the identity changes
//! - Shows the registration status

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio::time::timeout;

use apns_manager::cli::{Cli, Commands, Display};
use apns_manager::config::{SyncConfig, API_ROUTE_ENV};
use apns_manager::platform::handle_remote_notification;
use apns_manager::registry::HttpRegistry;
use apns_manager::store::PlistSettingsStore;
use apns_manager::sync::{RegistrationSynchronizer, SyncHandle};
use apns_manager::{ConfigError, PlatformError, RegistryError, SyncError};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&e.to_string());
        if let Some(suggestion) = suggestion_for(&e) {
            Display::show_suggestion(suggestion);
        }
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration, letting `--api-route` take precedence.
fn load_config<F>(api_route: Option<&str>, lookup: F) -> Result<SyncConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    SyncConfig::from_lookup(|key| match api_route {
        Some(route) if key == API_ROUTE_ENV => Some(route.to_string()),
        _ => lookup(key),
    })
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
            return Ok(());
        }
        Some(command) => command,
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    let config = load_config(cli.api_route.as_deref(), |key| std::env::var(key).ok())?;
    let settings_path = config.resolve_settings_path()?;
    let registry = Arc::new(HttpRegistry::from_config(&config)?);
    let store = PlistSettingsStore::new(&settings_path);

    let (synchronizer, handle) = RegistrationSynchronizer::new(&config, store, registry);
    #[cfg(target_os = "macos")]
    let synchronizer = synchronizer
        .with_push_registrar(Arc::new(apns_manager::platform::UserNotificationCenter::new()));
    let engine = tokio::spawn(synchronizer.run());

    apply(&command, &handle).await?;

    // Name fetch, upsert and admin refresh are each bounded by the request timeout.
    let limit = config.request_timeout() * 3;
    let idle = match timeout(limit, handle.wait_idle()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => return Err(e).context("同期処理の完了を待機できませんでした"),
        Err(_) => {
            Display::show_pending();
            false
        }
    };

    Display::show_status(&handle.state(), &settings_path);

    drop(handle);
    if idle {
        engine
            .await
            .context("同期エンジンの終了に失敗しました")?;
    }

    Ok(())
}

/// Sends the command to the synchronizer.
async fn apply(command: &Commands, handle: &SyncHandle) -> Result<()> {
    match command {
        Commands::Status | Commands::Completions { .. } => {}
        Commands::User { id } => {
            handle.set_user_id(id.as_str())?;
            Display::show_updated("ユーザーIDを更新しました");
        }
        Commands::Token { hex } => {
            handle.set_device_token(hex.as_str())?;
            Display::show_updated("デバイストークンを更新しました");
        }
        Commands::Name { name } => {
            handle.set_display_name(name.as_str())?;
            Display::show_updated("表示名を更新しました");
        }
        Commands::SignIn { revoke } => {
            handle.set_local_auth_confirmed(!revoke)?;
            if *revoke {
                Display::show_updated("サインインを取り消しました");
            } else {
                Display::show_updated("サインインを完了しました");
            }
        }
        Commands::Sync => {
            handle.sync_to_remote()?;
            Display::show_updated("リモートとの同期を開始しました");
        }
        Commands::Permission { request } => check_permission(handle, *request).await?,
        Commands::Notify { payload } => {
            let result = handle_remote_notification(payload, handle)?;
            Display::show_updated(&format!("通知を処理しました: {}", result.as_str()));
        }
    }
    Ok(())
}

/// Reads (and optionally requests) notification permission.
#[cfg(target_os = "macos")]
async fn check_permission(handle: &SyncHandle, request: bool) -> Result<()> {
    use apns_manager::platform::{bootstrap_permissions, request_permission};
    use apns_manager::platform::UserNotificationCenter;

    let center = UserNotificationCenter::new();
    let status = if request {
        request_permission(&center, handle).await?
    } else {
        bootstrap_permissions(&center, handle).await?
    };
    Display::show_updated(&format!("通知許可: {}", status.as_str()));
    Ok(())
}

/// Reads (and optionally requests) notification permission.
#[cfg(not(target_os = "macos"))]
async fn check_permission(_handle: &SyncHandle, _request: bool) -> Result<()> {
    Err(PlatformError::NotAvailable.into())
}

/// Finds a hint for the error that stopped the command.
fn suggestion_for(error: &anyhow::Error) -> Option<&'static str> {
    if let Some(e) = error.downcast_ref::<ConfigError>() {
        return Some(e.suggestion());
    }
    if let Some(e) = error.downcast_ref::<RegistryError>() {
        return Some(e.suggestion());
    }
    if let Some(e) = error.downcast_ref::<PlatformError>() {
        return Some(e.suggestion());
    }
    if let Some(e) = error.downcast_ref::<SyncError>() {
        return Some(e.suggestion());
    }
    None
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
