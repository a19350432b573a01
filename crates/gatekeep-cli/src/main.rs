//! Gatekeep - terminal shell around the gatekeep auth subsystem.
//!
//! Restores a saved login or prompts for one, then keeps the session alive
//! while commands are typed. Idle for too long and it logs out.

use std::io::{self, Write};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatekeep_core::auth::SigningSecretStore;
use gatekeep_core::resolver::password::hash_password;
use gatekeep_core::storage::AuthStorage;
use gatekeep_core::{AuthService, Config, Credentials, RestoreOutcome, ShellHooks};

/// Directory for a daily rolling log file, in addition to stderr
const ENV_LOG_DIR: &str = "GATEKEEP_LOG_DIR";

const LOG_FILE_PREFIX: &str = "gatekeep.log";

const HELP: &str = "Commands: status, extend, logout, quit";

/// Events pushed from the session timers to the prompt loop
enum ShellEvent {
    Warning(u64),
    TimedOut,
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must stay alive for file output to be flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
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
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("hash-password") => return print_password_hash(),
        Some("check") => return check_connections().await,
        Some("reset-secret") => return reset_secret(),
        Some("--help") | Some("-h") => {
            println!("Usage: gatekeep [hash-password | check | reset-secret]");
            return Ok(());
        }
        _ => {}
    }

    info!("Gatekeep starting");
    let result = run_shell().await;
    info!("Gatekeep shutting down");
    result
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    Ok(config)
}

/// Prompt for a password and print its argon2 hash for config or directory entries
fn print_password_hash() -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    println!("{}", hash_password(&password)?);
    Ok(())
}

/// Report which credential strategies are reachable
async fn check_connections() -> Result<()> {
    let service = AuthService::from_config(&load_config()?)?;
    for report in service.strategy_report().await {
        let mark = if report.available { "ok" } else { "unavailable" };
        println!("{:<10} {:<12} {}", report.name, mark, report.message);
    }
    Ok(())
}

/// Delete the keychain signing secret and the saved login it signed
fn reset_secret() -> Result<()> {
    let config = load_config()?;
    let storage = AuthStorage::new(config.storage_dir()?)?;

    if SigningSecretStore::delete()? {
        println!("Signing secret deleted; a new one is generated on next start");
    } else {
        println!("No signing secret stored");
    }
    storage.clear_all();
    println!("Cleared saved session in {}", storage.dir().display());
    Ok(())
}

async fn run_shell() -> Result<()> {
    let config = load_config()?;
    let (tx, mut events) = mpsc::unbounded_channel();

    let warning_tx = tx.clone();
    let hooks = ShellHooks::new(
        move || {
            let _ = tx.send(ShellEvent::TimedOut);
        },
        move |secs| {
            let _ = warning_tx.send(ShellEvent::Warning(secs));
        },
    );
    let service = AuthService::from_config(&config)?.with_hooks(hooks);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match service.restore_session() {
        RestoreOutcome::Authenticated { user, .. } => {
            println!("Welcome back, {} ({})", user.display_name, user.role);
        }
        RestoreOutcome::NotAuthenticated => {
            if !prompt_login(&service, &mut lines).await? {
                return Ok(());
            }
        }
    }
    println!("{}", HELP);

    loop {
        prompt("> ")?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                service.extend_session();

                match line.trim() {
                    "" => {}
                    "status" => print_status(&service),
                    "extend" => println!("Session extended"),
                    "logout" => {
                        service.logout();
                        println!("Logged out");
                        break;
                    }
                    "quit" | "exit" => break,
                    other => println!("Unknown command '{}'. {}", other, HELP),
                }
            }
            Some(event) = events.recv() => match event {
                ShellEvent::Warning(secs) => {
                    println!("\nSession expires in {}s. Type any command to stay logged in.", secs);
                }
                ShellEvent::TimedOut => {
                    println!("\nLogged out after inactivity.");
                    break;
                }
            },
        }
    }

    Ok(())
}

/// Ask for credentials until a login succeeds. Returns false on end of input.
async fn prompt_login<R>(
    service: &AuthService,
    lines: &mut tokio::io::Lines<BufReader<R>>,
) -> Result<bool>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        prompt("Email: ")?;
        let Some(email) = lines.next_line().await? else {
            return Ok(false);
        };

        let secret =
            tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: ")).await??;

        let result = service.login(&Credentials::new(email.trim(), secret)).await;
        if result.success {
            if let Some(user) = result.user {
                println!("Logged in as {} ({})", user.display_name, user.role);
            }
            return Ok(true);
        }

        let message = result.message.unwrap_or_else(|| "Login failed".to_string());
        eprintln!("{}", message);
    }
}

fn print_status(service: &AuthService) {
    match service.current_user() {
        Some(user) => {
            let remaining = service
                .remaining_time()
                .map(|d| format!("{}m {:02}s", d.as_secs() / 60, d.as_secs() % 60))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} <{}> role={} phase={:?} idle timeout in {}",
                user.display_name,
                user.email,
                user.role,
                service.session_phase(),
                remaining
            );
        }
        None => println!("Not logged in"),
    }
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    io::stdout().flush()?;
    Ok(())
}
