// ── checkin-bot: composition root ──────────────────────────────────────────
// Reads configuration, opens the store, wires the engine services, and
// exposes a `clap` command surface that stands in for the chat shell the
// original drives this engine from (spec §0: chat UI itself is out of scope).

use checkin_core::atoms::config::Config;
use checkin_core::atoms::error::{CheckinError, CheckinResult};
use checkin_core::atoms::types::{CheckinMode, Site};
use checkin_core::engine::account_manager::AccountManager;
use checkin_core::engine::captcha::CaptchaConfig;
use checkin_core::engine::checkin_service::CheckinService;
use checkin_core::engine::clock::Clock;
use checkin_core::engine::scheduler::Scheduler;
use checkin_core::engine::store::Store;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "checkin-bot", about = "Multi-site forum check-in engine")]
struct Cli {
    /// External (Telegram-style) user id issuing this command.
    #[arg(long, global = true, default_value_t = 0)]
    external_id: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new site account and fetch its initial cookie/credits.
    AddAccount {
        #[arg(long)]
        site: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "fixed")]
        mode: String,
    },
    /// Remove an owned account.
    DeleteAccount {
        #[arg(long)]
        account_id: i64,
    },
    /// Re-authenticate an account and replace its stored cookie.
    RefreshCookie {
        #[arg(long)]
        account_id: i64,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Flip an account between fixed and random check-in timing.
    ToggleMode {
        #[arg(long)]
        account_id: i64,
    },
    /// Update an account's check-in hour and/or push hour.
    SetHours {
        #[arg(long)]
        account_id: i64,
        #[arg(long)]
        checkin_hour: Option<u8>,
        #[arg(long)]
        push_hour: Option<u8>,
    },
    /// Run a single manual check-in immediately.
    Checkin {
        #[arg(long)]
        account_id: i64,
    },
    /// List all accounts owned by the caller.
    ListAccounts,
    /// Start the long-lived scheduler process (check-in sweep, push sweep,
    /// session and permission-cache GC).
    Run,
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Err(e) = run(config).await {
        error!("[cli] {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> CheckinResult<()> {
    let store = Arc::new(Store::open(&config.database_url)?);
    let clock = Clock::new(&config.timezone);

    let captcha = CaptchaConfig {
        api_url: config.cloudflyer_api_url.clone(),
        api_key: config.cloudflyer_api_key.clone(),
        max_retries: config.captcha_max_retries,
        retry_interval: config.captcha_retry_interval,
    };

    let account_manager = AccountManager::new(
        store.clone(),
        config.encryption_key.clone(),
        captcha,
        config.default_checkin_hour,
        config.default_push_hour,
    );
    let checkin_service = Arc::new(CheckinService::new(
        store.clone(),
        clock.clone(),
        config.impersonate_browser.clone(),
    ));

    let cli = Cli::parse();

    match cli.command {
        Command::AddAccount { site, username, password, mode } => {
            let site = parse_site(&site)?;
            let mode = parse_mode(&mode)?;
            let account = account_manager
                .add_account(cli.external_id, site, &username, &password, mode, None)
                .await?;
            info!("[cli] account {} added for {}/{}", account.id, site, username);
            println!("account {} created", account.id);
        }
        Command::DeleteAccount { account_id } => {
            account_manager.delete_account(account_id, cli.external_id)?;
            println!("account {account_id} deleted");
        }
        Command::RefreshCookie { account_id, force } => {
            account_manager.refresh_cookie(account_id, cli.external_id, force).await?;
            println!("account {account_id} cookie refreshed");
        }
        Command::ToggleMode { account_id } => {
            let mode = account_manager.toggle_mode(account_id, cli.external_id)?;
            println!("account {account_id} mode is now {mode}");
        }
        Command::SetHours { account_id, checkin_hour, push_hour } => {
            account_manager.set_hours(account_id, cli.external_id, checkin_hour, push_hour)?;
            println!("account {account_id} hours updated");
        }
        Command::Checkin { account_id } => {
            let account = store
                .account_get_by_id(account_id)?
                .ok_or_else(|| CheckinError::NotFound("account".to_string()))?;
            let result = checkin_service.run(&account, true).await?;
            println!("{}: {}", result.status.as_str(), result.message);
        }
        Command::ListAccounts => {
            for account in account_manager.list_accounts(cli.external_id)? {
                println!(
                    "{}\t{}\t{}\t{}\t{} credits",
                    account.id, account.site, account.site_username, account.mode, account.credits
                );
            }
        }
        Command::Run => {
            let scheduler = Arc::new(Scheduler::new(store.clone(), checkin_service.clone(), clock, None));
            info!("[cli] starting scheduler");
            let handles = scheduler.spawn();
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    Ok(())
}

fn parse_site(s: &str) -> CheckinResult<Site> {
    Site::parse(s).ok_or_else(|| CheckinError::ConfigInvalid(format!("unknown site: {s}")))
}

fn parse_mode(s: &str) -> CheckinResult<CheckinMode> {
    CheckinMode::parse(s).ok_or_else(|| CheckinError::ConfigInvalid(format!("unknown mode: {s}")))
}
