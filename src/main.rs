use anyhow::{ Context, Result };
use clap::{ Parser, Subcommand };
use colored::Colorize;
use comfy_table::{ presets::UTF8_FULL, Table };
use solana_sdk::pubkey::Pubkey;
use std::io::{ self, Write };
use std::str::FromStr;
use std::sync::Arc;

use solsweep::config::Config;
use solsweep::events::Notifications;
use solsweep::global;
use solsweep::logger::{ self, log, LogTag };
use solsweep::price::{ run_price_updater, HttpQuoteSource, PriceCache, SYMBOL_OVERRIDES };
use solsweep::providers::ProviderRegistry;
use solsweep::rpc::{ lamports_to_sol, HttpLedgerRpc };
use solsweep::session::Connector;
use solsweep::snapshot::{ fetch_account_snapshot, AccountSnapshot };
use solsweep::submit::submit_with_retry;
use solsweep::sweep::{ prepare_sweep_from_snapshot, SweepPlan };
use solsweep::utils::truncate_address;
use solsweep::verify::VerificationStore;

/// Wallet migration toolkit: moves a wallet's balances to a configured
/// destination, with ownership verification in front of every sweep.
#[derive(Parser)]
#[command(name = "solsweep", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = global::CONFIGS_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the migration service: HTTP API plus the price updater.
    Run,

    /// Connect a wallet provider and sweep its balances.
    Sweep {
        /// Provider to connect.
        #[arg(long, default_value = "keypair")]
        provider: String,

        /// Skip the interactive confirmation.
        #[arg(long)]
        yes: bool,
    },

    /// Show what a sweep would move, without signing anything.
    Preview {
        /// Provider to connect when no address is given.
        #[arg(long, default_value = "keypair")]
        provider: String,

        /// Inspect this address instead of connecting a provider.
        #[arg(long)]
        address: Option<String>,
    },

    /// List wallet providers and their availability.
    Providers,
}

#[tokio::main]
async fn main() {
    logger::init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log(LogTag::Config, "ERROR", &format!("❌ {:#}", e));
            std::process::exit(1);
        }
    };

    if config.destination_wallet.trim().is_empty() {
        log(
            LogTag::Config,
            "TEMPLATE",
            &format!("Wrote template to {}. Set destination_wallet and rerun.", cli.config)
        );
        std::process::exit(1);
    }

    let result = match cli.command {
        Command::Run => run_service(config).await,
        Command::Sweep { provider, yes } => run_sweep(config, &provider, yes).await,
        Command::Preview { provider, address } => run_preview(config, &provider, address).await,
        Command::Providers => run_providers(config).await,
    };

    if let Err(e) = result {
        log(LogTag::System, "FATAL", &format!("❌ {:#}", e));
        std::process::exit(1);
    }
}

/// Long-running service mode: price updater plus the HTTP API, until a
/// shutdown signal arrives.
async fn run_service(config: Config) -> Result<()> {
    log(
        LogTag::System,
        "START",
        &format!("🚀 solsweep {} starting up...", env!("CARGO_PKG_VERSION"))
    );

    ctrlc
        ::set_handler(|| {
            println!();
            global::trigger_shutdown();
        })
        .context("Failed to install Ctrl+C handler")?;

    let config = Arc::new(config);
    let rpc = Arc::new(HttpLedgerRpc::from_config(&config));
    let store = Arc::new(VerificationStore::load(&config.verification.store_path));
    let notifications = Arc::new(Notifications::from_config(&config));

    let pricing = config.pricing.clone().unwrap_or_default();
    let price = Arc::new(
        PriceCache::new(Arc::new(HttpQuoteSource::new()), pricing.cache_ttl_secs)
    );

    if pricing.enabled {
        let updater_cache = price.clone();
        let interval = pricing.update_interval_secs;
        tokio::spawn(async move {
            run_price_updater(updater_cache, interval, global::SHUTDOWN.clone()).await;
        });
    }

    #[cfg(feature = "web")]
    if config.webserver.enabled {
        let state = Arc::new(
            solsweep::webserver::state::AppState::new(
                config.clone(),
                rpc,
                price,
                store,
                notifications
            )
        );
        solsweep::webserver::start_server(state).await.map_err(|e| anyhow::anyhow!(e))?;
    } else {
        wait_for_shutdown().await;
    }

    #[cfg(not(feature = "web"))]
    wait_for_shutdown().await;

    log(LogTag::System, "STOP", "✅ solsweep stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    if !global::is_shutting_down() {
        global::SHUTDOWN.notified().await;
    }
}

/// Interactive sweep: connect, verify, preview, confirm, submit.
async fn run_sweep(config: Config, provider_id: &str, yes: bool) -> Result<()> {
    let destination = Pubkey::from_str(&config.destination_wallet).context(
        "destination_wallet is not a valid address"
    )?;

    let rpc = HttpLedgerRpc::from_config(&config);
    let store = Arc::new(VerificationStore::load(&config.verification.store_path));
    let notifications = Arc::new(Notifications::from_config(&config));
    let registry = ProviderRegistry::from_config(&config);
    let mut connector = Connector::new(
        registry,
        store,
        notifications.clone(),
        config.session.clone()
    );

    let address = connector.connect(provider_id).await?;

    if !connector.verify().await? {
        connector.reset().await;
        anyhow::bail!("wallet {} failed ownership verification", address);
    }

    let snapshot = fetch_account_snapshot(&rpc, &address).await?;
    let plan = prepare_sweep_from_snapshot(&rpc, &snapshot, &destination, &config.sweep).await?;
    print_plan_table(&snapshot, &plan, &destination);

    if !yes && !confirm_prompt()? {
        log(LogTag::Sweep, "CANCELLED", "Sweep cancelled by operator");
        connector.reset().await;
        return Ok(());
    }

    let provider = connector
        .provider(provider_id)
        .ok_or_else(|| anyhow::anyhow!("provider '{}' disappeared", provider_id))?;
    let session = connector
        .session_mut()
        .ok_or_else(|| anyhow::anyhow!("no active session"))?;

    let signature = submit_with_retry(
        &rpc,
        provider,
        session,
        &plan,
        &config.retry,
        &notifications
    ).await?;

    log(LogTag::Sweep, "DONE", &format!("✅ Sweep confirmed: {}", signature));
    connector.reset().await;
    Ok(())
}

/// Dry run: assemble the plan and print it, nothing is signed.
async fn run_preview(config: Config, provider_id: &str, address: Option<String>) -> Result<()> {
    let destination = Pubkey::from_str(&config.destination_wallet).context(
        "destination_wallet is not a valid address"
    )?;
    let rpc = HttpLedgerRpc::from_config(&config);

    let owner = match address {
        Some(address) => Pubkey::from_str(&address).context("invalid --address")?,
        None => {
            let store = Arc::new(VerificationStore::load(&config.verification.store_path));
            let notifications = Arc::new(Notifications::from_config(&config));
            let registry = ProviderRegistry::from_config(&config);
            let mut connector = Connector::new(
                registry,
                store,
                notifications,
                config.session.clone()
            );
            connector.connect(provider_id).await?
        }
    };

    let snapshot = fetch_account_snapshot(&rpc, &owner).await?;
    let plan = prepare_sweep_from_snapshot(&rpc, &snapshot, &destination, &config.sweep).await?;
    print_plan_table(&snapshot, &plan, &destination);

    if let Some(pricing) = &config.pricing {
        if pricing.enabled {
            let price = PriceCache::new(
                Arc::new(HttpQuoteSource::new()),
                pricing.cache_ttl_secs
            );
            let quote = price.get().await;
            if quote > 0.0 {
                println!(
                    "{}",
                    format!(
                        "Native value at current quote: ${:.2}",
                        lamports_to_sol(plan.transfer_amount) * quote
                    ).dimmed()
                );
            }
        }
    }

    Ok(())
}

/// Availability table over the registered providers.
async fn run_providers(config: Config) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(["ID", "Name", "Available", "Handoff"]);

    for info in registry.discover().await {
        let hint = registry
            .get(&info.id)
            .and_then(|p| p.handoff_hint())
            .unwrap_or_else(|| "-".to_string());
        table.add_row([
            info.id,
            info.display_name,
            (if info.available { "✓" } else { "✗" }).to_string(),
            hint,
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn print_plan_table(snapshot: &AccountSnapshot, plan: &SweepPlan, destination: &Pubkey) {
    let destination_display = truncate_address(&destination.to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(["Asset", "Amount", "Destination"]);

    table.add_row([
        "SOL".to_string(),
        format!("{:.6}", lamports_to_sol(plan.transfer_amount)),
        destination_display.clone(),
    ]);

    for transfer in &plan.token_transfers {
        let symbol = SYMBOL_OVERRIDES.get(transfer.mint.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| truncate_address(&transfer.mint));
        let ui_amount = (transfer.amount as f64) / (10f64).powi(transfer.decimals as i32);
        table.add_row([symbol, format!("{:.6}", ui_amount), destination_display.clone()]);
    }

    println!();
    println!("{}", table);
    println!(
        "{}",
        format!(
            "Wallet {} holds {:.6} SOL. Fee reserve {:.6} SOL, {} destination accounts to create.",
            truncate_address(&snapshot.address.to_string()),
            snapshot.sol_balance(),
            lamports_to_sol(plan.estimated_fees),
            plan.created_accounts
        ).dimmed()
    );
}

fn confirm_prompt() -> Result<bool> {
    print!("\nType 'yes' to confirm the sweep: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("yes"))
}
