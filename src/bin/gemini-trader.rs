// Gemini CryptoTrader - command line front end
// Account management, vault control, market data and private exchange calls

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use gemini_cryptotrader::{AppConfig, Session, TraderError, TraderResult};

// Load command modules from cli directory
#[path = "../cli/account_commands.rs"]
mod account_commands;
#[path = "../cli/market_commands.rs"]
mod market_commands;

#[derive(Parser)]
#[command(name = "gemini-trader")]
#[command(version)]
#[command(about = "Gemini exchange client with an encrypted account store", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    /// Vault password for an encrypted account store
    #[arg(long, global = true, env = "GEMINI_TRADER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create config.toml and the data directory
    Init,

    /// Show configuration, storage and connectivity status
    Status,

    /// Manage exchange accounts
    #[command(subcommand)]
    Account(AccountCommands),

    /// Encrypt or decrypt the account store
    #[command(subcommand)]
    Vault(VaultCommands),

    /// Show balances of the last-used account
    Balances,

    /// Show the exchange ticker for a symbol
    Ticker {
        /// Trading pair (e.g., btcusd)
        symbol: String,
    },

    /// Show recent minute candles for a symbol
    History {
        /// Trading pair (e.g., btcusd)
        symbol: String,

        /// Number of candles
        #[arg(short, long, default_value = "24")]
        limit: u32,
    },

    /// Place a limit or stop-limit order
    #[command(subcommand)]
    Order(OrderCommands),

    /// Cancel an open order
    Cancel {
        order_id: u64,
    },

    /// Send a heartbeat for a heartbeat-enabled trader account
    Heartbeat,

    /// Generate a new deposit address
    DepositAddress {
        /// Currency (e.g., btc)
        currency: String,

        #[arg(long)]
        label: Option<String>,
    },

    /// Withdraw funds to an address
    Withdraw {
        currency: String,
        address: String,
        amount: f64,
    },

    /// Poll market data and print each snapshot until Ctrl-C
    Watch {
        /// Symbols to track (comma-separated), defaults to config
        #[arg(short, long)]
        symbols: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Add an account and make it the last-used one
    Add {
        account_id: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        secret_key: String,
        #[arg(long)]
        trader: bool,
        #[arg(long)]
        heartbeat: bool,
        #[arg(long)]
        fund_manager: bool,
        #[arg(long)]
        sandbox: bool,
    },

    /// Update credentials or roles of an account
    Update {
        account_id: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        secret_key: Option<String>,
        #[arg(long)]
        trader: Option<bool>,
        #[arg(long)]
        heartbeat: Option<bool>,
        #[arg(long)]
        fund_manager: Option<bool>,
        #[arg(long)]
        sandbox: Option<bool>,
    },

    /// Delete an account
    Remove {
        account_id: String,
    },

    /// Select the account used by default
    Use {
        account_id: String,
    },

    /// List accounts
    List,
}

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Encrypt the account store with --password
    Enable,

    /// Decrypt the account store back to plain JSON
    Disable,

    /// Re-encrypt with a new password
    Passwd {
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    Buy(OrderArgs),
    Sell(OrderArgs),
}

#[derive(clap::Args)]
pub struct OrderArgs {
    /// Trading pair (e.g., btcusd)
    pub symbol: String,
    pub amount: f64,
    /// Limit price
    pub price: f64,
    /// Stop price, makes this a conditional order
    #[arg(long)]
    pub stop: Option<f64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging first (before the session so we can see load errors)
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        AppConfig::from_file(&cli.config)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_max_level(level.parse().unwrap_or(tracing::Level::INFO))
        .init();

    if let Err(e) = run(cli).await {
        error!("❌ {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> TraderResult<()> {
    let password = cli.password.as_deref();

    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => init_workspace(&cli.config),

        Commands::Status => show_status(&cli.config, password).await,

        Commands::Watch { symbols } => {
            let config = AppConfig::from_file(&cli.config)?;
            market_commands::watch(config, symbols).await
        }

        Commands::Ticker { symbol } => {
            let config = AppConfig::from_file(&cli.config)?;
            market_commands::show_ticker(&config, &symbol).await
        }

        Commands::History { symbol, limit } => {
            let config = AppConfig::from_file(&cli.config)?;
            market_commands::show_history(&config, &symbol, limit).await
        }

        Commands::Account(cmd) => {
            let session = open_session(&cli.config, password)?;
            account_commands::handle(cmd, &session)
        }

        Commands::Vault(cmd) => {
            let mut session = open_session(&cli.config, password)?;
            let password = password.ok_or_else(|| {
                TraderError::Credential("--password or GEMINI_TRADER_PASSWORD is required".to_string())
            })?;
            match cmd {
                VaultCommands::Enable => session.enable_encryption(password),
                VaultCommands::Disable => session.disable_encryption(password),
                VaultCommands::Passwd { new_password } => session.change_password(password, &new_password),
            }
        }

        Commands::Balances => {
            let session = open_session(&cli.config, password)?;
            market_commands::show_balances(&session).await
        }

        Commands::Order(cmd) => {
            let session = open_session(&cli.config, password)?;
            match cmd {
                OrderCommands::Buy(args) => market_commands::place_order(&session, gemini_cryptotrader::OrderSide::Buy, args).await,
                OrderCommands::Sell(args) => market_commands::place_order(&session, gemini_cryptotrader::OrderSide::Sell, args).await,
            }
        }

        Commands::Cancel { order_id } => {
            let session = open_session(&cli.config, password)?;
            market_commands::cancel_order(&session, order_id).await
        }

        Commands::Heartbeat => {
            let session = open_session(&cli.config, password)?;
            market_commands::heartbeat(&session).await
        }

        Commands::DepositAddress { currency, label } => {
            let session = open_session(&cli.config, password)?;
            market_commands::deposit_address(&session, &currency, label.as_deref()).await
        }

        Commands::Withdraw { currency, address, amount } => {
            let session = open_session(&cli.config, password)?;
            market_commands::withdraw(&session, &currency, &address, amount).await
        }
    }
}

fn open_session(config_path: &str, password: Option<&str>) -> TraderResult<Session> {
    let config = AppConfig::from_file(config_path)?;
    Session::open(config, password)
}

fn init_workspace(config_path: &str) -> TraderResult<()> {
    use std::fs;
    use std::path::Path;

    info!("🔧 Initializing workspace...");

    if !Path::new(config_path).exists() {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)
            .map_err(|e| TraderError::FileWrite(format!("{}: {}", config_path, e)))?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    let config = AppConfig::from_file(config_path)?;
    fs::create_dir_all(&config.storage.data_dir)
        .map_err(|e| TraderError::FileWrite(format!("{}: {}", config.storage.data_dir, e)))?;

    let settings_path = config.storage.settings_path();
    if !settings_path.exists() {
        gemini_cryptotrader::Settings::default().save(&settings_path)?;
        info!("📝 Created {}", settings_path.display());
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. gemini-trader account add <id> --api-key ... --secret-key ... --trader");
    info!("   2. gemini-trader vault enable --password ...");
    info!("   3. gemini-trader balances");
    Ok(())
}

async fn show_status(config_path: &str, password: Option<&str>) -> TraderResult<()> {
    use gemini_cryptotrader::{ConnectivityProbe, TcpProbe};

    info!("📊 System Status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match AppConfig::from_file(config_path) {
        Ok(config) => {
            info!("⚙️  Config: OK ({})", config_path);
            config
        }
        Err(e) => {
            info!("⚙️  Config: {} (run: gemini-trader init)", e);
            AppConfig::default()
        }
    };

    let settings = gemini_cryptotrader::Settings::load(&config.storage.settings_path())?;
    info!("🔒 Encrypted store: {}", if settings.encrypted { "yes" } else { "no" });

    match Session::open(config.clone(), password) {
        Ok(session) => {
            let account = session.current_account()?;
            info!("👤 Accounts: {}", session.store().len());
            if !account.is_placeholder() {
                info!("👤 Current: {}{}", account.account_id, if account.is_sandbox { " (sandbox)" } else { "" });
            }
        }
        Err(e) => info!("👤 Accounts: unavailable ({})", e),
    }

    let probe = TcpProbe::from_config(&config.connectivity);
    if probe.is_online().await {
        info!("🟢 Network: connected");
    } else {
        info!("🔴 Network: unreachable ({})", config.connectivity.probe_address);
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}
