//! Ward authorization CLI
//!
//! Operator tool for inspecting and acting on ward approval requests from a
//! terminal. Chain submission stays with the wallet app; every command here
//! only needs the request store and the local keys.

use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ward_authz::approval::{
    ApprovalPoller, DeployedWard, DeviceRole, WardApprovalCoordinator, WardDeployment, WardPolicy,
};
use ward_authz::audit::AuditLog;
use ward_authz::chain::{ChainClient, GasPrices, InvokeRequest, TxReceipt, TxStatus};
use ward_authz::intent::CallSet;
use ward_authz::signature::ResourceBounds;
use ward_authz::store::{ApprovalStore, RestStore};
use ward_authz::wallet::{compute_invoke_v3_hash, InvokeHashParams, LocalKeyStore, TransactionSigner};
use ward_authz::{ApprovalRequest, Config, Endpoints, Error, Felt, Result};

#[derive(Parser)]
#[command(name = "ward-authz")]
#[command(about = "Inspect and act on ward approval requests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Ward,
    Guardian,
}

impl From<RoleArg> for DeviceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Ward => DeviceRole::Ward,
            RoleArg::Guardian => DeviceRole::Guardian,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// List live requests waiting on this device
    Pending {
        /// Side of the relationship to list for; both when omitted
        #[arg(short, long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Every request the local ward account has made
    History,

    /// Watch for new requests until interrupted
    Watch {
        #[arg(short, long, value_enum)]
        role: RoleArg,
    },

    /// Reject a request waiting on this device
    Reject {
        /// Request id
        #[arg(long)]
        id: String,
    },

    /// Compute the invoke v3 hash a ward request signs
    TxHash {
        /// Sender (ward) address
        #[arg(long)]
        sender: String,

        /// JSON file holding the call set
        #[arg(long)]
        calls: PathBuf,

        #[arg(long)]
        nonce: String,

        /// Resource bounds as JSON (same format as the request row)
        #[arg(long)]
        bounds: String,

        /// Chain id, hex or short string
        #[arg(long, default_value = "SN_SEPOLIA")]
        chain_id: String,
    },
}

/// Chain stand-in for commands that never reach the chain.
struct Detached;

impl Detached {
    fn unavailable<T>(&self, what: &str) -> Result<T> {
        Err(Error::Config(format!(
            "{} needs the wallet's chain client and is not available from the CLI",
            what
        )))
    }
}

#[async_trait]
impl ChainClient for Detached {
    async fn get_nonce(&self, _address: &Felt) -> Result<Felt> {
        self.unavailable("Nonce lookup")
    }

    async fn chain_id(&self) -> Result<Felt> {
        self.unavailable("Chain id lookup")
    }

    async fn block_gas_prices(&self) -> Result<GasPrices> {
        self.unavailable("Gas price lookup")
    }

    async fn submit_invoke(
        &self,
        _request: InvokeRequest,
        _signer: &dyn TransactionSigner,
    ) -> Result<Felt> {
        self.unavailable("Transaction submission")
    }

    async fn wait_for_transaction(&self, _tx_hash: &Felt) -> Result<TxReceipt> {
        self.unavailable("Receipt lookup")
    }

    async fn transaction_status(&self, _tx_hash: &Felt) -> Result<TxStatus> {
        self.unavailable("Transaction status lookup")
    }

    async fn ward_policy(&self, _ward_address: &Felt) -> Result<WardPolicy> {
        self.unavailable("Ward policy lookup")
    }

    async fn deploy_ward(&self, _deployment: &WardDeployment) -> Result<DeployedWard> {
        self.unavailable("Ward deployment")
    }

    async fn is_deployed(&self, _address: &Felt) -> Result<bool> {
        self.unavailable("Deployment check")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let config = match cli.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Config => show_config(&config)?,
        Commands::Pending { role } => {
            let coordinator = coordinator(&config)?;
            list_pending(&coordinator, role.map(DeviceRole::from)).await?;
        }
        Commands::History => {
            let coordinator = coordinator(&config)?;
            let address = local_address()?;
            print_requests(&coordinator.history_for_ward(&address).await?);
        }
        Commands::Watch { role } => {
            let coordinator = Arc::new(coordinator(&config)?);
            watch(coordinator, role.into()).await?;
        }
        Commands::Reject { id } => {
            let coordinator = coordinator(&config)?;
            let request = coordinator.reject_request(&id).await?;
            println!("Request {} is now {}", request.id, request.status);
        }
        Commands::TxHash {
            sender,
            calls,
            nonce,
            bounds,
            chain_id,
        } => {
            let hash = tx_hash(&sender, &calls, &nonce, &bounds, &chain_id)?;
            println!("{}", hash);
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    match Endpoints::from_env() {
        Ok(endpoints) => println!("{:?}", endpoints),
        Err(e) => println!("Endpoints: {}", e),
    }
    Ok(())
}

fn local_address() -> Result<Felt> {
    use ward_authz::wallet::KeyStore;
    Ok(LocalKeyStore::from_env()?.account_address())
}

fn coordinator(config: &Config) -> Result<WardApprovalCoordinator> {
    let endpoints = Endpoints::from_env()?;
    let (url, key) = endpoints.store()?;
    let store: Arc<dyn ApprovalStore> = Arc::new(RestStore::new(url.clone(), key.clone()));
    let keys = Arc::new(LocalKeyStore::from_env()?);

    let mut coordinator =
        WardApprovalCoordinator::new(store, Arc::new(Detached), keys, config.approval.clone());
    if let Some(path) = &config.audit_log_path {
        coordinator = coordinator.with_audit_log(Arc::new(AuditLog::new(path.clone())));
    }
    Ok(coordinator)
}

async fn list_pending(coordinator: &WardApprovalCoordinator, role: Option<DeviceRole>) -> Result<()> {
    let address = local_address()?;
    match role {
        Some(role) => print_requests(&coordinator.pending_for(role, &address).await?),
        None => {
            let (ward, guardian) = futures::try_join!(
                coordinator.pending_for(DeviceRole::Ward, &address),
                coordinator.pending_for(DeviceRole::Guardian, &address),
            )?;
            println!("As ward:");
            print_requests(&ward);
            println!("As guardian:");
            print_requests(&guardian);
        }
    }
    Ok(())
}

fn print_requests(requests: &[ApprovalRequest]) {
    if requests.is_empty() {
        println!("  (none)");
        return;
    }
    for request in requests {
        println!(
            "  {}  {:<17} {:<9} {} {}  expires {}",
            request.id,
            request.status.to_string(),
            request.action.to_string(),
            request.amount.as_deref().unwrap_or("-"),
            request.token,
            request.expires_at,
        );
    }
}

async fn watch(coordinator: Arc<WardApprovalCoordinator>, role: DeviceRole) -> Result<()> {
    let address = local_address()?;
    let (poller, mut requests) = ApprovalPoller::new(coordinator, role, address);
    poller.start();
    tracing::info!(role = %role, address = %address, "Watching for approval requests (Ctrl+C to stop)");

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => print_requests(std::slice::from_ref(&request)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop();
    Ok(())
}

fn tx_hash(sender: &str, calls: &Path, nonce: &str, bounds: &str, chain_id: &str) -> Result<Felt> {
    let calls = CallSet::from_json(&std::fs::read_to_string(calls)?)?;
    let bounds = ResourceBounds::from_json(bounds)?;
    let chain_id = if chain_id.starts_with("0x") {
        Felt::from_hex(chain_id)?
    } else {
        Felt::from_short_string(chain_id)?
    };
    compute_invoke_v3_hash(&InvokeHashParams {
        sender_address: Felt::from_hex(sender)?,
        calldata: &calls.execute_calldata(),
        chain_id,
        nonce: Felt::from_hex(nonce)?,
        resource_bounds: &bounds,
    })
}
