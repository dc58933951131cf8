//! Command-line interface for envios.
//!
//! Every command operates on the data directory given by `--data-dir`
//! (default `.envios`), whose `.envios.toml` supplies the configuration.
//! The acting user comes from `--user`/`--role`, standing in for the
//! gateway headers the HTTP API receives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use envios::LifecycleManager;
use envios::config::{Config, load_config};
use envios::types::{
    Actor, DEFAULT_PAGE_LIMIT, DeliveryState, Department, Evidence, EntryDetail, NewShipment, Page, Role, Shipment,
    ShipmentFilter, ShipmentId, TrackingView, TransitionPayload,
};
use serde::Serialize;

mod output;

use output::{print_json, render_messages, render_shipment, render_shipments, render_tracking};

#[derive(Parser, Debug)]
#[command(name = "envios", version)]
#[command(about = "Shipment lifecycle service for courier operations in Uruguay")]
pub struct Cli {
    /// Directory holding records, evidence, the message log and .envios.toml
    #[arg(long, env = "ENVIOS_DATA_DIR", default_value = ".envios", global = true)]
    data_dir: PathBuf,

    /// Id of the acting user
    #[arg(long, env = "ENVIOS_USER", default_value = "cli", global = true)]
    user: String,

    /// Display name of the acting user (defaults to the id)
    #[arg(long, env = "ENVIOS_USER_NAME", global = true)]
    name: Option<String>,

    /// Role of the acting user: admin, agent or courier
    #[arg(long, env = "ENVIOS_ROLE", default_value = "admin", global = true)]
    role: Role,

    /// Bound on each store call (e.g. 5s, 500ms); overrides timeouts.store
    #[arg(long, global = true)]
    store_timeout: Option<String>,

    /// Bound on each evidence call; overrides timeouts.evidence
    #[arg(long, global = true)]
    evidence_timeout: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Listen address; overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Register a new shipment.
    Create(CreateArgs),
    /// Move a shipment to another state.
    Transition(TransitionArgs),
    /// Show the public tracking view of a ticket.
    Track {
        ticket: String,
    },
    /// List shipments, newest first.
    List(ListArgs),
    /// Show the most recent customer notifications.
    Messages {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print which roles may fire each transition.
    Policy,
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug, Clone)]
struct CreateArgs {
    #[arg(long)]
    ticket: String,
    #[arg(long)]
    street: String,
    #[arg(long)]
    number: String,
    #[arg(long)]
    apartment: Option<String>,
    #[arg(long)]
    cross_street: Option<String>,
    #[arg(long)]
    department: String,
    #[arg(long)]
    reason: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    comments: Option<String>,
}

impl From<CreateArgs> for NewShipment {
    fn from(args: CreateArgs) -> Self {
        NewShipment {
            ticket: args.ticket,
            street: args.street,
            number: args.number,
            apartment: args.apartment,
            cross_street: args.cross_street,
            department: args.department,
            reason: args.reason,
            comments: args.comments,
            phone: args.phone,
            contact_name: args.contact,
        }
    }
}

#[derive(Args, Debug)]
struct TransitionArgs {
    /// Shipment id or exact ticket
    shipment: String,

    /// Target state (e.g. asignado_a_courier, entregado, "No entregado")
    state: DeliveryState,

    #[arg(long)]
    receiver_name: Option<String>,

    #[arg(long)]
    receiver_id: Option<String>,

    /// Reason for a failed delivery
    #[arg(long)]
    reason: Option<String>,

    /// Image file to store as delivery evidence
    #[arg(long, conflicts_with = "evidence_url")]
    evidence: Option<PathBuf>,

    /// Reference returned by an earlier upload
    #[arg(long)]
    evidence_url: Option<String>,
}

impl TransitionArgs {
    fn payload(&self) -> Result<TransitionPayload> {
        let evidence = match (&self.evidence, &self.evidence_url) {
            (Some(path), _) => Some(Evidence::Upload(
                std::fs::read(path).with_context(|| format!("failed to read evidence file: {}", path.display()))?,
            )),
            (None, Some(url)) => Some(Evidence::Reference(url.clone())),
            (None, None) => None,
        };
        Ok(TransitionPayload {
            receiver_name: self.receiver_name.clone(),
            receiver_id: self.receiver_id.clone(),
            reason: self.reason.clone(),
            evidence,
        })
    }
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    department: Option<Department>,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    state: Option<DeliveryState>,
    /// First creation day included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last creation day included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Case-insensitive ticket substring
    #[arg(long)]
    ticket: Option<String>,
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    skip: usize,
}

impl ListArgs {
    fn filter(&self) -> ShipmentFilter {
        ShipmentFilter {
            department: self.department,
            reason: self.reason.clone(),
            state: self.state,
            date_from: self.from,
            date_to: self.to,
            ticket: self.ticket.clone(),
        }
    }
}

/// Entry point shared by the `envios` binary and embedders.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(matches!(cli.cmd, Commands::Serve { .. }));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(execute(cli))
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Logs go to stderr so command output stays parseable. `RUST_LOG`
/// overrides the default level; `ENVIOS_LOG_JSON=1` switches to JSON lines.
fn init_tracing(server: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default = if server { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if env_bool("ENVIOS_LOG_JSON") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("[warn] logging already initialised: {e}");
    }
}

fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

fn effective_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config(&cli.data_dir)?;
    if let Some(t) = &cli.store_timeout {
        config.timeouts.store = parse_duration(t)?;
    }
    if let Some(t) = &cli.evidence_timeout {
        config.timeouts.evidence = parse_duration(t)?;
    }
    if let Commands::Serve { bind: Some(bind) } = &cli.cmd {
        config.server.bind = bind.clone();
    }
    Ok(config)
}

fn actor(cli: &Cli) -> Actor {
    let name = cli.name.clone().unwrap_or_else(|| cli.user.clone());
    Actor::new(cli.user.clone(), name, cli.role)
}

async fn execute(cli: Cli) -> Result<()> {
    let config = effective_config(&cli)?;
    tracing::debug!(data_dir = %cli.data_dir.display(), user = %cli.user, role = %cli.role, "configuration loaded");

    if let Commands::Config = cli.cmd {
        config.validate()?;
        if cli.json {
            print_json(&config)?;
        } else {
            print!("{}", config.to_toml()?);
        }
        return Ok(());
    }

    let manager = LifecycleManager::from_config(&config, &cli.data_dir)?;
    let actor = actor(&cli);
    dispatch(&cli, &config, manager, &actor).await
}

async fn dispatch(cli: &Cli, config: &Config, manager: LifecycleManager, actor: &Actor) -> Result<()> {
    match &cli.cmd {
        Commands::Serve { .. } => {
            let addr: SocketAddr = config
                .server
                .bind
                .parse()
                .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
            envios::server::serve(Arc::new(manager), addr).await
        }
        Commands::Create(args) => {
            let input = NewShipment::from(args.clone());
            let shipment = manager.create_shipment(&input, actor).await?;
            manager.drain_notifications().await;
            emit(cli.json, &shipment, || {
                println!("created {}", shipment.ticket);
                print!("{}", render_shipment(&shipment));
            })
        }
        Commands::Transition(args) => {
            let id = resolve(&manager, &args.shipment).await?;
            let shipment = manager
                .transition_shipment(id, args.state, args.payload()?, actor)
                .await?;
            manager.drain_notifications().await;
            emit(cli.json, &shipment, || {
                println!("{} is now {}", shipment.ticket, shipment.state());
                print!("{}", render_shipment(&shipment));
            })
        }
        Commands::Track { ticket } => {
            let view: TrackingView = manager.get_shipment_by_ticket(ticket).await?;
            emit(cli.json, &view, || print!("{}", render_tracking(&view)))
        }
        Commands::List(args) => {
            let items = manager
                .query_shipments(&args.filter(), Page::new(args.limit, args.skip))
                .await?;
            emit(cli.json, &items, || print!("{}", render_shipments(&items)))
        }
        Commands::Messages { limit } => {
            let records = manager.list_messages(*limit).await?;
            emit(cli.json, &records, || print!("{}", render_messages(&records)))
        }
        Commands::Policy => {
            let rows = manager.policy_rows();
            emit(cli.json, &rows, || print!("{}", manager.policy().render_table()))
        }
        Commands::Config => Ok(()),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> Result<()> {
    if json {
        print_json(value)
    } else {
        text();
        Ok(())
    }
}

/// Accept either a shipment id or an exact ticket.
async fn resolve(manager: &LifecycleManager, key: &str) -> Result<ShipmentId> {
    if let Ok(id) = key.parse::<ShipmentId>() {
        return Ok(id);
    }
    let filter = ShipmentFilter {
        ticket: Some(key.to_string()),
        ..Default::default()
    };
    let matches: Vec<Shipment> = manager
        .query_shipments(&filter, Page::new(usize::MAX, 0))
        .await?;
    match matches.into_iter().find(|s| s.ticket == key.trim()) {
        Some(s) => Ok(s.id),
        None => bail!("no shipment with id or ticket {key}"),
    }
}

/// Receiver recorded on a delivered entry, if any.
pub(crate) fn receiver_of(detail: &EntryDetail) -> Option<&str> {
    match detail {
        EntryDetail::Delivered { receiver_name, .. } => Some(receiver_name),
        _ => None,
    }
}
