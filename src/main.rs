use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use flowroom_config::RoomDocument;
use flowroom_gateway::GatewayServer;
use flowroom_host_http::HttpPolicy;
use flowroom_store::{HttpStore, HttpStoreConfig, SharedState, SharedStateClient, SqliteStore};
use flowroom_task_runtime::{Capabilities, ScriptExecutor};
use flowroom_task_runtime_lua::{LuaScriptExecutor, SandboxLimits};
use flowroom_workflow_orchestrator::{
  CallerWorker, ExecutionEvent, ExecutionNotifier, FlowOrchestrator, OrchestratorConfig,
  TraversalPolicy,
};

mod logging;

/// flowroom - run the script nodes of a collaborative canvas
#[derive(Parser)]
#[command(name = "flowroom")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.flowroom)
  #[arg(long, global = true, env = "FLOWROOM_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// SQLite database URL (default: sqlite://<data-dir>/flowroom.db)
  #[arg(long, global = true, env = "FLOWROOM_DATABASE_URL")]
  database_url: Option<String>,

  /// Base URL of the collaboration backend. When set, rooms are read from
  /// and written to it instead of the local database.
  #[arg(long, global = true, env = "FLOWROOM_STORE_URL")]
  store_url: Option<url::Url>,

  /// Secret used to authenticate against the collaboration backend
  #[arg(long, global = true, env = "FLOWROOM_STORE_SECRET", hide_env_values = true)]
  store_secret: Option<String>,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(flatten)]
  engine: EngineArgs,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct EngineArgs {
  /// Maximum executions of one node per run
  #[arg(long, global = true, default_value_t = 10)]
  per_node_cap: usize,

  /// Maximum executions of all nodes per run
  #[arg(long, global = true, default_value_t = 100)]
  global_cap: usize,

  /// How long to wait for a caller-mode node, in milliseconds
  #[arg(long, global = true, default_value_t = 60_000)]
  caller_timeout_ms: u64,

  /// Interval between caller-mode polls, in milliseconds
  #[arg(long, global = true, default_value_t = 500)]
  poll_interval_ms: u64,

  /// Wall-clock limit for one script, in milliseconds
  #[arg(long, global = true, default_value_t = 5_000)]
  script_timeout_ms: u64,

  /// Execute each node at most once per run
  #[arg(long, global = true)]
  visit_once: bool,
}

impl EngineArgs {
  fn orchestrator_config(&self) -> OrchestratorConfig {
    OrchestratorConfig {
      per_node_cap: self.per_node_cap,
      global_cap: self.global_cap,
      caller_poll_interval: Duration::from_millis(self.poll_interval_ms),
      caller_timeout: Duration::from_millis(self.caller_timeout_ms),
      traversal_policy: if self.visit_once {
        TraversalPolicy::VisitOnce
      } else {
        TraversalPolicy::CycleTolerant
      },
      ..Default::default()
    }
  }

  fn sandbox_limits(&self) -> SandboxLimits {
    SandboxLimits {
      timeout: Duration::from_millis(self.script_timeout_ms),
      ..Default::default()
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the HTTP gateway
  Serve {
    /// Address to listen on
    #[arg(long, env = "FLOWROOM_BIND", default_value = "127.0.0.1:3000")]
    bind: String,
  },

  /// Run a flow or a single node
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Execute caller-mode nodes of a room until interrupted
  Worker {
    #[arg(long)]
    room: String,
  },

  /// Seed a room in the local database from a document file
  Import {
    #[arg(long)]
    room: String,

    /// Path to the room document (JSON)
    document_file: PathBuf,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run a flow starting at a node
  Flow {
    #[arg(long)]
    room: String,

    /// The node the flow starts at
    #[arg(long)]
    start: String,
  },

  /// Run a single node; its input JSON is read from stdin
  Node {
    #[arg(long)]
    room: String,

    /// The node ID to execute
    #[arg(long)]
    node: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init_logging(cli.verbose);

  let Some(command) = cli.command.as_ref() else {
    println!("flowroom - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Serve { bind } => serve(&cli, bind).await,
      Commands::Run { target } => match target {
        RunTarget::Flow { room, start } => run_flow(&cli, room, start).await,
        RunTarget::Node { room, node } => run_node(&cli, room, node).await,
      },
      Commands::Worker { room } => run_worker(&cli, room).await,
      Commands::Import {
        room,
        document_file,
      } => import(&cli, room, document_file).await,
    }
  })
}

async fn serve(cli: &Cli, bind: &str) -> Result<()> {
  let orchestrator = Arc::new(build_orchestrator(cli).await?);
  let server = GatewayServer::new(bind, orchestrator);

  let cancel = shutdown_on_ctrl_c();
  server.run(cancel).await.context("gateway failed")?;
  Ok(())
}

async fn run_flow(cli: &Cli, room: &str, start: &str) -> Result<()> {
  let orchestrator = build_orchestrator(cli)
    .await?
    .with_notifier(Arc::new(ProgressNotifier));

  let outcome = orchestrator
    .execute_flow(room, start)
    .await
    .context("flow execution failed")?;

  eprintln!(
    "Flow {} finished: {} ({} nodes executed)",
    outcome.execution_id,
    if outcome.success { "success" } else { "error" },
    outcome.nodes_executed
  );
  println!("{}", serde_json::to_string_pretty(&outcome)?);

  Ok(())
}

async fn run_node(cli: &Cli, room: &str, node: &str) -> Result<()> {
  let input = read_input_from_stdin()?;
  let orchestrator = build_orchestrator(cli).await?;

  let outcome = orchestrator
    .execute_single_node(room, node, input)
    .await
    .context("node execution failed")?;

  println!("{}", serde_json::to_string_pretty(&outcome)?);
  Ok(())
}

async fn run_worker(cli: &Cli, room: &str) -> Result<()> {
  let store = open_store(cli).await?;
  let worker = CallerWorker::new(
    SharedStateClient::new(store),
    build_executor(cli)?,
    Duration::from_millis(cli.engine.poll_interval_ms),
  );

  eprintln!("Watching room {} for caller-mode nodes (Ctrl-C to stop)", room);
  worker.run(room, shutdown_on_ctrl_c()).await;
  Ok(())
}

async fn import(cli: &Cli, room: &str, document_file: &Path) -> Result<()> {
  let content = tokio::fs::read_to_string(document_file)
    .await
    .with_context(|| format!("failed to read document file: {}", document_file.display()))?;

  let document: RoomDocument = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse document file: {}", document_file.display()))?;

  let store = open_sqlite(cli).await?;
  store
    .put_document(room, &document)
    .await
    .context("failed to store room document")?;

  eprintln!(
    "Imported room {} ({} nodes, {} edges)",
    room,
    document.nodes.len(),
    document.edges.len()
  );
  Ok(())
}

async fn build_orchestrator(cli: &Cli) -> Result<FlowOrchestrator> {
  let store = open_store(cli).await?;
  let executor = build_executor(cli)?;
  Ok(FlowOrchestrator::new(
    store,
    executor,
    cli.engine.orchestrator_config(),
  ))
}

fn build_executor(cli: &Cli) -> Result<Arc<dyn ScriptExecutor>> {
  let capabilities = Capabilities::with_http_policy(HttpPolicy::default())
    .context("failed to create http client")?;
  Ok(Arc::new(LuaScriptExecutor::new(
    capabilities,
    cli.engine.sandbox_limits(),
  )))
}

/// The collaboration backend when configured, else the local database.
async fn open_store(cli: &Cli) -> Result<Arc<dyn SharedState>> {
  match &cli.store_url {
    Some(url) => {
      let secret = cli
        .store_secret
        .clone()
        .context("FLOWROOM_STORE_SECRET is required when a store URL is set")?;
      let store = HttpStore::new(HttpStoreConfig::new(url.clone(), secret))
        .context("failed to create store client")?;
      Ok(Arc::new(store))
    }
    None => Ok(Arc::new(open_sqlite(cli).await?)),
  }
}

async fn open_sqlite(cli: &Cli) -> Result<SqliteStore> {
  let url = match &cli.database_url {
    Some(url) => url.clone(),
    None => {
      let data_dir = data_dir(cli)?;
      tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
      format!("sqlite://{}", data_dir.join("flowroom.db").display())
    }
  };

  SqliteStore::connect(&url)
    .await
    .with_context(|| format!("failed to open database: {}", url))
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
  match &cli.data_dir {
    Some(dir) => Ok(dir.clone()),
    None => Ok(
      dirs::home_dir()
        .context("could not determine home directory")?
        .join(".flowroom"),
    ),
  }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });
  cancel
}

/// Prints run progress to stderr.
struct ProgressNotifier;

impl ExecutionNotifier for ProgressNotifier {
  fn notify(&self, event: ExecutionEvent) {
    match event {
      ExecutionEvent::FlowStarted {
        execution_id,
        start_node_id,
        ..
      } => eprintln!("Flow {} started at {}", execution_id, start_node_id),
      ExecutionEvent::NodeStarted { node_id, .. } => eprintln!("  running {}", node_id),
      ExecutionEvent::NodeCompleted { node_id, .. } => eprintln!("  {} done", node_id),
      ExecutionEvent::NodeFailed { node_id, error, .. } => {
        eprintln!("  {} failed: {}", node_id, error)
      }
      ExecutionEvent::FlowCompleted { .. } => {}
    }
  }
}

fn read_input_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::Value::Null);
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::Value::Null)
  } else {
    serde_json::from_str(&input).context("failed to parse input JSON from stdin")
  }
}
