//! Ionify CLI: `ionify dev` serves a project with hot updates,
//! `ionify build` produces the plan and artifacts the emitter consumes.

mod logger;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use ionify_bundler::BuildEngine;
use ionify_config::{compute_version, EngineConfig, EnvOverrides, TransformOptions};
use ionify_dev::{DevServer, DevServerConfig, DevState};
use ionify_graph::GraphStore;
use ionify_resolver::{Resolver, ResolverOptions};
use ionify_store::ContentStore;
use ionify_transform::{PassthroughTransformer, WorkerPool};

#[derive(Parser)]
#[command(name = "ionify", version, about = "Unified web build engine")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the development server
    Dev {
        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 5273)]
        port: u16,
    },
    /// Run a production build
    Build {
        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Entry modules (absolute or root-relative paths)
        entries: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose, cli.quiet, cli.no_color);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Dev { root, host, port } => run_dev(root, host, port).await,
            Command::Build { root, entries } => run_build(root, entries).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> (EngineConfig, TransformOptions) {
    let overrides = EnvOverrides::from_env();
    let mut config = EngineConfig::default();
    overrides.apply(&mut config);
    let mut options = TransformOptions::default();
    overrides.apply_transform_options(&mut options);
    (config, options)
}

async fn run_dev(root: PathBuf, host: String, port: u16) -> Result<(), String> {
    let root = root.canonicalize().map_err(|e| format!("bad root: {}", e))?;
    let (config, options) = load_config();

    let (state, watch_rx) =
        DevState::bootstrap(root, &config, &options, HashMap::new()).map_err(|e| e.to_string())?;
    info!(version = %state.version, "configuration resolved");

    let server = DevServer::new(DevServerConfig { host, port }, state, watch_rx);
    server.start().await.map_err(|e| e.to_string())
}

async fn run_build(root: PathBuf, entries: Vec<PathBuf>) -> Result<(), String> {
    let root = root.canonicalize().map_err(|e| format!("bad root: {}", e))?;
    let (config, options) = load_config();
    let version = compute_version(&config);
    ionify_config::env::export_config_hash(&version);

    let ionify_dir = root.join(".ionify");
    let graph = Arc::new(
        GraphStore::open(&ionify_dir.join("graph.db"), version.clone())
            .map_err(|e| e.to_string())?,
    );
    let resolver = Arc::new(Resolver::new(ResolverOptions::for_project(root.clone())));
    let cas = ContentStore::new(ionify_dir.join("cas"));
    let pool = Arc::new(WorkerPool::new(
        Arc::new(PassthroughTransformer),
        options,
        WorkerPool::default_size(),
        None,
    ));

    let entries: Vec<PathBuf> = entries
        .into_iter()
        .map(|e| if e.is_absolute() { e } else { root.join(e) })
        .collect();

    let engine = BuildEngine::new(version, graph.clone(), resolver, cas, pool.clone());
    let plan = engine.build(&entries).await.map_err(|e| e.to_string())?;

    graph.flush().map_err(|e| e.to_string())?;
    pool.close();

    info!(
        modules = plan.modules.len(),
        entries = plan.entries.len(),
        version = %plan.version,
        "build complete; plan ready for the emitter"
    );
    Ok(())
}
