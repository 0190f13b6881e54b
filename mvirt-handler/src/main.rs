//! mvirt-handler: run resource lifecycle handlers from the command line.
//!
//! - `simulate` plays the orchestrator against an in-memory remote
//! - `invoke` runs one invocation against a remote snapshot file
//! - `config` prints the effective budgets for a resource type

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvirt_handler::clients::memory::{RemoteSnapshot, ScriptedRead, TransitionStatuses};
use mvirt_handler::{
    Action, HandlerConfig, HandlerRequest, HandlerResponse, MemoryRemote, RemoteClient,
    RemoteResource, ResourceDescriptor, ResourceHandler, ResourceModel, model_for,
};

/// mvirt resource lifecycle handlers
#[derive(Parser, Debug)]
#[command(name = "mvirt-handler", version, about)]
struct Args {
    /// Handler config file (JSON) with per resource type budgets
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive one operation to completion against an in-memory remote
    Simulate(SimulateArgs),

    /// Run a single invocation against a remote snapshot
    Invoke {
        /// HandlerRequest JSON file
        #[arg(long)]
        request: PathBuf,

        /// Remote snapshot JSON file, updated in place
        #[arg(long)]
        remote: PathBuf,
    },

    /// Print the effective stabilization config
    Config {
        #[arg(long, default_value = "vm")]
        resource_type: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SimOperation {
    Create,
    Update,
    Delete,
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    #[arg(long, default_value = "vm")]
    resource_type: String,

    #[arg(long, value_enum, default_value = "create")]
    operation: SimOperation,

    /// Transient status reads before the resource settles
    #[arg(long, default_value = "2")]
    transient_polls: u32,

    /// Status the resource settles in (defaults to the first stable status)
    #[arg(long)]
    final_status: Option<String>,

    /// Deletes that fail with a deployment timeout before one succeeds
    #[arg(long, default_value = "0")]
    timeout_failures: u32,

    /// Reason reported with timed out deletes
    #[arg(long, default_value = "DEPLOYMENT_TIMEOUT: deployment exceeded its deadline")]
    failure_reason: String,

    /// Sleep for the requested resume delay between invocations
    #[arg(long)]
    honor_delay: bool,

    /// Stop after this many invocations
    #[arg(long, default_value = "1000")]
    max_invocations: u32,

    /// Override the retry budget
    #[arg(long)]
    max_retry_budget: Option<u32>,

    /// Override the timeout-retry budget
    #[arg(long)]
    max_timeout_retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvirt_handler=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => HandlerConfig::load(path)?,
        None => HandlerConfig::default(),
    };

    match args.command {
        Command::Simulate(sim) => simulate(&config, sim).await,
        Command::Invoke { request, remote } => invoke(&config, &request, &remote).await,
        Command::Config { resource_type } => {
            let model = lookup_model(&resource_type)?;
            let effective = config.resolve(&resource_type, model.default_config())?;
            println!("{}", serde_json::to_string_pretty(&effective)?);
            Ok(())
        }
    }
}

fn lookup_model(resource_type: &str) -> Result<Arc<dyn ResourceModel>> {
    match model_for(resource_type) {
        Some(model) => Ok(model),
        None => bail!("unknown resource type: {}", resource_type),
    }
}

async fn invoke(config: &HandlerConfig, request_path: &Path, remote_path: &Path) -> Result<()> {
    let data = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let request: HandlerRequest = serde_json::from_str(&data).context("parsing request")?;

    let model = lookup_model(&request.resource_type)?;
    let snapshot = if remote_path.exists() {
        RemoteSnapshot::load(remote_path)
            .with_context(|| format!("loading {}", remote_path.display()))?
    } else {
        RemoteSnapshot {
            id_prefix: model.type_name().to_string(),
            transitions: TransitionStatuses::for_type(model.type_name()),
            ..Default::default()
        }
    };

    let remote = Arc::new(MemoryRemote::from_snapshot(snapshot));
    let stabilization = config.resolve(model.type_name(), model.default_config())?;
    let handler = ResourceHandler::new(model, remote.clone(), stabilization);

    let response = handler.invoke(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    remote
        .snapshot()
        .await
        .save(remote_path)
        .with_context(|| format!("saving {}", remote_path.display()))?;
    Ok(())
}

async fn simulate(config: &HandlerConfig, sim: SimulateArgs) -> Result<()> {
    let model = lookup_model(&sim.resource_type)?;
    let mut stabilization = config.resolve(model.type_name(), model.default_config())?;
    if let Some(n) = sim.max_retry_budget {
        stabilization.max_retry_budget = n;
    }
    if let Some(n) = sim.max_timeout_retries {
        stabilization.max_timeout_retries = n;
    }
    stabilization.validate(model.type_name())?;

    let remote = Arc::new(
        MemoryRemote::new(model.type_name())
            .with_transitions(TransitionStatuses::for_type(model.type_name())),
    );
    let desired = sample_descriptor(model.type_name());
    let table = model.status_table();
    let final_status = match &sim.final_status {
        Some(s) => s.clone(),
        None => table
            .stable_success
            .first()
            .map(|s| s.to_string())
            .context("resource type has no stable status")?,
    };
    let transitions = TransitionStatuses::for_type(model.type_name());
    let transient = |status: &str| {
        (0..sim.transient_polls)
            .map(|_| ScriptedRead::status(status))
            .collect::<Vec<_>>()
    };

    let (action, desired) = match sim.operation {
        SimOperation::Create => {
            let id = format!("{}-1", model.type_name());
            remote.script_reads(&id, transient(&transitions.creating)).await;
            remote
                .script_reads(&id, [ScriptedRead::status(&final_status)])
                .await;
            (Action::Create, desired)
        }
        SimOperation::Update => {
            let seeded = seed(&remote, &desired).await?;
            remote
                .script_reads(&seeded.id, [ScriptedRead::status(&final_status)])
                .await;
            remote
                .script_reads(&seeded.id, transient(&transitions.updating))
                .await;
            remote
                .script_reads(&seeded.id, [ScriptedRead::status(&final_status)])
                .await;
            (Action::Update, desired.with_id(seeded.id))
        }
        SimOperation::Delete => {
            let seeded = seed(&remote, &desired).await?;
            remote
                .script_reads(&seeded.id, [ScriptedRead::status(&final_status)])
                .await;
            let failed_status = table.stable_failure.last().copied().unwrap_or("FAILED");
            for _ in 0..sim.timeout_failures {
                remote
                    .script_reads(&seeded.id, transient(&transitions.deleting))
                    .await;
                remote
                    .script_reads(
                        &seeded.id,
                        [ScriptedRead::failed(failed_status, &sim.failure_reason)],
                    )
                    .await;
            }
            remote
                .script_reads(&seeded.id, transient(&transitions.deleting))
                .await;
            remote
                .script_reads(&seeded.id, [ScriptedRead::Gone])
                .await;
            (Action::Delete, desired.with_id(seeded.id))
        }
    };

    let handler = ResourceHandler::new(model.clone(), remote.clone(), stabilization);
    let mut request = HandlerRequest::new(action, model.type_name(), desired);
    info!(
        "Simulating {:?} of {} (retry budget {}, timeout retries {})",
        action,
        model.type_name(),
        stabilization.max_retry_budget,
        stabilization.max_timeout_retries
    );

    for invocation in 1..=sim.max_invocations {
        let response = handler.invoke(request.clone()).await;
        print_response(invocation, &response)?;
        if response.is_terminal() {
            return Ok(());
        }
        if sim.honor_delay {
            tokio::time::sleep(Duration::from_secs(response.resume_delay_seconds.into())).await;
        }
        request = request.resume(&response);
    }

    warn!("Stopped after {} invocations", sim.max_invocations);
    Ok(())
}

async fn seed(remote: &MemoryRemote, desired: &ResourceDescriptor) -> Result<RemoteResource> {
    remote
        .create(desired, "seed")
        .await
        .context("seeding remote resource")
}

fn sample_descriptor(resource_type: &str) -> ResourceDescriptor {
    match resource_type {
        "volume" => ResourceDescriptor::named("data")
            .with_parent("default")
            .with_property("sizeBytes", 10u64 << 30),
        _ => ResourceDescriptor::named("sim")
            .with_property("cpuCores", 2u64)
            .with_property("memoryMb", 2048u64),
    }
}

fn print_response(invocation: u32, response: &HandlerResponse) -> Result<()> {
    let line = serde_json::json!({
        "invocation": invocation,
        "response": response,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
