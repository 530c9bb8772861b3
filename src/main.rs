use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gateflow::config::RuleConfig;
use gateflow::domain::Address;
use gateflow::observer::{FlowHandle, ObserverCommand, ObserverInterface};
use gateflow::state_machine::{FlowMachine, InitialContext, Step};
use gateflow::structured_logger::StructuredLogger;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "gateflow")]
#[command(about = "Validate flows against field rules and observe them through the gate cycle")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Rule configuration file (defaults to the built-in rules)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Directory for the JSONL audit log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a sample flow through one rotation of the gate cycle
    Demo,
    /// Initialize a flow from a context file and check its coherence
    Check {
        /// YAML or JSON initial context
        #[arg(long)]
        context: PathBuf,
    },
    /// Replay observer commands against a flow
    Observe {
        /// YAML or JSON initial context
        #[arg(long)]
        context: PathBuf,

        /// Observer commands, one JSON object per line (defaults to stdin)
        #[arg(long)]
        commands: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("[gateflow] Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the flow ended in good standing.
async fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.rules {
        Some(path) => RuleConfig::load(path)?,
        None => RuleConfig::default_config(),
    };
    let (machine, logger) = build_machine(&config, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Demo => run_demo(machine),
        Commands::Check { context } => run_check(machine, &context),
        Commands::Observe { context, commands } => {
            run_observe(machine, logger, &context, commands.as_deref()).await
        }
    }
}

/// Builds the machine and, with a log directory, the audit logger it writes to.
fn build_machine(
    config: &RuleConfig,
    log_dir: Option<&Path>,
) -> Result<(FlowMachine, Option<Arc<StructuredLogger>>)> {
    let (machine, _status_rx) = FlowMachine::from_config(config)?;
    let Some(dir) = log_dir else {
        return Ok((machine, None));
    };
    let flow_id = machine.context().flow_id.to_string();
    let logger = StructuredLogger::new(&flow_id, dir)
        .with_context(|| format!("Failed to open audit log in {}", dir.display()))?;
    tracing::info!(path = %logger.path().display(), "audit log opened");
    let logger = Arc::new(logger);
    Ok((machine.with_logger(logger.clone()), Some(logger)))
}

fn load_document<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

fn print_json(label: &str, value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("== {} ==\n{}", label, json);
    Ok(())
}

fn run_demo(mut machine: FlowMachine) -> Result<bool> {
    let initial = InitialContext {
        domain: "OBI-WAN".to_string(),
        credential_sequence: vec![2, 3, 5, 7, 11],
        address: Some(Address::new(
            "FIELD/node-1/011",
            "OBI-WAN/core",
            Address::temporal_marker_now(),
        )),
    };
    print_json("initialize", &machine.initialize(initial))?;
    print_json(
        "proposed transition",
        &machine.check_transition_coherence("🜂", "BERJAK"),
    )?;

    for (gate, domain) in [("🜂", "BERJAK"), ("🜄", "INFINITY"), ("🜃", "OBI-WAN")] {
        let outcome = machine.apply_step(Step::gate_transition(gate, domain));
        print_json(&format!("gate {} -> {}", gate, domain), &outcome)?;
        if !outcome.is_ok() {
            break;
        }
    }

    print_json("coherence", &machine.check_coherence())?;
    print_json("status", &machine.status())?;
    Ok(machine.state().accepts_steps())
}

fn run_check(mut machine: FlowMachine, context: &Path) -> Result<bool> {
    let initial: InitialContext = load_document(context, "context")?;
    let outcome = machine.initialize(initial);
    print_json("initialize", &outcome)?;
    if !outcome.is_ok() {
        return Ok(false);
    }

    let coherence = machine.check_coherence();
    print_json("coherence", &coherence)?;
    Ok(coherence.is_coherent())
}

async fn run_observe(
    machine: FlowMachine,
    logger: Option<Arc<StructuredLogger>>,
    context: &Path,
    commands: Option<&Path>,
) -> Result<bool> {
    let initial: InitialContext = load_document(context, "context")?;
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match commands {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open commands file: {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut observer = ObserverInterface::new(machine);
    if let Some(logger) = logger {
        observer = observer.with_logger(logger);
    }

    let (handle, join) = FlowHandle::spawn(observer).await?;
    println!("{}", serde_json::to_string(&handle.initialize(initial).await?)?);

    let mut all_succeeded = true;
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let command: ObserverCommand = serde_json::from_str(&line)
            .with_context(|| format!("Invalid observer command on line {}", line_no))?;
        let response = handle.execute(command).await?;
        all_succeeded &= response.success;
        println!("{}", serde_json::to_string(&response)?);
    }

    let status = handle.status().await?;
    handle.stop();
    join.await.context("Flow actor task failed")?;

    tracing::info!(state = %status.state, lines = line_no, "observer session finished");
    Ok(all_succeeded && status.state.accepts_steps())
}
