mod display;
mod env;
mod file_provider;
mod workflow;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use brokerstack_core::interpreter::Interpreter;
use brokerstack_core::plan::Plan;
use brokerstack_core::provider::Provider;
use brokerstack_core::providers::all_schemas;
use brokerstack_core::resolve::BindingMap;
use brokerstack_core::schema::validate_resources;
use brokerstack_provider_awscc::AwsccProvider;
use brokerstack_state::{LocalBackend, LockOperation, StateBackend, StateFile};
use brokerstack_topology::{Config, Deployment, compose};

use crate::file_provider::FileProvider;

#[derive(Parser)]
#[command(name = "brokerstack")]
#[command(about = "Provision the load-balanced serverless debugger broker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file read before the process environment
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Use only the process environment
    #[arg(long, global = true)]
    no_env_file: bool,

    /// Provisioning backend
    #[arg(long, global = true, value_enum, default_value_t = ProviderKind::Awscc)]
    provider: ProviderKind,

    /// State file path
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// AWS Cloud Control API
    Awscc,
    /// Local JSON file, for dry runs
    File,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and the composed resources
    Validate,
    /// Show execution plan without applying changes
    Plan,
    /// Apply changes to reach the desired state
    Apply,
    /// Destroy every resource recorded in state
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print the broker endpoints
    Outputs,
    /// Show stages and resource dependencies
    Graph,
    /// Remove a stale state lock
    ForceUnlock {
        /// Lock id reported by the failed command
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Validate => run_validate(&cli),
        Commands::Plan => run_plan(&cli).await,
        Commands::Apply => run_apply(&cli).await,
        Commands::Destroy { auto_approve } => run_destroy(&cli, *auto_approve).await,
        Commands::Outputs => run_outputs(&cli).await,
        Commands::Graph => run_graph(&cli),
        Commands::ForceUnlock { lock_id } => run_force_unlock(&cli, lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let env_file = (!cli.no_env_file).then_some(cli.env_file.as_path());
    let vars = env::load(env_file)?;
    Config::from_env(&vars).map_err(|e| e.to_string())
}

/// Compose the topology and check every descriptor against its schema
fn load_deployment(config: &Config) -> Result<Deployment, String> {
    let deployment = compose(config).map_err(|e| format!("Composition error: {}", e))?;
    validate_resources(&deployment.resources, &all_schemas())
        .map_err(|messages| format!("Validation failed:\n  {}", messages.join("\n  ")))?;
    Ok(deployment)
}

async fn get_provider(kind: ProviderKind, region: &str) -> Box<dyn Provider> {
    match kind {
        ProviderKind::Awscc => {
            log::info!("using Cloud Control in {}", region);
            Box::new(AwsccProvider::new(region).await)
        }
        ProviderKind::File => {
            println!("{}", "Using file-based mock provider".yellow());
            Box::new(FileProvider::new(region))
        }
    }
}

fn backend(cli: &Cli) -> LocalBackend {
    LocalBackend::with_path(cli.state.clone())
}

/// Recorded state for this stack, or a fresh one
async fn read_state(backend: &LocalBackend, config: &Config) -> Result<StateFile, String> {
    let stack = config.naming.to_string();
    let mut state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| StateFile::new(stack.as_str()));
    state.check_stack(&stack).map_err(|e| e.to_string())?;
    state.stack = stack;
    Ok(state)
}

fn run_validate(cli: &Cli) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let config = load_config(cli)?;
    let deployment = load_deployment(&config)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            deployment.resources.len()
        )
        .green()
        .bold()
    );

    for name in deployment.stage_names() {
        println!("  {}", name.bold());
        for resource in deployment.resources.iter().filter(|r| r.stage.as_deref() == Some(name)) {
            println!("    • {}", resource.id);
        }
    }

    Ok(())
}

async fn run_plan(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let deployment = load_deployment(&config)?;
    let state = read_state(&backend(cli), &config).await?;

    let plan = workflow::plan_changes(&deployment.resources, &state);
    display::print_plan(&plan, cli.verbose > 0);
    println!();
    display::print_outputs(&deployment.outputs(&config), &workflow::bindings_from_state(&state));
    Ok(())
}

async fn run_apply(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let deployment = load_deployment(&config)?;
    let backend = backend(cli);

    let lock = backend
        .acquire_lock(LockOperation::Apply)
        .await
        .map_err(|e| e.to_string())?;
    let result = apply_locked(cli, &config, &deployment, &backend).await;
    if let Err(e) = backend.release_lock(&lock).await {
        log::warn!("failed to release state lock {}: {}", lock.id, e);
    }
    result
}

async fn apply_locked(
    cli: &Cli,
    config: &Config,
    deployment: &Deployment,
    backend: &LocalBackend,
) -> Result<(), String> {
    let mut state = read_state(backend, config).await?;
    let plan = workflow::plan_changes(&deployment.resources, &state);
    workflow::forget_stale_lookups(&deployment.resources, &mut state);

    if plan.has_no_changes() {
        println!("{}", "No changes needed.".green());
        println!();
        display::print_outputs(&deployment.outputs(config), &workflow::bindings_from_state(&state));
        return Ok(());
    }

    display::print_plan(&plan, cli.verbose > 0);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let provider = get_provider(cli.provider, &config.region).await;
    let mut bindings = workflow::bindings_from_state(&state);
    let outcome = execute(provider, &plan, &mut bindings, &mut state, backend).await?;

    println!();
    match outcome {
        Ok(count) => {
            println!(
                "{}",
                format!("Apply complete! {} changes applied.", count)
                    .green()
                    .bold()
            );
            println!();
            display::print_outputs(&deployment.outputs(config), &bindings);
            Ok(())
        }
        Err((succeeded, failed)) => Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            succeeded, failed
        )),
    }
}

/// Run `plan`, report each step and persist whatever succeeded.
///
/// The inner result carries the mutation count on success, or the
/// succeeded/failed counts.
async fn execute(
    provider: Box<dyn Provider>,
    plan: &Plan,
    bindings: &mut BindingMap,
    state: &mut StateFile,
    backend: &LocalBackend,
) -> Result<Result<usize, (usize, usize)>, String> {
    let interpreter = Interpreter::new(provider);
    let result = interpreter.apply(plan, bindings).await;

    for (idx, outcome) in &result.outcomes {
        let effect = &plan.effects()[*idx];
        match outcome {
            Ok(_) if !effect.is_mutating() => {}
            Ok(_) => println!("  {} {}", "✓".green(), effect),
            Err(e) => println!("  {} {} - {}", "✗".red(), effect, e),
        }
    }

    workflow::record_outcomes(plan, &result, state);
    state.increment_serial();
    backend.write_state(state).await.map_err(|e| {
        format!(
            "Failed to write state to {}: {}",
            backend.state_path().display(),
            e
        )
    })?;

    let mutated = result
        .outcomes
        .iter()
        .filter(|(idx, r)| r.is_ok() && plan.effects()[*idx].is_mutating())
        .count();
    if result.is_success() {
        Ok(Ok(mutated))
    } else {
        Ok(Err((mutated, result.failure_count)))
    }
}

async fn run_destroy(cli: &Cli, auto_approve: bool) -> Result<(), String> {
    let config = load_config(cli)?;
    let backend = backend(cli);

    let lock = backend
        .acquire_lock(LockOperation::Destroy)
        .await
        .map_err(|e| e.to_string())?;
    let result = destroy_locked(cli, &config, &backend, auto_approve).await;
    if let Err(e) = backend.release_lock(&lock).await {
        log::warn!("failed to release state lock {}: {}", lock.id, e);
    }
    result
}

async fn destroy_locked(
    cli: &Cli,
    config: &Config,
    backend: &LocalBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state = read_state(backend, config).await?;
    let plan = workflow::plan_destroy(&state);

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".yellow());
        return Ok(());
    }

    println!("{}", "The following resources will be destroyed:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.effects().len().to_string().red()
    );
    println!();

    if !auto_approve {
        println!(
            "{}",
            format!("Do you really want to destroy the {} broker stack?", config.naming)
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let provider = get_provider(cli.provider, &config.region).await;
    let mut bindings = workflow::bindings_from_state(&state);
    let destroyed = state.teardown_order().len();
    let outcome = execute(provider, &plan, &mut bindings, &mut state, backend).await?;

    println!();
    match outcome {
        Ok(count) => {
            workflow::forget_unmanaged(&mut state);
            backend.write_state(&state).await.map_err(|e| e.to_string())?;
            println!(
                "{}",
                format!("Destroy complete! {} resources destroyed.", count)
                    .green()
                    .bold()
            );
            log::debug!("{} of {} recorded resources removed", count, destroyed);
            Ok(())
        }
        Err((succeeded, failed)) => Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            succeeded, failed
        )),
    }
}

async fn run_outputs(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let deployment = load_deployment(&config)?;
    let state = read_state(&backend(cli), &config).await?;
    display::print_outputs(&deployment.outputs(&config), &workflow::bindings_from_state(&state));
    Ok(())
}

fn run_graph(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let deployment = load_deployment(&config)?;
    display::print_graph(&deployment);
    Ok(())
}

async fn run_force_unlock(cli: &Cli, lock_id: &str) -> Result<(), String> {
    let backend = backend(cli);
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}
