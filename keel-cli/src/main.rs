mod display;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};

use keel_core::differ::create_plan;
use keel_core::effect::Effect;
use keel_core::graph::{self, BindingMap};
use keel_core::interpreter::{ApplyResult, EffectOutcome, Interpreter, InterpreterConfig};
use keel_core::manifest::Manifest;
use keel_core::plan::Plan;
use keel_core::provider::{Provider, ProviderError, ResourceType};
use keel_core::resource::{Resource, ResourceId, State};
use keel_core::schema::ResourceSchema;
use keel_provider_aws::AwsProvider;
use keel_state::{BackendConfig, ResourceState, StateBackend, StateFile, create_backend};

const DEFAULT_MANIFEST: &str = "keel.json";
const PROVIDER: &str = "aws";

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Declarative AWS provisioning with side effects as values", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest
    Validate {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing resource into state
    Import {
        /// Resource address, e.g. aws_codepipeline.test
        address: String,

        /// Provider-side ID (pipeline name, role name, connection ARN, ...)
        identifier: String,

        /// Path to the manifest
        #[arg(long, short, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Read a data source or a managed resource and print its attributes
    Read {
        /// Resource address, e.g. aws_efs_mount_target.by_id
        address: String,

        /// Path to the manifest
        #[arg(long, short, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// State inspection commands
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List resources recorded in state
    List {
        #[arg(long, short, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Show the recorded attributes of one resource
    Show {
        address: String,

        #[arg(long, short, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Remove a lock left behind by an interrupted run
    Unlock {
        lock_id: String,

        #[arg(long, short, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            address,
            identifier,
            file,
        } => run_import(&file, &address, &identifier).await,
        Commands::Read { address, file } => run_read(&file, &address).await,
        Commands::State { command } => run_state_command(command).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// A loaded manifest and the directory relative paths are resolved against
struct Workspace {
    manifest: Manifest,
    base_dir: PathBuf,
}

impl Workspace {
    fn load(file: &Path) -> Result<Self, String> {
        let manifest = Manifest::load(file).map_err(|e| e.to_string())?;
        let base_dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Ok(Self { manifest, base_dir })
    }

    fn backend(&self) -> Result<Box<dyn StateBackend>, String> {
        let config = self
            .manifest
            .backend
            .as_ref()
            .map(BackendConfig::from)
            .unwrap_or_else(BackendConfig::local);
        create_backend(&config, &self.base_dir).map_err(|e| e.to_string())
    }

    async fn provider(&self) -> Result<AwsProvider, String> {
        let settings = self.manifest.provider(PROVIDER);
        AwsProvider::from_settings(
            settings.and_then(|p| p.get_str("region")),
            settings.and_then(|p| p.get_str("profile")),
        )
        .await
        .map_err(|e| e.to_string())
    }

    /// Validated resources in dependency order
    fn sorted_resources(&self) -> Result<Vec<Resource>, String> {
        validate_resources(&self.manifest.resources)?;
        graph::sort_by_dependencies(&self.manifest.resources).map_err(|e| e.to_string())
    }

    fn declared(&self, id: &ResourceId) -> Option<&Resource> {
        self.manifest.resources.iter().find(|r| &r.id == id)
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    keel_provider_aws::resource_types()
        .iter()
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let types = keel_provider_aws::resource_types();
    let mut all_errors = Vec::new();

    for resource in resources {
        let Some(resource_type) = types
            .iter()
            .find(|t| t.name() == resource.id.resource_type)
        else {
            all_errors.push(format!(
                "{}: Unknown resource type '{}'",
                resource.id, resource.id.resource_type
            ));
            continue;
        };

        let data_source = resource_type.schema().data_source;
        if data_source != resource.is_data_source() {
            let section = if data_source { "data" } else { "resource" };
            all_errors.push(format!(
                "{}: must be declared under \"{}\"",
                resource.id, section
            ));
            continue;
        }

        if let Err(errors) = resource_type.validate(resource) {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.id, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn parse_address(address: &str) -> Result<ResourceId, String> {
    match address.split_once('.') {
        Some((resource_type, name)) if !resource_type.is_empty() && !name.is_empty() => {
            Ok(ResourceId::new(resource_type, name))
        }
        _ => Err(format!(
            "Invalid address '{}', expected <type>.<name>",
            address
        )),
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let workspace = Workspace::load(file)?;

    println!("{}", "Validating...".cyan());

    let sorted = workspace.sorted_resources()?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", sorted.len())
            .green()
            .bold()
    );

    for resource in &sorted {
        println!("  • {}", resource.id);
    }

    Ok(())
}

/// Hold the state lock for the duration of `run`
async fn with_lock<T>(
    backend: &dyn StateBackend,
    operation: &str,
    run: impl Future<Output = Result<T, String>>,
) -> Result<T, String> {
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| e.to_string())?;
    debug!("acquired lock {} for {}", lock.id, operation);

    let result = run.await;

    if let Err(e) = backend.release_lock(&lock).await {
        warn!("Failed to release lock {}: {}", lock.id, e);
    }
    result
}

async fn read_state_file(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

async fn save_state(backend: &dyn StateBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state to {}: {}", backend.location(), e))
}

/// Re-read everything recorded in state.
///
/// Resources that no longer exist are dropped from `state_file`; the others
/// are updated with what was read.
async fn refresh_states<P: Provider>(
    provider: &P,
    state_file: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    for previous in state_file.states().into_values() {
        let id = previous.id.clone();
        let Some(identifier) = previous.identifier.clone() else {
            warn!("{} has no identifier recorded; dropping it from state", id);
            state_file.remove(&id);
            continue;
        };

        let state = provider
            .refresh(&id, &identifier, &previous)
            .await
            .map_err(|e| format!("Failed to refresh {}: {}", id, e))?;
        if !state.exists {
            warn!("{} was removed outside of Keel; dropping it from state", id);
            state_file.remove(&id);
            continue;
        }

        let state = if state.identifier.is_some() {
            state
        } else {
            state.with_identifier(identifier)
        };
        state_file.upsert(ResourceState::from_state(&state, PROVIDER));
        current.insert(id, state);
    }
    Ok(current)
}

/// Look up data sources whose arguments are already known
async fn read_data_sources<P: Provider>(
    provider: &P,
    sorted: &[Resource],
    known: &mut HashMap<ResourceId, State>,
) -> Result<(), String> {
    for resource in sorted.iter().filter(|r| r.is_data_source()) {
        let bindings = graph::build_bindings(sorted, known);
        let resolved = graph::resolve_resource(resource, &bindings);
        if resolved.attributes.values().any(|v| v.has_refs()) {
            debug!("{} depends on values known after apply", resource.id);
            continue;
        }
        let state = provider
            .read_data_source(&resolved)
            .await
            .map_err(|e| e.to_string())?;
        known.insert(resource.id.clone(), state);
    }
    Ok(())
}

/// Diff the declaration against refreshed state
async fn build_plan<P: Provider>(
    provider: &P,
    sorted: &[Resource],
    current: &HashMap<ResourceId, State>,
) -> Result<(Plan, BindingMap), String> {
    let mut known = current.clone();
    read_data_sources(provider, sorted, &mut known).await?;

    let bindings = graph::build_bindings(sorted, &known);
    let desired: Vec<Resource> = sorted
        .iter()
        .map(|r| graph::resolve_resource(r, &bindings))
        .collect();
    let plan = create_plan(&desired, current, &get_schemas());
    Ok((plan, bindings))
}

/// Record what each successful effect did
fn record_outcomes(state_file: &mut StateFile, plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Created { state })
            | Ok(EffectOutcome::Updated { state })
            | Ok(EffectOutcome::Replaced { state }) => {
                state_file.upsert(ResourceState::from_state(state, PROVIDER));
            }
            Ok(EffectOutcome::Deleted { id }) => {
                state_file.remove(id);
            }
            Ok(EffectOutcome::Read { .. }) | Ok(EffectOutcome::Skipped { .. }) => {}
            Err(e) => debug!("{} failed: {}", effect, e),
        }
    }
}

fn print_outcomes(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        if !effect.is_mutating() {
            continue;
        }
        match outcome {
            Ok(_) => println!("  {} {}", "✓".green(), effect),
            Err(e) => println!("  {} {} - {}", "✗".red(), effect, e),
        }
    }
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let workspace = Workspace::load(file)?;
    let sorted = workspace.sorted_resources()?;
    let backend = workspace.backend()?;
    let provider = workspace.provider().await?;

    let mut state_file = read_state_file(backend.as_ref()).await?;
    let current = refresh_states(&provider, &mut state_file).await?;
    let (plan, _) = build_plan(&provider, &sorted, &current).await?;

    display::print_plan(&plan, &get_schemas());
    Ok(())
}

async fn run_apply(file: &Path) -> Result<(), String> {
    let workspace = Workspace::load(file)?;
    let sorted = workspace.sorted_resources()?;
    let backend = workspace.backend()?;
    let provider = workspace.provider().await?;

    with_lock(backend.as_ref(), "apply", async {
        let mut state_file = read_state_file(backend.as_ref()).await?;
        let current = refresh_states(&provider, &mut state_file).await?;
        let (plan, bindings) = build_plan(&provider, &sorted, &current).await?;

        if !plan.has_changes() {
            save_state(backend.as_ref(), &mut state_file).await?;
            println!("{}", "No changes needed.".green());
            return Ok(());
        }

        display::print_plan(&plan, &get_schemas());
        println!();
        println!("{}", "Applying changes...".cyan().bold());
        println!();

        let interpreter = Interpreter::new(provider).with_bindings(bindings);
        let result = interpreter.apply(&plan).await;
        print_outcomes(&plan, &result);

        record_outcomes(&mut state_file, &plan, &result);
        save_state(backend.as_ref(), &mut state_file).await?;

        println!();
        if result.is_success() {
            println!(
                "{}",
                format!(
                    "Apply complete! {} changes applied.",
                    result.success_count
                )
                .green()
                .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "Apply failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            ))
        }
    })
    .await
}

/// Dependents before their dependencies; resources no longer declared go first
fn destroy_order(sorted: &[Resource], current: &HashMap<ResourceId, State>) -> Vec<ResourceId> {
    let declared: Vec<&ResourceId> = sorted.iter().map(|r| &r.id).collect();
    let mut undeclared: Vec<ResourceId> = current
        .keys()
        .filter(|id| !declared.contains(id))
        .cloned()
        .collect();
    undeclared.sort_by(|a, b| b.cmp(a));

    undeclared
        .into_iter()
        .chain(
            sorted
                .iter()
                .rev()
                .filter(|r| current.contains_key(&r.id))
                .map(|r| r.id.clone()),
        )
        .collect()
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
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
    println!();
    Ok(input.trim() == "yes")
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let workspace = Workspace::load(file)?;
    let sorted = workspace.sorted_resources()?;
    let backend = workspace.backend()?;
    let provider = workspace.provider().await?;

    with_lock(backend.as_ref(), "destroy", async {
        let mut state_file = read_state_file(backend.as_ref()).await?;
        let current = refresh_states(&provider, &mut state_file).await?;

        let mut plan = Plan::new();
        for id in destroy_order(&sorted, &current) {
            if let Some(from) = current.get(&id) {
                plan.add(Effect::Delete {
                    id,
                    from: from.clone(),
                });
            }
        }

        if !plan.has_changes() {
            save_state(backend.as_ref(), &mut state_file).await?;
            println!("{}", "No resources to destroy.".green());
            return Ok(());
        }

        println!("{}", "Destroy Plan:".red().bold());
        println!();
        display::print_plan(&plan, &get_schemas());
        println!();

        if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
            save_state(backend.as_ref(), &mut state_file).await?;
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }

        println!("{}", "Destroying resources...".red().bold());
        println!();

        let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        });
        let result = interpreter.apply(&plan).await;
        print_outcomes(&plan, &result);

        record_outcomes(&mut state_file, &plan, &result);
        save_state(backend.as_ref(), &mut state_file).await?;

        let destroyed: Vec<(ResourceId, String)> = result
            .outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                Ok(EffectOutcome::Deleted { id }) => current
                    .get(id)
                    .and_then(|s| s.identifier.clone())
                    .map(|identifier| (id.clone(), identifier)),
                _ => None,
            })
            .collect();
        let remaining = interpreter
            .check_destroyed(&destroyed)
            .await
            .map_err(|e| format!("Destroy check failed: {}", e))?;

        println!();
        if !remaining.is_empty() {
            let names: Vec<String> = remaining.iter().map(|id| id.to_string()).collect();
            return Err(format!(
                "Destroy check failed, still present: {}",
                names.join(", ")
            ));
        }
        if result.is_success() {
            println!(
                "{}",
                format!(
                    "Destroy complete! {} resources destroyed.",
                    result.success_count
                )
                .green()
                .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "Destroy failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            ))
        }
    })
    .await
}

async fn run_import(file: &Path, address: &str, identifier: &str) -> Result<(), String> {
    let workspace = Workspace::load(file)?;
    let id = parse_address(address)?;
    match workspace.declared(&id) {
        Some(resource) if !resource.is_data_source() => {}
        Some(_) => return Err(format!("{} is a data source and cannot be imported", id)),
        None => {
            return Err(format!(
                "{} is not declared in {}; declare it before importing",
                id,
                file.display()
            ));
        }
    }

    let backend = workspace.backend()?;
    let provider = workspace.provider().await?;

    with_lock(backend.as_ref(), "import", async {
        let mut state_file = read_state_file(backend.as_ref()).await?;
        if state_file.find(&id).is_some() {
            return Err(format!("{} is already managed", id));
        }

        let state = provider
            .import(&id, identifier)
            .await
            .map_err(|e: ProviderError| e.to_string())?;
        state_file.upsert(ResourceState::from_state(&state, PROVIDER));
        save_state(backend.as_ref(), &mut state_file).await?;

        println!(
            "{}",
            format!("Imported {} ({})", id, identifier).green().bold()
        );
        Ok(())
    })
    .await
}

async fn run_read(file: &Path, address: &str) -> Result<(), String> {
    let workspace = Workspace::load(file)?;
    let id = parse_address(address)?;
    let schemas = get_schemas();
    let backend = workspace.backend()?;
    let provider = workspace.provider().await?;
    let state_file = read_state_file(backend.as_ref()).await?;

    let state = match workspace.declared(&id) {
        Some(resource) if resource.is_data_source() => {
            let sorted = workspace.sorted_resources()?;
            let bindings = graph::build_bindings(&sorted, &state_file.states());
            let resolved = graph::resolve_resource(resource, &bindings);
            provider
                .read_data_source(&resolved)
                .await
                .map_err(|e| e.to_string())?
        }
        _ => {
            let previous = state_file
                .find(&id)
                .map(ResourceState::to_state)
                .ok_or_else(|| format!("{} is not in state", id))?;
            let identifier = previous
                .identifier
                .clone()
                .ok_or_else(|| format!("{} has no identifier recorded", id))?;
            provider
                .refresh(&id, &identifier, &previous)
                .await
                .map_err(|e| e.to_string())?
        }
    };

    if !state.exists {
        println!("{}", format!("{} no longer exists.", id).yellow());
        return Ok(());
    }
    display::print_state(&state, schemas.get(&id.resource_type));
    Ok(())
}

async fn run_state_command(command: StateCommands) -> Result<(), String> {
    match command {
        StateCommands::List { file } => {
            let workspace = Workspace::load(&file)?;
            let backend = workspace.backend()?;
            let state_file = read_state_file(backend.as_ref()).await?;
            if state_file.resources.is_empty() {
                println!("{}", "No resources in state.".yellow());
            }
            for resource in &state_file.resources {
                println!(
                    "{}  {}",
                    resource.id(),
                    resource.identifier.as_deref().unwrap_or("-").dimmed()
                );
            }
            Ok(())
        }
        StateCommands::Show { address, file } => {
            let workspace = Workspace::load(&file)?;
            let id = parse_address(&address)?;
            let backend = workspace.backend()?;
            let state_file = read_state_file(backend.as_ref()).await?;
            let resource = state_file
                .find(&id)
                .ok_or_else(|| format!("{} is not in state", id))?;
            display::print_state(&resource.to_state(), get_schemas().get(&id.resource_type));
            Ok(())
        }
        StateCommands::Unlock { lock_id, file } => {
            let workspace = Workspace::load(&file)?;
            let backend = workspace.backend()?;
            backend
                .force_unlock(&lock_id)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", format!("Lock {} removed.", lock_id).green());
            Ok(())
        }
    }
}
