mod config;
mod display;
mod engine;
mod state;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;

use stratus_core::interpreter::{Interpreter, InterpreterConfig};
use stratus_core::provider::{Provider, Severity};
use stratus_core::registry::Registered;
use stratus_core::resource::ResourceId;
use stratus_core::schema::{AttributeSchema, ResourceSchema};
use stratus_provider_aws::AwsProvider;
use stratus_provider_aws::services;

use crate::config::Configuration;
use crate::state::LocalState;

#[derive(Parser)]
#[command(name = "stratus", version)]
#[command(about = "Plan and apply AWS infrastructure described in JSON", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "main.json")]
    config: PathBuf,

    /// State file
    #[arg(long, global = true, default_value = "stratus.state.json")]
    state: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate,
    /// Show execution plan without applying changes
    Plan,
    /// Apply changes to reach the desired state
    Apply {
        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
        /// Walk the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Destroy every resource recorded in the state
    Destroy {
        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
        /// Walk the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Bring an existing cloud object under management
    Import {
        /// Resource type (e.g., ec2_vpc)
        resource_type: String,
        /// Name to record it under
        name: String,
        /// Cloud identifier (e.g., vpc-0abc)
        identifier: String,
    },
    /// List every object of a resource type in the configured region
    List {
        resource_type: String,
    },
    /// Show resource types, or the schema of one type
    Schema {
        resource_type: Option<String>,

        /// Show the data source schema instead
        #[arg(long)]
        data: bool,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Validate => run_validate(&cli.config).await,
        Commands::Plan => run_plan(&cli.config, &cli.state).await,
        Commands::Apply {
            auto_approve,
            dry_run,
        } => run_apply(&cli.config, &cli.state, auto_approve, dry_run).await,
        Commands::Destroy {
            auto_approve,
            dry_run,
        } => run_destroy(&cli.config, &cli.state, auto_approve, dry_run).await,
        Commands::Import {
            resource_type,
            name,
            identifier,
        } => run_import(&cli.config, &cli.state, &resource_type, &name, &identifier).await,
        Commands::List { resource_type } => run_list(&cli.config, &resource_type).await,
        Commands::Schema {
            resource_type,
            data,
        } => run_schema(resource_type.as_deref(), data),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "stratus", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn connect(config: &Configuration) -> Result<AwsProvider, String> {
    AwsProvider::new(config.provider.clone())
        .await
        .map_err(|e| format!("Failed to configure provider: {}", e))
}

/// Print every diagnostic; errors fail validation
fn validate_resources<P: Provider>(provider: &P, config: &Configuration) -> Result<(), String> {
    let mut errors = 0;
    for resource in &config.resources {
        for diagnostic in provider.validate_resource_config(resource) {
            match diagnostic.severity {
                Severity::Error => {
                    errors += 1;
                    eprintln!("{} {}", "✗".red(), diagnostic);
                }
                Severity::Warning => eprintln!("{} {}", "!".yellow(), diagnostic),
            }
        }
    }
    if errors == 0 {
        Ok(())
    } else {
        Err(format!("{} validation error(s)", errors))
    }
}

async fn run_validate(config_path: &Path) -> Result<(), String> {
    let config = config::load(config_path)?;
    let provider = connect(&config).await?;
    validate_resources(&provider, &config)?;
    println!(
        "{}",
        format!(
            "Configuration is valid ({} resources, {} data sources).",
            config.managed().count(),
            config.data_sources().count()
        )
        .green()
    );
    Ok(())
}

async fn run_plan(config_path: &Path, state_path: &Path) -> Result<(), String> {
    let config = config::load(config_path)?;
    let interpreter = Interpreter::new(connect(&config).await?);
    validate_resources(interpreter.provider(), &config)?;

    let state = LocalState::new(state_path)
        .load()
        .map_err(|e| e.to_string())?;
    let prepared = engine::prepare(&interpreter, &config, &state).await?;
    display::print_plan(&prepared.plan, &prepared.schemas);
    Ok(())
}

/// Interpreter for the mutating commands. A failed effect does not stop the
/// ones after it.
fn mutating_interpreter(provider: AwsProvider, dry_run: bool) -> Interpreter<AwsProvider> {
    Interpreter::new(provider).with_config(InterpreterConfig {
        dry_run,
        continue_on_error: true,
    })
}

async fn run_apply(
    config_path: &Path,
    state_path: &Path,
    auto_approve: bool,
    dry_run: bool,
) -> Result<(), String> {
    let config = config::load(config_path)?;
    let interpreter = mutating_interpreter(connect(&config).await?, dry_run);
    validate_resources(interpreter.provider(), &config)?;

    let store = LocalState::new(state_path);
    let _lock = store.lock("apply").map_err(|e| e.to_string())?;
    let mut state = store.load().map_err(|e| e.to_string())?;
    let mut prepared = engine::prepare(&interpreter, &config, &state).await?;

    if !dry_run {
        engine::sync_state(&mut state, &prepared.current);
        store.save(&mut state).map_err(|e| e.to_string())?;
    }

    if prepared.plan.mutation_count() == 0 {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    display::print_plan(&prepared.plan, &prepared.schemas);
    println!();
    if !dry_run && !auto_approve && !confirm("Do you want to perform these actions?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    if dry_run {
        println!("{}", "Dry run, nothing will be changed.".yellow().bold());
    } else {
        println!("{}", "Applying changes...".cyan().bold());
    }
    println!();
    let result = engine::apply(
        &interpreter,
        &prepared.plan,
        &mut prepared.bindings,
        &mut state,
        &store,
    )
    .await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
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
}

async fn run_destroy(
    config_path: &Path,
    state_path: &Path,
    auto_approve: bool,
    dry_run: bool,
) -> Result<(), String> {
    let config = config::load(config_path)?;
    let interpreter = mutating_interpreter(connect(&config).await?, dry_run);

    let store = LocalState::new(state_path);
    let _lock = store.lock("destroy").map_err(|e| e.to_string())?;
    let mut state = store.load().map_err(|e| e.to_string())?;
    let current = engine::refresh(interpreter.provider(), &state).await?;
    if !dry_run {
        engine::sync_state(&mut state, &current);
        store.save(&mut state).map_err(|e| e.to_string())?;
    }

    let plan = engine::destroy_plan(&config, &current);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !dry_run
        && !auto_approve
        && !confirm("Do you really want to destroy all resources? This cannot be undone.")?
    {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    if dry_run {
        println!("{}", "Dry run, nothing will be changed.".yellow().bold());
    } else {
        println!("{}", "Destroying resources...".red().bold());
    }
    println!();
    let mut bindings = config::Bindings::default();
    let result = engine::apply(&interpreter, &plan, &mut bindings, &mut state, &store).await?;

    println!();
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
}

async fn run_import(
    config_path: &Path,
    state_path: &Path,
    resource_type: &str,
    name: &str,
    identifier: &str,
) -> Result<(), String> {
    let config = config::load(config_path)?;
    let provider = connect(&config).await?;

    let store = LocalState::new(state_path);
    let _lock = store.lock("import").map_err(|e| e.to_string())?;
    let mut state = store.load().map_err(|e| e.to_string())?;
    let id = ResourceId::new(resource_type, name);
    if let Some(existing) = state.find_resource(&id) {
        return Err(format!(
            "{} is already managed (identifier {})",
            id, existing.identifier
        ));
    }

    let imported = provider
        .import(&id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    state.upsert(&imported);
    store.save(&mut state).map_err(|e| e.to_string())?;
    println!("{} imported {} ({})", "✓".green(), id, identifier);
    Ok(())
}

async fn run_list(config_path: &Path, resource_type: &str) -> Result<(), String> {
    let config = config::load(config_path)?;
    let provider = connect(&config).await?;
    let states = provider
        .list(resource_type)
        .await
        .map_err(|e| e.to_string())?;

    if states.is_empty() {
        println!("No {} found.", resource_type);
        return Ok(());
    }
    for state in states {
        let attributes: BTreeMap<_, _> = state
            .attributes
            .iter()
            .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
            .collect();
        println!(
            "{} {}",
            state.identifier.as_deref().unwrap_or("-").cyan().bold(),
            serde_json::to_string(&attributes).map_err(|e| e.to_string())?
        );
    }
    Ok(())
}

/// Schemas come from the handler registry so no provider configuration is needed
fn run_schema(resource_type: Option<&str>, data: bool) -> Result<(), String> {
    let registry = services::registry().map_err(|e| e.to_string())?;

    let Some(resource_type) = resource_type else {
        println!("{}", "Resource types:".cyan().bold());
        for t in registry.resource_types() {
            println!("  {} ({})", t, registry.service_of(&t).unwrap_or("-"));
        }
        println!();
        println!("{}", "Data sources:".cyan().bold());
        for t in registry.data_source_types() {
            println!("  {}", t);
        }
        return Ok(());
    };

    let handler = if data {
        registry.data_source(resource_type)
    } else {
        registry.resource(resource_type)
    };
    let handler = handler.ok_or_else(|| format!("Unknown type '{}'", resource_type))?;
    print_schema(handler.schema());
    Ok(())
}

fn print_schema(schema: &ResourceSchema) {
    println!("{}", schema.resource_type.cyan().bold());
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!();

    let attributes: BTreeMap<&String, &AttributeSchema> = schema.attributes.iter().collect();
    for (name, attr) in attributes {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required");
        } else if attr.is_computed_only() {
            flags.push("computed");
        } else {
            flags.push("optional");
        }
        if attr.force_new {
            flags.push("forces replacement");
        }
        if attr.sensitive {
            flags.push("sensitive");
        }
        println!("  {}: {} ({})", name.bold(), attr.attr_type, flags.join(", "));
        if let Some(default) = &attr.default {
            println!("      default: {}", display::display_value(default, false));
        }
        if let Some(description) = &attr.description {
            println!("      {}", description.dimmed());
        }
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}
