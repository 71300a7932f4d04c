//! CLI command handlers. This is the caller side of the core: it resolves
//! user input to explicit ids, confirms destructive operations and renders
//! results, while every data rule lives in the manager and below.

use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{Cli, Command, EndpointCommand};
use crate::config::Endpoint;
use crate::core::{template, ExecutionRecord, Outcome, RecordId, VersionId};
use crate::errors::{Error, Result};
use crate::manager::PromptManager;

/// Environment variable consulted when `endpoint add` is not given a key.
const API_KEY_ENV: &str = "PROMPTDECK_API_KEY";

/// Runs the parsed command against a manager opened on the data directory.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let mut manager = PromptManager::open(&data_dir)?;

    match cli.command {
        Command::List => list_tasks(&manager),
        Command::Create { name } => create_task(&mut manager, &name),
        Command::Rename { task, name } => {
            let id = manager.resolve_task(&task)?;
            manager.rename_task(id, &name)?;
            println!("Renamed to '{}'", name);
            Ok(())
        }
        Command::Delete { task, yes } => delete_task(&mut manager, &task, yes),
        Command::Show { task } => show_task(&manager, &task),
        Command::NewVersion {
            task,
            description,
            system,
            user,
        } => {
            let id = manager.resolve_task(&task)?;
            let version = manager.create_version(
                id,
                &description,
                system.as_deref().unwrap_or(""),
                user.as_deref().unwrap_or(""),
            )?;
            println!("Created {}", version.id.to_string().bold());
            Ok(())
        }
        Command::Amend {
            task,
            description,
            system,
            user,
        } => {
            let id = manager.resolve_task(&task)?;
            manager.amend_active(id, description.as_deref(), system.as_deref(), user.as_deref())?;
            let task = manager.task(id)?;
            println!("Saved {} of '{}'", task.active_version().id, task.name);
            Ok(())
        }
        Command::SetVar { task, name, value } => {
            let id = manager.resolve_task(&task)?;
            manager.set_variable_default(id, &name, &value)?;
            println!("Set {{{{{}}}}} = {}", name, value);
            Ok(())
        }
        Command::Vars { task } => show_variables(&manager, &task),
        Command::Run {
            task,
            version,
            vars,
        } => run_prompt(&mut manager, &task, version, vars).await,
        Command::History {
            task,
            version,
            limit,
            offset,
        } => show_history(&manager, &task, version, offset, limit),
        Command::Result { record } => show_record(&manager, &record),
        Command::Endpoint(cmd) => endpoint_command(&mut manager, cmd),
    }
}

/// Platform data directory, falling back to a local `data` directory.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("promptdeck"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn list_tasks(manager: &PromptManager) -> Result<()> {
    let tasks = manager.list_tasks();
    if tasks.is_empty() {
        println!("No tasks yet. Create one with 'promptdeck create <name>'.");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{}  {}  {} versions, modified {}",
            task.name.bold(),
            task.id.to_string().dimmed(),
            task.versions().len(),
            task.modified_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn create_task(manager: &mut PromptManager, name: &str) -> Result<()> {
    if manager.name_in_use(name.trim()) {
        println!(
            "{}",
            format!("Warning: another task is already named '{}'", name.trim()).yellow()
        );
    }
    let task = manager.create_task(name)?;
    println!("Created task '{}' ({})", task.name.bold(), task.id);
    Ok(())
}

fn delete_task(manager: &mut PromptManager, selector: &str, yes: bool) -> Result<()> {
    let id = manager.resolve_task(selector)?;
    let name = manager.task(id)?.name.clone();

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete task '{}'? This will remove all versions and results.",
                name
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    manager.delete_task(id)?;
    println!("Deleted task '{}'", name);
    Ok(())
}

fn show_task(manager: &PromptManager, selector: &str) -> Result<()> {
    let id = manager.resolve_task(selector)?;
    let task = manager.task(id)?;

    println!("{}  {}", task.name.bold(), task.id.to_string().dimmed());
    println!(
        "created {}, modified {}",
        task.created_at.format("%Y-%m-%d %H:%M"),
        task.modified_at.format("%Y-%m-%d %H:%M")
    );

    println!("\n{}", "Versions:".bold());
    let active_id = task.active_version().id;
    for version in task.versions() {
        let marker = if version.id == active_id { "*" } else { " " };
        println!(
            " {} {}  {}  {}",
            marker,
            version.id,
            version.created_at.format("%Y-%m-%d %H:%M"),
            version.description
        );
    }

    if !task.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        let mut names: Vec<&String> = task.variables.keys().collect();
        names.sort();
        for name in names {
            println!("  {{{{{}}}}} = {}", name, task.variables[name]);
        }
    }

    let active = task.active_version();
    if !active.system_prompt.is_empty() {
        println!("\n{}\n{}", "System prompt:".bold(), active.system_prompt);
    }
    if !active.user_prompt.is_empty() {
        println!("\n{}\n{}", "User prompt:".bold(), active.user_prompt);
    }
    Ok(())
}

/// The Variables view: placeholders across every version of the task, which
/// versions use them, current defaults and a rendered preview of the active
/// version.
fn show_variables(manager: &PromptManager, selector: &str) -> Result<()> {
    let id = manager.resolve_task(selector)?;
    let task = manager.task(id)?;
    let active = task.active_version();

    let current = template::extract_from_prompts(&active.system_prompt, &active.user_prompt);
    let mut usage: HashMap<String, Vec<VersionId>> = HashMap::new();
    for version in task.versions() {
        for name in template::extract_from_prompts(&version.system_prompt, &version.user_prompt) {
            usage.entry(name).or_default().push(version.id);
        }
    }

    if usage.is_empty() {
        println!("No variables found in any version of this task");
        return Ok(());
    }

    let mut names: Vec<&String> = usage.keys().collect();
    names.sort();
    for name in names {
        let value = task
            .variables
            .get(name.as_str())
            .map(String::as_str)
            .unwrap_or("");
        let label = format!("{{{{{}}}}}", name);
        if current.contains(name.as_str()) {
            println!("  {} = {}", label.bold(), value);
        } else {
            let versions = usage[name.as_str()]
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("  {} = {}  ({})", label.dimmed(), value, versions.dimmed());
        }
    }

    println!("\n{}", "Preview:".bold());
    println!(
        "System: {}\n\nUser: {}",
        template::render(&active.system_prompt, &task.variables),
        template::render(&active.user_prompt, &task.variables)
    );
    Ok(())
}

async fn run_prompt(
    manager: &mut PromptManager,
    selector: &str,
    version: Option<u32>,
    vars: Vec<(String, String)>,
) -> Result<()> {
    let id = manager.resolve_task(selector)?;
    let version = version.map(VersionId);
    let overrides: HashMap<String, String> = vars.into_iter().collect();

    let model = manager
        .endpoints()
        .active_endpoint()
        .map(|e| e.model.clone())
        .unwrap_or_default();

    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Running against {}...", model));

    let outcome = manager.execute(id, version, &overrides).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(record) => {
            print_outcome(&record);
            Ok(())
        }
        Err(Error::Busy { version, .. }) => {
            println!(
                "{}",
                format!("An execution is already running for {}", version).yellow()
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn print_outcome(record: &ExecutionRecord) {
    match &record.outcome {
        Outcome::Success { response, usage } => {
            println!("{}", "Success".green().bold());
            println!("{}", response);
            if let Some(usage) = usage {
                if let Some(total) = usage.total_tokens {
                    println!("{}", format!("({} tokens)", total).dimmed());
                }
            }
        }
        Outcome::Failure { kind, message } => {
            println!("{} - {}", format!("{}", kind).red().bold(), kind.advice());
            println!("{}", message);
        }
    }
    println!("{}", format!("record {}", record.id).dimmed());
}

fn show_history(
    manager: &PromptManager,
    selector: &str,
    version: Option<u32>,
    offset: usize,
    limit: usize,
) -> Result<()> {
    let id = manager.resolve_task(selector)?;
    let records = manager.history(id, version.map(VersionId), offset, limit)?;
    if records.is_empty() {
        println!("No executions recorded for this version.");
        return Ok(());
    }

    for record in records {
        let (status, preview) = match &record.outcome {
            Outcome::Success { response, .. } => (
                "ok".green(),
                response.chars().take(50).collect::<String>().replace('\n', " "),
            ),
            Outcome::Failure { kind, message } => (
                format!("{}", kind).red(),
                message.chars().take(50).collect::<String>().replace('\n', " "),
            ),
        };
        println!(
            "{}  {}  {}  {}...  {}",
            record.executed_at.format("%Y-%m-%d %H:%M:%S"),
            record.model,
            status,
            preview,
            record.id.to_string().dimmed()
        );
    }
    Ok(())
}

fn show_record(manager: &PromptManager, selector: &str) -> Result<()> {
    let record = manager.record(RecordId::parse(selector)?)?;

    println!("Executed At: {}", record.executed_at.to_rfc3339());
    println!("Model: {}", record.model);
    println!("Version: {}", record.version);
    println!(
        "\nInput Variables:\n{}",
        serde_json::to_string_pretty(&record.inputs)?
    );
    println!("\nRendered Prompt:\n{}", record.rendered_prompt);
    match &record.outcome {
        Outcome::Success { response, usage } => {
            println!("\nResponse:\n{}", response);
            if let Some(usage) = usage {
                println!("\nToken Usage: {:?}", usage);
            }
        }
        Outcome::Failure { kind, message } => {
            println!("\nError ({}): {}", kind, message);
        }
    }
    Ok(())
}

fn endpoint_command(manager: &mut PromptManager, cmd: EndpointCommand) -> Result<()> {
    match cmd {
        EndpointCommand::Add {
            name,
            base_url,
            model,
            api_key,
            inactive,
        } => {
            let api_key = api_key
                .or_else(|| std::env::var(API_KEY_ENV).ok())
                .ok_or_else(|| {
                    Error::validation(format!(
                        "pass --api-key or set the {} environment variable",
                        API_KEY_ENV
                    ))
                })?;
            manager.add_endpoint(Endpoint {
                name: name.clone(),
                base_url,
                api_key,
                model,
                active: !inactive,
            })?;
            println!("Added endpoint '{}'", name.bold());
            Ok(())
        }
        EndpointCommand::Use { name } => {
            manager.use_endpoint(&name)?;
            println!("Active endpoint is now '{}'", name.bold());
            Ok(())
        }
        EndpointCommand::List => {
            let config = manager.endpoints();
            if config.endpoints.is_empty() {
                println!("No endpoints configured. Add one with 'promptdeck endpoint add'.");
                return Ok(());
            }
            for endpoint in &config.endpoints {
                let marker = if endpoint.active {
                    "[ACTIVE]".green().to_string()
                } else {
                    "        ".to_string()
                };
                println!(
                    "{} {} - {} - {}",
                    marker,
                    endpoint.name.bold(),
                    endpoint.model,
                    endpoint.base_url
                );
            }
            Ok(())
        }
    }
}
