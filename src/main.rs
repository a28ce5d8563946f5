use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use promptkeep::models::template;
use promptkeep::optimize::FEW_SHOT;
use promptkeep::search::{self, SearchOutcome};
use promptkeep::{
    BatchOptions, HttpCompletionClient, ModelConfig, OptimizationEngine, Project, ProjectConfig, Prompt,
    PromptId, PromptStorage,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to start looking for the project from
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a project in the given directory
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show or change project configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage prompts
    #[command(subcommand)]
    Prompt(PromptCommand),
    /// Manage prompt version history
    #[command(subcommand)]
    Version(VersionCommand),
    /// Improve a prompt with an optimization strategy and save the result
    Optimize {
        id: PromptId,
        #[arg(long, default_value = FEW_SHOT)]
        strategy: String,
        /// JSONL dataset (defaults to .promptkeep/dataset.jsonl)
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Base URL for the `openai` and `openai-compatible` providers
        #[arg(long, env = "PROMPTKEEP_OPENAI_BASE_URL")]
        openai_base_url: Option<String>,
    },
    /// Optimize and save every prompt in the project
    OptimizeAll {
        #[arg(long, default_value = FEW_SHOT)]
        strategy: String,
        /// JSONL dataset (defaults to .promptkeep/dataset.jsonl)
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Maximum optimization rounds per prompt
        #[arg(long = "max-iter", default_value_t = 1)]
        max_iterations: usize,
        /// Show what would be optimized without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Base URL for the `openai` and `openai-compatible` providers
        #[arg(long, env = "PROMPTKEEP_OPENAI_BASE_URL")]
        openai_base_url: Option<String>,
    },
    /// Manage the model registry
    #[command(subcommand)]
    Model(ModelCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// Set a key, e.g. `auto_version false` or `optimization.max_demos 2`
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum PromptCommand {
    List,
    Show {
        id: PromptId,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,
        #[arg(long)]
        template_file: Option<PathBuf>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Registry model overriding the project default
        #[arg(long)]
        model: Option<String>,
        /// Explicit id instead of the next sequential one
        #[arg(long)]
        id: Option<PromptId>,
    },
    Update {
        id: PromptId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,
        #[arg(long)]
        template_file: Option<PathBuf>,
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Fuzzy search prompts by name, description and template
    Find {
        query: String,
    },
    /// Delete a prompt and all its versions
    Delete {
        id: PromptId,
    },
    /// Render a prompt with variables from a JSON file and/or --var pairs
    Render {
        id: PromptId,
        #[arg(long)]
        vars: Option<PathBuf>,
        #[arg(long = "var", value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VersionCommand {
    History {
        id: PromptId,
    },
    Show {
        id: PromptId,
        version: u32,
    },
    Snapshot {
        id: PromptId,
        #[arg(short, long)]
        message: Option<String>,
    },
    Restore {
        id: PromptId,
        version: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ModelCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        model: String,
        /// Inferred from the model identifier when omitted
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        api_key_env: Option<String>,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        #[arg(long, default_value_t = 1024)]
        max_tokens: u32,
        /// Also make this the project default
        #[arg(long)]
        default: bool,
    },
    Remove {
        name: String,
    },
    SetDefault {
        name: String,
    },
}

struct Workspace {
    project: Project,
    config: ProjectConfig,
}

impl Workspace {
    async fn open(dir: &Path) -> Result<Self> {
        let project = Project::discover(dir)
            .context("Not in a promptkeep project. Run `promptkeep init` first")?;
        let config = project.load_config().await?;
        Ok(Self { project, config })
    }

    fn storage(&self) -> promptkeep::FileSystemStorage {
        self.project.storage(&self.config)
    }

    fn engine(&self, openai_base_url: Option<String>) -> OptimizationEngine {
        let mut client = HttpCompletionClient::new();
        if let Some(url) = openai_base_url {
            client = client.with_openai_base_url(url);
        }
        OptimizationEngine::with_builtins(Arc::new(client), &self.config.optimization)
    }

    /// Snapshot before a mutation when the project asks for it.
    async fn auto_snapshot(&self, id: &PromptId, message: String) -> Result<Option<u32>> {
        if !self.config.auto_version {
            return Ok(None);
        }
        let version = self.storage().create_snapshot(id, Some(message)).await?;
        Ok(Some(version.version))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Use `RUST_LOG=promptkeep=debug` to see storage and optimization details
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(args = ?cli, "Starting promptkeep");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { path } => {
            let path = path.unwrap_or(cli.dir);
            let project = Project::init(&path).await?;
            println!("Initialized promptkeep in {}", project.marker_dir().display());
            Ok(())
        }
        Command::Config(cmd) => config_command(&cli.dir, cmd).await,
        Command::Prompt(cmd) => prompt_command(&cli.dir, cmd).await,
        Command::Version(cmd) => version_command(&cli.dir, cmd).await,
        Command::Optimize {
            id,
            strategy,
            dataset,
            openai_base_url,
        } => {
            let ws = Workspace::open(&cli.dir).await?;
            let engine = ws.engine(openai_base_url);

            // Fail on unknown names before taking a snapshot.
            engine.strategies().get(&strategy)?;
            let storage = ws.storage();
            storage.load_prompt(&id).await?;
            let snapshot = ws
                .auto_snapshot(&id, format!("Before optimization: strategy={}", strategy))
                .await?;

            let optimized = engine
                .optimize_in(&ws.project, &id, &strategy, dataset.as_deref())
                .await
                .context("Optimization failed")?;
            storage.save_prompt(&optimized).await?;

            match snapshot {
                Some(v) => println!("Optimized prompt {} (previous state saved as v{})", id, v),
                None => println!("Optimized prompt {}", id),
            }
            Ok(())
        }
        Command::OptimizeAll {
            strategy,
            dataset,
            max_iterations,
            dry_run,
            openai_base_url,
        } => {
            let ws = Workspace::open(&cli.dir).await?;
            let engine = ws.engine(openai_base_url);
            let options = BatchOptions {
                strategy,
                dataset_path: dataset,
                max_iterations,
                dry_run,
            };
            let outcomes = engine.optimize_all(&ws.project, &options).await?;
            if outcomes.is_empty() {
                bail!("No prompts found");
            }

            println!("Optimization summary:");
            for outcome in &outcomes {
                println!("  {}: {} -> {}", outcome.id, outcome.name, outcome.status);
            }
            Ok(())
        }
        Command::Model(cmd) => model_command(&cli.dir, cmd).await,
    }
}

async fn config_command(dir: &Path, cmd: ConfigCommand) -> Result<()> {
    let mut ws = Workspace::open(dir).await?;
    match cmd {
        ConfigCommand::Show => {
            print!("{}", serde_yaml_ng::to_string(&ws.config)?);
        }
        ConfigCommand::Set { key, value } => {
            ws.config.set_key(&key, &value)?;
            ws.project.save_config(&ws.config).await?;
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}

async fn read_template(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .map(|text| Some(text.trim_end().to_string()))
            .with_context(|| format!("Failed to read template file {}", path.display())),
        (None, None) => Ok(None),
    }
}

fn print_prompt(prompt: &Prompt) {
    println!("ID: {}", prompt.id);
    println!("Name: {}", prompt.name);
    println!("Description: {}", prompt.description.as_deref().unwrap_or("-"));
    if !prompt.tags.is_empty() {
        println!("Tags: {}", prompt.tags.join(", "));
    }
    if let Some(model) = &prompt.model_name {
        println!("Model: {}", model);
    }
    println!("Updated: {}", prompt.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Template:\n{}", prompt.template);
}

fn preview(prompt: &Prompt) -> String {
    if let Some(description) = &prompt.description {
        return description.clone();
    }
    let first_line = prompt.template.lines().next().unwrap_or_default();
    match first_line.char_indices().nth(40) {
        Some((cut, _)) => format!("{}...", &first_line[..cut]),
        None => first_line.to_string(),
    }
}

async fn prompt_command(dir: &Path, cmd: PromptCommand) -> Result<()> {
    let ws = Workspace::open(dir).await?;
    let storage = ws.storage();
    match cmd {
        PromptCommand::List => {
            let prompts = storage.list_prompts().await?;
            if prompts.is_empty() {
                println!("No prompts yet. Create one with `promptkeep prompt create`.");
            }
            for p in prompts {
                println!("{:<8} {:<32} {}", p.id, p.name, p.updated_at.format("%Y-%m-%d %H:%M"));
            }
        }
        PromptCommand::Show { id } => print_prompt(&storage.load_prompt(&id).await?),
        PromptCommand::Create {
            name,
            description,
            template,
            template_file,
            tags,
            model,
            id,
        } => {
            let Some(template) = read_template(template, template_file).await? else {
                bail!("A template is required (--template or --template-file)");
            };
            let id = match id {
                Some(id) => {
                    if storage.get_prompt(&id).await?.is_some() {
                        bail!("Prompt {} already exists", id);
                    }
                    id
                }
                None => storage.next_id().await?,
            };
            let mut prompt = Prompt::new(id, name, template)?.with_tags(tags);
            if let Some(description) = description {
                prompt = prompt.with_description(description);
            }
            if let Some(model) = model {
                prompt = prompt.with_model(model);
            }
            storage.save_prompt(&prompt).await?;
            println!("Created prompt {}: {}", prompt.id, prompt.name);
        }
        PromptCommand::Update {
            id,
            name,
            description,
            template,
            template_file,
            tags,
            model,
        } => {
            let mut prompt = storage.load_prompt(&id).await?;
            if let Some(name) = name {
                prompt.name = name;
            }
            if let Some(description) = description {
                prompt.description = (!description.trim().is_empty()).then_some(description);
            }
            // An empty or absent template keeps the current one.
            if let Some(template) = read_template(template, template_file).await? {
                if !template.trim().is_empty() {
                    prompt.set_template(template)?;
                }
            }
            if let Some(tags) = tags {
                prompt.tags = tags;
            }
            if let Some(model) = model {
                prompt.model_name = (!model.is_empty()).then_some(model);
            }
            prompt.touch();
            prompt.validate()?;

            ws.auto_snapshot(&id, "Before update".to_string()).await?;
            storage.save_prompt(&prompt).await?;
            println!("Updated prompt {}", id);
        }
        PromptCommand::Find { query } => match search::find(&query, storage.list_prompts().await?) {
            None => bail!("No prompts found"),
            Some(SearchOutcome::Confident(hit)) => {
                println!(
                    "Best match: prompt {} - {} (score: {:.0}%)",
                    hit.prompt.id,
                    hit.prompt.name,
                    hit.score * 100.0
                );
                print_prompt(&hit.prompt);
            }
            Some(SearchOutcome::Candidates(hits)) => {
                let best = hits.first().map_or(0.0, |hit| hit.score);
                println!("Top matches (best score: {:.0}%):", best * 100.0);
                for (rank, hit) in hits.iter().enumerate() {
                    println!(
                        "{:>2}. {:<8} {:<32} {:>4.0}%  {}",
                        rank + 1,
                        hit.prompt.id,
                        hit.prompt.name,
                        hit.score * 100.0,
                        preview(&hit.prompt)
                    );
                }
            }
        },
        PromptCommand::Delete { id } => {
            storage.delete_prompt(&id).await?;
            println!("Deleted prompt {} and its versions", id);
        }
        PromptCommand::Render { id, vars, pairs } => {
            let prompt = storage.load_prompt(&id).await?;
            let mut values: HashMap<String, String> = HashMap::new();
            if let Some(path) = vars {
                let object: serde_json::Map<String, serde_json::Value> = promptkeep::fsio::read_json(&path)
                    .await
                    .with_context(|| format!("Variables file {} must hold a JSON object", path.display()))?;
                values.extend(
                    object
                        .iter()
                        .map(|(k, v)| (k.clone(), template::value_to_text(v))),
                );
            }
            for pair in pairs {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("Expected KEY=VALUE, got '{}'", pair);
                };
                values.insert(key.to_string(), value.to_string());
            }
            println!("{}", prompt.render(&values)?);
        }
    }
    Ok(())
}

async fn version_command(dir: &Path, cmd: VersionCommand) -> Result<()> {
    let ws = Workspace::open(dir).await?;
    let storage = ws.storage();
    let versions = storage.version_store();
    match cmd {
        VersionCommand::History { id } => {
            let history = versions.list_versions(&id).await?;
            if history.is_empty() {
                storage.load_prompt(&id).await?;
                println!("Prompt {} has no version history yet.", id);
            }
            for v in history {
                println!(
                    "v{:<4} {}  {}",
                    v.version,
                    v.created_at.format("%Y-%m-%d %H:%M:%S"),
                    v.message.as_deref().unwrap_or("")
                );
            }
        }
        VersionCommand::Show { id, version } => {
            let Some(v) = versions.get_version(&id, version).await? else {
                bail!("Version {} not found for prompt {}", version, id);
            };
            println!("Version: {}", v.version);
            println!("Created: {}", v.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Message: {}", v.message.as_deref().unwrap_or("(no message)"));
            print_prompt(&v.snapshot);
        }
        VersionCommand::Snapshot { id, message } => {
            let v = storage.create_snapshot(&id, message).await?;
            println!("Created version {} of prompt {}", v.version, id);
        }
        VersionCommand::Restore { id, version } => {
            if versions.get_version(&id, version).await?.is_none() {
                bail!("Version {} not found for prompt {}", version, id);
            }
            if storage.get_prompt(&id).await?.is_some() {
                ws.auto_snapshot(&id, format!("Before restore to v{}", version))
                    .await?;
            }
            let restored = versions.restore_version(&id, version).await?;
            println!("Restored prompt {} to version {}", id, version);
            println!("Current name: {}", restored.name);
        }
    }
    Ok(())
}

async fn model_command(dir: &Path, cmd: ModelCommand) -> Result<()> {
    let ws = Workspace::open(dir).await?;
    let registry = ws.project.registry();
    match cmd {
        ModelCommand::List => {
            let models = registry.load().await?;
            if models.is_empty() {
                println!("No models configured. Use `promptkeep model add` to add one.");
            }
            for m in models {
                let marker = if m.name == ws.config.default_model { "(default)" } else { "" };
                println!(
                    "{:<20} {:<10} {:<28} {:<20} {:.2} {:>6} {}",
                    m.name,
                    m.provider,
                    m.model,
                    m.api_key_env.as_deref().unwrap_or("-"),
                    m.temperature,
                    m.max_tokens,
                    marker
                );
            }
        }
        ModelCommand::Add {
            name,
            model,
            provider,
            api_key_env,
            temperature,
            max_tokens,
            default,
        } => {
            let (provider, model) = match provider {
                Some(provider) => {
                    let bare = model
                        .strip_prefix(&format!("{}/", provider))
                        .map(str::to_string)
                        .unwrap_or(model);
                    (provider, bare)
                }
                None => match ModelConfig::infer_provider(&model) {
                    Some(inferred) => inferred,
                    None => bail!("Cannot infer the provider for '{}'; pass --provider", model),
                },
            };
            let mut config = ModelConfig::new(&name, provider, model)
                .with_temperature(temperature)
                .with_max_tokens(max_tokens);
            if let Some(var) = api_key_env {
                config = config.with_api_key_env(var);
            }
            registry.add(config).await?;
            if default {
                registry.set_default(&name).await?;
            }
            println!("Added model {}", name);
        }
        ModelCommand::Remove { name } => {
            if !registry.remove(&name).await? {
                bail!("Model '{}' is not configured", name);
            }
            println!("Removed model {}", name);
        }
        ModelCommand::SetDefault { name } => {
            registry.set_default(&name).await?;
            println!("Default model set to {}", name);
        }
    }
    Ok(())
}
