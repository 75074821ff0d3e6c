use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowline_core::config::{AppConfig, ModelConfig};
use flowline_core::traits::WorkflowStore;
use flowline_core::types::InvokeRequest;
use flowline_engine::{ExecutionSettings, WorkflowExecutor};
use flowline_gateway::{AppState, GatewayServer, InvokeDefaults};
use flowline_store::SqliteStore;

#[derive(Parser)]
#[command(name = "flowline", version, about = "Run node-graph workflows against a chat-completion model")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the bind address from config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Execute a workflow and print the report
    Execute {
        id: i64,
        /// Input that replaces the start node's value
        #[arg(long)]
        input: Option<String>,
    },
    /// List workflows
    List {
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Show one workflow with its tasks
    Show { id: i64 },
    /// Create a workflow
    Create {
        name: String,
        #[command(flatten)]
        description: DescriptionArgs,
    },
    /// Replace a workflow's name, description and tasks
    Update {
        id: i64,
        name: String,
        #[command(flatten)]
        description: DescriptionArgs,
    },
    /// Delete a workflow and its tasks
    Delete { id: i64 },
    /// Send a single prompt to the model
    Invoke {
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        /// The prompt (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args)]
#[group(multiple = false)]
struct DescriptionArgs {
    /// Description text or node-graph JSON
    #[arg(long)]
    description: Option<String>,
    /// Read the description from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl DescriptionArgs {
    fn resolve(&self) -> anyhow::Result<Option<String>> {
        match (&self.description, &self.file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => Ok(Some(std::fs::read_to_string(path)?)),
            (None, None) => Ok(None),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowline=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "flowline", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&redacted(&config))?);
        return Ok(());
    }

    let invoker = flowline_llm::create_invoker(&config.model)?;

    if let Commands::Invoke {
        max_tokens,
        temperature,
        prompt,
    } = &cli.command
    {
        let text = if prompt.is_empty() {
            read_stdin()
        } else {
            prompt.join(" ")
        };
        let gateway = config.gateway.clone().unwrap_or_default();
        let defaults = InvokeDefaults::new(&gateway, &config.model);
        let request = InvokeRequest {
            prompt: text,
            system_prompt: defaults.system_prompt,
            max_tokens: max_tokens.unwrap_or(defaults.max_tokens),
            temperature: temperature.unwrap_or(defaults.temperature),
        };
        let response = invoker.invoke(request).await?;
        return print_json(&response);
    }

    let db_path = config.database_path();
    let store: Arc<dyn WorkflowStore> = Arc::new(SqliteStore::open(&db_path)?);
    info!(path = %db_path.display(), "Database opened");

    let executor = Arc::new(WorkflowExecutor::new(
        store.clone(),
        invoker.clone(),
        ExecutionSettings::from(&config.engine),
    ));

    match cli.command {
        Commands::Serve { bind } => {
            let mut gateway_config = config.gateway.clone().unwrap_or_default();
            if let Some(bind) = bind {
                gateway_config.bind = bind;
            }
            let invoke_defaults = InvokeDefaults::new(&gateway_config, &config.model);
            info!(bind = %gateway_config.bind, "Starting HTTP gateway");

            let server = GatewayServer::new(AppState {
                config: gateway_config,
                store,
                executor,
                invoker,
                invoke_defaults,
            });
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Execute { id, input } => {
            let report = executor.execute(id, input).await?;
            print_json(&report)?;
        }
        Commands::List { skip, limit } => {
            print_json(&store.list_workflows(skip, limit).await?)?;
        }
        Commands::Show { id } => match store.get_workflow(id).await? {
            Some(workflow) => print_json(&workflow)?,
            None => anyhow::bail!("Workflow with id {} not found", id),
        },
        Commands::Create { name, description } => {
            let description = description.resolve()?;
            let workflow = store.create_workflow(&name, description.as_deref()).await?;
            info!(workflow_id = workflow.id, tasks = workflow.tasks.len(), "Workflow created");
            print_json(&workflow)?;
        }
        Commands::Update {
            id,
            name,
            description,
        } => {
            let description = description.resolve()?;
            match store.update_workflow(id, &name, description.as_deref()).await? {
                Some(workflow) => print_json(&workflow)?,
                None => anyhow::bail!("Workflow with id {} not found", id),
            }
        }
        Commands::Delete { id } => match store.delete_workflow(id).await? {
            Some(workflow) => {
                info!(workflow_id = id, tasks = workflow.tasks.len(), "Workflow deleted");
                println!("Workflow deleted successfully");
            }
            None => anyhow::bail!("Workflow with id {} not found", id),
        },
        Commands::Invoke { .. } | Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `--config` path, then `~/.flowline/config.toml`, then the environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".flowline").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    eprintln!("Warning: No config file found. Set FLOWLINE_API_KEY or create flowline.toml");
    eprintln!("See flowline.toml.example for reference.");
    Ok(create_env_config())
}

fn create_env_config() -> AppConfig {
    let env = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| std::env::var(n).ok().filter(|v| !v.is_empty()))
    };

    let defaults = ModelConfig::default();
    let model = ModelConfig {
        api_key: env(&["FLOWLINE_API_KEY", "QWEN_API_KEY"]),
        base_url: env(&["FLOWLINE_BASE_URL", "QWEN_BASE_URL"]).unwrap_or(defaults.base_url.clone()),
        model_id: env(&["FLOWLINE_MODEL"]).unwrap_or(defaults.model_id.clone()),
        ..defaults
    };

    AppConfig {
        model,
        ..Default::default()
    }
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.model.api_key.is_some() {
        config.model.api_key = Some("***".into());
    }
    if let Some(gateway) = config.gateway.as_mut() {
        if gateway.token.is_some() {
            gateway.token = Some("***".into());
        }
        for key in &mut gateway.api_keys {
            key.key = "***".into();
        }
    }
    config
}

fn read_stdin() -> String {
    io::stdin()
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
