use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    #[command(about = "List the analysis crew in delegation order")]
    List,
    #[command(about = "Show an agent's role, goal, and backstory")]
    Show {
        #[arg(long)]
        name: String,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  adaptive-analyzer\n\
  adaptive-analyzer analyze --product \"Solar kettle\" --yes --save\n\
  adaptive-analyzer --model gemini-2.0-flash --max-retries 5 analyze\n\
  adaptive-analyzer --profile fast strategies\n\
  adaptive-analyzer doctor --probe\n\
  adaptive-analyzer agents show --name market_analyst\n\
\n\
Fallback behavior:\n\
  - Full Analysis runs first; timeouts fall back to Quick, then Emergency.\n\
  - Rate limits and overloads retry the same strategy with exponential backoff.\n\
  - Invalid credentials or rejected requests stop the run immediately.";

#[derive(Debug, Parser)]
#[command(name = "adaptive-analyzer")]
#[command(about = "Three-agent product analysis on Gemini with adaptive fallback strategies")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "ANALYZER_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "ANALYZER_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "ANALYZER_CONFIG", default_value = ".analyzer/config.toml")]
    pub config_path: String,

    #[arg(long, env = "ANALYZER_TEMPERATURE")]
    pub temperature: Option<f32>,

    #[arg(long, env = "ANALYZER_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "ANALYZER_BASE_DELAY_SECS")]
    pub base_delay_secs: Option<u64>,

    #[arg(long, env = "ANALYZER_SEARCH_RESULTS")]
    pub search_results: Option<usize>,

    #[arg(long, env = "ANALYZER_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[arg(long, env = "ANALYZER_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "ANALYZER_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "ANALYZER_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Analyze a product (interactive unless --product and --yes are given)")]
    Analyze {
        #[arg(long)]
        product: Option<String>,
        #[arg(long, default_value_t = false, help = "Skip confirmation prompts")]
        yes: bool,
        #[arg(long, default_value_t = false, help = "Save the report without asking")]
        save: bool,
    },
    #[command(about = "Check API credentials and optionally probe the model")]
    Doctor {
        #[arg(long, default_value_t = false)]
        probe: bool,
    },
    #[command(about = "Show the fallback strategy ladder and retry policy")]
    Strategies,
    #[command(about = "Inspect the analysis crew")]
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

impl Commands {
    /// Interactive analysis, the behavior with no subcommand.
    pub fn interactive() -> Self {
        Commands::Analyze {
            product: None,
            yes: false,
            save: false,
        }
    }
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Analyze { .. } => "analyze".to_string(),
        Commands::Doctor { .. } => "doctor".to_string(),
        Commands::Strategies => "strategies".to_string(),
        Commands::Agents { command } => match command {
            AgentCommands::List => "agents.list".to_string(),
            AgentCommands::Show { .. } => "agents.show".to_string(),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
    }
}
