use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{ProfileUpdate, RegisterRequest, Validate};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod chat;
mod config;
mod controller;
mod model;
mod outbox;

use api::ApiClient;
use auth::AuthContext;
use controller::ChatController;
use model::{GeminiClient, ModelClient, MEDICAL_SYSTEM_PROMPT, REPORT_ANALYSIS_PROMPT};

#[derive(Parser)]
#[command(name = "medchat")]
#[command(about = "Medical chat assistant - talk to the model and keep your history on the medchat server")]
#[command(version)]
struct Cli {
    /// Server URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Auth token (overrides config)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Login to the medchat server
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Logout from the medchat server
    Logout,
    /// Show current login status
    Whoami,
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// List your chat sessions, newest first
    Sessions,
    /// Print stored chat history
    History {
        /// Only this session; all sessions merged when omitted
        #[arg(long)]
        session: Option<i64>,
    },
    /// Start an interactive chat
    Chat {
        /// Continue an existing session
        #[arg(long)]
        resume: Option<i64>,
    },
    /// Analyze and store medical reports
    Reports {
        #[command(subcommand)]
        action: ReportsAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Print the stored profile
    Show,
    /// Update selected fields
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        blood_group: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReportsAction {
    /// List stored reports, newest first
    List,
    /// Analyze a report file with the model and store the result
    Upload {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (server, token, api_key, model, base_url, timeout_secs, max_attempts)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // --server and --token apply to this run only and never reach the saved config
    let mut config = config::Config::load().unwrap_or_default();
    let server = config.server_for_run(cli.server.as_deref());
    let session = AuthContext::from_config(&config).with_token_override(cli.token.clone());

    match cli.command {
        Commands::Register {
            email,
            password,
            first_name,
            last_name,
        } => {
            let req = RegisterRequest {
                email,
                password,
                first_name,
                last_name,
            };
            req.validate()?;
            let resp = ApiClient::new(&server, None).register(&req).await?;
            println!("\x1b[32m✅ Account created (id {})\x1b[0m", resp.id);
            println!("Run '\x1b[1mmedchat login\x1b[0m' to sign in");
        }
        Commands::Login { email, password } => {
            let session = auth::login(&mut config, &server, &email, &password).await?;
            if let Some(user) = session.user {
                println!("\x1b[1;32m✅ Logged in as {} {}\x1b[0m", user.first_name, user.last_name);
            }
        }
        Commands::Logout => auth::logout(&mut config)?,
        Commands::Whoami => auth::whoami(&session, &server).await?,
        Commands::Profile { action } => {
            let client = require_login(&session, &server)?;
            handle_profile_command(&client, action).await?;
        }
        Commands::Sessions => {
            let client = require_login(&session, &server)?;
            let sessions = client.list_sessions().await?;
            if sessions.is_empty() {
                println!("No chat sessions yet. Start one with 'medchat chat'.");
            }
            for s in sessions {
                println!(
                    "{:>5}  {}  {}",
                    s.id,
                    s.created_at.unwrap_or_default(),
                    s.title
                );
            }
        }
        Commands::History { session: session_id } => {
            let client = require_login(&session, &server)?;
            for entry in client.history(session_id).await? {
                let label = entry
                    .session_id
                    .map(|id| format!("#{}", id))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{}] {} {}: {}",
                    entry.created_at.unwrap_or_default(),
                    label,
                    entry.role,
                    entry.content
                );
            }
        }
        Commands::Chat { resume } => {
            let client = require_login(&session, &server)?;
            let model = GeminiClient::from_config(&config.model)?;
            let controller =
                ChatController::new(client, model, MEDICAL_SYSTEM_PROMPT, config.outbox.max_attempts);
            chat::run(controller, resume).await?;
        }
        Commands::Reports { action } => {
            let client = require_login(&session, &server)?;
            handle_reports_command(&client, &config, action).await?;
        }
        Commands::Config { action } => handle_config_command(action)?,
    }

    Ok(())
}

fn require_login(session: &AuthContext, server: &str) -> Result<ApiClient> {
    if !session.is_logged_in() {
        anyhow::bail!("Not logged in. Run 'medchat login' to authenticate.");
    }
    Ok(session.client(server))
}

async fn handle_profile_command(client: &ApiClient, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::Show => {
            let profile = client.profile().await?;
            println!("name:        {} {}", profile.first_name, profile.last_name);
            println!("email:       {}", profile.email);
            println!("mobile:      {}", profile.mobile.unwrap_or_default());
            println!("blood group: {}", profile.blood_group.unwrap_or_default());
            println!("notes:       {}", profile.personal_notes.unwrap_or_default());
            println!("member since {}", profile.created_at.unwrap_or_default());
        }
        ProfileAction::Update {
            first_name,
            last_name,
            mobile,
            blood_group,
            notes,
        } => {
            let update = ProfileUpdate {
                first_name,
                last_name,
                mobile,
                blood_group,
                personal_notes: notes,
            };
            if update == ProfileUpdate::default() {
                anyhow::bail!("Nothing to update. Pass at least one field, e.g. --mobile");
            }
            update.validate()?;
            client.update_profile(&update).await?;
            println!("Profile updated");
        }
    }
    Ok(())
}

async fn handle_reports_command(
    client: &ApiClient,
    config: &config::Config,
    action: ReportsAction,
) -> Result<()> {
    match action {
        ReportsAction::List => {
            let reports = client.list_reports().await?;
            if reports.is_empty() {
                println!("No reports stored yet.");
            }
            for report in reports {
                println!(
                    "\x1b[1m#{} {}\x1b[0m  {}",
                    report.id,
                    report.filename,
                    report.created_at.unwrap_or_default()
                );
                println!("{}\n", report.analysis);
            }
        }
        ReportsAction::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("report")
                .to_string();
            let mime_type = model::mime_for_path(&file);

            let model = GeminiClient::from_config(&config.model)?;
            eprintln!("\x1b[90mAnalyzing {}...\x1b[0m", filename);
            let analysis = model
                .analyze(&bytes, mime_type, REPORT_ANALYSIS_PROMPT)
                .await?;
            println!("{}", analysis);

            client
                .upload_report(&filename, bytes, mime_type, &analysis)
                .await?;
            tracing::info!("Stored report {}", filename);
            println!("\x1b[32m✅ Report saved\x1b[0m");
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load().unwrap_or_default();
            match key.as_str() {
                "server" => config.remote.server = Some(value),
                "token" => config.remote.token = Some(value),
                "api_key" => config.model.api_key = Some(value),
                "model" => config.model.model = value,
                "base_url" => config.model.base_url = value,
                "timeout_secs" => config.model.timeout_secs = value.parse()?,
                "max_attempts" => config.outbox.max_attempts = value.parse()?,
                _ => anyhow::bail!(
                    "Unknown config key: {}. Valid keys: server, token, api_key, model, base_url, timeout_secs, max_attempts",
                    key
                ),
            }
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            let value = match key.as_str() {
                "server" => config.server(),
                "token" => config.remote.token.map(|_| "****").unwrap_or_default().to_string(),
                "api_key" => config.model.api_key.map(|_| "****").unwrap_or_default().to_string(),
                "model" => config.model.model,
                "base_url" => config.model.base_url,
                "timeout_secs" => config.model.timeout_secs.to_string(),
                "max_attempts" => config.outbox.max_attempts.to_string(),
                _ => anyhow::bail!("Unknown config key: {}", key),
            };
            println!("{}", value);
        }
        ConfigAction::Show => {
            let config = config::Config::load()?;
            println!("server: {}", config.server());
            println!("token: {}", config.remote.token.map(|_| "****").unwrap_or_default());
            if let Some(user) = &config.remote.user {
                println!("user: {}", user.email);
            }
            println!("api_key: {}", config.model.api_key.map(|_| "****").unwrap_or_default());
            println!("model: {}", config.model.model);
            println!("base_url: {}", config.model.base_url);
            println!("timeout_secs: {}", config.model.timeout_secs);
            println!("max_attempts: {}", config.outbox.max_attempts);
        }
        ConfigAction::Path => {
            let path = config::Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
