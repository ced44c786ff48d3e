//! Labrig server binary: CLI, configuration, logging, and serving.

use std::env;
use std::fs;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

use labrig::api::{self, AppState};
use labrig::command::CommandRunner;
use labrig::session::SessionManager;
use labrig::validation::ValidationEngine;

const APP_NAME: &str = "labrig";

fn main() {
    if let Err(err) = try_main() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn serve_main(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!(config_file = %ctx.paths.config_file.display(), "configuration loaded");

    match cli.command {
        Command::Serve(cmd) => serve_main(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Labrig - hands-on training platform server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Use a specific config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Silence all log output
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// More verbose logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Debug-level logging (same as -v)
    #[arg(long, global = true)]
    debug: bool,
    /// Trace-level logging, the most detailed
    #[arg(long, global = true)]
    trace: bool,
    /// Emit logs as JSON
    #[arg(long = "log-json", global = true)]
    log_json: bool,
    /// Never use ANSI colors
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeCommand),
    /// Write the default configuration file
    Init(InitCommand),
    /// Show or manage the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Emit a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Address to bind
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Root directory for session workspaces
    #[arg(long, value_name = "PATH")]
    workspace_root: Option<PathBuf>,
    /// Directory holding lab content
    #[arg(long, value_name = "PATH")]
    labs_dir: Option<PathBuf>,
    /// Directory holding question content
    #[arg(long, value_name = "PATH")]
    questions_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Overwrite an existing config file
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print where the config file lives
    Path,
    /// Restore the default configuration
    Reset,
}

#[derive(Debug)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = load_or_init_config(&paths)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("labrig={level},tower_http={level}")));

        if self.common.log_json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let disable_color = self.common.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_target(self.common.debug || self.common.trace)
                        .with_file(self.common.trace)
                        .with_line_number(self.common.trace),
                )
                .try_init()
                .ok();
        }

        // Bridge the log facade so crates emitting log macros stay visible.
        let mut bridge = env_logger::Builder::from_env(env_logger::Env::default());
        bridge.filter_level(self.effective_log_level());
        bridge.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => level_from_config(&self.config.logging.level),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

fn level_from_config(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

#[derive(Debug)]
struct AppPaths {
    config_file: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!(
                "config path {} has no parent directory",
                config_file.display()
            ));
        }

        Ok(Self { config_file })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    workspace: WorkspaceConfig,
    content: ContentConfig,
    session: SessionConfig,
    command: CommandConfig,
    cluster: ClusterConfig,
    logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    /// Bind address.
    host: String,
    /// Bind port.
    port: u16,
    /// Origins allowed by CORS; empty allows any origin.
    cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Where session workspace directories live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct WorkspaceConfig {
    root: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: "~/.local/share/labrig/workspaces".to_string(),
        }
    }
}

/// Where lab and question content lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ContentConfig {
    labs_dir: String,
    questions_dir: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            labs_dir: "~/.local/share/labrig/labs".to_string(),
            questions_dir: "~/.local/share/labrig/questions".to_string(),
        }
    }
}

/// Interactive session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SessionConfig {
    /// Shell spawned for interactive sessions.
    shell: String,
    /// Lines buffered per output stream before the oldest are dropped.
    output_buffer_lines: usize,
    /// Seconds to wait between SIGTERM and SIGKILL.
    terminate_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            output_buffer_lines: 1000,
            terminate_grace_secs: 5,
        }
    }
}

/// One-shot command deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct CommandConfig {
    validate_timeout_secs: u64,
    terminal_timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            validate_timeout_secs: 10,
            terminal_timeout_secs: 30,
        }
    }
}

/// Cluster integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ClusterConfig {
    /// CLI used for namespace management.
    cli: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cli: "oc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting labrig server...");

    let host = cmd
        .host
        .clone()
        .unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let workspace_root = cmd
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&ctx.config.workspace.root));
    let labs_dir = cmd
        .labs_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&ctx.config.content.labs_dir));
    let questions_dir = cmd
        .questions_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&ctx.config.content.questions_dir));

    tokio::fs::create_dir_all(&workspace_root)
        .await
        .with_context(|| format!("creating workspace root {}", workspace_root.display()))?;
    info!("Workspace root: {}", workspace_root.display());
    info!("Labs: {}", labs_dir.display());
    info!("Questions: {}", questions_dir.display());

    let sessions = Arc::new(SessionManager::new(
        workspace_root,
        ctx.config.session.shell.clone(),
        ctx.config.session.output_buffer_lines,
        Duration::from_secs(ctx.config.session.terminate_grace_secs),
    ));
    let runner = Arc::new(CommandRunner::new());
    let validator = Arc::new(ValidationEngine::new(
        labs_dir,
        questions_dir,
        Arc::clone(&runner),
        Duration::from_secs(ctx.config.command.validate_timeout_secs),
    ));
    let state = AppState::new(Arc::clone(&sessions), runner, validator)
        .with_terminal_timeout(Duration::from_secs(ctx.config.command.terminal_timeout_secs))
        .with_cluster_cli(ctx.config.cluster.cli.clone())
        .with_cors_allowed_origins(ctx.config.server.cors_allowed_origins.clone());

    // All API routes are served under the /api prefix.
    let api_router = api::create_router(state);
    let app = axum::Router::new().nest("/api", api_router);

    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid address")?;

    info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await.context("binding to address")?;

    let shutdown_sessions = Arc::clone(&sessions);
    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received, stopping sessions...");
        shutdown_sessions.shutdown_all().await;
        info!("Shutdown complete");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config file {} already exists; pass --force to overwrite",
            ctx.paths.config_file.display()
        ));
    }

    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!(
                "{}",
                toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
            );
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => write_default_config(&ctx.paths.config_file),
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn load_or_init_config(paths: &AppPaths) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        write_default_config(&paths.config_file)?;
    }

    let built = Config::builder()
        .set_default("logging.level", "info")?
        .add_source(
            File::from(paths.config_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(env_prefix().as_str()).separator("__"))
        .build()?;

    let mut config: AppConfig = built.try_deserialize()?;

    config.workspace.root = expand_str_path(&config.workspace.root)?.display().to_string();
    config.content.labs_dir = expand_str_path(&config.content.labs_dir)?
        .display()
        .to_string();
    config.content.questions_dir = expand_str_path(&config.content.questions_dir)?
        .display()
        .to_string();

    Ok(config)
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let rendered =
        toml::to_string_pretty(&AppConfig::default()).context("rendering default config")?;
    let mut body = default_config_header(path);
    body.push_str(&rendered);
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    format!(
        "# {APP_NAME} configuration\n# Written to {}\n\n",
        path.display()
    )
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(text).with_context(|| format!("expanding path {text}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("could not determine a configuration directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_uppercase()
}
