mod commands;

use clap::{Parser, Subcommand};
use commands::{DbCommand, EXIT_FAILURE};
use reward_config::{ConfigLoader, ConfigSnapshot};
use reward_core::SyncCommand;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "reward",
    version,
    about = "Local development environments for PHP applications"
)]
struct Cli {
    /// Log level: trace, debug, info, warning or error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Shorthand for --log-level debug; also logs source locations.
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,

    /// Disable coloured output.
    #[arg(long, default_value_t = false, global = true)]
    disable_colors: bool,

    /// Configuration file (default: ~/.reward.yml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application home directory (default: ~/.reward).
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a docker compose command against the project environment.
    #[command(disable_help_flag = true)]
    Env {
        /// Composer command and arguments, e.g. `up`, `ps`, `logs -f nginx`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a docker compose command against the shared services.
    #[command(disable_help_flag = true)]
    Svc {
        /// Composer command and arguments.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Open a shell (or run a command) in the debug PHP container.
    Debug {
        /// Command to run instead of `bash`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Control the project's file sync session.
    Sync {
        #[command(subcommand)]
        command: SyncSubcommand,
    },
    /// Work with the project database.
    Db {
        #[command(subcommand)]
        command: DbSubcommand,
    },
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Start a fresh session bound to the synced container.
    Start,
    /// Terminate the session.
    Stop,
    Pause,
    Resume,
    /// Show the session status.
    List,
    /// Force a synchronisation cycle.
    Flush,
    /// Follow the session status.
    Monitor,
    /// Reset the session history.
    Reset,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    /// Open an interactive database client.
    Connect {
        /// Connect as the database root user.
        #[arg(long, default_value_t = false)]
        root: bool,
        /// Extra client arguments (after --).
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// Import an SQL dump read from stdin.
    Import {
        /// Import as the database root user.
        #[arg(long, default_value_t = false)]
        root: bool,
        /// Extra client arguments (after --).
        #[arg(last = true)]
        extra: Vec<String>,
    },
}

impl From<SyncSubcommand> for SyncCommand {
    fn from(cmd: SyncSubcommand) -> Self {
        match cmd {
            SyncSubcommand::Start => Self::Start,
            SyncSubcommand::Stop => Self::Stop,
            SyncSubcommand::Pause => Self::Pause,
            SyncSubcommand::Resume => Self::Resume,
            SyncSubcommand::List => Self::List,
            SyncSubcommand::Flush => Self::Flush,
            SyncSubcommand::Monitor => Self::Monitor,
            SyncSubcommand::Reset => Self::Reset,
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConfigSnapshot, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("cannot determine the working directory: {e}"))?;
    let mut loader = ConfigLoader::new(cwd);
    if let Some(level) = &cli.log_level {
        loader = loader.flag("log_level", level.as_str());
    }
    if cli.debug {
        loader = loader.flag("debug", true);
    }
    if cli.disable_colors {
        loader = loader.flag("disable_colors", true);
    }
    if let Some(path) = &cli.config {
        loader = loader.flag("reward_config_file", path.display().to_string());
    }
    if let Some(path) = &cli.app_dir {
        loader = loader.flag("reward_home_dir", path.display().to_string());
    }
    loader.load().map_err(|e| e.to_string())
}

/// Configured level, `debug` when only the debug switch is on, else `warn`.
fn default_level(level: Option<&str>, debug: bool) -> &str {
    match level {
        Some("warning") => "warn",
        Some(other) => other,
        None if debug => "debug",
        None => "warn",
    }
}

/// `REWARD_LOG` wins over the configured level.
fn log_filter(level: Option<&str>, debug: bool) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    EnvFilter::try_from_env("REWARD_LOG").unwrap_or_else(|_| {
        EnvFilter::try_new(default_level(level, debug)).unwrap_or_else(|_| EnvFilter::new("warn"))
    })
}

fn init_logging(level: Option<&str>, debug: bool, no_color: bool) {
    let verbose = debug || matches!(level, Some("debug" | "trace"));
    if no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(level, debug))
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false);
    if verbose {
        builder.with_file(true).with_line_number(true).init();
    } else {
        builder.without_time().init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(msg) => {
            init_logging(cli.log_level.as_deref(), cli.debug, cli.disable_colors);
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    init_logging(
        cfg.log_level().as_deref(),
        cfg.debug(),
        cfg.disable_colors(),
    );

    let (action, project_scoped) = match &cli.command {
        Commands::Env { args } if commands::wants_help(args) => ("env", false),
        Commands::Env { args } => (args.first().map_or("env", String::as_str), true),
        Commands::Svc { args } => (args.first().map_or("svc", String::as_str), false),
        Commands::Debug { .. } => ("debug", true),
        Commands::Sync { .. } => ("sync", true),
        Commands::Db { .. } => ("db", true),
    };
    if let Err(msg) = commands::preflight(&cfg, action, project_scoped) {
        eprintln!("error: {msg}");
        return ExitCode::from(EXIT_FAILURE);
    }

    if std::env::var("REWARD_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = reward_runtime::check_env_prereqs();
        if !missing.is_empty() {
            eprintln!("error: {}", reward_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let engine = match commands::build_engine(cfg) {
        Ok(engine) => engine,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let result = match cli.command {
        Commands::Env { args } => commands::env::run(&engine, &args),
        Commands::Svc { args } => commands::svc::run(&engine, &args),
        Commands::Debug { command } => commands::debug::run(&engine, &command),
        Commands::Sync { command } => commands::sync::run(&engine, command.into()),
        Commands::Db { command } => match command {
            DbSubcommand::Connect { root, extra } => {
                commands::db::run(&engine, DbCommand::Connect, root, extra)
            }
            DbSubcommand::Import { root, extra } => {
                commands::db::run(&engine, DbCommand::Import, root, extra)
            }
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn env_passes_flags_through() {
        let cli = Cli::try_parse_from(["reward", "env", "logs", "-f", "--tail", "10"]).unwrap();
        match cli.command {
            Commands::Env { args } => assert_eq!(args, ["logs", "-f", "--tail", "10"]),
            other => panic!("unexpected: {other:?}"),
        }
        let cli = Cli::try_parse_from(["reward", "env", "--help"]).unwrap();
        assert!(matches!(cli.command, Commands::Env { args } if args == ["--help"]));
    }

    #[test]
    fn debug_takes_an_optional_command() {
        let cli = Cli::try_parse_from(["reward", "debug"]).unwrap();
        assert!(matches!(cli.command, Commands::Debug { command } if command.is_empty()));
        let cli = Cli::try_parse_from(["reward", "debug", "php", "-v"]).unwrap();
        assert!(matches!(cli.command, Commands::Debug { command } if command == ["php", "-v"]));
    }

    #[test]
    fn db_extra_arguments_follow_separator() {
        let cli =
            Cli::try_parse_from(["reward", "db", "connect", "--root", "--", "-e", "SELECT 1"])
                .unwrap();
        match cli.command {
            Commands::Db {
                command: DbSubcommand::Connect { root, extra },
            } => {
                assert!(root);
                assert_eq!(extra, ["-e", "SELECT 1"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn level_precedence() {
        assert_eq!(default_level(Some("warning"), false), "warn");
        assert_eq!(default_level(Some("trace"), true), "trace");
        assert_eq!(default_level(None, true), "debug");
        assert_eq!(default_level(None, false), "warn");
    }
}
