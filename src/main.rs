use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clanzone::output::Format;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "clanzone",
    version = clanzone::build_info::long_version(),
    about = "One-time clan safe zones: policy, claim store and scenario replay"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Log at info level
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,
    /// Directory containing .clanzone/ (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .clanzone/ with a default policy and an empty claim store
    Init,
    /// Inspect the configured policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Inspect or revoke recorded claims
    Claims {
        #[command(subcommand)]
        action: ClaimsAction,
    },
    /// Replay a YAML scenario of host events against the coordinator
    Simulate {
        /// Scenario file
        scenario: PathBuf,
        /// Record claims in the data-dir store instead of a throwaway one
        #[arg(long)]
        persist: bool,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Print the resolved policy
    Show,
    /// Validate the config file
    Check,
}

#[derive(Subcommand)]
enum ClaimsAction {
    /// List every recorded claim
    List,
    /// Show one group's claim
    Show {
        /// Group (clan) tag
        group: String,
    },
    /// Forget a group's claim so it can claim again
    Revoke {
        /// Group (clan) tag
        group: String,
        /// Also restart the activation window on the next start
        #[arg(long)]
        reset_window: bool,
    },
    /// Restart the activation window on the next start, without revoking a claim
    ResetWindow,
}

fn init_tracing(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

fn run(cli: Cli, format: Format) -> clanzone::error::Result<()> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init => clanzone::commands::init::run(&root),
        Commands::Policy { action } => match action {
            PolicyAction::Show => clanzone::commands::policy::show(&root, format),
            PolicyAction::Check => clanzone::commands::policy::check(&root, format),
        },
        Commands::Claims { action } => match action {
            ClaimsAction::List => clanzone::commands::claims::list(&root, format),
            ClaimsAction::Show { group } => clanzone::commands::claims::show(&root, &group, format),
            ClaimsAction::Revoke {
                group,
                reset_window,
            } => clanzone::commands::claims::revoke(&root, &group, reset_window, format),
            ClaimsAction::ResetWindow => clanzone::commands::claims::reset_window(&root, format),
        },
        Commands::Simulate { scenario, persist } => {
            clanzone::commands::simulate::run(&root, &scenario, persist, format)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            Format::Pretty => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
