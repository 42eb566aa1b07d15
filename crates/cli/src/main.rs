use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod session;

#[derive(Debug, Parser)]
#[command(name = "tamio")]
struct Args {
    /// User whose dashboard, rules and forecast to work with.
    #[arg(long, global = true, default_value = "demo")]
    user_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect and edit the dashboard layout.
    Dashboard {
        #[command(subcommand)]
        command: DashboardCommand,
    },
    /// Manage alert rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Print the cash forecast.
    Forecast {
        /// 13, 26 or 52.
        #[arg(long, default_value_t = 13)]
        weeks: u32,
        /// Roll weeks up into calendar months.
        #[arg(long)]
        monthly: bool,
        /// Category filter ids to hide (e.g. `cost-Payroll`).
        #[arg(long = "hide")]
        hide: Vec<String>,
    },
    /// Scenario overlays.
    Scenarios {
        #[command(subcommand)]
        command: ScenariosCommand,
    },
    /// Prepared treasury actions.
    Actions {
        #[command(subcommand)]
        command: ActionsCommand,
    },
    /// Risks detected by the backend.
    Risks,
    /// Treasury controls and when they last ran.
    Controls,
    /// Ask the treasury assistant.
    Chat {
        message: String,
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum DashboardCommand {
    Show,
    /// List placeable widgets.
    Widgets {
        #[arg(long)]
        category: Option<String>,
    },
    Add { widget_id: String },
    Remove { instance_id: String },
    Move { from: usize, to: usize },
    Reset { preset: String },
    /// Set one widget setting; `value` is JSON.
    Set {
        instance_id: String,
        key: String,
        value: String,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    List {
        /// all, active or triggered-today.
        #[arg(long, default_value = "all")]
        filter: String,
        /// Calendar day for triggered-today (YYYY-MM-DD).
        #[arg(long)]
        today: Option<String>,
    },
    /// Create from a JSON file, or from a rule type's defaults.
    Create {
        #[arg(long, conflicts_with = "rule_type")]
        file: Option<std::path::PathBuf>,
        #[arg(long = "type")]
        rule_type: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Apply a JSON update file to a rule.
    Update {
        id: String,
        #[arg(long)]
        file: std::path::PathBuf,
    },
    Toggle { id: String },
    Duplicate { id: String },
    Delete { id: String },
    /// Record that the backend fired this rule now.
    Trigger { id: String },
    /// Print the description a rule config would get.
    Describe {
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum ScenariosCommand {
    List,
    Suggestions,
    /// Overlay saved scenarios on the forecast (at most five).
    Compare {
        ids: Vec<String>,
        #[arg(long, default_value_t = 13)]
        weeks: u32,
    },
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum ActionsCommand {
    List,
    Approve { id: String },
    Skip { id: String },
    Override {
        id: String,
        #[arg(long)]
        note: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = tamio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let session = session::Session::open(settings, &args.user_id).await;

    if let Err(err) = commands::run(&session, args.command).await {
        sentry_anyhow::capture_anyhow(&err);
        let notice = tamio_core::api::error::notice_for(&err);
        eprintln!("{}", notice.message);
        tracing::error!(user_id = %session.user_id, error = %format!("{err:#}"), "command failed");
        return Err(err);
    }
    Ok(())
}

fn init_sentry(settings: &tamio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
