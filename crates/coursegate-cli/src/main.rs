//! coursegate CLI: command-line front end to the gating engine.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "coursegate",
    version,
    about = "Course progress tracking and evaluation gating"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file path (overrides the configured storage)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Course catalog directory
    #[arg(long, global = true)]
    courses: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create starter config and an example course
    Init,

    /// Validate course TOML files
    Validate {
        /// Course file or directory (defaults to the configured catalog)
        path: Option<PathBuf>,
    },

    /// Show the recommendation tier for a score
    Tier {
        /// Score percentage
        #[arg(allow_negative_numbers = true)]
        score: f64,
    },

    /// Show progress for one course, or every course of a user
    Progress {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: Option<String>,

        /// Print a summary table instead of JSON
        #[arg(long)]
        table: bool,
    },

    /// Record a content item as viewed
    View {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,

        /// Module index (0-based)
        #[arg(long)]
        module: usize,

        /// Content item index within the module (0-based)
        #[arg(long)]
        item: usize,
    },

    /// Record a module quiz attempt
    CompleteModule {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,

        /// Module index (0-based)
        #[arg(long)]
        module: usize,

        /// Score percentage
        #[arg(long, allow_negative_numbers = true)]
        score: f64,

        /// Lockout minutes, replacing the tier's value
        #[arg(long)]
        lockout: Option<u32>,
    },

    /// Record a final evaluation attempt
    CompleteFinal {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,

        /// Score percentage
        #[arg(long, allow_negative_numbers = true)]
        score: f64,

        /// Lockout minutes, replacing the tier's value
        #[arg(long)]
        lockout: Option<u32>,
    },

    /// Check whether the final evaluation can be taken
    CanTakeFinal {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,

        /// Module count to require (defaults to the course's)
        #[arg(long)]
        total_modules: Option<usize>,
    },

    /// Check the lock state of a module quiz or the final evaluation
    CheckLock {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,

        /// Module index (0-based)
        #[arg(long, conflicts_with = "final_eval")]
        module: Option<usize>,

        /// Check the final evaluation instead of a module
        #[arg(long = "final")]
        final_eval: bool,
    },

    /// Clear a user's progress in a course
    Reset {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,
    },

    /// Mark a course completed without evaluations
    ForceComplete {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,
    },

    /// Mark a course abandoned
    Abandon {
        #[arg(long)]
        user: String,

        #[arg(long)]
        course: String,
    },

    /// Read or override a user's skill
    #[command(subcommand)]
    Skill(SkillCommand),

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Execute a raw JSON request (argument or stdin)
    Request {
        /// JSON body; read from stdin when omitted or "-"
        body: Option<String>,
    },
}

#[derive(Subcommand)]
enum SkillCommand {
    /// Show a user's skill
    Get {
        #[arg(long)]
        user: String,
    },
    /// Override a user's skill
    Set {
        #[arg(long)]
        user: String,

        #[arg(long)]
        value: f64,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user, or update its skill
    Add {
        #[arg(long)]
        user: String,

        /// Initial skill
        #[arg(long)]
        skill: Option<f64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coursegate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = cli.global;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { path } => commands::validate::execute(&global, path),
        Commands::Tier { score } => commands::tier::execute(score),
        Commands::Progress {
            user,
            course,
            table,
        } => commands::progress::execute(&global, user, course, table).await,
        Commands::View {
            user,
            course,
            module,
            item,
        } => commands::progress::view(&global, user, course, module, item).await,
        Commands::CompleteModule {
            user,
            course,
            module,
            score,
            lockout,
        } => commands::attempt::module(&global, user, course, module, score, lockout).await,
        Commands::CompleteFinal {
            user,
            course,
            score,
            lockout,
        } => commands::attempt::final_evaluation(&global, user, course, score, lockout).await,
        Commands::CanTakeFinal {
            user,
            course,
            total_modules,
        } => commands::gate::can_take_final(&global, user, course, total_modules).await,
        Commands::CheckLock {
            user,
            course,
            module,
            final_eval,
        } => commands::gate::check_lock(&global, user, course, module, final_eval).await,
        Commands::Reset { user, course } => commands::admin::reset(&global, user, course).await,
        Commands::ForceComplete { user, course } => {
            commands::admin::force_complete(&global, user, course).await
        }
        Commands::Abandon { user, course } => commands::admin::abandon(&global, user, course).await,
        Commands::Skill(SkillCommand::Get { user }) => {
            commands::admin::get_skill(&global, user).await
        }
        Commands::Skill(SkillCommand::Set { user, value }) => {
            commands::admin::set_skill(&global, user, value).await
        }
        Commands::User(UserCommand::Add { user, skill }) => {
            commands::admin::add_user(&global, user, skill).await
        }
        Commands::Request { body } => commands::request::execute(&global, body).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
