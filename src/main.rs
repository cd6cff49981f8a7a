use spark_agent::cli;
use spark_agent::config::Config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spark", version, about = "Spark agent tool runner")]
struct Cli {
    /// Path to configuration file (default: $SPARK_HOME/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tool catalogue as JSON
    Tools,
    /// Run a single tool against a workspace
    Call {
        /// Workspace root directory
        #[arg(long)]
        root: PathBuf,
        /// Tool name (e.g. write_file)
        #[arg(long)]
        tool: String,
        /// Tool arguments as inline JSON
        #[arg(long)]
        args: Option<String>,
        /// Read tool arguments from a JSON file
        #[arg(long)]
        args_file: Option<PathBuf>,
        /// User the run belongs to
        #[arg(long, default_value = "")]
        user_id: String,
        /// Block direct writes to protected lesson JSON
        #[arg(long)]
        enforce_lesson_pipeline: bool,
    },
    /// Show what the publish gate would decide for a workspace
    GradeStatus {
        /// Workspace root directory
        #[arg(long)]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        // Logs go to stderr so stdout stays machine-readable JSON.
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    let ok = match cli.command {
        Command::Tools => {
            cli::list_tools(&config)?;
            true
        }
        Command::Call {
            root,
            tool,
            args,
            args_file,
            user_id,
            enforce_lesson_pipeline,
        } => {
            let args = cli::read_call_args(args.as_deref(), args_file.as_deref())?;
            cli::call_tool(
                &config,
                cli::CallOptions {
                    root,
                    tool,
                    args,
                    user_id,
                    enforce_lesson_pipeline,
                },
            )
            .await?
        }
        Command::GradeStatus { root } => cli::grade_status(&root).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
