use anyhow::Result;
use clap::{Parser, Subcommand};
use qbank_chat::transport;
use qbank_chat::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "qbank")]
#[command(author, version, about = "qbank - question-bank chat client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// API base URL (overrides config and QBANK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: String,

        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the stored session
    Status,

    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Send a message and stream the assistant's reply
    Chat {
        /// Chat session id
        session_id: String,

        /// Message text
        message: String,

        /// Previously uploaded image file id (repeatable)
        #[arg(long = "image-file-id")]
        image_file_ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Create a chat session, optionally seeded with a question
    Create {
        /// Question body (HTML)
        #[arg(long)]
        question: Option<String>,

        #[arg(long)]
        answer: Option<String>,

        /// Solution body (HTML)
        #[arg(long)]
        solution: Option<String>,
    },

    /// Print a chat session
    Show { session_id: String },

    /// Print the stored events of a chat session
    Events { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "qbank_chat=debug,chat=debug,auth=debug"
    } else {
        "qbank_chat=info,chat=warn,auth=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load()?;
    if let Some(url) = &cli.api_url {
        config.set_base_url(url);
        config.validate()?;
    }

    match cli.command {
        Commands::Login { email, password } => {
            transport::cli::run_login(&config, &email, password).await?
        }
        Commands::Logout => transport::cli::run_logout(&config).await?,
        Commands::Status => transport::cli::run_status(&config).await?,
        Commands::Session { command } => match command {
            SessionCommands::Create {
                question,
                answer,
                solution,
            } => {
                transport::cli::run_session_create(&config, question, answer, solution).await?
            }
            SessionCommands::Show { session_id } => {
                transport::cli::run_session_show(&config, &session_id).await?
            }
            SessionCommands::Events { session_id } => {
                transport::cli::run_session_events(&config, &session_id).await?
            }
        },
        Commands::Chat {
            session_id,
            message,
            image_file_ids,
        } => {
            tracing::info!("Starting chat turn for session {}", session_id);
            transport::cli::run_chat(&config, &session_id, &message, &image_file_ids).await?
        }
    }

    Ok(())
}
