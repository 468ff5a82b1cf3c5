use anyhow::Result;
use clap::{Parser, Subcommand};
use portfolio_backend::cli::{self, ClientSession};
use portfolio_backend::config::{ClientConfig, PortfolioConfig, PortfolioPaths};
use portfolio_backend::node::PortfolioNode;
use portfolio_backend::telemetry;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about = "Portfolio site server and comment CLI")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print the SQL that provisions the hosted tables
    Schema,
    /// Check that the configured storage has every table it needs
    CheckSchema,
    /// Read and write comments on a running server
    Comments {
        #[command(subcommand)]
        action: CommentsCommand,
    },
    /// Contact form
    Contact {
        #[command(subcommand)]
        action: ContactCommand,
    },
}

#[derive(Subcommand)]
enum CommentsCommand {
    /// List comments, newest first
    List,
    /// Post a new comment
    Post {
        #[arg(long)]
        name: String,
        #[arg(long)]
        message: String,
    },
    /// Edit a comment posted from this machine
    Edit {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        message: String,
    },
    /// Delete a comment posted from this machine
    Delete { id: String },
}

#[derive(Subcommand)]
enum ContactCommand {
    /// Send a contact message
    Send {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            on_ctrl_c.cancel();
        }
    });

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = PortfolioConfig::from_env()?;
            let node = PortfolioNode::start(config).await?;
            node.run_http_server(shutdown).await
        }
        Command::Schema => {
            cli::print_schema();
            Ok(())
        }
        Command::CheckSchema => {
            let config = PortfolioConfig::from_env()?;
            cli::check_schema(&config).await
        }
        Command::Comments { action } => {
            let session = client_session(shutdown)?;
            match action {
                CommentsCommand::List => session.list_comments().await,
                CommentsCommand::Post { name, message } => session.post_comment(name, message).await,
                CommentsCommand::Edit { id, name, message } => {
                    session.edit_comment(&id, name, message).await
                }
                CommentsCommand::Delete { id } => session.delete_comment(&id).await,
            }
        }
        Command::Contact {
            action:
                ContactCommand::Send {
                    name,
                    email,
                    message,
                },
        } => {
            let session = client_session(shutdown)?;
            session.send_contact(name, email, message).await
        }
    }
}

fn client_session(shutdown: CancellationToken) -> Result<ClientSession> {
    let paths = PortfolioPaths::discover()?;
    let config = ClientConfig::from_env(&paths);
    ClientSession::open(&config, shutdown)
}
