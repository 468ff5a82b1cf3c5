use crate::bootstrap;
use crate::client::{CommentComposer, JsonFileStore, OwnershipTracker, PortfolioClient};
use crate::comments::CommentInput;
use crate::config::{ClientConfig, PortfolioConfig};
use crate::contacts::ContactInput;
use crate::store::rest::HOSTED_SCHEMA_SQL;
use crate::store::Comment;
use crate::utils::display_timestamp;
use anyhow::{Context, Result};
use html2text::from_read;
use tokio_util::sync::CancellationToken;

const TEXT_WIDTH: usize = 80;

pub fn print_schema() {
    println!("{HOSTED_SCHEMA_SQL}");
}

/// Probes every table the services use. A missing table is reported with the
/// DDL to create it rather than as a failure.
pub async fn check_schema(config: &PortfolioConfig) -> Result<()> {
    let store = bootstrap::open_store(config)?;
    match store.probe().await {
        Ok(()) => {
            println!("{} storage is ready.", store.backend_name());
            Ok(())
        }
        Err(err) if err.is_missing_relation() => {
            println!("{err}. Run the following in the hosted SQL editor:\n");
            print_schema();
            Ok(())
        }
        Err(err) => Err(err).context("storage probe failed"),
    }
}

/// Comment and contact commands run against a live server.
pub struct ClientSession {
    composer: CommentComposer,
    client: PortfolioClient,
    cancel: CancellationToken,
}

impl ClientSession {
    pub fn open(config: &ClientConfig, cancel: CancellationToken) -> Result<Self> {
        let client = PortfolioClient::new(config.api_url.clone())?;
        let tracker = OwnershipTracker::load(Box::new(JsonFileStore::new(&config.state_path)))
            .with_context(|| format!("failed to load {}", config.state_path.display()))?;
        Ok(Self {
            composer: CommentComposer::new(client.clone(), tracker),
            client,
            cancel,
        })
    }

    pub async fn list_comments(&self) -> Result<()> {
        let comments = self.composer.refresh(&self.cancel).await?;
        if comments.is_empty() {
            println!("No comments yet.");
            return Ok(());
        }
        for comment in &comments {
            self.print_comment(comment);
        }
        Ok(())
    }

    pub async fn post_comment(&self, name: String, message: String) -> Result<()> {
        let id = self
            .composer
            .submit(CommentInput { name, message }, &self.cancel)
            .await?;
        match id {
            Some(id) => println!("Comment posted ({id})."),
            None => println!("Comment posted."),
        }
        Ok(())
    }

    pub async fn edit_comment(&self, id: &str, name: String, message: String) -> Result<()> {
        let updated = self
            .composer
            .edit(id, CommentInput { name, message }, &self.cancel)
            .await?;
        println!("Comment updated.");
        self.print_comment(&updated);
        Ok(())
    }

    pub async fn delete_comment(&self, id: &str) -> Result<()> {
        self.composer.delete(id, &self.cancel).await?;
        println!("Comment {id} deleted.");
        Ok(())
    }

    pub async fn send_contact(&self, name: String, email: String, message: String) -> Result<()> {
        let input = ContactInput {
            name,
            email,
            message,
        };
        input.require_fields()?;
        self.client.send_contact(&input, &self.cancel).await?;
        println!("Thanks! Your message has been sent.");
        Ok(())
    }

    fn print_comment(&self, comment: &Comment) {
        let marker = if self.composer.is_mine(&comment.id) {
            " (yours)"
        } else {
            ""
        };
        println!(
            "{} | {}{} | {}",
            comment.id,
            comment.name,
            marker,
            display_timestamp(&comment.created_at)
        );
        let text = from_read(comment.message.as_bytes(), TEXT_WIDTH);
        for line in text.trim().replace('\u{00a0}', " ").lines() {
            println!("    {line}");
        }
    }
}
