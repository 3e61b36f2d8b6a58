//! SQLite persistence layer for the campaign pipeline.
//!
//! This crate provides async database operations for campaigns, contacts,
//! templates, the invitation log and the message log using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{campaign, contact, Database, NewContact};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:campaign.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Create a campaign and upsert a contact into it
//!     let survey = campaign::create_campaign(db.pool(), "Spring survey", "operator-1").await?;
//!     let batch = vec![NewContact {
//!         phone: "+15551234567".to_string(),
//!         name: "Jane".to_string(),
//!         fields: Default::default(),
//!     }];
//!     contact::upsert_contacts(db.pool(), &survey.id, &batch).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod contact;
pub mod error;
pub mod message;
pub mod models;
pub mod template;

pub use error::{DatabaseError, Result};
pub use message::StatusUpdate;
pub use models::{
    Campaign, Contact, Invitation, Message, MessageStatus, MessageType, NewContact, NewMessage,
    Party, Template, TemplateSections,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    /// Set high enough to handle concurrent uploads, dispatches and webhooks.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// // File database
    /// let db = database::Database::connect("sqlite:data/campaign.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing, keep a single connection)
    /// let db = database::Database::connect_with_pool_size("sqlite::memory:", 1).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Connect to a private in-memory database and run migrations.
    ///
    /// Every connection to `sqlite::memory:` opens a separate database, so
    /// the pool is pinned to one connection.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect_with_pool_size("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
