//! Postgres catalog: documents, the word dictionary, and postings.
//!
//! The store is the single point of persistence for both binaries. Every
//! write runs in its own transaction; the conjunctive search is a single
//! read-only query. A `Store` owns one connection, so concurrent writers
//! (the crawl workers) each connect separately.

use crate::config::{Config, ConfigError};
use std::error::Error;
use std::fmt;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

/// Stable identifier of a stored document.
pub type DocumentId = i32;
/// Stable identifier of a dictionary word.
pub type WordId = i32;

/// One ranked row of a conjunctive search.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchResult {
    /// Identifier of the matching document.
    pub document_id: DocumentId,
    /// Absolute URL of the document.
    pub url: String,
    /// Stored title; may be empty.
    pub title: String,
    /// Sum of the query tokens' frequencies within the document.
    pub score: i64,
}

/// Failures surfaced by store operations.
#[derive(Debug)]
pub enum StoreError {
    /// The catalog could not be reached or a statement failed in transit.
    Unavailable(tokio_postgres::Error),
    /// The configuration lacks a connection parameter.
    Config(ConfigError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::Config(err) => write!(f, "storage configuration: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Config(err) => Some(err),
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Unavailable(err)
    }
}

impl From<ConfigError> for StoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id SERIAL PRIMARY KEY,
        url VARCHAR(2048) UNIQUE NOT NULL,
        title TEXT,
        content TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS words (
        id SERIAL PRIMARY KEY,
        surface VARCHAR(100) UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS postings (
        document INTEGER REFERENCES documents(id) ON DELETE CASCADE,
        word INTEGER REFERENCES words(id) ON DELETE CASCADE,
        frequency INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (document, word)
    )",
    "CREATE INDEX IF NOT EXISTS idx_words_surface ON words(surface)",
    "CREATE INDEX IF NOT EXISTS idx_postings_word ON postings(word)",
    "CREATE INDEX IF NOT EXISTS idx_postings_document ON postings(document)",
];

/// Handle to the shared catalog. Owns a single connection.
pub struct Store {
    client: Client,
}

impl Store {
    /// Connects using the `db_*` keys of `config`, forcing UTF-8 client
    /// encoding, and spawns the connection driver task.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(config.db_host()?)
            .port(config.db_port())
            .dbname(config.db_name()?)
            .user(config.db_user()?)
            .password(config.db_password()?)
            .options("-c client_encoding=UTF8");

        let (client, connection) = pg.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });

        Ok(Self { client })
    }

    /// Creates the three tables and three indexes if missing. Idempotent.
    pub async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let txn = self.client.transaction().await?;
        for statement in SCHEMA_STATEMENTS {
            txn.execute(*statement, &[]).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    /// Upserts a document by URL inside one transaction.
    ///
    /// Returns the document id and whether the row was newly inserted. An
    /// existing row keeps its title and content untouched.
    pub async fn insert_document(
        &mut self,
        url: &str,
        title: &str,
        content: &str,
    ) -> Result<(DocumentId, bool), StoreError> {
        let txn = self.client.transaction().await?;
        let inserted = txn
            .query_opt(
                "INSERT INTO documents (url, title, content) VALUES ($1, $2, $3)
                 ON CONFLICT (url) DO NOTHING
                 RETURNING id",
                &[&url, &title, &content],
            )
            .await?;
        let result = match inserted {
            Some(row) => (row.get::<_, DocumentId>(0), true),
            None => {
                let row = txn
                    .query_one("SELECT id FROM documents WHERE url = $1", &[&url])
                    .await?;
                (row.get::<_, DocumentId>(0), false)
            }
        };
        txn.commit().await?;
        Ok(result)
    }

    /// Upserts a dictionary entry by its already-normalized surface form.
    pub async fn get_or_create_word(&mut self, surface: &str) -> Result<WordId, StoreError> {
        let txn = self.client.transaction().await?;
        let inserted = txn
            .query_opt(
                "INSERT INTO words (surface) VALUES ($1)
                 ON CONFLICT (surface) DO NOTHING
                 RETURNING id",
                &[&surface],
            )
            .await?;
        let id = match inserted {
            Some(row) => row.get::<_, WordId>(0),
            None => {
                let row = txn
                    .query_one("SELECT id FROM words WHERE surface = $1", &[&surface])
                    .await?;
                row.get::<_, WordId>(0)
            }
        };
        txn.commit().await?;
        Ok(id)
    }

    /// Writes one posting; a conflicting (document, word) pair has the
    /// supplied frequency added to its stored value.
    pub async fn add_posting(
        &mut self,
        document: DocumentId,
        word: WordId,
        frequency: i32,
    ) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO postings (document, word, frequency) VALUES ($1, $2, $3)
                 ON CONFLICT (document, word)
                 DO UPDATE SET frequency = postings.frequency + EXCLUDED.frequency",
                &[&document, &word, &frequency],
            )
            .await?;
        Ok(())
    }

    /// Runs the conjunctive top-k ranking query over already-normalized,
    /// deduplicated tokens. Empty input short-circuits to no results.
    pub async fn search_conjunctive_top_k(
        &self,
        tokens: &[String],
        limit: i64,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let sql = build_search_sql(tokens.len());
        let token_count = tokens.len() as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(tokens.len() + 2);
        for token in tokens {
            params.push(token);
        }
        params.push(&token_count);
        params.push(&limit);

        let rows = self.client.query(sql.as_str(), &params).await?;
        let results = rows
            .iter()
            .map(|row| SearchResult {
                document_id: row.get("id"),
                url: row.get("url"),
                title: row.get::<_, Option<String>>("title").unwrap_or_default(),
                score: row.get("score"),
            })
            .collect();
        Ok(results)
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> Result<i64, StoreError> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM documents", &[])
            .await?;
        Ok(row.get(0))
    }

    /// Number of dictionary words.
    pub async fn word_count(&self) -> Result<i64, StoreError> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM words", &[])
            .await?;
        Ok(row.get(0))
    }
}

/// Builds the ranking query for `token_count` tokens.
///
/// The `IN` list binds `$1..$n`; `$n+1` is the distinct-token count for the
/// conjunctive `HAVING` clause and `$n+2` the row limit, so the statement
/// shape is identical for every query width.
fn build_search_sql(token_count: usize) -> String {
    let placeholders: Vec<String> = (1..=token_count).map(|i| format!("${i}")).collect();
    format!(
        "SELECT d.id, d.url, d.title, SUM(p.frequency) AS score
         FROM documents d
         JOIN postings p ON p.document = d.id
         JOIN words w ON p.word = w.id
         WHERE w.surface IN ({placeholders})
         GROUP BY d.id, d.url, d.title
         HAVING COUNT(DISTINCT w.id) = ${count_param}
         ORDER BY score DESC
         LIMIT ${limit_param}",
        placeholders = placeholders.join(", "),
        count_param = token_count + 1,
        limit_param = token_count + 2,
    )
}
