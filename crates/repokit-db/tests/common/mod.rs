//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::BoxFuture;
use repokit_db::{Database, DbConfig, DbResult, Entity, Filter, Query, SoftDeletable, Value};
use sqlx::migrate::Migrator;
use sqlx::SqliteConnection;

static MIGRATOR: Migrator = sqlx::migrate!("./tests/migrations");

/// Initializes test logging once; `RUST_LOG=debug` shows repository spans.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory database with the fixture schema applied.
pub async fn database() -> Database {
    init_tracing();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.run_migrations(&MIGRATOR).await.unwrap();
    db
}

// =============================================================================
// Widget
// =============================================================================

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Widget {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Widget {
    pub fn new(id: &str, name: &str, category: &str, price_cents: i64) -> Self {
        Widget {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price_cents,
            is_deleted: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    /// Widget `w01`..`wNN` with prices 100, 200, ...
    pub fn numbered(n: usize) -> Vec<Widget> {
        (1..=n)
            .map(|i| {
                let category = if i % 2 == 0 { "even" } else { "odd" };
                Widget::new(&format!("w{i:02}"), &format!("widget {i}"), category, i as i64 * 100)
            })
            .collect()
    }
}

impl Entity for Widget {
    type Key = String;
    const TABLE: &'static str = "widgets";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "category",
        "price_cents",
        "is_deleted",
        "created_at",
    ];

    fn key(&self) -> Option<String> {
        (!self.id.is_empty()).then(|| self.id.clone())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.category.clone().into(),
            self.price_cents.into(),
            self.is_deleted.into(),
            self.created_at.into(),
        ]
    }
}

impl SoftDeletable for Widget {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.is_deleted = deleted;
    }
}

/// Projection of a widget's name and price.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WidgetPrice {
    pub name: String,
    pub price_cents: i64,
}

// =============================================================================
// Author / Book
// =============================================================================

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    #[sqlx(skip)]
    pub books: Vec<Book>,
}

impl Author {
    pub fn new(id: i64, name: &str) -> Self {
        Author {
            id,
            name: name.to_string(),
            books: Vec::new(),
        }
    }
}

impl Entity for Author {
    type Key = i64;
    const TABLE: &'static str = "authors";
    const COLUMNS: &'static [&'static str] = &["id", "name"];
    const INCLUDES: &'static [&'static str] = &["books"];

    fn key(&self) -> Option<i64> {
        Some(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }

    fn load_include<'a>(
        authors: &'a mut [Self],
        include: &'a str,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, DbResult<()>> {
        Box::pin(async move {
            debug_assert_eq!(include, "books");

            let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
            let books = Query::<Book>::default()
                .filter(Filter::is_in("author_id", ids))
                .order_by("id")
                .fetch_all(conn)
                .await?;

            for author in authors.iter_mut() {
                author.books = books
                    .iter()
                    .filter(|b| b.author_id == author.id)
                    .cloned()
                    .collect();
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
}

impl Book {
    pub fn new(id: i64, author_id: i64, title: &str) -> Self {
        Book {
            id,
            author_id,
            title: title.to_string(),
        }
    }
}

impl Entity for Book {
    type Key = i64;
    const TABLE: &'static str = "books";
    const COLUMNS: &'static [&'static str] = &["id", "author_id", "title"];

    fn key(&self) -> Option<i64> {
        Some(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.author_id.into(), self.title.clone().into()]
    }
}

// =============================================================================
// Note
// =============================================================================

/// Keyed by SQLite's rowid; `id` is `None` until inserted.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Note {
    pub id: Option<i64>,
    pub body: String,
}

impl Note {
    pub fn new(body: &str) -> Self {
        Note {
            id: None,
            body: body.to_string(),
        }
    }
}

impl Entity for Note {
    type Key = i64;
    const TABLE: &'static str = "notes";
    const COLUMNS: &'static [&'static str] = &["id", "body"];
    const GENERATED_KEY: bool = true;

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.body.clone().into()]
    }
}
