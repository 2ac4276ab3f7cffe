//! Book catalog database operations

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};

const BOOK_COLUMNS: &str = r#"
    id, title, author, description, cover_image_url, pdf_url, thumbnail_path,
    category, tags, language, pdf_public_id, thumbnail_public_id,
    created_at, updated_at,
    EXISTS(SELECT 1 FROM documents d WHERE d.book_id = books.id) AS has_documents
"#;

/// Book row as stored (tags kept as a JSON array string)
#[derive(Debug, Clone, sqlx::FromRow)]
struct BookRecord {
    id: String,
    title: String,
    author: String,
    description: Option<String>,
    cover_image_url: Option<String>,
    pdf_url: Option<String>,
    thumbnail_path: Option<String>,
    category: String,
    tags: String,
    language: String,
    pdf_public_id: Option<String>,
    thumbnail_public_id: Option<String>,
    created_at: String,
    updated_at: String,
    has_documents: bool,
}

/// Catalog entry owning zero or more documents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub pdf_url: Option<String>,
    pub thumbnail_path: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub language: String,
    pub pdf_public_id: Option<String>,
    pub thumbnail_public_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub has_documents: bool,
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        let tags = serde_json::from_str(&record.tags).unwrap_or_else(|e| {
            tracing::warn!(book_id = %record.id, "Unreadable tags column: {}", e);
            Vec::new()
        });

        Book {
            id: record.id,
            title: record.title,
            author: record.author,
            description: record.description,
            cover_image_url: record.cover_image_url,
            pdf_url: record.pdf_url,
            thumbnail_path: record.thumbnail_path,
            category: record.category,
            tags,
            language: record.language,
            pdf_public_id: record.pdf_public_id,
            thumbnail_public_id: record.thumbnail_public_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            has_documents: record.has_documents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    Fr,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Fr => "FR",
            Language::En => "EN",
        }
    }
}

/// Book creation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub category: String,
    pub language: Language,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
}

/// Book repository
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a book by id
    pub async fn get(&self, id: &str) -> Result<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE id = ?",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record.map(Book::from))
    }

    /// Fetch every book whose id is in `ids`; unknown ids are ignored
    pub async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Book>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM books WHERE id IN (", BOOK_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<BookRecord>()
            .fetch_all(self.pool)
            .await?;

        Ok(records.into_iter().map(Book::from).collect())
    }

    /// Books whose thumbnail has never been generated
    pub async fn list_for_thumbnails(&self, only_missing: bool, limit: Option<i64>) -> Result<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            r#"
            SELECT {} FROM books
            WHERE (? = 0 OR (thumbnail_path IS NULL AND thumbnail_public_id IS NULL))
            ORDER BY created_at
            LIMIT ?
            "#,
            BOOK_COLUMNS
        ))
        .bind(only_missing)
        .bind(limit.unwrap_or(-1))
        .fetch_all(self.pool)
        .await?;

        Ok(records.into_iter().map(Book::from).collect())
    }

    /// Create a book, registering its category if it is new
    pub async fn create(&self, book: &NewBook) -> Result<Book> {
        let category = book.category.trim();
        if category.is_empty() {
            return Err(AppError::InvalidInput("category must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let tags = serde_json::to_string(&book.tags)
            .map_err(|e| AppError::Internal(format!("Failed to encode tags: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO categories (name) VALUES (?)")
            .bind(category)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, description, cover_image_url, category,
                               tags, language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_image_url)
        .bind(category)
        .bind(&tags)
        .bind(book.language.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created book".to_string()))
    }

    /// Record a locally generated thumbnail
    pub async fn set_thumbnail_path(&self, id: &str, thumbnail_path: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query("UPDATE books SET thumbnail_path = ?, updated_at = ? WHERE id = ?")
            .bind(thumbnail_path)
            .bind(&now)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a book; its documents go with it
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn sample(category: &str) -> NewBook {
        NewBook {
            title: "Les Misérables".to_string(),
            author: "Victor Hugo".to_string(),
            category: category.to_string(),
            language: Language::Fr,
            tags: vec!["classic".to_string(), "novel".to_string()],
            description: None,
            cover_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = create_memory_pool().await.unwrap();
        let repo = BookRepository::new(&pool);

        let created = repo.create(&sample("Fiction")).await.unwrap();
        assert_eq!(created.tags, vec!["classic", "novel"]);
        assert_eq!(created.language, "FR");
        assert!(!created.has_documents);
        assert!(created.pdf_public_id.is_none());

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_category_is_shared() {
        let pool = create_memory_pool().await.unwrap();
        let repo = BookRepository::new(&pool);

        repo.create(&sample("Fiction")).await.unwrap();
        repo.create(&sample("Fiction")).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_empty_category_rejected() {
        let pool = create_memory_pool().await.unwrap();
        let repo = BookRepository::new(&pool);

        let result = repo.create(&sample("   ")).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_by_ids_ignores_unknown() {
        let pool = create_memory_pool().await.unwrap();
        let repo = BookRepository::new(&pool);

        let a = repo.create(&sample("Fiction")).await.unwrap();
        let b = repo.create(&sample("Poetry")).await.unwrap();

        let books = repo
            .list_by_ids(&[a.id.clone(), "missing".to_string(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(books.len(), 2);
        assert!(repo.list_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = create_memory_pool().await.unwrap();
        let repo = BookRepository::new(&pool);

        let book = repo.create(&sample("Fiction")).await.unwrap();
        assert!(repo.delete(&book.id).await.unwrap());
        assert!(!repo.delete(&book.id).await.unwrap());
        assert!(repo.get(&book.id).await.unwrap().is_none());
    }
}
