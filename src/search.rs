//! Substring search over extracted document text

use sqlx::SqlitePool;

use crate::db::{Book, BookRepository, DocumentRepository};
use crate::error::{AppError, Result};

pub const MAX_QUERY_CHARS: usize = 255;

pub struct SearchIndex {
    db: SqlitePool,
}

impl SearchIndex {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Books with at least one document containing `query`, in no
    /// particular order
    pub async fn search(&self, query: &str) -> Result<Vec<Book>> {
        let length = query.chars().count();
        if length == 0 || length > MAX_QUERY_CHARS {
            return Err(AppError::InvalidInput(format!(
                "query must be between 1 and {} characters",
                MAX_QUERY_CHARS
            )));
        }

        let ids = DocumentRepository::new(&self.db).matching_book_ids(query).await?;
        let books = BookRepository::new(&self.db).list_by_ids(&ids).await?;

        tracing::debug!(query = %query, matches = books.len(), "Document search");
        Ok(books)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, Language, NewBook, RecordedUpload, StoragePointers};

    async fn book_with_text(pool: &SqlitePool, title: &str, text: &str) -> String {
        let book = BookRepository::new(pool)
            .create(&NewBook {
                title: title.to_string(),
                author: "Anon".to_string(),
                category: "Misc".to_string(),
                language: Language::En,
                tags: vec![],
                description: None,
                cover_image_url: None,
            })
            .await
            .unwrap();

        DocumentRepository::new(pool)
            .record_upload(&RecordedUpload {
                book_id: book.id.clone(),
                filename: format!("{}_doc.pdf", book.id),
                content_text: text.to_string(),
                sha256: String::new(),
                size: 0,
                storage: StoragePointers::default(),
            })
            .await
            .unwrap();

        book.id
    }

    #[tokio::test]
    async fn test_single_match() {
        let pool = create_memory_pool().await.unwrap();
        let moby = book_with_text(&pool, "Moby Dick", "Call me Ishmael").await;
        book_with_text(&pool, "Walden", "I went to the woods").await;

        let books = SearchIndex::new(pool).search("ishmael").await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, moby);
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let pool = create_memory_pool().await.unwrap();
        book_with_text(&pool, "Walden", "I went to the woods").await;

        assert!(SearchIndex::new(pool).search("whale").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_length_bounds() {
        let pool = create_memory_pool().await.unwrap();
        let index = SearchIndex::new(pool);

        assert!(matches!(index.search("").await, Err(AppError::InvalidInput(_))));
        assert!(matches!(
            index.search(&"a".repeat(256)).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(index.search(&"a".repeat(255)).await.unwrap().is_empty());
    }
}
