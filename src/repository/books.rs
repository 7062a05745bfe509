//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{BookStore, CatalogStore, SwapOutcome};
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, LendingUpdate, NewBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for BooksRepository {
    async fn load(&self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(book)
    }

    async fn compare_and_swap(
        &self,
        id: i64,
        expected_version: i64,
        update: &LendingUpdate,
    ) -> AppResult<SwapOutcome> {
        // The version predicate makes the row lock taken by UPDATE the only
        // serialization point: a concurrent writer leaves zero rows matched.
        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET available = $3, user_id = $4, borrow_date = $5, return_date = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(update.available)
        .bind(update.holder_id)
        .bind(update.borrow_date)
        .bind(update.return_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match book {
            Some(book) => SwapOutcome::Applied(book),
            None => SwapOutcome::VersionConflict,
        })
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn list(&self, page: i64, size: i64) -> AppResult<(Vec<Book>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY id LIMIT $1 OFFSET $2")
            .bind(size)
            .bind(page * size)
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    async fn isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
            .bind(isbn)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert(&self, book: &NewBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, publication_year, available, version)
            VALUES ($1, $2, $3, $4, TRUE, 0)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.publication_year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Book with ISBN {} already exists", book.isbn))
            }
            other => AppError::Database(other),
        })?;

        Ok(created)
    }
}
