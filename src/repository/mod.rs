//! Repository layer: store interfaces and their implementations

pub mod books;
pub mod memory;
pub mod users;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult, LendingError},
    models::{
        book::{Book, LendingUpdate, NewBook},
        user::{Identity, NewUser, User},
    },
};

/// Resolves a token subject to the identity currently on record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> AppResult<Option<Identity>>;
}

/// Account storage used by registration and login
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>>;
    async fn username_exists(&self, username: &str) -> AppResult<bool>;
    async fn email_exists(&self, email: &str) -> AppResult<bool>;
    async fn insert(&self, user: &NewUser) -> AppResult<User>;
}

/// Outcome of a versioned write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Applied(Book),
    VersionConflict,
}

impl SwapOutcome {
    /// The updated book, or the conflict that made the write lose
    pub fn into_result(self, id: i64) -> Result<Book, LendingError> {
        match self {
            SwapOutcome::Applied(book) => Ok(book),
            SwapOutcome::VersionConflict => Err(LendingError::VersionConflict(id)),
        }
    }
}

/// Durable lending state of books
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load(&self, id: i64) -> AppResult<Option<Book>>;

    /// Write `update` only if the stored version still equals `expected_version`.
    /// A successful swap bumps the version by one.
    async fn compare_and_swap(
        &self,
        id: i64,
        expected_version: i64,
        update: &LendingUpdate,
    ) -> AppResult<SwapOutcome>;
}

/// Catalogue browsing and administration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn list(&self, page: i64, size: i64) -> AppResult<(Vec<Book>, i64)>;
    async fn isbn_exists(&self, isbn: &str) -> AppResult<bool>;
    async fn insert(&self, book: &NewBook) -> AppResult<Book>;
}

/// Every store the services depend on
#[derive(Clone)]
pub struct Stores {
    pub directory: Arc<dyn IdentityDirectory>,
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub books: Arc<dyn BookStore>,
}

/// Postgres-backed repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub users: Arc<users::UsersRepository>,
    pub books: Arc<books::BooksRepository>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            pool,
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            directory: self.users.clone(),
            users: self.users.clone(),
            catalog: self.books.clone(),
            books: self.books.clone(),
        }
    }
}

/// Run a store call, giving up with `StoreUnavailable` after `timeout`
pub async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::StoreUnavailable(format!(
            "{} did not complete within {} ms",
            what,
            timeout.as_millis()
        ))),
    }
}
