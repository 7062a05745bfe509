//! In-memory store, used by tests and for running without a database

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BookStore, CatalogStore, IdentityDirectory, Stores, SwapOutcome, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, LendingUpdate, NewBook},
        user::{Identity, NewUser, Role, User},
    },
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    books: BTreeMap<i64, Book>,
    next_user_id: i64,
    next_book_id: i64,
}

/// Users and books kept behind a single async lock
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        let store = Arc::new(self.clone());
        Stores {
            directory: store.clone(),
            users: store.clone(),
            catalog: store.clone(),
            books: store,
        }
    }

    /// Insert a user whose password is already hashed
    pub async fn add_user(&self, username: &str, password_hash: &str, role: Role) -> User {
        let mut tables = self.tables.write().await;
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            username: username.to_string(),
            password: password_hash.to_string(),
            email: format!("{}@library.test", username),
            role,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    pub async fn set_role(&self, username: &str, role: Role) {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.values_mut().find(|u| u.username == username) {
            user.role = role;
        }
    }

    pub async fn add_book(&self, title: &str, isbn: &str) -> Book {
        let mut tables = self.tables.write().await;
        insert_book(
            &mut tables,
            &NewBook {
                title: title.to_string(),
                author: "Unknown".to_string(),
                isbn: isbn.to_string(),
                publication_year: None,
            },
        )
    }

    pub async fn book(&self, id: i64) -> Option<Book> {
        self.tables.read().await.books.get(&id).cloned()
    }
}

fn insert_book(tables: &mut Tables, book: &NewBook) -> Book {
    tables.next_book_id += 1;
    let created = Book {
        id: tables.next_book_id,
        title: book.title.clone(),
        author: book.author.clone(),
        isbn: book.isbn.clone(),
        publication_year: book.publication_year,
        available: true,
        holder_id: None,
        borrow_date: None,
        return_date: None,
        version: 0,
    };
    tables.books.insert(created.id, created.clone());
    created
}

#[async_trait]
impl IdentityDirectory for MemoryStore {
    async fn find_by_subject(&self, subject: &str) -> AppResult<Option<Identity>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == subject)
            .map(User::identity))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn insert(&self, user: &NewUser) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .users
            .values()
            .any(|u| u.username == user.username || u.email.eq_ignore_ascii_case(&user.email));
        if duplicate {
            return Err(AppError::Conflict("Username or email already registered".to_string()));
        }

        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            username: user.username.clone(),
            password: user.password_hash.clone(),
            email: user.email.clone(),
            role: user.role,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn load(&self, id: i64) -> AppResult<Option<Book>> {
        Ok(self.tables.read().await.books.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        id: i64,
        expected_version: i64,
        update: &LendingUpdate,
    ) -> AppResult<SwapOutcome> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if book.version != expected_version {
            return Ok(SwapOutcome::VersionConflict);
        }

        book.apply(update);
        book.version += 1;
        Ok(SwapOutcome::Applied(book.clone()))
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list(&self, page: i64, size: i64) -> AppResult<(Vec<Book>, i64)> {
        let tables = self.tables.read().await;
        let total = tables.books.len() as i64;
        let books = tables
            .books
            .values()
            .skip((page * size).max(0) as usize)
            .take(size.max(0) as usize)
            .cloned()
            .collect();
        Ok((books, total))
    }

    async fn isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.books.values().any(|b| b.isbn == isbn))
    }

    async fn insert(&self, book: &NewBook) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        if tables.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::Conflict(format!("Book with ISBN {} already exists", book.isbn)));
        }
        Ok(insert_book(&mut tables, book))
    }
}
