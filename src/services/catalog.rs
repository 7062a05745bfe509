//! Catalogue browsing and administration

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, BookRequest, BookResponse, NewBook},
        ensure_valid,
        user::UserResponse,
        PaginatedResponse,
    },
    repository::{bounded, BookStore, CatalogStore, UserStore},
};

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    books: Arc<dyn BookStore>,
    users: Arc<dyn UserStore>,
    store_timeout: Duration,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        books: Arc<dyn BookStore>,
        users: Arc<dyn UserStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            books,
            users,
            store_timeout,
        }
    }

    /// One page of the catalogue
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<PaginatedResponse<BookResponse>> {
        let (page, size) = (query.page(), query.size());
        let (books, total) = bounded(self.store_timeout, "book listing", self.books.list(page, size)).await?;

        let mut items = Vec::with_capacity(books.len());
        for book in books {
            items.push(self.to_response(book).await?);
        }

        Ok(PaginatedResponse {
            items,
            total,
            page,
            size,
        })
    }

    /// Get a book by ID
    pub async fn get_book(&self, id: i64) -> AppResult<BookResponse> {
        let book = bounded(self.store_timeout, "catalog load", self.catalog.load(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        self.to_response(book).await
    }

    /// Add a book to the catalogue
    pub async fn create_book(&self, request: BookRequest) -> AppResult<BookResponse> {
        ensure_valid(&request)?;
        let new_book = NewBook::from(request);

        if bounded(self.store_timeout, "isbn check", self.books.isbn_exists(&new_book.isbn)).await? {
            return Err(AppError::Conflict(format!("Book with ISBN {} already exists", new_book.isbn)));
        }

        let book = bounded(self.store_timeout, "book insert", self.books.insert(&new_book)).await?;
        tracing::info!("Book {} added to the catalogue ({})", book.id, book.isbn);
        Ok(BookResponse::new(book, None))
    }

    /// Cheapest round-trip to the book store
    pub async fn ping(&self) -> AppResult<()> {
        bounded(self.store_timeout, "readiness probe", self.books.list(0, 1)).await?;
        Ok(())
    }

    /// Attach the borrower's public details to a book
    pub async fn to_response(&self, book: Book) -> AppResult<BookResponse> {
        let borrowed_by = self.borrower(book.holder_id).await?;
        Ok(BookResponse::new(book, borrowed_by))
    }

    /// Describe a book whose lending change is already stored.
    ///
    /// Never fails: if the borrower cannot be looked up, `borrowed_by` is
    /// left empty rather than reporting the committed change as an error.
    pub async fn describe_committed(&self, book: Book) -> BookResponse {
        let borrowed_by = match self.borrower(book.holder_id).await {
            Ok(borrowed_by) => borrowed_by,
            Err(e) => {
                tracing::warn!("Borrower details for book {} unavailable: {}", book.id, e);
                None
            }
        };
        BookResponse::new(book, borrowed_by)
    }

    async fn borrower(&self, holder_id: Option<i64>) -> AppResult<Option<UserResponse>> {
        let Some(holder_id) = holder_id else {
            return Ok(None);
        };
        let user = bounded(self.store_timeout, "user lookup", self.users.get_by_id(holder_id)).await?;
        Ok(user.map(|user| UserResponse::from(&user)))
    }
}
