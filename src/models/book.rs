//! Book (lendable item) model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{check_not_blank, user::UserResponse, FieldChecks};
use crate::error::FieldError;

/// Book model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: Option<i32>,
    pub available: bool,
    /// Current borrower. Not an ownership link: the user row outlives the loan.
    #[sqlx(rename = "user_id")]
    pub holder_id: Option<i64>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every lending transition
    pub version: i64,
}

/// Lending state of a book, derived from its availability columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingState {
    Available,
    CheckedOut { holder_id: i64, since: DateTime<Utc> },
}

impl Book {
    /// Derive the lending state. Rows that break the availability invariant
    /// are treated as checked out so that they can never be lent twice.
    pub fn lending_state(&self) -> LendingState {
        match (self.available, self.holder_id, self.borrow_date) {
            (true, None, None) => LendingState::Available,
            (_, Some(holder_id), since) => LendingState::CheckedOut {
                holder_id,
                since: since.unwrap_or(DateTime::<Utc>::MIN_UTC),
            },
            (_, None, _) => LendingState::CheckedOut {
                holder_id: 0,
                since: self.borrow_date.unwrap_or(DateTime::<Utc>::MIN_UTC),
            },
        }
    }

    /// `available <=> holder_id.is_none() <=> borrow_date.is_none()`
    pub fn is_consistent(&self) -> bool {
        self.available == self.holder_id.is_none() && self.available == self.borrow_date.is_none()
    }

    pub fn apply(&mut self, update: &LendingUpdate) {
        self.available = update.available;
        self.holder_id = update.holder_id;
        self.borrow_date = update.borrow_date;
        self.return_date = update.return_date;
    }
}

/// New lending columns written by a compare-and-swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingUpdate {
    pub available: bool,
    pub holder_id: Option<i64>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
}

impl LendingUpdate {
    pub fn checked_out(book: &Book, holder_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            available: false,
            holder_id: Some(holder_id),
            borrow_date: Some(now),
            return_date: book.return_date,
        }
    }

    pub fn returned(now: DateTime<Utc>) -> Self {
        Self {
            available: true,
            holder_id: None,
            borrow_date: None,
            return_date: Some(now),
        }
    }
}

/// New catalog entry
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: Option<i32>,
}

/// Create book request (admin)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BookRequest {
    #[validate(length(max = 100, message = "Title must be at most 100 characters"))]
    pub title: String,
    #[validate(length(max = 100, message = "Author name must be at most 100 characters"))]
    pub author: String,
    pub isbn: String,
    #[validate(required(message = "Publication year is required"))]
    pub publication_year: Option<i32>,
}

impl FieldChecks for BookRequest {
    fn extra_checks(&self, errors: &mut Vec<FieldError>) {
        check_not_blank(errors, "title", &self.title, "Title is required");
        check_not_blank(errors, "author", &self.author, "Author is required");
        if self.isbn.trim().is_empty() {
            errors.push(FieldError::new("isbn", "ISBN is required"));
        } else if !is_valid_isbn(&self.isbn) {
            errors.push(FieldError::new("isbn", "Invalid ISBN format"));
        }
    }
}

impl From<BookRequest> for NewBook {
    fn from(request: BookRequest) -> Self {
        Self {
            title: request.title.trim().to_string(),
            author: request.author.trim().to_string(),
            isbn: bare_isbn(&request.isbn),
            publication_year: request.publication_year,
        }
    }
}

static ISBN13: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ISBN(?:-13)?:? )?(97[89][- ]?[0-9]{1,5}[- ]?[0-9]+[- ]?[0-9]+[- ]?[0-9])$")
        .expect("static ISBN pattern")
});

/// The ISBN without any `ISBN:`/`ISBN-13:` label
pub fn bare_isbn(value: &str) -> String {
    let value = value.trim();
    ISBN13
        .captures(value)
        .and_then(|c| c.get(1))
        .map_or(value, |body| body.as_str())
        .to_string()
}

/// ISBN-13, either 13 bare digits or 17 characters with four separators
pub fn is_valid_isbn(value: &str) -> bool {
    let Some(body) = ISBN13.captures(value).and_then(|c| c.get(1)) else {
        return false;
    };
    let body = body.as_str();
    let digits = body.chars().filter(char::is_ascii_digit).count();
    let separators = body.len() - digits;

    match separators {
        0 => digits == 13,
        4 => body.len() == 17,
        _ => false,
    }
}

/// Book as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: Option<i32>,
    pub available: bool,
    pub borrow_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    /// Present while the book is checked out
    pub borrowed_by: Option<UserResponse>,
}

impl BookResponse {
    pub fn new(book: Book, borrowed_by: Option<UserResponse>) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publication_year: book.publication_year,
            available: book.available,
            borrow_date: book.borrow_date,
            return_date: book.return_date,
            borrowed_by,
        }
    }
}

/// Book listing query parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Page number, starting at 0
    pub page: Option<i64>,
    /// Page size (default 10, max 100)
    pub size: Option<i64>,
}

impl BookQuery {
    pub const DEFAULT_SIZE: i64 = 10;
    pub const MAX_SIZE: i64 = 100;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE)
    }
}
