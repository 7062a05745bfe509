//! Catalogue and lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::policy,
    error::AppResult,
    models::{
        book::{BookQuery, BookRequest, BookResponse},
        user::Role,
        PaginatedResponse,
    },
};

use super::CurrentPrincipal;

/// List the catalogue, one page at a time
#[utoipa::path(
    get,
    path = "/books/public",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = PaginatedResponse<BookResponse>)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookResponse>>> {
    let page = state.services.catalog.list_books(&query).await?;
    Ok(Json(page))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/books/public/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<BookResponse>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book checked out to the caller", body = BookResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Reader role required", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is already checked out", body = crate::error::ErrorResponse),
        (status = 503, description = "Catalogue store unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    principal: CurrentPrincipal,
    Path(id): Path<i64>,
) -> AppResult<Json<BookResponse>> {
    let principal = policy::require(principal.as_ref(), Role::Reader)?;

    let book = state.services.lending.checkout(id, principal).await?;
    Ok(Json(state.services.catalog.describe_committed(book).await))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = BookResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Reader role required", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is not checked out, or is held by someone else", body = crate::error::ErrorResponse),
        (status = 503, description = "Catalogue store unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    principal: CurrentPrincipal,
    Path(id): Path<i64>,
) -> AppResult<Json<BookResponse>> {
    let principal = policy::require(principal.as_ref(), Role::Reader)?;

    let book = state.services.lending.return_item(id, principal).await?;
    Ok(Json(BookResponse::new(book, None)))
}

/// Add a book to the catalogue
#[utoipa::path(
    post,
    path = "/admin/books",
    tag = "admin",
    security(("bearer_auth" = [])),
    request_body = BookRequest,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Invalid book data", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already catalogued", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    principal: CurrentPrincipal,
    Json(request): Json<BookRequest>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    policy::require(principal.as_ref(), Role::Admin)?;

    let book = state.services.catalog.create_book(request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}
