//! Startup data seeding

use std::time::Duration;

use crate::{
    config::SeedConfig,
    error::AppResult,
    models::{book::BookRequest, user::Role},
    repository::{bounded, Stores},
};

use super::Services;

/// Create the default accounts and sample books that are still missing
pub async fn seed_defaults(
    services: &Services,
    stores: &Stores,
    config: &SeedConfig,
    store_timeout: Duration,
) -> AppResult<()> {
    let accounts = [
        ("admin", config.admin_password.as_str(), "admin@library.com", Role::Admin),
        ("reader", config.reader_password.as_str(), "reader@library.com", Role::Reader),
    ];

    for (username, password, email, role) in accounts {
        if bounded(store_timeout, "username check", stores.users.username_exists(username)).await? {
            continue;
        }
        services.auth.create_user(username, password, email, role).await?;
        tracing::info!("Seeded {} account {}", role, username);
    }

    let books = [
        ("War and Peace", "Leo Tolstoy", "978-5-389-06256-6", 1869),
        ("Crime and Punishment", "Fyodor Dostoevsky", "978-5-17-090539-2", 1866),
    ];

    for (title, author, isbn, year) in books {
        if bounded(store_timeout, "isbn check", stores.books.isbn_exists(isbn)).await? {
            continue;
        }
        let book = services
            .catalog
            .create_book(BookRequest {
                title: title.to_string(),
                author: author.to_string(),
                isbn: isbn.to_string(),
                publication_year: Some(year),
            })
            .await?;
        tracing::info!("Seeded book {} ({})", book.id, book.title);
    }

    Ok(())
}
