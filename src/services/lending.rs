//! Book lending: checkout and return with a single holder per book
//!
//! Every transition is load -> check -> versioned swap. A swap that loses a
//! race re-reads the book and re-checks it, a bounded number of times.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult, LendingError},
    models::{
        book::{Book, LendingState, LendingUpdate},
        user::Principal,
    },
    repository::{bounded, CatalogStore, IdentityDirectory},
};

#[derive(Clone)]
pub struct LendingService {
    catalog: Arc<dyn CatalogStore>,
    directory: Arc<dyn IdentityDirectory>,
    max_conflict_retries: u32,
    store_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Checkout,
    Return,
}

impl LendingService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn IdentityDirectory>,
        config: &LendingConfig,
    ) -> Self {
        Self {
            catalog,
            directory,
            max_conflict_retries: config.max_conflict_retries,
            store_timeout: config.store_timeout(),
        }
    }

    /// Lend a book to the requesting principal
    pub async fn checkout(&self, book_id: i64, principal: &Principal) -> AppResult<Book> {
        tracing::info!("User {} wants to borrow book {}", principal.subject, book_id);
        let book = self.run(Transition::Checkout, book_id, principal).await?;
        tracing::info!("Book {} borrowed by {}", book_id, principal.subject);
        Ok(book)
    }

    /// Take a book back from its current holder
    pub async fn return_item(&self, book_id: i64, principal: &Principal) -> AppResult<Book> {
        tracing::info!("User {} wants to return book {}", principal.subject, book_id);
        let book = self.run(Transition::Return, book_id, principal).await?;
        tracing::info!("Book {} returned by {}", book_id, principal.subject);
        Ok(book)
    }

    async fn run(&self, transition: Transition, book_id: i64, principal: &Principal) -> AppResult<Book> {
        let mut holder_id = None;

        for attempt in 0..=self.max_conflict_retries {
            let book = bounded(self.store_timeout, "catalog load", self.catalog.load(book_id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

            // State is checked before the borrower is resolved
            precheck(transition, &book)?;

            let id = match holder_id {
                Some(id) => id,
                None => {
                    let id = self.resolve(principal).await?;
                    holder_id = Some(id);
                    id
                }
            };

            let update = plan(transition, &book, id, Utc::now())?;

            let outcome = bounded(
                self.store_timeout,
                "catalog swap",
                self.catalog.compare_and_swap(book_id, book.version, &update),
            )
            .await?;

            match outcome.into_result(book_id) {
                Ok(updated) => return Ok(updated),
                Err(conflict) => {
                    tracing::debug!("{} ({:?}, attempt {})", conflict, transition, attempt + 1);
                }
            }
        }

        tracing::warn!(
            "Giving up on book {} after {} version conflicts",
            book_id,
            self.max_conflict_retries + 1
        );
        Err(LendingError::ItemUnavailable(book_id).into())
    }

    async fn resolve(&self, principal: &Principal) -> AppResult<i64> {
        bounded(
            self.store_timeout,
            "identity lookup",
            self.directory.find_by_subject(&principal.subject),
        )
        .await?
        .map(|identity| identity.id)
        .ok_or_else(|| LendingError::UnknownHolder(principal.subject.clone()).into())
    }
}

fn precheck(transition: Transition, book: &Book) -> Result<(), LendingError> {
    match (transition, book.lending_state()) {
        (Transition::Checkout, LendingState::CheckedOut { .. }) => Err(LendingError::ItemUnavailable(book.id)),
        (Transition::Return, LendingState::Available) => Err(LendingError::ItemNotCheckedOut(book.id)),
        _ => Ok(()),
    }
}

/// Compute the new lending columns for `transition`, or why it is refused
fn plan(transition: Transition, book: &Book, holder_id: i64, now: DateTime<Utc>) -> Result<LendingUpdate, LendingError> {
    match (transition, book.lending_state()) {
        (Transition::Checkout, LendingState::Available) => Ok(LendingUpdate::checked_out(book, holder_id, now)),
        (Transition::Checkout, LendingState::CheckedOut { .. }) => Err(LendingError::ItemUnavailable(book.id)),
        (Transition::Return, LendingState::Available) => Err(LendingError::ItemNotCheckedOut(book.id)),
        (Transition::Return, LendingState::CheckedOut { holder_id: current, .. }) => {
            if current == holder_id {
                Ok(LendingUpdate::returned(now))
            } else {
                Err(LendingError::NotHolder(book.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::Role,
        repository::{memory::MemoryStore, MockCatalogStore, SwapOutcome},
    };

    fn principal(name: &str) -> Principal {
        Principal {
            subject: name.to_string(),
            role: Role::Reader,
        }
    }

    fn config() -> LendingConfig {
        LendingConfig {
            max_conflict_retries: 3,
            store_timeout_ms: 500,
        }
    }

    async fn setup() -> (MemoryStore, LendingService, Book) {
        let store = MemoryStore::new();
        store.add_user("alice", "x", Role::Reader).await;
        store.add_user("bob", "x", Role::Reader).await;
        let book = store.add_book("War and Peace", "978-5-389-06256-6").await;

        let stores = store.stores();
        let service = LendingService::new(stores.catalog, stores.directory, &config());
        (store, service, book)
    }

    fn lending_error(result: AppResult<Book>) -> LendingError {
        match result {
            Err(AppError::Lending(e)) => e,
            other => panic!("expected a lending error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_alice_and_bob() {
        let (store, service, book) = setup().await;
        let alice = principal("alice");
        let bob = principal("bob");

        let lent = service.checkout(book.id, &alice).await.unwrap();
        assert!(!lent.available);
        assert_eq!(lent.holder_id, Some(1));
        assert!(lent.borrow_date.is_some());

        assert_eq!(
            lending_error(service.checkout(book.id, &bob).await),
            LendingError::ItemUnavailable(book.id)
        );
        assert_eq!(
            lending_error(service.return_item(book.id, &bob).await),
            LendingError::NotHolder(book.id)
        );

        // Bob's failed attempts leave the loan untouched
        assert_eq!(store.book(book.id).await.unwrap(), lent);

        let returned = service.return_item(book.id, &alice).await.unwrap();
        assert!(returned.available);
        assert_eq!(returned.holder_id, None);
        assert_eq!(returned.borrow_date, None);
        assert!(returned.return_date.is_some());
        assert!(returned.is_consistent());
    }

    #[tokio::test]
    async fn test_round_trip_cycles() {
        let (_store, service, book) = setup().await;
        let alice = principal("alice");

        for _ in 0..3 {
            service.checkout(book.id, &alice).await.unwrap();
            let back = service.return_item(book.id, &alice).await.unwrap();
            assert_eq!(back.lending_state(), LendingState::Available);
        }
    }

    #[tokio::test]
    async fn test_return_of_available_book() {
        let (_store, service, book) = setup().await;
        assert_eq!(
            lending_error(service.return_item(book.id, &principal("alice")).await),
            LendingError::ItemNotCheckedOut(book.id)
        );
    }

    #[tokio::test]
    async fn test_unknown_holder() {
        let (store, service, book) = setup().await;
        assert_eq!(
            lending_error(service.checkout(book.id, &principal("mallory")).await),
            LendingError::UnknownHolder("mallory".to_string())
        );
        assert!(store.book(book.id).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let (_store, service, _book) = setup().await;
        let result = service.checkout(404, &principal("alice")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_have_one_winner() {
        let store = MemoryStore::new();
        let mut readers = Vec::new();
        for i in 0..16 {
            let name = format!("reader{}", i);
            store.add_user(&name, "x", Role::Reader).await;
            readers.push(principal(&name));
        }
        let book = store.add_book("Dead Souls", "978-5-17-090539-2").await;
        let stores = store.stores();
        let service = LendingService::new(stores.catalog, stores.directory, &config());

        let handles: Vec<_> = readers
            .into_iter()
            .map(|reader| {
                let service = service.clone();
                tokio::spawn(async move { service.checkout(book.id, &reader).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::Lending(LendingError::ItemUnavailable(id))) => assert_eq!(id, book.id),
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }

        assert_eq!(winners, 1);
        let stored = store.book(book.id).await.unwrap();
        assert!(!stored.available);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_a_bounded_number_of_times() {
        let store = MemoryStore::new();
        store.add_user("alice", "x", Role::Reader).await;
        let book = store.add_book("Oblomov", "978-5-389-06256-6").await;

        let mut catalog = MockCatalogStore::new();
        let loaded = book.clone();
        catalog.expect_load().times(4).returning(move |_| Ok(Some(loaded.clone())));
        catalog
            .expect_compare_and_swap()
            .times(4)
            .returning(|_, _, _| Ok(SwapOutcome::VersionConflict));

        let service = LendingService::new(Arc::new(catalog), store.stores().directory, &config());
        assert_eq!(
            lending_error(service.checkout(book.id, &principal("alice")).await),
            LendingError::ItemUnavailable(book.id)
        );
    }

    #[tokio::test]
    async fn test_conflict_then_success() {
        let store = MemoryStore::new();
        store.add_user("alice", "x", Role::Reader).await;
        let book = store.add_book("Oblomov", "978-5-389-06256-6").await;

        let mut catalog = MockCatalogStore::new();
        let loaded = book.clone();
        catalog.expect_load().times(2).returning(move |_| Ok(Some(loaded.clone())));
        let mut seq = mockall::Sequence::new();
        catalog
            .expect_compare_and_swap()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(SwapOutcome::VersionConflict));
        let mut swapped = book.clone();
        catalog
            .expect_compare_and_swap()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _, update| {
                let mut b = swapped.clone();
                b.apply(update);
                b.version += 1;
                swapped = b.clone();
                Ok(SwapOutcome::Applied(b))
            });

        let service = LendingService::new(Arc::new(catalog), store.stores().directory, &config());
        let lent = service.checkout(book.id, &principal("alice")).await.unwrap();
        assert_eq!(lent.holder_id, Some(1));
        assert_eq!(lent.version, 1);
    }

    #[tokio::test]
    async fn test_slow_catalog_is_unavailable() {
        let store = MemoryStore::new();
        store.add_user("alice", "x", Role::Reader).await;

        struct SlowCatalog;

        #[async_trait::async_trait]
        impl CatalogStore for SlowCatalog {
            async fn load(&self, _id: i64) -> AppResult<Option<Book>> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }

            async fn compare_and_swap(&self, _: i64, _: i64, _: &LendingUpdate) -> AppResult<SwapOutcome> {
                Ok(SwapOutcome::VersionConflict)
            }
        }

        let config = LendingConfig {
            max_conflict_retries: 3,
            store_timeout_ms: 20,
        };
        let service = LendingService::new(Arc::new(SlowCatalog), store.stores().directory, &config);
        let result = service.checkout(1, &principal("alice")).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
}
