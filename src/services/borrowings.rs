//! Borrowing lifecycle: create and return transactions

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{
            Borrowing, BorrowingCreated, BorrowingDetails, BorrowingFilter, BorrowingQuery,
            NewBorrowing,
        },
        user::UserClaims,
    },
    repository::Repository,
};

use super::notifier::{spawn_notification, Notifier};

/// Current date used as the default borrow and return date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    notifier: Arc<dyn Notifier>,
}

impl BorrowingsService {
    pub fn new(repository: Repository, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            notifier,
        }
    }

    /// Borrow a copy of a book.
    ///
    /// The reservation and the new record commit together. The notifier runs
    /// only after the commit and cannot undo it.
    pub async fn create_borrowing(
        &self,
        user_id: i32,
        book_id: i32,
        expected_return_date: NaiveDate,
    ) -> AppResult<Borrowing> {
        self.repository.users.get_by_id(user_id).await?;

        let draft = NewBorrowing {
            book_id,
            user_id,
            borrow_date: today(),
            expected_return_date,
        };

        let mut tx = self.repository.begin().await?;
        let book = self.repository.ledger.reserve_copy(&mut tx, book_id).await?;
        let borrowing = self.repository.borrowings.create(&mut tx, &draft).await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id = borrowing.id,
            book_id,
            user_id,
            inventory = book.inventory,
            "Borrowing created"
        );

        let event = BorrowingCreated::new(&borrowing, &book);
        spawn_notification(self.notifier.clone(), event.to_string());

        Ok(borrowing)
    }

    /// Close a borrowing and put the copy back on the shelf.
    pub async fn return_borrowing(
        &self,
        borrowing_id: i32,
        return_date: Option<NaiveDate>,
    ) -> AppResult<Borrowing> {
        let return_date = return_date.unwrap_or_else(today);

        let mut tx = self.repository.begin().await?;
        let borrowing = self
            .repository
            .borrowings
            .close(&mut tx, borrowing_id, return_date)
            .await?;
        let book = self
            .repository
            .ledger
            .release_copy(&mut tx, borrowing.book_id)
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            book_id = book.id,
            %return_date,
            inventory = book.inventory,
            "Borrowing returned"
        );

        Ok(borrowing)
    }

    /// Get a borrowing the caller is allowed to see
    pub async fn get_borrowing(&self, id: i32, caller: &UserClaims) -> AppResult<Borrowing> {
        let borrowing = self.repository.borrowings.get_by_id(id).await?;
        ensure_visible(&borrowing, caller)?;
        Ok(borrowing)
    }

    /// Get borrowing details the caller is allowed to see
    pub async fn get_details(&self, id: i32, caller: &UserClaims) -> AppResult<BorrowingDetails> {
        self.get_borrowing(id, caller).await?;
        self.repository.borrowings.get_details(id).await
    }

    /// Return a borrowing on behalf of the caller
    pub async fn return_for_caller(
        &self,
        id: i32,
        caller: &UserClaims,
        return_date: Option<NaiveDate>,
    ) -> AppResult<Borrowing> {
        // owner never changes, so checking outside the transaction is safe
        self.get_borrowing(id, caller).await?;
        self.return_borrowing(id, return_date).await
    }

    /// List borrowings visible to the caller
    pub async fn list_borrowings(
        &self,
        caller: &UserClaims,
        query: &BorrowingQuery,
    ) -> AppResult<Vec<Borrowing>> {
        let filter = BorrowingFilter::for_caller(query, caller.user_id, caller.is_staff);
        self.repository.borrowings.list(&filter).await
    }
}

/// Other users' borrowings answer 404 to non-staff callers.
fn ensure_visible(borrowing: &Borrowing, caller: &UserClaims) -> AppResult<()> {
    if caller.can_access(borrowing.user_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "Borrowing with id {} not found",
            borrowing.id
        )))
    }
}
