//! Borrowing model, date invariants and listing filters

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

use super::book::Book;

/// Longest allowed borrowing period, in days
pub const MAX_BORROWING_DAYS: i64 = 14;

/// Borrowing model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub book_id: i32,
    pub user_id: i32,
}

/// Open borrowings have not been returned yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Open,
    Closed,
}

impl Borrowing {
    pub fn status(&self) -> BorrowingStatus {
        match self.actual_return_date {
            None => BorrowingStatus::Open,
            Some(_) => BorrowingStatus::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == BorrowingStatus::Open
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_dates(
            self.borrow_date,
            self.expected_return_date,
            self.actual_return_date,
        )
    }

    /// Close the borrowing. The return date can only be stamped once.
    pub fn close(&mut self, return_date: NaiveDate) -> AppResult<()> {
        if self.actual_return_date.is_some() {
            return Err(AppError::AlreadyReturned(self.id));
        }
        if return_date < self.borrow_date {
            return Err(AppError::InvalidDate(format!(
                "Return date {} is earlier than the borrow date {}",
                return_date, self.borrow_date
            )));
        }

        self.actual_return_date = Some(return_date);
        self.validate()
    }
}

/// Borrowing about to be inserted
#[derive(Debug, Clone)]
pub struct NewBorrowing {
    pub book_id: i32,
    pub user_id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
}

impl NewBorrowing {
    pub fn validate(&self) -> AppResult<()> {
        validate_dates(self.borrow_date, self.expected_return_date, None)
    }
}

/// Check the date invariants shared by every borrowing write.
pub fn validate_dates(
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    actual_return_date: Option<NaiveDate>,
) -> AppResult<()> {
    if expected_return_date < borrow_date {
        return Err(AppError::Validation(
            "Expected return date cannot be earlier than the borrow date".to_string(),
        ));
    }

    if expected_return_date > borrow_date + Duration::days(MAX_BORROWING_DAYS) {
        return Err(AppError::Validation(format!(
            "Expected return date must be within {} days of the borrow date",
            MAX_BORROWING_DAYS
        )));
    }

    if let Some(actual) = actual_return_date {
        if actual < borrow_date {
            return Err(AppError::Validation(
                "Actual return date cannot be earlier than the borrow date".to_string(),
            ));
        }
    }

    Ok(())
}

/// Borrowing with resolved book and user display strings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingDetails {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    /// "{title} - {author} : {inventory} pcs"
    pub book: String,
    /// Borrower email
    pub user: String,
}

/// Borrowing list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowingQuery {
    /// Only open (true) or only returned (false) borrowings
    pub is_active: Option<bool>,
    /// Borrower filter, honored for staff only
    pub user_id: Option<i32>,
}

/// Filter actually applied to a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorrowingFilter {
    pub active: Option<bool>,
    pub user_id: Option<i32>,
}

impl BorrowingFilter {
    /// Non-staff callers only ever see their own borrowings.
    pub fn for_caller(query: &BorrowingQuery, caller_id: i32, is_staff: bool) -> Self {
        let user_id = if is_staff {
            query.user_id
        } else {
            Some(caller_id)
        };

        Self {
            active: query.is_active,
            user_id,
        }
    }
}

/// Event published once a borrowing is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowingCreated {
    pub borrowing_id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub book_title: String,
    pub book_author: String,
}

impl BorrowingCreated {
    pub fn new(borrowing: &Borrowing, book: &Book) -> Self {
        Self {
            borrowing_id: borrowing.id,
            borrow_date: borrowing.borrow_date,
            expected_return_date: borrowing.expected_return_date,
            book_title: book.title.clone(),
            book_author: book.author.clone(),
        }
    }
}

impl std::fmt::Display for BorrowingCreated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "New Borrowing Created")?;
        writeln!(f, "Borrowing ID: {}", self.borrowing_id)?;
        writeln!(f, "Borrowing Date: {}", self.borrow_date)?;
        writeln!(f, "Expected Return Date: {}", self.expected_return_date)?;
        writeln!(f, "Book Title: {}", self.book_title)?;
        write!(f, "Book Author: {}", self.book_author)
    }
}
