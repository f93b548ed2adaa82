//! Borrowings repository: record store for borrowing rows.
//!
//! Writes take the caller's connection so they join the lifecycle
//! transaction; every write validates the record before touching the table.

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, NewBorrowing},
};

const BORROWING_COLUMNS: &str =
    "id, borrow_date, expected_return_date, actual_return_date, book_id, user_id";

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Get borrowing by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(&format!(
            "SELECT {} FROM borrowings WHERE id = $1",
            BORROWING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Get borrowing with book and user display strings
    pub async fn get_details(&self, id: i32) -> AppResult<BorrowingDetails> {
        sqlx::query_as::<_, BorrowingDetails>(
            r#"
            SELECT b.id, b.borrow_date, b.expected_return_date, b.actual_return_date,
                   bk.title || ' - ' || bk.author || ' : ' || bk.inventory || ' pcs' AS book,
                   u.email AS "user"
            FROM borrowings b
            JOIN books bk ON bk.id = b.book_id
            JOIN users u ON u.id = b.user_id
            WHERE b.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// List borrowings, most recent first
    pub async fn list(&self, filter: &BorrowingFilter) -> AppResult<Vec<Borrowing>> {
        let borrowings = sqlx::query_as::<_, Borrowing>(&format!(
            r#"
            SELECT {}
            FROM borrowings
            WHERE ($1::INTEGER IS NULL OR user_id = $1)
              AND ($2::BOOLEAN IS NULL OR (actual_return_date IS NULL) = $2)
            ORDER BY borrow_date DESC, actual_return_date ASC, id DESC
            "#,
            BORROWING_COLUMNS
        ))
        .bind(filter.user_id)
        .bind(filter.active)
        .fetch_all(&self.pool)
        .await?;

        Ok(borrowings)
    }

    // =========================================================================
    // WRITE (transactional)
    // =========================================================================

    /// Insert a new open borrowing
    pub async fn create(&self, conn: &mut PgConnection, draft: &NewBorrowing) -> AppResult<Borrowing> {
        draft.validate()?;

        let borrowing = sqlx::query_as::<_, Borrowing>(&format!(
            r#"
            INSERT INTO borrowings (borrow_date, expected_return_date, book_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        ))
        .bind(draft.borrow_date)
        .bind(draft.expected_return_date)
        .bind(draft.book_id)
        .bind(draft.user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(borrowing)
    }

    /// Stamp the return date on an open borrowing
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        return_date: chrono::NaiveDate,
    ) -> AppResult<Borrowing> {
        // Concurrent returns wait here and then see the closed row
        let mut borrowing = sqlx::query_as::<_, Borrowing>(&format!(
            "SELECT {} FROM borrowings WHERE id = $1 FOR UPDATE",
            BORROWING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))?;

        borrowing.close(return_date)?;

        sqlx::query(
            "UPDATE borrowings SET actual_return_date = $1 WHERE id = $2 AND actual_return_date IS NULL",
        )
        .bind(borrowing.actual_return_date)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(borrowing)
    }
}

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}
