//! Inventory ledger: the only writer of `books.inventory` during borrowings.
//!
//! Both operations run on the caller's transaction and lock the book row
//! (`FOR UPDATE`) before reading the count, so concurrent reservations from
//! any number of processes are serialized by Postgres.

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    /// Take one copy of a book. Fails with `OutOfStock` when none is left.
    pub async fn reserve_copy(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Book> {
        let mut book = self.lock_book(conn, book_id).await?;

        if let Err(e) = book.take_copy() {
            tracing::info!(book_id, "Reservation refused, no copy left");
            return Err(e);
        }

        self.store_inventory(conn, &book).await?;
        tracing::debug!(book_id, inventory = book.inventory, "Copy reserved");
        Ok(book)
    }

    /// Give one copy of a book back.
    pub async fn release_copy(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Book> {
        let mut book = self.lock_book(conn, book_id).await?;
        book.put_back_copy()?;

        self.store_inventory(conn, &book).await?;
        tracing::debug!(book_id, inventory = book.inventory, "Copy released");
        Ok(book)
    }

    async fn lock_book(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, daily_fee, inventory, cover
            FROM books
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    async fn store_inventory(&self, conn: &mut PgConnection, book: &Book) -> AppResult<()> {
        sqlx::query("UPDATE books SET inventory = $1 WHERE id = $2")
            .bind(book.inventory)
            .bind(book.id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
