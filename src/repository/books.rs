//! Books repository for catalog operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            "SELECT id, title, author, daily_fee, inventory, cover FROM books WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// List all books
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, daily_fee, inventory, cover FROM books ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    /// Create a new book
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, daily_fee, inventory, cover)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, author, daily_fee, inventory, cover
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.daily_fee)
        .bind(book.inventory)
        .bind(book.cover)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update a book. Absent fields keep their current value.
    pub async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                daily_fee = COALESCE($4, daily_fee),
                inventory = COALESCE($5, inventory),
                cover = COALESCE($6, cover)
            WHERE id = $1
            RETURNING id, title, author, daily_fee, inventory, cover
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.daily_fee)
        .bind(book.inventory)
        .bind(book.cover)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }
}
