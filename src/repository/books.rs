//! Books repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::{contains_pattern, BookFilter, CatalogStore};
use crate::{
    error::{is_unique_violation, AppError, AppResult, LendingError},
    models::book::{Book, NewBook, UpdateBook},
};

const ISBN_INDEX: &str = "books_isbn_key";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn isbn_conflict(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e, ISBN_INDEX) {
        AppError::Conflict("Book with this ISBN already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

#[async_trait]
impl CatalogStore for BooksRepository {
    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE isbn = $1 AND deleted_at IS NULL",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_books(&self, filter: BookFilter) -> AppResult<Vec<Book>> {
        let books = match filter {
            BookFilter::Active => {
                sqlx::query_as::<_, Book>(
                    "SELECT * FROM books WHERE is_active AND deleted_at IS NULL ORDER BY title, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
            BookFilter::Available => {
                sqlx::query_as::<_, Book>(
                    r#"
                    SELECT * FROM books
                    WHERE is_active AND deleted_at IS NULL AND available > 0
                    ORDER BY title, id
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            BookFilter::Category(category) => {
                sqlx::query_as::<_, Book>(
                    r#"
                    SELECT * FROM books
                    WHERE is_active AND deleted_at IS NULL AND LOWER(category) = LOWER($1)
                    ORDER BY title, id
                    "#,
                )
                .bind(category)
                .fetch_all(&self.pool)
                .await?
            }
            BookFilter::Search(q) => {
                sqlx::query_as::<_, Book>(
                    r#"
                    SELECT * FROM books
                    WHERE is_active AND deleted_at IS NULL
                      AND (title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1 OR category ILIKE $1)
                    ORDER BY title, id
                    "#,
                )
                .bind(contains_pattern(&q))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(books)
    }

    async fn create_book(&self, book: NewBook, now: DateTime<Utc>) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, category, language, pages,
                publish_year, stock, available, description, location,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $11, TRUE, $12, $12)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(&book.category)
        .bind(&book.language)
        .bind(book.pages)
        .bind(book.publish_year)
        .bind(book.stock)
        .bind(&book.description)
        .bind(&book.location)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(isbn_conflict)
    }

    async fn update_book(&self, id: i32, patch: UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LendingError::BookNotFound)?;

        book.apply_update(&patch, now);

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $2, author = $3, isbn = $4, publisher = $5, category = $6,
                language = $7, pages = $8, publish_year = $9, stock = $10,
                available = $11, description = $12, location = $13,
                is_active = $14, updated_at = $15
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(&book.category)
        .bind(&book.language)
        .bind(book.pages)
        .bind(book.publish_year)
        .bind(book.stock)
        .bind(book.available)
        .bind(&book.description)
        .bind(&book.location)
        .bind(book.is_active)
        .bind(book.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(isbn_conflict)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_book(&self, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock the book so no borrow can slip in between the check and the delete
        let exists: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM books WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(LendingError::BookNotFound.into());
        }

        let on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrows WHERE book_id = $1 AND status IN ('borrowed', 'overdue'))",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if on_loan {
            return Err(LendingError::HasActiveBorrows.into());
        }

        sqlx::query(
            "UPDATE books SET deleted_at = $2, is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
