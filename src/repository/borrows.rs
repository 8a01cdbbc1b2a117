//! Borrow ledger on PostgreSQL
//!
//! Every mutation that touches a book counter runs in one transaction with
//! the book row locked `FOR UPDATE`. Borrowing locks the user `FOR SHARE`
//! first so a concurrent user deletion cannot interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Pool, Postgres};

use super::{BorrowFilter, LedgerStore};
use crate::{
    error::{is_unique_violation, AppError, AppResult, LendingError},
    models::{
        book::{Book, BookSummary},
        borrow::{
            check_borrow_eligibility, Borrow, BorrowDetails, NewBorrow, ReturnBorrow, StockEffect,
            UpdateBorrow,
        },
        user::{User, UserSummary},
    },
};

const ACTIVE_PAIR_INDEX: &str = "borrows_active_pair_key";

const DETAILS_SELECT: &str = r#"
    SELECT br.*,
           u.name AS user_name, u.email AS user_email,
           b.title AS book_title, b.author AS book_author, b.isbn AS book_isbn
    FROM borrows br
    JOIN users u ON u.id = br.user_id
    JOIN books b ON b.id = br.book_id
"#;

/// Borrow joined with the display fields of its user and book
#[derive(Debug, FromRow)]
struct BorrowRow {
    #[sqlx(flatten)]
    borrow: Borrow,
    user_name: String,
    user_email: String,
    book_title: String,
    book_author: String,
    book_isbn: String,
}

impl BorrowRow {
    fn into_details(self, now: DateTime<Utc>) -> BorrowDetails {
        let user = UserSummary {
            id: self.borrow.user_id,
            name: self.user_name,
            email: self.user_email,
        };
        let book = BookSummary {
            id: self.borrow.book_id,
            title: self.book_title,
            author: self.book_author,
            isbn: self.book_isbn,
        };
        BorrowDetails::new(self.borrow, user, book, now)
    }
}

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

async fn lock_borrow(conn: &mut PgConnection, id: i32) -> AppResult<Borrow> {
    let borrow = sqlx::query_as::<_, Borrow>("SELECT * FROM borrows WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(LendingError::BorrowNotFound)?;
    Ok(borrow)
}

async fn lock_book(conn: &mut PgConnection, id: i32) -> AppResult<Book> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(LendingError::BookNotFound)?;
    Ok(book)
}

async fn save_counters(conn: &mut PgConnection, book: &Book, now: DateTime<Utc>) -> AppResult<()> {
    sqlx::query("UPDATE books SET stock = $2, available = $3, updated_at = $4 WHERE id = $1")
        .bind(book.id)
        .bind(book.stock)
        .bind(book.available)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

async fn save_borrow(conn: &mut PgConnection, borrow: &Borrow) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE borrows SET
            due_date = $2, return_date = $3, status = $4, fine = $5, notes = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(borrow.id)
    .bind(borrow.due_date)
    .bind(borrow.return_date)
    .bind(borrow.status)
    .bind(borrow.fine)
    .bind(&borrow.notes)
    .bind(borrow.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn user_summary(conn: &mut PgConnection, id: i32) -> AppResult<UserSummary> {
    let user = sqlx::query_as::<_, UserSummary>("SELECT id, name, email FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(LendingError::UserNotFound)?;
    Ok(user)
}

#[async_trait]
impl LedgerStore for BorrowsRepository {
    async fn borrow(&self, new: NewBorrow, now: DateTime<Utc>) -> AppResult<BorrowDetails> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
        )
        .bind(new.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(new.book_id)
        .fetch_optional(&mut *tx)
        .await?;

        let has_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrows
                WHERE user_id = $1 AND book_id = $2 AND status IN ('borrowed', 'overdue')
            )
            "#,
        )
        .bind(new.user_id)
        .bind(new.book_id)
        .fetch_one(&mut *tx)
        .await?;

        check_borrow_eligibility(user.as_ref(), book.as_ref(), has_active)?;
        let user = user.ok_or(LendingError::UserNotFound)?;
        let mut book = book.ok_or(LendingError::BookNotFound)?;
        book.check_out()?;

        let borrow = sqlx::query_as::<_, Borrow>(
            r#"
            INSERT INTO borrows (user_id, book_id, borrow_date, due_date, status, fine, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'borrowed', 0, $5, $3, $3)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.book_id)
        .bind(now)
        .bind(new.due_date)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, ACTIVE_PAIR_INDEX) {
                AppError::from(LendingError::DuplicateActiveBorrow)
            } else {
                AppError::Database(e)
            }
        })?;

        save_counters(&mut tx, &book, now).await?;
        tx.commit().await?;

        Ok(BorrowDetails::new(borrow, user.summary(), book.summary(), now))
    }

    async fn return_borrow(
        &self,
        id: i32,
        ret: ReturnBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut tx = self.pool.begin().await?;

        let mut borrow = lock_borrow(&mut tx, id).await?;
        borrow.close(&ret, now)?;

        let mut book = lock_book(&mut tx, borrow.book_id).await?;
        book.check_in();

        save_counters(&mut tx, &book, now).await?;
        save_borrow(&mut tx, &borrow).await?;
        let user = user_summary(&mut tx, borrow.user_id).await?;
        tx.commit().await?;

        Ok(BorrowDetails::new(borrow, user, book.summary(), now))
    }

    async fn update_borrow(
        &self,
        id: i32,
        patch: UpdateBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut tx = self.pool.begin().await?;

        let mut borrow = lock_borrow(&mut tx, id).await?;
        let effect = borrow.apply_update(&patch, now)?;

        let book = match effect {
            StockEffect::WriteOff => {
                let mut book = lock_book(&mut tx, borrow.book_id).await?;
                book.write_off();
                save_counters(&mut tx, &book, now).await?;
                book.summary()
            }
            StockEffect::None => sqlx::query_as::<_, BookSummary>(
                "SELECT id, title, author, isbn FROM books WHERE id = $1",
            )
            .bind(borrow.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LendingError::BookNotFound)?,
        };

        save_borrow(&mut tx, &borrow).await?;
        let user = user_summary(&mut tx, borrow.user_id).await?;
        tx.commit().await?;

        Ok(BorrowDetails::new(borrow, user, book, now))
    }

    async fn get_borrow(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<BorrowDetails>> {
        let sql = format!("{} WHERE br.id = $1", DETAILS_SELECT);
        let row = sqlx::query_as::<_, BorrowRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_details(now)))
    }

    async fn list_borrows(
        &self,
        filter: BorrowFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowDetails>> {
        let (clause, order) = match filter {
            BorrowFilter::All => ("TRUE", "br.id"),
            BorrowFilter::User(_) => ("br.user_id = $1", "br.id"),
            BorrowFilter::Book(_) => ("br.book_id = $1", "br.id"),
            BorrowFilter::Active => ("br.status IN ('borrowed', 'overdue')", "br.id"),
            BorrowFilter::Overdue => (
                "(br.status = 'overdue' OR (br.status = 'borrowed' AND br.due_date < $1))",
                "br.due_date, br.id",
            ),
            BorrowFilter::History(_) => ("br.user_id = $1", "br.created_at DESC, br.id DESC"),
        };
        let sql = format!("{} WHERE {} ORDER BY {}", DETAILS_SELECT, clause, order);

        let mut query = sqlx::query_as::<_, BorrowRow>(&sql);
        query = match filter {
            BorrowFilter::User(id) | BorrowFilter::Book(id) | BorrowFilter::History(id) => {
                query.bind(id)
            }
            BorrowFilter::Overdue => query.bind(now),
            BorrowFilter::All | BorrowFilter::Active => query,
        };

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_details(now)).collect())
    }

    async fn has_active_borrow(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrows
                WHERE user_id = $1 AND book_id = $2 AND status IN ('borrowed', 'overdue')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            "SELECT id FROM borrows WHERE status = 'borrowed' AND due_date < $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn mark_overdue(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        // Conditional so a return committed since the scan is left alone
        let result = sqlx::query(
            r#"
            UPDATE borrows SET status = 'overdue', updated_at = $2
            WHERE id = $1 AND status = 'borrowed' AND due_date < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
