//! Storage ports and their adapters
//!
//! Services only talk to the [`CatalogStore`], [`MembershipStore`] and
//! [`LedgerStore`] traits. `books`, `users` and `borrows` implement them on
//! PostgreSQL; `memory` implements all three in process.

pub mod books;
pub mod borrows;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, NewBook, UpdateBook},
        borrow::{BorrowDetails, NewBorrow, ReturnBorrow, UpdateBorrow},
        user::{NewUser, UpdateUser, User},
    },
};

/// Which books a catalog listing returns; only active books are listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFilter {
    Active,
    Available,
    Category(String),
    Search(String),
}

/// Which users a membership listing returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// Active accounts only
    Active,
    /// Substring match on name, email or phone, inactive accounts included
    Search(String),
}

/// Which borrows a ledger listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowFilter {
    All,
    User(i32),
    Book(i32),
    /// On loan (borrowed or overdue)
    Active,
    /// Overdue, or borrowed with the due date passed
    Overdue,
    /// Every borrow of a user, newest first
    History(i32),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    async fn list_books(&self, filter: BookFilter) -> AppResult<Vec<Book>>;

    async fn create_book(&self, book: NewBook, now: DateTime<Utc>) -> AppResult<Book>;

    /// Read-modify-write under a row lock; recomputes `available` on stock change
    async fn update_book(&self, id: i32, patch: UpdateBook, now: DateTime<Utc>) -> AppResult<Book>;

    /// Soft delete; refused while copies are on loan
    async fn delete_book(&self, id: i32, now: DateTime<Utc>) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get_user(&self, id: i32) -> AppResult<Option<User>>;

    /// Case-insensitive lookup
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn list_users(&self, filter: UserFilter) -> AppResult<Vec<User>>;

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<User>;

    async fn update_user(&self, id: i32, patch: UpdateUser, now: DateTime<Utc>) -> AppResult<User>;

    async fn set_password(&self, id: i32, password_hash: String, now: DateTime<Utc>) -> AppResult<()>;

    /// Soft delete; refused while the user has books on loan
    async fn delete_user(&self, id: i32, now: DateTime<Utc>) -> AppResult<()>;

    async fn admin_exists(&self) -> AppResult<bool>;
}

/// The borrow ledger. Mutations touching both a borrow and a book counter
/// are applied as one atomic unit and re-check their preconditions inside it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn borrow(&self, new: NewBorrow, now: DateTime<Utc>) -> AppResult<BorrowDetails>;

    async fn return_borrow(
        &self,
        id: i32,
        ret: ReturnBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails>;

    async fn update_borrow(
        &self,
        id: i32,
        patch: UpdateBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails>;

    async fn get_borrow(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<BorrowDetails>>;

    async fn list_borrows(
        &self,
        filter: BorrowFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowDetails>>;

    async fn has_active_borrow(&self, user_id: i32, book_id: i32) -> AppResult<bool>;

    /// Ids of borrowed records whose due date is before `now`
    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>>;

    /// Flip one record to overdue if it still qualifies; returns whether it changed
    async fn mark_overdue(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool>;
}

/// Handles to the three stores, shared by the services
#[derive(Clone)]
pub struct Repository {
    pub catalog: Arc<dyn CatalogStore>,
    pub members: Arc<dyn MembershipStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Repository {
    /// PostgreSQL adapters over one connection pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            catalog: Arc::new(books::BooksRepository::new(pool.clone())),
            members: Arc::new(users::UsersRepository::new(pool.clone())),
            ledger: Arc::new(borrows::BorrowsRepository::new(pool)),
        }
    }

    /// In-process adapter; all three ports share one state
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            catalog: store.clone(),
            members: store.clone(),
            ledger: store,
        }
    }

    pub fn from_parts(
        catalog: Arc<dyn CatalogStore>,
        members: Arc<dyn MembershipStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            catalog,
            members,
            ledger,
        }
    }
}

/// `ILIKE` pattern matching `q` anywhere, with LIKE metacharacters escaped
pub(crate) fn contains_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
