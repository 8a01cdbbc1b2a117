//! In-process store backing all three ports
//!
//! State lives behind one async mutex; each trait call holds it for the whole
//! operation, which gives the ledger the same all-or-nothing behavior as the
//! PostgreSQL transactions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BookFilter, BorrowFilter, CatalogStore, LedgerStore, MembershipStore, UserFilter};
use crate::{
    error::{AppError, AppResult, LendingError},
    models::{
        book::{Book, NewBook, UpdateBook},
        borrow::{
            check_borrow_eligibility, Borrow, BorrowDetails, BorrowStatus, NewBorrow, ReturnBorrow,
            StockEffect, UpdateBorrow,
        },
        user::{NewUser, Role, UpdateUser, User},
    },
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    borrows: BTreeMap<i32, Borrow>,
    next_user_id: i32,
    next_book_id: i32,
    next_borrow_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

fn matches(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl MemoryState {
    fn live_user(&self, id: i32) -> Option<&User> {
        self.users.get(&id).filter(|u| u.deleted_at.is_none())
    }

    fn live_book(&self, id: i32) -> Option<&Book> {
        self.books.get(&id).filter(|b| b.deleted_at.is_none())
    }

    fn email_taken(&self, email: &str, except: Option<i32>) -> bool {
        self.users.values().any(|u| {
            u.deleted_at.is_none() && Some(u.id) != except && u.email.eq_ignore_ascii_case(email)
        })
    }

    fn isbn_taken(&self, isbn: &str, except: Option<i32>) -> bool {
        self.books
            .values()
            .any(|b| b.deleted_at.is_none() && Some(b.id) != except && b.isbn == isbn)
    }

    fn has_active(&self, user_id: i32, book_id: i32) -> bool {
        self.borrows
            .values()
            .any(|b| b.user_id == user_id && b.book_id == book_id && b.status.is_on_loan())
    }

    fn details(&self, borrow: &Borrow, now: DateTime<Utc>) -> AppResult<BorrowDetails> {
        // Soft-deleted rows still resolve so history stays readable
        let user = self
            .users
            .get(&borrow.user_id)
            .ok_or(LendingError::UserNotFound)?;
        let book = self
            .books
            .get(&borrow.book_id)
            .ok_or(LendingError::BookNotFound)?;
        Ok(BorrowDetails::new(
            borrow.clone(),
            user.summary(),
            book.summary(),
            now,
        ))
    }
}

/// In-memory implementation of the storage ports
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        let state = self.state.lock().await;
        Ok(state.live_book(id).cloned())
    }

    async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .values()
            .find(|b| b.deleted_at.is_none() && b.isbn == isbn)
            .cloned())
    }

    async fn list_books(&self, filter: BookFilter) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| b.deleted_at.is_none() && b.is_active)
            .filter(|b| match &filter {
                BookFilter::Active => true,
                BookFilter::Available => b.available > 0,
                BookFilter::Category(c) => b.category.eq_ignore_ascii_case(c),
                BookFilter::Search(q) => {
                    matches(&b.title, q)
                        || matches(&b.author, q)
                        || matches(&b.isbn, q)
                        || matches(&b.category, q)
                }
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn create_book(&self, book: NewBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&book.isbn, None) {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists".to_string(),
            ));
        }
        let id = next_id(&mut state.next_book_id);
        let created = Book {
            id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publisher: book.publisher,
            category: book.category,
            language: book.language,
            pages: book.pages,
            publish_year: book.publish_year,
            stock: book.stock,
            available: book.stock,
            description: book.description,
            location: book.location,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn update_book(&self, id: i32, patch: UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let mut book = state
            .live_book(id)
            .cloned()
            .ok_or(LendingError::BookNotFound)?;
        book.apply_update(&patch, now);
        if state.isbn_taken(&book.isbn, Some(id)) {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists".to_string(),
            ));
        }
        state.books.insert(id, book.clone());
        Ok(book)
    }

    async fn delete_book(&self, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.live_book(id).is_none() {
            return Err(LendingError::BookNotFound.into());
        }
        if state
            .borrows
            .values()
            .any(|b| b.book_id == id && b.status.is_on_loan())
        {
            return Err(LendingError::HasActiveBorrows.into());
        }
        if let Some(book) = state.books.get_mut(&id) {
            book.deleted_at = Some(now);
            book.is_active = false;
            book.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.live_user(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self, filter: UserFilter) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.deleted_at.is_none())
            .filter(|u| match &filter {
                UserFilter::Active => u.is_active,
                UserFilter::Search(q) => {
                    matches(&u.name, q) || matches(&u.email, q) || matches(&u.phone, q)
                }
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, None) {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
        let id = next_id(&mut state.next_user_id);
        let created = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            phone: user.phone,
            address: user.address,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: i32, patch: UpdateUser, now: DateTime<Utc>) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let mut user = state
            .live_user(id)
            .cloned()
            .ok_or(LendingError::UserNotFound)?;
        user.apply_update(&patch, now);
        if state.email_taken(&user.email, Some(id)) {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn set_password(&self, id: i32, password_hash: String, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
            .ok_or(LendingError::UserNotFound)?;
        user.password_hash = password_hash;
        user.updated_at = now;
        Ok(())
    }

    async fn delete_user(&self, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.live_user(id).is_none() {
            return Err(LendingError::UserNotFound.into());
        }
        if state
            .borrows
            .values()
            .any(|b| b.user_id == id && b.status.is_on_loan())
        {
            return Err(LendingError::HasActiveBorrows.into());
        }
        if let Some(user) = state.users.get_mut(&id) {
            user.deleted_at = Some(now);
            user.is_active = false;
            user.updated_at = now;
        }
        Ok(())
    }

    async fn admin_exists(&self) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .any(|u| u.deleted_at.is_none() && u.role == Role::Admin))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn borrow(&self, new: NewBorrow, now: DateTime<Utc>) -> AppResult<BorrowDetails> {
        let mut state = self.state.lock().await;

        check_borrow_eligibility(
            state.live_user(new.user_id),
            state.live_book(new.book_id),
            state.has_active(new.user_id, new.book_id),
        )?;

        let book = state
            .books
            .get_mut(&new.book_id)
            .ok_or(LendingError::BookNotFound)?;
        book.check_out()?;
        book.updated_at = now;

        let id = next_id(&mut state.next_borrow_id);
        let borrow = Borrow::open(id, &new, now);
        state.borrows.insert(id, borrow.clone());
        state.details(&borrow, now)
    }

    async fn return_borrow(
        &self,
        id: i32,
        ret: ReturnBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut state = self.state.lock().await;

        let mut borrow = state
            .borrows
            .get(&id)
            .cloned()
            .ok_or(LendingError::BorrowNotFound)?;
        borrow.close(&ret, now)?;

        let book = state
            .books
            .get_mut(&borrow.book_id)
            .ok_or(LendingError::BookNotFound)?;
        book.check_in();
        book.updated_at = now;

        state.borrows.insert(id, borrow.clone());
        state.details(&borrow, now)
    }

    async fn update_borrow(
        &self,
        id: i32,
        patch: UpdateBorrow,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowDetails> {
        let mut state = self.state.lock().await;

        let mut borrow = state
            .borrows
            .get(&id)
            .cloned()
            .ok_or(LendingError::BorrowNotFound)?;
        let effect = borrow.apply_update(&patch, now)?;

        if effect == StockEffect::WriteOff {
            let book = state
                .books
                .get_mut(&borrow.book_id)
                .ok_or(LendingError::BookNotFound)?;
            book.write_off();
            book.updated_at = now;
        }

        state.borrows.insert(id, borrow.clone());
        state.details(&borrow, now)
    }

    async fn get_borrow(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<BorrowDetails>> {
        let state = self.state.lock().await;
        match state.borrows.get(&id) {
            Some(borrow) => state.details(borrow, now).map(Some),
            None => Ok(None),
        }
    }

    async fn list_borrows(
        &self,
        filter: BorrowFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowDetails>> {
        let state = self.state.lock().await;
        let mut selected: Vec<&Borrow> = state
            .borrows
            .values()
            .filter(|b| match filter {
                BorrowFilter::All => true,
                BorrowFilter::User(id) | BorrowFilter::History(id) => b.user_id == id,
                BorrowFilter::Book(id) => b.book_id == id,
                BorrowFilter::Active => b.status.is_on_loan(),
                BorrowFilter::Overdue => {
                    b.status == BorrowStatus::Overdue
                        || (b.status == BorrowStatus::Borrowed && b.due_date < now)
                }
            })
            .collect();

        match filter {
            BorrowFilter::History(_) => {
                selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
            BorrowFilter::Overdue => {
                selected.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)))
            }
            _ => {}
        }

        selected
            .into_iter()
            .map(|b| state.details(b, now))
            .collect()
    }

    async fn has_active_borrow(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state.has_active(user_id, book_id))
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let state = self.state.lock().await;
        Ok(state
            .borrows
            .values()
            .filter(|b| b.status == BorrowStatus::Borrowed && b.due_date < now)
            .map(|b| b.id)
            .collect())
    }

    async fn mark_overdue(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .borrows
            .get_mut(&id)
            .map(|b| b.mark_overdue(now))
            .unwrap_or(false))
    }
}
