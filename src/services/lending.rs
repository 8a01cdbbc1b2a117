//! Lending service: borrow, return, corrections and the overdue sweep

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult, LendingError},
    models::{
        borrow::{
            BorrowDetails, CreateBorrow, NewBorrow, ReturnBorrow, SweepReport, UpdateBorrow,
        },
        user::Principal,
    },
    repository::{BorrowFilter, Repository},
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    config: LendingConfig,
}

fn ensure_fine(fine: Option<Decimal>) -> AppResult<()> {
    match fine {
        Some(f) if f < Decimal::ZERO => Err(AppError::Validation(
            "Fine must not be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

impl LendingService {
    pub fn new(repository: Repository, config: LendingConfig) -> Self {
        Self { repository, config }
    }

    /// Lend one copy of a book to a member.
    ///
    /// Preconditions are checked here first so the caller gets the most
    /// specific error cheaply; the ledger re-checks them atomically.
    pub async fn borrow_book(&self, request: CreateBorrow) -> AppResult<BorrowDetails> {
        let members = &self.repository.members;
        let catalog = &self.repository.catalog;
        let ledger = &self.repository.ledger;

        let user = members
            .get_user(request.user_id)
            .await?
            .ok_or(LendingError::UserNotFound)?;
        if !user.is_active {
            return Err(LendingError::UserInactive.into());
        }

        let book = catalog
            .get_book(request.book_id)
            .await?
            .ok_or(LendingError::BookNotFound)?;
        book.ensure_lendable()?;

        if ledger
            .has_active_borrow(request.user_id, request.book_id)
            .await?
        {
            return Err(LendingError::DuplicateActiveBorrow.into());
        }

        let now = Utc::now();
        let due_date = request
            .due_date
            .unwrap_or_else(|| now + Duration::days(self.config.default_loan_days));

        let new = NewBorrow {
            user_id: request.user_id,
            book_id: request.book_id,
            due_date,
            notes: request.notes.unwrap_or_default(),
        };

        let details = ledger.borrow(new, now).await?;
        tracing::info!(
            borrow_id = details.id,
            user_id = details.user_id,
            book_id = details.book_id,
            due_date = %details.due_date,
            "Book borrowed"
        );
        Ok(details)
    }

    pub async fn return_book(&self, id: i32, request: ReturnBorrow) -> AppResult<BorrowDetails> {
        ensure_fine(request.fine)?;

        let details = self
            .repository
            .ledger
            .return_borrow(id, request, Utc::now())
            .await?;
        tracing::info!(
            borrow_id = details.id,
            book_id = details.book_id,
            fine = %details.fine,
            "Book returned"
        );
        Ok(details)
    }

    /// Staff correction: due date, fine, notes, or marking the copy lost
    pub async fn update_borrow(&self, id: i32, patch: UpdateBorrow) -> AppResult<BorrowDetails> {
        ensure_fine(patch.fine)?;

        let details = self
            .repository
            .ledger
            .update_borrow(id, patch, Utc::now())
            .await?;
        tracing::info!(borrow_id = id, status = %details.status, "Borrow updated");
        Ok(details)
    }

    /// A borrow visible to staff or to its borrower
    pub async fn get_borrow(&self, principal: &Principal, id: i32) -> AppResult<BorrowDetails> {
        let details = self
            .repository
            .ledger
            .get_borrow(id, Utc::now())
            .await?
            .ok_or(LendingError::BorrowNotFound)?;
        principal.require_self_or_staff(details.user_id)?;
        Ok(details)
    }

    pub async fn list_borrows(&self) -> AppResult<Vec<BorrowDetails>> {
        self.list(BorrowFilter::All).await
    }

    pub async fn borrows_by_user(&self, user_id: i32) -> AppResult<Vec<BorrowDetails>> {
        self.ensure_user(user_id).await?;
        self.list(BorrowFilter::User(user_id)).await
    }

    pub async fn borrow_history(&self, user_id: i32) -> AppResult<Vec<BorrowDetails>> {
        self.ensure_user(user_id).await?;
        self.list(BorrowFilter::History(user_id)).await
    }

    pub async fn borrows_by_book(&self, book_id: i32) -> AppResult<Vec<BorrowDetails>> {
        self.repository
            .catalog
            .get_book(book_id)
            .await?
            .ok_or(LendingError::BookNotFound)?;
        self.list(BorrowFilter::Book(book_id)).await
    }

    pub async fn active_borrows(&self) -> AppResult<Vec<BorrowDetails>> {
        self.list(BorrowFilter::Active).await
    }

    /// Runs the sweep first so stored statuses match what is returned
    pub async fn overdue_borrows(&self) -> AppResult<Vec<BorrowDetails>> {
        self.update_overdue_status().await?;
        self.list(BorrowFilter::Overdue).await
    }

    /// Flip every borrowed record past its due date to overdue.
    ///
    /// Records are updated one by one; the first failure stops the sweep and
    /// is returned, updates already made are kept.
    pub async fn update_overdue_status(&self) -> AppResult<SweepReport> {
        let now = Utc::now();
        let ledger = &self.repository.ledger;

        let mut marked_overdue = 0;
        for id in ledger.overdue_candidates(now).await? {
            if ledger.mark_overdue(id, now).await? {
                marked_overdue += 1;
            }
        }

        if marked_overdue > 0 {
            tracing::info!(marked_overdue, "Overdue sweep completed");
        } else {
            tracing::debug!("Overdue sweep found nothing to update");
        }
        Ok(SweepReport { marked_overdue })
    }

    /// Periodic sweep; `None` when the interval is configured as 0
    pub fn spawn_overdue_sweeper(&self) -> Option<JoinHandle<()>> {
        if self.config.overdue_sweep_interval_secs == 0 {
            return None;
        }
        let service = self.clone();
        let period = StdDuration::from_secs(self.config.overdue_sweep_interval_secs);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = service.update_overdue_status().await {
                    tracing::warn!(error = %e, "Overdue sweep failed");
                }
            }
        }))
    }

    async fn ensure_user(&self, user_id: i32) -> AppResult<()> {
        self.repository
            .members
            .get_user(user_id)
            .await?
            .ok_or(LendingError::UserNotFound)?;
        Ok(())
    }

    async fn list(&self, filter: BorrowFilter) -> AppResult<Vec<BorrowDetails>> {
        self.repository.ledger.list_borrows(filter, Utc::now()).await
    }
}
