//! Borrow (loan) model, status machine and lending rules

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

use super::book::{Book, BookSummary};
use super::user::{User, UserSummary};
use crate::error::LendingError;

/// Borrow status
///
/// `Returned` and `Lost` are terminal. `Overdue` is written by the sweep
/// and still counts as on loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Overdue => "overdue",
            BorrowStatus::Lost => "lost",
        }
    }

    /// The copy is physically out
    pub fn is_on_loan(&self) -> bool {
        matches!(self, BorrowStatus::Borrowed | BorrowStatus::Overdue)
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(BorrowStatus::Borrowed),
            "returned" => Ok(BorrowStatus::Returned),
            "overdue" => Ok(BorrowStatus::Overdue),
            "lost" => Ok(BorrowStatus::Lost),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

// Stored as VARCHAR
impl sqlx::Type<Postgres> for BorrowStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for BorrowStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<Postgres>>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Borrow model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Borrow {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub fine: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Side effect a borrow update has on the catalog counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    WriteOff,
}

impl Borrow {
    /// Open a new loan
    pub fn open(id: i32, new: &NewBorrow, now: DateTime<Utc>) -> Self {
        Borrow {
            id,
            user_id: new.user_id,
            book_id: new.book_id,
            borrow_date: now,
            due_date: new.due_date,
            return_date: None,
            status: BorrowStatus::Borrowed,
            fine: Decimal::ZERO,
            notes: new.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_on_loan(&self) -> Result<(), LendingError> {
        if self.status.is_on_loan() {
            Ok(())
        } else {
            Err(LendingError::NotCurrentlyBorrowed)
        }
    }

    /// On loan with the due date passed, whatever the stored status says
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_on_loan() && self.due_date < now
    }

    /// Close the loan
    pub fn close(&mut self, ret: &ReturnBorrow, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.ensure_on_loan()?;
        self.return_date = Some(now);
        self.status = BorrowStatus::Returned;
        self.fine = ret.fine.unwrap_or(Decimal::ZERO);
        if let Some(notes) = ret.notes.as_ref().filter(|n| !n.trim().is_empty()) {
            self.notes = notes.clone();
        }
        self.updated_at = now;
        Ok(())
    }

    /// Sweep transition; returns whether the record changed
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == BorrowStatus::Borrowed && self.due_date < now {
            self.status = BorrowStatus::Overdue;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Apply a staff correction
    ///
    /// The only status accepted is `Lost`, from an on-loan record. Moving
    /// the due date of an overdue loan past `now` puts it back to `Borrowed`.
    pub fn apply_update(
        &mut self,
        patch: &UpdateBorrow,
        now: DateTime<Utc>,
    ) -> Result<StockEffect, LendingError> {
        let mut effect = StockEffect::None;

        match patch.status {
            None => {}
            Some(BorrowStatus::Lost) => {
                self.ensure_on_loan()?;
                self.status = BorrowStatus::Lost;
                effect = StockEffect::WriteOff;
            }
            Some(status) if status == self.status => {}
            Some(_) => return Err(LendingError::NotCurrentlyBorrowed),
        }

        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
            if self.status == BorrowStatus::Overdue && due_date > now {
                self.status = BorrowStatus::Borrowed;
            }
        }
        if let Some(fine) = patch.fine {
            self.fine = fine;
        }
        if let Some(notes) = patch.notes.as_ref().filter(|n| !n.trim().is_empty()) {
            self.notes = notes.clone();
        }
        self.updated_at = now;
        Ok(effect)
    }
}

/// Eligibility of a borrow request, checked in order:
/// user exists and is active, book exists/is active/has a free copy,
/// no copy of the same book already on loan to the user.
pub fn check_borrow_eligibility(
    user: Option<&User>,
    book: Option<&Book>,
    has_active_borrow: bool,
) -> Result<(), LendingError> {
    let user = user.ok_or(LendingError::UserNotFound)?;
    if !user.is_active {
        return Err(LendingError::UserInactive);
    }
    let book = book.ok_or(LendingError::BookNotFound)?;
    book.ensure_lendable()?;
    if has_active_borrow {
        return Err(LendingError::DuplicateActiveBorrow);
    }
    Ok(())
}

/// Borrow with user and book data attached for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowDetails {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// On loan with the due date passed
    pub is_overdue: bool,
    pub user: UserSummary,
    pub book: BookSummary,
}

impl BorrowDetails {
    pub fn new(borrow: Borrow, user: UserSummary, book: BookSummary, now: DateTime<Utc>) -> Self {
        BorrowDetails {
            is_overdue: borrow.is_overdue_at(now),
            id: borrow.id,
            user_id: borrow.user_id,
            book_id: borrow.book_id,
            borrow_date: borrow.borrow_date,
            due_date: borrow.due_date,
            return_date: borrow.return_date,
            status: borrow.status,
            fine: borrow.fine,
            notes: borrow.notes,
            created_at: borrow.created_at,
            updated_at: borrow.updated_at,
            user,
            book,
        }
    }
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBorrow {
    pub user_id: i32,
    pub book_id: i32,
    /// Defaults to the configured loan length
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Resolved borrow request handed to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrow {
    pub user_id: i32,
    pub book_id: i32,
    pub due_date: DateTime<Utc>,
    pub notes: String,
}

/// Return request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct ReturnBorrow {
    #[schema(value_type = Option<String>)]
    pub fine: Option<Decimal>,
    pub notes: Option<String>,
}

/// Staff correction of a borrow record
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct UpdateBorrow {
    pub due_date: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub fine: Option<Decimal>,
    pub notes: Option<String>,
    /// Only `lost` is accepted
    pub status: Option<BorrowStatus>,
}

/// Result of an overdue sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    pub marked_overdue: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn borrow(status: BorrowStatus, due_in_days: i64) -> Borrow {
        let now = Utc::now();
        Borrow {
            id: 1,
            user_id: 1,
            book_id: 1,
            borrow_date: now,
            due_date: now + Duration::days(due_in_days),
            return_date: None,
            status,
            fine: Decimal::ZERO,
            notes: "first loan".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn overdue_loans_can_be_returned() {
        let mut b = borrow(BorrowStatus::Overdue, -3);
        let ret = ReturnBorrow {
            fine: Some(Decimal::new(1500, 2)),
            notes: None,
        };
        assert!(b.close(&ret, Utc::now()).is_ok());
        assert_eq!(b.status, BorrowStatus::Returned);
        assert!(b.return_date.is_some());
        assert_eq!(b.fine, Decimal::new(1500, 2));
        assert_eq!(b.notes, "first loan");
    }

    #[test]
    fn terminal_loans_cannot_be_returned() {
        for status in [BorrowStatus::Returned, BorrowStatus::Lost] {
            let mut b = borrow(status, 1);
            assert_eq!(
                b.close(&ReturnBorrow::default(), Utc::now()),
                Err(LendingError::NotCurrentlyBorrowed)
            );
        }
    }

    #[test]
    fn sweep_only_flips_borrowed_and_past_due() {
        let now = Utc::now();
        let mut late = borrow(BorrowStatus::Borrowed, -1);
        let mut on_time = borrow(BorrowStatus::Borrowed, 1);
        let mut returned = borrow(BorrowStatus::Returned, -1);
        assert!(late.mark_overdue(now));
        assert!(!late.mark_overdue(now));
        assert!(!on_time.mark_overdue(now));
        assert!(!returned.mark_overdue(now));
        assert_eq!(late.status, BorrowStatus::Overdue);
    }

    #[test]
    fn marking_lost_writes_off_the_copy() {
        let mut b = borrow(BorrowStatus::Overdue, -1);
        let patch = UpdateBorrow {
            status: Some(BorrowStatus::Lost),
            ..Default::default()
        };
        assert_eq!(b.apply_update(&patch, Utc::now()), Ok(StockEffect::WriteOff));
        assert_eq!(b.status, BorrowStatus::Lost);
        assert_eq!(
            b.apply_update(&patch, Utc::now()),
            Err(LendingError::NotCurrentlyBorrowed)
        );
    }

    #[test]
    fn status_cannot_be_forced_to_returned() {
        let mut b = borrow(BorrowStatus::Borrowed, 1);
        let patch = UpdateBorrow {
            status: Some(BorrowStatus::Returned),
            ..Default::default()
        };
        assert_eq!(
            b.apply_update(&patch, Utc::now()),
            Err(LendingError::NotCurrentlyBorrowed)
        );
        assert_eq!(b.status, BorrowStatus::Borrowed);
    }

    #[test]
    fn extending_an_overdue_loan_reopens_it() {
        let now = Utc::now();
        let mut b = borrow(BorrowStatus::Overdue, -2);
        let patch = UpdateBorrow {
            due_date: Some(now + Duration::days(7)),
            ..Default::default()
        };
        assert_eq!(b.apply_update(&patch, now), Ok(StockEffect::None));
        assert_eq!(b.status, BorrowStatus::Borrowed);
    }
}
