//! Book (catalog entry) model and stock accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::LendingError;

/// Language recorded when a create request leaves it blank
pub const DEFAULT_LANGUAGE: &str = "Indonesian";

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub category: String,
    pub language: String,
    pub pages: i32,
    pub publish_year: i32,
    /// Total owned copies
    pub stock: i32,
    /// Copies currently lendable
    pub available: i32,
    pub description: String,
    pub location: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
        }
    }

    /// Copies physically out on loan
    pub fn on_loan(&self) -> i32 {
        self.stock - self.available
    }

    /// Book must be active and have a free copy
    pub fn ensure_lendable(&self) -> Result<(), LendingError> {
        if !self.is_active {
            return Err(LendingError::BookInactive);
        }
        if self.available <= 0 {
            return Err(LendingError::BookUnavailable);
        }
        Ok(())
    }

    /// Take one copy off the shelf
    pub fn check_out(&mut self) -> Result<(), LendingError> {
        self.ensure_lendable()?;
        self.available -= 1;
        Ok(())
    }

    /// Put one copy back; never exceeds stock after a stock reduction
    pub fn check_in(&mut self) {
        self.available = (self.available + 1).min(self.stock);
    }

    /// A lent copy was lost: it leaves the stock, availability is unchanged
    pub fn write_off(&mut self) {
        self.stock = (self.stock - 1).max(0);
        self.available = self.available.min(self.stock);
    }

    /// Change the owned copy count, keeping copies on loan accounted for
    pub fn restock(&mut self, new_stock: i32) {
        let on_loan = self.on_loan();
        self.stock = new_stock;
        self.available = (new_stock - on_loan).max(0);
    }

    /// Apply a partial update; absent fields are left untouched
    pub fn apply_update(&mut self, patch: &UpdateBook, now: DateTime<Utc>) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(ref author) = patch.author {
            self.author = author.clone();
        }
        if let Some(ref isbn) = patch.isbn {
            self.isbn = isbn.clone();
        }
        if let Some(ref publisher) = patch.publisher {
            self.publisher = publisher.clone();
        }
        if let Some(ref category) = patch.category {
            self.category = category.clone();
        }
        if let Some(ref language) = patch.language {
            self.language = language.clone();
        }
        if let Some(pages) = patch.pages {
            self.pages = pages;
        }
        if let Some(publish_year) = patch.publish_year {
            self.publish_year = publish_year;
        }
        if let Some(stock) = patch.stock {
            self.restock(stock);
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(ref location) = patch.location {
            self.location = location.clone();
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

/// Short book representation attached to borrow records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
}

/// Book search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive substring matched against title, author, ISBN and category
    pub q: Option<String>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub author: String,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10 to 17 characters"))]
    pub isbn: String,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[validate(length(max = 30))]
    pub language: Option<String>,
    #[validate(range(min = 1))]
    pub pages: Option<i32>,
    #[validate(range(min = 1000, max = 2100))]
    pub publish_year: Option<i32>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub location: Option<String>,
}

/// Normalized book ready to be stored; `available` starts equal to `stock`
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub category: String,
    pub language: String,
    pub pages: i32,
    pub publish_year: i32,
    pub stock: i32,
    pub description: String,
    pub location: String,
}

impl From<CreateBook> for NewBook {
    fn from(c: CreateBook) -> Self {
        NewBook {
            title: c.title,
            author: c.author,
            isbn: c.isbn,
            publisher: c.publisher.unwrap_or_default(),
            category: c.category,
            language: c
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            pages: c.pages.unwrap_or(0),
            publish_year: c.publish_year.unwrap_or(0),
            // A book is created with at least one copy
            stock: c.stock.filter(|s| *s > 0).unwrap_or(1),
            description: c.description.unwrap_or_default(),
            location: c.location.unwrap_or_default(),
        }
    }
}

/// Update book request; empty strings count as absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10 to 17 characters"))]
    pub isbn: Option<String>,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(length(max = 30))]
    pub language: Option<String>,
    #[validate(range(min = 1))]
    pub pages: Option<i32>,
    #[validate(range(min = 1000, max = 2100))]
    pub publish_year: Option<i32>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateBook {
    /// Drop empty string fields so they do not overwrite stored values
    pub fn normalized(self) -> Self {
        fn keep(s: Option<String>) -> Option<String> {
            s.filter(|v| !v.trim().is_empty())
        }
        UpdateBook {
            title: keep(self.title),
            author: keep(self.author),
            isbn: keep(self.isbn),
            publisher: keep(self.publisher),
            category: keep(self.category),
            language: keep(self.language),
            description: keep(self.description),
            location: keep(self.location),
            ..self
        }
    }
}
