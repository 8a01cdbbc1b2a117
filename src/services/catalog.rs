//! Catalog management service

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::book::{Book, CreateBook, NewBook, UpdateBook},
    repository::{BookFilter, Repository},
    services::users::required_query,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository
            .catalog
            .get_book(id)
            .await?
            .ok_or_else(|| LendingError::BookNotFound.into())
    }

    pub async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        self.repository
            .catalog
            .get_book_by_isbn(isbn)
            .await?
            .ok_or_else(|| LendingError::BookNotFound.into())
    }

    /// Active books
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.catalog.list_books(BookFilter::Active).await
    }

    /// Active books with at least one free copy
    pub async fn available_books(&self) -> AppResult<Vec<Book>> {
        self.repository.catalog.list_books(BookFilter::Available).await
    }

    pub async fn books_by_category(&self, category: &str) -> AppResult<Vec<Book>> {
        let category = category.trim();
        if category.is_empty() {
            return Err(AppError::Validation("Category is required".to_string()));
        }
        self.repository
            .catalog
            .list_books(BookFilter::Category(category.to_string()))
            .await
    }

    pub async fn search_books(&self, q: Option<String>) -> AppResult<Vec<Book>> {
        let q = required_query(q)?;
        self.repository.catalog.list_books(BookFilter::Search(q)).await
    }

    pub async fn create_book(&self, request: CreateBook) -> AppResult<Book> {
        request.validate()?;

        if self
            .repository
            .catalog
            .get_book_by_isbn(&request.isbn)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists".to_string(),
            ));
        }

        let book = self
            .repository
            .catalog
            .create_book(NewBook::from(request), Utc::now())
            .await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, stock = book.stock, "Book created");
        Ok(book)
    }

    pub async fn update_book(&self, id: i32, patch: UpdateBook) -> AppResult<Book> {
        let patch = patch.normalized();
        patch.validate()?;

        let current = self.get_book(id).await?;

        if let Some(ref isbn) = patch.isbn {
            if *isbn != current.isbn {
                if let Some(other) = self.repository.catalog.get_book_by_isbn(isbn).await? {
                    if other.id != id {
                        return Err(AppError::Conflict(
                            "Book with this ISBN already exists".to_string(),
                        ));
                    }
                }
            }
        }

        let book = self
            .repository
            .catalog
            .update_book(id, patch, Utc::now())
            .await?;
        tracing::info!(
            book_id = id,
            stock = book.stock,
            available = book.available,
            "Book updated"
        );
        Ok(book)
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.catalog.delete_book(id, Utc::now()).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }
}
