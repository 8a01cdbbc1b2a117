//! Data models for the library server

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookSummary, NewBook};
pub use borrow::{Borrow, BorrowDetails, BorrowStatus, NewBorrow};
pub use user::{NewUser, Principal, Role, User, UserSummary};
