//! Data models for the book rental server

pub mod book;
pub mod borrowing;
pub mod user;

// Re-export commonly used types
pub use book::{Book, Cover, CreateBook, UpdateBook};
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, BorrowingQuery, NewBorrowing};
pub use user::{User, UserClaims};
