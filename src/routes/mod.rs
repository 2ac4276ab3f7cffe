//! Route modules for Biblio Server

pub mod books;
pub mod documents;
pub mod health;
