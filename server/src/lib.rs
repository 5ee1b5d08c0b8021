pub mod config;
pub mod error;
pub mod matrix;
pub mod scim;
pub mod sync;
pub mod web;
