//! Shared validation utilities

pub mod validation;

pub use validation::ImageValidator;
