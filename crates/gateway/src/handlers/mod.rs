//! API handlers module

pub mod competencies;
pub mod context;
pub mod documents;
pub mod health;
