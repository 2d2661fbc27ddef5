//! Query execution module
//!
//! This module evaluates selects over materialized table scans and defines
//! the result type every statement produces.

pub mod query;
pub mod result;

pub use query::{select, QueryTable};
pub use result::QueryResult;
