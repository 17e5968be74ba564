//! Database table modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for one table.

mod boards;    // boards (joined with instances on read)
mod instances; // instances
