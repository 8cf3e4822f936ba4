//! Domain types: records, scopes, and catalog entities.

pub mod catalog;
pub mod record;
pub mod scope;
