//! Export of the currently displayed view.

pub mod csv;
