pub mod document;
pub mod narrative;
pub mod span;
pub mod trace;
