pub mod query;
pub mod quota;
pub mod tool;
