pub mod last_run;

pub use last_run::{query_start, LastRunStore};
