pub mod batch;
pub mod client;
pub mod mailbox;
pub mod mime;
pub mod record;
