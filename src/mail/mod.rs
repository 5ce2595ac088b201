pub mod imap;
pub mod parser;
pub mod session;
pub mod types;
