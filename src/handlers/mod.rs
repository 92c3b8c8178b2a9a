pub mod message_handler;

pub use message_handler::{health, post_message};
