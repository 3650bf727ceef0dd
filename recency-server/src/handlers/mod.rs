pub mod conversations;
pub mod streaming;
