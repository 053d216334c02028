pub mod categories;
pub mod chat_messages;
pub mod communities;
pub mod events;
