//! Sea-ORM entities for campus-store

pub mod chat_requests;
pub mod messages;
pub mod presence;
pub mod typing_signals;

pub use chat_requests::Entity as ChatRequests;
pub use messages::Entity as Messages;
pub use presence::Entity as Presence;
pub use typing_signals::Entity as TypingSignals;
