pub mod conversation;
pub mod session;

pub use conversation::{ConversationBuilder, Message, PageContext, PriorMessage, Role};
pub use session::{ChatSession, Storage, TurnEvent, TurnEventRx, TurnEventTx, create_event_channel};
