//! MongoDB wire protocol framing.
pub mod flags;
pub mod header;
pub mod message;

pub use self::flags::OpMsgFlags;
pub use self::header::{Header, OpCode};
pub use self::message::{next_request_id, Message};
