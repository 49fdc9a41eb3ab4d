//! Wire-level building blocks: framing (C2), the typed value codec (C1), command codes
//! and the small structs that make up request/response bodies (§6 of the protocol).

mod column;
mod command;
mod frame;
mod query;
mod value;

pub use column::{ColumnDescription, InternalType};
pub use command::{Command, ResponseStatus};
pub use frame::{FrameTransport, PipeTransport, TcpTransport};
pub use query::{Query, QueryResponse};
pub use value::{Decimal, StreamKind, Value, ValueTag};

pub(crate) use column::read_utf;
pub(crate) use frame::FRAME_LENGTH_SIZE;
