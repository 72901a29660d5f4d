//! Message handling - Event-driven message processing

pub mod emitter;
pub mod parser;
pub mod prefix;
pub mod router;

pub use emitter::{EventBus, EventEmitter};
pub use parser::{MessageParser, ParsedInput};
pub use prefix::PrefixResolver;
pub use router::{BindingId, EventHandler, EventRouter};
