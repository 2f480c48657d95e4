#![forbid(unsafe_code)]

mod events;
mod node;
mod response;
mod snapshot;
mod store;

pub use events::Event;
pub use node::Node;
pub use response::{Action, Response};
pub use store::Store;
