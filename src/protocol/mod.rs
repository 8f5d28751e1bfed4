//! Wire protocol shared by the server and its clients.

mod messages;

pub use messages::*;
