//! The reload coordination core: handler seam, server handle, and the
//! accept loop that survives reloads.

mod handler;
mod serve;
mod server;

pub use handler::{Handler, HandlerFuture};
pub use server::{BoundServer, WatchServer};
