#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod adapter;
pub mod admitter;
mod connection;
pub mod error;
mod frame;
mod hub;
mod keepalive;
mod registry;
pub mod transport;

pub use admitter::{admit, Collaborators, NotesService, PermissionsService, SessionService, Storage, UsersService};
pub use connection::Connection;
pub use error::{ClResult, Error};
pub use frame::TEXT_CHANNEL;
pub use hub::{NoteHub, OnDestroy};
pub use keepalive::DEFAULT_INTERVAL;
pub use registry::HubRegistry;
pub use transport::{Inbound, TransportSink, TransportStream};

// vim: ts=4
