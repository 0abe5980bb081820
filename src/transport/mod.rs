//! Non-blocking socket wrappers that drive the session state machines in
//! [`crate::session`] over real UDP and TCP sockets.

pub mod tcp;
pub mod udp;
