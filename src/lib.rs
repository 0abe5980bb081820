//! A pure Rust implementation of the PVAccess channel-access protocol, suitable
//! for writing clients and servers that discover channels and negotiate their
//! introspection over UDP and TCP.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod protocol;
pub mod session;
pub mod transport;

/// Attempts to determine the UDP broadcast/discovery port from the runtime
/// environment, checking `$EPICS_PVA_BROADCAST_PORT`. Falls back to
/// [`protocol::PVA_BROADCAST_PORT`] if unset or unparseable.
pub fn broadcast_port_from_env() -> u16 {
    std::env::var("EPICS_PVA_BROADCAST_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(protocol::PVA_BROADCAST_PORT)
}

/// Attempts to determine the TCP server port from the runtime environment,
/// checking `$EPICS_PVA_SERVER_PORT`. Falls back to [`protocol::PVA_SERVER_PORT`]
/// if unset or unparseable.
pub fn server_port_from_env() -> u16 {
    std::env::var("EPICS_PVA_SERVER_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(protocol::PVA_SERVER_PORT)
}

/// Parses `$EPICS_PVA_ADDR_LIST` (a whitespace-separated list of host or
/// host:port addresses) into a list of socket address strings. Returns an
/// empty vector if the variable is unset.
pub fn addr_list_from_env() -> Vec<String> {
    std::env::var("EPICS_PVA_ADDR_LIST")
        .ok()
        .map(|s| s.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_port_falls_back_to_default() {
        std::env::remove_var("EPICS_PVA_BROADCAST_PORT");
        assert_eq!(broadcast_port_from_env(), protocol::PVA_BROADCAST_PORT);
    }

    #[test]
    fn server_port_falls_back_to_default() {
        std::env::remove_var("EPICS_PVA_SERVER_PORT");
        assert_eq!(server_port_from_env(), protocol::PVA_SERVER_PORT);
    }

    #[test]
    fn addr_list_empty_when_unset() {
        std::env::remove_var("EPICS_PVA_ADDR_LIST");
        assert!(addr_list_from_env().is_empty());
    }
}
