//! The `Status` type carried by most reply messages.

use enum_primitive_derive::Primitive;
use num_traits::{FromPrimitive, ToPrimitive};

use super::buffer::{DataRead, DataWrite, WireReader, WireWriter};
use super::error::ProtocolError;

const DEFAULT_MARKER: u8 = 0xFF;

/// The severity of a [`Status`].
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum StatusKind {
    /// The operation succeeded.
    Ok = 0,
    /// The operation succeeded, but with a caveat worth surfacing.
    Warning = 1,
    /// The operation failed.
    Error = 2,
    /// The operation failed in a way that requires tearing down the session.
    Fatal = 3,
}

/// A status report attached to a reply message.
///
/// `DEFAULT` is not a `StatusKind` variant; it is a distinct wire encoding (a
/// lone `0xFF` byte) meaning "success, nothing further to say," represented
/// here as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The severity, or `None` for the wire's DEFAULT encoding.
    pub kind: Option<StatusKind>,
    /// A human-readable message, empty for DEFAULT.
    pub message: String,
    /// A call-tree / stack-trace style string, empty for DEFAULT.
    pub call_tree: String,
}

impl Status {
    /// The canonical "everything is fine, nothing to report" status.
    pub fn default_ok() -> Self {
        Status {
            kind: None,
            message: String::new(),
            call_tree: String::new(),
        }
    }

    /// An OK status carrying an explicit message.
    pub fn ok(message: impl Into<String>) -> Self {
        Status {
            kind: Some(StatusKind::Ok),
            message: message.into(),
            call_tree: String::new(),
        }
    }

    /// An ERROR status carrying an explicit message.
    pub fn error(message: impl Into<String>) -> Self {
        Status {
            kind: Some(StatusKind::Error),
            message: message.into(),
            call_tree: String::new(),
        }
    }

    /// True for DEFAULT and OK kinds only. WARNING is a failure for this
    /// purpose: it is a caveat worth surfacing, not a silent success.
    pub fn is_ok(&self) -> bool {
        matches!(self.kind, None | Some(StatusKind::Ok))
    }
}

impl DataRead for Status {
    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let marker = reader.u8()?;
        if marker == DEFAULT_MARKER {
            return Ok(Status::default_ok());
        }

        let kind = StatusKind::from_u8(marker)
            .ok_or_else(|| ProtocolError::Invalid(format!("unknown status kind: {marker}")))?;
        let message = reader.string()?;
        let call_tree = reader.string()?;

        Ok(Status {
            kind: Some(kind),
            message,
            call_tree,
        })
    }
}

impl DataWrite for Status {
    fn write(&self, writer: &mut WireWriter) {
        match self.kind {
            None => writer.u8(DEFAULT_MARKER),
            Some(kind) => {
                writer.u8(kind.to_u8().expect("StatusKind fits in a u8"));
                writer.string(&self.message);
                writer.string(&self.call_tree);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buffer::test_util::roundtrip;

    #[test]
    fn default_status_is_single_byte() {
        let mut w = WireWriter::new(false);
        Status::default_ok().write(&mut w);
        assert_eq!(w.into_bytes(), vec![0xFF]);
    }

    #[test]
    fn status_roundtrip() {
        roundtrip(&Status::default_ok(), false);
        roundtrip(&Status::ok("all good"), false);
        roundtrip(&Status::error("channel not found"), false);
        roundtrip(
            &Status {
                kind: Some(StatusKind::Fatal),
                message: "fatal".into(),
                call_tree: "at foo\nat bar".into(),
            },
            true,
        );
    }

    #[test]
    fn is_ok_classification() {
        assert!(Status::default_ok().is_ok());
        assert!(Status::ok("fine").is_ok());
        assert!(!Status::error("bad").is_ok());
        assert!(!Status {
            kind: Some(StatusKind::Warning),
            message: "heads up".into(),
            call_tree: String::new(),
        }
        .is_ok());
    }
}
