use crate::error::MessageError;
use crate::hash::type_hash;

/// Body contract for a message type carried in frames.
///
/// msgwire never looks inside a body: a type names itself, reports how many
/// bytes its body needs, writes that body into a caller-provided region, and
/// parses a body into a fresh instance obtained from [`Default`].
///
/// For serde types, [`json_message!`](crate::json_message) implements this
/// trait with JSON bodies.
pub trait Message: Default + Send + 'static {
    /// Name hashed into the wire type discriminant. Peers must agree on it.
    const TYPE_NAME: &'static str;

    /// Wire type discriminant for this message type.
    fn wire_type_id() -> u32 {
        type_hash(Self::TYPE_NAME)
    }

    /// Number of body bytes [`serialize_into`](Self::serialize_into) writes.
    fn byte_size(&self) -> usize;

    /// Serialize the body into `buf`, returning the bytes written.
    fn serialize_into(&self, buf: &mut [u8]) -> Result<usize, MessageError>;

    /// Replace `self` with the value decoded from `buf`.
    fn parse_from(&mut self, buf: &[u8]) -> Result<(), MessageError>;
}

/// Implement [`Message`] for a serde type using JSON bodies.
///
/// ```
/// use msgwire_frame::{json_message, Message};
///
/// #[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
/// struct Ping {
///     seq: u32,
/// }
///
/// json_message!(Ping);
///
/// assert_eq!(Ping::TYPE_NAME, "Ping");
/// ```
#[macro_export]
macro_rules! json_message {
    ($ty:ident) => {
        $crate::json_message!($ty, stringify!($ty));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::Message for $ty {
            const TYPE_NAME: &'static str = $name;

            fn byte_size(&self) -> usize {
                $crate::json::byte_size(self)
            }

            fn serialize_into(
                &self,
                buf: &mut [u8],
            ) -> ::std::result::Result<usize, $crate::MessageError> {
                $crate::json::serialize_into(self, Self::TYPE_NAME, buf)
            }

            fn parse_from(&mut self, buf: &[u8]) -> ::std::result::Result<(), $crate::MessageError> {
                *self = $crate::json::parse(Self::TYPE_NAME, buf)?;
                Ok(())
            }
        }
    };
}
