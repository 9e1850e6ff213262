//! Serialization and Deserialization for [NetworkMessage]

use crate::print;
use crate::world_view::NetworkMessage;

/// Serializes a `NetworkMessage` into a binary format.
///
/// Uses `bincode`. If serialization fails, the error is logged and `None` is returned.
///
/// ## Parameters
/// - `msg`: The message to be serialized.
///
/// ## Returns
/// - `Some(Vec<u8>)` with the serialized data, or `None` on failure.
pub fn serialize_message(msg: &NetworkMessage) -> Option<Vec<u8>> {
    match bincode::serialize(msg) {
        Ok(serialized_data) => Some(serialized_data),
        Err(e) => {
            print::err(format!("Serialization failed: {} (serial.rs, serialize_message())", e));
            None
        }
    }
}

/// Deserializes a `NetworkMessage` from a binary format.
///
/// Malformed datagrams are logged and dropped.
///
/// ## Parameters
/// - `data`: The received bytes.
///
/// ## Returns
/// - `Some(NetworkMessage)`, or `None` if the bytes do not decode.
pub fn deserialize_message(data: &[u8]) -> Option<NetworkMessage> {
    match bincode::deserialize(data) {
        Ok(msg) => Some(msg),
        Err(e) => {
            print::err(format!("Deserialization failed: {} (serial.rs, deserialize_message())", e));
            None
        }
    }
}
