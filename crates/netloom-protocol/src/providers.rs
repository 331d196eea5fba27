//! The three pluggable provider slots a [`crate::Protocol`] may hold: access control,
//! compression, and encryption. At most one of each is installed at a time; replacing
//! one closes the previous instance.

use netloom_core::connection::ConnectionId;
use netloom_core::NetResult;

/// Decides whether a connection may send and receive messages. Called both on connect
/// and on every inbound message; implementations are expected to be pure or to cache
/// their own state, since the per-message result becomes the access byte handed to the
/// `MsgProcessor`.
pub trait AccessProvider: Send + Sync {
    /// Returns the access level for `connection_id`, or `None` to deny.
    fn authorize(&self, connection_id: ConnectionId, key: Option<&[u8]>) -> Option<u8>;

    /// Called when the provider is replaced or the owning `Protocol` shuts down.
    fn close(&self) {}
}

/// Compresses and decompresses message payloads.
pub trait CompressionProvider: Send + Sync {
    fn compress(&self, plain: &[u8]) -> NetResult<Vec<u8>>;
    fn decompress(&self, compressed: &[u8]) -> NetResult<Vec<u8>>;
    fn close(&self) {}

    /// Whether this provider leaves payloads unchanged. A `Protocol` uses this to decide
    /// whether to set the outbound header's compressed flag, rather than comparing
    /// byte slices on every send.
    fn is_passthrough(&self) -> bool {
        false
    }
}

/// Encrypts and decrypts message payloads.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, plain: &[u8], connection_id: ConnectionId) -> NetResult<Vec<u8>>;
    fn decrypt(&self, cipher: &[u8], connection_id: ConnectionId) -> NetResult<Vec<u8>>;
    fn close(&self) {}

    /// Whether this provider leaves payloads unchanged. A `Protocol` uses this to decide
    /// whether to set the outbound header's encrypted flag.
    fn is_passthrough(&self) -> bool {
        false
    }
}

/// Denies nothing and grants the maximum access level. The documented default for a
/// `Protocol` that does not need per-connection authorization.
pub struct AllowAllAccess;

impl AccessProvider for AllowAllAccess {
    fn authorize(&self, _connection_id: ConnectionId, _key: Option<&[u8]>) -> Option<u8> {
        Some(u8::MAX)
    }
}

/// Passes payloads through unchanged. The documented default for a `Protocol` that does
/// not set the compressed flag on any message.
pub struct IdentityCompression;

impl CompressionProvider for IdentityCompression {
    fn compress(&self, plain: &[u8]) -> NetResult<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> NetResult<Vec<u8>> {
        Ok(compressed.to_vec())
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

/// Passes payloads through unchanged. The documented default for a `Protocol` that does
/// not set the encrypted flag on any message.
pub struct NullCrypto;

impl CryptoProvider for NullCrypto {
    fn encrypt(&self, plain: &[u8], _connection_id: ConnectionId) -> NetResult<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decrypt(&self, cipher: &[u8], _connection_id: ConnectionId) -> NetResult<Vec<u8>> {
        Ok(cipher.to_vec())
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_grants_max_access() {
        assert_eq!(AllowAllAccess.authorize(51, None), Some(u8::MAX));
    }

    #[test]
    fn identity_compression_is_a_passthrough() {
        let codec = IdentityCompression;
        let out = codec.compress(b"payload").unwrap();
        assert_eq!(codec.decompress(&out).unwrap(), b"payload");
    }

    #[test]
    fn null_crypto_is_a_passthrough() {
        let crypto = NullCrypto;
        let out = crypto.encrypt(b"payload", 51).unwrap();
        assert_eq!(crypto.decrypt(&out, 51).unwrap(), b"payload");
    }
}
