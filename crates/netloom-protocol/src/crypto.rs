//! A [`CryptoProvider`] backed by libsodium's `chacha20poly1305-ietf` AEAD, the same
//! primitive used for channel encryption elsewhere in this codebase. Each connection
//! has its own symmetric key, installed once a handshake has established one, and its
//! own monotonic send/receive nonce counters so a replayed ciphertext never decrypts
//! twice.

use crate::providers::CryptoProvider;
use byteorder::{LittleEndian, WriteBytesExt};
use ctor::ctor;
use netloom_core::connection::ConnectionId;
use netloom_core::{NetError, NetResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const KEY_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_KEYBYTES as usize;
pub const MAC_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_ABYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_NPUBBYTES as usize;

const NONCE_OFFSET: usize = NONCE_SIZE - 8;

#[ctor]
fn init_sodium() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("libsodium initialization failed");
        }
    }
}

fn nonce_bytes(sequence: u64) -> [u8; NONCE_SIZE] {
    let mut bytes = [0u8; NONCE_SIZE];
    (&mut bytes[NONCE_OFFSET..])
        .write_u64::<LittleEndian>(sequence)
        .expect("fixed-size buffer accepts 8 bytes");
    bytes
}

struct ConnectionKey {
    key: [u8; KEY_SIZE],
    send_sequence: AtomicU64,
    recv_sequence: AtomicU64,
}

/// AEAD encryption keyed per connection, with monotonically increasing nonces on each
/// side of the connection.
pub struct SodiumCrypto {
    protocol_id: u16,
    keys: RwLock<HashMap<ConnectionId, ConnectionKey>>,
}

impl SodiumCrypto {
    pub fn new(protocol_id: u16) -> SodiumCrypto {
        SodiumCrypto {
            protocol_id,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Installs the symmetric key for `connection_id`, replacing any previous one and
    /// resetting its nonce counters. Called once a handshake has derived a shared key.
    pub fn set_key(&self, connection_id: ConnectionId, key: [u8; KEY_SIZE]) {
        self.keys.write().insert(
            connection_id,
            ConnectionKey {
                key,
                send_sequence: AtomicU64::new(0),
                recv_sequence: AtomicU64::new(0),
            },
        );
    }

    pub fn remove_key(&self, connection_id: ConnectionId) {
        self.keys.write().remove(&connection_id);
    }

    fn additional_data(&self, connection_id: ConnectionId) -> [u8; 6] {
        let mut out = [0u8; 6];
        (&mut out[..2])
            .write_u16::<LittleEndian>(self.protocol_id)
            .expect("fixed-size buffer accepts 2 bytes");
        (&mut out[2..])
            .write_u32::<LittleEndian>(connection_id)
            .expect("fixed-size buffer accepts 4 bytes");
        out
    }
}

impl CryptoProvider for SodiumCrypto {
    fn encrypt(&self, plain: &[u8], connection_id: ConnectionId) -> NetResult<Vec<u8>> {
        let keys = self.keys.read();
        let entry = keys.get(&connection_id).ok_or(NetError::SendEncrypt)?;
        let sequence = entry.send_sequence.fetch_add(1, Ordering::SeqCst);
        let nonce = nonce_bytes(sequence);
        let additional_data = self.additional_data(connection_id);

        let mut cipher = vec![0u8; plain.len() + MAC_SIZE];
        let ok = unsafe {
            libsodium_sys::crypto_aead_chacha20poly1305_ietf_encrypt(
                cipher.as_mut_ptr(),
                std::ptr::null_mut(),
                plain.as_ptr(),
                plain.len() as u64,
                additional_data.as_ptr(),
                additional_data.len() as u64,
                std::ptr::null(),
                nonce.as_ptr(),
                entry.key.as_ptr(),
            ) >= 0
        };

        if ok {
            let mut out = Vec::with_capacity(8 + cipher.len());
            out.extend_from_slice(&sequence.to_le_bytes());
            out.extend_from_slice(&cipher);
            Ok(out)
        } else {
            Err(NetError::SendEncrypt)
        }
    }

    fn decrypt(&self, cipher: &[u8], connection_id: ConnectionId) -> NetResult<Vec<u8>> {
        if cipher.len() < 8 + MAC_SIZE {
            return Err(NetError::RcvDecrypt);
        }

        let (sequence_bytes, cipher) = cipher.split_at(8);
        let sequence = u64::from_le_bytes(sequence_bytes.try_into().expect("checked length above"));
        let nonce = nonce_bytes(sequence);
        let additional_data = self.additional_data(connection_id);

        let keys = self.keys.read();
        let entry = keys.get(&connection_id).ok_or(NetError::RcvDecrypt)?;

        if sequence < entry.recv_sequence.load(Ordering::SeqCst) {
            return Err(NetError::RcvDecrypt);
        }

        let mut plain = vec![0u8; cipher.len() - MAC_SIZE];
        let ok = unsafe {
            libsodium_sys::crypto_aead_chacha20poly1305_ietf_decrypt(
                plain.as_mut_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                cipher.as_ptr(),
                cipher.len() as u64,
                additional_data.as_ptr(),
                additional_data.len() as u64,
                nonce.as_ptr(),
                entry.key.as_ptr(),
            ) >= 0
        };

        if ok {
            entry.recv_sequence.store(sequence + 1, Ordering::SeqCst);
            Ok(plain)
        } else {
            Err(NetError::RcvDecrypt)
        }
    }

    fn close(&self) {
        self.keys.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let crypto = SodiumCrypto::new(0x0a55);
        crypto.set_key(51, [7u8; KEY_SIZE]);

        let cipher = crypto.encrypt(b"hello protocol", 51).unwrap();
        let plain = crypto.decrypt(&cipher, 51).unwrap();
        assert_eq!(plain, b"hello protocol");
    }

    #[test]
    fn decrypt_without_a_key_fails() {
        let crypto = SodiumCrypto::new(0x0a55);
        assert!(crypto.decrypt(&[0u8; 64], 51).is_err());
    }

    #[test]
    fn replayed_ciphertext_is_rejected() {
        let crypto = SodiumCrypto::new(0x0a55);
        crypto.set_key(51, [3u8; KEY_SIZE]);

        let cipher = crypto.encrypt(b"first", 51).unwrap();
        crypto.decrypt(&cipher, 51).unwrap();

        assert!(crypto.decrypt(&cipher, 51).is_err());
    }

    #[test]
    fn mismatched_connection_id_fails_authentication() {
        let crypto = SodiumCrypto::new(0x0a55);
        crypto.set_key(51, [9u8; KEY_SIZE]);
        crypto.set_key(52, [9u8; KEY_SIZE]);

        let cipher = crypto.encrypt(b"bound to 51", 51).unwrap();
        assert!(crypto.decrypt(&cipher, 52).is_err());
    }
}
