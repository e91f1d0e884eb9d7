//! Credential generation for fresh configurations and the `keygen` command.
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::protocol::RealityKeys;

/// Random bytes behind a generated password
const PASSWORD_BYTES: usize = 18;
/// Key length for `2022-blake3-aes-128-gcm`
const SHADOWSOCKS_KEY_BYTES: usize = 16;

pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// URL-safe random password suitable for share links.
pub fn password() -> String {
    let bytes: [u8; PASSWORD_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Shadowsocks-2022 key, standard base64 as the engine expects it.
pub fn shadowsocks_key() -> String {
    let bytes: [u8; SHADOWSOCKS_KEY_BYTES] = rand::random();
    STANDARD.encode(bytes)
}

/// 8 hex characters
pub fn short_id() -> String {
    let bytes: [u8; 4] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// X25519 key pair encoded like `sing-box generate reality-keypair` prints it.
///
/// The short id is left empty; callers pair it with [`short_id`] when needed.
pub fn reality_keypair() -> RealityKeys {
    let secret = StaticSecret::from(rand::random::<[u8; 32]>());
    let public = PublicKey::from(&secret);
    RealityKeys {
        private_key: URL_SAFE_NO_PAD.encode(secret.to_bytes()),
        public_key: URL_SAFE_NO_PAD.encode(public.as_bytes()),
        short_id: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_eight_hex_chars() {
        let sid = short_id();
        assert_eq!(sid.len(), 8);
        assert!(sid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn reality_keys_decode_to_32_bytes() {
        let keys = reality_keypair();
        let private = URL_SAFE_NO_PAD.decode(&keys.private_key).unwrap();
        let public = URL_SAFE_NO_PAD.decode(&keys.public_key).unwrap();
        assert_eq!(private.len(), 32);
        assert_eq!(public.len(), 32);

        let secret = StaticSecret::from(<[u8; 32]>::try_from(private.as_slice()).unwrap());
        assert_eq!(PublicKey::from(&secret).as_bytes().as_slice(), public);
    }

    #[test]
    fn shadowsocks_key_length() {
        let key = STANDARD.decode(shadowsocks_key()).unwrap();
        assert_eq!(key.len(), SHADOWSOCKS_KEY_BYTES);
    }

    #[test]
    fn generated_values_differ() {
        assert_ne!(password(), password());
        assert_ne!(uuid(), uuid());
        assert!(uuid::Uuid::parse_str(&uuid()).is_ok());
    }
}
