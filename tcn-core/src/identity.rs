//! Node identity generation.
//!
//! Keys are encoded the way libp2p daemons expect them: a protobuf
//! `{Type, Data}` record, base64 for the private half, and a base58
//! multihash of the public half for the peer id.

use crate::{Result, TcnError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use libp2p::identity::{self, Keypair, PeerId, PublicKey};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_KEY_BITS: usize = 1024;
pub const DEFAULT_KEY_BITS: usize = 2048;

const PROTO_TYPE_FIELD: u8 = 0x08;
const PROTO_DATA_FIELD: u8 = 0x12;
const PROTO_KEY_TYPE_RSA: u64 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Rsa,
    Ed25519,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "RSA"),
            KeyType::Ed25519 => write!(f, "Ed25519"),
        }
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyType::Rsa),
            "ed25519" => Ok(KeyType::Ed25519),
            other => Err(format!(
                "unsupported key type '{}': expected rsa or ed25519",
                other
            )),
        }
    }
}

/// A node's keypair as stored in its configuration record.
///
/// `priv_key` is kept unencrypted. Test cluster repositories are throwaway
/// material and the daemon reads the key back verbatim on every start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Identity {
    #[serde(rename = "PeerID")]
    pub peer_id: String,
    pub priv_key: String,
}

impl Identity {
    /// Returns the protobuf-encoded private key.
    pub fn decode_private_key(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.priv_key.as_bytes())
            .map_err(|error| TcnError::KeySerializationFailed(error.to_string()))
    }
}

struct EncodedKeypair {
    private_proto: Vec<u8>,
    public: PublicKey,
}

pub fn generate_identity(key_type: KeyType, bits: usize) -> Result<Identity> {
    if bits < MIN_KEY_BITS {
        return Err(TcnError::UnsafeKeySize {
            bits,
            min: MIN_KEY_BITS,
        });
    }

    match key_type {
        KeyType::Rsa => tracing::info!("generating {}-bit {} keypair", bits, key_type),
        KeyType::Ed25519 => tracing::info!("generating {} keypair", key_type),
    }

    let keypair = match key_type {
        KeyType::Rsa => generate_rsa(bits)?,
        KeyType::Ed25519 => generate_ed25519()?,
    };

    let priv_key = STANDARD.encode(&keypair.private_proto);
    let peer_id = PeerId::from_public_key(&keypair.public);
    tracing::info!("peer identity: {}", peer_id);

    Ok(Identity {
        peer_id: peer_id.to_base58(),
        priv_key,
    })
}

fn generate_rsa(bits: usize) -> Result<EncodedKeypair> {
    let mut rng = OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|error| TcnError::KeyGenerationFailed(error.to_string()))?;

    let private_der = private
        .to_pkcs1_der()
        .map_err(|error| TcnError::KeySerializationFailed(error.to_string()))?;

    let public_der = private
        .to_public_key()
        .to_public_key_der()
        .map_err(|error| TcnError::IdentityDerivationFailed(error.to_string()))?;
    let public = identity::rsa::PublicKey::try_decode_x509(public_der.as_bytes())
        .map_err(|error| TcnError::IdentityDerivationFailed(error.to_string()))?;

    Ok(EncodedKeypair {
        private_proto: encode_rsa_private_proto(private_der.as_bytes()),
        public: PublicKey::from(public),
    })
}

fn generate_ed25519() -> Result<EncodedKeypair> {
    let keypair = Keypair::generate_ed25519();
    let private_proto = keypair
        .to_protobuf_encoding()
        .map_err(|error| TcnError::KeySerializationFailed(error.to_string()))?;

    Ok(EncodedKeypair {
        private_proto,
        public: keypair.public(),
    })
}

/// libp2p only serializes ed25519 and secp256k1 private keys, so the RSA
/// record `{Type: RSA, Data: <PKCS#1 DER>}` is written directly.
fn encode_rsa_private_proto(pkcs1_der: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pkcs1_der.len() + 8);
    out.push(PROTO_TYPE_FIELD);
    encode_varint(PROTO_KEY_TYPE_RSA, &mut out);
    out.push(PROTO_DATA_FIELD);
    encode_varint(pkcs1_der.len() as u64, &mut out);
    out.extend_from_slice(pkcs1_der);
    out
}

fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}
