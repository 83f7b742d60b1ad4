//! Canonical event ids and BIP-340 Schnorr signatures.

use rand::Rng;
use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    error::{Error, Result},
    event::Event,
    nip19::{self, Decoded, EncodeParams, Prefix},
};

/// A secp256k1 keypair used to sign events.
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
}

impl Keys {
    /// Parse a private key given as 64 hex characters or as an `nsec` string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let decoded = nip19::decode(input).map_err(|e| Error::InvalidKey(e.to_string()))?;
        match &decoded {
            Decoded::AlreadyHex(_) => {}
            Decoded::Bech32(ident) if ident.prefix == Prefix::Nsec => {}
            Decoded::Bech32(ident) => {
                return Err(Error::InvalidKey(format!(
                    "expected a secret key, got {}",
                    ident.prefix
                )))
            }
        }
        let bytes = hex::decode(decoded.lookup_key()).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let keypair =
            Keypair::from_seckey_slice(&secp, bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let bytes: [u8; 32] = rng.gen();
            // Rejects zero and values above the curve order; retry those.
            if let Ok(keys) = Self::from_secret_bytes(&bytes) {
                return keys;
            }
        }
    }

    /// x-only public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.x_only_public_key().0.serialize())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    pub fn npub(&self) -> Result<String> {
        let mut params = EncodeParams::new(Prefix::Npub);
        params.hex = Some(self.public_key_hex());
        Ok(nip19::encode(&params)?)
    }

    pub fn nsec(&self) -> Result<String> {
        let mut params = EncodeParams::new(Prefix::Nsec);
        params.hex = Some(self.secret_key_hex());
        Ok(nip19::encode(&params)?)
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Recompute the Nostr event hash from its fields.
pub fn event_hash(ev: &Event) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}

/// Lowercase hex of [`event_hash`].
pub fn compute_id(ev: &Event) -> Result<String> {
    Ok(hex::encode(event_hash(ev)?))
}

/// Sign `event` with `keys`.
///
/// An empty `pubkey` is filled from the key. An empty `id` is computed from
/// the canonical serialization; a non-empty one is signed as given, which lets
/// callers sign a pre-computed id.
pub fn sign(mut event: Event, keys: Option<&Keys>) -> Result<Event> {
    let keys = keys.ok_or(Error::SigningUnavailable)?;
    let pubkey = keys.public_key_hex();
    if event.pubkey.is_empty() {
        event.pubkey = pubkey;
    } else if !event.pubkey.eq_ignore_ascii_case(&pubkey) {
        return Err(Error::InvalidEvent(
            "pubkey does not match the signing key".into(),
        ));
    }

    if event.id.is_empty() {
        event.id = compute_id(&event)?;
    } else {
        debug!(id = %event.id, "signing pre-computed id");
    }
    let digest: [u8; 32] = hex::decode(&event.id)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::InvalidEvent(format!("id is not 32 bytes of hex: {}", event.id)))?;

    let secp = Secp256k1::new();
    let msg = Message::from_digest(digest);
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keys.keypair);
    event.sig = hex::encode(sig.as_ref());
    Ok(event)
}

/// Whether `id` is the canonical hash of the other fields.
pub fn verify_id(ev: &Event) -> bool {
    compute_id(ev).is_ok_and(|id| id.eq_ignore_ascii_case(&ev.id))
}

/// Check the Schnorr signature over `id` against `pubkey`. The id itself is
/// taken as given, so events signed over a pre-computed id verify too.
/// Malformed fields yield `false`.
pub fn verify(ev: &Event) -> bool {
    let check = || -> Option<()> {
        let digest: [u8; 32] = hex::decode(&ev.id).ok()?.try_into().ok()?;
        let sig = Signature::from_slice(&hex::decode(&ev.sig).ok()?).ok()?;
        let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey).ok()?).ok()?;
        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(&sig, &Message::from_digest(digest), &pk)
            .ok()
    };
    check().is_some()
}
