use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use std::collections::HashMap;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Checks the Ed25519 signature Discord attaches to every interaction webhook.
///
/// The signed message is the timestamp header followed by the raw body, with
/// no separator. Any malformed input yields `false`.
pub fn verify_signature(headers: &HashMap<String, String>, body: &[u8], public_key_hex: &str) -> bool {
    let mut signature = "";
    let mut timestamp = "";

    // Header names arrive in whatever case the gateway chose
    for (name, value) in headers {
        if name.eq_ignore_ascii_case(SIGNATURE_HEADER) {
            signature = value.as_str();
        } else if name.eq_ignore_ascii_case(TIMESTAMP_HEADER) {
            timestamp = value.as_str();
        }
    }

    if signature.is_empty() || timestamp.is_empty() {
        return false;
    }

    let Some(key) = decode_public_key(public_key_hex) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);

    key.verify(&message, &signature).is_ok()
}

fn decode_public_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(public_key_hex.trim()).ok()?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}
