//! HMAC-SHA256 signatures over gateway callbacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks that a payment callback was signed with the shared gateway secret.
///
/// The signed message is `"{gateway_order_id}|{gateway_payment_id}"` and the
/// signature is its lowercase hex HMAC-SHA256.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        Some(mac)
    }

    /// Returns the hex signature the gateway would send for this payment.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Option<String> {
        self.mac(gateway_order_id, gateway_payment_id)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
    }

    /// Compares `signature` against the expected one in constant time.
    ///
    /// Malformed hex is a mismatch.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(gateway_order_id, gateway_payment_id)
            .is_some_and(|mac| mac.verify_slice(&provided).is_ok())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}
