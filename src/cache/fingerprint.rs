use crate::context::ResolvedCall;
use sha2::{Digest, Sha256};
use std::fmt;

/// Unit separator between hashed components, so `("ab", "c")` and `("a", "bc")` differ.
const SEPARATOR: &[u8] = b"\x1f";

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Deterministic cache key for a call.
///
/// SHA-256 over the class name, version, method name and the bound arguments, rendered
/// as lowercase hex. Named arguments are hashed in key order, so the order in which a
/// router bound them does not matter. The caller identity is deliberately not part of
/// the key: cached results are shared between callers that passed the guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint of `call` on `class_name`.
    #[must_use]
    pub fn of(class_name: &str, call: &ResolvedCall) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(class_name.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(call.metadata.version.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(call.target.method_name().as_bytes());

        let args = call.target.arguments();
        for value in &args.positional {
            hasher.update(SEPARATOR);
            hasher.update(value.to_string().as_bytes());
        }
        hasher.update(SEPARATOR);
        for (name, value) in &args.named {
            hasher.update(SEPARATOR);
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for b in digest.iter() {
            hex.push(char::from(HEX[usize::from(b >> 4)]));
            hex.push(char::from(HEX[usize::from(b & 0x0f)]));
        }
        Self(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
