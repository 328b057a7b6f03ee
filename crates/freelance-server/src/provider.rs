use std::sync::Arc;

use uuid::Uuid;

/// Maps a request key to its reply payload.
///
/// Must be cheap and total: there is no failure frame on the wire, so a
/// provider that can fail has to encode the failure in the payload.
pub type Provider = Arc<dyn Fn(&Uuid) -> Vec<u8> + Send + Sync>;

/// Provider answering every key with its 32-bit hash, big-endian.
///
/// The hash folds the key's two 64-bit halves together, then the two 32-bit
/// halves of the result.
pub fn hash_provider() -> Provider {
    Arc::new(|key: &Uuid| key_hash(key).to_be_bytes().to_vec())
}

fn key_hash(key: &Uuid) -> i32 {
    let (high, low) = key.as_u64_pair();
    let folded = high ^ low;
    ((folded >> 32) as i32) ^ (folded as i32)
}
