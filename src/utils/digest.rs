use bincode::config;
use serde::Serialize;

/// cacluate [blake3] hash of the encoded form of a serilizeable object
pub fn digest<T: Serialize>(t: &T) -> anyhow::Result<[u8; 32]> {
    let encoded = bincode::serde::encode_to_vec(t, config::legacy())?;
    Ok(*blake3::hash(&encoded).as_bytes())
}
