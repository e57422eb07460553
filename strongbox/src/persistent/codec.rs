use crate::errors::StrongboxResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes an object into the byte form handed to the store.
pub fn encode<T: Serialize>(value: &T) -> StrongboxResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::legacy(),
    )?)
}

/// Decodes an object previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StrongboxResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::Handle;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Node {
        name: String,
        children: Vec<Handle>,
    }

    #[test]
    fn handles_survive_encoding() {
        let node = Node {
            name: "root".to_string(),
            children: vec![Handle::new(3), Handle::new(9)],
        };
        let bytes = encode(&node).unwrap();
        assert_eq!(decode::<Node>(&bytes).unwrap(), node);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = encode(&"a fairly long string".to_string()).unwrap();
        let err = decode::<String>(&bytes[..4]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
    }
}
