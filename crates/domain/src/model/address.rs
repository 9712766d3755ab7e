use ripemd::Ripemd160;
use sha3::{Digest, Keccak256};

use super::{Address, AddressError, NetworkTag};

const PUBLIC_KEY_LENGTH: usize = 32;
const CHECKSUM_LENGTH: usize = 4;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Derives the account address owning `public_key` (hex) on `network`.
///
/// The account hash is RIPEMD-160 over Keccak-256 of the key, prefixed with
/// the network version byte and suffixed with a 4-byte Keccak-256 checksum,
/// then base32 encoded.
pub fn derive_address(public_key: &str, network: NetworkTag) -> Result<Address, AddressError> {
    let key = hex::decode(public_key.trim())
        .ok()
        .filter(|bytes| bytes.len() == PUBLIC_KEY_LENGTH)
        .ok_or_else(|| AddressError::InvalidPublicKey(public_key.to_string()))?;

    let account_hash = Ripemd160::digest(Keccak256::digest(&key));

    let mut decoded = Vec::with_capacity(1 + account_hash.len() + CHECKSUM_LENGTH);
    decoded.push(network.version_byte());
    decoded.extend_from_slice(&account_hash);
    let checksum = Keccak256::digest(&decoded);
    decoded.extend_from_slice(&checksum[..CHECKSUM_LENGTH]);

    Ok(Address::from_encoded(base32_encode(&decoded)))
}

fn base32_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for byte in bytes {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            encoded.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        encoded.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c5f54ba980fcbb657dbaaa42700539b207873e134d2375efeab5f1ab52f87844";

    #[test]
    fn base32_matches_rfc4648_vectors() {
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn derived_address_carries_network_marker() {
        let main = derive_address(KEY, NetworkTag::Production).expect("valid key");
        let test = derive_address(KEY, NetworkTag::Test).expect("valid key");

        assert_eq!(main.as_str().len(), 40);
        assert_eq!(test.as_str().len(), 40);
        assert!(main.as_str().starts_with('N'));
        assert!(test.as_str().starts_with('T'));
        assert_eq!(main.network(), NetworkTag::Production);
        assert_eq!(test.network(), NetworkTag::Test);
        assert_eq!(
            derive_address(KEY, NetworkTag::Test).unwrap(),
            test,
            "derivation is deterministic"
        );
    }

    #[test]
    fn derives_known_addresses() {
        assert_eq!(
            derive_address(KEY, NetworkTag::Production).unwrap().as_str(),
            "NDD2CT6LQLIYQ56KIXI3ENTM6EK3D44P5JFXJ4R4"
        );
        assert_eq!(
            derive_address(KEY, NetworkTag::Test).unwrap().as_str(),
            "TDD2CT6LQLIYQ56KIXI3ENTM6EK3D44P5KZPFMK2"
        );
    }

    #[test]
    fn derived_address_survives_parse() {
        let derived = derive_address(KEY, NetworkTag::Test).unwrap();
        let parsed = Address::parse(derived.as_str()).expect("derived address parses");
        assert_eq!(parsed, derived);
    }

    #[test]
    fn rejects_malformed_public_keys() {
        assert!(matches!(
            derive_address("zz", NetworkTag::Test),
            Err(AddressError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            derive_address("abcd", NetworkTag::Production),
            Err(AddressError::InvalidPublicKey(_))
        ));
    }
}
