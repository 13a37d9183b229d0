//! EIP-55 checksummed addresses.

use tiny_keccak::{Hasher, Keccak};

/// Normalize a 20-byte hex address to its EIP-55 checksum form.
///
/// Accepts any casing, with or without the `0x` prefix. Returns `None` if the
/// input is not exactly 40 hex digits.
pub fn checksum(address: &str) -> Option<String> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let lower = digits.to_ascii_lowercase();

    let mut hasher = Keccak::v256();
    hasher.update(lower.as_bytes());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Returns `true` if `address` parses as a 20-byte hex address.
pub fn is_address(address: &str) -> bool {
    checksum(address).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip55_vectors() {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(checksum(&expected.to_lowercase()).as_deref(), Some(expected));
            assert_eq!(checksum(&expected.to_uppercase().replacen("0X", "0x", 1)).as_deref(), Some(expected));
        }
    }

    #[test]
    fn accepts_missing_prefix() {
        assert_eq!(
            checksum("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").as_deref(),
            Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(checksum("").is_none());
        assert!(checksum("0x1234").is_none());
        assert!(checksum("0xzzzeb6053f3e94c9b9a09f33669435e7ef1beaed").is_none());
        assert!(!is_address("not-an-address"));
    }
}
