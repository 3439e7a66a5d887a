//! Pairing-code generator and validator (component B).
//!
//! Codes are 11 ASCII characters: three 3-character groups over
//! `[A-Z0-9]` (36 symbols) separated by `-`, giving a 36^9 ≈ 10^14
//! keyspace. Grounded on this workspace's own `rand`-backed code
//! generation (see the gateway's pairing-code helper), widened from a
//! 8-digit numeric code to the spec's alphanumeric grouped format.

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUP_LEN: usize = 3;
const GROUPS: usize = 3;

/// Generate a new pairing code using the OS-backed CSPRNG.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(GROUP_LEN * GROUPS + (GROUPS - 1));
    for group in 0..GROUPS {
        if group > 0 {
            code.push('-');
        }
        for _ in 0..GROUP_LEN {
            let idx = rng.random_range(0..ALPHABET.len());
            code.push(ALPHABET[idx] as char);
        }
    }
    code
}

/// `true` iff `s` matches `^[A-Z0-9]{3}-[A-Z0-9]{3}-[A-Z0-9]{3}$`.
pub fn validate(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != GROUP_LEN * GROUPS + (GROUPS - 1) {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let is_dash_position = i == GROUP_LEN || i == GROUP_LEN * 2 + 1;
        if is_dash_position {
            if b != b'-' {
                return false;
            }
        } else if !b.is_ascii_uppercase() && !b.is_ascii_digit() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_validate() {
        for _ in 0..100 {
            let code = generate();
            assert!(validate(&code), "{code} should validate");
        }
    }

    #[test]
    fn generated_codes_have_expected_shape() {
        let code = generate();
        assert_eq!(code.len(), 11);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn rejects_lowercase() {
        assert!(!validate("abc-123-xyz"));
    }

    #[test]
    fn rejects_wrong_grouping() {
        assert!(!validate("ABC123-XYZ"));
        assert!(!validate("ABC-123-XYZZ"));
        assert!(!validate("AB-123-XYZ"));
    }

    #[test]
    fn rejects_bad_separators() {
        assert!(!validate("ABC_123_XYZ"));
    }

    #[test]
    fn two_generated_codes_are_very_unlikely_to_collide() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
