//! Certificate verification codes
//!
//! Format: `KND-XXXX-XXXX-XXXX`. The alphabet drops `0`, `1`, `I` and `O` so
//! codes survive being read aloud or retyped from paper.

use rand::Rng;

pub const CODE_PREFIX: &str = "KND";

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GROUPS: usize = 3;
const GROUP_LEN: usize = 4;

pub fn generate_certificate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_PREFIX.len() + GROUPS * (GROUP_LEN + 1));
    code.push_str(CODE_PREFIX);

    for _ in 0..GROUPS {
        code.push('-');
        for _ in 0..GROUP_LEN {
            let idx = rng.gen_range(0..ALPHABET.len());
            code.push(ALPHABET[idx] as char);
        }
    }

    code
}

/// Upper-cases and trims user input so lookups are forgiving
pub fn normalize_certificate_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_valid_certificate_code(code: &str) -> bool {
    let mut parts = code.split('-');
    if parts.next() != Some(CODE_PREFIX) {
        return false;
    }

    let groups: Vec<&str> = parts.collect();
    groups.len() == GROUPS
        && groups
            .iter()
            .all(|g| g.len() == GROUP_LEN && g.bytes().all(|b| ALPHABET.contains(&b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..200 {
            let code = generate_certificate_code();
            assert_eq!(code.len(), 18);
            assert!(is_valid_certificate_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_codes_avoid_ambiguous_characters() {
        for _ in 0..200 {
            let code = generate_certificate_code();
            let body = &code[CODE_PREFIX.len()..];
            assert!(!body.contains(&['0', '1', 'I', 'O'][..]), "ambiguous code {}", code);
        }
    }

    #[test]
    fn test_codes_are_random() {
        let codes: HashSet<String> = (0..100).map(|_| generate_certificate_code()).collect();
        assert_eq!(codes.len(), 100);
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_certificate_code("KND-ABCD-EFGH-JK23"));
        assert!(!is_valid_certificate_code("KND-ABCD-EFGH"));
        assert!(!is_valid_certificate_code("XYZ-ABCD-EFGH-JK23"));
        assert!(!is_valid_certificate_code("KND-ABCD-EFGH-JK2O"));
        assert!(!is_valid_certificate_code("knd-abcd-efgh-jk23"));
        assert!(is_valid_certificate_code(&normalize_certificate_code(" knd-abcd-efgh-jk23 ")));
    }
}
