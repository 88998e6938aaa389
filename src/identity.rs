//! Human-shareable participant codes such as `PT-7KQ2MX`.

use rand::Rng;

/// Uppercase letters and digits without the easily confused `I`, `O`, `0`, `1`.
pub const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const DEFAULT_PREFIX: &str = "PT";
pub const DEFAULT_LENGTH: usize = 6;

pub fn generate_participant_id() -> String {
    generate_participant_id_with(&mut rand::thread_rng(), DEFAULT_PREFIX, DEFAULT_LENGTH)
}

pub fn generate_participant_id_with<R: Rng + ?Sized>(
    rng: &mut R,
    prefix: &str,
    length: usize,
) -> String {
    let body: String = (0..length)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect();
    format!("{prefix}-{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn ids_use_prefix_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let id = generate_participant_id_with(&mut rng, "PT", 6);
            let (prefix, body) = id.split_once('-').unwrap();
            assert_eq!(prefix, "PT");
            assert_eq!(body.len(), 6);
            assert!(body.bytes().all(|b| ID_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn default_ids_are_not_constant() {
        let first = generate_participant_id();
        let differs = (0..20).any(|_| generate_participant_id() != first);
        assert!(differs);
    }
}
