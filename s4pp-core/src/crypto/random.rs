//! Cryptographic-quality random-byte source, abstracted so hosts on
//! constrained devices can plug in a hardware TRNG instead of `OsRng`.

use rand::rngs::OsRng;
use rand::RngCore;

pub trait RandomSource {
    fn fill(&mut self, buf: &mut [u8]);
}

/// Default source backed by the platform CSPRNG.
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Generates the HIDE salt: 8-15 random bytes, none equal to `\n`, followed
/// by a terminating `\n` (§4.G). Rejection-samples individual bytes that
/// land on `\n` rather than discarding the whole draw, keeping the expected
/// number of `fill` calls small.
pub fn generate_salt<R: RandomSource>(rng: &mut R) -> Vec<u8> {
    let mut len_byte = [0u8; 1];
    rng.fill(&mut len_byte);
    let len = 8 + (len_byte[0] as usize % 8); // 8..=15

    let mut salt = vec![0u8; len + 1];
    let mut filled = 0;
    while filled < len {
        let mut candidate = [0u8; 1];
        rng.fill(&mut candidate);
        if candidate[0] != b'\n' {
            salt[filled] = candidate[0];
            filled += 1;
        }
    }
    salt[len] = b'\n';
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u8>);
    impl RandomSource for Fixed {
        fn fill(&mut self, buf: &mut [u8]) {
            for b in buf.iter_mut() {
                *b = if self.0.is_empty() { 0 } else { self.0.remove(0) };
            }
        }
    }

    #[test]
    fn salt_length_is_in_range_and_newline_terminated() {
        let mut rng = Fixed(vec![7, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let salt = generate_salt(&mut rng);
        assert!(salt.len() >= 9 && salt.len() <= 16);
        assert_eq!(*salt.last().unwrap(), b'\n');
        assert!(!salt[..salt.len() - 1].contains(&b'\n'));
    }

    #[test]
    fn salt_never_contains_newline_before_terminator() {
        // Feed a newline byte mid-stream; it must be rejected and resampled.
        let mut rng = Fixed(vec![0, 10, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let salt = generate_salt(&mut rng);
        assert!(!salt[..salt.len() - 1].contains(&b'\n'));
    }
}
