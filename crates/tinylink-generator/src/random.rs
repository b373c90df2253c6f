use crate::Generator;
use std::iter;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const DEFAULT_LENGTH: usize = 8;

/// Fixed-length random alphanumeric aliases.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
            .take(self.length)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_length() {
        let alias = RandomGenerator::default().generate();

        assert_eq!(alias.len(), DEFAULT_LENGTH);
        assert!(alias.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn custom_length() {
        assert_eq!(RandomGenerator::new(12).generate().len(), 12);
        assert_eq!(RandomGenerator::new(0).length(), 1);
    }

    #[test]
    fn aliases_rarely_repeat() {
        let generator = RandomGenerator::default();
        let aliases: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();

        assert_eq!(aliases.len(), 1000);
    }
}
