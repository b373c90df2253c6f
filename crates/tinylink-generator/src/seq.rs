use crate::Generator;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sequential aliases: a prefix followed by a zero-padded counter
/// ("tl000000", "tl000001", ...).
///
/// Unique within a single instance. Multiple nodes need distinct prefixes
/// or disjoint offsets.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Starts counting at `offset`, e.g. to resume after a restart.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}{:06}", self.prefix, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_sequential_aliases() {
        let generator = SeqGenerator::with_prefix("tl");

        assert_eq!(generator.generate(), "tl000000");
        assert_eq!(generator.generate(), "tl000001");
        assert_eq!(generator.generate(), "tl000002");
    }

    #[test]
    fn starts_at_offset() {
        let generator = SeqGenerator::with_offset("node-a", 1000);

        assert_eq!(generator.generate(), "node-a001000");
        assert_eq!(generator.generate(), "node-a001001");
    }

    #[test]
    fn clone_continues_from_current_counter() {
        let generator = SeqGenerator::with_prefix("tl");
        generator.generate();
        generator.generate();

        let cloned = generator.clone();

        assert_eq!(generator.generate(), "tl000002");
        assert_eq!(cloned.generate(), "tl000002");
    }

    #[test]
    fn generators_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeqGenerator>();
        assert_send_sync::<crate::RandomGenerator>();
    }
}
