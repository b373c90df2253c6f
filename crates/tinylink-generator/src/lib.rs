pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

/// Trait for generating aliases.
///
/// Implementations are pure generators that don't interact with storage, so
/// a generated alias may already be taken. Callers are expected to retry on
/// collision.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self) -> String;
}
