/// Size tiers as `(threads, exclusive upper bound in bytes)`, ascending.
const THREAD_LEVELS: [(usize, i64); 4] = [
    (1, 1 << 20),
    (2, 5 << 20),
    (4, 20 << 20),
    (8, 50 << 20),
];

/// Picks how many parts to move concurrently for an object of `size` bytes.
///
/// Small objects get few workers; anything past the last tier gets `max`.
/// The result never exceeds `max`.
pub fn best_threads(size: i64, max: usize) -> usize {
    THREAD_LEVELS
        .iter()
        .find(|(_, limit)| size < *limit)
        .map_or(max, |&(threads, _)| threads.min(max))
}
