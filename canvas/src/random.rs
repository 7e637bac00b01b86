//! Random numbers that do not depend on how lines are spread over threads.
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A generator for one line of a framework call.
///
/// Every line gets its own stream of the generator seeded with `seed`. Filters that draw
/// numbers per pixel produce the same image whatever the number of threads or the order in which
/// lines are processed, as long as they draw from the generator of the line they work on.
pub fn line_rng(seed: u64, line: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(line as u64);
    rng
}

#[cfg(test)]
mod tests {
    use super::line_rng;
    use rand::Rng;

    #[test]
    fn streams_differ_per_line() {
        let a: Vec<u32> = line_rng(7, 0).sample_iter(rand::distributions::Standard).take(8).collect();
        let b: Vec<u32> = line_rng(7, 1).sample_iter(rand::distributions::Standard).take(8).collect();
        let again: Vec<u32> = line_rng(7, 0).sample_iter(rand::distributions::Standard).take(8).collect();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }
}
