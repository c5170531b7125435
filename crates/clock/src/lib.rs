//! Monotonic time source and unique id generation.
//!
//! Both `Clock` and `IdGen` are injectable so tests can drive the coordinator
//! deterministically instead of racing the wall clock. Timer firing is
//! at-least-once and driven by the background sweepers polling
//! `Store::scan_jobs_expiring_before`, not by awaiting a future returned
//! from `after`: `after` only computes the deadline a caller should record
//! on the entity it is arming a timer for.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use coordinator_primitives::TimestampMs;
use parking_lot::Mutex;
use rand::RngCore;

/// Monotonic-wall-clock time source.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> TimestampMs;

    /// Computes the deadline `duration_ms` from now.
    fn after(&self, duration_ms: u64) -> TimestampMs {
        self.now_ms().plus_ms(duration_ms)
    }
}

/// Generator of unique, 128-bit-entropy opaque ids.
pub trait IdGen: Send + Sync + std::fmt::Debug {
    /// Generates a new id, unique with overwhelming probability.
    fn generate(&self) -> String;
}

/// Real wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        TimestampMs(now.as_millis() as u64)
    }
}

/// Deterministic, manually-advanced clock for tests.
#[derive(Debug)]
pub struct FakeClock {
    now_ms: AtomicU64,
}

impl FakeClock {
    /// Creates a fake clock starting at `start_ms`.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self { now_ms: AtomicU64::new(start_ms) }
    }

    /// Advances the clock by `ms` milliseconds and returns the new time.
    pub fn advance(&self, ms: u64) -> TimestampMs {
        TimestampMs(self.now_ms.fetch_add(ms, Ordering::SeqCst) + ms)
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> TimestampMs {
        TimestampMs(self.now_ms.load(Ordering::SeqCst))
    }
}

/// RFC 4648 base32hex alphabet, used unpadded for opaque ids so they sort
/// consistently with their byte order and stay URL-safe.
const BASE32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHIJKLMNOPQRSTUV";

fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
        }
    }
    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1f;
        out.push(BASE32_ALPHABET[index as usize] as char);
    }
    out
}

/// Generates 128-bit ids from the OS RNG, encoded as unpadded base32.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGen;

impl IdGen for RandomIdGen {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        encode_base32(&bytes)
    }
}

/// Deterministic, sequential id generator for tests.
#[derive(Debug)]
pub struct FakeIdGen {
    next: Mutex<u64>,
    prefix: String,
}

impl FakeIdGen {
    /// Creates a fake id generator that emits `{prefix}-{n}` starting at 0.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self { next: Mutex::new(0), prefix: prefix.to_owned() }
    }
}

impl IdGen for FakeIdGen {
    fn generate(&self) -> String {
        let mut next = self.next.lock();
        let id = format!("{}-{}", self.prefix, *next);
        *next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), TimestampMs(1_000));
        assert_eq!(clock.advance(500), TimestampMs(1_500));
        assert_eq!(clock.now_ms(), TimestampMs(1_500));
    }

    #[test]
    fn after_computes_deadline_without_mutating_clock() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.after(2_000), TimestampMs(3_000));
        assert_eq!(clock.now_ms(), TimestampMs(1_000));
    }

    #[test]
    fn random_id_gen_produces_unpadded_base32_of_fixed_length() {
        let gen = RandomIdGen;
        let id = gen.generate();
        assert_eq!(id.len(), 26);
        assert!(id.chars().all(|c| BASE32_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn random_id_gen_is_extremely_unlikely_to_collide() {
        let gen = RandomIdGen;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(gen.generate()));
        }
    }

    #[test]
    fn fake_id_gen_is_sequential_and_deterministic() {
        let gen = FakeIdGen::new("job");
        assert_eq!(gen.generate(), "job-0");
        assert_eq!(gen.generate(), "job-1");
    }
}
