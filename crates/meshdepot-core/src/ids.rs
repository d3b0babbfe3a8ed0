//! Time-ordered 64-bit entity ids.
//!
//! Layout, most significant bit first:
//!
//! ```text
//! | 41 bits: ms since 2020-01-01 | 10 bits: generator id | 12 bits: sequence |
//! ```
//!
//! A generator is an ordinary value owned by whoever creates entities. Two
//! processes sharing a database must be configured with distinct generator ids.

use std::sync::Mutex;

use chrono::Utc;

/// 2020-01-01T00:00:00Z in unix milliseconds.
pub const ID_EPOCH_MS: i64 = 1_577_836_800_000;

const GENERATOR_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;
const MAX_GENERATOR_ID: u16 = (1 << GENERATOR_BITS) - 1;

#[derive(Debug)]
struct GeneratorState {
    last_ms: i64,
    sequence: u16,
}

#[derive(Debug)]
pub struct IdGenerator {
    generator_id: u16,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Generator ids above 1023 are masked to their low 10 bits.
    pub fn new(generator_id: u16) -> Self {
        Self {
            generator_id: generator_id & MAX_GENERATOR_ID,
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generator_id(&self) -> u16 {
        self.generator_id
    }

    pub fn next_id(&self) -> i64 {
        self.next_id_at(Utc::now().timestamp_millis())
    }

    /// Produce an id as if the clock read `now_ms`.
    ///
    /// Ids stay strictly increasing even if the clock steps backwards or more
    /// than 4096 ids are requested within one millisecond; in both cases the
    /// generator borrows from the next millisecond.
    pub fn next_id_at(&self, now_ms: i64) -> i64 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = (now_ms - ID_EPOCH_MS).max(0);
        if elapsed > state.last_ms {
            state.last_ms = elapsed;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.last_ms += 1;
            }
        }

        (state.last_ms << (GENERATOR_BITS + SEQUENCE_BITS))
            | (i64::from(self.generator_id) << SEQUENCE_BITS)
            | i64::from(state.sequence)
    }
}

/// Split an id back into (ms since epoch, generator id, sequence).
pub fn decompose(id: i64) -> (i64, u16, u16) {
    let ms = id >> (GENERATOR_BITS + SEQUENCE_BITS);
    let generator = ((id >> SEQUENCE_BITS) as u16) & MAX_GENERATOR_ID;
    let sequence = (id as u16) & SEQUENCE_MASK;
    (ms, generator, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_round_trips() {
        let generator = IdGenerator::new(5);
        let id = generator.next_id_at(ID_EPOCH_MS + 1_000);
        assert_eq!(decompose(id), (1_000, 5, 0));
    }

    #[test]
    fn test_same_millisecond_increments_sequence() {
        let generator = IdGenerator::new(1);
        let a = generator.next_id_at(ID_EPOCH_MS + 50);
        let b = generator.next_id_at(ID_EPOCH_MS + 50);
        assert_eq!(decompose(b), (50, 1, 1));
        assert!(b > a);
    }

    #[test]
    fn test_sequence_overflow_borrows_next_millisecond() {
        let generator = IdGenerator::new(0);
        let mut last = 0;
        for _ in 0..=4096 {
            let id = generator.next_id_at(ID_EPOCH_MS + 10);
            assert!(id > last);
            last = id;
        }
        assert_eq!(decompose(last), (11, 0, 0));
    }

    #[test]
    fn test_clock_going_backwards_stays_monotonic() {
        let generator = IdGenerator::new(3);
        let a = generator.next_id_at(ID_EPOCH_MS + 500);
        let b = generator.next_id_at(ID_EPOCH_MS + 100);
        assert!(b > a);
    }

    #[test]
    fn test_generators_do_not_collide() {
        let a = IdGenerator::new(1).next_id_at(ID_EPOCH_MS + 7);
        let b = IdGenerator::new(2).next_id_at(ID_EPOCH_MS + 7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_generator_id_is_masked() {
        assert_eq!(IdGenerator::new(1024 + 9).generator_id(), 9);
    }
}
