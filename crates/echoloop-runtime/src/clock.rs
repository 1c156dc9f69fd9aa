//! StepClock — the shared cyclic counter
//!
//! One clock drives every engine. `advance` is the only mutator: it walks
//! 1→12 and wraps to 1, bumping the cycle counter exactly once per wrap.
//! Reads are safe concurrently with `advance`.

use crate::topology::Topology;
use echoloop_core::{ClockSnapshot, EngineId, Error, Phase, Result, CYCLE_LENGTH};
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    step: u32,
    cycles: u64,
}

pub struct StepClock {
    topology: Arc<Topology>,
    state: Mutex<ClockState>,
}

impl StepClock {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self {
            topology,
            state: Mutex::new(ClockState { step: 1, cycles: 0 }),
        }
    }

    pub fn current_step(&self) -> u32 {
        self.lock().step
    }

    pub fn cycle_count(&self) -> u64 {
        self.lock().cycles
    }

    /// Advance one step. Returns the new step and whether a cycle just
    /// completed (the wrap 12 → 1).
    pub fn advance(&self) -> (u32, bool) {
        let mut state = self.lock();
        if state.step >= CYCLE_LENGTH {
            state.step = 1;
            state.cycles += 1;
            (1, true)
        } else {
            state.step += 1;
            (state.step, false)
        }
    }

    pub fn phase_of(&self, step: u32) -> Phase {
        Phase::for_step(step)
    }

    /// Engines active at a step, from the topology's dispatch table.
    pub fn engine_set_for(&self, step: u32) -> Vec<EngineId> {
        self.topology.engine_set_for(step).to_vec()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.lock();
        ClockSnapshot {
            current_step: state.step,
            cycle_count: state.cycles,
        }
    }

    /// Re-apply persisted clock scalars. An out-of-range step is corrupt
    /// input, not something to clamp silently.
    pub fn restore(&self, snapshot: ClockSnapshot) -> Result<()> {
        if snapshot.current_step < 1 || snapshot.current_step > CYCLE_LENGTH {
            return Err(Error::InvalidArtifact(format!(
                "step {} outside [1, {}]",
                snapshot.current_step, CYCLE_LENGTH
            )));
        }
        let mut state = self.lock();
        state.step = snapshot.current_step;
        state.cycles = snapshot.cycle_count;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> StepClock {
        StepClock::new(Arc::new(Topology::build(3).unwrap()))
    }

    #[test]
    fn starts_at_step_one_cycle_zero() {
        let clock = clock();
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.cycle_count(), 0);
    }

    #[test]
    fn twelve_advances_complete_exactly_one_cycle() {
        let clock = clock();
        let mut completions = 0;
        for _ in 0..CYCLE_LENGTH {
            let (_, completed) = clock.advance();
            if completed {
                completions += 1;
            }
        }
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.cycle_count(), 1);
        assert_eq!(completions, 1);
    }

    #[test]
    fn k_full_cycles_increment_cycle_count_by_k() {
        let clock = clock();
        for _ in 0..(CYCLE_LENGTH * 5) {
            clock.advance();
        }
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.cycle_count(), 5);
    }

    #[test]
    fn advance_is_monotonic_within_a_cycle() {
        let clock = clock();
        for expected in 2..=12 {
            let (step, completed) = clock.advance();
            assert_eq!(step, expected);
            assert!(!completed);
        }
    }

    #[test]
    fn restore_round_trips_and_validates() {
        let clock = clock();
        clock
            .restore(ClockSnapshot {
                current_step: 7,
                cycle_count: 42,
            })
            .unwrap();
        assert_eq!(clock.current_step(), 7);
        assert_eq!(clock.cycle_count(), 42);

        assert!(clock
            .restore(ClockSnapshot {
                current_step: 0,
                cycle_count: 0,
            })
            .is_err());
        assert!(clock
            .restore(ClockSnapshot {
                current_step: 13,
                cycle_count: 0,
            })
            .is_err());
    }

    #[test]
    fn reads_are_consistent_under_concurrent_advance() {
        let clock = Arc::new(clock());
        let advancing = {
            let clock = clock.clone();
            std::thread::spawn(move || {
                for _ in 0..1200 {
                    clock.advance();
                }
            })
        };
        for _ in 0..1000 {
            let step = clock.current_step();
            assert!((1..=12).contains(&step));
        }
        advancing.join().unwrap();
        assert_eq!(clock.cycle_count(), 100);
    }
}
