use std::cell::Cell;
use std::time::Instant;

/// Monotonic 32-bit cycle counter sampled around the measured region.
/// Callers take differences with wrapping subtraction.
pub trait CycleCounter {
    fn now(&self) -> u32;
}

impl<T: CycleCounter + ?Sized> CycleCounter for Box<T> {
    fn now(&self) -> u32 { (**self).now() }
}

/// Wall-clock time converted to cycles of a nominal core frequency.
pub struct InstantCounter {
    origin: Instant,
    hz: u64,
}

impl InstantCounter {
    /// Core clock of the reference target.
    pub const DEFAULT_HZ: u64 = 240_000_000;

    pub fn new(hz: u64) -> Self { Self { origin: Instant::now(), hz: hz.max(1) } }
}

impl Default for InstantCounter {
    fn default() -> Self { Self::new(Self::DEFAULT_HZ) }
}

impl CycleCounter for InstantCounter {
    fn now(&self) -> u32 {
        let nanos = self.origin.elapsed().as_nanos();
        // Truncation to 32 bits is the counter wrapping.
        (nanos * self.hz as u128 / 1_000_000_000) as u32
    }
}

/// Low 32 bits of the x86_64 time-stamp counter.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TscCounter;

#[cfg(target_arch = "x86_64")]
impl CycleCounter for TscCounter {
    fn now(&self) -> u32 {
        // SAFETY: rdtsc has no preconditions on x86_64.
        unsafe { core::arch::x86_64::_rdtsc() as u32 }
    }
}

/// Deterministic counter: returns its value and advances by `step` on every sample.
#[derive(Debug)]
pub struct ManualCounter {
    value: Cell<u32>,
    step: u32,
}

impl ManualCounter {
    pub fn new(start: u32, step: u32) -> Self { Self { value: Cell::new(start), step } }
}

impl CycleCounter for ManualCounter {
    fn now(&self) -> u32 {
        let v = self.value.get();
        self.value.set(v.wrapping_add(self.step));
        v
    }
}
