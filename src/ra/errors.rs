use std::fmt;

/// Fatal invariant violations that require an immediate halt.
///
/// The simulated bus never drops, duplicates, or corrupts messages and no
/// process crashes, so none of these are runtime conditions to recover
/// from. Each one indicates an algorithmic or implementation defect; the
/// driver escalates them to a panic rather than suppressing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two processes inside the critical section at the same instant.
    DoubleOccupancy { holder: u32, entrant: u32 },

    /// A REPLY arrived at a process with no outstanding request.
    StrayReply { pid: u32, from: u32 },

    /// A process's clock failed to strictly increase.
    ClockRegression { pid: u32, previous: u64, current: u64 },

    /// The critical section was exited by a process that did not hold it.
    ExitWithoutEntry { pid: u32 },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::DoubleOccupancy { holder, entrant } => {
                write!(
                    f,
                    "FATAL: Mutual exclusion violated. P{} entered the CS while P{} holds it",
                    entrant, holder
                )
            }
            InvariantViolation::StrayReply { pid, from } => {
                write!(
                    f,
                    "FATAL: P{} received a REPLY from P{} with no outstanding request",
                    pid, from
                )
            }
            InvariantViolation::ClockRegression { pid, previous, current } => {
                write!(
                    f,
                    "FATAL: P{} clock regressed from {} to {}",
                    pid, previous, current
                )
            }
            InvariantViolation::ExitWithoutEntry { pid } => {
                write!(f, "FATAL: P{} exited the CS without holding it", pid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_fatal_prefixed() {
        let v = InvariantViolation::DoubleOccupancy { holder: 1, entrant: 3 };
        assert!(v.to_string().starts_with("FATAL:"));
        assert!(v.to_string().contains("P3"));

        let v = InvariantViolation::StrayReply { pid: 0, from: 2 };
        assert!(v.to_string().contains("no outstanding request"));
    }
}
