use std::fmt;

/// Outcome of comparing two vector clocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Causality {
    /// Every entry >= the other's, at least one strictly greater.
    Dominates,
    /// The other clock strictly dominates this one.
    Dominated,
    /// Neither dominates; equal clocks are also reported here.
    Concurrent,
}

/// Per-peer counter vector. One slot per physical peer, indexed by peer
/// id. Peers only ever increment their own slot; versions are merged by
/// whole-clock overwrite on strict dominance, never entrywise.
#[derive(Clone, PartialEq, Eq)]
pub struct VectorClock {
    counts: Vec<u64>,
}

impl VectorClock {
    pub fn new(peers: usize) -> VectorClock {
        VectorClock {
            counts: vec![0; peers],
        }
    }

    pub fn increment(&mut self, peer: usize) {
        self.counts[peer] += 1;
    }

    pub fn get(&self, peer: usize) -> u64 {
        self.counts[peer]
    }

    pub fn compare(&self, other: &VectorClock) -> Causality {
        assert_eq!(
            self.counts.len(),
            other.counts.len(),
            "clocks from different clusters"
        );
        let mut greater = false;
        let mut less = false;
        for (a, b) in self.counts.iter().zip(&other.counts) {
            if a > b {
                greater = true;
            } else if a < b {
                less = true;
            }
        }
        match (greater, less) {
            (true, false) => Causality::Dominates,
            (false, true) => Causality::Dominated,
            _ => Causality::Concurrent,
        }
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.counts)
    }
}
