use crate::util::{FHashMap, UHashMap};
use crate::vclock::VectorClock;

/// A stored value together with the clock snapshot taken by the
/// coordinator that wrote it. Exactly one copy per write carries
/// `replica == false`: the authoritative copy destined for the first
/// preference-list owner.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    data: String,
    vclk: VectorClock,
    replica: bool,
}

impl Object {
    pub fn new(data: String, vclk: VectorClock, replica: bool) -> Object {
        Object { data, vclk, replica }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn vclk(&self) -> &VectorClock {
        &self.vclk
    }

    pub fn is_replica(&self) -> bool {
        self.replica
    }
}

/// The mutable state of one peer. Only the peer's own message loop writes
/// it; status printing and tests take read locks through the cluster's
/// handle.
pub struct Store {
    /// Key-value data, keyed by the MD5 integer of the key.
    pub data: FHashMap<u128, Object>,
    /// Hinted-handoff objects held for unreachable peers, keyed by the
    /// peer the data is destined for. A peer never holds its own data
    /// here.
    pub backup: UHashMap<FHashMap<u128, Object>>,
    pub vclk: VectorClock,
    pub alive: bool,
}

impl Store {
    pub fn new(peers: usize) -> Store {
        Store {
            data: FHashMap::default(),
            backup: UHashMap::default(),
            vclk: VectorClock::new(peers),
            alive: true,
        }
    }
}
