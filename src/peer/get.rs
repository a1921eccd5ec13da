use std::cmp;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::peer::message::{CChan, Request, Response};
use crate::peer::store::Object;
use crate::peer::Peer;
use crate::util::{self, FHashSet};
use crate::vclock::Causality;

/// Read quorum clamped to `[1, min(N, P)]`.
pub fn read_quorum(cfg: &Config) -> usize {
    cmp::max(1, cmp::min(cfg.r, cmp::min(cfg.n, cfg.num_nodes)))
}

/// Counter value marking a read that missed its deadline. Late acks for
/// a poisoned job are absorbed without responding.
const FAILED: i64 = -1;

/// One coordinated read. The coordinator's own copy counts as the first
/// response; replicas are reconciled in as their acks arrive and the
/// R-th response answers the client.
pub struct GetJob {
    key: String,
    hash: u128,
    resp: CChan,
    counter: i64,
    r: usize,
    current: Option<Object>,
    deadline: Instant,
}

impl Peer {
    pub(super) fn start_get(&mut self, job: usize, key: String, resp: CChan) {
        let hash = util::md5_hash(&key);
        self.store.write().unwrap().vclk.increment(self.id);

        let init = match self.ring.find(hash) {
            Some(t) => t.clone(),
            None => {
                error!("peer {}: get {} with no tokens in the ring", self.id, job);
                return;
            }
        };
        let r = read_quorum(&self.cfg);
        let local = self.store.read().unwrap().data.get(&hash).cloned();
        info!(
            "get {}: coordinator {} token {} hash {} quorum {}",
            job,
            self.id,
            init.id,
            util::hash_to_id(hash),
            r
        );

        if r == 1 {
            resp.send(Response::ReadAck {
                job,
                key,
                value: local.map(|o| o.data().to_owned()),
            })
            .ok();
            return;
        }

        // Fan out to the next N - 1 distinct owners along the ring,
        // ourselves excluded; one full traversal at most.
        let mut visited = FHashSet::default();
        visited.insert(self.id);
        let want = self.cfg.n - 1;
        let mut sent = 0;
        let mut cur = init.clone();
        loop {
            if visited.insert(cur.owner) {
                self.send_to(
                    cur.owner,
                    Request::ReadData {
                        job,
                        src: self.id,
                        hash,
                    },
                );
                sent += 1;
                if sent == want {
                    break;
                }
            }
            let next = self.ring.successor(&cur).clone();
            if next.id == init.id {
                break;
            }
            cur = next;
        }

        self.gets.insert(
            job,
            GetJob {
                key,
                hash,
                resp,
                counter: 1,
                r,
                current: local,
                deadline: Instant::now()
                    + Duration::from_millis(self.cfg.client_get_timeout_ms),
            },
        );
    }

    pub(super) fn read_data_ack(&mut self, job: usize, src: usize, obj: Option<Object>) {
        let mut gj = match self.gets.remove(&job) {
            Some(gj) => gj,
            None => {
                trace!("peer {}: stray read ack for job {}", self.id, job);
                return;
            }
        };
        if gj.counter == FAILED {
            trace!("get {}: ack from {} after deadline", job, src);
            self.gets.insert(job, gj);
            return;
        }

        if let Some(obj) = obj {
            self.reconcile(&mut gj, obj);
        }
        gj.counter += 1;
        trace!("get {}: {} answered, {}/{} responses", job, src, gj.counter, gj.r);

        if gj.counter as usize >= gj.r {
            gj.resp
                .send(Response::ReadAck {
                    job,
                    key: gj.key.clone(),
                    value: gj.current.as_ref().map(|o| o.data().to_owned()),
                })
                .ok();
            return;
        }
        self.gets.insert(job, gj);
    }

    /// Overwrite the working copy when the arriving clock strictly
    /// dominates it; on tie or concurrent clocks the held copy wins. A
    /// strictly newer arrival also repairs the coordinator's stored copy,
    /// but a read never grows the data map.
    fn reconcile(&mut self, gj: &mut GetJob, obj: Object) {
        match gj.current {
            Some(ref held) => {
                if obj.vclk().compare(held.vclk()) != Causality::Dominates {
                    return;
                }
                let mut store = self.store.write().unwrap();
                let stale = store
                    .data
                    .get(&gj.hash)
                    .map_or(false, |stored| {
                        obj.vclk().compare(stored.vclk()) == Causality::Dominates
                    });
                if stale {
                    store.data.insert(gj.hash, obj.clone());
                }
            }
            None => {}
        }
        gj.current = Some(obj);
    }

    /// Poison reads that missed their deadline; sweep poisoned entries
    /// once they can no longer receive meaningful acks.
    pub(super) fn get_tick(&mut self, now: Instant) {
        let grace = Duration::from_millis(self.cfg.client_get_timeout_ms);
        let mut dead = Vec::new();
        for (job, gj) in self.gets.iter_mut() {
            if gj.counter == FAILED {
                if now >= gj.deadline + grace {
                    dead.push(*job);
                }
            } else if now >= gj.deadline && (gj.counter as usize) < gj.r {
                debug!(
                    "get {}: read quorum not met ({}/{})",
                    job, gj.counter, gj.r
                );
                gj.counter = FAILED;
            }
        }
        for job in dead {
            self.gets.remove(&job);
        }
    }
}
