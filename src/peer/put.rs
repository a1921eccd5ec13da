use std::cmp;
use std::mem;
use std::time::Instant;

use crate::config::Config;
use crate::peer::message::{CChan, Request, Response};
use crate::peer::store::Object;
use crate::peer::Peer;
use crate::ring::Token;
use crate::util::{self, FHashSet, UHashMap};

/// Effective replication factor: N capped by physical peers and tokens.
pub fn replication_count(cfg: &Config) -> usize {
    cmp::min(cfg.n, cmp::min(cfg.num_nodes, cfg.num_tokens))
}

/// Write quorum clamped to `[1, min(N, P)]`.
pub fn write_quorum(cfg: &Config) -> usize {
    cmp::max(1, cmp::min(cfg.w, cmp::min(cfg.n, cfg.num_nodes)))
}

/// A replication attempt in flight to one destination peer.
struct Attempt {
    deadline: Instant,
    /// The token whose owner this write was originally destined for.
    /// Carried through handoff so the receiver knows which backup slot
    /// to fill.
    origin: Token,
    obj: Object,
}

/// A timed-out attempt waiting for the next handoff batch.
struct Failed {
    origin: Token,
    obj: Object,
}

/// One coordinated write. Replication attempts within a batch run
/// concurrently; each batch fully resolves (ack or timeout per
/// destination) before its failures are demoted to handoffs on the next
/// distinct owners along the ring, which keeps the traversal order
/// deterministic.
pub struct PutJob {
    key: String,
    value: String,
    hash: u128,
    resp: CChan,
    visited: FHashSet<usize>,
    pending: UHashMap<Attempt>,
    queue: Vec<Failed>,
    /// Last ring position inspected; handoff traversal resumes here.
    cursor: Token,
    init_id: usize,
    succeeded: usize,
    rep_count: usize,
    w: usize,
    acked: bool,
    exhausted: bool,
}

impl PutJob {
    fn done(&self) -> bool {
        self.pending.is_empty() && self.queue.is_empty()
    }
}

impl Peer {
    pub(super) fn start_put(&mut self, job: usize, key: String, value: String, resp: CChan) {
        let hash = util::md5_hash(&key);
        let snapshot = {
            let mut store = self.store.write().unwrap();
            store.vclk.increment(self.id);
            store.vclk.clone()
        };

        let init = match self.ring.find(hash) {
            Some(t) => t.clone(),
            None => {
                error!("peer {}: put {} with no tokens in the ring", self.id, job);
                return;
            }
        };
        let pref = match self.prefs.get(&init.id) {
            Some(p) => p.clone(),
            None => {
                error!("peer {}: token {} has no preference list", self.id, init.id);
                return;
            }
        };

        let rep_count = cmp::min(replication_count(&self.cfg), pref.len());
        info!(
            "put {}: coordinator {} token {} hash {} replicating {}x",
            job,
            self.id,
            init.id,
            util::hash_to_id(hash),
            rep_count
        );

        let mut pj = PutJob {
            key,
            value: value.clone(),
            hash,
            resp,
            visited: FHashSet::default(),
            pending: UHashMap::default(),
            queue: Vec::new(),
            cursor: pref.last().cloned().unwrap_or_else(|| init.clone()),
            init_id: init.id,
            succeeded: 0,
            rep_count,
            w: write_quorum(&self.cfg),
            acked: false,
            exhausted: false,
        };

        let deadline = self.set_data_deadline(Instant::now());
        for (i, token) in pref.iter().enumerate() {
            // Preference-list element 0 carries the authoritative copy.
            let obj = Object::new(value.clone(), snapshot.clone(), i != 0);
            if !pj.visited.insert(token.owner) {
                // Already written this batch; an instant success.
                pj.succeeded += 1;
                continue;
            }
            if self.send_to(
                token.owner,
                Request::SetData {
                    job,
                    src: self.id,
                    hash,
                    obj: obj.clone(),
                },
            ) {
                pj.pending.insert(
                    token.owner,
                    Attempt {
                        deadline,
                        origin: token.clone(),
                        obj,
                    },
                );
            } else {
                pj.queue.push(Failed {
                    origin: token.clone(),
                    obj,
                });
            }
        }

        self.advance_put(job, &mut pj);
        if !pj.done() {
            self.puts.insert(job, pj);
        }
    }

    /// Route an ack to the put flow that issued the attempt. Returns
    /// false if no such attempt is pending, so the caller can try the
    /// handoff restore loops instead.
    pub(super) fn put_ack(&mut self, job: usize, src: usize) -> bool {
        let mut pj = match self.puts.remove(&job) {
            Some(pj) => pj,
            None => return false,
        };
        if pj.pending.remove(&src).is_none() {
            self.puts.insert(job, pj);
            return false;
        }
        pj.succeeded += 1;
        trace!(
            "put {}: {} acked, {}/{} succeeded",
            job,
            src,
            pj.succeeded,
            pj.rep_count
        );
        self.advance_put(job, &mut pj);
        if !pj.done() {
            self.puts.insert(job, pj);
        }
        true
    }

    /// Expire overdue attempts into the handoff queue.
    pub(super) fn put_tick(&mut self, now: Instant) {
        let jobs: Vec<usize> = self.puts.keys().cloned().collect();
        for job in jobs {
            let mut pj = match self.puts.remove(&job) {
                Some(pj) => pj,
                None => continue,
            };
            let expired: Vec<usize> = pj
                .pending
                .iter()
                .filter(|(_, a)| now >= a.deadline)
                .map(|(dst, _)| *dst)
                .collect();
            for dst in expired {
                let attempt = pj.pending.remove(&dst).unwrap();
                debug!("put {}: {} -> {} timed out", job, self.id, dst);
                pj.queue.push(Failed {
                    origin: attempt.origin,
                    obj: attempt.obj,
                });
            }
            self.advance_put(job, &mut pj);
            if !pj.done() {
                self.puts.insert(job, pj);
            }
        }
    }

    /// Once the current batch has fully resolved: check the sloppy
    /// quorum, then demote this batch's failures to handoffs on the next
    /// distinct owners.
    fn advance_put(&mut self, job: usize, pj: &mut PutJob) {
        if !pj.pending.is_empty() {
            return;
        }

        if pj.succeeded >= pj.w && !pj.acked {
            pj.acked = true;
            debug!("put {}: write quorum of {} met", job, pj.w);
            pj.resp
                .send(Response::WriteAck {
                    job,
                    key: pj.key.clone(),
                    value: pj.value.clone(),
                })
                .ok();
        }

        if pj.queue.is_empty() || pj.exhausted {
            pj.queue.clear();
            return;
        }

        let deadline = self.set_data_deadline(Instant::now());
        let batch = mem::replace(&mut pj.queue, Vec::new());
        for failed in batch {
            let dest = loop {
                let next = self.ring.successor(&pj.cursor).clone();
                pj.cursor = next.clone();
                if next.id == pj.init_id {
                    error!(
                        "put {}: ring exhausted, only replicated {}/{} times",
                        job, pj.succeeded, pj.rep_count
                    );
                    pj.exhausted = true;
                    break None;
                }
                if !pj.visited.contains(&next.owner) {
                    break Some(next);
                }
            };
            let token = match dest {
                Some(t) => t,
                None => {
                    pj.queue.clear();
                    return;
                }
            };
            pj.visited.insert(token.owner);
            debug!(
                "put {}: handing {} off to {} for peer {}",
                job, self.id, token.owner, failed.origin.owner
            );
            if self.send_to(
                token.owner,
                Request::BackData {
                    job,
                    src: self.id,
                    hash: pj.hash,
                    obj: failed.obj.clone(),
                    target: failed.origin.clone(),
                },
            ) {
                pj.pending.insert(
                    token.owner,
                    Attempt {
                        deadline,
                        origin: failed.origin,
                        obj: failed.obj,
                    },
                );
            } else {
                pj.queue.push(failed);
            }
        }
    }
}
