use std::time::Instant;

use crate::peer::message::Request;
use crate::peer::store::Object;
use crate::peer::Peer;
use crate::ring::Token;
use crate::util;

/// An undelivered handoff: the object sits in our backup map while we
/// retry delivery to the original owner. This is the only flow that
/// retries without bound; it stops only at shutdown or on the owner's
/// ack.
pub struct Restore {
    job: usize,
    deadline: Instant,
}

impl Peer {
    /// Accept a write destined for `target.owner`, park it in the backup
    /// map, ack the coordinator, and start trying to deliver it home.
    pub(super) fn accept_handoff(
        &mut self,
        job: usize,
        src: usize,
        hash: u128,
        obj: Object,
        target: Token,
    ) {
        let owner = target.owner;
        info!(
            "peer {}: holding {} for peer {}",
            self.id,
            util::hash_to_id(hash),
            owner
        );
        {
            let mut store = self.store.write().unwrap();
            store
                .backup
                .entry(owner)
                .or_insert_with(Default::default)
                .insert(hash, obj.clone());
        }
        self.send_to(
            src,
            Request::BackDataAck {
                job,
                src: self.id,
                hash,
            },
        );

        self.send_to(
            owner,
            Request::SetData {
                job,
                src: self.id,
                hash,
                obj,
            },
        );
        self.restores.insert(
            (owner, hash),
            Restore {
                job,
                deadline: self.set_data_deadline(Instant::now()),
            },
        );
    }

    /// The original owner finally took the write: purge the backup slot,
    /// dropping the per-owner map only once it is empty.
    pub(super) fn restore_ack(&mut self, job: usize, src: usize, hash: u128) {
        if self.restores.remove(&(src, hash)).is_none() {
            trace!("peer {}: stray set ack for job {} from {}", self.id, job, src);
            return;
        }
        debug!(
            "peer {}: handoff of {} to {} complete",
            self.id,
            util::hash_to_id(hash),
            src
        );
        let mut store = self.store.write().unwrap();
        let empty = match store.backup.get_mut(&src) {
            Some(slot) => {
                slot.remove(&hash);
                slot.is_empty()
            }
            None => false,
        };
        if empty {
            store.backup.remove(&src);
        }
    }

    /// Re-send overdue deliveries. The object is re-read from the backup
    /// map each time, so a newer handoff for the same key supersedes an
    /// older in-flight one.
    pub(super) fn restore_tick(&mut self, now: Instant) {
        let due: Vec<(usize, u128)> = self
            .restores
            .iter()
            .filter(|(_, r)| now >= r.deadline)
            .map(|(k, _)| *k)
            .collect();
        for key in due {
            let (owner, hash) = key;
            let obj = self
                .store
                .read()
                .unwrap()
                .backup
                .get(&owner)
                .and_then(|slot| slot.get(&hash))
                .cloned();
            match obj {
                Some(obj) => {
                    trace!(
                        "peer {}: retrying handoff of {} to {}",
                        self.id,
                        util::hash_to_id(hash),
                        owner
                    );
                    let deadline = self.set_data_deadline(now);
                    let restore = self.restores.get_mut(&key).unwrap();
                    restore.deadline = deadline;
                    let job = restore.job;
                    self.send_to(
                        owner,
                        Request::SetData {
                            job,
                            src: self.id,
                            hash,
                            obj,
                        },
                    );
                }
                None => {
                    self.restores.remove(&key);
                }
            }
        }
    }
}
