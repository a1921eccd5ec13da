pub mod message;
pub mod store;

mod get;
mod handoff;
mod put;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::ring::layout::PrefLists;
use crate::ring::Ring;
use crate::util::{FHashMap, UHashMap};

pub use self::message::{CChan, Request, Response};
pub use self::store::{Object, Store};

/// Interval of the peer's housekeeping timer: kill expiry, replication
/// attempt deadlines, handoff retries.
pub const TICK_MS: usize = 10;
const POLL_INT_MS: usize = 500;

enum State {
    Alive,
    Busy { until: Instant },
}

/// One physical peer. A peer runs a single-threaded loop over its inbox
/// and timer; every mutation of its store happens inside that loop.
/// Coordinator flows for client requests are state machines owned by the
/// loop, keyed by job id and advanced by acks and ticks, so a flow never
/// blocks message processing.
pub struct Peer {
    id: usize,
    cfg: Config,
    poll: amy::Poller,
    rx: amy::Receiver<Request>,
    timer: usize,
    outboxes: Arc<Vec<amy::Sender<Request>>>,
    ring: Arc<Ring>,
    prefs: Arc<PrefLists>,
    store: Arc<RwLock<Store>>,
    state: State,
    puts: UHashMap<put::PutJob>,
    gets: UHashMap<get::GetJob>,
    restores: FHashMap<(usize, u128), handoff::Restore>,
    shutdown: Arc<AtomicBool>,
}

impl Peer {
    pub fn new(
        id: usize,
        cfg: Config,
        poll: amy::Poller,
        rx: amy::Receiver<Request>,
        timer: usize,
        outboxes: Arc<Vec<amy::Sender<Request>>>,
        ring: Arc<Ring>,
        prefs: Arc<PrefLists>,
        store: Arc<RwLock<Store>>,
        shutdown: Arc<AtomicBool>,
    ) -> Peer {
        Peer {
            id,
            cfg,
            poll,
            rx,
            timer,
            outboxes,
            ring,
            prefs,
            store,
            state: State::Alive,
            puts: UHashMap::default(),
            gets: UHashMap::default(),
            restores: FHashMap::default(),
            shutdown,
        }
    }

    pub fn run(&mut self) {
        debug!("peer {}: started", self.id);
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.poll.wait(POLL_INT_MS) {
                Ok(events) => {
                    for event in events {
                        if event.id == self.rx.get_id() {
                            self.handle_msgs();
                        } else if event.id == self.timer {
                            self.tick();
                        }
                    }
                }
                Err(e) => {
                    error!("peer {}: failed to poll for events: {}", self.id, e);
                }
            }
        }
        debug!("peer {}: completed", self.id);
    }

    fn handle_msgs(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            if let State::Busy { .. } = self.state {
                // Killed peers drop everything on the floor except a
                // revive. Senders recover via timeouts and handoff.
                match msg {
                    Request::ClientRevive { job, resp } => self.revive(job, resp, true),
                    other => trace!("peer {}: busy, dropping {:?}", self.id, other),
                }
                continue;
            }
            self.dispatch(msg);
        }
    }

    fn dispatch(&mut self, msg: Request) {
        trace!("peer {}: handling {:?}", self.id, msg);
        match msg {
            Request::ClientRead { job, key, resp } => self.start_get(job, key, resp),
            Request::ClientWrite {
                job,
                key,
                value,
                resp,
            } => self.start_put(job, key, value, resp),
            Request::ClientKill { duration_ms, .. } => {
                info!("peer {}: killed for {} ms", self.id, duration_ms);
                self.state = State::Busy {
                    until: Instant::now() + Duration::from_millis(duration_ms),
                };
                self.store.write().unwrap().alive = false;
            }
            Request::ClientRevive { job, resp } => self.revive(job, resp, false),
            Request::SetData {
                job,
                src,
                hash,
                obj,
            } => {
                self.store.write().unwrap().data.insert(hash, obj);
                self.send_to(
                    src,
                    Request::SetDataAck {
                        job,
                        src: self.id,
                        hash,
                    },
                );
            }
            Request::SetDataAck { job, src, hash } => {
                // A set ack wakes either a pending replication attempt of
                // a local put flow or a handoff restore loop.
                if !self.put_ack(job, src) {
                    self.restore_ack(job, src, hash);
                }
            }
            Request::BackData {
                job,
                src,
                hash,
                obj,
                target,
            } => self.accept_handoff(job, src, hash, obj, target),
            Request::BackDataAck { job, src, .. } => {
                if !self.put_ack(job, src) {
                    trace!("peer {}: stray handoff ack for job {}", self.id, job);
                }
            }
            Request::ReadData { job, src, hash } => {
                let obj = self.store.read().unwrap().data.get(&hash).cloned();
                self.send_to(
                    src,
                    Request::ReadDataAck {
                        job,
                        src: self.id,
                        hash,
                        obj,
                    },
                );
            }
            Request::ReadDataAck { job, src, obj, .. } => self.read_data_ack(job, src, obj),
        }
    }

    fn revive(&mut self, job: usize, resp: Option<CChan>, was_busy: bool) {
        if was_busy {
            info!("peer {}: reviving", self.id);
            self.state = State::Alive;
            self.store.write().unwrap().alive = true;
        }
        if let Some(ch) = resp {
            let ack = if was_busy {
                Response::Revived { job, peer: self.id }
            } else {
                Response::Alive { job, peer: self.id }
            };
            ch.send(ack).ok();
        }
    }

    /// Housekeeping. Kill expiry mutates peer state and only runs while
    /// busy-waiting; the coordinator flows keep running regardless of the
    /// kill state, since their state is job-local and their effects are
    /// outbound sends. Inbound acks are what a killed peer loses.
    fn tick(&mut self) {
        let now = Instant::now();
        if let State::Busy { until } = self.state {
            if now >= until {
                info!("peer {}: reviving", self.id);
                self.state = State::Alive;
                self.store.write().unwrap().alive = true;
            }
        }
        self.put_tick(now);
        self.get_tick(now);
        self.restore_tick(now);
    }

    fn send_to(&self, dst: usize, msg: Request) -> bool {
        if self.outboxes[dst].send(msg).is_err() {
            debug!("peer {}: inbox of peer {} is gone", self.id, dst);
            return false;
        }
        true
    }

    fn set_data_deadline(&self, now: Instant) -> Instant {
        now + Duration::from_millis(self.cfg.set_data_timeout_ms)
    }
}
