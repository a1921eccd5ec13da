use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::cluster::Cluster;
use crate::peer::{Request, Response};
use crate::util::UHashMap;

const POLL_INT_MS: usize = 500;
const WAIT_SPIN_MS: u64 = 1;

/// Job ids are process-wide: monotonic per client and never reused
/// across clients, so coordinators can key their flows by job id alone.
static JOB_CNT: AtomicUsize = AtomicUsize::new(0);

fn next_job() -> usize {
    JOB_CNT.fetch_add(1, Ordering::SeqCst)
}

/// One outstanding request. The `awaiting` flag is claimed exactly once,
/// by compare-and-swap: the listener claims it to deliver, the timeout
/// helper claims it to expire. The loser of the race discards, so a late
/// reply can never leak into a later job.
struct Pending {
    cmd: &'static str,
    awaiting: AtomicBool,
    result: Mutex<Option<Response>>,
}

impl Pending {
    fn new(cmd: &'static str) -> Pending {
        Pending {
            cmd,
            awaiting: AtomicBool::new(true),
            result: Mutex::new(None),
        }
    }

    fn claim(&self) -> bool {
        self.awaiting
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A client of the store: issues requests to coordinator peers and runs
/// a listener thread as the single consumer of its return channel.
pub struct Client {
    pub id: usize,
    tx: amy::Sender<Response>,
    pending: Arc<Mutex<UHashMap<Arc<Pending>>>>,
    thread: Option<thread::JoinHandle<()>>,
}

struct Listener {
    id: usize,
    poll: amy::Poller,
    rx: amy::Receiver<Response>,
    pending: Arc<Mutex<UHashMap<Arc<Pending>>>>,
    shutdown: Arc<AtomicBool>,
}

impl Client {
    pub fn start(id: usize, shutdown: Arc<AtomicBool>) -> io::Result<Client> {
        let poll = amy::Poller::new()?;
        let mut reg = poll.get_registrar();
        let (tx, rx) = reg.channel()?;
        let pending: Arc<Mutex<UHashMap<Arc<Pending>>>> = Default::default();

        let lp = pending.clone();
        let thread = thread::Builder::new()
            .name(format!("client{}", id))
            .spawn(move || {
                Listener {
                    id,
                    poll,
                    rx,
                    pending: lp,
                    shutdown,
                }
                .run()
            })?;

        Ok(Client {
            id,
            tx,
            pending,
            thread: Some(thread),
        })
    }

    /// Issue a write through the key's coordinator. Returns the job id,
    /// or None when the ring is empty.
    pub fn put(&self, cluster: &Cluster, key: &str, value: &str) -> Option<usize> {
        cluster
            .coordinator(key)
            .map(|peer| self.put_at(cluster, peer, key, value))
    }

    /// Issue a write through an explicit peer, e.g. when the usual
    /// coordinator is known to be down.
    pub fn put_at(&self, cluster: &Cluster, peer: usize, key: &str, value: &str) -> usize {
        let job = self.track("put");
        debug!("client {}: put job {} -> peer {}", self.id, job, peer);
        cluster
            .send(
                peer,
                Request::ClientWrite {
                    job,
                    key: key.to_owned(),
                    value: value.to_owned(),
                    resp: self.tx.clone(),
                },
            )
            .ok();
        job
    }

    pub fn get(&self, cluster: &Cluster, key: &str) -> Option<usize> {
        cluster
            .coordinator(key)
            .map(|peer| self.get_at(cluster, peer, key))
    }

    pub fn get_at(&self, cluster: &Cluster, peer: usize, key: &str) -> usize {
        let job = self.track("get");
        debug!("client {}: get job {} -> peer {}", self.id, job, peer);
        cluster
            .send(
                peer,
                Request::ClientRead {
                    job,
                    key: key.to_owned(),
                    resp: self.tx.clone(),
                },
            )
            .ok();
        job
    }

    pub fn kill(&self, cluster: &Cluster, peer: usize, duration_ms: u64) {
        cluster
            .send(
                peer,
                Request::ClientKill {
                    job: next_job(),
                    duration_ms,
                },
            )
            .ok();
    }

    pub fn revive(&self, cluster: &Cluster, peer: usize) {
        cluster
            .send(
                peer,
                Request::ClientRevive {
                    job: next_job(),
                    resp: Some(self.tx.clone()),
                },
            )
            .ok();
    }

    /// Block until the job resolves or `timeout_ms` elapses. A timed-out
    /// job is reported and its eventual reply, if any, is discarded by
    /// the listener.
    pub fn wait(&self, job: usize, timeout_ms: u64) -> Option<Response> {
        let pending = self.pending.lock().unwrap().get(&job).cloned()?;
        let start = Instant::now();
        loop {
            if !pending.awaiting.load(Ordering::SeqCst) {
                break;
            }
            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                if pending.claim() {
                    println!("TIMEOUT REACHED: job={} {}", job, pending.cmd);
                    self.pending.lock().unwrap().remove(&job);
                    return None;
                }
                // The listener won at the wire.
                break;
            }
            thread::sleep(Duration::from_millis(WAIT_SPIN_MS));
        }
        self.pending.lock().unwrap().remove(&job);
        let result = pending.result.lock().unwrap().take();
        result
    }

    /// Join the listener. Call after the shared shutdown flag is set.
    pub fn join(mut self) {
        if let Some(th) = self.thread.take() {
            th.join().ok();
        }
    }

    fn track(&self, cmd: &'static str) -> usize {
        let job = next_job();
        self.pending
            .lock()
            .unwrap()
            .insert(job, Arc::new(Pending::new(cmd)));
        job
    }
}

impl Listener {
    fn run(&mut self) {
        debug!("client {}: listener started", self.id);
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.poll.wait(POLL_INT_MS) {
                Ok(events) => {
                    for _ in events {
                        while let Ok(resp) = self.rx.try_recv() {
                            self.deliver(resp);
                        }
                    }
                }
                Err(e) => {
                    error!("client {}: failed to poll for events: {}", self.id, e);
                }
            }
        }
        debug!("client {}: listener completed", self.id);
    }

    fn deliver(&self, resp: Response) {
        match resp {
            Response::Revived { peer, .. } => {
                println!("REVIVED: peer={}", peer);
            }
            Response::Alive { peer, .. } => {
                println!("ALIVE: peer={}", peer);
            }
            ack => {
                let job = ack.job();
                let pending = self.pending.lock().unwrap().get(&job).cloned();
                match pending {
                    Some(pending) => {
                        *pending.result.lock().unwrap() = Some(ack.clone());
                        if pending.claim() {
                            match ack {
                                Response::ReadAck { key, value, .. } => println!(
                                    "COMPLETED job={} get: ({}, {})",
                                    job,
                                    key,
                                    value.as_ref().map(|v| v.as_str()).unwrap_or("nil")
                                ),
                                Response::WriteAck { key, value, .. } => {
                                    println!("COMPLETED job={} put: ({}, {})", job, key, value)
                                }
                                _ => unreachable!(),
                            }
                        } else {
                            debug!("client {}: late reply for job {} discarded", self.id, job);
                        }
                    }
                    None => {
                        debug!("client {}: reply for unknown job {}", self.id, job);
                    }
                }
            }
        }
    }
}
