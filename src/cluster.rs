use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use crate::config::Config;
use crate::peer::{self, Peer, Request, Store};
use crate::ring::layout::{self, PrefLists};
use crate::ring::Ring;
use crate::util;

/// A running set of peers. Peers are an arena: cross-references are
/// integer ids into the inbox registry, never pointers. The stores are
/// exposed read-only for status printing and tests; each one is written
/// only by its owning peer's loop.
pub struct Cluster {
    pub cfg: Config,
    inboxes: Vec<amy::Sender<Request>>,
    pub stores: Vec<Arc<RwLock<Store>>>,
    ring: Arc<Ring>,
    prefs: Arc<PrefLists>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

pub fn start(cfg: &Config) -> io::Result<Cluster> {
    let tokens = layout::build_tokens(cfg);
    let ring = Arc::new(layout::build_ring(&tokens));
    let prefs = Arc::new(layout::build_pref_lists(&ring, cfg.n));
    let shutdown = Arc::new(AtomicBool::new(false));

    debug!(
        "cluster: {} peers over {} tokens",
        cfg.num_nodes,
        ring.len()
    );

    let mut pollers = Vec::with_capacity(cfg.num_nodes);
    let mut inboxes = Vec::with_capacity(cfg.num_nodes);
    for _ in 0..cfg.num_nodes {
        let poll = amy::Poller::new()?;
        let mut reg = poll.get_registrar();
        let (tx, rx) = reg.channel()?;
        let timer = reg.set_interval(peer::TICK_MS)?;
        pollers.push((poll, rx, timer));
        inboxes.push(tx);
    }
    let registry = Arc::new(inboxes.clone());

    let mut stores = Vec::with_capacity(cfg.num_nodes);
    let mut threads = Vec::with_capacity(cfg.num_nodes);
    for (id, (poll, rx, timer)) in pollers.into_iter().enumerate() {
        let store = Arc::new(RwLock::new(Store::new(cfg.num_nodes)));
        stores.push(store.clone());
        let mut peer = Peer::new(
            id,
            cfg.clone(),
            poll,
            rx,
            timer,
            registry.clone(),
            ring.clone(),
            prefs.clone(),
            store,
            shutdown.clone(),
        );
        let th = thread::Builder::new()
            .name(format!("peer{}", id))
            .spawn(move || peer.run())?;
        threads.push(th);
    }

    Ok(Cluster {
        cfg: cfg.clone(),
        inboxes,
        stores,
        ring,
        prefs,
        shutdown,
        threads,
    })
}

impl Cluster {
    pub fn num_peers(&self) -> usize {
        self.inboxes.len()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn send(&self, peer: usize, msg: Request) -> Result<(), ()> {
        match self.inboxes.get(peer) {
            Some(tx) => tx.send(msg).map_err(|_| ()),
            None => Err(()),
        }
    }

    /// The peer that coordinates requests for `key`: the owner of the
    /// token covering the key's hash.
    pub fn coordinator(&self, key: &str) -> Option<usize> {
        self.ring.find(util::md5_hash(key)).map(|t| t.owner)
    }

    /// Peer ids of the preference list for `key`, coordinator first.
    pub fn preference_peers(&self, key: &str) -> Vec<usize> {
        self.ring
            .find(util::md5_hash(key))
            .and_then(|t| self.prefs.get(&t.id))
            .map(|list| list.iter().map(|t| t.owner).collect())
            .unwrap_or_default()
    }

    /// Token ids owned by `peer`, in ring order.
    pub fn token_ids(&self, peer: usize) -> Vec<usize> {
        self.ring
            .iter()
            .filter(|t| t.owner == peer)
            .map(|t| t.id)
            .collect()
    }

    /// Signal every peer loop and wait for them to wind down.
    pub fn shutdown(mut self) {
        info!("cluster: shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        for th in self.threads.drain(..) {
            th.join().ok();
        }
    }
}
