//! End-to-end scenarios driving full clusters through the client API.

use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;

use crate::client::Client;
use crate::cluster::{self, Cluster};
use crate::config::Config;
use crate::peer::Response;
use crate::util::md5_hash;

const WAIT_MS: u64 = 5000;

fn test_cfg(p: usize, t: usize, n: usize, r: usize, w: usize) -> Config {
    Config {
        num_nodes: p,
        num_tokens: t,
        n,
        r,
        w,
        client_get_timeout_ms: WAIT_MS,
        client_put_timeout_ms: WAIT_MS,
        set_data_timeout_ms: 200,
        debug_level: 2,
    }
}

fn boot(cfg: &Config) -> (Cluster, Client) {
    let cluster = cluster::start(cfg).expect("cluster failed to start");
    let client = Client::start(0, cluster.shutdown_flag()).expect("client failed to start");
    (cluster, client)
}

fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Copies of `value` under `hash` across the whole cluster:
/// (authoritative, replicas, backups).
fn count_copies(cluster: &Cluster, hash: u128, value: &str) -> (usize, usize, usize) {
    let mut auth = 0;
    let mut reps = 0;
    let mut backs = 0;
    for store in &cluster.stores {
        let store = store.read().unwrap();
        if let Some(obj) = store.data.get(&hash) {
            if obj.data() == value {
                if obj.is_replica() {
                    reps += 1;
                } else {
                    auth += 1;
                }
            }
        }
        for slot in store.backup.values() {
            if let Some(obj) = slot.get(&hash) {
                if obj.data() == value {
                    backs += 1;
                }
            }
        }
    }
    (auth, reps, backs)
}

fn backup_held_for(cluster: &Cluster, owner: usize, hash: u128) -> bool {
    cluster.stores.iter().any(|store| {
        store
            .read()
            .unwrap()
            .backup
            .get(&owner)
            .map_or(false, |slot| slot.contains_key(&hash))
    })
}

#[test]
fn test_single_replica_put_get() {
    let cfg = test_cfg(5, 5, 1, 1, 1);
    let (cluster, client) = boot(&cfg);

    let put = client.put(&cluster, "k", "val").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    // A resolved job is gone; waiting again cannot yield a second ack.
    assert_matches!(client.wait(put, 50), None);

    let get = client.get(&cluster, "k").unwrap();
    match client.wait(get, WAIT_MS) {
        Some(Response::ReadAck { value, .. }) => assert_eq!(value.as_deref(), Some("val")),
        other => panic!("expected a read ack, got {:?}", other),
    }

    // The coordinator bumped its own clock slot once per request.
    let coord = cluster.coordinator("k").unwrap();
    let clock = cluster.stores[coord].read().unwrap().vclk.clone();
    assert!(clock.get(coord) >= 2);

    cluster.shutdown();
    client.join();
}

#[test]
fn test_ten_clients_read_their_own_writes() {
    let cfg = test_cfg(10, 10, 3, 2, 2);
    let cluster = cluster::start(&cfg).unwrap();
    let clients: Vec<Client> = (0..10)
        .map(|i| Client::start(i, cluster.shutdown_flag()).unwrap())
        .collect();

    let jobs: Vec<usize> = clients
        .iter()
        .enumerate()
        .map(|(i, c)| {
            c.put(&cluster, &format!("key{}", i), &format!("value{}", i))
                .unwrap()
        })
        .collect();
    for (i, job) in jobs.into_iter().enumerate() {
        assert_matches!(
            clients[i].wait(job, WAIT_MS),
            Some(Response::WriteAck { .. })
        );
    }

    for (i, client) in clients.iter().enumerate() {
        let job = client.get(&cluster, &format!("key{}", i)).unwrap();
        match client.wait(job, WAIT_MS) {
            Some(Response::ReadAck { value, .. }) => {
                assert_eq!(value.as_deref(), Some(format!("value{}", i).as_str()))
            }
            other => panic!("client {} expected a read ack, got {:?}", i, other),
        }
    }

    cluster.shutdown();
    for client in clients {
        client.join();
    }
}

#[test]
fn test_replication_count_no_failures() {
    let cfg = test_cfg(10, 10, 3, 2, 2);
    let (cluster, client) = boot(&cfg);

    let job = client.put(&cluster, "replicated", "copies").unwrap();
    assert_matches!(client.wait(job, WAIT_MS), Some(Response::WriteAck { .. }));

    let (auth, reps, backs) = count_copies(&cluster, md5_hash("replicated"), "copies");
    assert_eq!(auth, 1);
    assert_eq!(reps, 2);
    assert_eq!(backs, 0);

    cluster.shutdown();
    client.join();
}

#[test]
fn test_handoff_with_replica_peer_down() {
    let cfg = test_cfg(5, 5, 3, 2, 3);
    let (cluster, client) = boot(&cfg);

    let put = client.put(&cluster, "hello", "world").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));

    let pref = cluster.preference_peers("hello");
    assert_eq!(pref.len(), 3);
    let victim = pref[1];
    client.kill(&cluster, victim, 60_000);
    sleep_ms(250);

    let put = client.put(&cluster, "hello", "sudipta").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    sleep_ms(250);

    let hash = md5_hash("hello");
    let (auth, reps, backs) = count_copies(&cluster, hash, "sudipta");
    assert_eq!(auth, 1);
    assert_eq!(reps + backs, 2);
    assert!(backup_held_for(&cluster, victim, hash));

    cluster.shutdown();
    client.join();
}

#[test]
fn test_handoff_with_coordinator_down() {
    let cfg = test_cfg(5, 5, 3, 2, 3);
    let (cluster, client) = boot(&cfg);

    let put = client.put(&cluster, "hello", "world").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));

    let pref = cluster.preference_peers("hello");
    let coord = pref[0];
    assert_eq!(Some(coord), cluster.coordinator("hello"));
    client.kill(&cluster, coord, 60_000);
    sleep_ms(250);

    // Drive the update through the next preference-list peer.
    let put = client.put_at(&cluster, pref[1], "hello", "sudipta");
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    sleep_ms(250);

    let hash = md5_hash("hello");
    let (auth, reps, backs) = count_copies(&cluster, hash, "sudipta");
    assert_eq!(auth + reps + backs, 3);
    // The authoritative copy was destined for the dead coordinator and
    // now sits in a backup slot keyed by its id.
    assert!(backup_held_for(&cluster, coord, hash));
    assert_eq!(auth, 0);

    cluster.shutdown();
    client.join();
}

#[test]
fn test_handoff_restored_after_revival() {
    let cfg = test_cfg(5, 5, 3, 2, 3);
    let (cluster, client) = boot(&cfg);

    let pref = cluster.preference_peers("hello");
    let victim = pref[1];
    client.kill(&cluster, victim, 600_000);
    sleep_ms(250);

    let put = client.put(&cluster, "hello", "world").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    sleep_ms(250);

    let hash = md5_hash("hello");
    assert!(backup_held_for(&cluster, victim, hash));

    client.revive(&cluster, victim);
    // The restore loop retries every replication timeout; give it a few
    // rounds to land and purge.
    sleep_ms(1000);

    assert!(!backup_held_for(&cluster, victim, hash));
    let store = cluster.stores[victim].read().unwrap();
    let obj = store.data.get(&hash).expect("revived peer missing the write");
    assert_eq!(obj.data(), "world");

    drop(store);
    cluster.shutdown();
    client.join();
}

#[test]
fn test_handoff_table() {
    // Cluster shapes from small to uneven. One non-coordinator peer dies
    // between the first write and the update; the total number of copies
    // of the update, wherever they sit, must still equal min(N, P, T).
    let shapes = [
        (5usize, 5usize, 1usize, 1usize),
        (3, 4, 3, 2),
        (5, 7, 4, 3),
        (10, 10, 3, 2),
    ];
    for &(p, t, n, w) in &shapes {
        let cfg = test_cfg(p, t, n, 1, w);
        let (cluster, client) = boot(&cfg);
        // With a dead peer and no spare owner to hand off to, one replica
        // is simply unreachable.
        let mut expected = n.min(p).min(t);
        if p.min(t) == expected {
            expected -= 1;
        }

        let put = client.put(&cluster, "hello", "world").unwrap();
        assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));

        let coord = cluster.coordinator("hello").unwrap();
        let victim = (coord + 1) % p;
        client.kill(&cluster, victim, 600_000);
        sleep_ms(250);

        let put = client.put(&cluster, "hello", "sudipta").unwrap();
        assert_matches!(
            client.wait(put, WAIT_MS),
            Some(Response::WriteAck { .. }),
            "no write ack for shape {}/{}/{}/{}",
            p,
            t,
            n,
            w
        );
        sleep_ms(250);

        let (auth, reps, backs) = count_copies(&cluster, md5_hash("hello"), "sudipta");
        assert_eq!(auth, 1, "shape {}/{}/{}/{}", p, t, n, w);
        assert_eq!(
            auth + reps + backs,
            expected,
            "shape {}/{}/{}/{}",
            p,
            t,
            n,
            w
        );

        cluster.shutdown();
        client.join();
    }
}

#[test]
fn test_put_times_out_when_coordinator_killed() {
    let mut cfg = test_cfg(5, 5, 1, 1, 1);
    cfg.client_put_timeout_ms = 800;
    let (cluster, client) = boot(&cfg);

    let coord = cluster.coordinator("k").unwrap();
    client.kill(&cluster, coord, 600_000);
    sleep_ms(250);

    // A killed coordinator drops the request on the floor; nothing acks.
    let put = client.put(&cluster, "k", "lost").unwrap();
    assert_matches!(client.wait(put, cfg.client_put_timeout_ms), None);

    client.revive(&cluster, coord);
    sleep_ms(250);

    let put = client.put(&cluster, "k", "kept").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    let get = client.get(&cluster, "k").unwrap();
    match client.wait(get, WAIT_MS) {
        Some(Response::ReadAck { value, .. }) => assert_eq!(value.as_deref(), Some("kept")),
        other => panic!("expected a read ack, got {:?}", other),
    }

    cluster.shutdown();
    client.join();
}

#[test]
fn test_sequential_updates_read_latest() {
    let cfg = test_cfg(5, 5, 3, 2, 2);
    let (cluster, client) = boot(&cfg);

    for value in &["one", "two", "three"] {
        let put = client.put(&cluster, "seq", value).unwrap();
        assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    }
    let get = client.get(&cluster, "seq").unwrap();
    match client.wait(get, WAIT_MS) {
        Some(Response::ReadAck { value, .. }) => assert_eq!(value.as_deref(), Some("three")),
        other => panic!("expected a read ack, got {:?}", other),
    }

    cluster.shutdown();
    client.join();
}

#[test]
fn test_write_quorum_not_met() {
    let mut cfg = test_cfg(5, 5, 3, 2, 3);
    cfg.client_put_timeout_ms = 900;
    cfg.set_data_timeout_ms = 150;
    let (cluster, client) = boot(&cfg);

    let pref = cluster.preference_peers("hello");
    let coord = pref[0];
    let mut killed = 0;
    for peer in 0..cluster.num_peers() {
        if peer != coord && killed < 3 {
            client.kill(&cluster, peer, 600_000);
            killed += 1;
        }
    }
    assert_eq!(killed, 3);
    sleep_ms(250);

    let put = client.put(&cluster, "hello", "world").unwrap();
    assert_matches!(client.wait(put, cfg.client_put_timeout_ms), None);

    cluster.shutdown();
    client.join();
}

#[test]
fn test_concurrent_puts_reconcile_to_one_of_them() {
    let cfg = test_cfg(5, 5, 3, 2, 2);
    let (cluster, client) = boot(&cfg);

    let coord = cluster.coordinator("k").unwrap();
    let pref = cluster.preference_peers("k");
    // A peer outside the replica set: its clock slot never moved during
    // the first put, so the two snapshots are incomparable.
    let other = (0..cluster.num_peers())
        .find(|p| !pref.contains(p))
        .unwrap();
    assert_ne!(coord, other);

    let put = client.put(&cluster, "k", "A").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));
    let put = client.put_at(&cluster, other, "k", "B");
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));

    let get = client.get(&cluster, "k").unwrap();
    match client.wait(get, WAIT_MS) {
        Some(Response::ReadAck { value, .. }) => {
            let value = value.expect("read returned no value");
            assert!(
                value == "A" || value == "B",
                "reconciled value {} is neither write",
                value
            );
        }
        other => panic!("expected a read ack, got {:?}", other),
    }

    cluster.shutdown();
    client.join();
}

#[test]
fn test_read_after_kill_times_out() {
    let mut cfg = test_cfg(5, 5, 3, 3, 2);
    cfg.client_get_timeout_ms = 700;
    let (cluster, client) = boot(&cfg);

    let put = client.put(&cluster, "gone", "value").unwrap();
    assert_matches!(client.wait(put, WAIT_MS), Some(Response::WriteAck { .. }));

    // With R equal to the replica count, two dead replicas starve the
    // read quorum.
    let pref = cluster.preference_peers("gone");
    client.kill(&cluster, pref[1], 600_000);
    client.kill(&cluster, pref[2], 600_000);
    sleep_ms(250);

    let get = client.get(&cluster, "gone").unwrap();
    assert_matches!(client.wait(get, cfg.client_get_timeout_ms), None);

    cluster.shutdown();
    client.join();
}
