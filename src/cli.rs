use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

use crate::client::Client;
use crate::cluster::{self, Cluster};
use crate::config::Config;
use crate::errors::{ErrorKind, Result, ResultExt};
use crate::util;

#[derive(Debug, PartialEq, Eq)]
pub enum Cmd {
    Get {
        key: String,
        client: usize,
    },
    Put {
        key: String,
        value: String,
        client: usize,
    },
    Kill {
        peer: usize,
        duration_ms: u64,
    },
    Revive {
        peer: usize,
    },
    Status,
    Exit,
}

impl Cmd {
    fn chainable(&self) -> bool {
        match *self {
            Cmd::Get { .. } | Cmd::Put { .. } => true,
            _ => false,
        }
    }
}

/// Parse one input line into commands. `;` chains several commands, but
/// only when every one of them is a `put` or a `get`.
pub fn parse_line(line: &str) -> Result<Vec<Cmd>> {
    let parts: Vec<&str> = line
        .split(';')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(Vec::new());
    }
    let cmds = parts
        .iter()
        .map(|p| parse_cmd(p))
        .collect::<Result<Vec<Cmd>>>()?;
    if cmds.len() > 1 && !cmds.iter().all(Cmd::chainable) {
        bail!(ErrorKind::InvalidCommand(
            "only put and get may be chained with ';'".to_owned()
        ));
    }
    Ok(cmds)
}

fn parse_cmd(input: &str) -> Result<Cmd> {
    match input {
        "status" => return Ok(Cmd::Status),
        "exit" => return Ok(Cmd::Exit),
        _ => {}
    }

    let open = input
        .find('(')
        .ok_or_else(|| ErrorKind::InvalidCommand(input.to_owned()))?;
    let close = input
        .rfind(')')
        .ok_or_else(|| ErrorKind::InvalidCommand(input.to_owned()))?;
    if close < open {
        bail!(ErrorKind::InvalidCommand(input.to_owned()));
    }
    let name = input[..open].trim();
    let args = &input[open + 1..close];
    let rest = input[close + 1..].trim();

    match name {
        "get" => {
            if args.contains(',') || args.trim().is_empty() {
                bail!(ErrorKind::InvalidCommand(
                    "expected get(key)".to_owned()
                ));
            }
            Ok(Cmd::Get {
                key: args.trim().to_owned(),
                client: parse_client(rest)?,
            })
        }
        "put" => {
            let mut kv = args.splitn(2, ',');
            let key = kv.next().unwrap_or("").trim();
            let value = match kv.next() {
                Some(v) => v.trim(),
                None => bail!(ErrorKind::InvalidCommand(
                    "expected put(key, value)".to_owned()
                )),
            };
            if key.is_empty() {
                bail!(ErrorKind::InvalidCommand(
                    "expected put(key, value)".to_owned()
                ));
            }
            Ok(Cmd::Put {
                key: key.to_owned(),
                value: value.to_owned(),
                client: parse_client(rest)?,
            })
        }
        "kill" => {
            if !rest.is_empty() {
                bail!(ErrorKind::InvalidCommand(input.to_owned()));
            }
            let mut nd = args.splitn(2, ',');
            let peer = parse_num(nd.next().unwrap_or(""))?;
            let duration_ms = match nd.next() {
                Some(d) => parse_num(d)? as u64,
                None => bail!(ErrorKind::InvalidCommand(
                    "expected kill(peer, duration_ms)".to_owned()
                )),
            };
            Ok(Cmd::Kill { peer, duration_ms })
        }
        "revive" => {
            if !rest.is_empty() || args.contains(',') {
                bail!(ErrorKind::InvalidCommand(input.to_owned()));
            }
            Ok(Cmd::Revive {
                peer: parse_num(args)?,
            })
        }
        _ => bail!(ErrorKind::InvalidCommand(input.to_owned())),
    }
}

fn parse_client(rest: &str) -> Result<usize> {
    if rest.is_empty() {
        return Ok(0);
    }
    parse_num(rest)
}

fn parse_num(s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .chain_err(|| ErrorKind::InvalidCommand(format!("expected a number, got '{}'", s.trim())))
}

/// The interactive surface: builds a cluster from the config and feeds
/// it commands from stdin until `exit`, EOF, or an interrupt.
pub fn run(cfg: Config) -> Result<()> {
    let cluster = cluster::start(&cfg).chain_err(|| "failed to start cluster")?;
    let shutdown = cluster.shutdown_flag();
    {
        let sd = shutdown.clone();
        ctrlc::set_handler(move || {
            sd.store(true, Ordering::SeqCst);
        })
        .ok();
    }

    let mut clients: Vec<Client> = Vec::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        print!("> ");
        io::stdout().flush().ok();
        let line = match lines.next() {
            Some(Ok(l)) => l,
            _ => break,
        };
        match parse_line(&line) {
            Ok(cmds) => {
                if cmds.contains(&Cmd::Exit) {
                    break;
                }
                if let Err(e) = execute(&cluster, &mut clients, cmds) {
                    println!("{}", e);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    cluster.shutdown();
    for client in clients {
        client.join();
    }
    Ok(())
}

fn execute(cluster: &Cluster, clients: &mut Vec<Client>, cmds: Vec<Cmd>) -> Result<()> {
    // Issue the whole chain, then wait for each job in turn.
    let mut waits = Vec::new();
    for cmd in cmds {
        match cmd {
            Cmd::Get { key, client } => {
                ensure_clients(cluster, clients, client)?;
                match clients[client].get(cluster, &key) {
                    Some(job) => waits.push((client, job, cluster.cfg.client_get_timeout_ms)),
                    None => println!("no coordinator for key '{}'", key),
                }
            }
            Cmd::Put { key, value, client } => {
                ensure_clients(cluster, clients, client)?;
                match clients[client].put(cluster, &key, &value) {
                    Some(job) => waits.push((client, job, cluster.cfg.client_put_timeout_ms)),
                    None => println!("no coordinator for key '{}'", key),
                }
            }
            Cmd::Kill { peer, duration_ms } => {
                check_peer(cluster, peer)?;
                ensure_clients(cluster, clients, 0)?;
                clients[0].kill(cluster, peer, duration_ms);
            }
            Cmd::Revive { peer } => {
                check_peer(cluster, peer)?;
                ensure_clients(cluster, clients, 0)?;
                clients[0].revive(cluster, peer);
            }
            Cmd::Status => print_status(cluster),
            Cmd::Exit => {}
        }
    }
    for (client, job, timeout) in waits {
        let _ = clients[client].wait(job, timeout);
    }
    Ok(())
}

fn ensure_clients(cluster: &Cluster, clients: &mut Vec<Client>, id: usize) -> Result<()> {
    while clients.len() <= id {
        let client = Client::start(clients.len(), cluster.shutdown_flag())
            .chain_err(|| "failed to start client")?;
        clients.push(client);
    }
    Ok(())
}

fn check_peer(cluster: &Cluster, peer: usize) -> Result<()> {
    if peer >= cluster.num_peers() {
        bail!(ErrorKind::BadPeer(peer));
    }
    Ok(())
}

fn print_status(cluster: &Cluster) {
    for (id, store) in cluster.stores.iter().enumerate() {
        let store = store.read().unwrap();
        println!(
            "peer {} [{}] tokens {:?}",
            id,
            if store.alive { "alive" } else { "busy" },
            cluster.token_ids(id)
        );
        let mut hashes: Vec<&u128> = store.data.keys().collect();
        hashes.sort();
        for hash in hashes {
            let obj = &store.data[hash];
            println!(
                "  data   {} = '{}' {:?}{}",
                util::hash_to_id(*hash),
                obj.data(),
                obj.vclk(),
                if obj.is_replica() { "" } else { " *" }
            );
        }
        let mut owners: Vec<&usize> = store.backup.keys().collect();
        owners.sort();
        for owner in owners {
            let slot = &store.backup[owner];
            let mut hashes: Vec<&u128> = slot.keys().collect();
            hashes.sort();
            for hash in hashes {
                let obj = &slot[hash];
                println!(
                    "  backup[{}] {} = '{}' {:?}",
                    owner,
                    util::hash_to_id(*hash),
                    obj.data(),
                    obj.vclk()
                );
            }
        }
    }
}
