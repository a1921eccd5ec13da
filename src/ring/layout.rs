use rand::{Rng, SeedableRng, StdRng};

use crate::config::Config;
use crate::ring::{Ring, Token};
use crate::util::{FHashMap, FHashSet};

/// Preference lists, keyed by token id: the token itself followed by the
/// tokens of the next distinct owners along the ring, N entries at most.
pub type PrefLists = FHashMap<usize, Vec<Token>>;

/// Carve the hash space into `num_tokens` equal ranges and assign them to
/// peers. Range `i` spans `[width * i, width * (i + 1) - 1]`, with the
/// last range pinned to the top of the space so the ranges partition it
/// exactly. Token ids are a shuffled permutation of `0..T`, which makes
/// the owner assignment random with respect to ring position: ids are
/// dealt to peers in blocks of `floor(T / P)`, the first `T mod P` peers
/// taking one extra.
pub fn build_tokens(cfg: &Config) -> Vec<Token> {
    let peers = cfg.num_nodes;
    let count = cfg.num_tokens;
    if peers == 0 || count == 0 {
        return Vec::new();
    }

    let mut ids: Vec<usize> = (0..count).collect();
    if cfg.pinned_seed() {
        let mut rng: StdRng = SeedableRng::from_seed([0u8; 32]);
        rng.shuffle(&mut ids);
    } else {
        rand::thread_rng().shuffle(&mut ids);
    }

    let base = count / peers;
    let extra = count % peers;
    // Owner of token id `j`, by block position of `j`.
    let owner_of = |id: usize| -> usize {
        let cutoff = (base + 1) * extra;
        if id < cutoff {
            id / (base + 1)
        } else {
            extra + (id - cutoff) / base
        }
    };

    let width = u128::max_value() / count as u128;
    ids.iter()
        .enumerate()
        .map(|(pos, &id)| {
            let start = width * pos as u128;
            let end = if pos == count - 1 {
                u128::max_value()
            } else {
                width * (pos as u128 + 1) - 1
            };
            Token {
                id,
                owner: owner_of(id),
                start,
                end,
            }
        })
        .collect()
}

pub fn build_ring(tokens: &[Token]) -> Ring {
    let mut ring = Ring::new();
    for t in tokens {
        ring.insert(t.clone());
    }
    ring
}

/// Walk forward from every token collecting distinct owners until N are
/// found or the ring wraps. Built once; every peer shares the same map.
pub fn build_pref_lists(ring: &Ring, n: usize) -> PrefLists {
    let mut prefs = PrefLists::default();
    for token in ring.iter() {
        let mut owners = FHashSet::default();
        owners.insert(token.owner);
        let mut list = vec![token.clone()];
        let mut cur = token;
        while list.len() < n {
            cur = ring.successor(cur);
            if cur.id == token.id {
                break;
            }
            if owners.insert(cur.owner) {
                list.push(cur.clone());
            }
        }
        prefs.insert(token.id, list);
    }
    prefs
}
