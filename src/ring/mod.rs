pub mod layout;

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::util::hash_to_id;

/// A virtual node: a contiguous slice of the 128 bit hash space owned by
/// one physical peer. Ranges are inclusive on both ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub id: usize,
    pub owner: usize,
    pub start: u128,
    pub end: u128,
}

impl Token {
    pub fn contains(&self, hash: u128) -> bool {
        self.start <= hash && hash <= self.end
    }
}

/// The token cycle, ordered by range start. Search and successor are both
/// O(log T). Every peer holds the same ring; it is built once at cluster
/// startup and never mutated afterwards.
#[derive(Clone, Debug, Default)]
pub struct Ring {
    tokens: BTreeMap<u128, Token>,
}

impl Ring {
    pub fn new() -> Ring {
        Ring {
            tokens: BTreeMap::new(),
        }
    }

    /// Duplicate range starts keep the lower token id.
    pub fn insert(&mut self, token: Token) {
        let entry = self.tokens.entry(token.start).or_insert_with(|| token.clone());
        if token.id < entry.id {
            *entry = token;
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Tokens in range order.
    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// The token whose range contains `hash`. Hashes below the smallest
    /// range start wrap around to the minimum-start token. The ring
    /// partitions the entire space, so a covered lookup that misses its
    /// range is a layout bug and panics.
    pub fn find(&self, hash: u128) -> Option<&Token> {
        let token = self
            .tokens
            .range((Bound::Unbounded, Bound::Included(hash)))
            .next_back()
            .map(|(_, t)| t)
            .or_else(|| self.tokens.values().next())?;
        assert!(
            token.contains(hash) || hash < token.start,
            "hash {} outside every token range",
            hash_to_id(hash)
        );
        Some(token)
    }

    /// The token with the smallest range start strictly greater than
    /// `token.start`, wrapping to the minimum.
    pub fn successor(&self, token: &Token) -> &Token {
        self.tokens
            .range((Bound::Excluded(token.start), Bound::Unbounded))
            .next()
            .map(|(_, t)| t)
            .or_else(|| self.tokens.values().next())
            .expect("successor on an empty ring")
    }
}
