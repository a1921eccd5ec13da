use std::fmt;

use crate::peer::store::Object;
use crate::ring::Token;
use crate::util::hash_to_id;

/// Channel end a peer uses to answer a client.
pub type CChan = amy::Sender<Response>;

/// Everything that can land in a peer's inbox: client requests and
/// peer-to-peer replication traffic. Senders only ever enqueue; all
/// handling happens on the receiving peer's loop.
pub enum Request {
    ClientRead {
        job: usize,
        key: String,
        resp: CChan,
    },
    ClientWrite {
        job: usize,
        key: String,
        value: String,
        resp: CChan,
    },
    ClientKill {
        job: usize,
        duration_ms: u64,
    },
    ClientRevive {
        job: usize,
        resp: Option<CChan>,
    },
    /// Store a copy. No clock comparison on the receiver; the
    /// coordinator's object already carries the intended clock.
    SetData {
        job: usize,
        src: usize,
        hash: u128,
        obj: Object,
    },
    SetDataAck {
        job: usize,
        src: usize,
        hash: u128,
    },
    ReadData {
        job: usize,
        src: usize,
        hash: u128,
    },
    ReadDataAck {
        job: usize,
        src: usize,
        hash: u128,
        obj: Option<Object>,
    },
    /// Hinted handoff: hold this object for `target.owner` until it can
    /// be delivered.
    BackData {
        job: usize,
        src: usize,
        hash: u128,
        obj: Object,
        target: Token,
    },
    BackDataAck {
        job: usize,
        src: usize,
        hash: u128,
    },
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::ClientRead { job, key, .. } => write!(f, "ClientRead[{}] {:?}", job, key),
            Request::ClientWrite { job, key, .. } => write!(f, "ClientWrite[{}] {:?}", job, key),
            Request::ClientKill {
                job, duration_ms, ..
            } => write!(f, "ClientKill[{}] {}ms", job, duration_ms),
            Request::ClientRevive { job, .. } => write!(f, "ClientRevive[{}]", job),
            Request::SetData { job, src, hash, .. } => {
                write!(f, "SetData[{}] from {} {}", job, src, hash_to_id(*hash))
            }
            Request::SetDataAck { job, src, .. } => write!(f, "SetDataAck[{}] from {}", job, src),
            Request::ReadData { job, src, hash } => {
                write!(f, "ReadData[{}] from {} {}", job, src, hash_to_id(*hash))
            }
            Request::ReadDataAck { job, src, .. } => write!(f, "ReadDataAck[{}] from {}", job, src),
            Request::BackData {
                job, src, target, ..
            } => write!(f, "BackData[{}] from {} for peer {}", job, src, target.owner),
            Request::BackDataAck { job, src, .. } => write!(f, "BackDataAck[{}] from {}", job, src),
        }
    }
}

/// Everything that can land on a client's return channel.
#[derive(Clone, Debug)]
pub enum Response {
    ReadAck {
        job: usize,
        key: String,
        value: Option<String>,
    },
    WriteAck {
        job: usize,
        key: String,
        value: String,
    },
    /// A revive ended a kill period.
    Revived {
        job: usize,
        peer: usize,
    },
    /// Probe echo: the peer was already alive.
    Alive {
        job: usize,
        peer: usize,
    },
}

impl Response {
    pub fn job(&self) -> usize {
        match *self {
            Response::ReadAck { job, .. }
            | Response::WriteAck { job, .. }
            | Response::Revived { job, .. }
            | Response::Alive { job, .. } => job,
        }
    }
}
