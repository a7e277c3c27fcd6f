//! Pending request correlation
//!
//! Every request handed to the radio backend is stored under its own
//! [`RequestToken`] until the matching completion event arrives. Removing the
//! entry before resolving it guarantees each completion fires exactly once.

use std::collections::HashMap;

use tokio::sync::oneshot;

use super::psm::Psm;
use super::types::RequestToken;
use crate::device::DeviceId;
use crate::error::L2capResult;

/// Completion handle for a request resolving to a PSM
pub type PsmReply = oneshot::Sender<L2capResult<Psm>>;
/// Completion handle for a request resolving to an acknowledgement
pub type AckReply = oneshot::Sender<L2capResult<()>>;

/// An in-flight backend request
#[derive(Debug)]
pub enum PendingRequest {
    Listen {
        secure: bool,
        reply: PsmReply,
    },
    Connect {
        device: DeviceId,
        psm: Psm,
        reply: PsmReply,
    },
    CloseServer {
        psm: Psm,
        reply: AckReply,
    },
}

impl PendingRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Listen { .. } => "listen",
            Self::Connect { .. } => "connect",
            Self::CloseServer { .. } => "closeServer",
        }
    }
}

/// Table of in-flight requests keyed by token
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_token: u64,
    requests: HashMap<RequestToken, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a request under a freshly generated token
    pub fn insert(&mut self, request: PendingRequest) -> RequestToken {
        self.next_token = self.next_token.wrapping_add(1);
        let token = RequestToken(self.next_token);
        self.requests.insert(token, request);
        token
    }

    /// Take the request for `token`; `None` if it was already resolved
    pub fn take(&mut self, token: RequestToken) -> Option<PendingRequest> {
        self.requests.remove(&token)
    }

    /// Take the request for `token` only if it satisfies `predicate`
    pub fn take_if<F>(&mut self, token: RequestToken, predicate: F) -> Option<PendingRequest>
    where
        F: FnOnce(&PendingRequest) -> bool,
    {
        if predicate(self.requests.get(&token)?) {
            self.requests.remove(&token)
        } else {
            None
        }
    }

    /// Take every request matching `predicate`
    pub fn drain_where<F>(&mut self, mut predicate: F) -> Vec<PendingRequest>
    where
        F: FnMut(&PendingRequest) -> bool,
    {
        let tokens: Vec<RequestToken> = self
            .requests
            .iter()
            .filter(|(_, request)| predicate(request))
            .map(|(token, _)| *token)
            .collect();
        tokens
            .into_iter()
            .filter_map(|token| self.requests.remove(&token))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_distinct_and_single_use() {
        let mut pending = PendingRequests::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        let t1 = pending.insert(PendingRequest::Listen { secure: false, reply: tx1 });
        let t2 = pending.insert(PendingRequest::Listen { secure: true, reply: tx2 });
        assert_ne!(t1, t2);
        assert_eq!(pending.len(), 2);

        match pending.take(t2) {
            Some(PendingRequest::Listen { secure, .. }) => assert!(secure),
            other => panic!("Expected listen request, got {:?}", other),
        }
        assert!(pending.take(t2).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_drain_where_filters_by_kind() {
        let mut pending = PendingRequests::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        pending.insert(PendingRequest::Listen { secure: false, reply: tx1 });
        let close = pending.insert(PendingRequest::CloseServer { psm: Psm::new(0x80), reply: tx2 });

        let drained = pending.drain_where(|r| matches!(r, PendingRequest::Listen { .. }));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), "listen");
        assert!(pending.take(close).is_some());
        assert!(pending.is_empty());
    }
}
