//! Client subscriptions and their match rules.

use std::fmt;

use arrayvec::ArrayVec;
use bchsock_chain::DecodedAddress;

use crate::byte_cmp;

/// Longest op_return prefix a client may subscribe to, in bytes.
pub const MAX_OPRETURN_PREFIX: usize = 16;

/// Up to [`MAX_OPRETURN_PREFIX`] leading bytes of op_return data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpReturnPrefix(ArrayVec<u8, MAX_OPRETURN_PREFIX>);

impl OpReturnPrefix {
    /// `None` when `bytes` is longer than [`MAX_OPRETURN_PREFIX`].
    pub fn new(bytes: &[u8]) -> Option<Self> {
        ArrayVec::try_from(bytes).ok().map(Self)
    }

    /// The first [`MAX_OPRETURN_PREFIX`] bytes of `data`.
    pub fn truncated(data: &[u8]) -> Self {
        let len = data.len().min(MAX_OPRETURN_PREFIX);
        let mut prefix = ArrayVec::new();
        prefix.extend(data[..len].iter().copied());
        Self(prefix)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for OpReturnPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Block,
    Transaction,
    Address,
    OpReturn,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Block => "block",
            SubscriptionKind::Transaction => "transaction",
            SubscriptionKind::Address => "address",
            SubscriptionKind::OpReturn => "opreturn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    Block,
    Transaction,
    /// Outputs paying this address.
    Address(DecodedAddress),
    /// Data outputs whose payload shares a prefix with these bytes.
    OpReturn(OpReturnPrefix),
}

impl Subscription {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Subscription::Block => SubscriptionKind::Block,
            Subscription::Transaction => SubscriptionKind::Transaction,
            Subscription::Address(_) => SubscriptionKind::Address,
            Subscription::OpReturn(_) => SubscriptionKind::OpReturn,
        }
    }

    /// Match rule shared by lookup and removal.
    ///
    /// Addresses compare kind and hash160 only; the network prefix is ignored.
    /// Op_return prefixes match when either is a prefix of the other.
    pub fn matches(&self, other: &Subscription) -> bool {
        match (self, other) {
            (Subscription::Block, Subscription::Block) => true,
            (Subscription::Transaction, Subscription::Transaction) => true,
            (Subscription::Address(a), Subscription::Address(b)) => a.same_destination(b),
            (Subscription::OpReturn(a), Subscription::OpReturn(b)) => {
                byte_cmp::prefix_match(a.as_bytes(), b.as_bytes())
            }
            (Subscription::Block, _)
            | (Subscription::Transaction, _)
            | (Subscription::Address(_), _)
            | (Subscription::OpReturn(_), _) => false,
        }
    }
}
