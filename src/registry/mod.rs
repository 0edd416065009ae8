use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tonic::Status;

use crate::domain::Symbol;
use crate::rpc::proto::Candlesticks1MStreamResponse;

/// One live bidi-stream client. Identity is `id`, assigned once per
/// connection by a process-wide counter — simpler than pointer identity
/// and just as unambiguous, since a connection's outbound sender is never
/// shared between subscribers.
#[derive(Clone)]
pub struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Result<Candlesticks1MStreamResponse, Status>>,
}

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl Subscriber {
    pub fn new(tx: mpsc::Sender<Result<Candlesticks1MStreamResponse, Status>>) -> Self {
        Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Non-blocking send: a full channel means a pathological subscriber
    /// is stalling, which the dispatcher logs rather than waits out.
    pub fn try_send(&self, message: Candlesticks1MStreamResponse) -> Result<(), TrySendError> {
        self.tx
            .try_send(Ok(message))
            .map_err(|_| TrySendError(self.id))
    }
}

#[derive(Debug)]
pub struct TrySendError(pub u64);

/// `{symbol -> live subscriber list}`, guarded by a reader-writer lock.
/// Writers are RPC handlers (add on subscribe, remove on teardown);
/// readers are the push dispatcher's fan-out.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: RwLock<HashMap<Symbol, Vec<Subscriber>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `subscriber` to every listed symbol. Callers must already
    /// have excluded symbols this subscriber is registered on — the
    /// registry does not deduplicate.
    pub fn add(&self, symbols: &[Symbol], subscriber: &Subscriber) {
        let mut guard = self.subscribers.write();
        for symbol in symbols {
            guard
                .entry(symbol.clone())
                .or_default()
                .push(subscriber.clone());
        }
    }

    /// Removes every occurrence of `subscriber` from the listed symbols'
    /// lists, using swap-remove (order is not part of the contract).
    pub fn remove(&self, symbols: &[Symbol], subscriber: &Subscriber) {
        let mut guard = self.subscribers.write();
        for symbol in symbols {
            if let Some(list) = guard.get_mut(symbol) {
                let mut i = 0;
                while i < list.len() {
                    if list[i].id == subscriber.id {
                        list.swap_remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
        }
    }

    /// Invokes `send_fn` for every subscriber on `symbol`, under the read
    /// lock. Traversal order is insertion order; no cross-symbol fairness
    /// is promised.
    pub fn fanout(&self, symbol: &Symbol, mut send_fn: impl FnMut(&Subscriber)) {
        let guard = self.subscribers.read();
        if let Some(list) = guard.get(symbol) {
            for subscriber in list {
                send_fn(subscriber);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, symbol: &Symbol, id: u64) -> bool {
        self.subscribers
            .read()
            .get(symbol)
            .is_some_and(|list| list.iter().any(|s| s.id == id))
    }

    #[cfg(test)]
    pub(crate) fn id_of(subscriber: &Subscriber) -> u64 {
        subscriber.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn subscriber() -> Subscriber {
        let (tx, _rx) = mpsc::channel(8);
        Subscriber::new(tx)
    }

    /// Property 8: add then remove leaves no reference to the stream.
    #[test]
    fn add_then_remove_leaves_no_reference() {
        let registry = SubscriptionRegistry::new();
        let eth = symbol("ETHBTC");
        let sub = subscriber();
        let id = SubscriptionRegistry::id_of(&sub);

        registry.add(&[eth.clone()], &sub);
        assert!(registry.contains(&eth, id));

        registry.remove(&[eth.clone()], &sub);
        assert!(!registry.contains(&eth, id));
    }

    #[test]
    fn a_stream_may_be_registered_under_multiple_symbols() {
        let registry = SubscriptionRegistry::new();
        let eth = symbol("ETHBTC");
        let bnb = symbol("BNBBTC");
        let sub = subscriber();

        registry.add(&[eth.clone(), bnb.clone()], &sub);
        registry.remove(&[eth.clone()], &sub);

        assert!(!registry.contains(&eth, SubscriptionRegistry::id_of(&sub)));
        assert!(registry.contains(&bnb, SubscriptionRegistry::id_of(&sub)));
    }

    #[test]
    fn disjoint_adds_do_not_interfere() {
        let registry = SubscriptionRegistry::new();
        let eth = symbol("ETHBTC");
        let bnb = symbol("BNBBTC");
        let a = subscriber();
        let b = subscriber();

        registry.add(&[eth.clone()], &a);
        registry.add(&[bnb.clone()], &b);

        assert!(registry.contains(&eth, SubscriptionRegistry::id_of(&a)));
        assert!(registry.contains(&bnb, SubscriptionRegistry::id_of(&b)));
        assert!(!registry.contains(&bnb, SubscriptionRegistry::id_of(&a)));
    }

    #[test]
    fn fanout_visits_every_subscriber_on_symbol() {
        let registry = SubscriptionRegistry::new();
        let eth = symbol("ETHBTC");
        let a = subscriber();
        let b = subscriber();
        registry.add(&[eth.clone()], &a);
        registry.add(&[eth.clone()], &b);

        let mut seen = Vec::new();
        registry.fanout(&eth, |s| seen.push(s.id));
        assert_eq!(seen.len(), 2);
    }
}
