//! Pending-request poller
//!
//! One poller per `(role, address)`, driven by `store::poll` on its own
//! task, independent of any screen: `pause` while the app is backgrounded
//! or no relationship is active, `resume` on foreground (polls
//! immediately). Each request is delivered once per pending status even
//! though the store is polled repeatedly. Requests that leave the pending
//! set are forgotten.

use super::coordinator::{newest_first, parse_requests, pending_filter, DeviceRole, WardApprovalCoordinator};
use super::request::ApprovalRequest;
use super::state::ApprovalStatus;
use crate::felt::Felt;
use crate::store::{self, PollSubscription};
use crate::Result;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

const CHANNEL_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deduplicates pending requests and hands new ones to the receiver.
struct Delivery {
    role: DeviceRole,
    paused: AtomicBool,
    seen: Mutex<HashMap<String, ApprovalStatus>>,
    tx: mpsc::Sender<ApprovalRequest>,
}

impl Delivery {
    /// Mark and return the requests not delivered in their current status,
    /// dropping every id that is no longer pending.
    fn claim_fresh(&self, pending: Vec<ApprovalRequest>) -> Vec<ApprovalRequest> {
        let mut seen = lock(&self.seen);
        seen.retain(|id, _| pending.iter().any(|request| &request.id == id));
        let fresh = pending
            .into_iter()
            .filter(|request| seen.insert(request.id.clone(), request.status) != Some(request.status))
            .collect();
        fresh
    }

    fn deliver(&self, pending: Vec<ApprovalRequest>) -> Vec<ApprovalRequest> {
        let fresh = self.claim_fresh(pending);
        let mut delivered = Vec::with_capacity(fresh.len());
        let mut unsent = fresh.into_iter();
        for request in unsent.by_ref() {
            tracing::debug!(request_id = %request.id, role = %self.role, "New pending request");
            match self.tx.try_send(request.clone()) {
                Ok(()) => delivered.push(request),
                Err(TrySendError::Full(request)) => {
                    tracing::warn!(role = %self.role, "Request receiver is full; retrying next poll");
                    lock(&self.seen).remove(&request.id);
                    break;
                }
                Err(TrySendError::Closed(_)) => return delivered,
            }
        }
        let mut seen = lock(&self.seen);
        for request in unsent {
            seen.remove(&request.id);
        }
        delivered
    }

    #[cfg(test)]
    fn seen_len(&self) -> usize {
        lock(&self.seen).len()
    }
}

pub struct ApprovalPoller {
    coordinator: Arc<WardApprovalCoordinator>,
    address: Felt,
    delivery: Arc<Delivery>,
    subscription: Mutex<Option<PollSubscription>>,
}

impl ApprovalPoller {
    /// Create a stopped poller and the channel new requests arrive on.
    pub fn new(
        coordinator: Arc<WardApprovalCoordinator>,
        role: DeviceRole,
        address: Felt,
    ) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let delivery = Arc::new(Delivery {
            role,
            paused: AtomicBool::new(false),
            seen: Mutex::new(HashMap::new()),
            tx,
        });
        (
            Self {
                coordinator,
                address,
                delivery,
                subscription: Mutex::new(None),
            },
            rx,
        )
    }

    pub fn role(&self) -> DeviceRole {
        self.delivery.role
    }

    pub fn start(&self) {
        let mut subscription = lock(&self.subscription);
        if subscription.as_ref().is_some_and(|s| s.is_active()) {
            return;
        }
        let role = self.delivery.role;
        let address = self.address;
        tracing::info!(role = %role, address = %address, "Starting approval poller");

        let delivery = self.delivery.clone();
        let settings = self.coordinator.settings();
        let started = store::poll(
            self.coordinator.store(),
            settings.table.clone(),
            move || pending_filter(role, &address),
            Some(newest_first()),
            settings.poll_interval(),
            move |rows| {
                if delivery.tx.is_closed() {
                    tracing::debug!(role = %delivery.role, "Receiver dropped, stopping poller");
                    return ControlFlow::Break(());
                }
                if !delivery.paused.load(Ordering::SeqCst) {
                    delivery.deliver(parse_requests(rows));
                }
                ControlFlow::Continue(())
            },
        );
        if self.is_paused() {
            started.pause();
        }
        *subscription = Some(started);
    }

    pub fn stop(&self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
            tracing::info!(role = %self.delivery.role, "Stopped approval poller");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.subscription)
            .as_ref()
            .is_some_and(|s| s.is_active())
    }

    pub fn pause(&self) {
        self.delivery.paused.store(true, Ordering::SeqCst);
        if let Some(subscription) = lock(&self.subscription).as_ref() {
            subscription.pause();
        }
    }

    /// Resume and poll right away.
    pub fn resume(&self) {
        self.delivery.paused.store(false, Ordering::SeqCst);
        if let Some(subscription) = lock(&self.subscription).as_ref() {
            subscription.resume();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.delivery.paused.load(Ordering::SeqCst)
    }

    /// Run one poll now, outside the loop.
    pub async fn poll_once(&self) -> Result<Vec<ApprovalRequest>> {
        let pending = self
            .coordinator
            .pending_for(self.delivery.role, &self.address)
            .await?;
        Ok(self.delivery.deliver(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::test_support::{sample_calls, sample_request, MockChain};
    use crate::approval::WardPolicy;
    use crate::config::ApprovalSettings;
    use crate::intent::{Action, TransactionIntent};
    use crate::store::MemoryStore;
    use crate::wallet::{LocalKeyStore, StarkKeySigner};
    use std::time::Duration;

    fn coordinator() -> Arc<WardApprovalCoordinator> {
        let chain = Arc::new(MockChain::new(WardPolicy {
            guardian_address: Felt::from(0x222u64),
            spending_limit: None,
            require_guardian_for_all: true,
            ward_2fa_enabled: false,
            guardian_2fa_enabled: false,
            frozen: false,
        }));
        let keys = LocalKeyStore::new(
            Felt::from(0x111u64),
            Arc::new(StarkKeySigner::from_hex("0x1111").unwrap()),
        );
        let settings = ApprovalSettings {
            poll_interval_ms: 20,
            ..ApprovalSettings::default()
        };
        Arc::new(WardApprovalCoordinator::new(
            Arc::new(MemoryStore::new()),
            chain,
            Arc::new(keys),
            settings,
        ))
    }

    async fn initiate(c: &WardApprovalCoordinator) -> ApprovalRequest {
        c.initiate_ward_transaction(
            &TransactionIntent::new(Action::Transfer, "STRK").with_amount("1"),
            sample_calls(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn delivers_each_request_once() {
        let c = coordinator();
        let first = initiate(&c).await;
        let (poller, mut rx) = ApprovalPoller::new(c.clone(), DeviceRole::Ward, Felt::from(0x111u64));
        poller.start();
        assert!(poller.is_running());

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, first.id);

        // Several more ticks, nothing new.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());

        poller.stop();
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn paused_poller_delivers_on_resume() {
        let c = coordinator();
        let (poller, mut rx) = ApprovalPoller::new(c.clone(), DeviceRole::Ward, Felt::from(0x111u64));
        poller.pause();
        poller.start();

        let request = initiate(&c).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());

        poller.resume();
        assert!(!poller.is_paused());
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, request.id);
        poller.stop();
    }

    #[tokio::test]
    async fn guardian_poller_sees_only_guardian_work() {
        let c = coordinator();
        initiate(&c).await;
        let (guardian, _rx) =
            ApprovalPoller::new(c.clone(), DeviceRole::Guardian, Felt::from(0x222u64));
        assert!(guardian.poll_once().await.unwrap().is_empty());
        assert_eq!(guardian.role(), DeviceRole::Guardian);
    }

    #[tokio::test]
    async fn forgets_requests_that_stop_pending() {
        let c = coordinator();
        let kept = initiate(&c).await;
        let rejected = initiate(&c).await;
        let (poller, _rx) = ApprovalPoller::new(c.clone(), DeviceRole::Ward, Felt::from(0x111u64));

        assert_eq!(poller.poll_once().await.unwrap().len(), 2);
        assert_eq!(poller.delivery.seen_len(), 2);

        c.reject_request(&rejected.id).await.unwrap();
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert_eq!(poller.delivery.seen_len(), 1);
        assert!(lock(&poller.delivery.seen).contains_key(&kept.id));
    }

    #[tokio::test]
    async fn full_receiver_gets_the_rest_next_poll() {
        let (tx, mut rx) = mpsc::channel(1);
        let delivery = Delivery {
            role: DeviceRole::Ward,
            paused: AtomicBool::new(false),
            seen: Mutex::new(HashMap::new()),
            tx,
        };
        let first = sample_request();
        let second = ApprovalRequest {
            id: "req-2".to_string(),
            ..sample_request()
        };

        let sent = delivery.deliver(vec![first.clone(), second.clone()]);
        assert_eq!(sent.len(), 1);
        assert_eq!(delivery.seen_len(), 1);
        assert_eq!(rx.recv().await.unwrap().id, first.id);

        let sent = delivery.deliver(vec![first, second.clone()]);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, second.id);
        assert_eq!(delivery.seen_len(), 2);
    }
}
