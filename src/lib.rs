pub mod claims;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod models;
pub mod notify;
pub mod policies;
pub mod pricing;
pub mod pubsub;
pub mod reconciliation;
pub mod sessions;
pub mod store;
pub mod wallet;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use error::{ChatError, ChatResult};
pub use models::SubmitOutcome;

use claims::ClaimService;
use ledger::BalanceLedger;
use messages::MessageService;
use notify::{Notifications, Notifier};
use policies::PolicyService;
use pricing::RateProvider;
use pubsub::Broadcaster;
use reconciliation::ReconciliationService;
use sessions::{SessionLocks, SessionService};
use store::ChatStore;
use wallet::{AccountsDirectory, InvoiceIssuer, SettlementEvent};

/// The assembled chat core. The embedding host supplies the collaborators
/// (store, push channel, off-band notifier, payment backend, accounts,
/// exchange rates) and gets back the services its routing layer calls into.
pub struct ChatCore {
    pub store: Arc<dyn ChatStore>,
    pub locks: Arc<SessionLocks>,
    pub notifications: Arc<Notifications>,
    pub policies: Arc<PolicyService>,
    pub sessions: Arc<SessionService>,
    pub claims: Arc<ClaimService>,
    pub messages: Arc<MessageService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl ChatCore {
    pub fn new(
        store: Arc<dyn ChatStore>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Arc<dyn Notifier>,
        invoices: Arc<dyn InvoiceIssuer>,
        accounts: Arc<dyn AccountsDirectory>,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        let notifications = Arc::new(Notifications::new(broadcaster, notifier));
        let ledger = Arc::new(BalanceLedger::new(store.clone(), notifications.clone()));
        let claims = Arc::new(ClaimService::new(
            store.clone(),
            notifications.clone(),
            accounts.clone(),
            invoices.clone(),
            locks.clone(),
        ));
        let policies = Arc::new(PolicyService::new(store.clone()));
        let sessions = Arc::new(SessionService::new(
            store.clone(),
            notifications.clone(),
            locks.clone(),
        ));
        let messages = Arc::new(MessageService::new(
            store.clone(),
            notifications.clone(),
            ledger.clone(),
            claims.clone(),
            rates,
            invoices,
            accounts,
            locks.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            store.clone(),
            notifications.clone(),
            ledger,
            claims.clone(),
            locks.clone(),
        ));
        ChatCore {
            store,
            locks,
            notifications,
            policies,
            sessions,
            claims,
            messages,
            reconciliation,
        }
    }

    /// Spawns the long-running pieces: the settlement-feed consumer and the
    /// empty-chat cleanup sweeper. Both stop when `shutdown` flips to true.
    pub fn start(
        &self,
        settlements: mpsc::Receiver<SettlementEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            reconciliation::spawn_settlement_worker(
                self.reconciliation.clone(),
                settlements,
                shutdown.clone(),
            ),
            cleanup::spawn(self.store.clone(), shutdown),
        ]
    }
}
