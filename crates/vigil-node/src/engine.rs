//! The assembled credibility and moderation engine.

use std::sync::Arc;
use std::time::Duration;

use vigil_broker::Broker;

use crate::comments::CommentBoard;
use crate::lifecycle::IncidentManager;
use crate::moderation::Moderation;
use crate::records::Records;
use crate::reports::ReportLedger;
use crate::storage::RecordStore;
use crate::votes::VoteLedger;

/// Every component, sharing one store handle and one broker.
#[derive(Debug, Clone)]
pub struct Engine {
    pub incidents: IncidentManager,
    pub votes: VoteLedger,
    pub reports: ReportLedger,
    pub moderation: Moderation,
    pub comments: CommentBoard,
    records: Records,
    broker: Broker,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, broker: Broker, store_timeout: Duration) -> Self {
        let records = Records::new(store, store_timeout);
        Self {
            incidents: IncidentManager::new(records.clone(), broker.clone()),
            votes: VoteLedger::new(records.clone(), broker.clone()),
            reports: ReportLedger::new(records.clone(), broker.clone()),
            moderation: Moderation::new(records.clone(), broker.clone()),
            comments: CommentBoard::new(records.clone(), broker.clone()),
            records,
            broker,
        }
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }
}
