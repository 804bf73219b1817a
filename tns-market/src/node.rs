use time::OffsetDateTime;
use tns_core::models::{MarketConfig, MarketKey, TransactiveRecord};
use tns_core::ports::{AuditEvent, AuditSink, Participant, Transport};
use tracing::{Level, event};

use crate::registry::MarketRegistry;

/// A transactive node: its markets, its participants, and its links to the outside.
///
/// The node is driven by two inputs only. [`Node::tick`] advances every market to
/// `now`, and [`Node::receive`] hands signals that arrived from a neighbor to the
/// participant standing in for that neighbor. Both are cheap to call repeatedly.
pub struct Node<T: Transport, A: AuditSink> {
    name: String,
    registry: MarketRegistry,
    participants: Vec<Box<dyn Participant>>,
    transport: T,
    audit: A,
}

impl<T: Transport, A: AuditSink> Node<T, A> {
    /// Create a node without participants or markets
    pub fn new(name: impl Into<String>, transport: T, audit: A) -> Self {
        Self {
            name: name.into(),
            registry: MarketRegistry::new(),
            participants: Vec::new(),
            transport,
            audit,
        }
    }

    /// Add a participant, builder style
    pub fn with_participant(mut self, participant: impl Participant + 'static) -> Self {
        self.add_participant(Box::new(participant));
        self
    }

    /// Add a participant to every market of the node
    pub fn add_participant(&mut self, participant: Box<dyn Participant>) {
        event!(
            Level::DEBUG,
            node = %self.name,
            participant = participant.name(),
            "participant added"
        );
        self.participants.push(participant);
    }

    /// Open a market series per configuration, returning how many opened.
    ///
    /// A configuration that cannot produce a market is logged and skipped.
    pub fn open_markets(
        &mut self,
        configs: impl IntoIterator<Item = MarketConfig>,
        now: OffsetDateTime,
    ) -> usize {
        let mut opened = 0;
        for config in configs {
            let series = config.series.clone();
            match self.registry.open(config, now) {
                Ok(()) => opened += 1,
                Err(err) => event!(
                    Level::ERROR,
                    node = %self.name,
                    series = %series,
                    err = err.to_string(),
                    "skipping market series"
                ),
            }
        }
        opened
    }

    /// Advance every market to `now`
    pub fn tick(&mut self, now: OffsetDateTime) {
        self.registry.tick(
            now,
            &mut self.participants,
            &mut self.transport,
            &self.audit,
        );
    }

    /// Deliver records that arrived from `neighbor`
    pub fn receive(
        &mut self,
        neighbor: &str,
        records: Vec<TransactiveRecord>,
        now: OffsetDateTime,
    ) {
        let Some(participant) = self.participants.iter_mut().find(|p| p.name() == neighbor)
        else {
            event!(
                Level::WARN,
                node = %self.name,
                neighbor = neighbor,
                "dropping records from an unknown neighbor"
            );
            return;
        };

        participant.receive_signal(&records, now);
        self.audit.publish(AuditEvent::RecordsReceived {
            neighbor: neighbor.to_owned(),
            records,
        });
    }

    /// Settle a market held in reconciliation
    pub fn reconcile(&mut self, key: &MarketKey) -> bool {
        self.registry.reconcile(key)
    }

    /// The node's name, as its neighbors know it
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's markets
    pub fn registry(&self) -> &MarketRegistry {
        &self.registry
    }

    /// The node's participants, in the order they were added
    pub fn participants(&self) -> &[Box<dyn Participant>] {
        &self.participants
    }

    /// The participant of the given name
    pub fn participant(&self, name: &str) -> Option<&dyn Participant> {
        self.participants
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// The transport carrying outbound signals
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The audit sink
    pub fn audit(&self) -> &A {
        &self.audit
    }
}

impl<T: Transport, A: AuditSink> std::fmt::Debug for Node<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .field("participants", &self.participants.len())
            .finish()
    }
}
