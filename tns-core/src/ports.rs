mod audit;
mod participant;
mod transport;

pub use audit::{AuditEvent, AuditSink, NullSink};
pub use participant::{Participant, PowerLimits};
pub use transport::{Outbox, Transport};
