use crate::models::TransactiveRecord;

/// Delivers transactive signals to named counterparts.
///
/// The transport is opaque to the market: delivery may be delayed or lost, and the
/// negotiation protocol tolerates both.
pub trait Transport {
    /// Queue records for delivery to `counterpart`
    fn send(&mut self, counterpart: &str, records: &[TransactiveRecord]);
}

/// A transport that simply collects outgoing signals for someone else to deliver
#[derive(Clone, Debug, Default)]
pub struct Outbox(pub Vec<(String, Vec<TransactiveRecord>)>);

impl Outbox {
    /// Take every queued signal, leaving the outbox empty
    pub fn drain(&mut self) -> Vec<(String, Vec<TransactiveRecord>)> {
        std::mem::take(&mut self.0)
    }
}

impl Transport for Outbox {
    fn send(&mut self, counterpart: &str, records: &[TransactiveRecord]) {
        self.0.push((counterpart.to_owned(), records.to_vec()));
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, counterpart: &str, records: &[TransactiveRecord]) {
        (**self).send(counterpart, records)
    }
}
