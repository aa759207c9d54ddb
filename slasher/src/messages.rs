use futures::channel::mpsc::UnboundedSender;
use log::warn;
use types::containers::{AttesterSlashing, ProposerSlashing};

/// Slashings published to the sink. Emission happens only after the batch
/// that found them has been flushed.
#[derive(Debug)]
pub enum SlasherToSink {
    AttesterSlashing(AttesterSlashing),
    ProposerSlashing(ProposerSlashing),
}

impl SlasherToSink {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if tx.unbounded_send(self).is_err() {
            warn!("send to slashing sink failed because the receiver was dropped");
        }
    }
}
