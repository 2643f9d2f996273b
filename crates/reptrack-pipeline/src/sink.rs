use crossbeam_channel::Sender;
use log::warn;
use reptrack_reps::SessionRecord;

/// Receives completed sessions, e.g. to persist workout history.
pub trait SessionSink: Send {
    fn session_completed(&mut self, record: SessionRecord);
}

impl<F> SessionSink for F
where
    F: FnMut(SessionRecord) + Send,
{
    fn session_completed(&mut self, record: SessionRecord) {
        self(record)
    }
}

impl SessionSink for Sender<SessionRecord> {
    fn session_completed(&mut self, record: SessionRecord) {
        if self.send(record).is_err() {
            warn!("session receiver gone, record dropped");
        }
    }
}
