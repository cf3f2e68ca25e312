//! Change notifications for collection listeners.

use serde::Serialize;
use tokio::sync::broadcast;

use super::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Saved,
    Deleted,
    /// The whole collection was replaced from the remote
    Reloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: Option<String>,
}

/// Broadcasts [`DataEvent`]s to every subscriber
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DataEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, table: Table, kind: ChangeKind, id: Option<&str>) {
        let _ = self.sender.send(DataEvent {
            table,
            kind,
            id: id.map(str::to_string),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        bus.publish(Table::Assets, ChangeKind::Saved, Some("a1"));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.table, Table::Assets);
        assert_eq!(event.kind, ChangeKind::Saved);
        assert_eq!(event.id.as_deref(), Some("a1"));
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        EventBus::default().publish(Table::Liabilities, ChangeKind::Reloaded, None);
    }
}
