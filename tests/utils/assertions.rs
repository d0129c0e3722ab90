use serde_json::Value;
use suspect::{realtime::Subscription, RoomEventKind, RoomMessage};

// ============================================================================
// Message Inspection
// ============================================================================

/// Everything currently waiting in a subscriber's mailbox, initial snapshot first
pub fn drain(subscription: &mut Subscription) -> MessageLog {
    let mut messages: Vec<RoomMessage> = std::mem::take(&mut subscription.initial);
    while let Ok(message) = subscription.receiver.try_recv() {
        messages.push(message);
    }
    MessageLog(messages)
}

pub fn events_of(messages: &[RoomMessage]) -> Vec<RoomEventKind> {
    messages.iter().map(|m| m.event).collect()
}

/// Paths of every nav-redirect in order
pub fn redirects(messages: &[RoomMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.event == RoomEventKind::NavRedirect)
        .map(|m| payload(m)["path"].as_str().unwrap().to_string())
        .collect()
}

fn payload(message: &RoomMessage) -> Value {
    serde_json::from_str(&message.data).unwrap()
}

pub struct MessageLog(pub Vec<RoomMessage>);

impl MessageLog {
    pub fn events(&self) -> Vec<RoomEventKind> {
        events_of(&self.0)
    }

    pub fn redirects(&self) -> Vec<String> {
        redirects(&self.0)
    }

    pub fn contains(&self, event: RoomEventKind) -> bool {
        self.0.iter().any(|m| m.event == event)
    }

    /// Payload of the last message of a kind
    pub fn last(&self, event: RoomEventKind) -> Option<Value> {
        self.0.iter().rev().find(|m| m.event == event).map(payload)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
