//! Event bus for consultboard using tokio::broadcast
//!
//! Provides a publish-subscribe mechanism for data updates.

use tokio::sync::broadcast;

/// Events emitted by the data layer
#[derive(Debug, Clone)]
pub enum DataEvent {
    /// A dataset table was reloaded from disk
    DatasetReloaded(String),
    /// Timesheet of a consultant for a month was saved (consultant id, "YYYY-MM")
    TimesheetSaved(u64, String),
    /// Staffing changed on a mission
    StaffingUpdated(u64),
    /// Mission attributes or rates changed
    MissionUpdated(u64),
    /// A client bill was created or updated
    BillUpdated(u64),
    /// An expense was created or changed state
    ExpenseUpdated(u64),
    /// Initial load completed
    LoadCompleted,
    /// Watcher encountered an error
    WatcherError(String),
}

impl DataEvent {
    /// Event name used on the SSE wire
    pub fn name(&self) -> &'static str {
        match self {
            DataEvent::DatasetReloaded(_) => "dataset_reloaded",
            DataEvent::TimesheetSaved(..) => "timesheet_saved",
            DataEvent::StaffingUpdated(_) => "staffing_updated",
            DataEvent::MissionUpdated(_) => "mission_updated",
            DataEvent::BillUpdated(_) => "bill_updated",
            DataEvent::ExpenseUpdated(_) => "expense_updated",
            DataEvent::LoadCompleted => "load_completed",
            DataEvent::WatcherError(_) => "watcher_error",
        }
    }
}

/// Event bus for broadcasting data events
///
/// Uses tokio::broadcast for multi-consumer support.
/// The web crate relays these over SSE.
pub struct EventBus {
    sender: broadcast::Sender<DataEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DataEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.sender.subscribe()
    }

    /// Get current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
