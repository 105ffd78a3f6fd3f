//! In-memory meeting-notes store.
//!
//! Holds the meeting records the slash commands read from. Seeded with
//! sample data; a real deployment would sit this interface over a
//! database. `latest()` picks the most recent record by `recorded_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded meeting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingRecord {
    /// Time-ordered id (UUID v7)
    pub id: Uuid,
    /// User who recorded the meeting
    pub user: String,
    pub recorded_at: DateTime<Utc>,
    pub summary: String,
    pub todo: String,
    pub user_stories: String,
}

/// Which field of a meeting record a command asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeetingField {
    Summary,
    Todo,
    UserStories,
}

/// Shared meeting store.
pub struct MeetingStore {
    records: Mutex<Vec<MeetingRecord>>,
}

impl MeetingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Create a store seeded with sample meetings.
    pub fn with_sample_data() -> Self {
        let store = Self::new();
        for record in sample_records() {
            store.add(record);
        }
        store
    }

    /// Append a record.
    pub fn add(&self, record: MeetingRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// The most recent record by `recorded_at`, if any.
    pub fn latest(&self) -> Option<MeetingRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|r| r.recorded_at)
            .cloned()
    }

    /// The requested field of the most recent record.
    pub fn latest_field(&self, field: MeetingField) -> Option<String> {
        self.latest().map(|record| match field {
            MeetingField::Summary => record.summary,
            MeetingField::Todo => record.todo,
            MeetingField::UserStories => record.user_stories,
        })
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Default for MeetingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_records() -> Vec<MeetingRecord> {
    let now = Utc::now();
    vec![
        MeetingRecord {
            id: Uuid::now_v7(),
            user: "U07FD5Q777E".to_string(),
            recorded_at: now - Duration::days(7),
            summary: "Reviewed Q2 numbers and the Q3 budget draft. Onboarding for the two new \
                      client accounts starts next sprint."
                .to_string(),
            todo: "- Finalize Q3 budget (Dana)\n- Schedule client kickoff (Priya)".to_string(),
            user_stories: "- As a client, I want a guided onboarding so I can start using the \
                           product quickly."
                .to_string(),
        },
        MeetingRecord {
            id: Uuid::now_v7(),
            user: "U07FZF8KVRN".to_string(),
            recorded_at: now,
            summary: "Planned the paper-reduction initiative. Marketing proposed a launch event; \
                      facilities will price out shared printers."
                .to_string(),
            todo: "- Compare recycling vendors (Ana)\n- Draft launch event proposal (Miguel)\n\
                   - Inventory current printers (Sam)"
                .to_string(),
            user_stories: "- As an employee, I want a simple way to recycle paper so I can \
                           contribute to sustainability.\n- As a manager, I want recycling \
                           metrics so I can report environmental impact."
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(recorded_at: DateTime<Utc>, summary: &str) -> MeetingRecord {
        MeetingRecord {
            id: Uuid::now_v7(),
            user: "U1".to_string(),
            recorded_at,
            summary: summary.to_string(),
            todo: format!("todo for {}", summary),
            user_stories: format!("stories for {}", summary),
        }
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let store = MeetingStore::new();
        assert!(store.latest().is_none());
        assert!(store.latest_field(MeetingField::Summary).is_none());
    }

    #[test]
    fn test_latest_picks_max_recorded_at() {
        let store = MeetingStore::new();
        let now = Utc::now();

        store.add(record_at(now - Duration::days(7), "old"));
        store.add(record_at(now, "new"));
        store.add(record_at(now - Duration::days(1), "middle"));

        assert_eq!(store.latest().unwrap().summary, "new");
    }

    #[test]
    fn test_latest_field_selection() {
        let store = MeetingStore::new();
        store.add(record_at(Utc::now(), "standup"));

        assert_eq!(
            store.latest_field(MeetingField::Summary).unwrap(),
            "standup"
        );
        assert_eq!(
            store.latest_field(MeetingField::Todo).unwrap(),
            "todo for standup"
        );
        assert_eq!(
            store.latest_field(MeetingField::UserStories).unwrap(),
            "stories for standup"
        );
    }

    #[test]
    fn test_sample_data_seeded() {
        let store = MeetingStore::with_sample_data();
        assert_eq!(store.count(), 2);
        // The seeded records are time-ordered; latest is the recent one
        assert!(store
            .latest()
            .unwrap()
            .summary
            .contains("paper-reduction"));
    }
}
