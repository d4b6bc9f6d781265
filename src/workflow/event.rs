//! Events that trigger workflow runs.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::engine::WorkflowError;

/// A named event carrying a JSON payload.
///
/// The event id participates in run-id derivation, so emitting the same
/// `Event` value twice addresses the same run.
#[derive(Debug, Clone)]
pub struct Event {
    /// Trigger name, e.g. `document.uploaded`.
    pub name: String,
    /// Unique id for this emission.
    pub id: Uuid,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl Event {
    /// Build an event with a fresh id from any serializable payload.
    pub fn new<T: Serialize>(name: &str, data: &T) -> Result<Self, WorkflowError> {
        Ok(Self {
            name: name.to_string(),
            id: Uuid::new_v4(),
            data: serde_json::to_value(data).map_err(WorkflowError::Serialize)?,
        })
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
        serde_json::from_value(self.data.clone()).map_err(|err| WorkflowError::BadEventPayload {
            event: self.name.clone(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        question: String,
    }

    #[test]
    fn payload_round_trips() {
        let event = Event::new(
            "question.asked",
            &Sample {
                question: "What is this?".into(),
            },
        )
        .expect("event");
        let parsed: Sample = event.payload().expect("payload");
        assert_eq!(parsed.question, "What is this?");
    }

    #[test]
    fn mismatched_payload_is_reported() {
        let event = Event::new("question.asked", &serde_json::json!({ "other": 1 })).expect("event");
        let error = event.payload::<Sample>().unwrap_err();
        assert!(matches!(error, WorkflowError::BadEventPayload { .. }));
    }
}
