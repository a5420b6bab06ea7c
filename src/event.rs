//! Event — outbound messages pushed to session subscribers.
//!
//! DESIGN
//! ======
//! The WebSocket feed is push-only: clients mutate over HTTP and the
//! handler that committed a write broadcasts the corresponding event.
//! Payloads carry the already-filtered published views, so a subscriber
//! never sees an expired delay badge or a non-live participant entry.

use serde::Serialize;
use uuid::Uuid;

use crate::services::presence::{DelayAnnotation, LiveParticipant};
use crate::services::session::Destination;

/// One message on the session feed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ParticipantJoined {
        participant_id: Uuid,
        display_name: String,
        color: String,
    },
    ParticipantLeft {
        participant_id: Uuid,
    },
    PresenceUpdated {
        participant: LiveParticipant,
    },
    DelayChanged {
        participant_id: Uuid,
        delay: Option<DelayAnnotation>,
    },
    DestinationChanged {
        destination: Option<Destination>,
    },
    RoutesInvalidated,
    SessionEnded,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coord;
    use crate::services::presence::{DelayKind, PositionSample};
    use time::macros::datetime;

    #[test]
    fn participant_joined_serializes_tagged() {
        let event = Event::ParticipantJoined {
            participant_id: Uuid::nil(),
            display_name: "alice".into(),
            color: "#E53935".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "participant_joined");
        assert_eq!(json["display_name"], "alice");
        assert_eq!(json["color"], "#E53935");
    }

    #[test]
    fn presence_updated_flattens_coordinates() {
        let event = Event::PresenceUpdated {
            participant: LiveParticipant {
                participant_id: Uuid::nil(),
                device_id: "device-bob".into(),
                display_name: "bob".into(),
                color: "#1E88E5".into(),
                position: Some(PositionSample {
                    coord: Coord::new(12.9, 77.6),
                    heading: Some(45.0),
                    speed_mps: None,
                    accuracy_m: Some(10.0),
                    updated_at: datetime!(2026-08-08 12:00:00 UTC),
                }),
                delay: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "presence_updated");
        assert_eq!(json["participant"]["position"]["lat"], 12.9);
        assert_eq!(json["participant"]["position"]["lng"], 77.6);
        assert!(json["participant"]["delay"].is_null());
    }

    #[test]
    fn delay_changed_carries_annotation() {
        let event = Event::DelayChanged {
            participant_id: Uuid::nil(),
            delay: Some(DelayAnnotation {
                kind: DelayKind::Traffic,
                minutes: 10,
                reported_at: datetime!(2026-08-08 12:00:00 UTC),
            }),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "delay_changed");
        assert_eq!(json["delay"]["kind"], "traffic");
        assert_eq!(json["delay"]["minutes"], 10);
    }

    #[test]
    fn unit_variants_serialize_as_bare_tags() {
        let json = serde_json::to_value(Event::RoutesInvalidated).unwrap();
        assert_eq!(json["type"], "routes_invalidated");
        let json = serde_json::to_value(Event::SessionEnded).unwrap();
        assert_eq!(json["type"], "session_ended");
    }

    #[test]
    fn destination_cleared_serializes_null() {
        let json = serde_json::to_value(Event::DestinationChanged { destination: None }).unwrap();
        assert_eq!(json["type"], "destination_changed");
        assert!(json["destination"].is_null());
    }
}
