use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use super::{AccessEvent, EventAction};

const COLOR_SUCCESS: u32 = 0x00FF00;
const COLOR_FAILURE: u32 = 0xFF0000;
const COLOR_FORCED: u32 = 0xFFA500;

/// Webhook body: one embed per event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    /// ISO-8601 UTC
    pub timestamp: String,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl WebhookPayload {
    pub fn from_event(event: &AccessEvent, footer: &str) -> Self {
        let local_time = event
            .occurred_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let description = match event.action {
            EventAction::Recorded(direction) if event.is_forced() => format!(
                "⏰ {}: **{}** was signed out automatically (**{}**).",
                local_time,
                event.actor_name(),
                direction
            ),
            EventAction::Recorded(direction) => format!(
                "✅ {}: **{}** recorded **{}**.",
                local_time,
                event.actor_name(),
                direction
            ),
            EventAction::AccessAttempt => {
                let card = event
                    .details
                    .iter()
                    .find(|(name, _)| name == super::DETAIL_CARD)
                    .map(|(_, value)| value.as_str())
                    .unwrap_or("?");
                format!(
                    "❌ {}: **{}** access attempt failed: unrecognized card `{}`.",
                    local_time,
                    event.actor_name(),
                    card
                )
            }
        };

        let color = if !event.success {
            COLOR_FAILURE
        } else if event.is_forced() {
            COLOR_FORCED
        } else {
            COLOR_SUCCESS
        };

        let mut fields = vec![
            EmbedField {
                name: "User".to_string(),
                value: event.actor_name().to_string(),
                inline: true,
            },
            EmbedField {
                name: "Time".to_string(),
                value: local_time,
                inline: true,
            },
            EmbedField {
                name: "Success".to_string(),
                value: event.success.to_string(),
                inline: true,
            },
        ];
        fields.extend(event.details.iter().map(|(name, value)| EmbedField {
            name: name.clone(),
            value: value.clone(),
            inline: true,
        }));

        Self {
            embeds: vec![Embed {
                title: format!("Access event: {}", event.action_label()),
                description,
                color,
                timestamp: event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                fields,
                footer: (!footer.is_empty()).then(|| EmbedFooter {
                    text: footer.to_string(),
                }),
            }],
        }
    }

    /// Value of a named field in the first embed
    #[cfg(test)]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.embeds
            .first()?
            .fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccessRecord, Direction, User};
    use chrono::{TimeZone, Utc};

    fn user() -> User {
        User {
            id: 1,
            identifier: "F637CF05".to_string(),
            name: "Soma Taniguchi".to_string(),
        }
    }

    fn record(direction: Direction) -> AccessRecord {
        AccessRecord {
            id: 1,
            user_id: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            direction,
        }
    }

    #[test]
    fn entry_payload_is_green_with_core_fields() {
        let payload =
            WebhookPayload::from_event(&AccessEvent::recorded(&user(), &record(Direction::Entry)), "Lab door");
        let embed = &payload.embeds[0];

        assert_eq!(embed.title, "Access event: Entry");
        assert_eq!(embed.color, 65280);
        assert_eq!(embed.timestamp, "2024-05-01T09:30:00Z");
        assert!(embed.description.contains("**Soma Taniguchi**"));
        assert!(embed.description.contains("**Entry**"));
        assert_eq!(payload.field("User"), Some("Soma Taniguchi"));
        assert_eq!(payload.field("Success"), Some("true"));
        assert_eq!(embed.footer.as_ref().map(|f| f.text.as_str()), Some("Lab door"));
    }

    #[test]
    fn unrecognized_payload_is_red_and_names_card() {
        let event = AccessEvent::unrecognized("00000000", Utc::now());
        let payload = WebhookPayload::from_event(&event, "");
        let embed = &payload.embeds[0];

        assert_eq!(embed.color, 16711680);
        assert_eq!(embed.title, "Access event: Access attempt");
        assert!(embed.description.contains("unrecognized card `00000000`"));
        assert_eq!(payload.field("User"), Some("Unknown user"));
        assert_eq!(payload.field("Success"), Some("false"));
        assert_eq!(payload.field("Card"), Some("00000000"));
        assert!(embed.footer.is_none());
    }

    #[test]
    fn forced_exit_payload_is_flagged() {
        let event = AccessEvent::forced_exit(&user(), &record(Direction::Exit));
        let payload = WebhookPayload::from_event(&event, "Lab door");

        assert_eq!(payload.embeds[0].color, 16753920);
        assert!(payload.embeds[0].description.contains("signed out automatically"));
        assert_eq!(payload.field("Forced"), Some("true"));
    }

    #[test]
    fn payload_serializes_embed_shape() {
        let payload =
            WebhookPayload::from_event(&AccessEvent::recorded(&user(), &record(Direction::Exit)), "x");
        let json = serde_json::to_value(&payload).unwrap();

        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "Access event: Exit");
        assert_eq!(embed["fields"][0]["name"], "User");
        assert_eq!(embed["fields"][0]["inline"], true);
        assert_eq!(embed["footer"]["text"], "x");
    }
}
