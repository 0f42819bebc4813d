//! Message templates and `{placeholder}` rendering.

use serde_json::Value;
use tracing::debug;
use waitline_core::EventType;

/// Default language when a tenant carries no preference.
pub const DEFAULT_LANG: &str = "id";

/// Template id sent when a ticket is near the front of its queue.
pub const REMINDER_TEMPLATE: &str = "ticket_reminder";

/// Map an event type to its template id. Other events produce no
/// notification.
#[must_use]
pub const fn template_for_event(event: EventType) -> Option<&'static str> {
    match event {
        EventType::Created => Some("ticket_created"),
        EventType::Called => Some("ticket_called"),
        EventType::Recalled => Some("ticket_recalled"),
        _ => None,
    }
}

/// Built-in template body for a language; used when the tenant carries no
/// override row.
#[must_use]
pub fn default_template(template_id: &str, lang: &str) -> Option<&'static str> {
    if lang == "en" {
        return match template_id {
            "ticket_created" => Some("Ticket {ticket_number} created."),
            "ticket_called" => Some("Ticket {ticket_number} called to counter {counter_id}."),
            "ticket_recalled" => Some("Ticket {ticket_number} recalled."),
            REMINDER_TEMPLATE => {
                Some("Ticket {ticket_number}: {queue_position} ahead of you, please get ready.")
            }
            _ => None,
        };
    }
    match template_id {
        "ticket_created" => Some("Tiket {ticket_number} dibuat."),
        "ticket_called" => Some("Tiket {ticket_number} dipanggil ke loket {counter_id}."),
        "ticket_recalled" => Some("Tiket {ticket_number} dipanggil ulang."),
        REMINDER_TEMPLATE => {
            Some("Tiket {ticket_number}: {queue_position} antrean di depan Anda, bersiaplah.")
        }
        _ => None,
    }
}

/// Substitute the supported placeholders from an event payload. Missing
/// variables render as empty strings.
#[must_use]
pub fn render(template: &str, payload: &Value, queue_position: Option<i64>) -> String {
    let mut message = template.to_string();
    for key in ["ticket_number", "branch_id", "service_id", "counter_id"] {
        let placeholder = format!("{{{key}}}");
        if !message.contains(&placeholder) {
            continue;
        }
        let value = payload_str(payload, key);
        if value.is_empty() {
            debug!(key, "template variable missing from payload");
        }
        message = message.replace(&placeholder, &value);
    }
    if message.contains("{queue_position}") {
        let value = queue_position.map_or(String::new(), |n| n.to_string());
        message = message.replace("{queue_position}", &value);
    }
    message
}

fn payload_str(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_three_event_types_notify() {
        assert_eq!(template_for_event(EventType::Created), Some("ticket_created"));
        assert_eq!(template_for_event(EventType::Called), Some("ticket_called"));
        assert_eq!(
            template_for_event(EventType::Recalled),
            Some("ticket_recalled")
        );
        for event in [
            EventType::Serving,
            EventType::Done,
            EventType::Cancelled,
            EventType::Held,
            EventType::Unheld,
            EventType::Transferred,
            EventType::NoShow,
        ] {
            assert_eq!(template_for_event(event), None, "{event}");
        }
    }

    #[test]
    fn defaults_exist_in_both_languages() {
        for template_id in ["ticket_created", "ticket_called", "ticket_recalled", REMINDER_TEMPLATE] {
            assert!(default_template(template_id, "id").is_some(), "{template_id} id");
            assert!(default_template(template_id, "en").is_some(), "{template_id} en");
        }
        assert!(default_template("unknown", "en").is_none());
    }

    #[test]
    fn render_substitutes_payload_fields() {
        let payload = json!({
            "ticket_number": "CS-007",
            "counter_id": "c0ffee00-0000-0000-0000-000000000001",
        });
        let message = render(
            "Ticket {ticket_number} called to counter {counter_id}.",
            &payload,
            None,
        );
        assert_eq!(
            message,
            "Ticket CS-007 called to counter c0ffee00-0000-0000-0000-000000000001."
        );
    }

    #[test]
    fn missing_fields_render_empty() {
        let message = render("Ticket {ticket_number} at {branch_id}.", &json!({}), None);
        assert_eq!(message, "Ticket  at .");
    }

    #[test]
    fn queue_position_substitutes_from_the_argument() {
        let message = render(
            "{queue_position} ahead of ticket {ticket_number}.",
            &json!({"ticket_number": "CS-001"}),
            Some(2),
        );
        assert_eq!(message, "2 ahead of ticket CS-001.");
    }
}
