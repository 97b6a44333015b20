use serde_json::Value;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Start { name: String },
    ToggleCharge,
    ToggleRapid,
    ReturnToIdle,
    Leaderboard { limit: Option<usize> },
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "start" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::Start { name })
        }
        "charge" => Some(ParsedClientMessage::ToggleCharge),
        "rapid" => Some(ParsedClientMessage::ToggleRapid),
        "return_to_idle" => Some(ParsedClientMessage::ReturnToIdle),
        "leaderboard" => {
            let limit = parse_optional_limit(object.get("limit"))?;
            Some(ParsedClientMessage::Leaderboard { limit })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

/// `None` means the field was malformed; `Some(None)` that it was absent.
fn parse_optional_limit(value: Option<&Value>) -> Option<Option<usize>> {
    let Some(value) = value else {
        return Some(None);
    };
    if value.is_null() {
        return Some(None);
    }
    if let Some(number) = value.as_u64() {
        return Some(Some(usize::try_from(number).unwrap_or(usize::MAX)));
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() && number >= 0.0 {
            return Some(Some(number.floor() as usize));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_message() {
        let parsed = parse_client_message(r#"{"type":"start","name":"Alice"}"#);
        assert_eq!(
            parsed,
            Some(ParsedClientMessage::Start {
                name: "Alice".to_string()
            })
        );
    }

    #[test]
    fn parse_start_requires_string_name() {
        assert!(parse_client_message(r#"{"type":"start"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start","name":5}"#).is_none());
    }

    #[test]
    fn parse_command_messages() {
        assert_eq!(
            parse_client_message(r#"{"type":"charge"}"#),
            Some(ParsedClientMessage::ToggleCharge)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"rapid"}"#),
            Some(ParsedClientMessage::ToggleRapid)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"return_to_idle"}"#),
            Some(ParsedClientMessage::ReturnToIdle)
        );
    }

    #[test]
    fn parse_leaderboard_limit_variants() {
        assert_eq!(
            parse_client_message(r#"{"type":"leaderboard"}"#),
            Some(ParsedClientMessage::Leaderboard { limit: None })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"leaderboard","limit":25}"#),
            Some(ParsedClientMessage::Leaderboard { limit: Some(25) })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"leaderboard","limit":7.9}"#),
            Some(ParsedClientMessage::Leaderboard { limit: Some(7) })
        );
        assert!(parse_client_message(r#"{"type":"leaderboard","limit":-1}"#).is_none());
        assert!(parse_client_message(r#"{"type":"leaderboard","limit":"ten"}"#).is_none());
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        let parsed = parse_client_message(r#"{"type":"ping","t":12.5}"#);
        assert_eq!(parsed, Some(ParsedClientMessage::Ping { t: 12.5 }));
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }

    #[test]
    fn unknown_or_malformed_messages_are_ignored() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"["start"]"#).is_none());
        assert!(parse_client_message(r#"{"type":"hello"}"#).is_none());
    }
}
