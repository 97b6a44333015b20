const MAX_PLAYER_NAME_CHARS: usize = 20;

/// Trims and caps a player name. Blank input stays blank so the session can
/// reject it with its own prompt.
pub fn sanitize_name(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_PLAYER_NAME_CHARS)
        .collect()
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}

pub fn client_id(seq: u64) -> String {
    format!("client_{seq}")
}

pub fn session_seed() -> u32 {
    rand::random::<u32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_limit_parsing_is_lenient_for_invalid_values() {
        assert_eq!(parse_leaderboard_limit(Some("8")), Some(8));
        assert_eq!(parse_leaderboard_limit(Some(" 12 ")), Some(12));
        assert_eq!(parse_leaderboard_limit(Some("0")), Some(0));
        assert_eq!(parse_leaderboard_limit(Some("abc")), None);
        assert_eq!(parse_leaderboard_limit(Some("-1")), None);
        assert_eq!(parse_leaderboard_limit(None), None);
    }

    #[test]
    fn sanitize_name_applies_trim_and_max_len() {
        assert_eq!(sanitize_name(""), "");
        assert_eq!(sanitize_name("   "), "");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(
            sanitize_name("1234567890123456789012345"),
            "12345678901234567890"
        );
        assert_eq!(sanitize_name("Bo\u{7}b"), "Bob");
    }

    #[test]
    fn client_ids_are_sequential() {
        assert_eq!(client_id(1), "client_1");
        assert_ne!(client_id(1), client_id(2));
    }
}
