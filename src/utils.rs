//! Token validators shared by the height command and the platform handlers.

use std::sync::OnceLock;

use regex::Regex;

fn game_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("game id pattern is valid")
    })
}

fn friend_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$").expect("friend code pattern is valid")
    })
}

/// Checks whether a token is a long game id (lowercase UUID).
pub fn is_game_id(token: &str) -> bool {
    game_id_pattern().is_match(&token.to_lowercase())
}

/// Checks whether a token is a friend code (`XXXX-XXXX-XXXX`, alphanumeric).
pub fn is_friend_code(token: &str) -> bool {
    friend_code_pattern().is_match(&token.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_game_id_accepts_uuid() {
        assert!(is_game_id("01234567-89ab-cdef-0123-456789abcdef"));
        // case is normalized before matching
        assert!(is_game_id("01234567-89AB-CDEF-0123-456789ABCDEF"));
    }

    #[test]
    fn test_is_game_id_rejects_malformed_tokens() {
        assert!(!is_game_id("not-a-uuid"));
        assert!(!is_game_id("01234567-89ab-cdef-0123"));
        assert!(!is_game_id(""));
        assert!(!is_game_id("ABCD-1234-EF56"));
    }

    #[test]
    fn test_is_friend_code_accepts_dash_separated_groups() {
        assert!(is_friend_code("ABCD-1234-EF56"));
        assert!(is_friend_code("abcd-1234-ef56"));
    }

    #[test]
    fn test_is_friend_code_rejects_malformed_tokens() {
        assert!(!is_friend_code("ABCD-1234"));
        assert!(!is_friend_code("ABCD-1234-EF567"));
        assert!(!is_friend_code("ABCD_1234_EF56"));
        assert!(!is_friend_code("01234567-89ab-cdef-0123-456789abcdef"));
    }
}
