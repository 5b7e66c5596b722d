/// Separator between the two ids of a chat key. User ids never contain it.
pub const CHAT_KEY_SEPARATOR: char = '_';

/// Canonical id of the chat between two users: the ids sorted
/// lexicographically and joined with [`CHAT_KEY_SEPARATOR`].
///
/// No validation happens here; callers pass authenticated ids.
pub fn chat_key(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}{}{}", first, CHAT_KEY_SEPARATOR, second)
}
