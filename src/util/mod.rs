//! Utility module
//!
//! Text helpers shared by logging and notifications.

/// "1 second", "12 seconds". Counts ending in 1 take the singular, except 11.
pub fn plural(n: u64, word: &str) -> String {
    if n % 10 != 1 || n == 11 {
        format!("{} {}s", n, word)
    } else {
        format!("{} {}", n, word)
    }
}

/// Battery level for display, "---" when unknown
pub fn battery_text(level: Option<u8>) -> String {
    match level {
        Some(level) => format!("{}%", level),
        None => "---%".to_string(),
    }
}
