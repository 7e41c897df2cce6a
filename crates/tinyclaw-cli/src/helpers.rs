//! Shared CLI helpers — response printing, banner, session parsing.

use colored::Colorize;

/// Split a `channel:chat_id` session argument. A bare id gets the `cli`
/// channel.
pub fn parse_session(session: &str) -> (String, String) {
    match session.split_once(':') {
        Some((channel, chat_id)) if !channel.is_empty() => {
            (channel.to_string(), chat_id.to_string())
        }
        _ => ("cli".to_string(), session.to_string()),
    }
}

/// Print an agent response to stdout.
pub fn print_response(response: &str) {
    println!();
    println!("{}", "🦀 TinyClaw".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// Print the banner shown at startup.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "🦀 TinyClaw".cyan().bold(), version.dimmed());
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_with_channel() {
        assert_eq!(
            parse_session("web:sid_9"),
            ("web".to_string(), "sid_9".to_string())
        );
    }

    #[test]
    fn test_parse_session_bare_id() {
        assert_eq!(
            parse_session("default"),
            ("cli".to_string(), "default".to_string())
        );
    }

    #[test]
    fn test_parse_session_empty_channel_falls_back() {
        assert_eq!(
            parse_session(":weird"),
            ("cli".to_string(), ":weird".to_string())
        );
    }
}
