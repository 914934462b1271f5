//! Input handling - parse what the user types

/// Parsed user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// Chat text to send to the room
    Text(String),

    /// Control command: /command args
    ControlCommand { command: String, args: Vec<String> },

    /// Blank line
    Empty,
}

/// Parse a line of user input.
///
/// `//text` sends `/text` literally.
pub fn parse_input(line: &str) -> ParsedInput {
    let line = line.trim();
    if line.is_empty() {
        return ParsedInput::Empty;
    }

    if let Some(escaped) = line.strip_prefix("//") {
        return ParsedInput::Text(format!("/{}", escaped));
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or_default().to_lowercase();
        let args = parts
            .next()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        return ParsedInput::ControlCommand { command, args };
    }

    ParsedInput::Text(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regular_text() {
        assert_eq!(
            parse_input("  hello there "),
            ParsedInput::Text("hello there".to_string())
        );
    }

    #[test]
    fn test_parse_control_command() {
        let result = parse_input("/Terminate keep");
        assert!(matches!(
            result,
            ParsedInput::ControlCommand { command, args }
            if command == "terminate" && args == vec!["keep"]
        ));
    }

    #[test]
    fn test_parse_control_command_no_args() {
        let result = parse_input("/who");
        assert!(matches!(
            result,
            ParsedInput::ControlCommand { command, args }
            if command == "who" && args.is_empty()
        ));
    }

    #[test]
    fn test_escaped_slash_is_text() {
        assert_eq!(parse_input("//shrug"), ParsedInput::Text("/shrug".to_string()));
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_input("   "), ParsedInput::Empty);
    }
}
