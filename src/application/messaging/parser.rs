//! Message parser - Splits prefixed message text into a command invocation

/// A prefixed message broken into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    /// First token after the prefix
    pub name: String,
    /// Remaining whitespace-separated tokens
    pub args: Vec<String>,
    /// Everything after the prefix, used for pattern triggers
    pub body: String,
}

/// Parses incoming text against a command prefix
pub struct MessageParser;

impl MessageParser {
    /// Strip `prefix` from `text` and tokenize the rest.
    /// Returns `None` when the text does not start with the prefix.
    pub fn parse(prefix: &str, text: &str) -> Option<ParsedInput> {
        let body = text.strip_prefix(prefix)?.trim();

        let mut parts = body.split_whitespace().map(str::to_string);
        let name = parts.next().unwrap_or_default();
        let args = parts.collect();

        Some(ParsedInput {
            name,
            args,
            body: body.to_string(),
        })
    }
}
