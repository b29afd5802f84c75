//! Task file codec: a `---` delimited `key: value` header and a free-text body.

use std::fmt::Write as _;

use regex::Regex;

const DELIMITER: &str = "---";

/// Ordered `key: value` header of a task file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<(String, String)>,
}

impl Header {
    /// Create an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing any existing value for `key`.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty value among `keys`.
    #[must_use]
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.is_empty())
    }

    /// Insert or replace `key`, keeping the original position on replace.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into().replace(['\r', '\n'], " ");
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key.to_owned(), value));
        }
    }

    /// Iterate over fields in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the header has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed task (or signal) file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFile {
    /// Structured header.
    pub header: Header,
    /// Everything after the closing delimiter, verbatim.
    pub body: String,
}

impl TaskFile {
    /// Build a task file from a header and body.
    #[must_use]
    pub fn new(header: Header, body: impl Into<String>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Parse file text. Text without a leading delimiter has an empty header.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut lines = text.split_inclusive('\n');
        let Some(first) = lines.next() else {
            return Self::default();
        };
        if first.trim() != DELIMITER {
            return Self::new(Header::new(), text);
        }

        let mut header = Header::new();
        let mut consumed = first.len();
        let mut closed = false;
        for line in lines.by_ref() {
            consumed += line.len();
            let trimmed = line.trim();
            if trimmed == DELIMITER {
                closed = true;
                break;
            }
            if line.starts_with([' ', '\t']) {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    header.set(key, unquote(value.trim()));
                }
            }
        }

        if !closed {
            return Self::new(Header::new(), text);
        }
        Self::new(header, &text[consumed..])
    }

    /// Render to file text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 128);
        out.push_str(DELIMITER);
        out.push('\n');
        for (key, value) in self.header.iter() {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        out
    }

    /// Declared `type` field.
    #[must_use]
    pub fn kind_label(&self) -> Option<&str> {
        self.header.get("type")
    }

    /// Declared `action` field.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.header.get("action")
    }

    /// Contents of the first `## <title>` body section matching any of
    /// `titles`, trimmed. Empty sections yield `None`.
    #[must_use]
    pub fn section(&self, titles: &[&str]) -> Option<String> {
        if titles.is_empty() {
            return None;
        }
        let alternatives = titles
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?ms)^##[ \t]+(?:{alternatives})[ \t]*\r?\n(.*?)(?:^##[ \t]|\z)");
        let re = Regex::new(&pattern).ok()?;
        let captured = re.captures(&self.body)?.get(1)?.as_str().trim();
        (!captured.is_empty()).then(|| captured.to_owned())
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
