//! Line-oriented text document that round-trips byte for byte.

/// Ordered lines of one remote file, each keeping its own terminator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    lines: Vec<String>,
}

/// Split a raw line into body and terminator (`\r\n`, `\n` or nothing).
pub(crate) fn split_terminator(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line bodies without terminators.
    pub fn bodies(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|raw| split_terminator(raw).0)
    }

    /// Body of the 1-based line `number`.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(|raw| split_terminator(raw).0)
    }

    /// Replace the body of the 1-based line `number`, keeping its terminator.
    /// Returns false when the line does not exist.
    pub fn set_line(&mut self, number: usize, body: &str) -> bool {
        let Some(raw) = number
            .checked_sub(1)
            .and_then(|idx| self.lines.get_mut(idx))
        else {
            return false;
        };
        let terminator = split_terminator(raw).1;
        *raw = format!("{body}{terminator}");
        true
    }

    pub fn to_text(&self) -> String {
        self.lines.concat()
    }
}

impl std::fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for raw in &self.lines {
            f.write_str(raw)?;
        }
        Ok(())
    }
}
