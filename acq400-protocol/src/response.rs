/// One reply line from a site control service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Knob value or acknowledgement (possibly empty).
    Value(String),
    /// `ERROR ...` reply; carries the text after the keyword.
    Error(String),
}

impl Reply {
    /// Parse a single reply line. Trailing `\r\n` is stripped.
    pub fn parse_line(line: &str) -> Self {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if let Some(head) = line.get(..5)
            && head.eq_ignore_ascii_case("ERROR")
        {
            let description = line[5..].trim_start_matches(':').trim();
            return Self::Error(description.to_owned());
        }

        Self::Value(line.trim().to_owned())
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Value(value) => format!("{value}\n").into_bytes(),
            Self::Error(description) if description.is_empty() => b"ERROR\n".to_vec(),
            Self::Error(description) => format!("ERROR: {description}\n").into_bytes(),
        }
    }

    pub fn into_result(self) -> std::result::Result<String, String> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
        }
    }
}
