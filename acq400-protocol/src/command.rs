use crate::error::{ProtocolError, Result};

/// A single request line on a site control service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KnobCommand {
    /// `NAME`: read a knob.
    Query { name: String },
    /// `NAME=VALUE`: write a knob.
    Set { name: String, value: String },
    /// Verbatim line (`help`, `*RESET=1`, `prompt off`, ...).
    Raw(String),
}

impl KnobCommand {
    pub fn query(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self::Query {
            name: name.to_owned(),
        })
    }

    pub fn set(name: &str, value: impl ToString) -> Result<Self> {
        validate_name(name)?;
        let value = value.to_string();
        if value.contains('\n') {
            return Err(ProtocolError::InvalidValue {
                knob: name.to_owned(),
                value,
            });
        }
        Ok(Self::Set {
            name: name.to_owned(),
            value,
        })
    }

    /// Parse a request line as received by a site service.
    ///
    /// The line should NOT include the trailing `\n`.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r').trim();
        if line.is_empty() {
            return Err(ProtocolError::InvalidCommand("empty command".into()));
        }

        if line.contains(char::is_whitespace) {
            return Ok(Self::Raw(line.to_owned()));
        }

        match line.split_once('=') {
            Some((name, value)) => Self::set(name, value),
            None => Self::query(line),
        }
    }

    /// Serialize to one wire line including the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Query { name } => format!("{name}\n"),
            Self::Set { name, value } => format!("{name}={value}\n"),
            Self::Raw(text) => format!("{text}\n"),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '=') {
        return Err(ProtocolError::InvalidCommand(format!(
            "invalid knob name: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_line() {
        let cmd = KnobCommand::query("NCHAN").unwrap();
        assert_eq!(cmd.to_line(), "NCHAN\n");
    }

    #[test]
    fn set_line_formats_numbers() {
        let cmd = KnobCommand::set("SIG_CLK_MB_SET", 4_000_000).unwrap();
        assert_eq!(cmd.to_line(), "SIG_CLK_MB_SET=4000000\n");
    }

    #[test]
    fn invalid_names() {
        assert!(KnobCommand::query("").is_err());
        assert!(KnobCommand::query("A B").is_err());
        assert!(KnobCommand::set("A=B", 1).is_err());
        assert!(KnobCommand::set("A", "x\ny").is_err());
    }

    #[test]
    fn parse_query_and_set() {
        assert_eq!(
            KnobCommand::parse("MODEL\n").unwrap(),
            KnobCommand::Query {
                name: "MODEL".into()
            }
        );
        assert_eq!(
            KnobCommand::parse("CLKDIV=4").unwrap(),
            KnobCommand::Set {
                name: "CLKDIV".into(),
                value: "4".into()
            }
        );
        assert_eq!(
            KnobCommand::parse("*RESET=1").unwrap(),
            KnobCommand::Set {
                name: "*RESET".into(),
                value: "1".into()
            }
        );
    }

    #[test]
    fn parse_raw_with_spaces() {
        assert_eq!(
            KnobCommand::parse("prompt off").unwrap(),
            KnobCommand::Raw("prompt off".into())
        );
        assert!(KnobCommand::parse("   ").is_err());
    }

    #[test]
    fn set_with_empty_value_roundtrips() {
        let cmd = KnobCommand::parse("SIG_SRC_TRG_0=").unwrap();
        assert_eq!(cmd.to_line(), "SIG_SRC_TRG_0=\n");
    }
}
