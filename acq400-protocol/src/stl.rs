//! Sequenced timeline (STL) script handling.

/// Returns the lines of an STL script that are sent to the appliance.
///
/// Lines shorter than two characters and `#` comments are skipped.
pub fn stl_lines(stl: &str) -> impl Iterator<Item = &str> {
    stl.split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| l.len() >= 2 && !l.starts_with('#'))
}

/// Terminator sent after the last STL line.
pub const STL_EOF: &str = "EOF";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comments() {
        let stl = "# header\n0,1\n\n+100,0\n#note\nx\n2000,3\n";
        let lines: Vec<_> = stl_lines(stl).collect();
        assert_eq!(lines, vec!["0,1", "+100,0", "2000,3"]);
    }

    #[test]
    fn handles_crlf() {
        let lines: Vec<_> = stl_lines("10,1\r\n20,0\r\n").collect();
        assert_eq!(lines, vec!["10,1", "20,0"]);
    }
}
