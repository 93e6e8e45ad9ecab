/// Shell quoting for values interpolated into remote commands.
///
/// Everything jroll runs remotely is a string handed to `ssh`, so any
/// config- or discovery-supplied value spliced into it must be quoted.
/// Configured compress/decompress filters are the exception: those are
/// full shell pipelines and are spliced raw.

/// Escape a string for safe use in a POSIX shell command.
///
/// Values made only of characters that never need quoting are returned
/// as-is; everything else is wrapped in single quotes, with embedded
/// single quotes rendered as `'\''`.
pub fn escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    let plain = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':'));
    if plain {
        return s.to_string();
    }

    let mut quoted = String::with_capacity(s.len() + 8);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(escape("web-1"), "web-1");
        assert_eq!(escape("/usr/jails/web-1"), "/usr/jails/web-1");
        assert_eq!(escape("jroll.2024-01-01.00:00:00"), "jroll.2024-01-01.00:00:00");
    }

    #[test]
    fn snapshot_references_get_quoted() {
        assert_eq!(
            escape("tank/jails/web@jroll.2024-01-01.00:00:00"),
            "'tank/jails/web@jroll.2024-01-01.00:00:00'"
        );
    }

    #[test]
    fn empty_is_quoted() {
        assert_eq!(escape(""), "''");
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn hostile_values_are_neutralized() {
        assert_eq!(escape("; rm -rf /"), "'; rm -rf /'");
        assert_eq!(escape("$(whoami)"), "'$(whoami)'");
        assert_eq!(escape("a && b"), "'a && b'");
    }
}
