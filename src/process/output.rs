//! gost writes routing and connection events to stderr. This sorts the
//! routine ones from the real errors.

use crate::events::LogLevel;
use crate::process::types::OutputStream;

pub const ERROR_PREFIX: &str = "error: ";

/// A line is routine if it contains the tag and at least one of the markers.
const ROUTINE_PATTERNS: &[(&str, &[&str])] = &[
    ("route.go:700:", &["on [::]:"]),
    ("[http]", &["->", "<->"]),
    ("[route]", &["->"]),
    ("[tcp]", &["->", "<->"]),
];

pub fn is_informational(line: &str) -> bool {
    ROUTINE_PATTERNS.iter().any(|(tag, markers)| {
        line.contains(tag) && markers.iter().any(|marker| line.contains(marker))
    })
}

/// Level and final text for one line of child output, or `None` if blank.
pub fn classify(stream: OutputStream, line: &str) -> Option<(LogLevel, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match stream {
        OutputStream::Stdout => Some((LogLevel::Info, line.to_string())),
        OutputStream::Stderr if is_informational(line) => Some((LogLevel::Info, line.to_string())),
        OutputStream::Stderr => Some((LogLevel::Error, format!("{ERROR_PREFIX}{line}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_stderr_lines() {
        let routine = [
            "2024/05/01 10:00:00 route.go:700: auto://:8080 on [::]:8080",
            "2024/05/01 10:00:01 http.go:162: [http] 127.0.0.1:53211 -> auto://:8080 -> example.com:443",
            "2024/05/01 10:00:01 http.go:162: [http] 127.0.0.1:53211 <-> example.com:443",
            "[route] 127.0.0.1:50000 -> http://10.0.0.1:3128 -> example.com:80",
            "[tcp] 127.0.0.1:40000 <-> 10.0.0.5:22",
        ];
        for line in routine {
            assert!(is_informational(line), "{line}");
        }
    }

    #[test]
    fn real_errors() {
        let errors = [
            "listen tcp :8080: bind: address already in use",
            "route.go:700: auto://:8080",
            "[http] 127.0.0.1:53211 dial timeout",
            "[tcp] connection refused",
            "[route] unreachable",
        ];
        for line in errors {
            assert!(!is_informational(line), "{line}");
        }
    }

    #[test]
    fn stderr_errors_get_prefixed() {
        assert_eq!(
            classify(OutputStream::Stderr, "bind: address already in use\n"),
            Some((LogLevel::Error, "error: bind: address already in use".into()))
        );
    }

    #[test]
    fn stdout_is_never_an_error() {
        assert_eq!(
            classify(OutputStream::Stdout, "bind: address already in use"),
            Some((LogLevel::Info, "bind: address already in use".into()))
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert_eq!(classify(OutputStream::Stderr, "   \r"), None);
        assert_eq!(classify(OutputStream::Stdout, ""), None);
    }
}
