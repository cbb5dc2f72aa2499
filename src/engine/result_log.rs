//! NUnit result log access
//!
//! The console rewrites the same `TestResult.xml` after every run, so the log
//! is read fresh after each attempt and never cached.

use std::path::Path;

const FAILURE_MARKER: &str = "<failure>";
const MESSAGE_PREFIX: &str = "<message>";

#[derive(Debug, thiserror::Error)]
pub enum ResultLogError {
    #[error("test result not exist at: {0}")]
    NotFound(String),

    #[error("Failed to read file ({path}), error: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read the whole result log as text.
///
/// Bytes that are not valid UTF-8 are replaced, never treated as a read error.
pub fn read_result_log(path: &Path) -> Result<String, ResultLogError> {
    let exists = path.try_exists().map_err(|source| ResultLogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if !exists {
        return Err(ResultLogError::NotFound(path.display().to_string()));
    }

    let bytes = std::fs::read(path).map_err(|source| ResultLogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Remove a log left behind by an earlier console run.
pub fn clear_result_log(path: &Path) -> Result<(), ResultLogError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ResultLogError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Last `<message>` line that directly follows a `<failure>` line.
///
/// Lines are trimmed before comparison. The marker only counts for the very
/// next line, so a blank line between the two drops the message. Returns an
/// empty string when nothing matched.
pub fn last_failure_message(content: &str) -> String {
    let mut after_failure = false;
    let mut last_message = "";

    for line in content.lines() {
        let line = line.trim();

        if line == FAILURE_MARKER {
            after_failure = true;
            continue;
        }

        if after_failure && line.starts_with(MESSAGE_PREFIX) {
            last_message = line;
        }

        after_failure = false;
    }

    last_message.to_string()
}

/// Plain text of a `<message>` line, without the tags or a CDATA wrapper.
pub fn strip_message_tags(line: &str) -> &str {
    let text = line.trim();
    let text = text.strip_prefix(MESSAGE_PREFIX).unwrap_or(text);
    let text = text.strip_suffix("</message>").unwrap_or(text);
    let text = text.trim();
    let text = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FAILED_LOG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<test-run id="2" result="Failed">
  <test-case name="AppLaunches" result="Failed">
    <failure>
      <message>Element not found</message>
      <stack-trace>at UITests.Tests.AppLaunches()</stack-trace>
    </failure>
  </test-case>
</test-run>
"#;

    #[test]
    fn test_no_failure_marker() {
        let log = "<test-run result=\"Passed\">\n<message>not a failure</message>\n</test-run>";
        assert_eq!(last_failure_message(log), "");
        assert_eq!(last_failure_message(""), "");
    }

    #[test]
    fn test_failure_followed_by_message() {
        assert_eq!(
            last_failure_message(FAILED_LOG),
            "<message>Element not found</message>"
        );
    }

    #[test]
    fn test_last_message_wins() {
        let log = "<failure>\n<message>first</message>\n</failure>\n<failure>\n  <message>second</message>\n</failure>";
        assert_eq!(last_failure_message(log), "<message>second</message>");
    }

    #[test]
    fn test_marker_must_be_immediately_followed() {
        let blank_between = "<failure>\n\n<message>lost</message>";
        assert_eq!(last_failure_message(blank_between), "");

        let other_line_between = "<failure>\n<stack-trace/>\n<message>lost</message>";
        assert_eq!(last_failure_message(other_line_between), "");
    }

    #[test]
    fn test_later_unpaired_marker_keeps_previous_message() {
        let log = "<failure>\n<message>kept</message>\n<failure>\n<stack-trace/>";
        assert_eq!(last_failure_message(log), "<message>kept</message>");
    }

    #[test]
    fn test_strip_message_tags() {
        assert_eq!(
            strip_message_tags("<message>Element not found</message>"),
            "Element not found"
        );
        assert_eq!(
            strip_message_tags("<message><![CDATA[Timed out waiting]]></message>"),
            "Timed out waiting"
        );
        assert_eq!(strip_message_tags("<message>unterminated"), "unterminated");
    }

    #[test]
    fn test_read_missing_log() {
        let dir = tempdir().unwrap();
        let err = read_result_log(&dir.path().join("TestResult.xml")).unwrap_err();
        assert!(matches!(err, ResultLogError::NotFound(_)));
    }

    #[test]
    fn test_read_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read_result_log(dir.path()).unwrap_err();
        assert!(matches!(err, ResultLogError::Io { .. }));
    }

    #[test]
    fn test_read_is_repeatable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TestResult.xml");
        std::fs::write(&path, FAILED_LOG).unwrap();

        let first = read_result_log(&path).unwrap();
        let second = read_result_log(&path).unwrap();
        assert_eq!(first, FAILED_LOG);
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_keeps_invalid_utf8_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TestResult.xml");
        std::fs::write(&path, b"<failure>\n<message>Caf\xE9 not found</message>\n").unwrap();

        let content = read_result_log(&path).unwrap();
        assert_eq!(
            last_failure_message(&content),
            "<message>Caf\u{FFFD} not found</message>"
        );
    }

    #[test]
    fn test_clear_result_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TestResult.xml");
        std::fs::write(&path, FAILED_LOG).unwrap();

        clear_result_log(&path).unwrap();
        assert!(!path.exists());
        // already gone
        clear_result_log(&path).unwrap();
    }
}
