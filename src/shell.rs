// Shell text helpers: argument quoting and block indentation

use std::borrow::Cow;

const INDENT: &str = "  ";

/// True when `value` can appear in a shell command as a bare word.
///
/// Safe characters are ASCII alphanumerics plus `.`, `_`, `/` and `-`.
/// The empty string is not safe, since a bare empty word vanishes.
pub fn is_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
}

/// Render `value` as exactly one literal shell word.
///
/// Safe values pass through untouched. Anything else is single-quoted, with
/// embedded single quotes written as `\'`. Newlines and carriage returns are
/// written as bash `$'\n'` and `$'\r'` segments, so a quoted word never spans
/// lines and block indentation cannot leak into it.
pub fn quote(value: &str) -> Cow<'_, str> {
    if is_safe(value) {
        return Cow::Borrowed(value);
    }
    if value.is_empty() {
        return Cow::Borrowed("''");
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    let mut open = false;
    for c in value.chars() {
        let escaped = match c {
            '\n' => "$'\\n'",
            '\r' => "$'\\r'",
            '\'' => "\\'",
            _ => {
                if !open {
                    quoted.push('\'');
                    open = true;
                }
                quoted.push(c);
                continue;
            }
        };
        if open {
            quoted.push('\'');
            open = false;
        }
        quoted.push_str(escaped);
    }
    if open {
        quoted.push('\'');
    }
    Cow::Owned(quoted)
}

/// Prefix every line of `block` with one indent level.
pub fn indent(block: &str) -> String {
    block
        .split('\n')
        .map(|line| format!("{INDENT}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn safe_values_are_unchanged() {
        for value in ["ls", "-la", "/tmp", "file_1.txt", "a-b/c.d", "X9"] {
            assert_eq!(quote(value), value);
        }
    }

    #[test]
    fn unsafe_values_are_single_quoted() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("hello world"), "'hello world'");
        assert_eq!(quote("; rm -rf /"), "'; rm -rf /'");
        assert_eq!(quote("$HOME"), "'$HOME'");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("*.txt"), "'*.txt'");
    }

    #[test]
    fn quoted_values_survive_a_real_shell() {
        let values = [
            "",
            "plain",
            "two words",
            "it's",
            "'",
            "''",
            "; rm -rf /",
            "$(id) `id` $HOME",
            "a\"b\\c",
            "line\nbreak",
            "crlf\r\nline",
            "\n",
            "it's\nmultiline 'quoted'",
            "tab\there & | > < * ? [ ] { } ~ # !",
        ];

        for value in values {
            let script = format!("printf '%s' {}", quote(value));
            let output = Command::new("bash")
                .arg("-c")
                .arg(&script)
                .output()
                .expect("bash should be available");
            assert!(output.status.success(), "script failed: {script}");
            assert_eq!(String::from_utf8_lossy(&output.stdout), value);
        }
    }

    #[test]
    fn line_breaks_stay_on_one_line() {
        assert_eq!(quote("a\nb"), "'a'$'\\n''b'");
        assert_eq!(quote("\r\n"), "$'\\r'$'\\n'");
        assert!(!quote("x\ny\rz").contains(['\n', '\r']));
    }

    #[test]
    fn indent_prefixes_each_line() {
        assert_eq!(indent("echo a"), "  echo a");
        assert_eq!(indent("if x\n  y\nfi"), "  if x\n    y\n  fi");
        assert_eq!(indent("a\r\nb"), "  a\r\n  b");
    }
}
