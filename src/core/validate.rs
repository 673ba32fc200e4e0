//! SZ-007: Structural validation — the stack machine without execution.
//!
//! Checks lexing, subindent consistency, directive names per scope and option
//! placement. Every top-level stanza passes through here before any of it
//! runs, in-process or in a worker; `stanza validate` runs it over whole files.

use super::parser::{lex_line, parse_file_option, LineKind, ParseError, ScriptLine, SourceLine};
use super::registry::{Registry, ROOT_SCOPE};
use super::stack::ExecutionStack;

/// Subindent mismatch against the active unit.
pub fn indent_error(file: &str, line: &ScriptLine, expected: usize) -> ParseError {
    ParseError::new(
        file,
        line.number,
        format!(
            "inconsistent indentation: expected column {}, found column {}",
            expected, line.indent
        ),
    )
}

/// Option line after its unit already opened a nested directive.
pub fn option_after_nested(file: &str, line: &ScriptLine, name: &str, unit: &str) -> ParseError {
    ParseError::new(
        file,
        line.number,
        format!(
            "option '{}' must come before the nested directives of '{}'",
            name, unit
        ),
    )
}

/// Validate `lines` as if they were a whole file. Returns the number of directives seen.
pub fn check_structure(
    file: &str,
    registry: &Registry,
    lines: &[SourceLine],
) -> Result<usize, ParseError> {
    // (name, nested scope) per open directive
    let mut stack: ExecutionStack<(String, Option<&'static str>)> = ExecutionStack::new();
    let mut directives = 0;

    for source in lines {
        let Some(line) = lex_line(file, source)? else {
            continue;
        };
        while stack.pop_at_or_above(line.indent).is_some() {}
        stack
            .bind_subindent(line.indent)
            .map_err(|expected| indent_error(file, &line, expected))?;

        match &line.kind {
            LineKind::Option { name, value } => match stack.top() {
                None => {
                    parse_file_option(name, value)
                        .map_err(|m| ParseError::new(file, line.number, m))?;
                }
                Some(frame) if frame.nested => {
                    return Err(option_after_nested(file, &line, name, &frame.item.0));
                }
                Some(_) => {}
            },
            LineKind::Directive { name, .. } => {
                let scope = stack.top().map_or(Some(ROOT_SCOPE), |f| f.item.1);
                let spec = registry
                    .lookup(scope, name)
                    .map_err(|m| ParseError::new(file, line.number, m))?;
                stack.push(line.indent, (name.clone(), spec.children));
                directives += 1;
            }
        }
    }
    Ok(directives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::source_lines;
    use crate::core::testing::probe_registry;

    fn check(text: &str) -> Result<usize, ParseError> {
        check_structure("t.stz", &probe_registry(), &source_lines(text))
    }

    #[test]
    fn test_sz007_valid_nesting() {
        let text = "\
maxjobs = 2
probe a
  k = v
  probe b
    scripted ok
  scripted ok
probe c
";
        assert_eq!(check(text), Ok(5));
    }

    #[test]
    fn test_sz007_unknown_directive() {
        let err = check("probe a\n  bogus x\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unknown directive 'bogus'"));
    }

    #[test]
    fn test_sz007_nested_under_leaf() {
        let err = check("scripted ok\n  probe x\n").unwrap_err();
        assert!(err.message.contains("accepts no nested directives"));
    }

    #[test]
    fn test_sz007_sibling_indent_mismatch() {
        let err = check("probe a\n    probe b\n  probe c\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("expected column 4, found column 2"));
    }

    #[test]
    fn test_sz007_top_level_indent_mismatch() {
        let err = check("  probe a\nprobe b\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_sz007_option_between_levels_rejected() {
        let text = "probe a\n    probe b\n  k = v\n";
        let err = check(text).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("inconsistent indentation"));
    }

    #[test]
    fn test_sz007_option_after_nested() {
        let err = check("probe a\n  probe b\n  k = v\n").unwrap_err();
        assert!(err.message.contains("must come before the nested directives of 'probe'"));
    }

    #[test]
    fn test_sz007_tabs_match_spaces() {
        assert_eq!(check("probe a\n\tprobe b\n        probe c\n"), Ok(3));
    }

    #[test]
    fn test_sz007_bad_file_option() {
        let err = check("maxjobs = none\n").unwrap_err();
        assert!(err.message.contains("maxjobs"));
        let err = check("colour = red\n").unwrap_err();
        assert!(err.message.contains("unknown file option"));
    }

    #[test]
    fn test_sz007_blank_and_comments_ignored() {
        assert_eq!(check("# header\n\nprobe a   # trailing\n\n  # nested comment\n"), Ok(1));
    }
}
