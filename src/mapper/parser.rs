use super::{MapperError, MappingRule};
use regex::Regex;

/// Parse the line-oriented mapping config.
///
/// Each rule line is `<pattern> -> <label>`. Patterns are globs: `*` matches
/// any run of characters, everything else is literal, and the whole pattern
/// is anchored. Lines starting with `#` and blank lines are skipped. Rules
/// keep file order; classification applies the first matching rule.
pub fn parse_rules(content: &str) -> Result<Vec<MappingRule>, MapperError> {
    let mut rules = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((pattern, label)) = line.split_once("->") else {
            return Err(MapperError::Parse {
                line: line_no,
                reason: format!("expected '<pattern> -> <label>', got '{}'", line),
            });
        };

        let pattern = pattern.trim();
        let label = label.trim();
        if pattern.is_empty() {
            return Err(MapperError::Parse {
                line: line_no,
                reason: "empty pattern".to_string(),
            });
        }
        if label.is_empty() {
            return Err(MapperError::Parse {
                line: line_no,
                reason: "empty label".to_string(),
            });
        }

        let regex = glob_to_regex(pattern).map_err(|e| MapperError::Parse {
            line: line_no,
            reason: format!("invalid pattern '{}': {}", pattern, e),
        })?;

        rules.push(MappingRule {
            pattern: pattern.to_string(),
            regex,
            label: label.to_string(),
        });
    }

    Ok(rules)
}

/// Compile a glob pattern into an anchored regex. Only `*` is special.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 4);
    expr.push('^');
    for (i, part) in pattern.split('*').enumerate() {
        if i > 0 {
            expr.push_str(".*");
        }
        expr.push_str(&regex::escape(part));
    }
    // A trailing '*' leaves an empty last part, so the wildcard it expanded
    // to already sits at the end of the expression.
    expr.push('$');
    Regex::new(&expr)
}
