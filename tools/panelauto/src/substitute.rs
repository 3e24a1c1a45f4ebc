use crate::errors::PanelAutoError;
use crate::variables::VariableStore;
use regex::Regex;

const REFERENCE_PATTERN: &str = r"\$\$|\$\{([^{}]*)\}|\$([A-Za-z0-9_.\-]+)";

/// Expand `${name}` and `$name` references in `value` against the current store.
///
/// `$$` yields a literal `$`, and a `$` followed by anything that cannot
/// start a reference is kept as-is. An unknown, empty or unterminated
/// reference is an error; placeholder text is never emitted. `key` is only
/// used for error context.
pub fn substitute(key: &str, value: &str, store: &VariableStore) -> Result<String, PanelAutoError> {
    if !value.contains('$') {
        return Ok(value.to_string());
    }
    let failure = |reason: String| PanelAutoError::Substitution {
        key: key.to_string(),
        reason,
    };
    let regex = Regex::new(REFERENCE_PATTERN).map_err(|e| failure(e.to_string()))?;

    let mut output = String::with_capacity(value.len());
    let mut last_index = 0usize;
    for captures in regex.captures_iter(value) {
        let Some(full) = captures.get(0) else {
            continue;
        };
        let literal = &value[last_index..full.start()];
        if literal.contains("${") {
            return Err(failure(format!("unterminated reference in `{value}`")));
        }
        output.push_str(literal);
        match captures.get(1).or_else(|| captures.get(2)) {
            None => output.push('$'),
            Some(name) if name.as_str().is_empty() => {
                return Err(failure("empty reference `${}`".to_string()));
            }
            Some(name) => {
                let resolved = store
                    .get(name.as_str())
                    .ok_or_else(|| failure(format!("unknown variable `{}`", name.as_str())))?;
                output.push_str(resolved);
            }
        }
        last_index = full.end();
    }
    let tail = &value[last_index..];
    if tail.contains("${") {
        return Err(failure(format!("unterminated reference in `{value}`")));
    }
    output.push_str(tail);
    Ok(output)
}

/// Quote `value` so that `substitute` gives it back unchanged.
pub fn escape_literal(value: &str) -> String {
    value.replace('$', "$$")
}
