//! Error types for the symbol table

/// Errors raised by scope operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The name is already declared in the current scope
    #[error("duplicate symbol `{name}` in scope `{scope}`")]
    DuplicateSymbol {
        /// The redeclared name
        name: String,
        /// Name of the scope holding the first declaration
        scope: String,
    },

    /// The left side of a qualified name does not resolve
    #[error("undefined name `{0}`")]
    Undefined(String),

    /// The left side of a qualified name has no fields
    #[error("`{0}` is not a structure")]
    NotAStructure(String),

    /// The structure has no such field
    #[error("`{owner}` has no field `{field}`")]
    FieldNotFound {
        /// Structure name
        owner: String,
        /// Requested field
        field: String,
    },

    /// A field lookup on a name without a `.`
    #[error("`{0}` is not a qualified name")]
    NotQualified(String),

    /// Popping the root scope
    #[error("cannot leave the root scope")]
    PopRoot,
}

/// Names among `candidates` close to `name`, nearest first
pub fn suggestions<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut scored: Vec<(&str, usize)> = candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .map(|candidate| (candidate, levenshtein_distance(name, candidate)))
        .filter(|(candidate, distance)| {
            *distance <= 2 && *distance < candidate.len().max(name.len())
        })
        .collect();

    scored.sort_by(|left, right| left.1.cmp(&right.1).then_with(|| left.0.cmp(right.0)));
    scored.dedup_by(|left, right| left.0 == right.0);
    scored
        .into_iter()
        .take(3)
        .map(|(candidate, _)| candidate.to_string())
        .collect()
}

/// Edit distance between two strings
fn levenshtein_distance(source: &str, target: &str) -> usize {
    let target_chars: Vec<char> = target.chars().collect();
    let mut previous: Vec<usize> = (0..=target_chars.len()).collect();
    let mut current = vec![0; target_chars.len() + 1];

    for (row, source_char) in source.chars().enumerate() {
        current[0] = row + 1;
        for (column, target_char) in target_chars.iter().enumerate() {
            let cost = usize::from(source_char != *target_char);
            current[column + 1] = (previous[column + 1] + 1)
                .min(current[column] + 1)
                .min(previous[column] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[target_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggestions_are_close_names_only() {
        let found = suggestions("count", ["counter", "cont", "total", "count"]);
        assert_eq!(found, vec!["cont".to_string(), "counter".to_string()]);
    }
}
