//! Name similarity used for fuzzy node lookup.

const PREFIXES: &[&str] = &["get", "set", "is", "has", "on", "handle"];
const SUFFIXES: &[&str] = &[
    "Component",
    "Container",
    "View",
    "Page",
    "Screen",
    "Handler",
    "Util",
    "Helper",
];

/// Two names are similar when their normalized forms are equal, one
/// contains the other, or their edit distance is under a third of the
/// longer normalized length.
pub fn are_names_similar(left: &str, right: &str) -> bool {
    let right = match right.split_once(':') {
        Some((_, name)) => name,
        None => right,
    };

    let left = normalize(left);
    let right = normalize(right);

    if left == right {
        return true;
    }
    if left.is_empty() || right.is_empty() {
        return false;
    }
    if left.contains(&right) || right.contains(&left) {
        return true;
    }

    let longest = left.chars().count().max(right.chars().count());
    levenshtein(&left, &right) * 3 < longest
}

/// Strips one known prefix (when followed by a non-lowercase character)
/// and one known suffix.
pub fn normalize(name: &str) -> String {
    let mut result = name.to_string();

    for prefix in PREFIXES {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let mut chars = rest.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if first.is_lowercase() {
            continue;
        }
        result = first.to_lowercase().chain(chars).collect();
        break;
    }

    for suffix in SUFFIXES {
        if let Some(stripped) = result.strip_suffix(suffix) {
            result = stripped.to_string();
            break;
        }
    }

    result
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
