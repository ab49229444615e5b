//! Short unique codes for states.

use std::collections::HashSet;

/// First two ASCII letters, uppercased; padded with `X` for very short names.
pub fn base_code(name: &str) -> String {
    let mut code: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(2)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while code.len() < 2 {
        code.push('X');
    }
    code
}

/// Assigns a code to each name, in order. A taken code (by `taken` or an
/// earlier assignment) gets a numeric suffix `1`, `2`, ... until unique.
pub fn assign_state_codes(names: &[String], taken: &HashSet<String>) -> Vec<(String, String)> {
    let mut used: HashSet<String> = taken.clone();
    let mut assigned = Vec::with_capacity(names.len());
    for name in names {
        let base = base_code(name);
        let mut code = base.clone();
        let mut suffix = 1;
        while used.contains(&code) {
            code = format!("{base}{suffix}");
            suffix += 1;
        }
        used.insert(code.clone());
        assigned.push((name.clone(), code));
    }
    assigned
}
