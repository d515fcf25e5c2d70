//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format dependency chains, lifestyle chains,
//! candidate lists and "did you mean?" suggestions.

use crate::type_names::shorten_type_name;

/// Renders a dependency chain as a readable string.
///
/// # Examples
/// ```
/// use wirebox_support::rendering::render_chain;
///
/// let chain = vec!["app::UserService", "app::UserRepo", "app::UserService"];
/// assert_eq!(render_chain(&chain), "UserService → UserRepo → UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| shorten_type_name(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a comma separated list of short type names.
///
/// ```
/// use wirebox_support::rendering::render_list;
///
/// assert_eq!(render_list(&["a::First", "b::Second"]), "First, Second");
/// ```
pub fn render_list(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|s| shorten_type_name(s.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// An entry in a lifestyle chain for vertical rendering.
#[derive(Debug)]
pub struct ChainEntry {
    /// Full type name of the component.
    pub type_name: String,
    /// Lifestyle name (e.g. "Singleton", "Scoped").
    pub lifestyle: String,
}

/// Renders a consumer → dependency chain annotated with lifestyles.
///
/// ```text
/// [Singleton] ReportService
///             ↓
/// [Scoped]    UnitOfWork
/// ```
pub fn render_lifestyle_chain(entries: &[ChainEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.lifestyle.len())
        .max()
        .unwrap_or(0);

    let mut result = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            result.push_str(&" ".repeat(width + 3));
            result.push_str("↓\n");
        }
        result.push_str(&format!(
            "[{:<width$}] {}\n",
            entry.lifestyle,
            shorten_type_name(&entry.type_name),
        ));
    }
    result
}

/// Generates "did you mean?" suggestions based on registered type names.
///
/// Exact substring matches rank first, then short-name matches, then
/// names sharing a common prefix of at least three characters.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();
            let name_short = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short) || requested_short.contains(&name_short) {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}
