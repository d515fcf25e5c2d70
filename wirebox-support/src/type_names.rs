//! Parsing of `std::any::type_name` output.
//!
//! The container identifies open generic definitions by the path of a type
//! with its type arguments stripped, e.g. `app::Handler<i32>` and
//! `app::Handler<String>` both belong to the definition `app::Handler` with
//! arity 1.

/// Splits a type name into its definition path and generic arity.
///
/// A leading `dyn ` is dropped so that trait objects and their definitions
/// compare by trait path.
///
/// # Examples
/// ```
/// use wirebox_support::type_names::generic_definition;
///
/// assert_eq!(generic_definition("app::Handler<i32>"), ("app::Handler", 1));
/// assert_eq!(generic_definition("dyn app::Map<u8, alloc::string::String>"), ("app::Map", 2));
/// assert_eq!(generic_definition("app::Plain"), ("app::Plain", 0));
/// ```
pub fn generic_definition(full_name: &str) -> (&str, usize) {
    let name = full_name.strip_prefix("dyn ").unwrap_or(full_name);

    match name.find('<') {
        Some(open) => (&name[..open], type_arguments(name).len()),
        None => (name, 0),
    }
}

/// Returns the top-level type arguments of a generic type name.
///
/// ```
/// use wirebox_support::type_names::type_arguments;
///
/// let args = type_arguments("app::Map<app::Key<u8>, (i32, i64)>");
/// assert_eq!(args, vec!["app::Key<u8>", "(i32, i64)"]);
/// ```
pub fn type_arguments(full_name: &str) -> Vec<&str> {
    let Some(open) = full_name.find('<') else {
        return Vec::new();
    };
    let Some(close) = full_name.rfind('>') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }

    let inner = &full_name[open + 1..close];
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut prev = '\0';

    for (i, ch) in inner.char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            // The `>` of a `fn(..) -> R` arrow closes nothing.
            '>' if prev == '-' => {}
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        prev = ch;
    }

    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }
    args
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use wirebox_support::type_names::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("dyn my_app::handlers::Handler<my_app::Order>");
/// assert_eq!(short, "dyn Handler<Order>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                current_segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => current_segment.push(ch),
        }
    }

    result.push_str(&current_segment);
    result
}
