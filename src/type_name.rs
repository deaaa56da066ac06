//! Canonical source-level type names.
//!
//! Pure function of the type reference; called on every emission, cheap
//! enough that no caching is warranted.

use crate::universe::TypeRef;

/// `bool` / `int` / `double` / `string`, `<elem>[]` for arrays, the declared
/// identifier (with rendered generic arguments) for named types.
pub fn render(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Bool => "bool".to_string(),
        TypeRef::Int => "int".to_string(),
        TypeRef::Float => "double".to_string(),
        TypeRef::Str => "string".to_string(),
        TypeRef::Array(elem) => format!("{}[]", render(elem)),
        TypeRef::Named { name, args } => {
            if args.is_empty() {
                name.clone()
            } else {
                let rendered: Vec<String> = args.iter().map(render).collect();
                format!("{}<{}>", name, rendered.join(","))
            }
        }
    }
}

/// Inverse of [`render`] for the names the engine itself emits. Returns
/// `None` for anything outside that closed grammar.
pub fn parse(text: &str) -> Option<TypeRef> {
    let text = text.trim();
    if let Some(elem) = text.strip_suffix("[]") {
        return Some(TypeRef::array(parse(elem)?));
    }
    match text {
        "bool" => return Some(TypeRef::Bool),
        "int" => return Some(TypeRef::Int),
        "double" => return Some(TypeRef::Float),
        "string" => return Some(TypeRef::Str),
        _ => {}
    }
    if let Some(open) = text.find('<') {
        let name = &text[..open];
        let inner = text.strip_suffix('>')?.get(open + 1..)?;
        let mut args = Vec::new();
        for part in split_top_level(inner) {
            args.push(parse(part)?);
        }
        if name.is_empty() || args.is_empty() {
            return None;
        }
        return Some(TypeRef::Named { name: name.to_string(), args });
    }
    if !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Some(TypeRef::named(text));
    }
    None
}

/// Split `a,B<c,d>,e` on commas that are not nested inside `<>`.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
