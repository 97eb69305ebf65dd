use serde_json::Value as JsonValue;

use super::parser::{Cond, Node};

/// Repeat bindings, innermost last.
struct Scope<'a> {
    root: &'a JsonValue,
    bindings: Vec<(&'a str, &'a JsonValue)>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, path: &[String]) -> Option<&'a JsonValue> {
        let (first, rest) = path.split_first()?;
        let mut cur = match self.bindings.iter().rev().find(|(name, _)| *name == first.as_str()) {
            Some((_, v)) => *v,
            None => self.root.get(first.as_str())?,
        };
        for seg in rest {
            cur = match cur {
                JsonValue::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
                other => other.get(seg.as_str())?,
            };
        }
        Some(cur)
    }
}

pub fn escape_html(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn truthy(v: Option<&JsonValue>) -> bool {
    match v {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(a)) => !a.is_empty(),
        Some(JsonValue::Object(o)) => !o.is_empty(),
    }
}

fn scalar_text(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn eval(cond: &Cond, scope: &Scope<'_>) -> bool {
    match cond {
        Cond::Truthy(path) => truthy(scope.lookup(path)),
        Cond::Equals(path, literal) => scope.lookup(path).and_then(scalar_text).as_deref() == Some(literal.as_str()),
    }
}

fn render_nodes<'a>(nodes: &'a [Node], scope: &mut Scope<'a>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push_str(text),
            Node::Var(path) => {
                if let Some(text) = scope.lookup(path).and_then(scalar_text) {
                    escape_html(&text, out);
                }
            }
            Node::If { cond, negate, then, otherwise } => {
                let branch = if eval(cond, scope) != *negate { then } else { otherwise };
                render_nodes(branch, scope, out);
            }
            Node::Repeat { path, binding, body } => {
                let Some(JsonValue::Array(items)) = scope.lookup(path) else { continue };
                for item in items {
                    scope.bindings.push((binding.as_str(), item));
                    render_nodes(body, scope, out);
                    scope.bindings.pop();
                }
            }
        }
    }
}

/// Render parsed nodes against `ctx`. Missing values render as nothing.
pub fn render(nodes: &[Node], ctx: &JsonValue) -> String {
    let mut out = String::new();
    let mut scope = Scope { root: ctx, bindings: Vec::new() };
    render_nodes(nodes, &mut scope, &mut out);
    out
}
