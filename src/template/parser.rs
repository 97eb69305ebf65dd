use super::TemplateError;

/// Dotted lookup path, e.g. `student.name` -> `["student", "name"]`.
pub type Path = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    Truthy(Path),
    Equals(Path, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Var(Path),
    If { cond: Cond, negate: bool, then: Vec<Node>, otherwise: Vec<Node> },
    Repeat { path: Path, binding: String, body: Vec<Node> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Var(Path),
    If { cond: Cond, negate: bool },
    Repeat { path: Path, binding: String },
    Else,
    End,
}

const VAR_OPEN: &str = "[[";
const VAR_CLOSE: &str = "]]";
const BLOCK_OPEN: &str = "<!--[";
const BLOCK_CLOSE: &str = "]-->";

fn syntax(offset: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax { offset, message: message.into() }
}

fn parse_path(raw: &str, offset: usize) -> Result<Path, TemplateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(syntax(offset, "empty path"));
    }
    raw.split('.')
        .map(|seg| {
            if !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                Ok(seg.to_string())
            } else {
                Err(syntax(offset, format!("bad path `{raw}`")))
            }
        })
        .collect()
}

fn parse_cond(raw: &str, offset: usize) -> Result<Cond, TemplateError> {
    let Some((lhs, rhs)) = raw.split_once("==") else {
        return Ok(Cond::Truthy(parse_path(raw, offset)?));
    };
    let rhs = rhs.trim();
    let literal = rhs
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .filter(|_| rhs.len() >= 2)
        .ok_or_else(|| syntax(offset, format!("expected a quoted literal, found `{rhs}`")))?;
    Ok(Cond::Equals(parse_path(lhs, offset)?, literal.to_string()))
}

fn parse_directive(raw: &str, offset: usize) -> Result<Token, TemplateError> {
    let raw = raw.trim();
    let (word, rest) = raw.split_once(char::is_whitespace).unwrap_or((raw, ""));
    match word {
        "if" => Ok(Token::If { cond: parse_cond(rest, offset)?, negate: false }),
        "ifnot" => Ok(Token::If { cond: parse_cond(rest, offset)?, negate: true }),
        "else" if rest.trim().is_empty() => Ok(Token::Else),
        "end" if rest.trim().is_empty() => Ok(Token::End),
        "repeat" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            match parts.as_slice() {
                [path, "as", binding] => Ok(Token::Repeat {
                    path: parse_path(path, offset)?,
                    binding: parse_path(binding, offset)?.join("."),
                }),
                _ => Err(syntax(offset, "expected `repeat <path> as <name>`")),
            }
        }
        other => Err(syntax(offset, format!("unknown directive `{other}`"))),
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, TemplateError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < src.len() {
        let rest = &src[pos..];
        let next_var = rest.find(VAR_OPEN);
        let next_block = rest.find(BLOCK_OPEN);
        let (at, is_var) = match (next_var, next_block) {
            (None, None) => {
                out.push((pos, Token::Text(rest.to_string())));
                break;
            }
            (Some(v), Some(b)) if b < v => (b, false),
            (Some(v), _) => (v, true),
            (None, Some(b)) => (b, false),
        };
        if at > 0 {
            out.push((pos, Token::Text(rest[..at].to_string())));
        }
        let start = pos + at;
        let (open, close) = if is_var { (VAR_OPEN, VAR_CLOSE) } else { (BLOCK_OPEN, BLOCK_CLOSE) };
        let body_start = start + open.len();
        let Some(len) = src[body_start..].find(close) else {
            return Err(syntax(start, "unterminated tag"));
        };
        let body = &src[body_start..body_start + len];
        let tok = if is_var { Token::Var(parse_path(body, start)?) } else { parse_directive(body, start)? };
        out.push((start, tok));
        pos = body_start + len + close.len();
    }
    Ok(out)
}

enum Stop {
    Eof,
    Else(usize),
    End(usize),
}

fn parse_nodes(tokens: &[(usize, Token)], pos: &mut usize) -> Result<(Vec<Node>, Stop), TemplateError> {
    let mut nodes = Vec::new();
    while let Some((offset, tok)) = tokens.get(*pos) {
        *pos += 1;
        match tok {
            Token::Text(t) => nodes.push(Node::Literal(t.clone())),
            Token::Var(p) => nodes.push(Node::Var(p.clone())),
            Token::Else => return Ok((nodes, Stop::Else(*offset))),
            Token::End => return Ok((nodes, Stop::End(*offset))),
            Token::If { cond, negate } => {
                let (then, stop) = parse_nodes(tokens, pos)?;
                let otherwise = match stop {
                    Stop::End(_) => Vec::new(),
                    Stop::Else(_) => match parse_nodes(tokens, pos)? {
                        (nodes, Stop::End(_)) => nodes,
                        (_, Stop::Else(at)) => return Err(syntax(at, "second `else` in one block")),
                        (_, Stop::Eof) => return Err(syntax(*offset, "unclosed `if` block")),
                    },
                    Stop::Eof => return Err(syntax(*offset, "unclosed `if` block")),
                };
                nodes.push(Node::If { cond: cond.clone(), negate: *negate, then, otherwise });
            }
            Token::Repeat { path, binding } => {
                let (body, stop) = parse_nodes(tokens, pos)?;
                match stop {
                    Stop::End(_) => {}
                    Stop::Else(at) => return Err(syntax(at, "`else` inside `repeat`")),
                    Stop::Eof => return Err(syntax(*offset, "unclosed `repeat` block")),
                }
                nodes.push(Node::Repeat { path: path.clone(), binding: binding.clone(), body });
            }
        }
    }
    Ok((nodes, Stop::Eof))
}

/// Parse template source into its node tree.
pub fn parse(src: &str) -> Result<Vec<Node>, TemplateError> {
    let tokens = tokenize(src)?;
    let mut pos = 0;
    match parse_nodes(&tokens, &mut pos)? {
        (nodes, Stop::Eof) => Ok(nodes),
        (_, Stop::Else(at)) => Err(syntax(at, "`else` outside a block")),
        (_, Stop::End(at)) => Err(syntax(at, "unmatched `end`")),
    }
}
