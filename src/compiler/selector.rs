use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One bracketed index selector in an edge endpoint expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Selector {
    /// Binds to the named loop dimension's current index (`[i]`).
    Symbol(String),
    /// Binds to the named loop's index shifted by a constant (`[i+1]`).
    Offset { symbol: String, offset: i64 },
    /// Fixes the index regardless of any loop state (`[0]`).
    Literal(usize),
}

impl Selector {
    /// Loop symbol this selector references, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Selector::Symbol(s) => Some(s),
            Selector::Offset { symbol, .. } => Some(symbol),
            Selector::Literal(_) => None,
        }
    }
}

/// Parse an edge endpoint expression (`Child.Output[i+1][0]`) into its
/// bare dotted path and the ordered selector list.
pub fn parse_endpoint(raw: &str) -> Result<(String, Vec<Selector>)> {
    let raw = raw.trim();
    let (path, rest) = match raw.find('[') {
        Some(pos) => (&raw[..pos], &raw[pos..]),
        None => (raw, ""),
    };
    if path.is_empty() {
        return Err(anyhow!("Edge endpoint has no node path: {:?}", raw));
    }

    let mut selectors = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        if !remaining.starts_with('[') {
            return Err(anyhow!("Malformed selector list in endpoint {:?}", raw));
        }
        let close = remaining
            .find(']')
            .ok_or_else(|| anyhow!("Unclosed selector bracket in endpoint {:?}", raw))?;
        selectors.push(parse_selector(&remaining[1..close], raw)?);
        remaining = &remaining[close + 1..];
    }

    Ok((path.to_string(), selectors))
}

fn parse_selector(token: &str, endpoint: &str) -> Result<Selector> {
    let token = token.trim();
    if token.is_empty() {
        return Err(anyhow!("Empty selector in endpoint {:?}", endpoint));
    }

    // Bare integer: fixed index.
    if token.chars().all(|c| c.is_ascii_digit()) {
        let value = token
            .parse::<usize>()
            .map_err(|_| anyhow!("Invalid literal selector {:?} in endpoint {:?}", token, endpoint))?;
        return Ok(Selector::Literal(value));
    }

    // Symbol with an optional signed integer offset.
    if let Some(pos) = token.find(['+', '-']) {
        let symbol = token[..pos].trim();
        if symbol.is_empty() || !is_symbol(symbol) {
            return Err(anyhow!("Invalid selector symbol {:?} in endpoint {:?}", token, endpoint));
        }
        let offset = token[pos..]
            .replace(' ', "")
            .parse::<i64>()
            .map_err(|_| anyhow!("Invalid selector offset {:?} in endpoint {:?}", token, endpoint))?;
        return Ok(Selector::Offset {
            symbol: symbol.to_string(),
            offset,
        });
    }

    if !is_symbol(token) {
        return Err(anyhow!("Invalid selector {:?} in endpoint {:?}", token, endpoint));
    }
    Ok(Selector::Symbol(token.to_string()))
}

fn is_symbol(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
