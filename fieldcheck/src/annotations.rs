//! Lookup of values in a raw field annotation string
//!
//! Annotations use the conventional `key:"value"` syntax, pairs separated by
//! spaces, values double-quoted with backslash escapes:
//!
//! ```text
//! json:"email" check:"len(self) > 0" create,update:"self != ''"
//! ```
//!
//! A key may be a comma-separated alias list (`create,update`), in which case
//! the value is found under any of the aliases.

/// A field's raw annotation string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotations<'a>(&'a str);

impl<'a> Annotations<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self(raw)
    }

    /// The raw string
    pub fn raw(&self) -> &'a str {
        self.0
    }

    /// Value for `key`, or the empty string when absent
    pub fn get(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_default()
    }

    /// Value for `key`, `None` when no pair names it
    ///
    /// Parsing stops quietly at the first malformed pair; anything after it is
    /// treated as absent.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let mut rest = self.0.as_bytes();

        loop {
            let skip = rest.iter().take_while(|b| **b == b' ').count();
            rest = &rest[skip..];
            if rest.is_empty() {
                return None;
            }

            // Scan to colon. A space, a quote or a control character ends the key.
            let end = rest
                .iter()
                .take_while(|b| **b > b' ' && **b != b':' && **b != b'"' && **b != 0x7f)
                .count();
            if end == 0 || end + 1 >= rest.len() || rest[end] != b':' || rest[end + 1] != b'"' {
                return None;
            }
            let name = &rest[..end];
            rest = &rest[end + 1..];

            // Scan the quoted value, honouring escapes.
            let mut i = 1;
            while i < rest.len() && rest[i] != b'"' {
                if rest[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= rest.len() {
                return None;
            }
            let quoted = &rest[..=i];
            rest = &rest[i + 1..];

            let matches = std::str::from_utf8(name)
                .map(|name| name.split(',').any(|alias| alias.trim() == key))
                .unwrap_or(false);
            if matches {
                return std::str::from_utf8(quoted).ok().and_then(unquote);
            }
        }
    }
}

/// Strip the surrounding quotes and resolve escapes; `None` if malformed
fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Display name from a name annotation: everything before the first comma
///
/// `"email,omitempty"` names the field `email`. A value with an empty head,
/// such as `",omitempty"`, carries no name.
pub fn field_name(annotation: &str) -> Option<&str> {
    let head = annotation.split(',').next().unwrap_or_default().trim();
    if head.is_empty() {
        None
    } else {
        Some(head)
    }
}
