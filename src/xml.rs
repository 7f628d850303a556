//! Minimal XML status-fragment serialization, used by `Device::to_xml` to
//! expose current tuning state the way a SAT&gt;IP server's status page
//! does. Deliberately hand-rolled rather than pulling in a DOM crate: the
//! format is a handful of flat, known tags, not general-purpose documents.

use std::fmt::Write as _;

/// A piece of device state that can render itself as XML tags and parse
/// itself back from the same format.
pub trait XmlFragment {
    fn to_xml(&self, out: &mut String);

    /// Restores state from a previously serialized fragment. The default
    /// implementation ignores its input; only state worth restoring across
    /// a restart (none, currently) needs to override this.
    fn from_xml(&mut self, _xml: &str) {}
}

/// Escapes the handful of characters that are meaningful inside XML text
/// content.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Writes `<tag>value</tag>` to `out`.
pub fn write_tag(out: &mut String, tag: &str, value: impl std::fmt::Display) {
    let _ = write!(out, "<{}>{}</{}>", tag, escape(&value.to_string()), tag);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape("a&b<c>d\"e"), "a&amp;b&lt;c&gt;d&quot;e");
    }

    #[test]
    fn write_tag_wraps_value() {
        let mut out = String::new();
        write_tag(&mut out, "freq", 11727);
        assert_eq!(out, "<freq>11727</freq>");
    }
}
