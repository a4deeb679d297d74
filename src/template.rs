use crate::error::{PipelineError, Result, Stage};
use regex::Regex;
use std::collections::HashMap;

/// Escape a string for use inside an HTML/SVG attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_attr`].
pub fn unescape_attr(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Field(String),
}

/// String template with `{field}` placeholders, e.g.
/// `https://genome.ucsc.edu/cgi-bin/hgTracks?db=hg38&position={chrom}:{start}-{end}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\-]*)\}")?;
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(source[last..whole.start()].to_string()));
            }
            parts.push(Part::Field(name.as_str().to_string()));
            last = whole.end();
        }
        if last < source.len() {
            parts.push(Part::Literal(source[last..].to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (repeats included).
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Field(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    /// Fail with `stage` when a placeholder is not in `known`.
    pub fn check_fields(&self, known: &[&str], stage: Stage) -> Result<()> {
        for field in self.fields() {
            if !known.contains(&field) {
                return Err(PipelineError::invalid(
                    stage,
                    format!(
                        "template '{}' refers to unknown field '{}'",
                        self.source, field
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Substitute placeholders; returns the first unresolved name on failure.
    pub fn render<'a, F>(&self, lookup: F) -> std::result::Result<String, String>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(name) => out.push_str(lookup(name).ok_or_else(|| name.clone())?),
            }
        }
        Ok(out)
    }

    /// Match a rendered (unescaped) string back to its placeholder values.
    ///
    /// A placeholder followed by a literal takes everything up to the first
    /// occurrence of that literal. Repeated placeholders must agree.
    pub fn extract(&self, rendered: &str) -> Option<HashMap<String, String>> {
        let mut values: HashMap<String, String> = HashMap::new();
        let mut rest = rendered;
        let mut parts = self.parts.iter().peekable();
        while let Some(part) = parts.next() {
            match part {
                Part::Literal(text) => rest = rest.strip_prefix(text.as_str())?,
                Part::Field(name) => {
                    let end = match parts.peek() {
                        Some(Part::Literal(next)) => rest.find(next.as_str())?,
                        Some(Part::Field(_)) => return None,
                        None => rest.len(),
                    };
                    let value = &rest[..end];
                    if let Some(prev) = values.get(name) {
                        if prev != value {
                            return None;
                        }
                    }
                    values.insert(name.clone(), value.to_string());
                    rest = &rest[end..];
                }
            }
        }
        rest.is_empty().then_some(values)
    }
}
