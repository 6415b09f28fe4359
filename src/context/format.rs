//! Output format adapters: boundary markers, metadata attributes, and
//! per-unit overhead (spec.md §4.6 formatting contract).

/// Output rendering the assembled context is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Markdown,
    Plain,
}

impl Format {
    /// Indicative per-unit token overhead the budget must deduct before
    /// content allocation (spec.md §4.6).
    pub fn overhead_tokens(&self) -> u32 {
        match self {
            Format::Xml => 40,
            Format::Markdown => 30,
            Format::Plain => 20,
        }
    }

    /// Wrap `body` with boundary markers and metadata attributes so an
    /// LLM can attribute code to its owning unit.
    pub fn wrap_unit(&self, identifier: &str, unit_type: &str, relevance: f64, change_frequency: &str, body: &str) -> String {
        match self {
            Format::Xml => format!(
                "<unit id=\"{identifier}\" type=\"{unit_type}\" relevance=\"{relevance:.3}\" change_frequency=\"{change_frequency}\">\n{body}\n</unit>\n"
            ),
            Format::Markdown => format!(
                "### {identifier} ({unit_type}) — relevance: {relevance:.3}, change_frequency: {change_frequency}\n```\n{body}\n```\n"
            ),
            Format::Plain => format!(
                "--- {identifier} [{unit_type}] relevance={relevance:.3} change_frequency={change_frequency} ---\n{body}\n"
            ),
        }
    }

    pub fn wrap_dependencies_trailer(&self, lines: &[String]) -> String {
        if lines.is_empty() {
            return String::new();
        }
        match self {
            Format::Xml => format!("<dependencies>\n{}\n</dependencies>\n", lines.join("\n")),
            Format::Markdown => format!("**Dependencies**\n{}\n", lines.join("\n")),
            Format::Plain => format!("Dependencies:\n{}\n", lines.join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_ordering_matches_table() {
        assert!(Format::Xml.overhead_tokens() > Format::Markdown.overhead_tokens());
        assert!(Format::Markdown.overhead_tokens() > Format::Plain.overhead_tokens());
    }
}
