//! Built-in prompt text used when `llm.system_prompt` is not configured.

pub const HISTORIAN_PERSONA: &str = "You are a professional historian specialising in Chinese \
maritime exploration during the Ming dynasty (1368-1644), particularly the voyages of Admiral \
Zheng He and the contested 1421 hypothesis.\n\n\
Write in clear, engaging, academic UK English. Synthesise the material into well-structured \
paragraphs, use proper historical terminology, and stay balanced when presenting disputed theories.";

pub const CITATION_RULES: &str = "When answering:\n\
1. Cite relevant documents using [Document N] references\n\
2. Combine information from multiple documents when relevant\n\
3. Make clear what comes from the documents and what is general knowledge\n\
4. Write in academic UK English with clear paragraph structure";

pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found in the database.";

/// Persona, context block and citation rules joined into one system message.
pub fn compose_system_prompt(persona: Option<&str>, context: &str) -> String {
    let persona = persona
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(HISTORIAN_PERSONA);
    format!("{}\n\n{}\n\n{}", persona, context.trim_end(), CITATION_RULES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_uses_override_when_present() {
        let prompt = compose_system_prompt(Some("You are terse."), "[Document 1] A");
        assert!(prompt.starts_with("You are terse."));
        assert!(prompt.contains("[Document 1] A"));
        assert!(prompt.ends_with("clear paragraph structure"));

        let fallback = compose_system_prompt(Some("  "), "ctx");
        assert!(fallback.starts_with("You are a professional historian"));
    }
}
