use std::fmt;
use std::str::FromStr;

/// Template used to wrap retrieved context and the question for the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStyle {
    #[default]
    Plain,
    /// Concise question-answering assistant, at most three sentences
    RagAssistant,
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(PromptStyle::Plain),
            "rag_assistant" | "rag-assistant" | "assistant" => Ok(PromptStyle::RagAssistant),
            other => Err(format!("unknown prompt style: {other}")),
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptStyle::Plain => write!(f, "plain"),
            PromptStyle::RagAssistant => write!(f, "rag_assistant"),
        }
    }
}

pub fn render_prompt(
    style: PromptStyle,
    question: &str,
    context: &str,
    preferences: Option<&str>,
) -> String {
    let mut prompt = String::new();
    if let Some(p) = preferences.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("User preferences: {p}\n\n"));
    }
    match style {
        PromptStyle::Plain => {
            prompt.push_str(&format!(
                "Context:\n{context}\n\nQuestion: {question}\nAnswer:"
            ));
        }
        PromptStyle::RagAssistant => {
            prompt.push_str(&format!(
                "You are an assistant for question-answering tasks. Use the following pieces of \
                 retrieved context to answer the question. If you don't know the answer, just say \
                 that you don't know. Use three sentences maximum and keep the answer concise.\n\
                 Question: {question} \nContext: {context} \nAnswer:"
            ));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_template() {
        let p = render_prompt(PromptStyle::Plain, "Why did BTC drop?", "ETF outflows", None);
        assert_eq!(p, "Context:\nETF outflows\n\nQuestion: Why did BTC drop?\nAnswer:");
    }

    #[test]
    fn assistant_template() {
        let p = render_prompt(PromptStyle::RagAssistant, "q?", "ctx", None);
        assert!(p.starts_with("You are an assistant for question-answering tasks."));
        assert!(p.contains("Use three sentences maximum and keep the answer concise.\nQuestion: q? \nContext: ctx \nAnswer:"));
    }

    #[test]
    fn preferences_are_prefixed() {
        let p = render_prompt(PromptStyle::Plain, "q", "c", Some(" defi only "));
        assert!(p.starts_with("User preferences: defi only\n\nContext:\n"));

        let p = render_prompt(PromptStyle::Plain, "q", "c", Some("   "));
        assert!(p.starts_with("Context:"));
    }

    #[test]
    fn style_parsing() {
        assert_eq!("plain".parse::<PromptStyle>(), Ok(PromptStyle::Plain));
        assert_eq!("RAG_ASSISTANT".parse::<PromptStyle>(), Ok(PromptStyle::RagAssistant));
        assert!("haiku".parse::<PromptStyle>().is_err());
    }
}
