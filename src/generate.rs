//! Answer synthesis: the fixed instruction template and the generation-model
//! seam.

use std::fmt;

use anyhow::Result;

/// Trait implemented by concrete generation models.
pub trait AnswerModel: Send + Sync {
    /// Submits one prompt and returns the raw generated text.
    fn answer(&self, prompt: &str) -> Result<String>;
}

/// Provider-level failure during answer synthesis. Never retried; the
/// orchestrator surfaces the message as the answer text.
#[derive(Debug)]
pub struct GenerationFailure {
    /// Provider error message, verbatim.
    pub message: String,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error generating final response: {}", self.message)
    }
}

impl std::error::Error for GenerationFailure {}

/// Builds the instruction prompt: answer only from the supplied context,
/// reference program name and title when possible, admit when the context is
/// insufficient, and refuse outside knowledge.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are an AI chatbot specializing in USDA Programs. Your goal is to provide a helpful \
and complete answer to the user's question *ONLY* based on the provided CONTEXT. \
Reference the 'Program Name' and 'Title' when possible to ground your answer. \
Do not use outside knowledge.\n\
\n\
If the context does not contain the answer, state clearly: \
\"I cannot find the answer to that specific question in the USDA programs documentation.\"\n\
\n\
CONTEXT (Retrieved from USDA Programs Documentation):\n\
{context}\n\
\n\
USER QUESTION: {query}\n\
\n\
RESPONSE:"
    )
}

/// Populates the template and invokes the model once. The raw response text
/// is returned unmodified; a provider error becomes a [`GenerationFailure`].
pub fn generate(
    model: &dyn AnswerModel,
    query: &str,
    context: &str,
) -> Result<String, GenerationFailure> {
    let prompt = build_prompt(query, context);
    model.answer(&prompt).map_err(|err| GenerationFailure {
        message: format!("{err:#}"),
    })
}
