//! Prompt building for retrieval-augmented answering

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel the model is instructed to emit when the provided material does
/// not contain an answer. Checked verbatim by the extraction and synthesis
/// stages.
pub const NO_ANSWER: &str = "DO-NOT-KNOW";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Final answer prompt: extracts (as `Extract:`/`Source:` pairs) plus the
/// question, with instructions to cite sources after a `SOURCE:` marker.
pub fn summary_answer(question: &str, extracts: &str) -> String {
    format!(
        "Use the provided extracts (with sources) to answer the QUESTION below. \
         Base your answer ONLY on these extracts, even if the answer seems \
         factually incorrect; what matters is that it is supported by the \
         extracts. If the extracts do not contain enough information, respond \
         exactly with {NO_ANSWER}.\n\
         After your answer, on a new line, write SOURCE: followed by the \
         sources of the extracts you used.\n\n\
         {extracts}\n\n\
         QUESTION: {question}\n\n\
         Answer:"
    )
}

/// Verbatim extraction prompt for a single passage.
pub fn verbatim_extract(question: &str, passage: &str) -> String {
    format!(
        "Below is a PASSAGE and a QUESTION. Quote verbatim the parts of the \
         PASSAGE that are relevant to answering the QUESTION, and nothing \
         else. Do not paraphrase and do not add commentary. If no part of the \
         PASSAGE is relevant, respond exactly with {NO_ANSWER}.\n\n\
         PASSAGE:\n{passage}\n\n\
         QUESTION: {question}"
    )
}

/// HyDE prompt: ask for a plausible answer to use as a search probe.
pub fn hypothetical_answer(query: &str) -> String {
    format!(
        "Give an ideal answer to the following query, in up to 3 sentences. \
         Do not explain yourself, and do not apologize, just show a good \
         possible answer, even if you do not have any information. \
         Preface your answer with \"HYPOTHETICAL ANSWER: \"\n\n\
         QUERY: {query}"
    )
}

/// Rephrase prompt: n equivalent formulations, blank-line separated.
pub fn rephrase_query(query: &str, n: usize) -> String {
    format!(
        "Rephrase the following query in {n} different equivalent ways, \
         separate them with 2 newlines.\n\
         QUERY: {query}"
    )
}

/// Standalone rewrite prompt for follow-up questions in a dialog.
pub fn standalone_query(history: &str, query: &str) -> String {
    format!(
        "Given the conversation below and a follow-up question, rephrase the \
         follow-up question as a standalone question that can be understood \
         without the conversation. Respond with the standalone question only.\n\n\
         CONVERSATION:\n{history}\n\n\
         FOLLOW-UP QUESTION: {query}"
    )
}
