//! Answer generation: builds completion requests and never fails.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use admitbot_shared::{
    CompletionClient, CompletionMessage, CompletionRequest, RemoteDocumentSet,
};

/// Persona and scope given to the model with every request.
pub const SYSTEM_PROMPT: &str = "You are an assistant of the university admissions office. \
You answer prospective students' questions about the master's programs in artificial intelligence. \
Use the information from the attached curriculum PDF files and the provided context. \
If you cannot find the information, say that you do not know the answer.";

/// Default sampling temperature, low to keep answers close to the material.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Turns a question plus optional context into a model answer.
///
/// The attachment list is a snapshot of the sync manager's
/// [`RemoteDocumentSet`]; it is replaced wholesale with
/// [`set_attachments`](Self::set_attachments) after a re-sync.
pub struct AnswerEngine {
    client: Arc<dyn CompletionClient>,
    attachments: RemoteDocumentSet,
    temperature: f32,
}

impl AnswerEngine {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        attachments: RemoteDocumentSet,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            attachments,
            temperature,
        }
    }

    pub fn attachments(&self) -> &RemoteDocumentSet {
        &self.attachments
    }

    pub fn set_attachments(&mut self, attachments: RemoteDocumentSet) {
        self.attachments = attachments;
    }

    /// Assemble the two-message request for `question` and `context`.
    pub fn build_request(&self, question: &str, context: &str) -> CompletionRequest {
        let mut user =
            CompletionMessage::user(format!("Website context: {context}\n\nQuestion: {question}"));
        if !self.attachments.is_empty() {
            user.attachments = self.attachments.ids().to_vec();
        }

        CompletionRequest {
            messages: vec![CompletionMessage::system(SYSTEM_PROMPT), user],
            temperature: self.temperature,
        }
    }

    /// Ask the model. Any failure comes back as an apology text.
    #[instrument(skip_all, fields(context_len = context.len(), attachments = self.attachments.len()))]
    pub async fn answer(&self, question: &str, context: &str) -> String {
        let request = self.build_request(question, context);

        match self.client.complete(&request).await {
            Ok(response) => match response.first_text().filter(|t| !t.trim().is_empty()) {
                Some(text) => {
                    debug!(chars = text.len(), "answer received");
                    text.to_string()
                }
                None => {
                    error!("completion returned no usable text");
                    apology("the model returned an empty response")
                }
            },
            Err(e) => {
                error!(error = %e, "completion request failed");
                apology(&e.to_string())
            }
        }
    }
}

fn apology(detail: &str) -> String {
    format!("Sorry, an error occurred while processing your request: {detail}")
}
