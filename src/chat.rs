//! Conversational querying over a [`VectorIndex`].
//!
//! Uses a condense-question flow:
//!
//! 1. If the conversation has prior turns, the chat model rewrites the new
//!    utterance into a standalone question using that history.
//! 2. The standalone question is embedded and the index searched.
//! 3. Results under the score threshold are dropped; the rest become the
//!    context block of the answer prompt.
//! 4. The chat model answers from that context and both turns are appended
//!    to the [`Conversation`].
//!
//! Conversation state lives in a caller-owned [`Conversation`] value that
//! is passed by `&mut`; the engine itself is stateless, and
//! [`Conversation::reset`] never touches the index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::{resolve_api_key, ChatConfig};
use crate::embedding::Embedder;
use crate::error::{Result, WikiError};
use crate::index::{filter_by_score, VectorIndex};
use crate::models::ScoredDocument;

const CONDENSE_PROMPT: &str = "Given a conversation (between Human and Assistant) and a follow up \
message from Human, rewrite the message to be a standalone question that captures all relevant \
context from the conversation.";

/// One message in the OpenAI chat format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible `POST {url}/chat/completions` client.
pub struct OpenAIChatModel {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    /// # Errors
    ///
    /// [`WikiError::Config`] if `chat.model` is unset.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| WikiError::Config("chat.model must be specified".into()))?;
        let default_env = "OPENAI_API_KEY".to_string();
        let api_key = resolve_api_key(
            config.api_key.as_ref(),
            Some(config.api_key_env.as_ref().unwrap_or(&default_env)),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };
        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.url))
            .json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| WikiError::Chat(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WikiError::Chat(format!(
                "chat endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| WikiError::Chat(format!("failed to parse response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| WikiError::Chat("response contained no choices".into()))
    }
}

/// Build the chat model named by `config.provider`.
pub fn create_chat_model(config: &ChatConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        "disabled" => Err(WikiError::Config(
            "chat provider is disabled; set [chat].provider = \"openai\"".into(),
        )),
        other => Err(WikiError::Config(format!("Unknown chat provider: {}", other))),
    }
}

/// Caller-owned conversation history.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub session_id: Uuid,
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    /// Prior user/assistant turns, oldest first.
    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget every turn and start a new session.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.session_id = Uuid::new_v4();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one conversational turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub answer: String,
    /// The standalone question that was searched.
    pub question: String,
    /// Retrieved documents at or above the score threshold.
    pub sources: Vec<ScoredDocument>,
    /// Documents retrieved before the threshold was applied.
    pub retrieved: usize,
}

/// Retrieval settings for [`ChatEngine`].
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub system_prompt: String,
    pub top_k: usize,
    pub min_score: f64,
}

/// Condense-question chat over an index.
pub struct ChatEngine<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
    model: &'a dyn ChatModel,
    options: ChatOptions,
}

impl<'a> ChatEngine<'a> {
    pub fn new(
        index: &'a VectorIndex,
        embedder: &'a dyn Embedder,
        model: &'a dyn ChatModel,
        options: ChatOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            options,
        }
    }

    /// Answer `utterance` in the context of `conversation`, then record the turn.
    ///
    /// # Errors
    ///
    /// [`WikiError::Chat`] for a blank utterance or a failing chat model,
    /// [`WikiError::Embedding`] if the query cannot be embedded. The
    /// conversation is left unchanged on error.
    pub async fn chat(
        &self,
        conversation: &mut Conversation,
        utterance: &str,
    ) -> Result<ChatResponse> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(WikiError::Chat("message is empty".into()));
        }

        let question = self.condense(conversation, utterance).await?;
        debug!(session = %conversation.session_id, question = %question, "standalone question");

        let retrieved = self
            .index
            .search(self.embedder, &question, self.options.top_k)
            .await?;
        let total = retrieved.len();
        let sources = filter_by_score(retrieved, self.options.min_score);

        let messages = vec![
            ChatMessage::system(self.options.system_prompt.clone()),
            ChatMessage::user(answer_prompt(&question, &sources)),
        ];
        let answer = self.model.complete(&messages).await?;

        conversation.turns.push(ChatMessage::user(utterance));
        conversation.turns.push(ChatMessage::assistant(answer.clone()));

        Ok(ChatResponse {
            answer,
            question,
            sources,
            retrieved: total,
        })
    }

    async fn condense(&self, conversation: &Conversation, utterance: &str) -> Result<String> {
        if conversation.is_empty() {
            return Ok(utterance.to_string());
        }
        let history = conversation
            .turns()
            .iter()
            .map(|m| {
                let speaker = if m.role == "user" { "Human" } else { "Assistant" };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{}\n\n<Chat History>\n{}\n\n<Follow Up Message>\n{}\n\n<Standalone question>",
            CONDENSE_PROMPT, history, utterance
        );
        let condensed = self.model.complete(&[ChatMessage::user(prompt)]).await?;
        let condensed = condensed.trim();
        Ok(if condensed.is_empty() {
            utterance.to_string()
        } else {
            condensed.to_string()
        })
    }
}

fn answer_prompt(question: &str, sources: &[ScoredDocument]) -> String {
    let context = if sources.is_empty() {
        "(no relevant documents found)".to_string()
    } else {
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let title = s.title.as_deref().unwrap_or(&s.key);
                format!("[{}] {}\n{}", i + 1, title, s.snippet)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "Context information is below.\n---------------------\n{}\n---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\nAnswer: ",
        context, question
    )
}

/// `wctx chat`: interactive conversation over the snapshot.
///
/// `/reset` clears the conversation, `/quit` (or EOF) exits.
pub async fn run_chat(config: &crate::config::Config) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (snap, embedder) = crate::search::open_index(config)?;
    let model = create_chat_model(&config.chat)?;
    let engine = ChatEngine::new(
        &snap.index,
        embedder.as_ref(),
        model.as_ref(),
        ChatOptions {
            system_prompt: config.chat.system_prompt.clone(),
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
        },
    );
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!(
        "Ask about the wiki ({} documents). /reset clears history, /quit exits.",
        snap.index.document_count()
    );
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.reset();
                println!("(conversation cleared)");
                continue;
            }
            utterance => match engine.chat(&mut conversation, utterance).await {
                Ok(resp) => {
                    println!("{}", resp.answer.trim());
                    println!();
                    println!(
                        "{}",
                        crate::citations::render_sources(&resp.sources, resp.retrieved)
                    );
                }
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}
