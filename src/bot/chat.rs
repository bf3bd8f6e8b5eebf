//! Conversational replies backed by a text generation API.
//!
//! The bot answers when it is mentioned, when someone replies to one of its
//! messages, or when the configured trigger phrase shows up in a message.
//! Each channel keeps a short rolling history in
//! [`ConversationStore`](crate::storage::conversations::ConversationStore),
//! which is sent along with every prompt so follow-up questions have context.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::{
    builder::{CreateAttachment, CreateMessage},
    model::{channel::Message, id::UserId},
    prelude::Context,
};
use tracing::{debug, warn};

use crate::{
    bot::CogsworthBot,
    storage::conversations::{ChatRole, ChatTurn},
};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Largo máximo de un mensaje de Discord.
pub const MESSAGE_LIMIT: usize = 2000;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Genera la respuesta del modelo a `prompt` con los turnos anteriores.
    async fn generate(&self, history: &[ChatTurn], prompt: &str) -> Result<String>;
}

/// Cliente `generateContent` para modelos Gemini.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn build_request<'a>(history: &'a [ChatTurn], prompt: &'a str) -> GenerateRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|turn| Content {
            role: match turn.role {
                ChatRole::User => "user",
                ChatRole::Model => "model",
            },
            parts: turn.parts.iter().map(|p| Part { text: p }).collect(),
        })
        .collect();
    contents.push(Content {
        role: "user",
        parts: vec![Part { text: prompt }],
    });
    GenerateRequest { contents }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, history: &[ChatTurn], prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(history, prompt))
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateResponse = response.json().await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .context("la respuesta no contiene candidatos")?;
        Ok(candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect())
    }
}

/// Por qué un mensaje se dirige al bot, si lo hace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Mention,
    Reply,
    Phrase,
}

pub fn detect_trigger(
    content: &str,
    mentions_bot: bool,
    replies_to_bot: bool,
    phrase: &str,
) -> Option<Trigger> {
    if mentions_bot {
        Some(Trigger::Mention)
    } else if replies_to_bot {
        Some(Trigger::Reply)
    } else if !phrase.is_empty() && content.to_lowercase().contains(&phrase.to_lowercase()) {
        Some(Trigger::Phrase)
    } else {
        None
    }
}

/// Quita la mención al bot de un mensaje.
pub fn clean_prompt(content: &str, trigger: Trigger, bot_id: UserId) -> String {
    match trigger {
        Trigger::Mention => content
            .replace(&format!("<@!{}>", bot_id), "")
            .replace(&format!("<@{}>", bot_id), "")
            .trim()
            .to_string(),
        _ => content.trim().to_string(),
    }
}

#[derive(Debug, PartialEq)]
pub enum ChatReply {
    Inline(String),
    /// Demasiado largo para un mensaje; se envía como `response.txt`.
    Attachment(String),
}

impl ChatReply {
    pub fn from_answer(answer: String) -> Self {
        if answer.chars().count() > MESSAGE_LIMIT {
            ChatReply::Attachment(answer)
        } else {
            ChatReply::Inline(answer)
        }
    }
}

/// Consulta al generador y prepara su respuesta para Discord.
pub async fn compose_reply(
    generator: &dyn TextGenerator,
    history: &[ChatTurn],
    prompt: &str,
) -> Result<(String, ChatReply)> {
    let answer = generator.generate(history, prompt).await?;
    Ok((answer.clone(), ChatReply::from_answer(answer)))
}

/// Hook para mensajes que no son comandos.
pub async fn on_message(ctx: &Context, msg: &Message, bot: &CogsworthBot) {
    let bot_id = ctx.cache.current_user().id;
    let replies_to_bot = msg
        .referenced_message
        .as_ref()
        .is_some_and(|m| m.author.id == bot_id);
    let Some(trigger) = detect_trigger(
        &msg.content,
        msg.mentions_user_id(bot_id),
        replies_to_bot,
        &bot.config.chat_trigger,
    ) else {
        return;
    };

    let Some(generator) = bot.chat.as_deref() else {
        debug!("Chat activado por {} pero no hay API key configurada", msg.author.name);
        return;
    };

    let prompt = clean_prompt(&msg.content, trigger, bot_id);
    if prompt.is_empty() {
        if let Err(e) = msg
            .reply(&ctx.http, "You mentioned me! How can I help you today?")
            .await
        {
            debug!("No se pudo responder la mención: {:?}", e);
        }
        return;
    }

    let typing = msg.channel_id.start_typing(&ctx.http);
    let history = bot.stores.conversations.history(msg.channel_id);

    let sent = match compose_reply(generator, &history, &prompt).await {
        Ok((answer, reply)) => {
            if let Err(e) = bot
                .stores
                .conversations
                .record_exchange(msg.channel_id, &prompt, &answer)
                .await
            {
                warn!("⚠️ No se pudo guardar el historial de chat: {:?}", e);
            }
            send_reply(ctx, msg, reply).await
        }
        Err(e) => {
            warn!("⚠️ Error de la API de Gemini: {:?}", e);
            msg.reply(&ctx.http, format!("❌ An error occurred with the Gemini API: `{}`", e))
                .await
                .map(|_| ())
        }
    };
    typing.stop();

    if let Err(e) = sent {
        warn!("⚠️ No se pudo enviar la respuesta del chat: {:?}", e);
    }
}

async fn send_reply(ctx: &Context, msg: &Message, reply: ChatReply) -> serenity::Result<()> {
    match reply {
        ChatReply::Inline(text) => {
            msg.reply(&ctx.http, text).await?;
        }
        ChatReply::Attachment(text) => {
            let message = CreateMessage::new()
                .content("The response was too long, so I've sent it as a file.")
                .add_file(CreateAttachment::bytes(text.into_bytes(), "response.txt"))
                .reference_message(msg);
            msg.channel_id.send_message(&ctx.http, message).await?;
        }
    }
    Ok(())
}
