use anyhow::{Context as _, Result};
use serde_json::Value;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use tracing::warn;

use crate::{
    bot::{
        args,
        commands::CommandContext,
        error::{CommandError, CommandResult},
    },
    ui::embeds::colors,
};

const TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Pares (código, nombre) que acepta `translate`.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("af", "afrikaans"),
    ("ar", "arabic"),
    ("bg", "bulgarian"),
    ("bn", "bengali"),
    ("ca", "catalan"),
    ("cs", "czech"),
    ("cy", "welsh"),
    ("da", "danish"),
    ("de", "german"),
    ("el", "greek"),
    ("en", "english"),
    ("eo", "esperanto"),
    ("es", "spanish"),
    ("et", "estonian"),
    ("eu", "basque"),
    ("fa", "persian"),
    ("fi", "finnish"),
    ("fr", "french"),
    ("ga", "irish"),
    ("gl", "galician"),
    ("gu", "gujarati"),
    ("he", "hebrew"),
    ("hi", "hindi"),
    ("hr", "croatian"),
    ("hu", "hungarian"),
    ("hy", "armenian"),
    ("id", "indonesian"),
    ("is", "icelandic"),
    ("it", "italian"),
    ("ja", "japanese"),
    ("ka", "georgian"),
    ("kn", "kannada"),
    ("ko", "korean"),
    ("la", "latin"),
    ("lt", "lithuanian"),
    ("lv", "latvian"),
    ("mk", "macedonian"),
    ("ml", "malayalam"),
    ("mr", "marathi"),
    ("ms", "malay"),
    ("nl", "dutch"),
    ("no", "norwegian"),
    ("pa", "punjabi"),
    ("pl", "polish"),
    ("pt", "portuguese"),
    ("ro", "romanian"),
    ("ru", "russian"),
    ("sk", "slovak"),
    ("sl", "slovenian"),
    ("sq", "albanian"),
    ("sr", "serbian"),
    ("sv", "swedish"),
    ("sw", "swahili"),
    ("ta", "tamil"),
    ("te", "telugu"),
    ("th", "thai"),
    ("tl", "filipino"),
    ("tr", "turkish"),
    ("uk", "ukrainian"),
    ("ur", "urdu"),
    ("vi", "vietnamese"),
    ("zh-cn", "chinese (simplified)"),
    ("zh-tw", "chinese (traditional)"),
];

/// Lo que muestra `languages`.
const COMMON_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "ja", "ko", "zh-cn", "ar", "ru", "pt", "it", "hi",
];

/// Acepta un código o nombre completo, en cualquier caso. Devuelve el código.
pub fn lookup_language(input: &str) -> Option<&'static str> {
    let input = input.trim().to_lowercase();
    LANGUAGES
        .iter()
        .find(|(code, name)| *code == input || *name == input)
        .map(|(code, _)| *code)
}

pub fn language_name(code: &str) -> String {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| title_case(name))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) if first == '(' => {
                    let rest: String = chars.collect();
                    format!("({}", title_case(&rest))
                }
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, PartialEq)]
pub struct Translation {
    pub text: String,
    pub source: String,
}

/// Lee el arreglo de segmentos que devuelve el endpoint de traducción.
pub fn parse_translation(body: &Value) -> Result<Translation> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .context("respuesta de traducción sin segmentos")?;
    let text: String = segments
        .iter()
        .filter_map(|s| s.get(0).and_then(Value::as_str))
        .collect();
    let source = body
        .get(2)
        .and_then(Value::as_str)
        .unwrap_or("auto")
        .to_string();
    Ok(Translation { text, source })
}

async fn request_translation(http: &reqwest::Client, text: &str, target: &str) -> Result<Translation> {
    let body: Value = http
        .get(TRANSLATE_ENDPOINT)
        .query(&[
            ("client", "gtx"),
            ("sl", "auto"),
            ("tl", target),
            ("dt", "t"),
            ("q", text),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    parse_translation(&body)
}

pub async fn translate(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let (language, text) = args::split_first(cmd.args);
    if language.is_empty() || text.is_empty() {
        return Err(cmd.usage_error());
    }
    let target = lookup_language(language).ok_or_else(|| {
        CommandError::invalid(format!(
            "❌ Invalid language. See `{}languages`.",
            cmd.prefix()
        ))
    })?;

    let translation = match request_translation(&cmd.bot.http, text, target).await {
        Ok(t) => t,
        Err(e) => {
            warn!("⚠️ Error de traducción: {:?}", e);
            return Err(CommandError::invalid(format!(
                "An error occurred during translation: {}",
                e
            )));
        }
    };

    let author = &cmd.msg.author;
    let embed = CreateEmbed::default()
        .title("🌐 Translation Successful")
        .color(colors::INFO_BLUE)
        .field(
            format!("Original Text ({})", language_name(&translation.source)),
            format!("```\n{}\n```", text),
            false,
        )
        .field(
            format!("Translated Text ({})", language_name(target)),
            format!("```\n{}\n```", translation.text),
            false,
        )
        .footer(
            CreateEmbedFooter::new(format!("Translated for {}", author.display_name()))
                .icon_url(author.face()),
        );
    cmd.reply_embed(embed).await?;
    Ok(())
}

pub async fn languages(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let mut description = String::from("Here are some common languages you can use:\n\n");
    for code in COMMON_LANGUAGES {
        description.push_str(&format!("**{}**: `{}`\n", language_name(code), code));
    }

    let embed = CreateEmbed::default()
        .title("Supported Languages")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(format!(
            "Use either the full name or the code in the {}translate command.",
            cmd.prefix()
        )));
    cmd.reply_embed(embed).await?;
    Ok(())
}
