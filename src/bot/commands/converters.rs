use num_format::{Locale, ToFormattedString};
use serde::Deserialize;
use serenity::builder::{CreateEmbed, CreateEmbedFooter, EditMessage};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

use crate::{
    bot::{
        commands::CommandContext,
        error::{CommandError, CommandResult},
    },
    ui::embeds::colors,
};

const RATES_ENDPOINT: &str = "https://open.er-api.com/v6/latest";
/// Anidamiento máximo de paréntesis y signos unarios.
pub const MAX_NESTING: usize = 256;

// ---------------------------------------------------------------------------
// Calculadora
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,
    #[error("invalid number '{0}'")]
    BadNumber(String),
    #[error("unexpected '{0}'")]
    Unexpected(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression is nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    FloorDiv,
    Pow,
    LParen,
    RParen,
}

impl Token {
    fn symbol(&self) -> String {
        match self {
            Token::Num(n) => n.to_string(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::FloorDiv => "//".into(),
            Token::Pow => "^".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CalcError> {
    // Todo lo que no sea número u operador se descarta
    let clean: Vec<char> = expression
        .chars()
        .filter(|c| c.is_ascii_digit() || ".+-*/()^".contains(*c))
        .collect();

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < clean.len() {
        let c = clean[i];
        let token = match c {
            '0'..='9' | '.' => {
                let start = i;
                while i < clean.len() && (clean[i].is_ascii_digit() || clean[i] == '.') {
                    i += 1;
                }
                let raw: String = clean[start..i].iter().collect();
                let value = raw.parse().map_err(|_| CalcError::BadNumber(raw))?;
                tokens.push(Token::Num(value));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if clean.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::Pow
            }
            '*' => Token::Star,
            '/' if clean.get(i + 1) == Some(&'/') => {
                i += 1;
                Token::FloorDiv
            }
            '/' => Token::Slash,
            '^' => Token::Pow,
            '(' => Token::LParen,
            _ => Token::RParen,
        };
        tokens.push(token);
        i += 1;
    }

    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }
    Ok(tokens)
}

/// Evaluador descendente recursivo. `^` liga más fuerte que el menos unario
/// y asocia a la derecha: `-2^2` es `-4` y `2^3^2` es `512`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Token::Slash | Token::FloorDiv => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                    if op == Token::FloorDiv {
                        value = value.floor();
                    }
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // Todo ciclo de recursión pasa por aquí
    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.depth >= MAX_NESTING {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(CalcError::Unexpected(other.symbol())),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(other) => Err(CalcError::Unexpected(other.symbol())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if let Some(extra) = parser.peek() {
        return Err(CalcError::Unexpected(extra.symbol()));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Los resultados enteros se muestran sin decimales.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub async fn calculate(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let expression = cmd.args.trim();
    if expression.is_empty() {
        return Err(cmd.usage_error());
    }

    let result = evaluate(expression).map_err(|e| {
        CommandError::invalid(format!(
            "❌ Invalid mathematical expression. Please check your input. Error: `{}`",
            e
        ))
    })?;

    let embed = CreateEmbed::default()
        .title("🧮 Calculator")
        .color(colors::INFO_BLUE)
        .field("Expression", format!("```\n{}\n```", expression), false)
        .field("Result", format!("```\n{}\n```", format_number(result)), false);
    cmd.reply_embed(embed).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unidades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Weight,
}

/// Factor hacia la unidad base: metros o gramos.
const UNITS: &[(&str, Dimension, f64)] = &[
    ("km", Dimension::Length, 1000.0),
    ("m", Dimension::Length, 1.0),
    ("cm", Dimension::Length, 0.01),
    ("mm", Dimension::Length, 0.001),
    ("mi", Dimension::Length, 1609.34),
    ("yd", Dimension::Length, 0.9144),
    ("ft", Dimension::Length, 0.3048),
    ("in", Dimension::Length, 0.0254),
    ("kg", Dimension::Weight, 1000.0),
    ("g", Dimension::Weight, 1.0),
    ("mg", Dimension::Weight, 0.001),
    ("lb", Dimension::Weight, 453.592),
    ("oz", Dimension::Weight, 28.3495),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("❌ Unsupported unit. Please use common length, weight or temperature units.")]
    UnsupportedUnit,
    #[error("❌ Cannot convert `{0}` to `{1}`.")]
    Incompatible(String, String),
}

fn to_celsius(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "c" => Some(value),
        "f" => Some((value - 32.0) * 5.0 / 9.0),
        "k" => Some(value - 273.15),
        _ => None,
    }
}

fn from_celsius(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "c" => Some(value),
        "f" => Some(value * 9.0 / 5.0 + 32.0),
        "k" => Some(value + 273.15),
        _ => None,
    }
}

/// Convierte `amount` entre dos unidades del mismo tipo. Las unidades no
/// distinguen mayúsculas.
pub fn convert_units(amount: f64, from: &str, to: &str) -> Result<f64, ConvertError> {
    let (from, to) = (from.to_lowercase(), to.to_lowercase());

    if let (Some(celsius), true) = (to_celsius(amount, &from), from_celsius(0.0, &to).is_some()) {
        return from_celsius(celsius, &to).ok_or(ConvertError::UnsupportedUnit);
    }

    let lookup = |unit: &str| UNITS.iter().find(|(name, _, _)| *name == unit);
    match (lookup(&from), lookup(&to)) {
        (Some((_, from_dim, from_factor)), Some((_, to_dim, to_factor))) => {
            if from_dim != to_dim {
                return Err(ConvertError::Incompatible(from, to));
            }
            Ok(amount * from_factor / to_factor)
        }
        (None, None) => Err(ConvertError::UnsupportedUnit),
        _ if to_celsius(0.0, &from).is_some() || to_celsius(0.0, &to).is_some() => {
            Err(ConvertError::Incompatible(from, to))
        }
        _ => Err(ConvertError::UnsupportedUnit),
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

pub async fn convert(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let parts: Vec<&str> = cmd.args.split_whitespace().collect();
    let [amount, from, to] = parts.as_slice() else {
        return Err(cmd.usage_error());
    };
    let amount = parse_amount(amount).ok_or_else(|| cmd.usage_error())?;

    let result =
        convert_units(amount, from, to).map_err(|e| CommandError::invalid(e.to_string()))?;

    let embed = CreateEmbed::default()
        .title("📏 Unit Conversion")
        .color(colors::SUCCESS_GREEN)
        .field("From", format!("`{} {}`", amount, from.to_lowercase()), true)
        .field("To", format!("`{:.2} {}`", result, to.to_lowercase()), true);
    cmd.reply_embed(embed).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Divisas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RatesResponse {
    pub result: String,
    #[serde(rename = "error-type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

/// `1234567.891` -> `1,234,567.89`
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{}{}.{:02}",
        sign,
        (cents / 100).to_formatted_string(&Locale::en),
        cents % 100
    )
}

async fn fetch_rates(http: &reqwest::Client, base: &str) -> CommandResult<RatesResponse> {
    let response = http
        .get(format!("{}/{}", RATES_ENDPOINT, base))
        .send()
        .await
        .map_err(anyhow::Error::from)?;
    if !response.status().is_success() {
        warn!("⚠️ API de divisas respondió {}", response.status());
        return Err(CommandError::invalid(
            "❌ Could not fetch exchange rates. The API might be down or the currency code is invalid.",
        ));
    }
    Ok(response.json().await.map_err(anyhow::Error::from)?)
}

fn currency_embed(amount: f64, from: &str, to: &str, rates: &RatesResponse) -> CommandResult<CreateEmbed> {
    if rates.result == "error" {
        return Err(CommandError::invalid(format!(
            "❌ API Error: `{}`",
            rates.error_type.as_deref().unwrap_or("unknown")
        )));
    }
    let rate = rates.rates.get(to).copied().ok_or_else(|| {
        CommandError::invalid(format!("❌ The target currency `{}` is not valid.", to))
    })?;

    Ok(CreateEmbed::default()
        .title("💱 Currency Conversion")
        .color(colors::CURRENCY_GOLD)
        .description(format!(
            "`{} {}` is equal to `{} {}`",
            format_money(amount),
            from,
            format_money(amount * rate),
            to
        ))
        .footer(CreateEmbedFooter::new(format!(
            "Rate: 1 {} = {} {}",
            from, rate, to
        ))))
}

pub async fn currency(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let parts: Vec<&str> = cmd.args.split_whitespace().collect();
    let [amount, from, to] = parts.as_slice() else {
        return Err(cmd.usage_error());
    };
    let amount = parse_amount(amount).ok_or_else(|| cmd.usage_error())?;
    let (from, to) = (from.to_uppercase(), to.to_uppercase());

    let placeholder = cmd
        .reply(format!("Fetching latest exchange rates for **{}**...", from))
        .await?;

    let outcome = match fetch_rates(&cmd.bot.http, &from).await {
        Ok(rates) => currency_embed(amount, &from, &to, &rates),
        Err(e) => Err(e),
    };
    cmd.settle(placeholder, outcome.map(|embed| EditMessage::new().embed(embed)))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("7 // 2").unwrap(), 3.0);
    }

    #[test]
    fn test_power_and_unary() {
        assert_eq!(evaluate("2^10").unwrap(), 1024.0);
        assert_eq!(evaluate("2**3").unwrap(), 8.0);
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
        assert_eq!(evaluate("2^-1").unwrap(), 0.5);
    }

    #[test]
    fn test_strips_other_characters() {
        assert_eq!(evaluate("5 apples + 3 pears").unwrap(), 8.0);
        assert_eq!(evaluate("x = 1.5 * 4").unwrap(), 6.0);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("abc"), Err(CalcError::Empty));
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("1 + 2)"), Err(CalcError::Unexpected(")".into())));
        assert_eq!(evaluate("1..2"), Err(CalcError::BadNumber("1..2".into())));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert_eq!(evaluate(&deep), Err(CalcError::TooDeep));
        assert_eq!(evaluate(&"-".repeat(5000)), Err(CalcError::TooDeep));

        let fine = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&fine), Ok(1.0));
        let long_flat = vec!["1"; 1000].join(" + ");
        assert_eq!(evaluate(&long_flat), Ok(1000.0));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_convert_length_and_weight() {
        let feet = convert_units(1.0, "m", "ft").unwrap();
        assert!((feet - 3.28084).abs() < 1e-4);
        let grams = convert_units(2.0, "KG", "g").unwrap();
        assert_eq!(grams, 2000.0);
    }

    #[test]
    fn test_convert_temperature() {
        assert_eq!(convert_units(100.0, "c", "f").unwrap(), 212.0);
        assert!((convert_units(32.0, "F", "c").unwrap()).abs() < 1e-9);
        assert!((convert_units(0.0, "k", "c").unwrap() + 273.15).abs() < 1e-9);
    }

    #[test]
    fn test_convert_errors() {
        assert_eq!(convert_units(1.0, "parsec", "m"), Err(ConvertError::UnsupportedUnit));
        assert_eq!(
            convert_units(1.0, "kg", "m"),
            Err(ConvertError::Incompatible("kg".into(), "m".into()))
        );
        assert_eq!(
            convert_units(1.0, "c", "m"),
            Err(ConvertError::Incompatible("c".into(), "m".into()))
        );
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(0.5), "0.50");
        assert_eq!(format_money(-1000.0), "-1,000.00");
    }

    #[test]
    fn test_currency_embed_errors() {
        let error = RatesResponse {
            result: "error".into(),
            error_type: Some("unsupported-code".into()),
            rates: HashMap::new(),
        };
        let err = currency_embed(1.0, "XXX", "USD", &error).unwrap_err();
        assert_eq!(err.reply_text("."), "❌ API Error: `unsupported-code`");

        let ok = RatesResponse {
            result: "success".into(),
            error_type: None,
            rates: HashMap::from([("EUR".to_string(), 0.9)]),
        };
        let err = currency_embed(1.0, "USD", "ABC", &ok).unwrap_err();
        assert_eq!(err.reply_text("."), "❌ The target currency `ABC` is not valid.");
        assert!(currency_embed(1.0, "USD", "EUR", &ok).is_ok());
    }
}
