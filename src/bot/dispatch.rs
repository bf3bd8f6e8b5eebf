use crate::bot::commands::{self, CommandSpec};

/// Un mensaje que nombra un comando conocido.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub spec: &'static CommandSpec,
    /// Primer token tal como se escribió, en minúsculas y antes de aplicar alias.
    pub invoked: String,
    pub args: &'a str,
}

/// Interpreta `content` como un comando con prefijo.
///
/// El primer token tras el prefijo pasa a minúsculas y, si `guild_alias`
/// lo conoce, se reemplaza por su comando. Solo se reescribe ese token;
/// los argumentos pasan intactos. Devuelve `None` para todo lo que no
/// sea un comando conocido.
pub fn parse<'a>(
    content: &'a str,
    prefix: &str,
    guild_alias: impl Fn(&str) -> Option<String>,
) -> Option<Invocation<'a>> {
    let body = content.strip_prefix(prefix)?;
    let (token, args) = match body.find(char::is_whitespace) {
        Some(end) => (&body[..end], body[end..].trim_start()),
        None => (body, ""),
    };
    if token.is_empty() {
        return None;
    }

    let invoked = token.to_lowercase();
    let name = guild_alias(&invoked).unwrap_or_else(|| invoked.clone());
    let spec = commands::find(&name)?;

    Some(Invocation {
        spec,
        invoked,
        args: args.trim_end(),
    })
}

/// Si `content` parece un comando, conocido o no.
pub fn has_prefix(content: &str, prefix: &str) -> bool {
    content
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(|c: char| !c.is_whitespace()))
}
