//! Command registry, alias table and `/command` parsing.
//!
//! The registry is an ordered list of [`CommandSpec`] entries. [`AliasTable`] is built
//! from it once and shared (read-only) by every connection of a client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Command used for input that does not start with `/<word>`.
pub const MESSAGE_COMMAND: &str = "message";

/// One entry of the command registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    /// Names that resolve to this command. When absent, only `command` itself does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    /// Replacement for the leading `/<alias>`, e.g. `/msg NickServ`. Empty means `/<command>`.
    #[serde(default, alias = "aliasFor", skip_serializing_if = "Option::is_none")]
    pub alias_for: Option<String>,
}

impl CommandSpec {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            aliases: None,
            alias_for: None,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = Some(aliases.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn alias_for(mut self, target: &str) -> Self {
        self.alias_for = Some(target.to_string());
        self
    }

    fn canonical(&self) -> String {
        match self.alias_for.as_deref() {
            Some(target) if !target.is_empty() => target.to_string(),
            _ => format!("/{}", self.command),
        }
    }
}

/// The commands the client knows about out of the box.
pub fn builtin_registry() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("me"),
        CommandSpec::new("msg"),
        CommandSpec::new("say"),
        CommandSpec::new("query").with_aliases(&["query", "q"]),
        CommandSpec::new("join").with_aliases(&["join", "j"]),
        CommandSpec::new("part").with_aliases(&["part", "leave"]),
        CommandSpec::new("close"),
        CommandSpec::new("names"),
        CommandSpec::new("topic"),
        CommandSpec::new("whois"),
        CommandSpec::new("nick"),
        CommandSpec::new("kick"),
        CommandSpec::new("mode"),
        CommandSpec::new("list"),
        CommandSpec::new("reconnect"),
        CommandSpec::new("cs").alias_for("/msg ChanServ"),
        CommandSpec::new("ns").alias_for("/msg NickServ"),
    ]
}

/// Parsed `/<command> <target>` prefix of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub command: String,
    /// First whitespace-delimited token after the command (`#foo` in `/close #foo`), or `""`.
    pub target: String,
}

impl Action {
    pub fn parse(text: &str) -> Self {
        match split_command(text) {
            Some((command, rest)) => Self {
                command: command.to_string(),
                target: rest
                    .trim_start()
                    .split(char::is_whitespace)
                    .next()
                    .unwrap_or("")
                    .to_string(),
            },
            None => Self {
                command: MESSAGE_COMMAND.to_string(),
                target: String::new(),
            },
        }
    }
}

/// Splits `/word rest` into (`word`, ` rest`). `word` is `[A-Za-z0-9_]+`.
fn split_command(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_prefix('/')?;
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    if end == 0 {
        return None;
    }
    Some(body.split_at(end))
}

/// Alias name → canonical `/command` token.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    canonical: HashMap<String, String>,
}

impl AliasTable {
    /// Build from an ordered registry. Later entries win when two declare the same alias.
    pub fn from_registry(registry: &[CommandSpec]) -> Self {
        let mut canonical = HashMap::new();
        for spec in registry {
            let target = spec.canonical();
            match &spec.aliases {
                Some(aliases) => {
                    for alias in aliases {
                        canonical.insert(alias.clone(), target.clone());
                    }
                }
                None => {
                    canonical.insert(spec.command.clone(), target);
                }
            }
        }
        Self { canonical }
    }

    pub fn builtin() -> Self {
        Self::from_registry(&builtin_registry())
    }

    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.canonical.get(alias).map(String::as_str)
    }

    /// Substitute the canonical token for the leading `/<alias>` and parse the result.
    ///
    /// Exactly one substitution: the replacement is not looked up again.
    pub fn rewrite(&self, text: &str) -> (String, Action) {
        if let Some((word, rest)) = split_command(text) {
            if let Some(canonical) = self.resolve(word) {
                let rewritten = format!("{canonical}{rest}");
                let action = Action::parse(&rewritten);
                return (rewritten, action);
            }
        }
        (text.to_string(), Action::parse(text))
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
