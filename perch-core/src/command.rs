//! Chat command grammar.
//!
//! ```text
//! !perch <generator>[:<list>|:<code>] [var=value ...] [%n=<count>] [%reset]
//! Perch, <question> (<generator>)
//! ```
//!
//! Parsing is pure: it never touches the network or a generator instance.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Marker prefix telling the resolver that the selector is inline code.
pub const CODE_MARKER: &str = "~>";

/// Largest accepted `%n` repeat count.
pub const MAX_REPEAT: u32 = 100;

/// Generator name that requests a full bot restart.
const RESET_BOT_GENERATOR: &str = "%reset";

/// Directive token that evicts the named generator from the cache.
const RESET_ENTRY_TOKEN: &str = "%reset";

/// List name standing in for inline code while the command is tokenized.
const INLINE_CODE_LIST: &str = "__perch_inline_code__";

/// Stands in for spaces inside double-quoted values while tokenizing.
const QUOTED_SPACE: char = '\u{1f}';

pub const USAGE: &str = "Your command should be formatted like these examples:\n\
```!perch generator-name```\
Output a specific list name:\n\
```!perch generator-name:listName```\
Set variables and inputs:\n\
```!perch generator-name:listName variable1=value variable2.thing=value```\
Values with spaces go in double quotes:\n\
```!perch generator-name name=\"Ada Lovelace\"```\
Generate multiple results:\n\
```!perch generator-name:listName %n=3```\
Run custom code:\n\
```!perch animal-sentence:<the [animal] ate {2-4} [noun.pluralForm]>```\
Forget a cached generator:\n\
```!perch generator-name %reset```";

static QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Pp]erch,.+\((.+)\)").expect("valid question regex"));

static QUOTED_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"="([^"]+)""#).expect("valid quoted value regex"));

/// The command text addressed to the bot, with the prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub body: String,
}

impl Invocation {
    /// Query text when the command asks for a search (`>cool dnd items`).
    pub fn search_query(&self) -> Option<&str> {
        self.body.strip_prefix('>')
    }

    /// Replace the command body, e.g. with a generator name found by search.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Detect whether a chat message is addressed to the bot.
///
/// `Perch, ... (generator)` questions take precedence over the prefix form.
/// A question without a parenthesised generator uses `default_generator`.
pub fn extract_invocation(
    content: &str,
    prefix: &str,
    default_generator: &str,
) -> Option<Invocation> {
    let trimmed = content.trim();
    let question = QUESTION_RE
        .captures(trimmed)
        .map(|caps| caps[1].to_string())
        .or_else(|| {
            let with_default = format!("{} ({})", trimmed, default_generator);
            QUESTION_RE
                .captures(&with_default)
                .map(|caps| caps[1].to_string())
        });

    if let Some(body) = question {
        return Some(Invocation { body });
    }

    content.strip_prefix(prefix).map(|rest| Invocation {
        body: rest.to_string(),
    })
}

/// Value assigned to a generator variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AssignedValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl AssignedValue {
    /// Coerce a raw token value: canonical numbers, `true`/`false`, else text
    /// with literal `\n` sequences turned into newlines.
    pub fn coerce(raw: &str) -> Self {
        if let Some(number) = canonical_number(raw) {
            return Self::Number(number);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(raw.replace("\\n", "\n")),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A `path=value` pair applied to a generator before output is read.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Dot-separated path such as `city.stats.population` or `inputEl.value`
    pub path: String,
    pub value: AssignedValue,
}

impl Assignment {
    pub fn new(path: impl Into<String>, value: AssignedValue) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// A generator run request.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCommand {
    pub generator: String,
    /// List path, or `~>`-prefixed inline code
    pub list: Option<String>,
    pub assignments: Vec<Assignment>,
    /// How many times to resolve, within `1..=MAX_REPEAT`
    pub repeat: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(RunCommand),
    /// Drop one generator from the instance cache
    ResetEntry { generator: String },
    /// Restart the whole bot process
    ResetBot,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("malformed command")]
    Usage,
}

impl CommandError {
    /// Reply text shown to the user.
    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::Usage => USAGE,
        }
    }
}

/// Parse a command body (the text after `!perch `).
pub fn parse_command(body: &str) -> Result<Command, CommandError> {
    let (body, inline_code) = extract_inline_code(body.trim());

    let (head, remainder) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest),
        None => (body.as_str(), ""),
    };
    if head.is_empty() {
        return Err(CommandError::Usage);
    }

    let (generator, list) = match head.split_once(':') {
        // `name:` with nothing after the colon reads the default output
        Some((generator, list)) => (
            generator.to_string(),
            Some(list.to_string()).filter(|list| !list.is_empty()),
        ),
        None => (head.to_string(), None),
    };

    let protected = protect_quoted_spaces(remainder);
    let tokens: Vec<&str> = protected.split_whitespace().collect();

    if tokens.contains(&RESET_ENTRY_TOKEN) {
        return Ok(Command::ResetEntry { generator });
    }

    let mut assignments = Vec::new();
    let mut directives: HashMap<String, AssignedValue> = HashMap::new();
    for token in tokens {
        let Some((key, raw_value)) = token.split_once('=') else {
            return Err(CommandError::Usage);
        };
        let value = match AssignedValue::coerce(raw_value) {
            AssignedValue::Text(text) => AssignedValue::Text(text.replace(QUOTED_SPACE, " ")),
            other => other,
        };
        match key.strip_prefix('%') {
            Some(directive) => {
                directives.insert(directive.to_string(), value);
            }
            None => assignments.push(Assignment::new(key, value)),
        }
    }

    if generator == RESET_BOT_GENERATOR {
        return Ok(Command::ResetBot);
    }

    let list = match (list, inline_code) {
        (Some(list), Some(code)) if list == INLINE_CODE_LIST => {
            Some(format!("{}{}", CODE_MARKER, code))
        }
        (list, _) => list,
    };

    Ok(Command::Run(RunCommand {
        generator,
        list,
        assignments,
        repeat: repeat_count(directives.get("n")),
    }))
}

/// Swap `name:<code>` for a placeholder list name so the code's spaces don't
/// split the command. The code runs up to the first `>`.
fn extract_inline_code(body: &str) -> (String, Option<String>) {
    let first_token = body.split(char::is_whitespace).next().unwrap_or_default();
    if !first_token.contains(":<") {
        return (body.to_string(), None);
    }
    let Some(open) = body.find(":<") else {
        return (body.to_string(), None);
    };
    let code_start = open + 2;
    let (code, after) = match body[code_start..].find('>') {
        Some(close) => (
            &body[code_start..code_start + close],
            &body[code_start + close + 1..],
        ),
        None => (&body[code_start..], ""),
    };
    let rewritten = format!("{}:{}{}", &body[..open], INLINE_CODE_LIST, after);
    (rewritten, Some(code.to_string()))
}

fn protect_quoted_spaces(text: &str) -> String {
    QUOTED_VALUE_RE
        .replace_all(text, |caps: &regex::Captures| {
            format!("={}", caps[1].replace(' ', &QUOTED_SPACE.to_string()))
        })
        .into_owned()
}

fn repeat_count(value: Option<&AssignedValue>) -> u32 {
    let requested = value.and_then(AssignedValue::as_number).unwrap_or(1.0);
    if requested.is_nan() || requested < 1.0 {
        return 1;
    }
    requested.min(f64::from(MAX_REPEAT)).ceil() as u32
}

/// Parse `raw` as a number only if formatting the number gives `raw` back,
/// so `3` and `-0.5` coerce while `03`, `+3` and `1e3` stay text.
fn canonical_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    (format_number(value) == raw).then_some(value)
}

fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
