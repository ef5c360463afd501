//! Structured form of a generated command.
//!
//! Generated command text is parsed once into a [`CommandIntent`]
//! (operation kind, target, flags), normalized on that structure, and
//! rendered back to a single shell string. Only simple commands are
//! restructured; anything with shell operators or redirections passes
//! through verbatim.

use std::fmt;

/// Fragments that make a command compound (or a navigation target unsafe).
pub const SHELL_METACHARACTERS: &[&str] = &[";", "&&", "||", "|", "`", "$(", "&", "<", ">"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Pip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    Install,
    Remove,
    Purge,
    Update,
    Upgrade,
}

impl PackageAction {
    fn parse(manager: PackageManager, word: &str) -> Option<Self> {
        match (manager, word) {
            (_, "install") => Some(Self::Install),
            (PackageManager::Apt, "remove") | (PackageManager::Pip, "uninstall") => {
                Some(Self::Remove)
            }
            (PackageManager::Apt, "purge") => Some(Self::Purge),
            (PackageManager::Apt, "update") => Some(Self::Update),
            (PackageManager::Apt, "upgrade") => Some(Self::Upgrade),
            _ => None,
        }
    }

    fn word(self, manager: PackageManager) -> &'static str {
        match (self, manager) {
            (Self::Install, _) => "install",
            (Self::Remove, PackageManager::Pip) => "uninstall",
            (Self::Remove, PackageManager::Apt) => "remove",
            (Self::Purge, _) => "purge",
            (Self::Update, _) => "update",
            (Self::Upgrade, _) => "upgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    /// `cd <target>`; resolved specially by the step executor.
    ChangeDirectory,
    Package {
        manager: PackageManager,
        /// The executable as written, e.g. "apt", "apt-get", "pip3".
        program: String,
        action: PackageAction,
    },
    /// Anything else, rendered verbatim.
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandIntent {
    pub kind: IntentKind,
    /// Package names, or the directory for `ChangeDirectory`.
    pub target: Vec<String>,
    pub flags: Vec<String>,
    /// Command text with a leading `sudo` removed.
    text: String,
}

impl CommandIntent {
    pub fn parse(raw: &str) -> Self {
        let text = strip_sudo(raw.trim()).to_string();

        if let Some(target) = navigation_target(&text) {
            let target = if target.is_empty() { vec![] } else { vec![target.to_string()] };
            return Self {
                kind: IntentKind::ChangeDirectory,
                target,
                flags: vec![],
                text,
            };
        }

        let shell = |text: String| Self {
            kind: IntentKind::Shell,
            target: vec![],
            flags: vec![],
            text,
        };

        if is_compound(&text) {
            return shell(text);
        }
        let Some(words) = shell_words(&text) else {
            return shell(text);
        };

        let mut words = words
            .into_iter()
            .skip_while(|w| w.value.starts_with("DEBIAN_FRONTEND="));
        let Some(program) = words.next() else {
            return shell(text);
        };
        let manager = match program.value.as_str() {
            "apt" | "apt-get" => PackageManager::Apt,
            "pip" | "pip3" => PackageManager::Pip,
            _ => return shell(text),
        };

        let mut action = None;
        let mut target = Vec::new();
        let mut flags = Vec::new();
        let mut takes_value = false;
        for word in words {
            if takes_value {
                flags.push(word.raw);
                takes_value = false;
            } else if word.value.starts_with('-') {
                // apt's `-o Key=Value` carries its value as the next word
                takes_value = word.value == "-o";
                flags.push(word.raw);
            } else if action.is_none() {
                match PackageAction::parse(manager, &word.value) {
                    Some(parsed) => action = Some(parsed),
                    None => return shell(text),
                }
            } else {
                target.push(word.raw);
            }
        }
        let Some(action) = action else {
            return shell(text);
        };
        let program = program.raw;

        Self {
            kind: IntentKind::Package {
                manager,
                program,
                action,
            },
            target,
            flags,
            text,
        }
    }

    /// Applies the non-interactive root-shell conventions.
    pub fn normalized(mut self) -> Self {
        if let IntentKind::Package {
            manager,
            program,
            action,
        } = &mut self.kind
        {
            match manager {
                PackageManager::Apt => {
                    *program = "apt-get".to_string();
                    if *action != PackageAction::Update {
                        self.flags.retain(|f| f != "-y" && f != "--yes" && f != "--assume-yes");
                        self.flags.insert(0, "-y".to_string());
                    }
                }
                PackageManager::Pip => {
                    let confirmed = self.flags.iter().any(|f| f == "-y" || f == "--yes");
                    if *action == PackageAction::Remove && !confirmed {
                        self.flags.insert(0, "-y".to_string());
                    }
                }
            }
        }
        self
    }

    pub fn render(&self) -> String {
        match &self.kind {
            IntentKind::ChangeDirectory | IntentKind::Shell => self.text.clone(),
            IntentKind::Package {
                manager,
                program,
                action,
            } => {
                // Words keep their original quoting so the shell still
                // expands `~`, `$VAR` and globs in them
                let mut words = vec![program.as_str(), action.word(*manager)];
                words.extend(self.flags.iter().map(String::as_str));
                words.extend(self.target.iter().map(String::as_str));
                let joined = words.join(" ");
                if *manager == PackageManager::Apt && *action != PackageAction::Update {
                    format!("DEBIAN_FRONTEND=noninteractive {joined}")
                } else {
                    joined
                }
            }
        }
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parses, normalizes and renders generated command text.
pub fn normalize_command(raw: &str) -> String {
    CommandIntent::parse(raw).normalized().render()
}

/// Returns the target of a directory-change command (`""` for bare `cd`),
/// or `None` if `command` is not one.
pub fn navigation_target(command: &str) -> Option<&str> {
    let command = command.trim();
    let rest = command.strip_prefix("cd")?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// True when `text` contains any denylisted shell metacharacter.
pub fn contains_metacharacter(text: &str) -> bool {
    SHELL_METACHARACTERS.iter().any(|m| text.contains(m))
}

fn is_compound(text: &str) -> bool {
    contains_metacharacter(text) || text.contains('\n')
}

/// One shell word: `raw` as written (quotes included), `value` as the
/// shell would see it after quote removal.
struct Word {
    raw: String,
    value: String,
}

/// Splits `text` on unquoted whitespace. `None` on unbalanced quotes.
fn shell_words(text: &str) -> Option<Vec<Word>> {
    let mut raw_words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    current.extend(chars.next());
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '\\' => {
                    current.push(c);
                    current.extend(chars.next());
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        raw_words.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        raw_words.push(current);
    }

    raw_words
        .into_iter()
        .map(|raw| {
            let mut values = shlex::split(&raw)?;
            if values.len() != 1 {
                return None;
            }
            let value = values.pop()?;
            Some(Word { raw, value })
        })
        .collect()
}

fn strip_sudo(text: &str) -> &str {
    match text.strip_prefix("sudo") {
        Some(rest)
            if rest.starts_with(char::is_whitespace) && !rest.trim_start().starts_with('-') =>
        {
            rest.trim_start()
        }
        _ => text,
    }
}
