//! Phrase table: canonical command identifiers and the phrases that trigger them.
//!
//! Loaded once at startup from a delimited file with a header row naming at
//! least a `command` and a `phrase` column:
//!
//! ```text
//! command,phrase
//! open_youtube,open youtube
//! open_youtube,youtube
//! ```
//!
//! Rows missing either field are skipped. Values are trimmed and phrases are
//! lower-cased. A command may have many phrases, but a phrase belongs to
//! exactly one command: the same phrase under two commands is an error.

use crate::error::{Result, VoxgateError};
use std::collections::HashMap;
use std::path::Path;

/// One command and its phrases, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPhrases {
    pub command: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseTable {
    entries: Vec<CommandPhrases>,
    by_command: HashMap<String, usize>,
    owner: HashMap<String, String>,
}

impl PhraseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxgateError::PhraseTableNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxgateError::Io(e)
            }
        })?;
        let table = Self::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            commands = table.len(),
            phrases = table.phrase_count(),
            "loaded phrase table"
        );
        Ok(table)
    }

    /// Parse delimited text with a header row.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((header_line, header)) = lines.next() else {
            return Err(VoxgateError::PhraseTableEmpty);
        };
        let header = split_record(header, header_line)?;
        let column = |name: &str| {
            header
                .iter()
                .position(|field| field.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| VoxgateError::PhraseTableMalformed {
                    line: header_line,
                    message: format!("missing '{}' column", name),
                })
        };
        let command_col = column("command")?;
        let phrase_col = column("phrase")?;

        let mut table = Self::new();
        for (line_no, line) in lines {
            let fields = split_record(line, line_no)?;
            let command = fields.get(command_col).map(|s| s.trim()).unwrap_or("");
            let phrase = fields.get(phrase_col).map(|s| s.trim()).unwrap_or("");
            if command.is_empty() || phrase.is_empty() {
                tracing::debug!(line = line_no, "skipping phrase row with a missing field");
                continue;
            }
            table.insert(command, phrase)?;
        }

        if table.is_empty() {
            return Err(VoxgateError::PhraseTableEmpty);
        }
        Ok(table)
    }

    /// Build a table from `(command, phrase)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut table = Self::new();
        for (command, phrase) in pairs {
            table.insert(command, phrase)?;
        }
        Ok(table)
    }

    /// Add a phrase. Returns false if the command already had it.
    pub fn insert(&mut self, command: &str, phrase: &str) -> Result<bool> {
        let command = command.trim();
        let phrase = phrase.trim().to_lowercase();

        if let Some(existing) = self.owner.get(&phrase) {
            if existing == command {
                tracing::warn!(command, phrase = %phrase, "duplicate phrase ignored");
                return Ok(false);
            }
            return Err(VoxgateError::PhraseConflict {
                phrase,
                first: existing.clone(),
                second: command.to_string(),
            });
        }

        let index = match self.by_command.get(command) {
            Some(&index) => index,
            None => {
                self.entries.push(CommandPhrases {
                    command: command.to_string(),
                    phrases: Vec::new(),
                });
                self.by_command
                    .insert(command.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[index].phrases.push(phrase.clone());
        self.owner.insert(phrase, command.to_string());
        Ok(true)
    }

    /// Commands in first-seen order.
    pub fn entries(&self) -> &[CommandPhrases] {
        &self.entries
    }

    pub fn phrases(&self, command: &str) -> Option<&[String]> {
        self.by_command
            .get(command)
            .map(|&index| self.entries[index].phrases.as_slice())
    }

    /// Command owning `phrase`, if any.
    pub fn command_for(&self, phrase: &str) -> Option<&str> {
        self.owner.get(phrase).map(String::as_str)
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn phrase_count(&self) -> usize {
        self.owner.len()
    }
}

/// Split one record on commas, honoring double quotes (`""` is a literal quote).
fn split_record(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(VoxgateError::PhraseTableMalformed {
            line: line_no,
            message: "unterminated quoted field".to_string(),
        });
    }
    fields.push(field);
    Ok(fields)
}
