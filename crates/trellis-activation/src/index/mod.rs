//! Lookup from concrete triggers to the extensions they activate.

use std::collections::HashMap;

use globset::{Glob, GlobMatcher};

use crate::spec::Trigger;

#[derive(Debug, Clone)]
struct EventEntry {
    trigger: Trigger,
    matcher: Option<GlobMatcher>,
    extension: String,
}

/// Index of armed triggers.
///
/// Event entries carry a compiled glob matched against the event subject;
/// command and key entries match exactly.
#[derive(Debug, Clone, Default)]
pub struct TriggerIndex {
    events: HashMap<String, Vec<EventEntry>>,
    commands: HashMap<String, Vec<String>>,
    keys: HashMap<(String, String), Vec<String>>,
}

impl TriggerIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms every trigger of `extension`.
    ///
    /// Either all triggers are inserted or, on the first invalid pattern,
    /// none are.
    ///
    /// # Errors
    ///
    /// Returns the offending pattern and the glob diagnostic.
    pub fn insert_all(
        &mut self,
        extension: &str,
        triggers: &[Trigger],
    ) -> Result<(), (String, globset::Error)> {
        let mut compiled = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let matcher = match trigger.as_event() {
                Some((_, Some(pattern))) => Some(
                    Glob::new(pattern)
                        .map_err(|error| (pattern.to_owned(), error))?
                        .compile_matcher(),
                ),
                _ => None,
            };
            compiled.push((trigger, matcher));
        }

        for (trigger, matcher) in compiled {
            self.insert(extension, trigger, matcher);
        }
        Ok(())
    }

    fn insert(&mut self, extension: &str, trigger: &Trigger, matcher: Option<GlobMatcher>) {
        let extension = extension.to_owned();
        match trigger {
            Trigger::Command(name) => push_unique(
                self.commands.entry(name.clone()).or_default(),
                extension,
            ),
            Trigger::Key { mode, keys } => push_unique(
                self.keys.entry((mode.clone(), keys.clone())).or_default(),
                extension,
            ),
            Trigger::Event { .. } | Trigger::FileType(_) => {
                let Some((event, _)) = trigger.as_event() else {
                    return;
                };
                self.events
                    .entry(event.to_owned())
                    .or_default()
                    .push(EventEntry {
                        trigger: trigger.clone(),
                        matcher,
                        extension,
                    });
            }
        }
    }

    /// Extensions armed for `event` whose pattern matches `subject`, in
    /// insertion order and without duplicates.
    #[must_use]
    pub fn match_event(&self, event: &str, subject: &str) -> Vec<String> {
        let mut found = Vec::new();
        for entry in self.events.get(event).into_iter().flatten() {
            let matches = entry
                .matcher
                .as_ref()
                .is_none_or(|matcher| matcher.is_match(subject));
            if matches {
                push_unique(&mut found, entry.extension.clone());
            }
        }
        found
    }

    /// Extensions armed for the command `name`.
    #[must_use]
    pub fn match_command(&self, name: &str) -> Vec<String> {
        self.commands.get(name).cloned().unwrap_or_default()
    }

    /// Extensions armed for `keys` in `mode`.
    #[must_use]
    pub fn match_key(&self, mode: &str, keys: &str) -> Vec<String> {
        self.keys
            .get(&(mode.to_owned(), keys.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Disarms every trigger of `extension`.
    pub fn remove_extension(&mut self, extension: &str) {
        for entries in self.events.values_mut() {
            entries.retain(|entry| entry.extension != extension);
        }
        self.events.retain(|_, entries| !entries.is_empty());
        for names in self.commands.values_mut() {
            names.retain(|name| name != extension);
        }
        self.commands.retain(|_, names| !names.is_empty());
        for names in self.keys.values_mut() {
            names.retain(|name| name != extension);
        }
        self.keys.retain(|_, names| !names.is_empty());
    }

    /// Triggers still armed for `extension`.
    #[must_use]
    pub fn armed(&self, extension: &str) -> Vec<Trigger> {
        let events = self
            .events
            .values()
            .flatten()
            .filter(|entry| entry.extension == extension)
            .map(|entry| entry.trigger.clone());
        let commands = self
            .commands
            .iter()
            .filter(|(_, names)| names.iter().any(|name| name == extension))
            .map(|(command, _)| Trigger::Command(command.clone()));
        let keys = self
            .keys
            .iter()
            .filter(|(_, names)| names.iter().any(|name| name == extension))
            .map(|((mode, keys), _)| Trigger::Key {
                mode: mode.clone(),
                keys: keys.clone(),
            });
        let mut armed: Vec<Trigger> = events.chain(commands).chain(keys).collect();
        armed.sort_by_key(ToString::to_string);
        armed
    }

    /// Total number of armed trigger entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum::<usize>()
            + self.commands.values().map(Vec::len).sum::<usize>()
            + self.keys.values().map(Vec::len).sum::<usize>()
    }

    /// Returns `true` when nothing is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

#[cfg(test)]
mod tests;
