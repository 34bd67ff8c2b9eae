//! Declarative extension specifications.
//!
//! An [`ExtensionSpec`] describes what an extension is called, what it needs
//! and when it should wake up. Specs are built in code through
//! [`ExtensionSpec::builder`] and are immutable once registered.

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

/// Event name used for filetype triggers.
pub const FILETYPE_EVENT: &str = "FileType";

/// Runtime guard evaluated before a triggered activation.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// A condition that activates an extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// An editor event, optionally restricted to subjects matching a glob.
    Event {
        /// Event name, e.g. `BufReadPre`.
        event: String,
        /// Glob matched against the event subject; `None` matches any.
        pattern: Option<String>,
    },
    /// A user command.
    Command(String),
    /// A key sequence pressed in a mode.
    Key {
        /// Editor mode, e.g. `n`.
        mode: String,
        /// Key sequence, e.g. `<leader>z`.
        keys: String,
    },
    /// A buffer filetype; shorthand for a `FileType` event.
    FileType(String),
}

impl Trigger {
    /// Parses `"Event"` or `"Event pattern"` into an event trigger.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_activation::Trigger;
    ///
    /// let trigger = Trigger::parse_event("BufReadPre *.zig");
    /// assert_eq!(
    ///     trigger,
    ///     Trigger::Event {
    ///         event: "BufReadPre".into(),
    ///         pattern: Some("*.zig".into()),
    ///     }
    /// );
    /// ```
    #[must_use]
    pub fn parse_event(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some((event, pattern)) if !pattern.trim().is_empty() => Self::Event {
                event: event.to_owned(),
                pattern: Some(pattern.trim().to_owned()),
            },
            Some((event, _)) => Self::Event {
                event: event.to_owned(),
                pattern: None,
            },
            None => Self::Event {
                event: trimmed.to_owned(),
                pattern: None,
            },
        }
    }

    /// Returns the `(event, pattern)` pair this trigger is indexed under, or
    /// `None` for command and key triggers.
    #[must_use]
    pub fn as_event(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Self::Event { event, pattern } => Some((event.as_str(), pattern.as_deref())),
            Self::FileType(filetype) => Some((FILETYPE_EVENT, Some(filetype.as_str()))),
            Self::Command(_) | Self::Key { .. } => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event {
                event,
                pattern: Some(pattern),
            } => write!(f, "event {event} {pattern}"),
            Self::Event {
                event,
                pattern: None,
            } => write!(f, "event {event}"),
            Self::Command(name) => write!(f, "command {name}"),
            Self::Key { mode, keys } => write!(f, "key {mode} {keys}"),
            Self::FileType(filetype) => write!(f, "filetype {filetype}"),
        }
    }
}

/// Everything the engine knows about one extension.
#[derive(Clone)]
pub struct ExtensionSpec {
    name: String,
    version: String,
    dependencies: Vec<String>,
    triggers: Vec<Trigger>,
    lazy: bool,
    priority: i32,
    enabled: bool,
    predicate: Option<Predicate>,
    local_source: Option<Utf8PathBuf>,
    persistent_triggers: bool,
}

impl ExtensionSpec {
    /// Starts a spec for `name` at `version`.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_activation::ExtensionSpec;
    ///
    /// let spec = ExtensionSpec::builder("zig-tools", "1.2.0")
    ///     .depends_on("lsp-core")
    ///     .on_filetype("zig")
    ///     .build();
    /// assert!(spec.is_lazy());
    /// assert_eq!(spec.dependencies(), ["lsp-core"]);
    /// ```
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ExtensionSpecBuilder {
        ExtensionSpecBuilder::new(name.into(), version.into())
    }

    /// Unique extension name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Names of extensions that must be loaded first.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Declared triggers.
    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Whether activation waits for a trigger.
    #[must_use]
    pub const fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Ordering weight for [`load_all`](crate::ActivationEngine::load_all);
    /// higher loads first.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the extension may be activated at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Development checkout used instead of a registry install.
    #[must_use]
    pub fn local_source(&self) -> Option<&Utf8Path> {
        self.local_source.as_deref()
    }

    /// Whether triggers stay armed after the extension loads.
    #[must_use]
    pub const fn has_persistent_triggers(&self) -> bool {
        self.persistent_triggers
    }

    /// Evaluates the activation predicate; specs without one always pass.
    #[must_use]
    pub fn should_activate(&self) -> bool {
        self.predicate.as_ref().is_none_or(|predicate| predicate())
    }
}

impl fmt::Debug for ExtensionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("triggers", &self.triggers)
            .field("lazy", &self.lazy)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("local_source", &self.local_source)
            .field("persistent_triggers", &self.persistent_triggers)
            .finish()
    }
}

/// Builder for [`ExtensionSpec`].
///
/// `lazy` defaults to `true` when at least one trigger is declared and to
/// `false` otherwise.
#[must_use]
pub struct ExtensionSpecBuilder {
    name: String,
    version: String,
    dependencies: Vec<String>,
    triggers: Vec<Trigger>,
    lazy: Option<bool>,
    priority: i32,
    enabled: bool,
    predicate: Option<Predicate>,
    local_source: Option<Utf8PathBuf>,
    persistent_triggers: bool,
}

impl ExtensionSpecBuilder {
    const fn new(name: String, version: String) -> Self {
        Self {
            name,
            version,
            dependencies: Vec::new(),
            triggers: Vec::new(),
            lazy: None,
            priority: 0,
            enabled: true,
            predicate: None,
            local_source: None,
            persistent_triggers: false,
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Adds an arbitrary trigger.
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Adds an event trigger written as `"Event"` or `"Event pattern"`.
    pub fn on_event(self, event: &str) -> Self {
        self.trigger(Trigger::parse_event(event))
    }

    /// Adds a command trigger.
    pub fn on_command(self, name: impl Into<String>) -> Self {
        self.trigger(Trigger::Command(name.into()))
    }

    /// Adds a key trigger.
    pub fn on_key(self, mode: impl Into<String>, keys: impl Into<String>) -> Self {
        self.trigger(Trigger::Key {
            mode: mode.into(),
            keys: keys.into(),
        })
    }

    /// Adds a filetype trigger.
    pub fn on_filetype(self, filetype: impl Into<String>) -> Self {
        self.trigger(Trigger::FileType(filetype.into()))
    }

    /// Overrides the lazy flag.
    pub const fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Sets the load priority.
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables the extension.
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Installs an activation predicate.
    pub fn predicate(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Loads the extension from a local checkout instead of the registry.
    pub fn local_source(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.local_source = Some(path.into());
        self
    }

    /// Keeps triggers armed after the extension loads.
    pub const fn persistent_triggers(mut self, persistent: bool) -> Self {
        self.persistent_triggers = persistent;
        self
    }

    /// Finishes the extension spec.
    #[must_use]
    pub fn build(self) -> ExtensionSpec {
        let lazy = self.lazy.unwrap_or(!self.triggers.is_empty());
        ExtensionSpec {
            name: self.name,
            version: self.version,
            dependencies: self.dependencies,
            triggers: self.triggers,
            lazy,
            priority: self.priority,
            enabled: self.enabled,
            predicate: self.predicate,
            local_source: self.local_source,
            persistent_triggers: self.persistent_triggers,
        }
    }
}
