//! Creation parameters.

use crate::layout::DEFAULT_CONTROL_SIZE;
use crate::log::DEFAULT_LOG_SIZE;
use crate::value::Value;

/// Sizing and naming of a new container.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the container; a random `psm_<uuid>` name when `None`.
    pub name: Option<String>,
    /// Size of the operation log segment in bytes.
    pub log_size: usize,
    /// Size of the control segment in bytes.
    pub control_size: usize,
    /// Promote container elements into nested shared containers.
    ///
    /// Ignored for sets.
    pub nested: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            log_size: DEFAULT_LOG_SIZE,
            control_size: DEFAULT_CONTROL_SIZE,
            nested: false,
        }
    }
}

impl Config {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_log_size(mut self, log_size: usize) -> Self {
        self.log_size = log_size;
        self
    }

    pub fn with_control_size(mut self, control_size: usize) -> Self {
        self.control_size = control_size;
        self
    }

    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    /// Sizes for a child created inside a nested tree.
    pub(crate) fn for_child(&self) -> Self {
        Self {
            name: None,
            log_size: self.log_size,
            control_size: self.control_size,
            nested: true,
        }
    }
}

/// Create-or-attach request, the single entry point behind
/// [`SharedObject::create`](crate::SharedObject::create) and
/// [`SharedObject::attach`](crate::SharedObject::attach).
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Create a new container instead of attaching to an existing one.
    pub create: bool,
    /// Initial contents; required when creating.
    pub value: Option<Value>,
    pub config: Config,
}

impl Options {
    pub fn create(value: impl Into<Value>) -> Self {
        Self {
            create: true,
            value: Some(value.into()),
            config: Config::default(),
        }
    }

    pub fn attach(name: impl Into<String>) -> Self {
        Self {
            create: false,
            value: None,
            config: Config::default().with_name(name),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

/// Exclusion hook wrapped around every mutation.
///
/// The container itself assumes a single writer at a time. Callers that
/// cannot guarantee this can install a cross-process lock here; it is held
/// from the pull that precedes a mutation until the mutation is published.
pub trait WriterLock: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_size, 10_000);
        assert_eq!(config.control_size, 1000);
        assert!(!config.nested);
        assert!(config.name.is_none());
    }

    #[test]
    fn test_child_config_inherits_sizes() {
        let parent = Config::default()
            .with_name("root")
            .with_log_size(512)
            .with_control_size(400);
        let child = parent.for_child();
        assert_eq!(child.name, None);
        assert_eq!(child.log_size, 512);
        assert_eq!(child.control_size, 400);
        assert!(child.nested);
    }

    #[test]
    fn test_options() {
        let create = Options::create(Value::seq([1]));
        assert!(create.create);
        assert!(create.value.is_some());

        let attach = Options::attach("list_obj");
        assert!(!attach.create);
        assert_eq!(attach.config.name.as_deref(), Some("list_obj"));
    }
}
