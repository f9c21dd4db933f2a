//! Registry of the nested containers belonging to one tree.
//!
//! The registry is itself a shared set of names, stored under
//! `{root}_register`. Unlinking the root walks it to remove every child.

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Result;
use crate::object::SharedObject;
use crate::value::Value;

/// Name of the registry belonging to root container `root`.
pub fn registry_name(root: &str) -> String {
    format!("{}_register", root)
}

pub(crate) struct Registry<C: Codec> {
    handle: SharedObject<C>,
}

impl<C: Codec> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<C: Codec> Registry<C> {
    /// Create the registry for root container `root`, sized like the root.
    pub fn create(root: &str, config: &Config) -> Result<Self> {
        let config = Config {
            name: Some(registry_name(root)),
            log_size: config.log_size,
            control_size: config.control_size,
            nested: false,
        };
        let handle = SharedObject::create(Value::Set(Default::default()), &config)?;
        Ok(Self { handle })
    }

    pub fn attach(name: &str) -> Result<Self> {
        Ok(Self {
            handle: SharedObject::attach(name)?,
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn register(&self, child: &str) -> Result<()> {
        self.handle.add(child)
    }

    pub fn discard(&self, child: &str) -> Result<()> {
        self.handle.discard(child)
    }

    /// Every registered child name.
    pub fn names(&self) -> Result<Vec<String>> {
        let names = match self.handle.to_value()? {
            Value::Set(members) => members
                .into_iter()
                .filter_map(|v| match v {
                    Value::Str(name) => Some(name),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(names)
    }

    pub fn close(&self) {
        self.handle.close();
    }
}
