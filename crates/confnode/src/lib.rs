//! Hierarchical typed configuration store.
//!
//! A [`Config`] owns a tree of named settings. Groups hold named members,
//! Arrays hold scalars of one type and Lists hold anything. Settings are
//! reached by paths such as `server.hosts[0]` and read as Rust types with
//! [`Setting::get`]:
//!
//! ```
//! use confnode::Config;
//!
//! let mut config = Config::new();
//! config.read_str("server : { port = 8080; hosts = [ \"a\", \"b\" ]; };")?;
//!
//! let port: u16 = config.lookup("server.port")?.get()?;
//! assert_eq!(port, 8080);
//! assert_eq!(config.lookup_or("server.timeout", 30), 30);
//! # Ok::<(), confnode::Error>(())
//! ```
//!
//! Strict accessors (`lookup`, `get`, `set`, `add`, `remove`) return
//! [`Error`]. Permissive ones (`exists`, `lookup_value`, `try_lookup`,
//! `lookup_or`) turn every failure into `false`, `None` or the default.

pub mod codec;
mod config;
mod errors;
mod key_path;
mod options;
mod resolver;
mod setting;
mod tree;
mod value;

pub use codec::{LibconfigCodec, ParseError, TextCodec};
pub use config::{Config, ConfigBuilder};
pub use errors::{Error, Result};
pub use key_path::{is_valid_name, InvalidPath, KeyPath, Segment};
pub use options::Options;
pub use setting::{Setting, SettingMut};
pub use tree::{SettingId, Tree};
pub use value::{Conversion, FromValue, IntoValue, SettingFormat, SettingType, Value};
