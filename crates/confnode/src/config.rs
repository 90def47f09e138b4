//! The document owner: one [`Tree`] plus the codec that reads and writes it.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;

use crate::codec::{LibconfigCodec, ParseError, TextCodec};
use crate::errors::{Error, Result};
use crate::options::Options;
use crate::setting::{Setting, SettingMut};
use crate::tree::{SettingId, Tree};
use crate::value::FromValue;

/// Builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    options: Option<Options>,
    codec: Option<Arc<dyn TextCodec>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    /// Replace the bundled libconfig codec.
    pub fn with_codec<C>(mut self, codec: C) -> Self
    where
        C: TextCodec + 'static,
    {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn build(self) -> Config {
        Config {
            tree: Tree::with_options(self.options.unwrap_or_default()),
            codec: self.codec.unwrap_or_else(|| Arc::new(LibconfigCodec)),
        }
    }
}

/// A settings document that can be read from and written to text.
///
/// Every successful read replaces the whole tree. Ids handed out before the
/// read report [`Error::StaleHandle`] afterwards.
pub struct Config {
    tree: Tree,
    codec: Arc<dyn TextCodec>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl Config {
    pub fn new() -> Self {
        ConfigBuilder::new().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn options(&self) -> &Options {
        self.tree.options()
    }

    pub fn set_options(&mut self, options: Options) {
        self.tree.set_options(options);
    }

    // ---- reading -------------------------------------------------------

    /// Consume `reader` to the end and replace the tree with its contents.
    /// On failure the current tree is kept.
    pub fn read(&mut self, mut reader: impl Read) -> Result<()> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let len = bytes.len();
        self.load(bytes)?;
        tracing::debug!(bytes = len, nodes = self.tree.node_count(), "read config");
        Ok(())
    }

    pub fn read_str(&mut self, text: &str) -> Result<()> {
        self.replace(text)?;
        Ok(())
    }

    /// Like [`read`](Self::read), holding a shared lock on the file while it
    /// is read. Parse errors carry `path`.
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(file_io(path))?;

        FileExt::lock_shared(&file)?;
        let mut bytes = Vec::new();
        let read = (&file).read_to_end(&mut bytes);
        FileExt::unlock(&file)?;
        read?;

        self.load(bytes).map_err(|err| err.in_file(path))?;
        tracing::debug!(path = %path.display(), nodes = self.tree.node_count(), "read config file");
        Ok(())
    }

    fn load(&mut self, bytes: Vec<u8>) -> std::result::Result<(), ParseError> {
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
                let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
                let err = ParseError::new(line, "invalid UTF-8 sequence");
                tracing::warn!(%err, "config not replaced");
                return Err(err);
            }
        };
        self.replace(&text)
    }

    fn replace(&mut self, text: &str) -> std::result::Result<(), ParseError> {
        match self.codec.parse(text, self.tree.options()) {
            Ok(mut tree) => {
                tree.set_options(self.tree.options().clone());
                self.tree = tree;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "config not replaced");
                Err(err)
            }
        }
    }

    // ---- writing -------------------------------------------------------

    pub fn write(&self, mut out: impl Write) -> Result<()> {
        let mut buf = Vec::new();
        self.codec
            .serialize(&self.tree, self.tree.options(), &mut buf)?;
        out.write_all(&buf)?;
        out.flush()?;
        tracing::debug!(bytes = buf.len(), nodes = self.tree.node_count(), "wrote config");
        Ok(())
    }

    pub fn write_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Write the document to `path`, replacing it atomically.
    ///
    /// The text goes to `<path>.tmp` first, is synced, then renamed over
    /// `path`. An exclusive lock on `path` is held for the whole sequence.
    /// When `path` did not exist and the write fails, no file is left there.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let existed = path.exists();
        let target = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(file_io(path))?;
        FileExt::lock_exclusive(&target)?;

        let tmp = tmp_path(path);
        let written = File::create(&tmp)
            .map_err(file_io(&tmp))
            .and_then(|file| self.persist(file, &tmp, path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
            if !existed {
                let _ = fs::remove_file(path);
            }
        }
        FileExt::unlock(&target)?;
        if let Err(err) = written {
            tracing::warn!(path = %path.display(), %err, "config file not written");
            return Err(err);
        }

        tracing::debug!(path = %path.display(), "wrote config file");
        Ok(())
    }

    fn persist(&self, file: File, tmp: &Path, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(file);
        self.write(&mut out)?;
        let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        fs::rename(tmp, path)?;

        #[cfg(unix)]
        {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                File::open(dir)?.sync_all()?;
            }
        }
        Ok(())
    }

    // ---- navigation ----------------------------------------------------

    pub fn root(&self) -> Setting<'_> {
        self.tree.root()
    }

    pub fn root_mut(&mut self) -> SettingMut<'_> {
        self.tree.root_mut()
    }

    pub fn setting(&self, id: SettingId) -> Result<Setting<'_>> {
        self.tree.setting(id)
    }

    pub fn setting_mut(&mut self, id: SettingId) -> Result<SettingMut<'_>> {
        self.tree.setting_mut(id)
    }

    pub fn lookup(&self, path: &str) -> Result<Setting<'_>> {
        self.tree.lookup(path)
    }

    pub fn lookup_mut(&mut self, path: &str) -> Result<SettingMut<'_>> {
        self.tree.lookup_mut(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root().exists(path)
    }

    /// Store the value at `path` in `out` and return true, or leave `out`
    /// alone and return false.
    pub fn lookup_value<T: FromValue>(&self, path: &str, out: &mut T) -> bool {
        self.root().lookup_value(path, out)
    }

    pub fn try_lookup<T: FromValue>(&self, path: &str) -> Option<T> {
        self.root().try_lookup(path)
    }

    pub fn lookup_or<T: FromValue>(&self, path: &str, default: T) -> T {
        self.root().lookup_or(path, default)
    }

    /// Independent copy sharing only the codec.
    pub fn deep_copy(&self) -> Config {
        Config {
            tree: self.tree.clone(),
            codec: Arc::clone(&self.codec),
        }
    }

    /// Drop every setting. Options are kept.
    pub fn clear(&mut self) {
        self.tree = Tree::with_options(self.tree.options().clone());
    }
}

fn file_io(path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::FileIo { path, source }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SettingType;

    const DOC: &str = "name = \"demo\";\nserver : { port = 8080; hosts = [ \"a\", \"b\" ]; };\n";

    fn loaded() -> Config {
        let mut config = Config::new();
        config.read_str(DOC).unwrap();
        config
    }

    #[test]
    fn new_config_has_an_empty_root_group() {
        let config = Config::new();
        assert!(config.root().is_group());
        assert!(config.root().is_empty());
        assert_eq!(config.write_string().unwrap(), "");
    }

    #[test]
    fn read_replaces_the_whole_tree() {
        let mut config = loaded();
        config.read("other = 1;".as_bytes()).unwrap();
        assert!(!config.exists("name"));
        assert!(!config.exists("server"));
        assert_eq!(config.lookup_or("other", 0), 1);
    }

    #[test]
    fn failed_read_keeps_previous_tree() {
        let mut config = loaded();
        let before = config.deep_copy();
        let err = config.read_str("a = 1;\nb = ;\n").unwrap_err();
        match err {
            Error::Parse(err) => assert_eq!(err.line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(config, before);
    }

    #[test]
    fn invalid_utf8_is_a_parse_error_on_its_line() {
        let mut config = loaded();
        let err = config.read(&b"a = 1;\nb = \"\xff\";\n"[..]).unwrap_err();
        match err {
            Error::Parse(err) => assert_eq!(err.line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(config.exists("server.port"));
    }

    #[test]
    fn ids_go_stale_after_read() {
        let mut config = loaded();
        let id = config.lookup("server.port").unwrap().id();
        config.read_str("server : { port = 1; };").unwrap();
        assert!(matches!(config.setting(id), Err(Error::StaleHandle)));
    }

    #[test]
    fn options_survive_read_and_clear() {
        let mut config = Config::builder()
            .with_options(Options {
                auto_convert: true,
                ..Options::default()
            })
            .build();
        config.read_str("ratio = 2;").unwrap();
        assert_eq!(config.lookup_or("ratio", 0.0), 2.0);
        config.clear();
        assert!(config.options().auto_convert);
        assert!(config.root().is_empty());
    }

    #[test]
    fn deep_copy_is_independent() {
        let config = loaded();
        let mut copy = config.deep_copy();
        copy.lookup_mut("server.port").unwrap().set(9090).unwrap();
        assert_eq!(config.lookup_or("server.port", 0), 8080);
        assert_eq!(copy.lookup_or("server.port", 0), 9090);
    }

    #[test]
    fn custom_codec_is_used() {
        struct Fixed;
        impl TextCodec for Fixed {
            fn parse(&self, _: &str, options: &Options) -> std::result::Result<Tree, ParseError> {
                let mut tree = Tree::with_options(options.clone());
                tree.root_mut()
                    .add("fixed", SettingType::Boolean)
                    .map_err(|err| ParseError::new(1, err.to_string()))?;
                Ok(tree)
            }

            fn serialize(&self, _: &Tree, _: &Options, out: &mut dyn Write) -> io::Result<()> {
                out.write_all(b"fixed")
            }
        }

        let mut config = Config::builder().with_codec(Fixed).build();
        config.read_str("anything").unwrap();
        assert_eq!(config.try_lookup::<bool>("fixed"), Some(false));
        assert_eq!(config.write_string().unwrap(), "fixed");
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.cfg");
        let config = loaded();
        config.write_file(&path).unwrap();
        assert!(!tmp_path(&path).exists());

        let mut back = Config::new();
        back.read_file(&path).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = loaded();
        let err = config.read_file(dir.path().join("missing.cfg")).unwrap_err();
        assert!(matches!(err, Error::FileIo { .. }));
        assert!(config.exists("name"));

        let err = config
            .write_file(dir.path().join("no/such/dir/app.cfg"))
            .unwrap_err();
        assert!(matches!(err, Error::FileIo { .. }));
    }

    struct Broken;

    impl TextCodec for Broken {
        fn parse(&self, _: &str, _: &Options) -> std::result::Result<Tree, ParseError> {
            Err(ParseError::new(1, "unreadable"))
        }

        fn serialize(&self, _: &Tree, _: &Options, _: &mut dyn Write) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "cannot serialize"))
        }
    }

    #[test]
    fn failed_write_does_not_create_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.cfg");
        let config = Config::builder().with_codec(Broken).build();

        assert!(matches!(config.write_file(&path), Err(Error::Io(_))));
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn failed_write_keeps_the_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.cfg");
        fs::write(&path, DOC).unwrap();
        let config = Config::builder().with_codec(Broken).build();

        assert!(config.write_file(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), DOC);
    }

    #[test]
    fn parse_error_in_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cfg");
        fs::write(&path, "a = 1;\n\nb = [ 1, \"x\" ];\n").unwrap();

        let mut config = Config::new();
        match config.read_file(&path).unwrap_err() {
            Error::Parse(err) => {
                assert_eq!(err.line, 3);
                assert_eq!(err.file.as_deref(), Some(path.as_path()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
