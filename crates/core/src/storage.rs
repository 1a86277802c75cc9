//! Object storage handles for the `file::s3` and `text::s3` types.
//!
//! The [`ResourceConnector`] reads the `s3` credentials section and hands out
//! readers for existing objects and writers for new ones. The storage itself
//! sits behind [`ObjectStore`]; the bundled [`FilesystemObjectStore`] serves
//! buckets as directories under the section's `root`.

use std::fmt::{Debug, Display, Formatter};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::config::{expand_path, Credentials};
use crate::error::{Error, Result};

/// Credentials section configuring object storage
pub const OBJECT_STORE_SECTION: &str = "s3";

/// A bucket and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// # Errors
    ///
    /// `ObjectStorage` if the bucket is not a single plain name or a key
    /// segment is empty, `.`, `..` or absolute.
    pub fn new(bucket: &str, key: &str) -> Result<Self> {
        let location = Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        location.check()?;
        Ok(location)
    }

    /// Splits `bucket/key/...` on the first `/`.
    ///
    /// # Errors
    ///
    /// `ObjectStorage` if either part is missing or not a plain relative path.
    pub fn parse(path: &str) -> Result<Self> {
        let Some((bucket, key)) = path.split_once('/') else {
            return Err(Error::object_storage(path, "expected `bucket/key`"));
        };
        Self::new(bucket, key)
    }

    fn check(&self) -> Result<()> {
        let segments = std::iter::once(self.bucket.as_str()).chain(self.key.split('/'));
        for segment in segments {
            if !is_plain_segment(segment) {
                return Err(Error::object_storage(
                    format!("{}/{}", self.bucket, self.key),
                    format!("invalid path segment `{segment}`"),
                ));
            }
        }
        Ok(())
    }
}

/// One normal path component: not empty, `.`, `..`, a root or a prefix.
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !segment.contains('\\')
}

impl Display for ObjectLocation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "s3://{}/{}", self.bucket, self.key)
    }
}

pub trait ObjectStore: Send + Sync + Debug {
    /// Opens an existing object for reading.
    fn open_read(&self, location: &ObjectLocation) -> Result<Box<dyn Read + Send>>;

    /// Creates or overwrites an object for writing.
    fn open_write(&self, location: &ObjectLocation) -> Result<Box<dyn Write + Send>>;
}

/// Buckets are directories under `root`, keys are paths inside them.
#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Paths always stay under `root`.
    fn full_path(&self, location: &ObjectLocation) -> Result<PathBuf> {
        location.check()?;
        Ok(self.root.join(&location.bucket).join(&location.key))
    }
}

impl ObjectStore for FilesystemObjectStore {
    fn open_read(&self, location: &ObjectLocation) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.full_path(location)?).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::object_storage(location.to_string(), "no such object")
            } else {
                Error::object_storage(location.to_string(), e)
            }
        })?;

        Ok(Box::new(file))
    }

    fn open_write(&self, location: &ObjectLocation) -> Result<Box<dyn Write + Send>> {
        let full_path = self.full_path(location)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::object_storage(location.to_string(), e))?;
        }

        let file =
            File::create(&full_path).map_err(|e| Error::object_storage(location.to_string(), e))?;

        Ok(Box::new(file))
    }
}

/// Settings read from the `s3` credentials section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectStoreSettings {
    /// Bucket new objects are written to
    pub bucket: Option<String>,
    /// Prepended to every destination key
    pub prefix: String,
    /// Directory the filesystem store serves
    pub root: Option<String>,
}

impl ObjectStoreSettings {
    /// # Errors
    ///
    /// `ObjectStorage` if there is no `s3` section.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let Some(section) = credentials.section(OBJECT_STORE_SECTION) else {
            return Err(Error::object_storage(
                OBJECT_STORE_SECTION,
                "no `s3` section was found in the credentials file",
            ));
        };

        Ok(Self {
            bucket: section.get("bucket").filter(|b| !b.is_empty()).cloned(),
            prefix: section.get("prefix").cloned().unwrap_or_default(),
            root: section.get("root").filter(|r| !r.is_empty()).cloned(),
        })
    }
}

pub struct ObjectReader {
    pub location: ObjectLocation,
    reader: Box<dyn Read + Send>,
}

impl Debug for ObjectReader {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ObjectReader")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

pub struct ObjectWriter {
    pub location: ObjectLocation,
    writer: Box<dyn Write + Send>,
}

impl Debug for ObjectWriter {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ObjectWriter")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[derive(Debug)]
pub struct ResourceConnector {
    settings: ObjectStoreSettings,
    identity: String,
    store: Box<dyn ObjectStore>,
}

impl ResourceConnector {
    /// Builds a connector over the filesystem store named by the `s3`
    /// section's `root`.
    ///
    /// # Errors
    ///
    /// `ObjectStorage` if the section is missing or has no `root`.
    pub fn from_credentials(credentials: &Credentials, identity: &str) -> Result<Self> {
        let settings = ObjectStoreSettings::from_credentials(credentials)?;

        let Some(root) = settings.root.as_deref() else {
            return Err(Error::object_storage(
                OBJECT_STORE_SECTION,
                "the `s3` section has no `root` directory to serve objects from",
            ));
        };

        let store = FilesystemObjectStore::new(PathBuf::from(expand_path(root)));
        Ok(Self::with_store(settings, identity, Box::new(store)))
    }

    pub fn with_store(settings: ObjectStoreSettings, identity: &str, store: Box<dyn ObjectStore>) -> Self {
        Self {
            settings,
            identity: identity.to_string(),
            store,
        }
    }

    /// Opens `bucket/key` for reading. The object must already exist.
    ///
    /// # Errors
    ///
    /// `ObjectStorage` if the path is not `bucket/key` or the object is absent.
    pub fn readable(&self, path: &str) -> Result<ObjectReader> {
        let location = ObjectLocation::parse(path)?;
        debug!("Opening {} for reading", location);
        let reader = self.store.open_read(&location)?;
        Ok(ObjectReader { location, reader })
    }

    /// Where an object called `name` is written for the current identity:
    /// `<prefix>id/<identity>/<name>` in the configured bucket.
    ///
    /// # Errors
    ///
    /// `ObjectStorage` if no bucket is configured or `name` would leave the
    /// identity's directory.
    pub fn destination(&self, name: &str) -> Result<ObjectLocation> {
        let Some(bucket) = &self.settings.bucket else {
            return Err(Error::object_storage(name, "the `s3` section has no `bucket`"));
        };

        ObjectLocation::new(
            bucket,
            &format!("{}id/{}/{}", self.settings.prefix, self.identity, name),
        )
    }

    /// Opens the destination for `name` for writing, replacing any object
    /// already there.
    ///
    /// # Errors
    ///
    /// `ObjectStorage` if no bucket is configured or the store refuses.
    pub fn writable(&self, name: &str) -> Result<ObjectWriter> {
        let location = self.destination(name)?;
        debug!("Opening {} for writing", location);
        let writer = self.store.open_write(&location)?;
        Ok(ObjectWriter { location, writer })
    }
}
