//! Archive introspection: class short name -> package for one jar.

use log::warn;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{ArchiveError, CatalogError};

pub const CLASS_SUFFIX: &str = ".class";

/// Names derived from one class entry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPath {
    pub full_name: String,
    pub short_name: String,
    pub package_name: String,
}

impl ClassPath {
    /// `None` unless `entry` ends with `.class` and is more than the suffix.
    pub fn from_entry(entry: &str) -> Option<Self> {
        let stem = entry.strip_suffix(CLASS_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }

        let full_name = stem.replace('/', ".");
        let short_name = stem.rsplit('/').next().unwrap_or(stem).to_string();
        let package_name = full_name
            .strip_suffix(short_name.as_str())
            .unwrap_or("")
            .trim_end_matches('.')
            .to_string();
        Some(Self {
            full_name,
            short_name,
            package_name,
        })
    }
}

/// Class short name -> package name of one archive. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMap {
    archive_name: String,
    classes: BTreeMap<String, String>,
    degraded: bool,
}

impl ArchiveMap {
    /// Builds the map from entry names in archive order; later duplicates win.
    pub fn from_entries<'a>(
        archive_name: impl Into<String>,
        entries: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut classes = BTreeMap::new();
        for entry in entries {
            if let Some(class) = ClassPath::from_entry(entry) {
                classes.insert(class.short_name, class.package_name);
            }
        }
        Self {
            archive_name: archive_name.into(),
            classes,
            degraded: false,
        }
    }

    fn unreadable(archive_name: String) -> Self {
        Self {
            archive_name,
            classes: BTreeMap::new(),
            degraded: true,
        }
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn package_of(&self, short_name: &str) -> Option<&str> {
        self.classes.get(short_name).map(String::as_str)
    }

    pub fn fully_qualified_name(&self, short_name: &str) -> Option<String> {
        let package = self.package_of(short_name)?;
        Some(if package.is_empty() {
            short_name.to_string()
        } else {
            format!("{package}.{short_name}")
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// True when the archive could not be opened and the map is empty for that reason.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// File name component of `path`, or the whole path if it has none.
pub fn archive_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Introspects `path`, degrading to an empty map when it cannot be read.
pub fn parse(path: &Path) -> ArchiveMap {
    match try_parse(path) {
        Ok(map) => map,
        Err(e) => {
            warn!("{e}; cataloging it as empty");
            ArchiveMap::unreadable(archive_name(path))
        }
    }
}

pub fn try_parse(path: &Path) -> Result<ArchiveMap, CatalogError> {
    read_entries(path)
        .map(|names| ArchiveMap::from_entries(archive_name(path), names.iter().map(String::as_str)))
        .map_err(|source| CatalogError::ArchiveUnreadable {
            path: PathBuf::from(path),
            source,
        })
}

fn read_entries(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(path)?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    // The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        // raw access: only names are needed, so encrypted or unsupported
        // compression methods must not fail the archive
        let entry = archive.by_index_raw(i)?;
        if entry.is_dir() {
            continue;
        }
        names.push(entry.name().to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_jar(path: &Path, entries: &[&str]) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for name in entries {
            if let Some(dir) = name.strip_suffix('/') {
                zip.add_directory(dir, options)?;
            } else {
                zip.start_file(*name, options)?;
                zip.write_all(b"\xca\xfe\xba\xbe")?;
            }
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn class_path_derivation() {
        let c = ClassPath::from_entry("com/acme/Foo.class").unwrap();
        assert_eq!(c.full_name, "com.acme.Foo");
        assert_eq!(c.short_name, "Foo");
        assert_eq!(c.package_name, "com.acme");

        let c = ClassPath::from_entry("Top.class").unwrap();
        assert_eq!(c.full_name, "Top");
        assert_eq!(c.package_name, "");

        let c = ClassPath::from_entry("a/Outer$Inner.class").unwrap();
        assert_eq!(c.short_name, "Outer$Inner");
    }

    #[test]
    fn only_real_class_entries_qualify() {
        assert!(ClassPath::from_entry(".class").is_none());
        assert!(ClassPath::from_entry("Foo.CLASS").is_none());
        assert!(ClassPath::from_entry("META-INF/MANIFEST.MF").is_none());
        assert!(ClassPath::from_entry("com/acme/").is_none());
    }

    #[test]
    fn parse_reads_the_sample_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("sample.jar");
        write_jar(
            &jar,
            &[
                "com/",
                "com/acme/",
                "com/acme/Foo.class",
                "com/acme/Bar.class",
                "META-INF/MANIFEST.MF",
            ],
        )?;

        let map = parse(&jar);
        assert_eq!(map.archive_name(), "sample.jar");
        assert!(!map.is_degraded());
        assert_eq!(map.len(), 2);
        assert_eq!(map.package_of("Foo"), Some("com.acme"));
        assert_eq!(map.package_of("Bar"), Some("com.acme"));
        assert_eq!(map.fully_qualified_name("Foo").as_deref(), Some("com.acme.Foo"));
        Ok(())
    }

    #[test]
    fn duplicate_short_names_keep_the_last_entry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("dup.jar");
        write_jar(&jar, &["a/Util.class", "b/Util.class", "c/d/Util.class"])?;
        let map = parse(&jar);
        assert_eq!(map.len(), 1);
        assert_eq!(map.package_of("Util"), Some("c.d"));
        Ok(())
    }

    #[test]
    fn entries_with_unsupported_compression_still_list() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("odd.jar");
        let file = File::create(&jar)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for name in ["com/acme/Foo.class", "com/acme/Bar.class"] {
            zip.start_file(name, options)?;
            zip.write_all(b"\xca\xfe\xba\xbe")?;
        }
        zip.finish()?;

        // rewrite every entry's method to bzip2 (12), which this build cannot decode
        let mut bytes = std::fs::read(&jar)?;
        for i in 0..bytes.len().saturating_sub(12) {
            let method_at = match &bytes[i..i + 4] {
                b"PK\x03\x04" => i + 8,
                b"PK\x01\x02" => i + 10,
                _ => continue,
            };
            bytes[method_at..method_at + 2].copy_from_slice(&12u16.to_le_bytes());
        }
        std::fs::write(&jar, &bytes)?;

        let mut archive = ZipArchive::new(File::open(&jar)?)?;
        assert!(archive.by_index(0).is_err());

        let map = try_parse(&jar)?;
        assert!(!map.is_degraded());
        assert_eq!(map.len(), 2);
        assert_eq!(map.package_of("Bar"), Some("com.acme"));
        Ok(())
    }

    #[test]
    fn unreadable_archives_degrade_to_empty_maps() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.jar");
        let map = parse(&missing);
        assert!(map.is_empty());
        assert!(map.is_degraded());
        assert_eq!(map.archive_name(), "missing.jar");

        let corrupt = dir.path().join("corrupt.jar");
        std::fs::write(&corrupt, b"not a zip")?;
        assert!(matches!(
            try_parse(&corrupt),
            Err(CatalogError::ArchiveUnreadable { .. })
        ));
        assert!(parse(&corrupt).is_degraded());
        Ok(())
    }

    proptest! {
        #[test]
        fn derived_names_are_consistent(
            dirs in proptest::collection::vec("[a-z][a-z0-9]{0,5}", 0..4),
            class in "[A-Z][A-Za-z0-9$]{0,8}",
        ) {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&class);
            path.push_str(CLASS_SUFFIX);

            let c = ClassPath::from_entry(&path).unwrap();
            let short_with_suffix = format!("{}{CLASS_SUFFIX}", c.short_name);
            prop_assert!(path.ends_with(&short_with_suffix));
            if c.package_name.is_empty() {
                prop_assert_eq!(&c.full_name, &c.short_name);
            } else {
                prop_assert_eq!(format!("{}.{}", c.package_name, c.short_name), c.full_name);
            }
        }
    }
}
