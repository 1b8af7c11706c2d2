//! Domain entities stored in the catalog and their field tables.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::document::{FieldSpec, Indexable};

pub const UNKNOWN_ARCHIVE: &str = "unknown";

/// Searchable fields of a class entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum ClassField {
    /// Short class name.
    #[value(name = "cn")]
    #[serde(rename = "cn")]
    ClassName,
    #[value(name = "pn")]
    #[serde(rename = "pn")]
    PackageName,
    #[value(name = "jn")]
    #[serde(rename = "jn")]
    ArchiveName,
}

impl ClassField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassName => "cn",
            Self::PackageName => "pn",
            Self::ArchiveName => "jn",
        }
    }
}

impl std::fmt::Display for ClassField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One class found in an archive.
///
/// Either `full_name` or `short_name` + `package_name` is authoritative;
/// [`ClassEntry::normalize`] derives the other half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub full_name: Option<String>,
    pub short_name: Option<String>,
    pub package_name: Option<String>,
    pub archive_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<u64>,
}

impl Default for ClassEntry {
    fn default() -> Self {
        Self {
            full_name: None,
            short_name: None,
            package_name: None,
            archive_name: UNKNOWN_ARCHIVE.to_string(),
            internal_id: None,
        }
    }
}

impl ClassEntry {
    pub fn from_full_name(full_name: impl Into<String>, archive_name: impl Into<String>) -> Self {
        let mut entry = Self {
            full_name: Some(full_name.into()),
            archive_name: archive_name.into(),
            ..Self::default()
        };
        entry.normalize();
        entry
    }

    pub fn from_parts(
        package_name: impl Into<String>,
        short_name: impl Into<String>,
        archive_name: impl Into<String>,
    ) -> Self {
        let mut entry = Self {
            short_name: Some(short_name.into()),
            package_name: Some(package_name.into()),
            archive_name: archive_name.into(),
            ..Self::default()
        };
        entry.normalize();
        entry
    }

    /// Empty entry used as a by-example sample; only set fields narrow.
    pub fn sample() -> Self {
        Self {
            archive_name: String::new(),
            ..Self::default()
        }
    }

    /// Fills in whichever half of the name is missing. Idempotent.
    ///
    /// The full name wins when present: the short name is the text after its
    /// last `.` and the package the text before it (empty when the `.` is
    /// missing or leading).
    /// Otherwise the full name is `package.short`, or `short` alone when the
    /// package is empty.
    pub fn normalize(&mut self) {
        if let Some(full) = &self.full_name {
            let (package, short) = match full.rfind('.') {
                Some(idx) => (&full[..idx], &full[idx + 1..]),
                None => ("", full.as_str()),
            };
            self.package_name = Some(package.to_string());
            self.short_name = Some(short.to_string());
        } else if let Some(short) = &self.short_name {
            let package = self.package_name.get_or_insert_with(String::new);
            self.full_name = Some(if package.is_empty() {
                short.clone()
            } else {
                format!("{package}.{short}")
            });
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }
}

impl Indexable for ClassEntry {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::keyword("cn").default_field(),
        FieldSpec::keyword("pn"),
        FieldSpec::keyword("jn"),
    ];

    fn read_field(&self, name: &str) -> Option<String> {
        match name {
            "cn" => self.short_name.clone(),
            "pn" => self.package_name.clone(),
            "jn" if !self.archive_name.is_empty() => Some(self.archive_name.clone()),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: String) {
        match name {
            "cn" => self.short_name = Some(value),
            "pn" => self.package_name = Some(value),
            "jn" => self.archive_name = value,
            _ => {}
        }
    }

    fn set_internal_id(&mut self, id: Option<u64>) {
        self.internal_id = id;
    }

    fn finish(&mut self) {
        self.normalize();
    }
}

/// Dedup registry entry: the file name of an archive already cataloged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Indexable for ArchiveEntry {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::keyword("jn").default_field()];

    fn read_field(&self, name: &str) -> Option<String> {
        (name == "jn").then(|| self.name.clone())
    }

    fn write_field(&mut self, name: &str, value: String) {
        if name == "jn" {
            self.name = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{from_record, to_record};
    use proptest::prelude::*;

    #[test]
    fn normalize_splits_full_names() {
        let entry = ClassEntry::from_full_name("com.acme.Foo", "sample.jar");
        assert_eq!(entry.short_name.as_deref(), Some("Foo"));
        assert_eq!(entry.package_name.as_deref(), Some("com.acme"));

        let entry = ClassEntry::from_full_name("Foo", "sample.jar");
        assert_eq!(entry.package_name.as_deref(), Some(""));
        assert_eq!(entry.short_name.as_deref(), Some("Foo"));
    }

    #[test]
    fn normalize_strips_a_leading_dot_from_the_short_name() {
        let mut entry = ClassEntry::from_full_name(".Foo", "x.jar");
        assert_eq!(entry.short_name.as_deref(), Some("Foo"));
        assert_eq!(entry.package_name.as_deref(), Some(""));
        assert_eq!(entry.full_name(), Some(".Foo"));

        entry.normalize();
        assert_eq!(entry.short_name.as_deref(), Some("Foo"));
    }

    #[test]
    fn normalize_joins_parts() {
        let entry = ClassEntry::from_parts("com.acme", "Bar", "x.jar");
        assert_eq!(entry.full_name(), Some("com.acme.Bar"));
        let entry = ClassEntry::from_parts("", "Bar", "x.jar");
        assert_eq!(entry.full_name(), Some("Bar"));
    }

    #[test]
    fn default_archive_is_unknown() {
        assert_eq!(ClassEntry::default().archive_name, UNKNOWN_ARCHIVE);
    }

    #[test]
    fn record_mapping_round_trips_and_renormalizes() {
        let entry = ClassEntry::from_full_name("com.acme.Foo", "sample.jar");
        let record = to_record(&entry);
        assert_eq!(record.value("cn"), Some("Foo"));
        assert_eq!(record.value("pn"), Some("com.acme"));
        assert_eq!(record.value("jn"), Some("sample.jar"));
        assert!(record.iter().all(|f| f.persistent && f.searchable && !f.tokenizable));

        let back: ClassEntry = from_record(&record);
        assert_eq!(back, entry);
    }

    #[test]
    fn samples_only_carry_set_fields() {
        let mut sample = ClassEntry::sample();
        sample.short_name = Some("Foo".into());
        let record = to_record(&sample);
        assert_eq!(record.len(), 1);
        assert_eq!(record.value("cn"), Some("Foo"));
    }

    #[test]
    fn archive_entry_maps_to_one_field() {
        let record = to_record(&ArchiveEntry::new("a.jar"));
        assert_eq!(record.len(), 1);
        assert_eq!(from_record::<ArchiveEntry>(&record).name, "a.jar");
    }

    fn arb_entry() -> impl Strategy<Value = ClassEntry> {
        let name = "[A-Za-z$_][A-Za-z0-9$_]{0,6}";
        prop_oneof![
            proptest::collection::vec(name, 1..5).prop_map(|parts| ClassEntry {
                full_name: Some(parts.join(".")),
                ..ClassEntry::default()
            }),
            (proptest::collection::vec(name, 0..4), name).prop_map(|(pkg, short)| ClassEntry {
                short_name: Some(short),
                package_name: Some(pkg.join(".")),
                ..ClassEntry::default()
            }),
        ]
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(entry in arb_entry()) {
            let mut once = entry.clone();
            once.normalize();
            let mut twice = once.clone();
            twice.normalize();
            prop_assert_eq!(once, twice);
        }
    }
}
