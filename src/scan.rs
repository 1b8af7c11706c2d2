use ignore::WalkBuilder;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::Result;

/// Files under `root` whose name ends with one of `suffixes`, sorted.
///
/// Hidden files are included and ignore files are not honoured. Unreadable
/// subdirectories are skipped.
pub fn find_archives(root: &Path, suffixes: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("scan root does not exist: {}", root.display()),
        )
        .into());
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_some_and(|t| t.is_file())
                        && has_suffix(path, suffixes)
                    {
                        let _ = tx.send(path.to_path_buf());
                    }
                }
                Err(e) => debug!("scan: {e}"),
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut archives: Vec<PathBuf> = rx.iter().collect();
    archives.sort();
    Ok(archives)
}

/// Case-sensitive file name suffix match.
pub fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| suffixes.iter().any(|s| name.ends_with(s.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_matching_files_including_hidden_ones() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        fs::create_dir_all(root.join("a/b"))?;
        fs::create_dir_all(root.join(".hidden"))?;
        fs::write(root.join("a/one.jar"), b"")?;
        fs::write(root.join("a/b/two.jar"), b"")?;
        fs::write(root.join(".hidden/three.jar"), b"")?;
        fs::write(root.join("a/readme.txt"), b"")?;
        fs::write(root.join("a/upper.JAR"), b"")?;
        fs::write(root.join(".gitignore"), b"*.jar\n")?;

        let found = find_archives(root, &[".jar".to_string()])?;
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(found.len(), 3);
        assert!(names.contains(&"three.jar".to_string()));
        assert!(!names.contains(&"upper.JAR".to_string()));
        Ok(())
    }

    #[test]
    fn multiple_suffixes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.jar"), b"")?;
        fs::write(dir.path().join("b.war"), b"")?;
        fs::write(dir.path().join("c.zip"), b"")?;
        let found = find_archives(dir.path(), &[".jar".to_string(), ".war".to_string()])?;
        assert_eq!(found.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_archives(&dir.path().join("nope"), &[".jar".to_string()]).is_err());
    }
}
