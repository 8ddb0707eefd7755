//! Reading and atomically rewriting a version string embedded in a text
//! file.

use std::fs;
use std::io::Write;

use anyhow::Context;
use camino::Utf8Path;

use crate::VersionFormat;

/// Scans `path` line by line, returning the first line that parses as a
/// `V`.
pub fn read_version<V: VersionFormat>(path: &Utf8Path) -> anyhow::Result<Option<V>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading version file {path}"))?;
    Ok(contents.lines().find_map(V::parse))
}

/// Rewrites the first line matching `V::version_regex()` in place, via a
/// temporary file and atomic rename, substituting `new_version`'s rendered
/// form for the matched text.
pub fn replace_version<V: VersionFormat>(path: &Utf8Path, new_version: &V) -> anyhow::Result<()> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading version file {path}"))?;

    let mut replaced = false;
    let mut out = String::with_capacity(contents.len());
    for line in contents.split_inclusive('\n') {
        if !replaced {
            if let Some(m) = V::version_regex().find(line) {
                out.push_str(&line[..m.start()]);
                out.push_str(&new_version.to_string());
                out.push_str(&line[m.end()..]);
                replaced = true;
                continue;
            }
        }
        out.push_str(line);
    }

    let tmp_path = path.with_extension(format!("{}.tmp", path.extension().unwrap_or_default()));
    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating temporary file {tmp_path}"))?;
    tmp.write_all(out.as_bytes())
        .with_context(|| format!("writing temporary file {tmp_path}"))?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {tmp_path} over {path}"))?;
    Ok(())
}
