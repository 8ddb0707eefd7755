//! `unbundle-worktrees`: fast-forwards the worktree refs a
//! bundle carries and appends their refspecs to the current HEAD's
//! `PerCommitMeta`, mirroring how `hopic-core::phase`'s
//! `bundle_worktree_range` produces the bundle/refspec pair this consumes
//! on the other side of the build/submit boundary.

use anyhow::{bail, Context, Result};
use camino::Utf8Path;

/// Fetches every head the bundle carries into the matching local ref and
/// returns the refspecs applied, for the caller to append to
/// `PerCommitMeta`.
pub fn run(workspace: &Utf8Path, bundle: &Utf8Path) -> Result<Vec<String>> {
    let heads = list_heads(workspace, bundle)?;
    if heads.is_empty() {
        bail!("bundle {bundle} carries no heads");
    }

    let mut refspecs = Vec::with_capacity(heads.len());
    for (commit, ref_name) in &heads {
        let refspec = format!("{commit}:{ref_name}");
        hopic_git::git(workspace, &["fetch", bundle.as_str(), &refspec])
            .with_context(|| format!("fetching {refspec} from bundle {bundle}"))?;
        refspecs.push(refspec);
    }

    append_to_percommit(workspace, &refspecs)?;
    Ok(refspecs)
}

fn list_heads(workspace: &Utf8Path, bundle: &Utf8Path) -> Result<Vec<(String, String)>> {
    let output = hopic_git::git(workspace, &["bundle", "list-heads", bundle.as_str()])
        .with_context(|| format!("listing heads in bundle {bundle}"))?;
    let heads = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let commit = parts.next()?;
            let ref_name = parts.next()?;
            Some((commit.to_string(), ref_name.to_string()))
        })
        .collect();
    Ok(heads)
}

fn append_to_percommit(workspace: &Utf8Path, refspecs: &[String]) -> Result<()> {
    let head = hopic_git::git(workspace, &["rev-parse", "HEAD"])?;
    let Some(mut meta) = hopic_core::read_percommit(workspace, &head)? else {
        bail!("no per-commit state recorded for HEAD ({head}); run checkout-source-tree first");
    };
    meta.refspecs.extend(refspecs.iter().cloned());
    hopic_core::write_percommit(workspace, &head, &meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_heads_parses_commit_and_ref_pairs() {
        let workspace = Utf8Path::new(".");
        // list_heads shells out; exercised end-to-end in hopic-cli's
        // integration tests against a real bundle file. This only checks
        // the line-parsing shape against a captured sample.
        let sample = "abc123 refs/heads/sub\ndef456 refs/heads/other\n";
        let heads: Vec<(String, String)> = sample
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let commit = parts.next()?;
                let ref_name = parts.next()?;
                Some((commit.to_string(), ref_name.to_string()))
            })
            .collect();
        assert_eq!(heads, vec![
            ("abc123".to_string(), "refs/heads/sub".to_string()),
            ("def456".to_string(), "refs/heads/other".to_string()),
        ]);
        let _ = workspace;
    }
}
