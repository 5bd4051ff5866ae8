//! Pathname expansion
//!
//! Walks the virtual filesystem one pattern component at a time. Matches
//! come back in lexicographic order; the caller decides what a miss means
//! (literal pattern, nothing, or failure).

use super::ExpandResult;
use crate::interpreter::Interpreter;
use crate::pattern::{has_glob_chars, pattern_matches, MatchOptions};

/// A partial match during the walk: the path as displayed plus the
/// absolute path used for filesystem calls.
#[derive(Debug, Clone)]
struct Candidate {
    display: String,
    abs: String,
}

/// Expand a glob pattern against the filesystem. `None` means no matches.
pub(crate) async fn glob_field(
    interp: &mut Interpreter,
    pattern: &str,
) -> ExpandResult<Option<Vec<String>>> {
    let opts = MatchOptions {
        extglob: interp.state.options.shopt.extglob,
        casefold: interp.state.options.shopt.nocaseglob,
    };
    let dotglob = interp.state.options.shopt.dotglob;
    let globstar = interp.state.options.shopt.globstar;

    let absolute = pattern.starts_with('/');
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(None);
    }

    let start = if absolute {
        Candidate {
            display: String::new(),
            abs: "/".to_string(),
        }
    } else {
        Candidate {
            display: String::new(),
            abs: interp.state.cwd.display().to_string(),
        }
    };

    let mut candidates = vec![start];
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        let mut next: Vec<Candidate> = Vec::new();

        if globstar && *component == "**" {
            // `**` matches this level and every level below it.
            for cand in &candidates {
                next.push(cand.clone());
                collect_descendant_dirs(interp, cand, dotglob, &mut next).await;
            }
        } else if has_glob_chars(component, opts.extglob) {
            for cand in &candidates {
                let entries = match interp
                    .fs
                    .read_dir(std::path::Path::new(&cand.abs))
                    .await
                {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for entry in entries {
                    if entry.name.starts_with('.') && !dotglob && !component.starts_with('.') {
                        continue;
                    }
                    if !pattern_matches(component, &entry.name, opts) {
                        continue;
                    }
                    if !last && !entry.file_type.is_dir() {
                        // Symlinked directories still traverse.
                        let child = join_abs(&cand.abs, &entry.name);
                        let is_dir = interp
                            .fs
                            .stat(std::path::Path::new(&child))
                            .await
                            .map(|m| m.file_type.is_dir())
                            .unwrap_or(false);
                        if !is_dir {
                            continue;
                        }
                    }
                    next.push(extend(cand, &entry.name));
                }
            }
        } else {
            // Literal component: existence decides.
            let literal = unescape(component);
            for cand in &candidates {
                let child = join_abs(&cand.abs, &literal);
                let exists = interp
                    .fs
                    .exists(std::path::Path::new(&child))
                    .await
                    .unwrap_or(false);
                if exists {
                    next.push(extend(cand, &literal));
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            return Ok(None);
        }
    }

    let prefix = if absolute { "/" } else { "" };
    let mut matches: Vec<String> = candidates
        .into_iter()
        .filter(|c| !c.display.is_empty())
        .map(|c| format!("{prefix}{}", c.display))
        .collect();
    matches.sort();
    matches.dedup();
    if matches.is_empty() {
        Ok(None)
    } else {
        Ok(Some(matches))
    }
}

/// Depth-first collection of all directories under a candidate.
async fn collect_descendant_dirs(
    interp: &Interpreter,
    root: &Candidate,
    dotglob: bool,
    out: &mut Vec<Candidate>,
) {
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = interp.fs.read_dir(std::path::Path::new(&dir.abs)).await else {
            continue;
        };
        for entry in entries {
            if !entry.file_type.is_dir() {
                continue;
            }
            if entry.name.starts_with('.') && !dotglob {
                continue;
            }
            let child = extend(&dir, &entry.name);
            out.push(child.clone());
            stack.push(child);
        }
    }
}

fn extend(cand: &Candidate, name: &str) -> Candidate {
    Candidate {
        display: if cand.display.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", cand.display, name)
        },
        abs: join_abs(&cand.abs, name),
    }
}

fn join_abs(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Strip pattern-escape backslashes from a literal component.
fn unescape(component: &str) -> String {
    let mut out = String::new();
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fs::{FileSystem, MemFs, WriteOptions};
    use crate::limits::ExecutionLimits;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    async fn interp_with_files(files: &[&str]) -> Interpreter {
        let fs = Arc::new(MemFs::new());
        for file in files {
            let path = Path::new(file);
            if let Some(parent) = path.parent() {
                fs.mkdir(parent, true).await.unwrap();
            }
            fs.write_file(path, b"", WriteOptions::truncate())
                .await
                .unwrap();
        }
        let mut interp =
            Interpreter::new(fs, HashMap::new(), None, ExecutionLimits::default());
        interp.state.cwd = "/work".into();
        interp
    }

    #[tokio::test]
    async fn star_matches_sorted() {
        let mut interp =
            interp_with_files(&["/work/b.txt", "/work/a.txt", "/work/c.log"]).await;
        let matches = glob_field(&mut interp, "*.txt").await.unwrap().unwrap();
        assert_eq!(matches, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn no_match_is_none() {
        let mut interp = interp_with_files(&["/work/a.txt"]).await;
        assert!(glob_field(&mut interp, "*.rs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dotfiles_hidden_by_default() {
        let mut interp = interp_with_files(&["/work/.hidden", "/work/shown"]).await;
        let matches = glob_field(&mut interp, "*").await.unwrap().unwrap();
        assert_eq!(matches, vec!["shown"]);

        interp.state.options.shopt.dotglob = true;
        let matches = glob_field(&mut interp, "*").await.unwrap().unwrap();
        assert_eq!(matches, vec![".hidden", "shown"]);
    }

    #[tokio::test]
    async fn multi_component_patterns() {
        let mut interp =
            interp_with_files(&["/work/src/main.rs", "/work/src/lib.rs", "/work/doc/x.md"])
                .await;
        let matches = glob_field(&mut interp, "src/*.rs").await.unwrap().unwrap();
        assert_eq!(matches, vec!["src/lib.rs", "src/main.rs"]);

        let matches = glob_field(&mut interp, "*/x.md").await.unwrap().unwrap();
        assert_eq!(matches, vec!["doc/x.md"]);
    }

    #[tokio::test]
    async fn absolute_patterns() {
        let mut interp = interp_with_files(&["/data/one", "/data/two"]).await;
        let matches = glob_field(&mut interp, "/data/*").await.unwrap().unwrap();
        assert_eq!(matches, vec!["/data/one", "/data/two"]);
    }

    #[tokio::test]
    async fn globstar_descends() {
        let mut interp =
            interp_with_files(&["/work/a/deep/f.rs", "/work/f.rs", "/work/a/f.rs"]).await;
        interp.state.options.shopt.globstar = true;
        let matches = glob_field(&mut interp, "**/*.rs").await.unwrap().unwrap();
        assert_eq!(matches, vec!["a/deep/f.rs", "a/f.rs", "f.rs"]);
    }

    #[tokio::test]
    async fn question_mark_and_classes() {
        let mut interp = interp_with_files(&["/work/a1", "/work/a2", "/work/b1"]).await;
        let matches = glob_field(&mut interp, "a?").await.unwrap().unwrap();
        assert_eq!(matches, vec!["a1", "a2"]);
        let matches = glob_field(&mut interp, "[ab]1").await.unwrap().unwrap();
        assert_eq!(matches, vec!["a1", "b1"]);
    }
}
