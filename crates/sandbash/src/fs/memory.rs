//! In-memory filesystem
//!
//! Entries live in a sorted map keyed by normalized absolute path, so
//! directory listings come out ordered for free. Modification stamps are a
//! shared logical counter.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use super::traits::{
    fs_errors, DirEntry, FileSystem, FileType, Metadata, RmOptions, WriteOptions,
};
use crate::error::Result;

const SYMLOOP_MAX: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    File { content: Vec<u8>, mode: u32, mtime: u64 },
    Dir { mode: u32, mtime: u64 },
    Symlink { target: PathBuf, mtime: u64 },
}

impl Node {
    fn file_type(&self) -> FileType {
        match self {
            Node::File { .. } => FileType::File,
            Node::Dir { .. } => FileType::Directory,
            Node::Symlink { .. } => FileType::Symlink,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            Node::File {
                content,
                mode,
                mtime,
            } => Metadata {
                file_type: FileType::File,
                size: content.len() as u64,
                mode: *mode,
                mtime: *mtime,
            },
            Node::Dir { mode, mtime } => Metadata {
                file_type: FileType::Directory,
                size: 0,
                mode: *mode,
                mtime: *mtime,
            },
            Node::Symlink { mtime, .. } => Metadata {
                file_type: FileType::Symlink,
                size: 0,
                mode: 0o777,
                mtime: *mtime,
            },
        }
    }
}

struct State {
    nodes: BTreeMap<PathBuf, Node>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Deterministic in-memory filesystem rooted at `/`.
pub struct MemFs {
    state: RwLock<State>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create a filesystem containing `/`, `/tmp`, and `/dev` (so the
    /// `/dev/null` idiom works out of the box).
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::from("/"),
            Node::Dir {
                mode: 0o755,
                mtime: 0,
            },
        );
        nodes.insert(
            PathBuf::from("/tmp"),
            Node::Dir {
                mode: 0o777,
                mtime: 0,
            },
        );
        nodes.insert(
            PathBuf::from("/dev"),
            Node::Dir {
                mode: 0o755,
                mtime: 0,
            },
        );
        nodes.insert(
            PathBuf::from("/dev/null"),
            Node::File {
                content: Vec::new(),
                mode: 0o666,
                mtime: 0,
            },
        );
        Self {
            state: RwLock::new(State { nodes, clock: 0 }),
        }
    }

    fn lock(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Remove `.` and `..` lexically, producing an absolute path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for comp in path.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => {}
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(seg) => out.push(seg),
        }
    }
    out
}

/// Resolve symlinks in every component; `follow_last` controls whether a
/// final symlink is chased.
fn resolve(state: &State, path: &Path, follow_last: bool) -> Result<PathBuf> {
    let normalized = normalize(path);
    let mut resolved = PathBuf::from("/");
    let components: Vec<_> = normalized
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_os_string()),
            _ => None,
        })
        .collect();

    let mut hops = 0usize;
    let last = components.len();
    for (i, seg) in components.iter().enumerate() {
        resolved.push(seg);
        let is_last = i + 1 == last;
        loop {
            match state.nodes.get(&resolved) {
                Some(Node::Symlink { target, .. }) if follow_last || !is_last => {
                    hops += 1;
                    if hops > SYMLOOP_MAX {
                        return Err(fs_errors::too_many_links(path));
                    }
                    let target = target.clone();
                    resolved = if target.is_absolute() {
                        normalize(&target)
                    } else {
                        let mut base = resolved.clone();
                        base.pop();
                        normalize(&base.join(target))
                    };
                }
                _ => break,
            }
        }
    }
    Ok(resolved)
}

fn parent_dir_check(state: &State, path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match state.nodes.get(parent) {
        Some(Node::Dir { .. }) => Ok(()),
        Some(_) => Err(fs_errors::not_a_directory(parent)),
        None => Err(fs_errors::not_found(parent)),
    }
}

#[async_trait]
impl FileSystem for MemFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, true)?;
        match state.nodes.get(&resolved) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Dir { .. }) => Err(fs_errors::is_a_directory(path)),
            _ => Err(fs_errors::not_found(path)),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8], opts: WriteOptions) -> Result<()> {
        let mut state = self.lock();
        let resolved = resolve(&state, path, true)?;
        match state.nodes.get(&resolved) {
            Some(Node::Dir { .. }) => return Err(fs_errors::is_a_directory(path)),
            Some(Node::File { .. }) if opts.create_new => {
                return Err(fs_errors::already_exists(path))
            }
            Some(_) => {}
            None => parent_dir_check(&state, &resolved)?,
        }

        let mtime = state.tick();
        match state.nodes.get_mut(&resolved) {
            Some(Node::File {
                content: existing,
                mtime: file_mtime,
                ..
            }) => {
                if opts.append {
                    existing.extend_from_slice(content);
                } else {
                    *existing = content.to_vec();
                }
                *file_mtime = mtime;
            }
            _ => {
                state.nodes.insert(
                    resolved,
                    Node::File {
                        content: content.to_vec(),
                        mode: 0o644,
                        mtime,
                    },
                );
            }
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, true)?;
        state
            .nodes
            .get(&resolved)
            .map(Node::metadata)
            .ok_or_else(|| fs_errors::not_found(path))
    }

    async fn lstat(&self, path: &Path) -> Result<Metadata> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, false)?;
        state
            .nodes
            .get(&resolved)
            .map(Node::metadata)
            .ok_or_else(|| fs_errors::not_found(path))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, true)?;
        match state.nodes.get(&resolved) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(fs_errors::not_a_directory(path)),
            None => return Err(fs_errors::not_found(path)),
        }

        let mut entries = Vec::new();
        for (entry_path, node) in state.nodes.range(resolved.clone()..) {
            if entry_path == &resolved {
                continue;
            }
            if !entry_path.starts_with(&resolved) {
                break;
            }
            // Direct children only.
            if entry_path.parent() == Some(resolved.as_path()) {
                if let Some(name) = entry_path.file_name() {
                    entries.push(DirEntry {
                        name: name.to_string_lossy().into_owned(),
                        file_type: node.file_type(),
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut state = self.lock();
        let link_path = normalize(link);
        if state.nodes.contains_key(&link_path) {
            return Err(fs_errors::already_exists(link));
        }
        parent_dir_check(&state, &link_path)?;
        let mtime = state.tick();
        state.nodes.insert(
            link_path,
            Node::Symlink {
                target: target.to_path_buf(),
                mtime,
            },
        );
        Ok(())
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, false)?;
        match state.nodes.get(&resolved) {
            Some(Node::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(crate::Error::Io(std::io::Error::other(format!(
                "{}: Invalid argument",
                path.display()
            )))),
            None => Err(fs_errors::not_found(path)),
        }
    }

    async fn realpath(&self, path: &Path) -> Result<PathBuf> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, true)?;
        if state.nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(fs_errors::not_found(path))
        }
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        let mut state = self.lock();
        let resolved = resolve(&state, path, true)?;

        if let Some(node) = state.nodes.get(&resolved) {
            return if recursive && node.file_type().is_dir() {
                Ok(())
            } else {
                Err(fs_errors::already_exists(path))
            };
        }

        if recursive {
            let mut ancestors: Vec<PathBuf> =
                resolved.ancestors().map(Path::to_path_buf).collect();
            ancestors.reverse();
            for ancestor in ancestors {
                match state.nodes.get(&ancestor) {
                    Some(Node::Dir { .. }) => {}
                    Some(_) => return Err(fs_errors::not_a_directory(&ancestor)),
                    None => {
                        let mtime = state.tick();
                        state.nodes.insert(
                            ancestor,
                            Node::Dir {
                                mode: 0o755,
                                mtime,
                            },
                        );
                    }
                }
            }
            return Ok(());
        }

        parent_dir_check(&state, &resolved)?;
        let mtime = state.tick();
        state.nodes.insert(
            resolved,
            Node::Dir {
                mode: 0o755,
                mtime,
            },
        );
        Ok(())
    }

    async fn rm(&self, path: &Path, opts: RmOptions) -> Result<()> {
        let mut state = self.lock();
        let resolved = resolve(&state, path, false)?;
        match state.nodes.get(&resolved) {
            None => {
                if opts.force {
                    return Ok(());
                }
                return Err(fs_errors::not_found(path));
            }
            Some(Node::Dir { .. }) => {
                let has_children = state
                    .nodes
                    .range(resolved.clone()..)
                    .any(|(p, _)| p != &resolved && p.starts_with(&resolved));
                if has_children && !opts.recursive {
                    return Err(fs_errors::directory_not_empty(path));
                }
                let to_remove: Vec<PathBuf> = state
                    .nodes
                    .range(resolved.clone()..)
                    .take_while(|(p, _)| p.starts_with(&resolved))
                    .map(|(p, _)| p.clone())
                    .collect();
                for p in to_remove {
                    state.nodes.remove(&p);
                }
            }
            Some(_) => {
                state.nodes.remove(&resolved);
            }
        }
        Ok(())
    }

    async fn chmod(&self, path: &Path, new_mode: u32) -> Result<()> {
        let mut state = self.lock();
        let resolved = resolve(&state, path, true)?;
        match state.nodes.get_mut(&resolved) {
            Some(Node::File { mode, .. }) | Some(Node::Dir { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(Node::Symlink { .. }) => Ok(()),
            None => Err(fs_errors::not_found(path)),
        }
    }

    async fn utimes(&self, path: &Path, new_mtime: u64) -> Result<()> {
        let mut state = self.lock();
        let resolved = resolve(&state, path, true)?;
        match state.nodes.get_mut(&resolved) {
            Some(Node::File { mtime, .. })
            | Some(Node::Dir { mtime, .. })
            | Some(Node::Symlink { mtime, .. }) => {
                *mtime = new_mtime;
                Ok(())
            }
            None => Err(fs_errors::not_found(path)),
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let state = self.read_lock();
        let resolved = resolve(&state, path, true)?;
        Ok(state.nodes.contains_key(&resolved))
    }

    async fn cp(&self, src: &Path, dst: &Path, recursive: bool) -> Result<()> {
        let mut state = self.lock();
        let src_resolved = resolve(&state, src, true)?;
        let dst_resolved = resolve(&state, dst, true)?;

        let Some(src_node) = state.nodes.get(&src_resolved).cloned() else {
            return Err(fs_errors::not_found(src));
        };

        match src_node {
            Node::File { content, mode, .. } => {
                // Copying onto a directory targets a child entry.
                let dest = match state.nodes.get(&dst_resolved) {
                    Some(Node::Dir { .. }) => match src_resolved.file_name() {
                        Some(name) => dst_resolved.join(name),
                        None => dst_resolved.clone(),
                    },
                    _ => dst_resolved.clone(),
                };
                parent_dir_check(&state, &dest)?;
                let mtime = state.tick();
                state.nodes.insert(
                    dest,
                    Node::File {
                        content,
                        mode,
                        mtime,
                    },
                );
                Ok(())
            }
            Node::Dir { .. } if recursive => {
                parent_dir_check(&state, &dst_resolved)?;
                let subtree: Vec<(PathBuf, Node)> = state
                    .nodes
                    .range(src_resolved.clone()..)
                    .take_while(|(p, _)| p.starts_with(&src_resolved))
                    .map(|(p, n)| (p.clone(), n.clone()))
                    .collect();
                for (path, node) in subtree {
                    let rel = path.strip_prefix(&src_resolved).unwrap_or(&path);
                    let dest = if rel.as_os_str().is_empty() {
                        dst_resolved.clone()
                    } else {
                        dst_resolved.join(rel)
                    };
                    let mut node = node;
                    let mtime = state.tick();
                    match &mut node {
                        Node::File { mtime: m, .. }
                        | Node::Dir { mtime: m, .. }
                        | Node::Symlink { mtime: m, .. } => *m = mtime,
                    }
                    state.nodes.insert(dest, node);
                }
                Ok(())
            }
            Node::Dir { .. } => Err(fs_errors::is_a_directory(src)),
            Node::Symlink { .. } => Err(fs_errors::not_found(src)),
        }
    }

    async fn mv(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut state = self.lock();
        let src_resolved = resolve(&state, src, false)?;
        let mut dst_resolved = resolve(&state, dst, true)?;

        if !state.nodes.contains_key(&src_resolved) {
            return Err(fs_errors::not_found(src));
        }
        if let Some(Node::Dir { .. }) = state.nodes.get(&dst_resolved) {
            if let Some(name) = src_resolved.file_name() {
                dst_resolved = dst_resolved.join(name);
            }
        }
        parent_dir_check(&state, &dst_resolved)?;

        let subtree: Vec<(PathBuf, Node)> = state
            .nodes
            .range(src_resolved.clone()..)
            .take_while(|(p, _)| p.starts_with(&src_resolved))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        for (path, _) in &subtree {
            state.nodes.remove(path);
        }
        for (path, node) in subtree {
            let rel = path.strip_prefix(&src_resolved).unwrap_or(&path);
            let dest = if rel.as_os_str().is_empty() {
                dst_resolved.clone()
            } else {
                dst_resolved.join(rel)
            };
            state.nodes.insert(dest, node);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[tokio::test]
    async fn write_read_round_trip() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/a.txt"), b"hello", WriteOptions::truncate())
            .await
            .unwrap();
        assert_eq!(fs.read_file(&p("/tmp/a.txt")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn append_extends() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/a"), b"one", WriteOptions::truncate())
            .await
            .unwrap();
        fs.write_file(&p("/tmp/a"), b"two", WriteOptions::append())
            .await
            .unwrap();
        assert_eq!(fs.read_file(&p("/tmp/a")).await.unwrap(), b"onetwo");
    }

    #[tokio::test]
    async fn create_new_refuses_overwrite() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/a"), b"x", WriteOptions::truncate())
            .await
            .unwrap();
        let opts = WriteOptions {
            append: false,
            create_new: true,
        };
        assert!(fs.write_file(&p("/tmp/a"), b"y", opts).await.is_err());
    }

    #[tokio::test]
    async fn missing_parent_fails() {
        let fs = MemFs::new();
        assert!(fs
            .write_file(&p("/no/such/dir/f"), b"x", WriteOptions::truncate())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn mkdir_recursive_and_listing() {
        let fs = MemFs::new();
        fs.mkdir(&p("/a/b/c"), true).await.unwrap();
        fs.write_file(&p("/a/b/f1"), b"", WriteOptions::truncate())
            .await
            .unwrap();
        fs.write_file(&p("/a/b/f2"), b"", WriteOptions::truncate())
            .await
            .unwrap();

        let names: Vec<String> = fs
            .read_dir(&p("/a/b"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["c", "f1", "f2"]);
    }

    #[tokio::test]
    async fn listing_is_sorted() {
        let fs = MemFs::new();
        for name in ["zeta", "alpha", "mid"] {
            fs.write_file(&p(&format!("/tmp/{name}")), b"", WriteOptions::truncate())
                .await
                .unwrap();
        }
        let names: Vec<String> = fs
            .read_dir(&p("/tmp"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn symlinks_resolve_on_read() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/real"), b"data", WriteOptions::truncate())
            .await
            .unwrap();
        fs.symlink(&p("/tmp/real"), &p("/tmp/link")).await.unwrap();

        assert_eq!(fs.read_file(&p("/tmp/link")).await.unwrap(), b"data");
        assert!(fs.stat(&p("/tmp/link")).await.unwrap().file_type.is_file());
        assert!(fs
            .lstat(&p("/tmp/link"))
            .await
            .unwrap()
            .file_type
            .is_symlink());
        assert_eq!(fs.read_link(&p("/tmp/link")).await.unwrap(), p("/tmp/real"));
    }

    #[tokio::test]
    async fn symlink_loop_detected() {
        let fs = MemFs::new();
        fs.symlink(&p("/tmp/b"), &p("/tmp/a")).await.unwrap();
        fs.symlink(&p("/tmp/a"), &p("/tmp/b")).await.unwrap();
        assert!(fs.read_file(&p("/tmp/a")).await.is_err());
    }

    #[tokio::test]
    async fn realpath_resolves_dots_and_links() {
        let fs = MemFs::new();
        fs.mkdir(&p("/a/b"), true).await.unwrap();
        fs.symlink(&p("/a/b"), &p("/tmp/ab")).await.unwrap();
        assert_eq!(
            fs.realpath(&p("/tmp/../tmp/ab/./")).await.unwrap(),
            p("/a/b")
        );
    }

    #[tokio::test]
    async fn rm_recursive_removes_subtree() {
        let fs = MemFs::new();
        fs.mkdir(&p("/a/b"), true).await.unwrap();
        fs.write_file(&p("/a/b/f"), b"", WriteOptions::truncate())
            .await
            .unwrap();

        let opts = RmOptions {
            recursive: false,
            force: false,
        };
        assert!(fs.rm(&p("/a"), opts).await.is_err());

        let opts = RmOptions {
            recursive: true,
            force: false,
        };
        fs.rm(&p("/a"), opts).await.unwrap();
        assert!(!fs.exists(&p("/a/b/f")).await.unwrap());
        assert!(!fs.exists(&p("/a")).await.unwrap());
    }

    #[tokio::test]
    async fn mv_renames_subtree() {
        let fs = MemFs::new();
        fs.mkdir(&p("/src/sub"), true).await.unwrap();
        fs.write_file(&p("/src/sub/f"), b"x", WriteOptions::truncate())
            .await
            .unwrap();
        fs.mv(&p("/src"), &p("/dst")).await.unwrap();
        assert!(!fs.exists(&p("/src")).await.unwrap());
        assert_eq!(fs.read_file(&p("/dst/sub/f")).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn cp_into_directory_uses_basename() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/f"), b"x", WriteOptions::truncate())
            .await
            .unwrap();
        fs.mkdir(&p("/dest"), false).await.unwrap();
        fs.cp(&p("/tmp/f"), &p("/dest"), false).await.unwrap();
        assert_eq!(fs.read_file(&p("/dest/f")).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn mtime_ordering_is_monotonic() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/first"), b"", WriteOptions::truncate())
            .await
            .unwrap();
        fs.write_file(&p("/tmp/second"), b"", WriteOptions::truncate())
            .await
            .unwrap();
        let first = fs.stat(&p("/tmp/first")).await.unwrap().mtime;
        let second = fs.stat(&p("/tmp/second")).await.unwrap().mtime;
        assert!(second > first);

        fs.utimes(&p("/tmp/first"), second + 10).await.unwrap();
        assert_eq!(fs.stat(&p("/tmp/first")).await.unwrap().mtime, second + 10);
    }

    #[tokio::test]
    async fn chmod_updates_mode() {
        let fs = MemFs::new();
        fs.write_file(&p("/tmp/f"), b"", WriteOptions::truncate())
            .await
            .unwrap();
        fs.chmod(&p("/tmp/f"), 0o755).await.unwrap();
        assert_eq!(fs.stat(&p("/tmp/f")).await.unwrap().mode, 0o755);
    }
}
