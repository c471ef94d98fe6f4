use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;

pub const PATCH_DIRECTORY: &str = "lib/patches";

/// Library patch files shipped with the runtime, keyed by feature path
/// relative to the patch directory without the `.rb` extension. The flag
/// records whether the patch has been applied.
pub struct PatchFiles {
    root: Option<PathBuf>,
    files: RwLock<HashMap<String, bool>>,
}

impl PatchFiles {
    pub fn empty() -> Self {
        Self {
            root: None,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Scans `<home>/lib/patches`. A missing or unreadable directory yields
    /// no patches.
    pub fn discover(home: &Path) -> Self {
        let root = home.join(PATCH_DIRECTORY);
        if !root.is_dir() {
            log::debug!("no patch directory at {}", root.display());
            return Self::empty();
        }
        let mut files = HashMap::new();
        if let Err(err) = collect(&root, &root, &mut files) {
            log::warn!("could not scan patch directory {}: {err}", root.display());
            return Self::empty();
        }
        log::debug!("found {} patch files under {}", files.len(), root.display());
        Self {
            root: Some(root),
            files: RwLock::new(files),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn is_patch(&self, feature: &str) -> bool {
        self.files.read().contains_key(feature)
    }

    pub fn is_applied(&self, feature: &str) -> bool {
        self.files.read().get(feature).copied().unwrap_or(false)
    }

    /// Marks `feature` applied. Returns true only for the first call on a
    /// known patch.
    pub fn mark_applied(&self, feature: &str) -> bool {
        match self.files.write().get_mut(feature) {
            Some(applied) if !*applied => {
                *applied = true;
                true
            }
            _ => false,
        }
    }

    /// Absolute path of a patch file.
    pub fn path_of(&self, feature: &str) -> Option<PathBuf> {
        if !self.is_patch(feature) {
            return None;
        }
        self.root
            .as_ref()
            .map(|root| root.join(format!("{feature}.rb")))
    }

    pub fn features(&self) -> Vec<String> {
        let mut features: Vec<_> = self.files.read().keys().cloned().collect();
        features.sort();
        features
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect(root: &Path, dir: &Path, out: &mut HashMap<String, bool>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(root, &path, out)?;
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("rb") {
            continue;
        }
        let Ok(relative) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf)
        else {
            continue;
        };
        let feature = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(feature, false);
    }
    Ok(())
}
