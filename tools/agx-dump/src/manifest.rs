//! Capture manifests: the allocations of one submission, each backed by a
//! file of host bytes.

use std::fs;
use std::path::{Path, PathBuf};

use agx_mem::{AddressRegistry, AllocKind, Allocation};
use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    Regular,
    CommandBuffer,
    MemoryMap,
}

impl From<ManifestKind> for AllocKind {
    fn from(kind: ManifestKind) -> Self {
        match kind {
            ManifestKind::Regular => AllocKind::Regular,
            ManifestKind::CommandBuffer => AllocKind::CommandBuffer,
            ManifestKind::MemoryMap => AllocKind::MemoryMap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestAllocation {
    pub kind: ManifestKind,
    pub index: u32,
    /// Zero for host-only allocations.
    #[serde(default)]
    pub gpu_va: u64,
    /// Defaults to the length of `file`.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub name: String,
    /// Relative paths resolve against the manifest's directory.
    pub file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub allocations: Vec<ManifestAllocation>,
    pub cmdbuf: Option<u32>,
    pub map: Option<u32>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse manifest {}", path.display()))
    }

    /// Reads every allocation's bytes and registers it.
    pub fn registry(&self, base_dir: &Path) -> anyhow::Result<AddressRegistry> {
        let mut registry = AddressRegistry::new();
        for alloc in &self.allocations {
            let path = base_dir.join(&alloc.file);
            let bytes =
                fs::read(&path).with_context(|| format!("read allocation {}", path.display()))?;
            let size = alloc.size.unwrap_or(bytes.len() as u64);
            if (bytes.len() as u64) < size {
                bail!(
                    "allocation {} declares {size} bytes but {} holds {}",
                    alloc.index,
                    path.display(),
                    bytes.len()
                );
            }
            tracing::debug!(index = alloc.index, path = %path.display(), size, "loaded allocation");

            let mut entry = Allocation::new(alloc.kind.into(), alloc.index, alloc.gpu_va, size)
                .with_host(bytes);
            if !alloc.name.is_empty() {
                entry = entry.with_name(alloc.name.as_str());
            }
            registry.register(entry);
        }
        Ok(registry)
    }
}
