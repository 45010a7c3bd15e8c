use core::fmt;
use std::cell::Cell;

use tracing::{debug, trace};

/// What the driver created an allocation for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    Regular,
    CommandBuffer,
    MemoryMap,
}

impl fmt::Display for AllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocKind::Regular => "regular",
            AllocKind::CommandBuffer => "command buffer",
            AllocKind::MemoryMap => "memory map",
        })
    }
}

/// One registered buffer.
///
/// `gpu_address == 0` marks a host-only allocation (command buffers and
/// memory maps are handed to the kernel by handle, not by address). Such
/// entries are never returned by address lookups.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub kind: AllocKind,
    pub size: u64,
    pub host: Option<Vec<u8>>,
    pub gpu_address: u64,
    pub index: u32,
    pub name: String,
    read_only: Cell<bool>,
    mapped: Cell<bool>,
}

impl Allocation {
    pub fn new(kind: AllocKind, index: u32, gpu_address: u64, size: u64) -> Self {
        Self {
            kind,
            size,
            host: None,
            gpu_address,
            index,
            name: String::new(),
            read_only: Cell::new(false),
            mapped: Cell::new(false),
        }
    }

    pub fn with_host(mut self, bytes: Vec<u8>) -> Self {
        self.host = Some(bytes);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether `address` falls in `[gpu_address, gpu_address + size)`.
    pub fn contains(&self, address: u64) -> bool {
        self.gpu_address != 0 && address >= self.gpu_address && address - self.gpu_address < self.size
    }

    /// Set once the decoder has read from this allocation in the current pass.
    pub fn is_read_only(&self) -> bool {
        self.read_only.get()
    }

    /// Set when the submission's memory map lists this allocation.
    pub fn is_mapped(&self) -> bool {
        self.mapped.get()
    }

    fn host_slice(&self, offset: u64, len: u64) -> Result<&[u8], MemError> {
        let host = self.host.as_deref().ok_or_else(|| MemError::NoHostMemory {
            name: self.name.clone(),
            gpu_address: self.gpu_address,
        })?;
        let start = usize::try_from(offset).ok();
        let end = offset.checked_add(len).and_then(|e| usize::try_from(e).ok());
        match (start, end) {
            (Some(start), Some(end)) if end <= host.len() => Ok(&host[start..end]),
            _ => Err(MemError::HostTooShort {
                name: self.name.clone(),
                host_len: host.len() as u64,
                needed: offset.saturating_add(len),
            }),
        }
    }

    fn touch(&self) {
        if !self.read_only.replace(true) {
            trace!(name = %self.name, gpu_address = self.gpu_address, "allocation marked read-only");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    #[error("GPU address 0x{address:x} (0x{len:x} bytes) is not inside any registered allocation")]
    Unmapped { address: u64, len: u64 },

    #[error(
        "read of 0x{len:x} bytes at offset 0x{offset:x} overruns {name} (size 0x{size:x}) by 0x{overrun:x} bytes"
    )]
    Overrun {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
        overrun: u64,
    },

    #[error("allocation {name} at 0x{gpu_address:x} has no host bytes")]
    NoHostMemory { name: String, gpu_address: u64 },

    #[error("allocation {name} holds 0x{host_len:x} host bytes but 0x{needed:x} are required")]
    HostTooShort {
        name: String,
        host_len: u64,
        needed: u64,
    },

    #[error("no {kind} allocation with handle {index}")]
    MissingHandle { kind: AllocKind, index: u32 },
}

/// Outcome of a non-fatal bounds check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Ok,
    NullPointer,
    Unmapped,
    Overrun {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
    },
}

impl Diagnostic {
    pub fn is_ok(&self) -> bool {
        matches!(self, Diagnostic::Ok)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Ok => f.write_str("ok"),
            Diagnostic::NullPointer => f.write_str("XXX: null pointer deref"),
            Diagnostic::Unmapped => f.write_str("XXX: invalid memory dereference"),
            Diagnostic::Overrun {
                name,
                offset,
                len,
                size,
            } => write!(
                f,
                "XXX: buffer overrun. Chunk of size {len} at offset {offset} in buffer {name} of size {size}. Overrun by {} bytes.",
                offset.saturating_add(*len).saturating_sub(*size)
            ),
        }
    }
}

/// Owned table of every allocation known to a decode session.
///
/// Lookups are linear; a capture rarely holds more than a few dozen buffers.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    entries: Vec<Allocation>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    /// Inserts `alloc`, or updates the existing entry with the same base
    /// address in place. Host-only allocations are keyed by `(kind, index)`.
    pub fn register(&mut self, mut alloc: Allocation) {
        if alloc.name.is_empty() {
            alloc.name = format!("memory_{:x}", alloc.gpu_address);
        }

        let existing = self.entries.iter_mut().find(|e| {
            if alloc.gpu_address != 0 {
                e.gpu_address == alloc.gpu_address
            } else {
                e.gpu_address == 0 && e.kind == alloc.kind && e.index == alloc.index
            }
        });

        match existing {
            Some(entry) => {
                debug!(
                    name = %alloc.name,
                    gpu_address = alloc.gpu_address,
                    size = alloc.size,
                    "updating allocation"
                );
                entry.size = alloc.size;
                entry.host = alloc.host;
                entry.name = alloc.name;
                entry.kind = alloc.kind;
                entry.index = alloc.index;
            }
            None => {
                debug!(
                    name = %alloc.name,
                    kind = %alloc.kind,
                    gpu_address = alloc.gpu_address,
                    size = alloc.size,
                    "registering allocation"
                );
                self.entries.push(alloc);
            }
        }
    }

    pub fn find_containing(&self, address: u64) -> Option<&Allocation> {
        self.entries.iter().find(|e| e.contains(address))
    }

    pub fn find_handle(&self, index: u32, kind: AllocKind) -> Option<&Allocation> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.index == index)
    }

    /// Returns exactly `len` host bytes starting at `address`.
    pub fn fetch(&self, address: u64, len: u64) -> Result<&[u8], MemError> {
        let alloc = self
            .find_containing(address)
            .ok_or(MemError::Unmapped { address, len })?;
        let offset = address - alloc.gpu_address;
        let end = offset.saturating_add(len);
        if end > alloc.size {
            return Err(MemError::Overrun {
                name: alloc.name.clone(),
                offset,
                len,
                size: alloc.size,
                overrun: end - alloc.size,
            });
        }
        let bytes = alloc.host_slice(offset, len)?;
        alloc.touch();
        Ok(bytes)
    }

    /// Returns the bytes from `address` to the end of its allocation, capped
    /// at `max_len`.
    pub fn fetch_up_to(&self, address: u64, max_len: u64) -> Result<&[u8], MemError> {
        let alloc = self
            .find_containing(address)
            .ok_or(MemError::Unmapped {
                address,
                len: max_len,
            })?;
        let offset = address - alloc.gpu_address;
        let len = (alloc.size - offset).min(max_len);
        let bytes = alloc.host_slice(offset, len)?;
        alloc.touch();
        Ok(bytes)
    }

    /// Returns the whole host buffer of a host-only allocation.
    pub fn fetch_handle(&self, index: u32, kind: AllocKind) -> Result<&[u8], MemError> {
        let alloc = self
            .find_handle(index, kind)
            .ok_or(MemError::MissingHandle { kind, index })?;
        let bytes = alloc.host_slice(0, alloc.size)?;
        alloc.touch();
        Ok(bytes)
    }

    pub fn validate(&self, address: u64, len: u64) -> Diagnostic {
        if address == 0 {
            return Diagnostic::NullPointer;
        }
        let Some(alloc) = self.find_containing(address) else {
            return Diagnostic::Unmapped;
        };
        let offset = address - alloc.gpu_address;
        if offset.saturating_add(len) > alloc.size {
            return Diagnostic::Overrun {
                name: alloc.name.clone(),
                offset,
                len,
                size: alloc.size,
            };
        }
        Diagnostic::Ok
    }

    /// Marks every regular allocation with `index` as listed in the memory
    /// map. Returns false when no such allocation exists.
    pub fn mark_mapped(&self, index: u32) -> bool {
        let mut found = false;
        for e in self
            .entries
            .iter()
            .filter(|e| e.kind == AllocKind::Regular && e.index == index)
        {
            e.mapped.set(true);
            found = true;
        }
        found
    }

    /// Clears the read-only marking left by `fetch`. Returns how many
    /// allocations were touched during the pass.
    pub fn restore_writable(&self) -> usize {
        let mut touched = 0;
        for e in &self.entries {
            if e.read_only.replace(false) {
                touched += 1;
            }
        }
        debug!(touched, "restored allocations to writable");
        touched
    }

    /// Renders `address` as `name + offset` when it resolves.
    pub fn describe(&self, address: u64) -> String {
        match self.find_containing(address) {
            Some(alloc) if address == alloc.gpu_address => alloc.name.clone(),
            Some(alloc) => format!("{} + {}", alloc.name, address - alloc.gpu_address),
            None => format!("0x{address:x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(gpu_address: u64, size: u64) -> Allocation {
        Allocation::new(AllocKind::Regular, 1, gpu_address, size).with_host(vec![0u8; size as usize])
    }

    #[test]
    fn containment_uses_exclusive_upper_bound() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x100));

        assert!(reg.find_containing(0x1000).is_some());
        assert!(reg.find_containing(0x10FF).is_some());
        assert!(reg.find_containing(0x1100).is_none());
        assert!(reg.find_containing(0x0FFF).is_none());
    }

    #[test]
    fn register_same_base_updates_in_place() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x2000, 0x10));
        reg.register(regular(0x2000, 0x40).with_name("bigger"));

        assert_eq!(reg.len(), 1);
        let alloc = reg.find_containing(0x2030).unwrap();
        assert_eq!(alloc.size, 0x40);
        assert_eq!(alloc.name, "bigger");
    }

    #[test]
    fn default_name_uses_gpu_address() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0xabc000, 0x10));
        assert_eq!(reg.find_containing(0xabc000).unwrap().name, "memory_abc000");
    }

    #[test]
    fn host_only_allocations_are_keyed_by_handle() {
        let mut reg = AddressRegistry::new();
        reg.register(Allocation::new(AllocKind::CommandBuffer, 7, 0, 4).with_host(vec![1, 2, 3, 4]));
        reg.register(Allocation::new(AllocKind::MemoryMap, 7, 0, 2).with_host(vec![9, 9]));
        reg.register(Allocation::new(AllocKind::CommandBuffer, 7, 0, 2).with_host(vec![5, 6]));

        assert_eq!(reg.len(), 2);
        assert!(reg.find_containing(0).is_none());
        assert_eq!(reg.fetch_handle(7, AllocKind::CommandBuffer).unwrap(), &[5, 6]);
        assert_eq!(reg.fetch_handle(7, AllocKind::MemoryMap).unwrap(), &[9, 9]);
        assert_eq!(
            reg.fetch_handle(8, AllocKind::MemoryMap),
            Err(MemError::MissingHandle {
                kind: AllocKind::MemoryMap,
                index: 8
            })
        );
    }

    #[test]
    fn fetch_returns_view_and_marks_read_only() {
        let mut reg = AddressRegistry::new();
        let bytes: Vec<u8> = (0u8..16).collect();
        reg.register(Allocation::new(AllocKind::Regular, 3, 0x4000, 16).with_host(bytes));

        assert_eq!(reg.fetch(0x4004, 4).unwrap(), &[4, 5, 6, 7]);
        assert!(reg.find_containing(0x4000).unwrap().is_read_only());

        assert_eq!(reg.restore_writable(), 1);
        assert!(!reg.find_containing(0x4000).unwrap().is_read_only());
        assert_eq!(reg.restore_writable(), 0);
    }

    #[test]
    fn fetch_failures_are_typed() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x10));
        reg.register(Allocation::new(AllocKind::Regular, 2, 0x8000, 0x10).with_name("no_host"));

        assert_eq!(
            reg.fetch(0x5000, 4),
            Err(MemError::Unmapped {
                address: 0x5000,
                len: 4
            })
        );
        assert!(matches!(
            reg.fetch(0x100C, 8),
            Err(MemError::Overrun { overrun: 4, .. })
        ));
        assert!(matches!(
            reg.fetch(0x8000, 4),
            Err(MemError::NoHostMemory { .. })
        ));
        // Failed fetches leave nothing marked.
        assert_eq!(reg.restore_writable(), 0);
    }

    #[test]
    fn fetch_up_to_clamps_to_allocation_end() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x20));
        assert_eq!(reg.fetch_up_to(0x1018, 0x100).unwrap().len(), 8);
        assert_eq!(reg.fetch_up_to(0x1000, 4).unwrap().len(), 4);
    }

    #[test]
    fn validate_reports_without_failing() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x10).with_name("buf"));

        assert_eq!(reg.validate(0, 4), Diagnostic::NullPointer);
        assert_eq!(reg.validate(0x9000, 4), Diagnostic::Unmapped);
        assert!(reg.validate(0x1000, 0x10).is_ok());

        let diag = reg.validate(0x1008, 0x10);
        assert_eq!(
            diag.to_string(),
            "XXX: buffer overrun. Chunk of size 16 at offset 8 in buffer buf of size 16. Overrun by 8 bytes."
        );
    }

    #[test]
    fn overrun_display_never_underflows() {
        let diag = Diagnostic::Overrun {
            name: "buf".into(),
            offset: 4,
            len: 4,
            size: 16,
        };
        assert!(diag.to_string().ends_with("Overrun by 0 bytes."));

        let diag = Diagnostic::Overrun {
            name: "buf".into(),
            offset: u64::MAX,
            len: 2,
            size: 1,
        };
        assert!(diag.to_string().ends_with(&format!("Overrun by {} bytes.", u64::MAX - 1)));
    }

    #[test]
    fn mark_mapped_flags_regular_allocations() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x10));
        assert!(reg.mark_mapped(1));
        assert!(!reg.mark_mapped(2));
        assert!(reg.find_containing(0x1000).unwrap().is_mapped());
    }

    #[test]
    fn describe_renders_offsets() {
        let mut reg = AddressRegistry::new();
        reg.register(regular(0x1000, 0x100).with_name("shader"));
        assert_eq!(reg.describe(0x1000), "shader");
        assert_eq!(reg.describe(0x1010), "shader + 16");
        assert_eq!(reg.describe(0x2000), "0x2000");
    }
}
