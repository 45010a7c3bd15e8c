use std::fmt;

/// Alignment of every upload. Framebuffers and shader code need at least
/// this much.
pub const UPLOAD_ALIGNMENT: u64 = 128;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// Linear allocator over one GPU-mapped buffer, with a host copy of its
/// contents.
///
/// Objects are placed back to back, so a submission built with it can be
/// registered as a single allocation.
#[derive(Clone)]
pub struct BumpArena {
    base: u64,
    cursor: u64,
    bytes: Vec<u8>,
}

impl BumpArena {
    /// Create an arena covering GPU addresses `[base, base + capacity)`.
    pub fn new(base: u64, capacity: usize) -> Self {
        Self {
            base,
            cursor: base,
            bytes: vec![0; capacity],
        }
    }

    /// Reset the cursor and zero the contents.
    pub fn reset(&mut self) {
        self.cursor = self.base;
        self.bytes.fill(0);
    }

    pub fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.cursor)
    }

    /// Next allocation will be at or after this address.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn end(&self) -> u64 {
        self.base + self.capacity()
    }

    /// Reserve `size` bytes aligned to `alignment`, returning the GPU address.
    pub fn alloc(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let alignment = alignment.max(1);
        let aligned = align_up(self.cursor, alignment);
        let end = aligned.checked_add(size)?;
        if end > self.end() {
            return None;
        }
        self.cursor = end;
        Some(aligned)
    }

    /// Copy `data` into a fresh [`UPLOAD_ALIGNMENT`]-aligned block.
    pub fn upload(&mut self, data: &[u8]) -> Option<u64> {
        let address = self.alloc(data.len() as u64, UPLOAD_ALIGNMENT)?;
        self.write(address, data).then_some(address)
    }

    /// Overwrite bytes at an address inside the arena, e.g. to patch a
    /// pointer once its target is placed.
    pub fn write(&mut self, address: u64, data: &[u8]) -> bool {
        let Some(start) = address.checked_sub(self.base) else {
            return false;
        };
        let start = start as usize;
        match self.bytes.get_mut(start..start + data.len()) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for BumpArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BumpArena")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .finish()
    }
}
