//! Memory map (segment list) submitted alongside a command buffer.
//!
//! The map is a 64-byte header followed by 64-byte entries, one slot per
//! allocation in allocation order. Only resident allocations fill their
//! slot; the others stay zero. An entry flagged [`MAP_ENTRY_SENTINEL`] ends
//! the list.

use crate::layouts::{
    MAP_ENTRIES_OFFSET, MAP_ENTRY, MAP_ENTRY_RESIDENT, MAP_ENTRY_SENTINEL, MAP_HEADER,
};
use crate::pack::{PackError, Record};

#[derive(Debug, Clone)]
pub struct MapBuilder {
    cmdbuf_id: u64,
    encoder_id: u64,
    slots: Vec<Option<u32>>,
}

impl MapBuilder {
    pub fn new(cmdbuf_id: u64, encoder_id: u64) -> Self {
        Self {
            cmdbuf_id,
            encoder_id,
            slots: Vec::new(),
        }
    }

    /// Lists the allocation with driver handle `index` in the next slot.
    pub fn push(&mut self, index: u32) -> &mut Self {
        self.slots.push(Some(index));
        self
    }

    /// Leaves the next slot empty, as for a non-resident allocation.
    pub fn skip(&mut self) -> &mut Self {
        self.slots.push(None);
        self
    }

    /// Bytes needed for the header, every slot and the sentinel.
    pub fn size(&self) -> usize {
        MAP_ENTRIES_OFFSET + (self.slots.len() + 1) * MAP_ENTRY.length
    }

    pub fn build(&self) -> Result<Vec<u8>, PackError> {
        let count = self.slots.len() as u64 + 1;
        let mut out = MAP_HEADER.pack(&[
            ("cmdbuf_id", self.cmdbuf_id.into()),
            ("unknown_64", 1u32.into()),
            ("unknown_96", 0x528u32.into()),
            ("encoder_id", self.encoder_id.into()),
            ("unknown_224", 0x780u32.into()),
            ("entry_count", count.into()),
            ("entry_count_2", count.into()),
            ("unknown_320", 0xbu32.into()),
        ])?;
        out.resize(MAP_ENTRIES_OFFSET, 0);

        for slot in &self.slots {
            match slot {
                Some(index) => out.extend(entry(MAP_ENTRY_RESIDENT, *index)?),
                None => out.resize(out.len() + MAP_ENTRY.length, 0),
            }
        }
        out.extend(entry(MAP_ENTRY_SENTINEL, 0)?);
        Ok(out)
    }
}

fn entry(flags: u64, index: u32) -> Result<Vec<u8>, PackError> {
    MAP_ENTRY.pack(&[
        ("flags", flags.into()),
        ("unknown_192", 1u32.into()),
        ("unknown_288", 0x1ffffu32.into()),
        ("index", index.into()),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub slot: usize,
    pub index: u32,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMap {
    pub header: Record,
    pub entries: Vec<MapEntry>,
    /// Slots before the sentinel that were left empty.
    pub empty_slots: usize,
    pub sentinel_found: bool,
}

/// Reads the header and entries up to the sentinel or the declared count,
/// whichever comes first. Slots past the end of `bytes` are not read.
pub fn parse_memory_map(bytes: &[u8]) -> Result<MemoryMap, PackError> {
    let header = MAP_HEADER.unpack(bytes)?;
    let count = header.get("entry_count").unwrap_or(0) as usize;

    let mut entries = Vec::new();
    let mut empty_slots = 0;
    let mut sentinel_found = false;

    for slot in 0..count {
        let offset = MAP_ENTRIES_OFFSET + slot * MAP_ENTRY.length;
        let Some(raw) = bytes.get(offset..offset + MAP_ENTRY.length) else {
            break;
        };
        let record = MAP_ENTRY.unpack(raw)?;
        match record.get("flags").unwrap_or(0) {
            MAP_ENTRY_SENTINEL => {
                sentinel_found = true;
                break;
            }
            0 => empty_slots += 1,
            _ => entries.push(MapEntry {
                slot,
                index: record.get("index").unwrap_or(0) as u32,
                record,
            }),
        }
    }

    Ok(MemoryMap {
        header,
        entries,
        empty_slots,
        sentinel_found,
    })
}
