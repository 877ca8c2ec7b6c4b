//! One reassembly slot per `(flow, sequence)`, grounded on Quake2's
//! `FragmentState` (`in_progress, sequence, current_offset, total_size,
//! buffer`): a fixed-size buffer plus a per-fragment received bitset, filled
//! in as fragments arrive in whatever order the network delivers them.

use crate::TsUsec;

pub struct ReassemblyBuffer {
    data: Vec<u8>,
    received: Vec<bool>,
    received_count: usize,
    last_touched: TsUsec,
}

impl ReassemblyBuffer {
    pub fn new(total_length: usize, fragment_count: usize, ts: TsUsec) -> Self {
        ReassemblyBuffer {
            data: vec![0u8; total_length],
            received: vec![false; fragment_count],
            received_count: 0,
            last_touched: ts,
        }
    }

    pub fn total_length(&self) -> usize {
        self.data.len()
    }

    pub fn last_touched(&self) -> TsUsec {
        self.last_touched
    }

    /// Places one fragment's bytes at `offset`. Duplicate fragments
    /// overwrite the same range rather than double-counting.
    pub fn place(&mut self, fragment_number: usize, offset: usize, bytes: &[u8], ts: TsUsec) {
        self.last_touched = ts;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        if let Some(slot) = self.received.get_mut(fragment_number) {
            if !*slot {
                *slot = true;
                self.received_count += 1;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.received.len()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
