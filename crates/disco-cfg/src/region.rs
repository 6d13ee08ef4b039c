//! Disassembled block regions.

use std::collections::BTreeMap;

use disco_ir::{Block, BlockLabel};

/// Blocks sharing one disassembly start.
///
/// Sub-indices are dense from 0 and blocks are sorted by address. A region
/// is replaced as a whole when one of its blocks is split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRegion {
    pub start: u64,
    pub end: u64,
    pub blocks: Vec<Block>,
}

impl BlockRegion {
    /// Build a region from blocks in address order, renumbering their labels.
    pub fn new(start: u64, mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.addr);
        for (index, block) in blocks.iter_mut().enumerate() {
            block.label = BlockLabel::new(start, u32::try_from(index).unwrap_or(u32::MAX));
        }
        let end = blocks.last().map_or(start, Block::end);
        Self { start, end, blocks }
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Block starting exactly at `addr`.
    pub fn block_at(&self, addr: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.addr == addr)
    }

    /// Block covering `addr`.
    pub fn block_containing(&self, addr: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.contains(addr))
    }
}

/// Where an address falls relative to known blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// Start of an existing block.
    BlockStart,
    /// Strictly inside the block starting at `block` in region `region`.
    Interior {
        region: u64,
        block: u64,
        boundary: bool,
    },
    /// Not covered by any region.
    Unexplored,
}

/// All regions, keyed by start address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockMap {
    regions: BTreeMap<u64, BlockRegion>,
}

impl BlockMap {
    /// Region covering `addr`.
    pub fn region_containing(&self, addr: u64) -> Option<&BlockRegion> {
        self.regions
            .range(..=addr)
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.contains(addr))
    }

    /// Block starting at `addr`.
    pub fn block(&self, addr: u64) -> Option<&Block> {
        self.region_containing(addr)?.block_at(addr)
    }

    pub fn locate(&self, addr: u64) -> Location {
        let Some(region) = self.region_containing(addr) else {
            return Location::Unexplored;
        };
        match region.block_containing(addr) {
            Some(block) if block.addr == addr => Location::BlockStart,
            Some(block) => Location::Interior {
                region: region.start,
                block: block.addr,
                boundary: block.is_instr_boundary(addr),
            },
            None => Location::Unexplored,
        }
    }

    /// Start of the first region after `addr`.
    pub fn next_region_start(&self, addr: u64) -> Option<u64> {
        self.regions
            .range(addr.saturating_add(1)..)
            .next()
            .map(|(start, _)| *start)
    }

    pub fn insert(&mut self, region: BlockRegion) {
        self.regions.insert(region.start, region);
    }

    pub fn take(&mut self, start: u64) -> Option<BlockRegion> {
        self.regions.remove(&start)
    }

    pub fn regions(&self) -> impl Iterator<Item = &BlockRegion> {
        self.regions.values()
    }

    /// All blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.regions.values().flat_map(|region| region.blocks.iter())
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.regions.values().map(|r| r.blocks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use disco_ir::{RegState, Stmt, TermStmt};

    use super::*;

    fn block(addr: u64, lens: &[u64]) -> Block {
        let mut stmts = Vec::new();
        let mut cur = addr;
        for len in lens {
            stmts.push(Stmt::InstrStart { addr: cur, len: *len });
            cur += len;
        }
        Block {
            label: BlockLabel::new(0, 99),
            addr,
            size: cur - addr,
            stmts,
            term: TermStmt::FetchAndExecute(RegState::initial(&[])),
        }
    }

    #[test]
    fn test_locate() {
        let mut map = BlockMap::default();
        map.insert(BlockRegion::new(0x1000, vec![block(0x1000, &[1, 3, 5])]));
        assert_eq!(map.locate(0x1000), Location::BlockStart);
        assert_eq!(
            map.locate(0x1001),
            Location::Interior {
                region: 0x1000,
                block: 0x1000,
                boundary: true
            }
        );
        assert!(matches!(
            map.locate(0x1002),
            Location::Interior {
                boundary: false,
                ..
            }
        ));
        assert_eq!(map.locate(0x1009), Location::Unexplored);
        assert_eq!(map.next_region_start(0x0FFF), Some(0x1000));
        assert_eq!(map.next_region_start(0x1000), None);
    }

    #[test]
    fn test_region_labels_dense() {
        let region = BlockRegion::new(0x1000, vec![block(0x1004, &[2]), block(0x1000, &[4])]);
        assert_eq!(region.end, 0x1006);
        assert_eq!(region.blocks[0].label, BlockLabel::new(0x1000, 0));
        assert_eq!(region.blocks[1].label, BlockLabel::new(0x1000, 1));
        assert_eq!(region.blocks[1].addr, 0x1004);
    }
}
