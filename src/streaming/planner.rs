//! Maps a buffer's line boundaries onto fixed-size output blocks.
//!
//! A block is a run of at most `limit` consecutive lines bound for one
//! shard. Blocks may straddle buffers: the lines of the last block of one
//! buffer are carried over, and the next buffer's first block only tops the
//! open block up to `limit`.

use crate::streaming::scanner::LineIndex;

/// A contiguous, line-aligned byte range of the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub byte_start: usize,
    pub byte_end: usize,
    pub lines: u64,
    /// Whether this is the last block planned for the buffer.
    pub last_in_buffer: bool,
}

/// Planning state threaded from one buffer to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanState {
    /// Lines already counted toward the block currently open.
    /// Always below the limit.
    pub carry_lines: u64,
    /// Index of the next block to emit from the current plan.
    pub block_cursor: usize,
}

/// Ordered blocks for one buffer plus the cursor over them.
#[derive(Debug, Clone)]
pub struct BufferPlan {
    blocks: Vec<Block>,
    state: PlanState,
    limit: u64,
}

impl BufferPlan {
    /// All planned blocks in emission order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Current planning state. After the last block has been taken,
    /// `carry_lines` is the carry for the next buffer.
    pub fn state(&self) -> PlanState {
        self.state
    }

    /// Whether every planned block has been taken.
    pub fn is_exhausted(&self) -> bool {
        self.state.block_cursor >= self.blocks.len()
    }

    /// Takes the next block and advances the cursor and carry.
    pub fn next_block(&mut self) -> Option<Block> {
        let block = *self.blocks.get(self.state.block_cursor)?;
        self.state.block_cursor += 1;
        self.state.carry_lines = (self.state.carry_lines + block.lines) % self.limit;
        Some(block)
    }
}

/// Plans the blocks of a buffer.
///
/// `carry_lines` is the number of lines already in the open block; values
/// of `limit` or more are reduced modulo `limit`, since a full block has
/// already been closed. A buffer with no terminated lines plans no blocks.
///
/// # Panics
///
/// Panics if `limit` is 0.
pub fn plan(index: &LineIndex, carry_lines: u64, limit: u64) -> BufferPlan {
    assert!(limit > 0, "limit must be greater than 0");

    let carry = carry_lines % limit;
    let count = index.count as u64;
    let mut blocks = Vec::new();

    if count > 0 {
        let total_blocks = (count + carry).div_ceil(limit);
        for block_num in 0..total_blocks {
            let is_last = block_num + 1 == total_blocks;
            let start_line = (block_num * limit).saturating_sub(carry);
            let end_line = if is_last {
                count
            } else {
                (block_num + 1) * limit - carry
            };

            blocks.push(Block {
                byte_start: index.offsets[start_line as usize],
                byte_end: index.offsets[end_line as usize],
                lines: end_line - start_line,
                last_in_buffer: is_last,
            });
        }
    }

    BufferPlan {
        blocks,
        state: PlanState {
            carry_lines: carry,
            block_cursor: 0,
        },
        limit,
    }
}
