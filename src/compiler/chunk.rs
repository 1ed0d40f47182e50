// Toy Bytecode Chunk
// Instruction vector with span and statement-boundary information

use std::fmt::Write as _;

use super::opcode::OpCode;
use crate::error::Span;

/// A chunk of bytecode. Addresses are absolute: `code[i]` lives at
/// `base + i`, and every jump target and label uses that numbering.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Address of `code[0]`
    pub base: usize,
    pub code: Vec<OpCode>,
    /// Span of each instruction for error reporting
    pub spans: Vec<Span>,
    /// Addresses where top-level statements begin
    pub statement_starts: Vec<usize>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A continuation chunk whose first instruction lives at `base`
    pub fn starting_at(base: usize) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Append an instruction and return its address
    pub fn write(&mut self, op: OpCode, span: Span) -> usize {
        self.code.push(op);
        self.spans.push(span);
        self.end() - 1
    }

    /// Address one past the last instruction
    pub fn end(&self) -> usize {
        self.base + self.code.len()
    }

    pub fn get(&self, address: usize) -> Option<&OpCode> {
        address
            .checked_sub(self.base)
            .and_then(|i| self.code.get(i))
    }

    /// Point the jump at `address` to the current end
    pub fn patch_jump(&mut self, address: usize) {
        let target = self.end();
        self.patch_jump_to(address, target);
    }

    pub fn patch_jump_to(&mut self, address: usize, target: usize) {
        let Some(op) = address
            .checked_sub(self.base)
            .and_then(|i| self.code.get_mut(i))
        else {
            return;
        };
        match op {
            OpCode::Jump(t) | OpCode::NJump(t) | OpCode::Next(t) => *t = target,
            _ => {}
        }
    }

    /// Get span for instruction at address
    pub fn get_span(&self, address: usize) -> Span {
        address
            .checked_sub(self.base)
            .and_then(|i| self.spans.get(i))
            .copied()
            .unwrap_or_default()
    }

    /// Append a continuation chunk compiled at `self.end()`
    pub fn extend(&mut self, next: Chunk) {
        debug_assert_eq!(next.base, self.end());
        self.code.extend(next.code);
        self.spans.extend(next.spans);
        self.statement_starts.extend(next.statement_starts);
    }

    /// Drop a trailing `Halt` so more code can be appended
    pub fn pop_halt(&mut self) {
        if matches!(self.code.last(), Some(OpCode::Halt)) {
            self.code.pop();
            self.spans.pop();
        }
    }

    /// One disassembled line
    pub fn format_instruction(&self, address: usize) -> String {
        let span = self.get_span(address);
        match self.get(address) {
            Some(op) => format!("{:04} {:4} {}", address, span.start.line, op),
            None => format!("{:04}      <end>", address),
        }
    }

    /// Disassemble the chunk for debugging
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- {} ---", name);
        let _ = writeln!(out, "{} instructions\n", self.code.len());

        let mut previous_line = 0;
        for (i, op) in self.code.iter().enumerate() {
            let address = self.base + i;
            let line = self.spans[i].start.line;
            if line == previous_line {
                let _ = writeln!(out, "{:04}      {}", address, op);
            } else {
                let _ = writeln!(out, "{:04} {:4} {}", address, line, op);
            }
            previous_line = line;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_jump_uses_absolute_addresses() {
        let mut chunk = Chunk::starting_at(10);
        let jump = chunk.write(OpCode::Jump(0), Span::default());
        chunk.write(OpCode::Nop, Span::default());
        chunk.patch_jump(jump);
        assert_eq!(jump, 10);
        assert_eq!(chunk.get(10).and_then(OpCode::target), Some(12));
    }

    #[test]
    fn test_pop_halt_and_extend() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Nop, Span::default());
        chunk.write(OpCode::Halt, Span::default());
        chunk.pop_halt();
        let mut next = Chunk::starting_at(chunk.end());
        next.write(OpCode::Pop, Span::default());
        chunk.extend(next);
        assert_eq!(chunk.end(), 2);
        assert!(matches!(chunk.get(1), Some(OpCode::Pop)));
    }
}
