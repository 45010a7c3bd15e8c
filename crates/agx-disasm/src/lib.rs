//! Disassembler for first-generation AGX shader machine code.
//!
//! Instructions are variable length (2 to 12 bytes) and identified by an
//! 8-bit opcode spread over the first two bytes. Operand layouts are only
//! partially understood; every instruction whose encoding is not fully
//! accounted for is printed next to its raw bytes.
//!
//! ```
//! let code = [0x62, 0x11, 0x00, 0x00, 0x00, 0x00, 0x88, 0x00, 0x08, 0x00];
//! let d = agx_disasm::disassemble(&code);
//! assert!(d.stopped);
//! assert_eq!(d.instructions[0].1.to_string(), "-movi w8, #0x0");
//! ```

#![forbid(unsafe_code)]

mod decode;
mod listing;
mod opcodes;
mod operand;

pub use decode::{decode_one, HexBytes, Instruction, Mnemonic, STOP_BYTE, WINDOW};
pub use listing::{disassemble, Disassembly, Listing};
pub use opcodes::{
    instruction_length, opcode_byte, Opcode, OpcodeInfo, OperandShape, OPCODE_TABLE,
};
pub use operand::{
    decode_float_imm8, encode_float_imm8, BitopKind, BitopSrc, ComputeSelector, Condition,
    FloatSrc, HalfKind, HalfSrc, Operand, Register, SrcKind, SrcModifiers,
};
