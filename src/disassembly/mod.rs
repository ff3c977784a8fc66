//! This module contains the implementation of the [`InstructionTable`], the
//! decoded form of a method's code, and of the [`Decoded`] instructions it
//! holds.

mod disassembler;

use std::sync::Arc;

use hex::FromHexError;

use crate::{
    error::{container::Locatable, disassembly, disassembly::Error},
    opcode::{Instruction, InstructionSet, STANDARD},
};

/// The operands of a decoded instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operands {
    None,

    /// An immediate integer (`bipush`, `sipush`, `newarray`).
    Immediate(i32),

    /// A local variable index, explicit or implied by the opcode.
    Local(u16),

    Increment {
        index: u16,
        delta: i16,
    },

    /// A constant pool index.
    Constant(u16),

    /// A branch offset relative to the start of the instruction.
    Branch(i32),

    Table {
        default: i32,
        low:     i32,
        offsets: Vec<i32>,
    },

    Lookup {
        default: i32,
        pairs:   Vec<(i32, i32)>,
    },

    Interface {
        index: u16,
        count: u8,
    },

    MultiArray {
        index:      u16,
        dimensions: u8,
    },
}

/// An instruction decoded at a specific byte offset in a method's code.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// The byte offset of the opcode.
    pub pc: u32,

    /// The total length of the instruction in bytes, including the opcode.
    pub length: u32,

    pub instruction: Instruction,

    pub operands: Operands,
}

impl Decoded {
    /// Gets the number of bytes following the opcode.
    #[must_use]
    pub fn extra_bytes(&self) -> u32 {
        self.length - 1
    }

    /// Gets the byte offset of the instruction that follows this one.
    #[must_use]
    pub fn next_pc(&self) -> u32 {
        self.pc + self.length
    }

    /// Gets the absolute target of a branch by `offset` from this instruction.
    #[must_use]
    pub fn target(&self, offset: i32) -> i64 {
        i64::from(self.pc) + i64::from(offset)
    }

    /// Gets the mnemonic of the instruction.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.instruction.mnemonic
    }
}

/// One byte position of a method's code.
#[derive(Clone, Debug)]
pub enum Slot {
    /// The first byte of an instruction.
    Instruction(Decoded),

    /// An operand byte of the instruction starting at `owner`.
    Operand { owner: u32 },
}

/// The decoded code of a method, indexed by byte offset.
///
/// # Byte-Instruction Correspondence
///
/// Branch offsets and exception table ranges are expressed in bytes, so the
/// table keeps exactly one [`Slot`] per code byte. Operand bytes are
/// represented as [`Slot::Operand`] entries that can never be executed.
///
/// # Non-Emptiness
///
/// The table is required to contain at least one instruction. This is
/// validated at construction time.
#[derive(Clone, Debug)]
pub struct InstructionTable {
    slots: Arc<Vec<Slot>>,
    code:  Arc<[u8]>,
}

impl InstructionTable {
    /// Decodes `bytes` with the standard instruction set.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `bytes` is not valid code.
    pub fn decode(bytes: &[u8]) -> disassembly::Result<Self> {
        Self::decode_with(&STANDARD, bytes)
    }

    /// Decodes `bytes` with the instructions of `set`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `bytes` is not valid code for `set`.
    pub fn decode_with(set: &InstructionSet, bytes: &[u8]) -> disassembly::Result<Self> {
        let slots = Arc::new(disassembler::disassemble(set, bytes)?);
        let code = Arc::from(bytes);
        Ok(Self { slots, code })
    }

    /// Gets the length of the code in bytes.
    #[allow(clippy::len_without_is_empty)] // The table cannot be empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Gets the instruction starting at `pc`, if there is one.
    #[must_use]
    pub fn instruction(&self, pc: u32) -> Option<&Decoded> {
        match self.slots.get(pc as usize) {
            Some(Slot::Instruction(decoded)) => Some(decoded),
            _ => None,
        }
    }

    /// Checks if an instruction starts at `pc`.
    #[must_use]
    pub fn is_instruction_start(&self, pc: u32) -> bool {
        self.instruction(pc).is_some()
    }

    /// Iterates over the decoded instructions in code order.
    pub fn instructions(&self) -> impl Iterator<Item = &Decoded> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Instruction(decoded) => Some(decoded),
            Slot::Operand { .. } => None,
        })
    }

    /// Gets the number of instructions in the table.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions().count()
    }

    /// Gets the code bytes the table was decoded from.
    #[must_use]
    pub fn as_bytecode(&self) -> &[u8] {
        &self.code
    }
}

/// An [`InstructionTable`] is usually created from the code bytes of a method.
impl<'a> TryFrom<&'a [u8]> for InstructionTable {
    type Error = disassembly::LocatedError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        Self::decode(value)
    }
}

/// An [`InstructionTable`] can be created from a string as long as that string
/// is a hexadecimal encoding of the code bytes.
impl TryFrom<&str> for InstructionTable {
    type Error = disassembly::LocatedError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = match hex::decode(value) {
            Ok(b) => b,
            Err(e) => {
                let locate = |val| u32::try_from(val).map_err(|_| Error::CodeTooLarge.locate(u32::MAX));

                let error = if let FromHexError::InvalidHexCharacter { c, index } = e {
                    let location = locate(index);
                    Error::InvalidHexCharacter(c, index).locate(location?)
                } else {
                    let location = locate(value.len());
                    Error::InvalidHexLength.locate(location?)
                };

                return Err(error);
            }
        };
        InstructionTable::decode(bytes.as_slice())
    }
}
