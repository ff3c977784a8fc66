//! This module contains the decoder that turns the code bytes of a method into
//! the slots of an [`super::InstructionTable`].
//!
//! # Implementation Note
//!
//! The decoder is a single forward pass. The only context-sensitive parts of
//! the encoding are the alignment padding of the switch instructions (relative
//! to the start of the code) and the `wide` prefix, which is folded into the
//! instruction it modifies.

use crate::{
    disassembly::{Decoded, Operands, Slot},
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode::{code, InstructionSet, Layout},
};

/// Decodes `bytes` into one slot per byte, using the instructions known to
/// `set`.
///
/// # Errors
///
/// When `bytes` is empty or too large, contains an unknown or unsupported
/// opcode, or ends in the middle of an instruction's operands.
pub fn disassemble(set: &InstructionSet, bytes: &[u8]) -> Result<Vec<Slot>> {
    if bytes.is_empty() {
        return Err(Error::EmptyCode.locate(0));
    }
    if u32::try_from(bytes.len()).is_err() {
        return Err(Error::CodeTooLarge.locate(u32::MAX));
    }

    let mut slots = Vec::with_capacity(bytes.len());
    let mut offset = 0;
    while offset < bytes.len() {
        // Guarded by the length check above.
        #[allow(clippy::cast_possible_truncation)]
        let pc = offset as u32;
        let opcode = bytes[offset];
        let mut instruction = *set
            .get(opcode)
            .ok_or_else(|| unknown_opcode(opcode).locate(pc))?;

        let mut reader = Reader {
            bytes,
            position: offset + 1,
            mnemonic: instruction.mnemonic,
            pc,
        };
        let operands = match instruction.layout {
            Layout::None => instruction
                .implicit_local
                .map_or(Operands::None, Operands::Local),
            Layout::Immediate8 => Operands::Immediate(i32::from(reader.i8()?)),
            Layout::Immediate16 => Operands::Immediate(i32::from(reader.i16()?)),
            Layout::Local8 => Operands::Local(u16::from(reader.u8()?)),
            Layout::Constant8 => Operands::Constant(u16::from(reader.u8()?)),
            Layout::Constant16 => Operands::Constant(reader.u16()?),
            Layout::Branch16 => Operands::Branch(i32::from(reader.i16()?)),
            Layout::Branch32 => Operands::Branch(reader.i32()?),
            Layout::Increment => Operands::Increment {
                index: u16::from(reader.u8()?),
                delta: i16::from(reader.i8()?),
            },
            Layout::TableSwitch => {
                reader.skip(code::padding(pc))?;
                let default = reader.i32()?;
                let low = reader.i32()?;
                let high = reader.i32()?;
                if high < low {
                    return Err(Error::InvalidSwitchBounds { low, high }.locate(pc));
                }
                let count = i64::from(high) - i64::from(low) + 1;
                let offsets = (0..count).map(|_| reader.i32()).collect::<Result<Vec<_>>>()?;
                Operands::Table {
                    default,
                    low,
                    offsets,
                }
            }
            Layout::LookupSwitch => {
                reader.skip(code::padding(pc))?;
                let default = reader.i32()?;
                let count = reader.i32()?;
                if count < 0 {
                    return Err(Error::InvalidSwitchPairs(count).locate(pc));
                }
                let pairs = (0..count)
                    .map(|_| Ok((reader.i32()?, reader.i32()?)))
                    .collect::<Result<Vec<_>>>()?;
                Operands::Lookup { default, pairs }
            }
            Layout::Interface => {
                let index = reader.u16()?;
                let count = reader.u8()?;
                reader.skip(1)?;
                Operands::Interface { index, count }
            }
            Layout::MultiArray => {
                let index = reader.u16()?;
                let dimensions = reader.u8()?;
                Operands::MultiArray { index, dimensions }
            }
            Layout::Wide => {
                let modified = reader.u8()?;
                let target = *set
                    .get(modified)
                    .ok_or_else(|| Error::InvalidWideTarget(modified).locate(pc))?;
                let operands = match target.layout {
                    Layout::Local8 => Operands::Local(reader.u16()?),
                    Layout::Increment => Operands::Increment {
                        index: reader.u16()?,
                        delta: reader.i16()?,
                    },
                    _ => return Err(Error::InvalidWideTarget(modified).locate(pc)),
                };
                instruction = target;
                operands
            }
        };

        // Bounded by the code length, which fits in a u32.
        #[allow(clippy::cast_possible_truncation)]
        let length = (reader.position - offset) as u32;
        slots.push(Slot::Instruction(Decoded {
            pc,
            length,
            instruction,
            operands,
        }));
        slots.extend((1..length).map(|_| Slot::Operand { owner: pc }));
        offset = reader.position;
    }

    Ok(slots)
}

/// Builds the error for an opcode that the instruction set does not know.
fn unknown_opcode(opcode: u8) -> Error {
    match opcode {
        code::JSR => Error::UnsupportedInstruction("jsr"),
        code::RET => Error::UnsupportedInstruction("ret"),
        code::JSR_W => Error::UnsupportedInstruction("jsr_w"),
        code::INVOKEDYNAMIC => Error::UnsupportedInstruction("invokedynamic"),
        other => Error::InvalidOpcode(other),
    }
}

/// A cursor over the operand bytes of one instruction.
struct Reader<'a> {
    bytes:    &'a [u8],
    position: usize,
    mnemonic: &'static str,
    pc:       u32,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.position + N;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or_else(|| Error::TruncatedOperands(self.mnemonic).locate(self.pc))?;
        self.position = end;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        if self.position + count > self.bytes.len() {
            return Err(Error::TruncatedOperands(self.mnemonic).locate(self.pc));
        }
        self.position += count;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take()?))
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        disassembly::{disassembler::disassemble, Operands, Slot},
        error::disassembly::Error,
        opcode::{code::*, STANDARD},
    };

    #[test]
    fn errors_on_empty_code() {
        let result = disassemble(&STANDARD, &[]).expect_err("Empty code was decoded");
        assert_eq!(result.payload, Error::EmptyCode);
    }

    #[test]
    fn keeps_one_slot_per_byte() -> anyhow::Result<()> {
        let code = bytecode![BIPUSH, [0xfe], SIPUSH, [0x01, 0x00], IADD, IRETURN];
        let slots = disassemble(&STANDARD, &code)?;
        assert_eq!(slots.len(), code.len());
        assert!(matches!(slots[1], Slot::Operand { owner: 0 }));

        let Slot::Instruction(bipush) = &slots[0] else {
            panic!("bipush was not decoded")
        };
        assert_eq!(bipush.operands, Operands::Immediate(-2));

        let Slot::Instruction(sipush) = &slots[2] else {
            panic!("sipush was not decoded")
        };
        assert_eq!(sipush.operands, Operands::Immediate(256));
        assert_eq!(sipush.length, 3);

        Ok(())
    }

    #[test]
    fn implicit_locals_become_operands() -> anyhow::Result<()> {
        let slots = disassemble(&STANDARD, &bytecode![ALOAD_3, ARETURN])?;
        let Slot::Instruction(load) = &slots[0] else {
            panic!("aload_3 was not decoded")
        };
        assert_eq!(load.operands, Operands::Local(3));

        Ok(())
    }

    #[test]
    fn aligns_table_switches() -> anyhow::Result<()> {
        let code = bytecode![NOP, table_switch(1, 20, 5, &[24, 28]), RETURN];
        let slots = disassemble(&STANDARD, &code)?;
        let Slot::Instruction(switch) = &slots[1] else {
            panic!("tableswitch was not decoded")
        };
        assert_eq!(switch.length, 1 + 2 + 12 + 8);
        assert_eq!(
            switch.operands,
            Operands::Table {
                default: 20,
                low:     5,
                offsets: vec![24, 28],
            }
        );

        Ok(())
    }

    #[test]
    fn folds_wide_into_the_modified_instruction() -> anyhow::Result<()> {
        let code = bytecode![WIDE, IINC, [0x01, 0x00], [0xff, 0xff], RETURN];
        let slots = disassemble(&STANDARD, &code)?;
        let Slot::Instruction(iinc) = &slots[0] else {
            panic!("wide iinc was not decoded")
        };
        assert_eq!(iinc.instruction.mnemonic, "iinc");
        assert_eq!(iinc.length, 6);
        assert_eq!(
            iinc.operands,
            Operands::Increment {
                index: 256,
                delta: -1,
            }
        );

        Ok(())
    }

    #[test]
    fn rejects_subroutines() {
        let error = disassemble(&STANDARD, &bytecode![JSR, branch(3), RETURN])
            .expect_err("jsr was decoded");
        assert_eq!(error.payload, Error::UnsupportedInstruction("jsr"));
    }

    #[test]
    fn rejects_truncated_operands() {
        let error =
            disassemble(&STANDARD, &bytecode![GOTO, [0x00]]).expect_err("Truncated goto decoded");
        assert_eq!(error.payload, Error::TruncatedOperands("goto"));
        assert_eq!(error.location.pc, 0);
    }
}
