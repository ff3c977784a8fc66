//! This module contains the byte values of the opcodes and small helpers for
//! encoding their operands, for use when assembling method code by hand.

/// A fragment of method code.
///
/// Implemented for single opcodes and for encoded operand byte arrays so that
/// both can be mixed freely in [`crate::bytecode!`].
pub trait Encode {
    /// Appends the bytes of `self` to `code`.
    fn encode_into(&self, code: &mut Vec<u8>);
}

impl Encode for u8 {
    fn encode_into(&self, code: &mut Vec<u8>) {
        code.push(*self);
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode_into(&self, code: &mut Vec<u8>) {
        code.extend_from_slice(self);
    }
}

impl Encode for Vec<u8> {
    fn encode_into(&self, code: &mut Vec<u8>) {
        code.extend_from_slice(self);
    }
}

impl Encode for &[u8] {
    fn encode_into(&self, code: &mut Vec<u8>) {
        code.extend_from_slice(self);
    }
}

/// Encodes a 16-bit branch offset, relative to the start of the branch.
#[must_use]
pub fn branch(offset: i16) -> [u8; 2] {
    offset.to_be_bytes()
}

/// Encodes a 32-bit branch offset, relative to the start of the branch.
#[must_use]
pub fn wide_branch(offset: i32) -> [u8; 4] {
    offset.to_be_bytes()
}

/// Encodes a 16-bit constant pool index.
#[must_use]
pub fn index(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

/// Encodes a `tableswitch` instruction starting at byte offset `pc`, including
/// the opcode and alignment padding.
#[must_use]
pub fn table_switch(pc: u32, default: i32, low: i32, offsets: &[i32]) -> Vec<u8> {
    let mut code = vec![TABLESWITCH];
    code.resize(1 + padding(pc), 0);
    code.extend(default.to_be_bytes());
    code.extend(low.to_be_bytes());
    let high = low + i32::try_from(offsets.len()).unwrap_or(i32::MAX) - 1;
    code.extend(high.to_be_bytes());
    offsets.iter().for_each(|o| code.extend(o.to_be_bytes()));
    code
}

/// Encodes a `lookupswitch` instruction starting at byte offset `pc`,
/// including the opcode and alignment padding.
#[must_use]
pub fn lookup_switch(pc: u32, default: i32, pairs: &[(i32, i32)]) -> Vec<u8> {
    let mut code = vec![LOOKUPSWITCH];
    code.resize(1 + padding(pc), 0);
    code.extend(default.to_be_bytes());
    let count = i32::try_from(pairs.len()).unwrap_or(i32::MAX);
    code.extend(count.to_be_bytes());
    for (key, offset) in pairs {
        code.extend(key.to_be_bytes());
        code.extend(offset.to_be_bytes());
    }
    code
}

/// Gets the number of padding bytes following a switch opcode at `pc`.
#[must_use]
pub fn padding(pc: u32) -> usize {
    ((4 - (pc + 1) % 4) % 4) as usize
}

/// The `newarray` type code for `boolean`.
pub const T_BOOLEAN: u8 = 4;
/// The `newarray` type code for `char`.
pub const T_CHAR: u8 = 5;
/// The `newarray` type code for `float`.
pub const T_FLOAT: u8 = 6;
/// The `newarray` type code for `double`.
pub const T_DOUBLE: u8 = 7;
/// The `newarray` type code for `byte`.
pub const T_BYTE: u8 = 8;
/// The `newarray` type code for `short`.
pub const T_SHORT: u8 = 9;
/// The `newarray` type code for `int`.
pub const T_INT: u8 = 10;
/// The `newarray` type code for `long`.
pub const T_LONG: u8 = 11;

/// The `nop` opcode.
pub const NOP: u8 = 0x00;
/// The `aconst_null` opcode.
pub const ACONST_NULL: u8 = 0x01;
/// The `iconst_m1` opcode.
pub const ICONST_M1: u8 = 0x02;
/// The `iconst_0` opcode.
pub const ICONST_0: u8 = 0x03;
/// The `iconst_1` opcode.
pub const ICONST_1: u8 = 0x04;
/// The `iconst_2` opcode.
pub const ICONST_2: u8 = 0x05;
/// The `iconst_3` opcode.
pub const ICONST_3: u8 = 0x06;
/// The `iconst_4` opcode.
pub const ICONST_4: u8 = 0x07;
/// The `iconst_5` opcode.
pub const ICONST_5: u8 = 0x08;
/// The `lconst_0` opcode.
pub const LCONST_0: u8 = 0x09;
/// The `lconst_1` opcode.
pub const LCONST_1: u8 = 0x0a;
/// The `fconst_0` opcode.
pub const FCONST_0: u8 = 0x0b;
/// The `fconst_1` opcode.
pub const FCONST_1: u8 = 0x0c;
/// The `fconst_2` opcode.
pub const FCONST_2: u8 = 0x0d;
/// The `dconst_0` opcode.
pub const DCONST_0: u8 = 0x0e;
/// The `dconst_1` opcode.
pub const DCONST_1: u8 = 0x0f;
/// The `bipush` opcode.
pub const BIPUSH: u8 = 0x10;
/// The `sipush` opcode.
pub const SIPUSH: u8 = 0x11;
/// The `ldc` opcode.
pub const LDC: u8 = 0x12;
/// The `ldc_w` opcode.
pub const LDC_W: u8 = 0x13;
/// The `ldc2_w` opcode.
pub const LDC2_W: u8 = 0x14;
/// The `iload` opcode.
pub const ILOAD: u8 = 0x15;
/// The `lload` opcode.
pub const LLOAD: u8 = 0x16;
/// The `fload` opcode.
pub const FLOAD: u8 = 0x17;
/// The `dload` opcode.
pub const DLOAD: u8 = 0x18;
/// The `aload` opcode.
pub const ALOAD: u8 = 0x19;
/// The `iload_0` opcode.
pub const ILOAD_0: u8 = 0x1a;
/// The `iload_1` opcode.
pub const ILOAD_1: u8 = 0x1b;
/// The `iload_2` opcode.
pub const ILOAD_2: u8 = 0x1c;
/// The `iload_3` opcode.
pub const ILOAD_3: u8 = 0x1d;
/// The `lload_0` opcode.
pub const LLOAD_0: u8 = 0x1e;
/// The `lload_1` opcode.
pub const LLOAD_1: u8 = 0x1f;
/// The `lload_2` opcode.
pub const LLOAD_2: u8 = 0x20;
/// The `lload_3` opcode.
pub const LLOAD_3: u8 = 0x21;
/// The `fload_0` opcode.
pub const FLOAD_0: u8 = 0x22;
/// The `fload_1` opcode.
pub const FLOAD_1: u8 = 0x23;
/// The `fload_2` opcode.
pub const FLOAD_2: u8 = 0x24;
/// The `fload_3` opcode.
pub const FLOAD_3: u8 = 0x25;
/// The `dload_0` opcode.
pub const DLOAD_0: u8 = 0x26;
/// The `dload_1` opcode.
pub const DLOAD_1: u8 = 0x27;
/// The `dload_2` opcode.
pub const DLOAD_2: u8 = 0x28;
/// The `dload_3` opcode.
pub const DLOAD_3: u8 = 0x29;
/// The `aload_0` opcode.
pub const ALOAD_0: u8 = 0x2a;
/// The `aload_1` opcode.
pub const ALOAD_1: u8 = 0x2b;
/// The `aload_2` opcode.
pub const ALOAD_2: u8 = 0x2c;
/// The `aload_3` opcode.
pub const ALOAD_3: u8 = 0x2d;
/// The `iaload` opcode.
pub const IALOAD: u8 = 0x2e;
/// The `laload` opcode.
pub const LALOAD: u8 = 0x2f;
/// The `faload` opcode.
pub const FALOAD: u8 = 0x30;
/// The `daload` opcode.
pub const DALOAD: u8 = 0x31;
/// The `aaload` opcode.
pub const AALOAD: u8 = 0x32;
/// The `baload` opcode.
pub const BALOAD: u8 = 0x33;
/// The `caload` opcode.
pub const CALOAD: u8 = 0x34;
/// The `saload` opcode.
pub const SALOAD: u8 = 0x35;
/// The `istore` opcode.
pub const ISTORE: u8 = 0x36;
/// The `lstore` opcode.
pub const LSTORE: u8 = 0x37;
/// The `fstore` opcode.
pub const FSTORE: u8 = 0x38;
/// The `dstore` opcode.
pub const DSTORE: u8 = 0x39;
/// The `astore` opcode.
pub const ASTORE: u8 = 0x3a;
/// The `istore_0` opcode.
pub const ISTORE_0: u8 = 0x3b;
/// The `istore_1` opcode.
pub const ISTORE_1: u8 = 0x3c;
/// The `istore_2` opcode.
pub const ISTORE_2: u8 = 0x3d;
/// The `istore_3` opcode.
pub const ISTORE_3: u8 = 0x3e;
/// The `lstore_0` opcode.
pub const LSTORE_0: u8 = 0x3f;
/// The `lstore_1` opcode.
pub const LSTORE_1: u8 = 0x40;
/// The `lstore_2` opcode.
pub const LSTORE_2: u8 = 0x41;
/// The `lstore_3` opcode.
pub const LSTORE_3: u8 = 0x42;
/// The `fstore_0` opcode.
pub const FSTORE_0: u8 = 0x43;
/// The `fstore_1` opcode.
pub const FSTORE_1: u8 = 0x44;
/// The `fstore_2` opcode.
pub const FSTORE_2: u8 = 0x45;
/// The `fstore_3` opcode.
pub const FSTORE_3: u8 = 0x46;
/// The `dstore_0` opcode.
pub const DSTORE_0: u8 = 0x47;
/// The `dstore_1` opcode.
pub const DSTORE_1: u8 = 0x48;
/// The `dstore_2` opcode.
pub const DSTORE_2: u8 = 0x49;
/// The `dstore_3` opcode.
pub const DSTORE_3: u8 = 0x4a;
/// The `astore_0` opcode.
pub const ASTORE_0: u8 = 0x4b;
/// The `astore_1` opcode.
pub const ASTORE_1: u8 = 0x4c;
/// The `astore_2` opcode.
pub const ASTORE_2: u8 = 0x4d;
/// The `astore_3` opcode.
pub const ASTORE_3: u8 = 0x4e;
/// The `iastore` opcode.
pub const IASTORE: u8 = 0x4f;
/// The `lastore` opcode.
pub const LASTORE: u8 = 0x50;
/// The `fastore` opcode.
pub const FASTORE: u8 = 0x51;
/// The `dastore` opcode.
pub const DASTORE: u8 = 0x52;
/// The `aastore` opcode.
pub const AASTORE: u8 = 0x53;
/// The `bastore` opcode.
pub const BASTORE: u8 = 0x54;
/// The `castore` opcode.
pub const CASTORE: u8 = 0x55;
/// The `sastore` opcode.
pub const SASTORE: u8 = 0x56;
/// The `pop` opcode.
pub const POP: u8 = 0x57;
/// The `pop2` opcode.
pub const POP2: u8 = 0x58;
/// The `dup` opcode.
pub const DUP: u8 = 0x59;
/// The `dup_x1` opcode.
pub const DUP_X1: u8 = 0x5a;
/// The `dup_x2` opcode.
pub const DUP_X2: u8 = 0x5b;
/// The `dup2` opcode.
pub const DUP2: u8 = 0x5c;
/// The `dup2_x1` opcode.
pub const DUP2_X1: u8 = 0x5d;
/// The `dup2_x2` opcode.
pub const DUP2_X2: u8 = 0x5e;
/// The `swap` opcode.
pub const SWAP: u8 = 0x5f;
/// The `iadd` opcode.
pub const IADD: u8 = 0x60;
/// The `ladd` opcode.
pub const LADD: u8 = 0x61;
/// The `fadd` opcode.
pub const FADD: u8 = 0x62;
/// The `dadd` opcode.
pub const DADD: u8 = 0x63;
/// The `isub` opcode.
pub const ISUB: u8 = 0x64;
/// The `lsub` opcode.
pub const LSUB: u8 = 0x65;
/// The `fsub` opcode.
pub const FSUB: u8 = 0x66;
/// The `dsub` opcode.
pub const DSUB: u8 = 0x67;
/// The `imul` opcode.
pub const IMUL: u8 = 0x68;
/// The `lmul` opcode.
pub const LMUL: u8 = 0x69;
/// The `fmul` opcode.
pub const FMUL: u8 = 0x6a;
/// The `dmul` opcode.
pub const DMUL: u8 = 0x6b;
/// The `idiv` opcode.
pub const IDIV: u8 = 0x6c;
/// The `ldiv` opcode.
pub const LDIV: u8 = 0x6d;
/// The `fdiv` opcode.
pub const FDIV: u8 = 0x6e;
/// The `ddiv` opcode.
pub const DDIV: u8 = 0x6f;
/// The `irem` opcode.
pub const IREM: u8 = 0x70;
/// The `lrem` opcode.
pub const LREM: u8 = 0x71;
/// The `frem` opcode.
pub const FREM: u8 = 0x72;
/// The `drem` opcode.
pub const DREM: u8 = 0x73;
/// The `ineg` opcode.
pub const INEG: u8 = 0x74;
/// The `lneg` opcode.
pub const LNEG: u8 = 0x75;
/// The `fneg` opcode.
pub const FNEG: u8 = 0x76;
/// The `dneg` opcode.
pub const DNEG: u8 = 0x77;
/// The `ishl` opcode.
pub const ISHL: u8 = 0x78;
/// The `lshl` opcode.
pub const LSHL: u8 = 0x79;
/// The `ishr` opcode.
pub const ISHR: u8 = 0x7a;
/// The `lshr` opcode.
pub const LSHR: u8 = 0x7b;
/// The `iushr` opcode.
pub const IUSHR: u8 = 0x7c;
/// The `lushr` opcode.
pub const LUSHR: u8 = 0x7d;
/// The `iand` opcode.
pub const IAND: u8 = 0x7e;
/// The `land` opcode.
pub const LAND: u8 = 0x7f;
/// The `ior` opcode.
pub const IOR: u8 = 0x80;
/// The `lor` opcode.
pub const LOR: u8 = 0x81;
/// The `ixor` opcode.
pub const IXOR: u8 = 0x82;
/// The `lxor` opcode.
pub const LXOR: u8 = 0x83;
/// The `iinc` opcode.
pub const IINC: u8 = 0x84;
/// The `i2l` opcode.
pub const I2L: u8 = 0x85;
/// The `i2f` opcode.
pub const I2F: u8 = 0x86;
/// The `i2d` opcode.
pub const I2D: u8 = 0x87;
/// The `l2i` opcode.
pub const L2I: u8 = 0x88;
/// The `l2f` opcode.
pub const L2F: u8 = 0x89;
/// The `l2d` opcode.
pub const L2D: u8 = 0x8a;
/// The `f2i` opcode.
pub const F2I: u8 = 0x8b;
/// The `f2l` opcode.
pub const F2L: u8 = 0x8c;
/// The `f2d` opcode.
pub const F2D: u8 = 0x8d;
/// The `d2i` opcode.
pub const D2I: u8 = 0x8e;
/// The `d2l` opcode.
pub const D2L: u8 = 0x8f;
/// The `d2f` opcode.
pub const D2F: u8 = 0x90;
/// The `i2b` opcode.
pub const I2B: u8 = 0x91;
/// The `i2c` opcode.
pub const I2C: u8 = 0x92;
/// The `i2s` opcode.
pub const I2S: u8 = 0x93;
/// The `lcmp` opcode.
pub const LCMP: u8 = 0x94;
/// The `fcmpl` opcode.
pub const FCMPL: u8 = 0x95;
/// The `fcmpg` opcode.
pub const FCMPG: u8 = 0x96;
/// The `dcmpl` opcode.
pub const DCMPL: u8 = 0x97;
/// The `dcmpg` opcode.
pub const DCMPG: u8 = 0x98;
/// The `ifeq` opcode.
pub const IFEQ: u8 = 0x99;
/// The `ifne` opcode.
pub const IFNE: u8 = 0x9a;
/// The `iflt` opcode.
pub const IFLT: u8 = 0x9b;
/// The `ifge` opcode.
pub const IFGE: u8 = 0x9c;
/// The `ifgt` opcode.
pub const IFGT: u8 = 0x9d;
/// The `ifle` opcode.
pub const IFLE: u8 = 0x9e;
/// The `if_icmpeq` opcode.
pub const IF_ICMPEQ: u8 = 0x9f;
/// The `if_icmpne` opcode.
pub const IF_ICMPNE: u8 = 0xa0;
/// The `if_icmplt` opcode.
pub const IF_ICMPLT: u8 = 0xa1;
/// The `if_icmpge` opcode.
pub const IF_ICMPGE: u8 = 0xa2;
/// The `if_icmpgt` opcode.
pub const IF_ICMPGT: u8 = 0xa3;
/// The `if_icmple` opcode.
pub const IF_ICMPLE: u8 = 0xa4;
/// The `if_acmpeq` opcode.
pub const IF_ACMPEQ: u8 = 0xa5;
/// The `if_acmpne` opcode.
pub const IF_ACMPNE: u8 = 0xa6;
/// The `goto` opcode.
pub const GOTO: u8 = 0xa7;
/// The `jsr` opcode.
pub const JSR: u8 = 0xa8;
/// The `ret` opcode.
pub const RET: u8 = 0xa9;
/// The `tableswitch` opcode.
pub const TABLESWITCH: u8 = 0xaa;
/// The `lookupswitch` opcode.
pub const LOOKUPSWITCH: u8 = 0xab;
/// The `ireturn` opcode.
pub const IRETURN: u8 = 0xac;
/// The `lreturn` opcode.
pub const LRETURN: u8 = 0xad;
/// The `freturn` opcode.
pub const FRETURN: u8 = 0xae;
/// The `dreturn` opcode.
pub const DRETURN: u8 = 0xaf;
/// The `areturn` opcode.
pub const ARETURN: u8 = 0xb0;
/// The `return` opcode.
pub const RETURN: u8 = 0xb1;
/// The `getstatic` opcode.
pub const GETSTATIC: u8 = 0xb2;
/// The `putstatic` opcode.
pub const PUTSTATIC: u8 = 0xb3;
/// The `getfield` opcode.
pub const GETFIELD: u8 = 0xb4;
/// The `putfield` opcode.
pub const PUTFIELD: u8 = 0xb5;
/// The `invokevirtual` opcode.
pub const INVOKEVIRTUAL: u8 = 0xb6;
/// The `invokespecial` opcode.
pub const INVOKESPECIAL: u8 = 0xb7;
/// The `invokestatic` opcode.
pub const INVOKESTATIC: u8 = 0xb8;
/// The `invokeinterface` opcode.
pub const INVOKEINTERFACE: u8 = 0xb9;
/// The `invokedynamic` opcode.
pub const INVOKEDYNAMIC: u8 = 0xba;
/// The `new` opcode.
pub const NEW: u8 = 0xbb;
/// The `newarray` opcode.
pub const NEWARRAY: u8 = 0xbc;
/// The `anewarray` opcode.
pub const ANEWARRAY: u8 = 0xbd;
/// The `arraylength` opcode.
pub const ARRAYLENGTH: u8 = 0xbe;
/// The `athrow` opcode.
pub const ATHROW: u8 = 0xbf;
/// The `checkcast` opcode.
pub const CHECKCAST: u8 = 0xc0;
/// The `instanceof` opcode.
pub const INSTANCEOF: u8 = 0xc1;
/// The `monitorenter` opcode.
pub const MONITORENTER: u8 = 0xc2;
/// The `monitorexit` opcode.
pub const MONITOREXIT: u8 = 0xc3;
/// The `wide` opcode.
pub const WIDE: u8 = 0xc4;
/// The `multianewarray` opcode.
pub const MULTIANEWARRAY: u8 = 0xc5;
/// The `ifnull` opcode.
pub const IFNULL: u8 = 0xc6;
/// The `ifnonnull` opcode.
pub const IFNONNULL: u8 = 0xc7;
/// The `goto_w` opcode.
pub const GOTO_W: u8 = 0xc8;
/// The `jsr_w` opcode.
pub const JSR_W: u8 = 0xc9;
