//! This module contains the instruction descriptors of the virtual machine and
//! the behaviour of every instruction in both execution modes.
//!
//! # Data-Driven Dispatch
//!
//! Every opcode is described by an immutable [`Instruction`] record: its
//! mnemonic, stack effect, operand layout, control-flow kind, the exception
//! classes it may raise, an [`Operation`] tag carrying the data that
//! distinguishes members of a family (such as the operator of an arithmetic
//! instruction), and a [`Behavior`] holding one function pointer per execution
//! mode. The records are collected into a flat [`InstructionSet`] indexed by
//! opcode, so dispatch is a table lookup and adding an instruction means
//! registering one more record.
//!
//! # Terminology
//!
//! When referring to operand stack items, depth 0 is the top of the stack.

pub mod arithmetic;
pub mod code;
pub mod control;
pub mod environment;
pub mod logic;
pub mod macros;
pub mod memory;
pub mod util;

use std::fmt::Debug;

use lazy_static::lazy_static;

use crate::{
    disassembly::Decoded,
    vm::{
        fault::Flow,
        value::{BinaryOp, Comparison, Conversion, Kind, Primitive, UnaryOp},
        ExecutionMode,
        VirtualMachine,
    },
};

/// The signature of the function that executes one decoded instruction.
pub type Execute = fn(&mut VirtualMachine, &Decoded) -> Flow;

/// The pair of behaviours of an instruction, one per execution mode.
#[derive(Clone, Copy)]
pub struct Behavior {
    /// The behaviour used when operands are concrete values.
    pub concrete: Execute,

    /// The behaviour used in symbolic mode, where operands may be terms.
    pub symbolic: Execute,
}

impl Behavior {
    /// Creates a behaviour that is the same in both modes.
    #[must_use]
    pub fn shared(execute: Execute) -> Self {
        Self {
            concrete: execute,
            symbolic: execute,
        }
    }

    /// Creates a behaviour with distinct concrete and symbolic functions.
    #[must_use]
    pub fn dual(concrete: Execute, symbolic: Execute) -> Self {
        Self { concrete, symbolic }
    }
}

impl Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior").finish_non_exhaustive()
    }
}

/// The type of an operand stack item as declared by an instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StackType {
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// Any single item, as moved by the stack manipulation instructions.
    Any,
}

impl StackType {
    /// Gets the stack type for values of `kind`.
    #[must_use]
    pub fn of(kind: Kind) -> Self {
        match kind {
            Kind::Int => StackType::Int,
            Kind::Long => StackType::Long,
            Kind::Float => StackType::Float,
            Kind::Double => StackType::Double,
        }
    }

    /// Gets the primitive kind of the stack type, if it has one.
    #[must_use]
    pub fn kind(self) -> Option<Kind> {
        match self {
            StackType::Int => Some(Kind::Int),
            StackType::Long => Some(Kind::Long),
            StackType::Float => Some(Kind::Float),
            StackType::Double => Some(Kind::Double),
            StackType::Reference | StackType::Any => None,
        }
    }
}

/// The number and types of operand stack items an instruction pops or pushes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    /// Exactly these items, deepest first.
    Exact(&'static [StackType]),

    /// A count that depends on the operands (such as for invocations) or on the
    /// categories of the items on the stack (such as for `pop2`).
    Unknown,
}

impl Arity {
    /// Gets the exact item count, if known.
    #[must_use]
    pub fn count(self) -> Option<usize> {
        match self {
            Arity::Exact(types) => Some(types.len()),
            Arity::Unknown => None,
        }
    }
}

/// How the bytes following an opcode are laid out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    None,
    /// A signed byte immediate.
    Immediate8,
    /// A signed 16-bit immediate.
    Immediate16,
    /// An unsigned byte local variable index.
    Local8,
    /// An unsigned byte constant pool index.
    Constant8,
    /// An unsigned 16-bit constant pool index.
    Constant16,
    /// A signed 16-bit branch offset.
    Branch16,
    /// A signed 32-bit branch offset.
    Branch32,
    /// A local index byte followed by a signed byte increment.
    Increment,
    /// An aligned jump table.
    TableSwitch,
    /// An aligned table of match-offset pairs.
    LookupSwitch,
    /// A constant pool index, an argument count and a zero byte.
    Interface,
    /// A constant pool index and a dimension count.
    MultiArray,
    /// The `wide` prefix, which widens the following instruction.
    Wide,
}

impl Layout {
    /// Gets the number of operand bytes of the layout, or [`None`] if the
    /// number depends on the position or content of the instruction.
    #[must_use]
    pub fn fixed_size(self) -> Option<u32> {
        match self {
            Layout::None => Some(0),
            Layout::Immediate8 | Layout::Local8 | Layout::Constant8 => Some(1),
            Layout::Immediate16 | Layout::Constant16 | Layout::Branch16 | Layout::Increment => {
                Some(2)
            }
            Layout::MultiArray => Some(3),
            Layout::Branch32 | Layout::Interface => Some(4),
            Layout::TableSwitch | Layout::LookupSwitch | Layout::Wide => None,
        }
    }
}

/// The control-flow behaviour of an instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JumpKind {
    /// Execution always continues with the next instruction.
    Never,
    /// Execution always continues at the branch target.
    Always,
    /// Execution continues at the target or the next instruction.
    Conditional,
    /// Execution may leave the instruction only by raising an exception.
    Exception,
    /// Execution continues at one of several targets.
    Switch,
    /// Execution enters another method.
    Invocation,
    /// Execution leaves the method.
    Return,
}

/// The element types of arrays, as far as the array instructions distinguish
/// them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// `byte` and `boolean` arrays share their instructions.
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    /// Gets the kind of the values this array kind holds on the stack.
    #[must_use]
    pub fn stack_kind(self) -> Option<Kind> {
        match self {
            ArrayKind::Int | ArrayKind::Byte | ArrayKind::Char | ArrayKind::Short => Some(Kind::Int),
            ArrayKind::Long => Some(Kind::Long),
            ArrayKind::Float => Some(Kind::Float),
            ArrayKind::Double => Some(Kind::Double),
            ArrayKind::Reference => None,
        }
    }

    /// Gets the conversion applied to values stored into this array kind.
    #[must_use]
    pub fn narrowing(self) -> Option<Conversion> {
        match self {
            ArrayKind::Byte => Some(Conversion::ToByte),
            ArrayKind::Char => Some(Conversion::ToChar),
            ArrayKind::Short => Some(Conversion::ToShort),
            _ => None,
        }
    }
}

/// What a conditional branch compares its operand against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Against {
    /// Compares an `int` with zero.
    Zero,
    /// Compares two `int`s.
    Operand,
    /// Compares a reference with `null`.
    Null,
    /// Compares two references.
    Reference,
}

/// The forms of the `dup` family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DupForm {
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
}

/// The kinds of method invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// The data that distinguishes the members of an instruction family.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    Nop,
    PushConstant(Primitive),
    PushNull,
    PushImmediate,
    LoadConstant,
    Load(StackType),
    Store(StackType),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop { slots: usize },
    Dup(DupForm),
    Swap,
    Binary(BinaryOp, Kind),
    Unary(UnaryOp, Kind),
    Increment,
    Convert(Kind, Conversion),
    Compare { kind: Kind, nan: i32 },
    If(Comparison, Against),
    Goto,
    TableSwitch,
    LookupSwitch,
    Return(Option<StackType>),
    GetStatic,
    PutStatic,
    GetField,
    PutField,
    Invoke(InvokeKind),
    New,
    NewArray,
    ANewArray,
    MultiANewArray,
    ArrayLength,
    Throw,
    CheckCast,
    InstanceOf,
    MonitorEnter,
    MonitorExit,
}

/// The immutable description of one opcode.
#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub opcode:    u8,
    pub mnemonic:  &'static str,
    pub pops:      Arity,
    pub pushes:    Arity,
    pub layout:    Layout,
    pub jump:      JumpKind,
    pub throws:    &'static [&'static str],
    pub operation: Operation,

    /// The local variable index encoded in the opcode itself (as for
    /// `iload_2`).
    pub implicit_local: Option<u16>,

    pub behavior: Behavior,
}

impl Instruction {
    /// Creates an instruction that pops and pushes nothing, has no operand
    /// bytes, never jumps, and raises nothing.
    #[must_use]
    pub fn new(opcode: u8, mnemonic: &'static str, operation: Operation, behavior: Behavior) -> Self {
        Self {
            opcode,
            mnemonic,
            pops: Arity::Exact(&[]),
            pushes: Arity::Exact(&[]),
            layout: Layout::None,
            jump: JumpKind::Never,
            throws: &[],
            operation,
            implicit_local: None,
            behavior,
        }
    }

    /// Sets the popped items.
    #[must_use]
    pub fn pops(mut self, pops: Arity) -> Self {
        self.pops = pops;
        self
    }

    /// Sets the pushed items.
    #[must_use]
    pub fn pushes(mut self, pushes: Arity) -> Self {
        self.pushes = pushes;
        self
    }

    /// Sets the operand layout.
    #[must_use]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the control-flow kind.
    #[must_use]
    pub fn jump(mut self, jump: JumpKind) -> Self {
        self.jump = jump;
        self
    }

    /// Sets the exception classes the instruction may raise.
    #[must_use]
    pub fn throws(mut self, throws: &'static [&'static str]) -> Self {
        self.throws = throws;
        self
    }

    /// Sets the local variable index encoded in the opcode.
    #[must_use]
    pub fn implicit_local(mut self, index: u16) -> Self {
        self.implicit_local = Some(index);
        self
    }

    /// Gets the behaviour of the instruction for the given `mode`.
    #[must_use]
    pub fn behavior_for(&self, mode: ExecutionMode) -> Execute {
        match mode {
            ExecutionMode::Concrete => self.behavior.concrete,
            ExecutionMode::Symbolic => self.behavior.symbolic,
        }
    }
}

/// A flat table of instructions indexed by opcode.
#[derive(Clone, Debug)]
pub struct InstructionSet {
    table: Vec<Option<Instruction>>,
}

impl InstructionSet {
    /// Creates a set that knows no instructions.
    #[must_use]
    pub fn empty() -> Self {
        let table = vec![None; 256];
        Self { table }
    }

    /// Creates the standard instruction set.
    #[must_use]
    pub fn standard() -> Self {
        let mut set = Self::empty();
        memory::register(&mut set);
        arithmetic::register(&mut set);
        logic::register(&mut set);
        control::register(&mut set);
        environment::register(&mut set);
        set
    }

    /// Adds `instruction` to the set, replacing any instruction with the same
    /// opcode.
    pub fn register(&mut self, instruction: Instruction) {
        self.table[instruction.opcode as usize] = Some(instruction);
    }

    /// Gets the instruction for `opcode`.
    #[must_use]
    pub fn get(&self, opcode: u8) -> Option<&Instruction> {
        self.table[opcode as usize].as_ref()
    }

    /// Iterates over the registered instructions in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.table.iter().flatten()
    }
}

lazy_static! {
    /// The standard instruction set, built once on first use.
    pub static ref STANDARD: InstructionSet = InstructionSet::standard();
}

#[cfg(test)]
mod test {
    use crate::opcode::{code, Arity, JumpKind, Layout, StackType, STANDARD};

    #[test]
    fn standard_set_covers_the_supported_opcodes() {
        for opcode in 0x00..=0xc9_u8 {
            let unsupported = [code::JSR, code::RET, code::JSR_W, code::INVOKEDYNAMIC];
            assert_eq!(
                STANDARD.get(opcode).is_some(),
                !unsupported.contains(&opcode),
                "opcode {opcode:#04x}"
            );
        }
        assert!(STANDARD.get(0xca).is_none());
    }

    #[test]
    fn records_describe_their_opcode() {
        for instruction in STANDARD.iter() {
            assert_eq!(STANDARD.get(instruction.opcode).map(|i| i.opcode), Some(instruction.opcode));
        }
        let iadd = STANDARD.get(code::IADD).expect("iadd is registered");
        assert_eq!(iadd.mnemonic, "iadd");
        assert_eq!(iadd.pops, Arity::Exact(&[StackType::Int, StackType::Int]));
        assert_eq!(iadd.pushes.count(), Some(1));

        let goto = STANDARD.get(code::GOTO).expect("goto is registered");
        assert_eq!(goto.jump, JumpKind::Always);
        assert_eq!(goto.layout, Layout::Branch16);
    }

    #[test]
    fn division_declares_its_exception() {
        let idiv = STANDARD.get(code::IDIV).expect("idiv is registered");
        assert_eq!(idiv.throws, &["java/lang/ArithmeticException"]);
    }
}
