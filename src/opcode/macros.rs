//! This module contains useful macros for working with method code.

/// Constructs method code from a sequence of opcodes and encoded operands.
///
/// Each element may be anything implementing [`crate::opcode::code::Encode`]:
/// a single opcode byte, an array of operand bytes, or a vector of bytes.
///
/// # Usage
///
/// ```
/// use symbex_vm::{
///     bytecode,
///     opcode::code::{branch, ICONST_0, ICONST_1, IFEQ, ILOAD_0, IRETURN},
/// };
///
/// let code = bytecode![
///     ILOAD_0,
///     IFEQ, branch(5),
///     ICONST_1,
///     IRETURN,
///     ICONST_0,
///     IRETURN,
/// ];
///
/// assert_eq!(code, vec![0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]);
/// ```
#[macro_export]
macro_rules! bytecode {
    ($($item:expr),*$(,)?) => {{
        use $crate::opcode::code::Encode;
        let mut code: Vec<u8> = vec![];
        $($item.encode_into(&mut code);)*
        code
    }};
}

// Export it scoped
pub use bytecode;
