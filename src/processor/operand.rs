//! The operand grammar: one token, one addressing mode.

use std::convert::TryFrom;
use std::{error, fmt};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::memory::Int;

/// One of the seven architectural registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
}

impl Register {
    /// Size of the register file.
    pub const COUNT: usize = 7;

    /// Maps an ASCII digit to its register, if one goes by that number.
    pub fn from_digit(c: char) -> Option<Self> {
        let digit = c.to_digit(10)?;
        u8::try_from(digit).ok().and_then(|d| Self::try_from(d).ok())
    }

    /// Position in the register file.
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", u8::from(*self))
    }
}

/// A parsed operand token.
///
/// The mode is decided by the token's shape alone; whether a given mode is
/// acceptable in a given position is up to each instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// `R3`: the register itself.
    Register(Register),
    /// `#12`: a literal embedded in the instruction text.
    Immediate(Int),
    /// `[R3]`: the register's contents name a memory address.
    Indirect(Register),
    /// `12`: a bare decimal, a direct memory index to `LOAD`/`STORE`.
    MemIndex(Int),
}

impl Operand {
    /// Parses one operand token. Mode precedence: register, immediate,
    /// register-indirect, bare memory index.
    pub fn parse(token: &str) -> Result<Self, OperandError> {
        if token.is_empty() {
            return Err(OperandError::new(OperandErrorKind::Missing, token));
        }
        if let Some(rest) = token.strip_prefix('R') {
            return single_register_digit(rest)
                .map(Self::Register)
                .ok_or_else(|| OperandError::new(OperandErrorKind::BadRegister, token));
        }
        if let Some(digits) = token.strip_prefix('#') {
            return decimal(digits)
                .map(Self::Immediate)
                .ok_or_else(|| OperandError::new(OperandErrorKind::BadNumber, token));
        }
        if token.starts_with('[') {
            return token
                .strip_prefix("[R")
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(single_register_digit)
                .map(Self::Indirect)
                .ok_or_else(|| OperandError::new(OperandErrorKind::BadRegister, token));
        }
        if token.starts_with(|c: char| c.is_ascii_digit()) {
            return decimal(token)
                .map(Self::MemIndex)
                .ok_or_else(|| OperandError::new(OperandErrorKind::BadNumber, token));
        }
        Err(OperandError::new(OperandErrorKind::UnknownMode, token))
    }
}

/// Exactly one digit naming a register.
fn single_register_digit(rest: &str) -> Option<Register> {
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Register::from_digit(c),
        _ => None,
    }
}

/// Unsigned decimal digits only; signs, radix prefixes and values past the
/// machine word are rejected.
fn decimal(digits: &str) -> Option<Int> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandErrorKind {
    /// The instruction needs an operand that was not supplied.
    Missing,
    /// No register R0-R6 goes by this name.
    BadRegister,
    /// The digits do not form a representable number.
    BadNumber,
    /// The token matches no addressing mode.
    UnknownMode,
}

/// A rejected operand token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandError {
    pub kind: OperandErrorKind,
    pub token: String,
}

impl OperandError {
    fn new(kind: OperandErrorKind, token: &str) -> Self {
        Self {
            kind,
            token: token.to_string(),
        }
    }
}

impl fmt::Display for OperandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperandErrorKind::Missing => f.write_str("missing operand"),
            OperandErrorKind::BadRegister => {
                write!(f, "`{}` names no register", self.token)
            }
            OperandErrorKind::BadNumber => {
                write!(f, "`{}` holds no representable number", self.token)
            }
            OperandErrorKind::UnknownMode => {
                write!(f, "`{}` matches no addressing mode", self.token)
            }
        }
    }
}

impl error::Error for OperandError {}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_tokens_never_panic(token in "\\PC*") {
            let _ = Operand::parse(&token);
        }

        #[test]
        fn register_tokens_round_trip(n in 0u8..7) {
            let register = Register::try_from(n).unwrap();
            prop_assert_eq!(
                Operand::parse(&register.to_string()),
                Ok(Operand::Register(register))
            );
        }

        #[test]
        fn immediate_tokens_keep_their_value(value in 0i32..1_000_000) {
            prop_assert_eq!(
                Operand::parse(&format!("#{}", value)),
                Ok(Operand::Immediate(value))
            );
        }
    }
}
