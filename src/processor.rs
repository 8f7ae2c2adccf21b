use std::borrow::Cow;
use std::{error, fmt};

use log::*;

use crate::io::{Input, Sink};
use crate::memory::{Byte, Int, Memory, OutOfRange};

pub mod operand;

pub use operand::{Operand, OperandError, Register};

/// Status flags, recomputed after every result-bearing instruction and left
/// alone by pure data movement (`MOV`, `LOAD`, `STORE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags {
    /// Result lies strictly between 0 and 255.
    pub of: bool,
    /// Result is negative.
    pub uf: bool,
    /// Result exceeds 255.
    pub cf: bool,
    /// Result is zero.
    pub zf: bool,
}

impl Flags {
    /// Derives all four flags from a result. The overflow predicate is the
    /// half-open `0 < result < 255` this machine has always used.
    pub fn from_result(result: Int) -> Self {
        Self {
            of: result > 0 && result < 255,
            uf: result < 0,
            cf: result > 255,
            zf: result == 0,
        }
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.of as u8, self.uf as u8, self.cf as u8, self.zf as u8
        )
    }
}

macro_rules! mnemonics {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $text:literal , )+ ) => {
        /// The recognized instruction set
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Mnemonic {
            $(
                $( #[doc = $doc] )+
                $name,
            )+
        }

        impl Mnemonic {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => $text , )+
                }
            }

            /// Resolves a mnemonic token against the instruction set.
            pub fn parse(token: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|mnemonic| token == mnemonic.name())
            }
        }

        impl ::std::fmt::Display for Mnemonic {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    }
}

mnemonics! {
    /// Copy register to register, literal to register, or register to memory
    Mov = "MOV",
    /// Add the two operands
    Add = "ADD",
    /// Subtract operand 2 from operand 1
    Sub = "SUB",
    /// Multiply the two operands
    Mul = "MUL",
    /// Divide operand 1 by operand 2
    Div = "DIV",
    /// Add one to a register
    Inc = "INC",
    /// Subtract one from a register
    Dec = "DEC",
    /// Read a value from the input collaborator into a register
    In = "IN",
    /// Report a register's value outward
    Out = "OUT",
    /// Load a memory cell into a register
    Load = "LOAD",
    /// Store a register into a memory cell
    Store = "STORE",
    /// Shift the 8-bit value left, folding wrapped and carry bits back in
    Shl = "SHL",
    /// Shift the 8-bit value right
    Shr = "SHR",
    /// Shift the 8-bit value left
    Rol = "ROL",
    /// Rotate the 8-bit value right
    Ror = "ROR",
}

/// A non-fatal per-line fault. Reported to the sink; the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The mnemonic is not part of the instruction set.
    UnknownInstruction { mnemonic: String },
    /// An operand token could not be parsed.
    BadOperand {
        mnemonic: Mnemonic,
        source: OperandError,
    },
    /// A well-formed operand in a position its mode is not valid for.
    InvalidOperand { mnemonic: Mnemonic, operand: String },
    /// An operand pair no rule of the instruction covers.
    InvalidOperands {
        mnemonic: Mnemonic,
        op1: String,
        op2: String,
    },
    /// Division by zero; the instruction is abandoned.
    DivisionByZero,
    /// A memory access outside the address space.
    Memory(OutOfRange),
    /// The input collaborator failed to produce a value.
    Input { reason: String },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownInstruction { mnemonic } => {
                write!(f, "invalid instruction: {}", mnemonic)
            }
            Fault::BadOperand { mnemonic, source } => write!(f, "{}: {}", mnemonic, source),
            Fault::InvalidOperand { mnemonic, operand } => {
                write!(f, "invalid operand for {}: {}", mnemonic, operand)
            }
            Fault::InvalidOperands { mnemonic, op1, op2 } => {
                write!(f, "invalid operands for {}: {}, {}", mnemonic, op1, op2)
            }
            Fault::DivisionByZero => f.write_str("division by zero"),
            Fault::Memory(source) => source.fmt(f),
            Fault::Input { reason } => write!(f, "input unavailable: {}", reason),
        }
    }
}

impl error::Error for Fault {}

impl From<OutOfRange> for Fault {
    fn from(source: OutOfRange) -> Self {
        Self::Memory(source)
    }
}

/// The architectural state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Processor {
    /// Register file R0-R6
    pub r: [Int; Register::COUNT],
    /// Program counter; counts processed lines
    pub pc: u32,
    /// Flags of the most recent result-bearing instruction
    pub flags: Flags,
}

impl Processor {
    pub fn reg(&self, register: Register) -> Int {
        self.r[register.index()]
    }

    pub fn set_reg(&mut self, register: Register, value: Int) {
        self.r[register.index()] = value;
    }

    /// Processes one program line: decode, execute, advance, snapshot.
    ///
    /// Faults are reported through the sink and never abort the run. The
    /// program counter advances for every line, valid or not, and a state
    /// snapshot follows each one.
    pub fn step<const S: usize, C>(&mut self, line: &str, memory: &mut Memory<S>, console: &mut C)
    where
        C: Input + Sink,
    {
        if let Err(fault) = self.execute_line(line, memory, console) {
            warn!("{}", fault);
            console.note(&fault.to_string());
        }
        self.pc += 1;
        console.snapshot(&Snapshot::new(self, memory));
    }

    /// Runs every line of a program text in order.
    pub fn run<const S: usize, C>(&mut self, program: &str, memory: &mut Memory<S>, console: &mut C)
    where
        C: Input + Sink,
    {
        for line in program.lines() {
            self.step(line, memory, console);
        }
    }

    fn execute_line<const S: usize, C>(
        &mut self,
        line: &str,
        memory: &mut Memory<S>,
        console: &mut C,
    ) -> Result<(), Fault>
    where
        C: Input + Sink,
    {
        let mut tokens = line.split_whitespace();
        let mnemonic_token = match tokens.next() {
            Some(token) => token,
            // Blank line; the counter still advances.
            None => return Ok(()),
        };
        let mnemonic = Mnemonic::parse(mnemonic_token).ok_or_else(|| Fault::UnknownInstruction {
            mnemonic: mnemonic_token.to_string(),
        })?;
        let op1 = tokens.next().unwrap_or("");
        let op2 = promote_bare_immediate(mnemonic, tokens.next().unwrap_or(""));

        debug!("{} {} {}", mnemonic, op1, op2);

        match mnemonic {
            Mnemonic::Mov => self.mov(op1, &op2, memory, console),
            Mnemonic::Add | Mnemonic::Sub | Mnemonic::Mul | Mnemonic::Div => {
                self.arithmetic(mnemonic, op1, &op2, memory, console)
            }
            Mnemonic::Inc | Mnemonic::Dec => self.increment_decrement(mnemonic, op1, console),
            Mnemonic::In => self.input(op1, console),
            Mnemonic::Out => self.output(op1, console),
            Mnemonic::Load | Mnemonic::Store => self.load_store(mnemonic, op1, &op2, memory, console),
            Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Rol | Mnemonic::Ror => {
                self.shift_rotate(mnemonic, op1, &op2, memory, console)
            }
        }
    }

    fn resolve(mnemonic: Mnemonic, token: &str) -> Result<Operand, Fault> {
        Operand::parse(token).map_err(|source| Fault::BadOperand { mnemonic, source })
    }

    /// Value of an already-resolved operand. Bare memory indices are only
    /// meaningful to `LOAD`/`STORE`, which never read through here.
    fn value_of<const S: usize>(
        &self,
        mnemonic: Mnemonic,
        token: &str,
        operand: Operand,
        memory: &Memory<S>,
    ) -> Result<Int, Fault> {
        match operand {
            Operand::Register(register) => Ok(self.reg(register)),
            Operand::Immediate(value) => Ok(value),
            Operand::Indirect(pointer) => Ok(memory.read(self.reg(pointer))?),
            Operand::MemIndex(_) => Err(Fault::InvalidOperand {
                mnemonic,
                operand: token.to_string(),
            }),
        }
    }

    fn read<const S: usize>(
        &self,
        mnemonic: Mnemonic,
        token: &str,
        memory: &Memory<S>,
    ) -> Result<Int, Fault> {
        let operand = Self::resolve(mnemonic, token)?;
        self.value_of(mnemonic, token, operand, memory)
    }

    fn register_operand(mnemonic: Mnemonic, token: &str) -> Result<Register, Fault> {
        match Self::resolve(mnemonic, token)? {
            Operand::Register(register) => Ok(register),
            _ => Err(Fault::InvalidOperand {
                mnemonic,
                operand: token.to_string(),
            }),
        }
    }

    /// `MOV`: operand 1 is the source, operand 2 the destination, except the
    /// bracketed form where operand 1 names the memory destination.
    fn mov<const S: usize, C: Sink>(
        &mut self,
        op1: &str,
        op2: &str,
        memory: &mut Memory<S>,
        console: &mut C,
    ) -> Result<(), Fault> {
        let src = Self::resolve(Mnemonic::Mov, op1)?;
        let dst = Self::resolve(Mnemonic::Mov, op2)?;
        match (src, dst) {
            (Operand::Register(source), Operand::Register(target)) => {
                let value = self.reg(source);
                self.set_reg(target, value);
                console.note(&format!(
                    "Copied value {} from register {} to register {}",
                    value, source, target
                ));
            }
            (Operand::MemIndex(value), Operand::Register(target))
            | (Operand::Immediate(value), Operand::Register(target)) => {
                self.set_reg(target, value);
                console.note(&format!("Stored value {} to register {}", value, target));
            }
            (Operand::Indirect(pointer), Operand::Register(source)) => {
                let address = self.reg(pointer);
                let value = self.reg(source);
                memory.write(address, value)?;
                console.note(&format!(
                    "Copied value {} from register {} to memory location {}",
                    value, source, address
                ));
            }
            _ => {
                return Err(Fault::InvalidOperands {
                    mnemonic: Mnemonic::Mov,
                    op1: op1.to_string(),
                    op2: op2.to_string(),
                })
            }
        }
        Ok(())
    }

    /// `ADD`/`SUB`/`MUL`/`DIV`: the result lands back in operand 1 when it is
    /// a register; flags are recomputed either way.
    fn arithmetic<const S: usize, C: Sink>(
        &mut self,
        mnemonic: Mnemonic,
        op1: &str,
        op2: &str,
        memory: &mut Memory<S>,
        console: &mut C,
    ) -> Result<(), Fault> {
        let lhs = Self::resolve(mnemonic, op1)?;
        let a = self.value_of(mnemonic, op1, lhs, memory)?;
        let b = self.read(mnemonic, op2, memory)?;
        let result = match mnemonic {
            Mnemonic::Add => a.wrapping_add(b),
            Mnemonic::Sub => a.wrapping_sub(b),
            Mnemonic::Mul => a.wrapping_mul(b),
            Mnemonic::Div => {
                if b == 0 {
                    return Err(Fault::DivisionByZero);
                }
                a.wrapping_div(b)
            }
            _ => unreachable!("routed by the dispatch match"),
        };
        self.flags = Flags::from_result(result);
        if let Operand::Register(target) = lhs {
            self.set_reg(target, result);
        }
        console.note(&format!("Result after {}: {}", mnemonic, result));
        Ok(())
    }

    fn increment_decrement<C: Sink>(
        &mut self,
        mnemonic: Mnemonic,
        op1: &str,
        console: &mut C,
    ) -> Result<(), Fault> {
        let register = Self::register_operand(mnemonic, op1)?;
        let delta = if mnemonic == Mnemonic::Inc { 1 } else { -1 };
        let result = self.reg(register).wrapping_add(delta);
        self.flags = Flags::from_result(result);
        self.set_reg(register, result);
        console.note(&format!("Register {} now holds {}", register, result));
        Ok(())
    }

    /// `IN`: blocks on the input collaborator, stores, flags on the value.
    fn input<C: Input + Sink>(&mut self, op1: &str, console: &mut C) -> Result<(), Fault> {
        let register = Self::register_operand(Mnemonic::In, op1)?;
        let value = console.read_value().map_err(|err| Fault::Input {
            reason: err.to_string(),
        })?;
        self.set_reg(register, value);
        self.flags = Flags::from_result(value);
        console.note(&format!(
            "Entered value {} stored in register {}",
            value, register
        ));
        Ok(())
    }

    /// `OUT`: reports the register's value; flags on the value read.
    fn output<C: Sink>(&mut self, op1: &str, console: &mut C) -> Result<(), Fault> {
        let register = Self::register_operand(Mnemonic::Out, op1)?;
        let value = self.reg(register);
        console.note(&format!("Value in register {}: {}", register, value));
        self.flags = Flags::from_result(value);
        Ok(())
    }

    /// `LOAD`/`STORE`: register on one side, a direct memory index on the
    /// other. Flags stay untouched.
    fn load_store<const S: usize, C: Sink>(
        &mut self,
        mnemonic: Mnemonic,
        op1: &str,
        op2: &str,
        memory: &mut Memory<S>,
        console: &mut C,
    ) -> Result<(), Fault> {
        let invalid = || Fault::InvalidOperands {
            mnemonic,
            op1: op1.to_string(),
            op2: op2.to_string(),
        };
        let register = match Self::resolve(mnemonic, op1)? {
            Operand::Register(register) => register,
            _ => return Err(invalid()),
        };
        let index = match Self::resolve(mnemonic, op2)? {
            Operand::MemIndex(index) => index,
            _ => return Err(invalid()),
        };
        if mnemonic == Mnemonic::Load {
            let value = memory.read(index)?;
            self.set_reg(register, value);
            console.note(&format!(
                "Loaded value {} from memory location {} into register {}",
                value, index, register
            ));
        } else {
            let value = self.reg(register);
            memory.write(index, value)?;
            console.note(&format!(
                "Stored value {} from register {} into memory location {}",
                value, register, index
            ));
        }
        Ok(())
    }

    /// `SHL`/`SHR`/`ROL`/`ROR`: an 8-bit operation on the truncated source.
    /// The result is written back only when operand 1 is a register; a memory
    /// or immediate source still produces flags and a report.
    fn shift_rotate<const S: usize, C: Sink>(
        &mut self,
        mnemonic: Mnemonic,
        op1: &str,
        op2: &str,
        memory: &mut Memory<S>,
        console: &mut C,
    ) -> Result<(), Fault> {
        let source = Self::resolve(mnemonic, op1)?;
        let amount = self.read(mnemonic, op2, memory)?;
        let value = self.value_of(mnemonic, op1, source, memory)? as Byte;
        console.note(&format!("Binary before {}: {:08b}", mnemonic, value));
        let result = eight_bit_op(mnemonic, value, amount);
        console.note(&format!("Binary after {}: {:08b}", mnemonic, result));
        console.note(&format!("Decimal after {}: {}", mnemonic, result));
        self.flags = Flags::from_result(result as Int);
        if let Operand::Register(target) = source {
            self.set_reg(target, result as Int);
        }
        Ok(())
    }
}

/// A state snapshot handed to the display collaborator after every line
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub registers: &'a [Int; Register::COUNT],
    pub flags: Flags,
    pub pc: u32,
    pub memory: &'a [Int],
}

impl<'a> Snapshot<'a> {
    pub fn new<const S: usize>(processor: &'a Processor, memory: &'a Memory<S>) -> Self {
        Self {
            registers: &processor.r,
            flags: processor.flags,
            pc: processor.pc,
            memory: &memory.data,
        }
    }
}

impl fmt::Display for Snapshot<'_> {
    /// Registers zero-padded to width 2, flags in OF UF CF ZF order, then the
    /// program counter and the memory dump eight cells per row.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registers: ")?;
        for value in self.registers.iter() {
            write!(f, "{:02} ", value)?;
        }
        writeln!(f, "#")?;
        writeln!(f, "Flags: {}#", self.flags)?;
        writeln!(f, "PC: {}", self.pc)?;
        writeln!(f, "Memory:")?;
        for (i, value) in self.memory.iter().enumerate() {
            write!(f, "{:02} ", value)?;
            if (i + 1) % 8 == 0 {
                writeln!(f)?;
            }
        }
        write!(f, "#")
    }
}

/// Rewrites a bare-digit operand 2 into an immediate. `LOAD` and `STORE` are
/// exempt: their operand 2 stays a direct memory index.
fn promote_bare_immediate(mnemonic: Mnemonic, token: &str) -> Cow<'_, str> {
    let exempt = matches!(mnemonic, Mnemonic::Load | Mnemonic::Store);
    if !exempt && token.starts_with(|c: char| c.is_ascii_digit()) {
        Cow::Owned(format!("#{}", token))
    } else {
        Cow::Borrowed(token)
    }
}

/// The machine's historical 8-bit shift/rotate formulas, kept bit-for-bit:
/// `ROL` is a plain left shift, `SHL` folds the wrapped bits and a carry term
/// back in, `SHR` and `ROR` behave conventionally. Shift amounts the formulas
/// leave undefined (negative, zero for the carry term, eight or more for the
/// wrap terms) contribute zero bits.
fn eight_bit_op(mnemonic: Mnemonic, value: Byte, amount: Int) -> Byte {
    let v = value as u32;
    let n = amount as i64;
    let wide = match mnemonic {
        Mnemonic::Rol => shl(v, n),
        Mnemonic::Shr => shr(v, n),
        Mnemonic::Shl => shl(v, n) | shr(v, 8 - n) | shl(v, n - 1),
        Mnemonic::Ror => (shr(v, n) | shl(v, 8 - n)) & 0xFF,
        _ => unreachable!("routed by the dispatch match"),
    };
    wide as Byte
}

fn shl(value: u32, amount: i64) -> u32 {
    if amount < 0 {
        return 0;
    }
    value.checked_shl(amount as u32).unwrap_or(0)
}

fn shr(value: u32, amount: i64) -> u32 {
    if amount < 0 {
        return 0;
    }
    value.checked_shr(amount as u32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ScriptedConsole;
    use crate::memory::StdMem;
    use color_eyre::eyre::Result;

    fn run_lines(lines: &[&str]) -> (Processor, StdMem, ScriptedConsole) {
        run_lines_with(lines, ScriptedConsole::default())
    }

    fn run_lines_with(
        lines: &[&str],
        mut console: ScriptedConsole,
    ) -> (Processor, StdMem, ScriptedConsole) {
        let mut cpu = Processor::default();
        let mut mem = StdMem::default();
        for line in lines {
            cpu.step(line, &mut mem, &mut console);
        }
        (cpu, mem, console)
    }

    #[test]
    fn test_mov_register_to_register() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 7 R0", "MOV R0 R1"]);

        assert_eq!(cpu.reg(Register::R0), 7);
        assert_eq!(cpu.reg(Register::R1), 7);
        assert_eq!(cpu.flags, Flags::default());

        Ok(())
    }

    #[test]
    fn test_mov_literal_to_register() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 5 R0"]);

        assert_eq!(cpu.reg(Register::R0), 5);
        assert_eq!(cpu.flags, Flags::default());

        Ok(())
    }

    #[test]
    fn test_mov_register_into_indirect_memory() -> Result<()> {
        let (_, mem, _) = run_lines(&["MOV 3 R1", "MOV 9 R2", "MOV [R1] R2"]);

        assert_eq!(mem.data[3], 9);

        Ok(())
    }

    #[test]
    fn test_mov_invalid_combination() -> Result<()> {
        let (cpu, mem, console) = run_lines(&["MOV R0 [R1]"]);

        assert_eq!(cpu.r, [0; 7]);
        assert_eq!(mem, StdMem::default());
        assert!(console.notes[0].contains("invalid operands for MOV"));

        Ok(())
    }

    #[test]
    fn test_mov_indirect_out_of_range_address() -> Result<()> {
        let (_, mem, console) = run_lines(&["MOV 99 R1", "MOV [R1] R2"]);

        assert_eq!(mem, StdMem::default());
        assert!(console.notes.iter().any(|n| n.contains("no address `99`")));

        Ok(())
    }

    #[test]
    fn test_add_immediate() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 5 R0", "ADD R0 3"]);

        assert_eq!(cpu.reg(Register::R0), 8);
        assert_eq!(cpu.flags, Flags::from_result(8));
        assert!(cpu.flags.of);
        assert!(!cpu.flags.uf);
        assert!(!cpu.flags.cf);
        assert!(!cpu.flags.zf);

        Ok(())
    }

    #[test]
    fn test_sub_to_zero_sets_zero_flag() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 3 R0", "SUB R0 3"]);

        assert_eq!(cpu.reg(Register::R0), 0);
        assert!(cpu.flags.zf);
        assert!(!cpu.flags.of);

        Ok(())
    }

    #[test]
    fn test_sub_below_zero_sets_underflow_flag() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 2 R0", "SUB R0 5"]);

        assert_eq!(cpu.reg(Register::R0), -3);
        assert!(cpu.flags.uf);
        assert!(!cpu.flags.zf);

        Ok(())
    }

    #[test]
    fn test_add_past_255_sets_carry_flag() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 200 R0", "ADD R0 100"]);

        assert_eq!(cpu.reg(Register::R0), 300);
        assert!(cpu.flags.cf);
        assert!(!cpu.flags.of);

        Ok(())
    }

    #[test]
    fn test_mul_with_register_operand() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 6 R0", "MOV 7 R1", "MUL R0 R1"]);

        assert_eq!(cpu.reg(Register::R0), 42);
        assert_eq!(cpu.reg(Register::R1), 7);
        assert!(cpu.flags.of);

        Ok(())
    }

    #[test]
    fn test_div_truncates() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 9 R0", "DIV R0 2"]);

        assert_eq!(cpu.reg(Register::R0), 4);

        Ok(())
    }

    #[test]
    fn test_div_by_zero_leaves_state_alone() -> Result<()> {
        let (cpu, _, console) = run_lines(&["MOV 8 R0", "ADD R0 0", "DIV R0 0"]);

        // register and the flags of the previous ADD both survive
        assert_eq!(cpu.reg(Register::R0), 8);
        assert_eq!(cpu.flags, Flags::from_result(8));
        assert!(console.notes.iter().any(|n| n.contains("division by zero")));

        Ok(())
    }

    #[test]
    fn test_arithmetic_without_register_destination() -> Result<()> {
        let (cpu, _, console) = run_lines(&["ADD #5 3"]);

        assert_eq!(cpu.r, [0; 7]);
        assert_eq!(cpu.flags, Flags::from_result(8));
        assert!(console.notes[0].contains("Result after ADD: 8"));

        Ok(())
    }

    #[test]
    fn test_arithmetic_reads_indirect_memory() -> Result<()> {
        let (cpu, _, _) = run_lines(&[
            "MOV 4 R1",   // value to store
            "MOV 2 R2",   // address
            "MOV [R2] R1",
            "MOV 10 R0",
            "ADD R0 [R2]",
        ]);

        assert_eq!(cpu.reg(Register::R0), 14);

        Ok(())
    }

    #[test]
    fn test_inc() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 41 R3", "INC R3"]);

        assert_eq!(cpu.reg(Register::R3), 42);
        assert_eq!(cpu.flags, Flags::from_result(42));

        Ok(())
    }

    #[test]
    fn test_dec_below_zero() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 0 R1", "DEC R1"]);

        assert_eq!(cpu.reg(Register::R1), -1);
        assert!(cpu.flags.uf);
        assert!(!cpu.flags.zf);
        assert!(!cpu.flags.of);
        assert!(!cpu.flags.cf);

        Ok(())
    }

    #[test]
    fn test_inc_rejects_memory_operand() -> Result<()> {
        let (cpu, mem, console) = run_lines(&["INC [R0]"]);

        assert_eq!(cpu.r, [0; 7]);
        assert_eq!(mem, StdMem::default());
        assert!(console.notes[0].contains("invalid operand for INC"));

        Ok(())
    }

    #[test]
    fn test_in_stores_value_and_flags() -> Result<()> {
        let console = ScriptedConsole::with_values(&[42]);
        let (cpu, _, _) = run_lines_with(&["IN R3"], console);

        assert_eq!(cpu.reg(Register::R3), 42);
        assert_eq!(cpu.flags, Flags::from_result(42));

        Ok(())
    }

    #[test]
    fn test_in_without_value_is_a_fault() -> Result<()> {
        let (cpu, _, console) = run_lines(&["IN R3"]);

        assert_eq!(cpu.reg(Register::R3), 0);
        assert_eq!(cpu.flags, Flags::default());
        assert!(console.notes[0].contains("input unavailable"));

        Ok(())
    }

    #[test]
    fn test_out_reports_and_updates_flags() -> Result<()> {
        let (cpu, _, console) = run_lines(&["OUT R2"]);

        assert!(console.notes[0].contains("Value in register R2: 0"));
        // flags follow the value read out, zero here
        assert!(cpu.flags.zf);

        Ok(())
    }

    #[test]
    fn test_load_store_roundtrip_is_idempotent() -> Result<()> {
        let (cpu, mem, _) = run_lines(&[
            "MOV 7 R0",
            "STORE R0 5",
            "ADD R0 0", // give the flags a known value
            "LOAD R0 5",
            "STORE R0 5",
        ]);

        assert_eq!(mem.data[5], 7);
        assert_eq!(cpu.reg(Register::R0), 7);
        // LOAD and STORE never touch the flags
        assert_eq!(cpu.flags, Flags::from_result(7));

        Ok(())
    }

    #[test]
    fn test_load_out_of_range_index() -> Result<()> {
        let (cpu, _, console) = run_lines(&["LOAD R0 99"]);

        assert_eq!(cpu.r, [0; 7]);
        assert!(console.notes[0].contains("no address `99`"));

        Ok(())
    }

    #[test]
    fn test_load_rejects_immediate_index() -> Result<()> {
        let (cpu, _, console) = run_lines(&["LOAD R0 #5"]);

        assert_eq!(cpu.r, [0; 7]);
        assert!(console.notes[0].contains("invalid operands for LOAD"));

        Ok(())
    }

    #[test]
    fn test_store_keeps_bare_index_unpromoted() -> Result<()> {
        // operand 2 of STORE must stay a memory index, not become #10
        let (_, mem, _) = run_lines(&["MOV 3 R0", "STORE R0 10"]);

        assert_eq!(mem.data[10], 3);

        Ok(())
    }

    #[test]
    fn test_unknown_mnemonic_reports_and_advances() -> Result<()> {
        let (cpu, mem, console) = run_lines(&["FOO R0 R1"]);

        assert_eq!(cpu.pc, 1);
        assert_eq!(cpu.r, [0; 7]);
        assert_eq!(cpu.flags, Flags::default());
        assert_eq!(mem, StdMem::default());
        assert!(console.notes[0].contains("invalid instruction: FOO"));

        Ok(())
    }

    #[test]
    fn test_pc_counts_every_line() -> Result<()> {
        let (cpu, _, console) = run_lines(&["FOO R0 R1", "", "MOV 1 R0"]);

        assert_eq!(cpu.pc, 3);
        assert_eq!(console.snapshots.len(), 3);
        // the blank line is not reported as invalid
        assert_eq!(console.notes.len(), 2);

        Ok(())
    }

    #[test]
    fn test_rol_is_a_plain_left_shift() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 65 R0", "ROL R0 2"]);

        // 0100_0001 << 2 truncates to 0000_0100
        assert_eq!(cpu.reg(Register::R0), 4);

        Ok(())
    }

    #[test]
    fn test_shr() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 65 R0", "SHR R0 1"]);

        assert_eq!(cpu.reg(Register::R0), 32);

        Ok(())
    }

    #[test]
    fn test_shl_folds_carry_back_in() -> Result<()> {
        let (cpu, _, console) = run_lines(&["MOV 65 R0", "SHL R0 1"]);

        // (65 << 1 | 65 >> 7) | 65 << 0 = 1000_0010 | 0100_0001
        assert_eq!(cpu.reg(Register::R0), 195);
        assert!(console.notes.iter().any(|n| n.contains("01000001")));
        assert!(console.notes.iter().any(|n| n.contains("11000011")));
        assert!(console
            .notes
            .iter()
            .any(|n| n.contains("Decimal after SHL: 195")));

        Ok(())
    }

    #[test]
    fn test_ror_rotates() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 65 R0", "ROR R0 1"]);

        // 0100_0001 rotated right once is 1010_0000
        assert_eq!(cpu.reg(Register::R0), 160);
        assert_eq!(cpu.flags, Flags::from_result(160));

        Ok(())
    }

    #[test]
    fn test_shift_amount_zero() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 65 R0", "SHL R0 0"]);

        assert_eq!(cpu.reg(Register::R0), 65);

        Ok(())
    }

    #[test]
    fn test_shift_truncates_source_to_eight_bits() -> Result<()> {
        let (cpu, _, _) = run_lines(&["MOV 321 R0", "SHR R0 0"]);

        // 321 mod 256 = 65
        assert_eq!(cpu.reg(Register::R0), 65);

        Ok(())
    }

    #[test]
    fn test_shift_memory_source_is_not_written_back() -> Result<()> {
        let (cpu, mem, _) = run_lines(&[
            "MOV 1 R1",
            "MOV 0 R2",
            "MOV [R2] R1", // memory[0] = 1
            "SHL [R2] 1",
        ]);

        assert_eq!(mem.data[0], 1);
        assert_eq!(cpu.reg(Register::R1), 1);
        // (1 << 1 | 1 >> 7) | 1 << 0 = 3; only the flags carry the result
        assert_eq!(cpu.flags, Flags::from_result(3));

        Ok(())
    }

    #[test]
    fn test_snapshot_format() -> Result<()> {
        let mut cpu = Processor::default();
        cpu.r = [0, 1, 2, 3, 4, 5, 6];
        cpu.pc = 9;
        cpu.flags = Flags::from_result(8);
        let mut mem = StdMem::default();
        mem.data[0] = 12;
        mem.data[63] = -3;

        let expected = "Registers: 00 01 02 03 04 05 06 #\n\
                        Flags: 1 0 0 0#\n\
                        PC: 9\n\
                        Memory:\n\
                        12 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 00 \n\
                        00 00 00 00 00 00 00 -3 \n\
                        #";
        assert_eq!(Snapshot::new(&cpu, &mem).to_string(), expected);

        Ok(())
    }

    #[test]
    fn test_program_stream_runs_to_completion() -> Result<()> {
        let program = "MOV 5 R0\nADD R0 3\nSTORE R0 10\nFOO\nOUT R0\n";
        let mut cpu = Processor::default();
        let mut mem = StdMem::default();
        let mut console = ScriptedConsole::default();

        cpu.run(program, &mut mem, &mut console);

        assert_eq!(cpu.pc, 5);
        assert_eq!(cpu.reg(Register::R0), 8);
        assert_eq!(mem.data[10], 8);
        assert_eq!(console.snapshots.len(), 5);
        assert!(console
            .notes
            .iter()
            .any(|n| n.contains("invalid instruction: FOO")));

        Ok(())
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(Mnemonic::parse("MOV"), Some(Mnemonic::Mov));
        assert_eq!(Mnemonic::parse("ROR"), Some(Mnemonic::Ror));
        assert_eq!(Mnemonic::parse("mov"), None);
        assert_eq!(Mnemonic::parse("HALT"), None);
    }
}
