// src/ir/opcode.rs
//! The closed opcode set of the IR, with the classification tables that
//! drive analyses and passes (terminators, volatility, output arity,
//! commutativity).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Sdiv,
    Mod,
    Smod,
    Exp,
    Addmod,
    Mulmod,
    // bitwise
    And,
    Or,
    Xor,
    Not,
    Shr,
    Shl,
    Sar,
    Signextend,
    // comparison
    Lt,
    Gt,
    Slt,
    Sgt,
    Eq,
    Iszero,
    // hashing
    Sha3,
    Sha3_64,
    // memory
    Mload,
    Mstore,
    Mcopy,
    Calldatacopy,
    Codecopy,
    Returndatacopy,
    Extcodecopy,
    // storage
    Sload,
    Sstore,
    // transient storage
    Tload,
    Tstore,
    // immutables
    Iload,
    Istore,
    // control flow
    Jmp,
    Jnz,
    Djmp,
    Ret,
    Return,
    Revert,
    Stop,
    Exit,
    // calls
    Call,
    Staticcall,
    Delegatecall,
    Create,
    Create2,
    Invoke,
    // data segment reads
    Dload,
    Dloadbytes,
    // environment
    Calldatasize,
    Calldataload,
    Callvalue,
    Caller,
    Address,
    Origin,
    Codesize,
    Gas,
    Gasprice,
    Gaslimit,
    Chainid,
    Basefee,
    Timestamp,
    Blockhash,
    Coinbase,
    Number,
    Balance,
    Extcodesize,
    Extcodehash,
    Returndatasize,
    Selfbalance,
    // pseudo instructions
    Phi,
    Param,
    Nop,
    Store,
    Alloca,
    Log0,
    Log1,
    Log2,
    Log3,
    Log4,
    Selfdestruct,
    Assert,
    Invalid,
    AssertUnreachable,
    Deploy,
    // data segment directives
    Db,
    Dbname,
}

impl Opcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Sdiv => "sdiv",
            Opcode::Mod => "mod",
            Opcode::Smod => "smod",
            Opcode::Exp => "exp",
            Opcode::Addmod => "addmod",
            Opcode::Mulmod => "mulmod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Shr => "shr",
            Opcode::Shl => "shl",
            Opcode::Sar => "sar",
            Opcode::Signextend => "signextend",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Slt => "slt",
            Opcode::Sgt => "sgt",
            Opcode::Eq => "eq",
            Opcode::Iszero => "iszero",
            Opcode::Sha3 => "sha3",
            Opcode::Sha3_64 => "sha3_64",
            Opcode::Mload => "mload",
            Opcode::Mstore => "mstore",
            Opcode::Mcopy => "mcopy",
            Opcode::Calldatacopy => "calldatacopy",
            Opcode::Codecopy => "codecopy",
            Opcode::Returndatacopy => "returndatacopy",
            Opcode::Extcodecopy => "extcodecopy",
            Opcode::Sload => "sload",
            Opcode::Sstore => "sstore",
            Opcode::Tload => "tload",
            Opcode::Tstore => "tstore",
            Opcode::Iload => "iload",
            Opcode::Istore => "istore",
            Opcode::Jmp => "jmp",
            Opcode::Jnz => "jnz",
            Opcode::Djmp => "djmp",
            Opcode::Ret => "ret",
            Opcode::Return => "return",
            Opcode::Revert => "revert",
            Opcode::Stop => "stop",
            Opcode::Exit => "exit",
            Opcode::Call => "call",
            Opcode::Staticcall => "staticcall",
            Opcode::Delegatecall => "delegatecall",
            Opcode::Create => "create",
            Opcode::Create2 => "create2",
            Opcode::Invoke => "invoke",
            Opcode::Dload => "dload",
            Opcode::Dloadbytes => "dloadbytes",
            Opcode::Calldatasize => "calldatasize",
            Opcode::Calldataload => "calldataload",
            Opcode::Callvalue => "callvalue",
            Opcode::Caller => "caller",
            Opcode::Address => "address",
            Opcode::Origin => "origin",
            Opcode::Codesize => "codesize",
            Opcode::Gas => "gas",
            Opcode::Gasprice => "gasprice",
            Opcode::Gaslimit => "gaslimit",
            Opcode::Chainid => "chainid",
            Opcode::Basefee => "basefee",
            Opcode::Timestamp => "timestamp",
            Opcode::Blockhash => "blockhash",
            Opcode::Coinbase => "coinbase",
            Opcode::Number => "number",
            Opcode::Balance => "balance",
            Opcode::Extcodesize => "extcodesize",
            Opcode::Extcodehash => "extcodehash",
            Opcode::Returndatasize => "returndatasize",
            Opcode::Selfbalance => "selfbalance",
            Opcode::Phi => "phi",
            Opcode::Param => "param",
            Opcode::Nop => "nop",
            Opcode::Store => "store",
            Opcode::Alloca => "alloca",
            Opcode::Log0 => "log0",
            Opcode::Log1 => "log1",
            Opcode::Log2 => "log2",
            Opcode::Log3 => "log3",
            Opcode::Log4 => "log4",
            Opcode::Selfdestruct => "selfdestruct",
            Opcode::Assert => "assert",
            Opcode::Invalid => "invalid",
            Opcode::AssertUnreachable => "assert_unreachable",
            Opcode::Deploy => "deploy",
            Opcode::Db => "db",
            Opcode::Dbname => "dbname",
        }
    }

    /// Opcodes that may end a basic block.
    pub fn is_bb_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Djmp
                | Opcode::Jnz
                | Opcode::Ret
                | Opcode::Return
                | Opcode::Revert
                | Opcode::Stop
                | Opcode::Exit
        )
    }

    /// Opcodes whose label operands define CFG edges.
    pub fn is_cfg_altering(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Djmp | Opcode::Jnz)
    }

    /// Opcodes that never produce an output variable.
    pub fn has_output(self) -> bool {
        !matches!(
            self,
            Opcode::Mstore
                | Opcode::Sstore
                | Opcode::Istore
                | Opcode::Tstore
                | Opcode::Dloadbytes
                | Opcode::Calldatacopy
                | Opcode::Mcopy
                | Opcode::Returndatacopy
                | Opcode::Codecopy
                | Opcode::Extcodecopy
                | Opcode::Return
                | Opcode::Ret
                | Opcode::Revert
                | Opcode::Assert
                | Opcode::AssertUnreachable
                | Opcode::Selfdestruct
                | Opcode::Stop
                | Opcode::Invalid
                | Opcode::Invoke
                | Opcode::Jmp
                | Opcode::Djmp
                | Opcode::Jnz
                | Opcode::Log0
                | Opcode::Log1
                | Opcode::Log2
                | Opcode::Log3
                | Opcode::Log4
                | Opcode::Exit
                | Opcode::Nop
                | Opcode::Deploy
                | Opcode::Db
                | Opcode::Dbname
        )
    }

    /// Opcodes with observable effects: writes to memory or storage, control
    /// flow, external calls, logs, asserts and traps. Volatile instructions
    /// are never removed as dead and fence instruction reordering. Reads are
    /// deliberately not volatile: every write bumps the fence, so a read can
    /// never cross a write during scheduling.
    pub fn is_volatile(self) -> bool {
        !self.has_output()
            || matches!(
                self,
                Opcode::Param
                    | Opcode::Call
                    | Opcode::Staticcall
                    | Opcode::Delegatecall
                    | Opcode::Create
                    | Opcode::Create2
            )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Mul | Opcode::Or | Opcode::Xor | Opcode::And | Opcode::Eq
        )
    }

    pub fn is_comparator(self) -> bool {
        matches!(self, Opcode::Gt | Opcode::Lt | Opcode::Sgt | Opcode::Slt)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let opcode = match s {
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "div" => Opcode::Div,
            "sdiv" => Opcode::Sdiv,
            "mod" => Opcode::Mod,
            "smod" => Opcode::Smod,
            "exp" => Opcode::Exp,
            "addmod" => Opcode::Addmod,
            "mulmod" => Opcode::Mulmod,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "xor" => Opcode::Xor,
            "not" => Opcode::Not,
            "shr" => Opcode::Shr,
            "shl" => Opcode::Shl,
            "sar" => Opcode::Sar,
            "signextend" => Opcode::Signextend,
            "lt" => Opcode::Lt,
            "gt" => Opcode::Gt,
            "slt" => Opcode::Slt,
            "sgt" => Opcode::Sgt,
            "eq" => Opcode::Eq,
            "iszero" => Opcode::Iszero,
            "sha3" => Opcode::Sha3,
            "sha3_64" => Opcode::Sha3_64,
            "mload" => Opcode::Mload,
            "mstore" => Opcode::Mstore,
            "mcopy" => Opcode::Mcopy,
            "calldatacopy" => Opcode::Calldatacopy,
            "codecopy" => Opcode::Codecopy,
            "returndatacopy" => Opcode::Returndatacopy,
            "extcodecopy" => Opcode::Extcodecopy,
            "sload" => Opcode::Sload,
            "sstore" => Opcode::Sstore,
            "tload" => Opcode::Tload,
            "tstore" => Opcode::Tstore,
            "iload" => Opcode::Iload,
            "istore" => Opcode::Istore,
            "jmp" => Opcode::Jmp,
            "jnz" => Opcode::Jnz,
            "djmp" => Opcode::Djmp,
            "ret" => Opcode::Ret,
            "return" => Opcode::Return,
            "revert" => Opcode::Revert,
            "stop" => Opcode::Stop,
            "exit" => Opcode::Exit,
            "call" => Opcode::Call,
            "staticcall" => Opcode::Staticcall,
            "delegatecall" => Opcode::Delegatecall,
            "create" => Opcode::Create,
            "create2" => Opcode::Create2,
            "invoke" => Opcode::Invoke,
            "dload" => Opcode::Dload,
            "dloadbytes" => Opcode::Dloadbytes,
            "calldatasize" => Opcode::Calldatasize,
            "calldataload" => Opcode::Calldataload,
            "callvalue" => Opcode::Callvalue,
            "caller" => Opcode::Caller,
            "address" => Opcode::Address,
            "origin" => Opcode::Origin,
            "codesize" => Opcode::Codesize,
            "gas" => Opcode::Gas,
            "gasprice" => Opcode::Gasprice,
            "gaslimit" => Opcode::Gaslimit,
            "chainid" => Opcode::Chainid,
            "basefee" => Opcode::Basefee,
            "timestamp" => Opcode::Timestamp,
            "blockhash" => Opcode::Blockhash,
            "coinbase" => Opcode::Coinbase,
            "number" => Opcode::Number,
            "balance" => Opcode::Balance,
            "extcodesize" => Opcode::Extcodesize,
            "extcodehash" => Opcode::Extcodehash,
            "returndatasize" => Opcode::Returndatasize,
            "selfbalance" => Opcode::Selfbalance,
            "phi" => Opcode::Phi,
            "param" => Opcode::Param,
            "nop" => Opcode::Nop,
            "store" => Opcode::Store,
            "alloca" => Opcode::Alloca,
            "log0" => Opcode::Log0,
            "log1" => Opcode::Log1,
            "log2" => Opcode::Log2,
            "log3" => Opcode::Log3,
            "log4" => Opcode::Log4,
            "selfdestruct" => Opcode::Selfdestruct,
            "assert" => Opcode::Assert,
            "invalid" => Opcode::Invalid,
            "assert_unreachable" => Opcode::AssertUnreachable,
            "deploy" => Opcode::Deploy,
            "db" => Opcode::Db,
            "dbname" => Opcode::Dbname,
            _ => return Err(()),
        };
        Ok(opcode)
    }
}
