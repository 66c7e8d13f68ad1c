use std::fmt;

/// An exceptional halt of the interpreter (§4.7 step 3/6). `Reverted` is
/// distinguished from the rest: a revert preserves remaining gas and
/// output data and only discards state changes, while every other variant
/// here discards everything and zeroes the remaining gas.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    OutOfGas,
    BadJumpDestination { destination: usize },
    BadInstruction { instruction: u8 },
    StackUnderflow { instruction: &'static str, wanted: usize, on_stack: usize },
    OutOfStack { instruction: &'static str, wanted: usize },
    MutableCallInStaticContext,
    Reverted,
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfGas => write!(f, "Out of gas"),
            Error::BadJumpDestination { destination } => {
                write!(f, "Bad jump destination {:x}", destination)
            }
            Error::BadInstruction { instruction } => {
                write!(f, "Bad instruction {:x}", instruction)
            }
            Error::StackUnderflow { instruction, wanted, on_stack } => write!(
                f,
                "Stack underflow in {} - wanted {} but only {} on stack",
                instruction, wanted, on_stack
            ),
            Error::OutOfStack { instruction, wanted } => {
                write!(f, "Out of stack in {} - wanted {}", instruction, wanted)
            }
            Error::MutableCallInStaticContext => {
                write!(f, "Mutable call in static context")
            }
            Error::Reverted => write!(f, "Reverted"),
            Error::Internal(s) => write!(f, "Internal error: {}", s),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
