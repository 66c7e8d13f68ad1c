/// How a sub-call was invoked; controls whose storage/balance/`msg.sender`
/// the callee observes (§4.9 System opcodes).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CallType {
    /// Not a sub-call: the top-level transaction, or a `CREATE`/`CREATE2`.
    None,
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}
