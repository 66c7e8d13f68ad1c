use std::ops::Deref;
use std::sync::Arc;

/// The last call/create's return data, as observed by `RETURNDATASIZE` /
/// `RETURNDATACOPY` (Byzantium). Cheaply clonable so it can be threaded
/// through nested call frames without copying the bytes.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ReturnData(Arc<Vec<u8>>);

impl ReturnData {
    pub fn empty() -> Self {
        ReturnData(Arc::new(Vec::new()))
    }

    pub fn new(data: Vec<u8>) -> Self {
        ReturnData(Arc::new(data))
    }
}

impl Deref for ReturnData {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ReturnData {
    fn from(data: Vec<u8>) -> Self {
        ReturnData::new(data)
    }
}
