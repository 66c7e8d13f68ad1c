//! The opcode-dispatch loop (§4.7): given a code buffer, call data and an
//! `Ext` bound to the current frame, execute until `STOP`/`RETURN`/
//! `REVERT`/`SELFDESTRUCT`, an implicit `STOP` past the end of the code,
//! or an exceptional halt.

mod gasometer;
mod memory;
mod stack;

use self::memory::{words_for, Memory};
use self::stack::Stack;
use crate::instructions::{self, instruction_info};
use bit_set::BitSet;
use ethereum_types::{Address, H256, U256, U512};
use vm::{
    ActionParams, CallResult, CallType, CreateContractAddress, CreateResult, Error, Ext,
    ReturnData, Result, Schedule,
};

/// How execution ended.
#[derive(Debug)]
pub enum Outcome {
    Normal { gas_left: U256, data: ReturnData },
    Reverted { gas_left: U256, data: ReturnData },
}

/// Precompute which code offsets are a `JUMPDEST` a `JUMP`/`JUMPI` may
/// legally target — a byte inside `PUSHn`'s immediate data never counts,
/// even if its value happens to equal `0x5b`.
fn valid_jump_destinations(code: &[u8]) -> BitSet {
    let mut set = BitSet::with_capacity(code.len());
    let mut i = 0;
    while i < code.len() {
        let op = code[i];
        if op == instructions::JUMPDEST {
            set.insert(i);
        }
        i += 1 + instructions::push_bytes(op);
    }
    set
}

fn validate_jump(jump_dests: &BitSet, code_len: usize, dest: usize) -> Result<usize> {
    if dest >= code_len || !jump_dests.contains(dest) {
        return Err(Error::BadJumpDestination { destination: dest });
    }
    Ok(dest)
}

fn to_usize(v: U256) -> Result<usize> {
    if v > U256::from(u32::MAX) {
        // No real call ever needs this much memory/length; treat it the
        // same as running out of gas rather than overflowing `usize`.
        return Err(Error::OutOfGas);
    }
    Ok(v.as_u32() as usize)
}

fn u256_to_bytes(v: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    buf
}

fn u256_of_hash(h: H256) -> U256 {
    U256::from_big_endian(h.as_bytes())
}

fn address_to_word(addr: Address) -> U256 {
    U256::from_big_endian(addr.as_bytes())
}

fn word_to_address(v: U256) -> Address {
    Address::from_slice(&u256_to_bytes(v)[12..])
}

fn read_padded_slice(data: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < data.len() {
        let copy = len.min(data.len() - offset);
        out[..copy].copy_from_slice(&data[offset..offset + copy]);
    }
    out
}

fn read_padded_word(data: &[u8], offset: usize) -> U256 {
    U256::from_big_endian(&read_padded_slice(data, offset, 32))
}

fn is_negative(v: U256) -> bool {
    v.bit(255)
}

fn negate(v: U256) -> U256 {
    (!v).overflowing_add(U256::one()).0
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

fn signed_lt(a: U256, b: U256) -> bool {
    let (an, bn) = (is_negative(a), is_negative(b));
    if an != bn {
        an
    } else {
        a < b
    }
}

fn signed_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let min = U256::one() << 255;
    if a == min && b == U256::max_value() {
        return min;
    }
    let (a_neg, a_mag) = if is_negative(a) { (true, negate(a)) } else { (false, a) };
    let (b_neg, b_mag) = if is_negative(b) { (true, negate(b)) } else { (false, b) };
    let result = a_mag / b_mag;
    if a_neg != b_neg {
        negate(result)
    } else {
        result
    }
}

fn signed_mod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let (a_neg, a_mag) = if is_negative(a) { (true, negate(a)) } else { (false, a) };
    let b_mag = if is_negative(b) { negate(b) } else { b };
    let result = a_mag % b_mag;
    if a_neg {
        negate(result)
    } else {
        result
    }
}

fn addmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    let sum = U512::from(a) + U512::from(b);
    U256::from(sum % U512::from(m))
}

fn mulmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    let prod = U512::from(a) * U512::from(b);
    U256::from(prod % U512::from(m))
}

fn pow(mut base: U256, mut exp: U256) -> U256 {
    let mut result = U256::one();
    while !exp.is_zero() {
        if exp.bit(0) {
            result = result.overflowing_mul(base).0;
        }
        base = base.overflowing_mul(base).0;
        exp >>= 1;
    }
    result
}

fn sign_extend(byte_num: U256, value: U256) -> U256 {
    if byte_num >= U256::from(32) {
        return value;
    }
    let idx = 31 - byte_num.as_usize();
    let mut bytes = u256_to_bytes(value);
    let fill = if bytes[idx] & 0x80 != 0 { 0xffu8 } else { 0x00u8 };
    for b in bytes.iter_mut().take(idx) {
        *b = fill;
    }
    U256::from_big_endian(&bytes)
}

fn byte_of(i: U256, x: U256) -> U256 {
    if i >= U256::from(32) {
        return U256::zero();
    }
    U256::from(u256_to_bytes(x)[i.as_usize()])
}

fn arithmetic_shift_right(value: U256, shift: U256) -> U256 {
    if is_negative(value) {
        if shift >= U256::from(256) {
            U256::max_value()
        } else {
            let s = shift.as_usize();
            (value >> s) | (!(U256::max_value() >> s))
        }
    } else if shift >= U256::from(256) {
        U256::zero()
    } else {
        value >> shift.as_usize()
    }
}

fn is_state_changing(op: u8) -> bool {
    op == instructions::SSTORE
        || instructions::is_log(op)
        || op == instructions::CREATE
        || op == instructions::CREATE2
        || op == instructions::SELFDESTRUCT
}

/// Flat, schedule-driven cost for opcodes whose price doesn't depend on
/// their operands or on memory growth. Dynamic-cost opcodes (`SHA3`,
/// `*COPY`, `LOGn`, `SSTORE`, `CALL*`, `SELFDESTRUCT`) return `0` here and
/// are charged inline once their operands are known.
fn base_tier_cost(op: u8, schedule: &Schedule) -> u64 {
    use instructions::*;
    match op {
        STOP | RETURN | REVERT => 0,
        JUMPDEST => 1,
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | POP | PC | MSIZE | GAS
        | RETURNDATASIZE => 2,
        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE
        | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | SHL | SHR | SAR
        | CALLDATACOPY | CODECOPY | RETURNDATACOPY => 3,
        op if is_push(op) || is_dup(op) || is_swap(op) => 3,
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND => 5,
        ADDMOD | MULMOD | JUMP => 8,
        JUMPI => 10,
        BALANCE => schedule.balance_gas as u64,
        EXTCODESIZE => schedule.extcodesize_gas as u64,
        EXTCODECOPY => schedule.extcodecopy_base_gas as u64,
        EXTCODEHASH => schedule.extcodehash_gas as u64,
        SLOAD => schedule.sload_gas as u64,
        CREATE | CREATE2 => schedule.create_gas as u64,
        CALL | CALLCODE | DELEGATECALL | STATICCALL => schedule.call_gas as u64,
        _ => 0,
    }
}

fn charge(gas: &mut U256, cost: u64) -> Result<()> {
    let cost = U256::from(cost);
    if *gas < cost {
        return Err(Error::OutOfGas);
    }
    *gas -= cost;
    Ok(())
}

fn touch_memory(
    schedule: &Schedule,
    gas: &mut U256,
    memory: &mut Memory,
    offset: usize,
    len: usize,
    extra: u64,
) -> Result<()> {
    let old = memory.words();
    let new = old.max(words_for(offset, len));
    let cost = gasometer::mem_expansion_cost(old, new, schedule) + extra;
    charge(gas, cost)?;
    memory.expand_to_words(new);
    Ok(())
}

pub struct Interpreter<'a> {
    ext: &'a mut dyn Ext,
    schedule: Schedule,
    params: ActionParams,
    code: std::sync::Arc<Vec<u8>>,
    jump_dests: BitSet,
}

impl<'a> Interpreter<'a> {
    pub fn new(ext: &'a mut dyn Ext, params: ActionParams) -> Self {
        let schedule = *ext.schedule();
        let code = params.code.clone().unwrap_or_else(|| std::sync::Arc::new(Vec::new()));
        let jump_dests = valid_jump_destinations(&code);
        Interpreter { ext, schedule, params, code, jump_dests }
    }

    pub fn run(&mut self, mut gas: U256) -> Result<Outcome> {
        let mut stack = Stack::new();
        let mut memory = Memory::new();
        let mut pc: usize = 0;
        let data = self.params.data.clone().unwrap_or_default();
        let schedule = self.schedule;
        let mut last_return_data = ReturnData::empty();

        loop {
            let op = if pc < self.code.len() { self.code[pc] } else { instructions::STOP };

            let info = match instruction_info(op) {
                Some(i) => i,
                None => return Err(Error::BadInstruction { instruction: op }),
            };

            if stack.len() < info.args {
                return Err(Error::StackUnderflow { instruction: info.name, wanted: info.args, on_stack: stack.len() });
            }
            let stack_after = stack.len() - info.args + info.ret;
            if stack_after > vm::STACK_DEPTH_LIMIT {
                return Err(Error::OutOfStack { instruction: info.name, wanted: info.ret });
            }
            if self.ext.is_static() && is_state_changing(op) {
                return Err(Error::MutableCallInStaticContext);
            }

            charge(&mut gas, base_tier_cost(op, &schedule))?;

            let mut next_pc = pc + 1 + instructions::push_bytes(op);

            match op {
                instructions::STOP => return Ok(Outcome::Normal { gas_left: gas, data: ReturnData::empty() }),

                instructions::ADD => { let a = stack.pop(); let b = stack.pop(); stack.push(a.overflowing_add(b).0); }
                instructions::MUL => { let a = stack.pop(); let b = stack.pop(); stack.push(a.overflowing_mul(b).0); }
                instructions::SUB => { let a = stack.pop(); let b = stack.pop(); stack.push(a.overflowing_sub(b).0); }
                instructions::DIV => {
                    let a = stack.pop();
                    let b = stack.pop();
                    stack.push(if b.is_zero() { U256::zero() } else { a / b });
                }
                instructions::SDIV => { let a = stack.pop(); let b = stack.pop(); stack.push(signed_div(a, b)); }
                instructions::MOD => {
                    let a = stack.pop();
                    let b = stack.pop();
                    stack.push(if b.is_zero() { U256::zero() } else { a % b });
                }
                instructions::SMOD => { let a = stack.pop(); let b = stack.pop(); stack.push(signed_mod(a, b)); }
                instructions::ADDMOD => {
                    let a = stack.pop();
                    let b = stack.pop();
                    let m = stack.pop();
                    stack.push(addmod(a, b, m));
                }
                instructions::MULMOD => {
                    let a = stack.pop();
                    let b = stack.pop();
                    let m = stack.pop();
                    stack.push(mulmod(a, b, m));
                }
                instructions::EXP => {
                    let base = stack.pop();
                    let exp = stack.pop();
                    charge(&mut gas, gasometer::exp_cost(&schedule, exp))?;
                    stack.push(pow(base, exp));
                }
                instructions::SIGNEXTEND => {
                    let byte_num = stack.pop();
                    let value = stack.pop();
                    stack.push(sign_extend(byte_num, value));
                }
                instructions::LT => { let a = stack.pop(); let b = stack.pop(); stack.push(bool_word(a < b)); }
                instructions::GT => { let a = stack.pop(); let b = stack.pop(); stack.push(bool_word(a > b)); }
                instructions::SLT => { let a = stack.pop(); let b = stack.pop(); stack.push(bool_word(signed_lt(a, b))); }
                instructions::SGT => { let a = stack.pop(); let b = stack.pop(); stack.push(bool_word(signed_lt(b, a))); }
                instructions::EQ => { let a = stack.pop(); let b = stack.pop(); stack.push(bool_word(a == b)); }
                instructions::ISZERO => { let a = stack.pop(); stack.push(bool_word(a.is_zero())); }
                instructions::AND => { let a = stack.pop(); let b = stack.pop(); stack.push(a & b); }
                instructions::OR => { let a = stack.pop(); let b = stack.pop(); stack.push(a | b); }
                instructions::XOR => { let a = stack.pop(); let b = stack.pop(); stack.push(a ^ b); }
                instructions::NOT => { let a = stack.pop(); stack.push(!a); }
                instructions::BYTE => { let i = stack.pop(); let x = stack.pop(); stack.push(byte_of(i, x)); }
                instructions::SHL => {
                    let shift = stack.pop();
                    let value = stack.pop();
                    stack.push(if shift >= U256::from(256) { U256::zero() } else { value << shift.as_usize() });
                }
                instructions::SHR => {
                    let shift = stack.pop();
                    let value = stack.pop();
                    stack.push(if shift >= U256::from(256) { U256::zero() } else { value >> shift.as_usize() });
                }
                instructions::SAR => {
                    let shift = stack.pop();
                    let value = stack.pop();
                    stack.push(arithmetic_shift_right(value, shift));
                }

                instructions::SHA3 => {
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, offset, len, gasometer::sha3_cost(&schedule, len))?;
                    let bytes = memory.read(offset, len);
                    stack.push(U256::from(keccak_hash::keccak(&bytes).as_bytes()));
                }

                instructions::ADDRESS => stack.push(address_to_word(self.params.address)),
                instructions::BALANCE => {
                    let addr = word_to_address(stack.pop());
                    stack.push(self.ext.balance(&addr)?);
                }
                instructions::ORIGIN => stack.push(address_to_word(self.params.origin)),
                instructions::CALLER => stack.push(address_to_word(self.params.sender)),
                instructions::CALLVALUE => stack.push(self.params.value.value()),
                instructions::CALLDATALOAD => {
                    let offset = to_usize(stack.pop())?;
                    stack.push(read_padded_word(&data, offset));
                }
                instructions::CALLDATASIZE => stack.push(U256::from(data.len())),
                instructions::CALLDATACOPY => {
                    let dest = to_usize(stack.pop())?;
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, dest, len, gasometer::copy_cost(&schedule, len))?;
                    memory.write_slice(dest, &read_padded_slice(&data, offset, len));
                }
                instructions::CODESIZE => stack.push(U256::from(self.code.len())),
                instructions::CODECOPY => {
                    let dest = to_usize(stack.pop())?;
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, dest, len, gasometer::copy_cost(&schedule, len))?;
                    let code = self.code.clone();
                    memory.write_slice(dest, &read_padded_slice(&code, offset, len));
                }
                instructions::GASPRICE => stack.push(self.params.gas_price),
                instructions::EXTCODESIZE => {
                    let addr = word_to_address(stack.pop());
                    stack.push(U256::from(self.ext.extcodesize(&addr)?.unwrap_or(0)));
                }
                instructions::EXTCODECOPY => {
                    let addr = word_to_address(stack.pop());
                    let dest = to_usize(stack.pop())?;
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, dest, len, gasometer::copy_cost(&schedule, len))?;
                    let code = self.ext.extcode(&addr)?.map(|c| (*c).clone()).unwrap_or_default();
                    memory.write_slice(dest, &read_padded_slice(&code, offset, len));
                }
                instructions::RETURNDATASIZE => stack.push(U256::from(last_return_data.len())),
                instructions::RETURNDATACOPY => {
                    let dest = to_usize(stack.pop())?;
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, dest, len, gasometer::copy_cost(&schedule, len))?;
                    let rd = last_return_data.to_vec();
                    memory.write_slice(dest, &read_padded_slice(&rd, offset, len));
                }
                instructions::EXTCODEHASH => {
                    let addr = word_to_address(stack.pop());
                    stack.push(self.ext.extcodehash(&addr)?.map(u256_of_hash).unwrap_or_default());
                }

                instructions::BLOCKHASH => {
                    let number = stack.pop();
                    stack.push(u256_of_hash(self.ext.blockhash(&number)));
                }
                instructions::COINBASE => stack.push(address_to_word(self.ext.env_info().author)),
                instructions::TIMESTAMP => stack.push(U256::from(self.ext.env_info().timestamp)),
                instructions::NUMBER => stack.push(U256::from(self.ext.env_info().number)),
                instructions::DIFFICULTY => stack.push(self.ext.env_info().difficulty),
                instructions::GASLIMIT => stack.push(self.ext.env_info().gas_limit),

                instructions::POP => { stack.pop(); }
                instructions::MLOAD => {
                    let offset = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, offset, 32, 0)?;
                    stack.push(memory.read_u256(offset));
                }
                instructions::MSTORE => {
                    let offset = to_usize(stack.pop())?;
                    let value = stack.pop();
                    touch_memory(&schedule, &mut gas, &mut memory, offset, 32, 0)?;
                    memory.write_u256(offset, value);
                }
                instructions::MSTORE8 => {
                    let offset = to_usize(stack.pop())?;
                    let value = stack.pop();
                    touch_memory(&schedule, &mut gas, &mut memory, offset, 1, 0)?;
                    memory.write_byte(offset, value.low_u32() as u8);
                }
                instructions::SLOAD => {
                    let key = H256::from(u256_to_bytes(stack.pop()));
                    let value = self.ext.storage_at(&key)?;
                    stack.push(u256_of_hash(value));
                }
                instructions::SSTORE => {
                    let key = H256::from(u256_to_bytes(stack.pop()));
                    let value = H256::from(u256_to_bytes(stack.pop()));
                    let current = self.ext.storage_at(&key)?;
                    let cost = if schedule.eip1283 {
                        let original = self.ext.initial_storage_at(&key)?;
                        gasometer::sstore_cost_eip1283(&schedule, u256_of_hash(original), u256_of_hash(current), u256_of_hash(value))
                    } else {
                        gasometer::sstore_cost_basic(&schedule, u256_of_hash(current), u256_of_hash(value))
                    };
                    charge(&mut gas, cost.gas)?;
                    if cost.refund_delta > 0 {
                        self.ext.add_sstore_refund(cost.refund_delta as usize);
                    } else if cost.refund_delta < 0 {
                        self.ext.sub_sstore_refund((-cost.refund_delta) as usize);
                    }
                    self.ext.set_storage(key, value)?;
                }
                instructions::JUMP => {
                    let dest = to_usize(stack.pop())?;
                    next_pc = validate_jump(&self.jump_dests, self.code.len(), dest)?;
                }
                instructions::JUMPI => {
                    let dest = to_usize(stack.pop())?;
                    let cond = stack.pop();
                    if !cond.is_zero() {
                        next_pc = validate_jump(&self.jump_dests, self.code.len(), dest)?;
                    }
                }
                instructions::PC => stack.push(U256::from(pc)),
                instructions::MSIZE => stack.push(U256::from(memory.size())),
                instructions::GAS => stack.push(gas),
                instructions::JUMPDEST => {}

                op if instructions::is_push(op) => {
                    let n = instructions::push_bytes(op);
                    let start = pc + 1;
                    let end = (start + n).min(self.code.len());
                    let mut buf = [0u8; 32];
                    let slice = &self.code[start..end];
                    buf[32 - n..32 - n + slice.len()].copy_from_slice(slice);
                    stack.push(U256::from_big_endian(&buf));
                }
                op if instructions::is_dup(op) => stack.dup((op - instructions::DUP1) as usize),
                op if instructions::is_swap(op) => stack.swap((op - instructions::SWAP1) as usize + 1),
                op if instructions::is_log(op) => {
                    let n = (op - instructions::LOG0) as usize;
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    let mut topics = Vec::with_capacity(n);
                    for _ in 0..n {
                        topics.push(H256::from(u256_to_bytes(stack.pop())));
                    }
                    touch_memory(&schedule, &mut gas, &mut memory, offset, len, gasometer::log_cost(&schedule, n, len))?;
                    let bytes = memory.read(offset, len);
                    self.ext.log(topics, &bytes)?;
                }

                instructions::CREATE | instructions::CREATE2 => {
                    let value = stack.pop();
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    let salt = if op == instructions::CREATE2 { Some(H256::from(u256_to_bytes(stack.pop()))) } else { None };
                    let hash_extra = if op == instructions::CREATE2 {
                        schedule.sha3_word_gas as u64 * (((len + 31) / 32) as u64)
                    } else {
                        0
                    };
                    touch_memory(&schedule, &mut gas, &mut memory, offset, len, hash_extra)?;
                    if self.ext.depth() >= vm::STACK_DEPTH_LIMIT {
                        stack.push(U256::zero());
                        pc = next_pc;
                        continue;
                    }
                    let code = memory.read(offset, len);
                    let scheme = match salt {
                        Some(s) => CreateContractAddress::FromSenderSaltAndCodeHash(s),
                        None => CreateContractAddress::FromSenderAndNonce,
                    };
                    let available = gas.low_u64();
                    let forwarded = U256::from(gasometer::eip150_forward_gas(available, gas));
                    gas -= forwarded;
                    match self.ext.create(&forwarded, &value, &code, scheme) {
                        CreateResult::Created { address, gas_left } => {
                            gas += gas_left;
                            stack.push(address_to_word(address));
                        }
                        CreateResult::Reverted { gas_left, data } => {
                            gas += gas_left;
                            last_return_data = data;
                            stack.push(U256::zero());
                        }
                        CreateResult::Failed => {
                            stack.push(U256::zero());
                        }
                    }
                }

                instructions::CALL | instructions::CALLCODE | instructions::DELEGATECALL | instructions::STATICCALL => {
                    self.dispatch_call(op, &mut stack, &mut memory, &mut gas, &mut last_return_data)?;
                }

                instructions::RETURN => {
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, offset, len, 0)?;
                    let out = memory.read(offset, len);
                    return Ok(Outcome::Normal { gas_left: gas, data: ReturnData::new(out) });
                }
                instructions::REVERT => {
                    let offset = to_usize(stack.pop())?;
                    let len = to_usize(stack.pop())?;
                    touch_memory(&schedule, &mut gas, &mut memory, offset, len, 0)?;
                    let out = memory.read(offset, len);
                    return Ok(Outcome::Reverted { gas_left: gas, data: ReturnData::new(out) });
                }
                instructions::SELFDESTRUCT => {
                    let refund_to = word_to_address(stack.pop());
                    let balance = self.ext.balance(&self.params.address)?;
                    let creates_account = !balance.is_zero() && !self.ext.exists_and_not_null(&refund_to)?;
                    let cost = schedule.suicide_gas as u64
                        + if creates_account { schedule.suicide_to_new_account_cost as u64 } else { 0 };
                    charge(&mut gas, cost)?;
                    self.ext.suicide(&refund_to)?;
                    return Ok(Outcome::Normal { gas_left: gas, data: ReturnData::empty() });
                }

                instructions::INVALID => return Err(Error::BadInstruction { instruction: op }),
                _ => return Err(Error::BadInstruction { instruction: op }),
            }

            pc = next_pc;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_call(
        &mut self,
        op: u8,
        stack: &mut Stack,
        memory: &mut Memory,
        gas: &mut U256,
        last_return_data: &mut ReturnData,
    ) -> Result<()> {
        let call_type = match op {
            instructions::CALL => CallType::Call,
            instructions::CALLCODE => CallType::CallCode,
            instructions::DELEGATECALL => CallType::DelegateCall,
            instructions::STATICCALL => CallType::StaticCall,
            _ => unreachable!(),
        };
        let has_value = matches!(call_type, CallType::Call | CallType::CallCode);

        let call_gas_requested = stack.pop();
        let code_address = word_to_address(stack.pop());
        let value = if has_value { stack.pop() } else { U256::zero() };
        let in_offset = to_usize(stack.pop())?;
        let in_len = to_usize(stack.pop())?;
        let out_offset = to_usize(stack.pop())?;
        let out_len = to_usize(stack.pop())?;

        if self.ext.is_static() && call_type == CallType::Call && !value.is_zero() {
            return Err(Error::MutableCallInStaticContext);
        }

        let old_words = memory.words();
        let new_words = old_words.max(words_for(in_offset, in_len)).max(words_for(out_offset, out_len));
        let mem_cost = gasometer::mem_expansion_cost(old_words, new_words, &self.schedule);
        charge(gas, mem_cost)?;
        memory.expand_to_words(new_words);

        let creates_account = call_type == CallType::Call
            && !self.ext.exists_and_not_null(&code_address)?
            && (!value.is_zero() || self.schedule.empty_account_value_transfer);

        let mut extra = 0u64;
        if has_value && !value.is_zero() {
            extra += self.schedule.call_value_transfer_gas as u64;
        }
        if creates_account {
            extra += self.schedule.call_new_account_gas as u64;
        }
        charge(gas, extra)?;

        if self.ext.depth() >= vm::STACK_DEPTH_LIMIT {
            stack.push(U256::zero());
            return Ok(());
        }

        let available = gas.low_u64();
        let forwarded = gasometer::eip150_forward_gas(available, call_gas_requested);
        *gas -= U256::from(forwarded);
        let callee_gas = if has_value && !value.is_zero() {
            U256::from(forwarded) + U256::from(self.schedule.call_stipend)
        } else {
            U256::from(forwarded)
        };

        let (sender_address, receive_address) = match call_type {
            CallType::Call | CallType::StaticCall => (self.params.address, code_address),
            CallType::CallCode => (self.params.address, self.params.address),
            CallType::DelegateCall => (self.params.sender, self.params.address),
            CallType::None => unreachable!(),
        };
        let value_opt = match call_type {
            CallType::Call | CallType::CallCode => Some(value),
            CallType::DelegateCall | CallType::StaticCall => None,
            CallType::None => unreachable!(),
        };

        let input = memory.read(in_offset, in_len);
        let result = self.ext.call(&callee_gas, &sender_address, &receive_address, value_opt, &input, &code_address, call_type);

        match result {
            CallResult::Success { gas_left, data } => {
                *gas += gas_left;
                let n = data.len().min(out_len);
                memory.write_slice(out_offset, &data[..n]);
                *last_return_data = data;
                stack.push(U256::one());
            }
            CallResult::Reverted { gas_left, data } => {
                *gas += gas_left;
                let n = data.len().min(out_len);
                memory.write_slice(out_offset, &data[..n]);
                *last_return_data = data;
                stack.push(U256::zero());
            }
            CallResult::Failed => {
                stack.push(U256::zero());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use vm::EnvInfo;

    struct TestExt {
        storage: HashMap<H256, H256>,
        initial_storage: HashMap<H256, H256>,
        static_flag: bool,
        schedule: Schedule,
        env_info: EnvInfo,
        balances: HashMap<Address, U256>,
        logs: Vec<(Vec<H256>, Vec<u8>)>,
        suicided: Option<Address>,
        refund: i64,
    }

    impl TestExt {
        fn new() -> Self {
            TestExt {
                storage: HashMap::new(),
                initial_storage: HashMap::new(),
                static_flag: false,
                schedule: Schedule::new_constantinople(),
                env_info: EnvInfo::default(),
                balances: HashMap::new(),
                logs: Vec::new(),
                suicided: None,
                refund: 0,
            }
        }
    }

    impl Ext for TestExt {
        fn storage_at(&self, key: &H256) -> Result<H256> {
            Ok(self.storage.get(key).copied().unwrap_or_default())
        }
        fn initial_storage_at(&self, key: &H256) -> Result<H256> {
            Ok(self.initial_storage.get(key).copied().unwrap_or_default())
        }
        fn set_storage(&mut self, key: H256, value: H256) -> Result<()> {
            self.storage.insert(key, value);
            Ok(())
        }
        fn is_static(&self) -> bool {
            self.static_flag
        }
        fn exists(&self, _address: &Address) -> Result<bool> {
            Ok(true)
        }
        fn exists_and_not_null(&self, _address: &Address) -> Result<bool> {
            Ok(true)
        }
        fn balance(&self, address: &Address) -> Result<U256> {
            Ok(self.balances.get(address).copied().unwrap_or_default())
        }
        fn blockhash(&mut self, _number: &U256) -> H256 {
            H256::zero()
        }
        fn create(
            &mut self,
            _gas: &U256,
            _value: &U256,
            _code: &[u8],
            _address_scheme: CreateContractAddress,
        ) -> CreateResult {
            CreateResult::Failed
        }
        #[allow(clippy::too_many_arguments)]
        fn call(
            &mut self,
            _gas: &U256,
            _sender_address: &Address,
            _receive_address: &Address,
            _value: Option<U256>,
            _data: &[u8],
            _code_address: &Address,
            _call_type: CallType,
        ) -> CallResult {
            CallResult::Failed
        }
        fn extcode(&self, _address: &Address) -> Result<Option<Arc<parity_bytes::Bytes>>> {
            Ok(None)
        }
        fn extcodehash(&self, _address: &Address) -> Result<Option<H256>> {
            Ok(None)
        }
        fn extcodesize(&self, _address: &Address) -> Result<Option<usize>> {
            Ok(None)
        }
        fn log(&mut self, topics: Vec<H256>, data: &[u8]) -> Result<()> {
            self.logs.push((topics, data.to_vec()));
            Ok(())
        }
        fn suicide(&mut self, refund_address: &Address) -> Result<()> {
            self.suicided = Some(*refund_address);
            Ok(())
        }
        fn schedule(&self) -> &Schedule {
            &self.schedule
        }
        fn env_info(&self) -> &EnvInfo {
            &self.env_info
        }
        fn depth(&self) -> usize {
            0
        }
        fn add_sstore_refund(&mut self, value: usize) {
            self.refund += value as i64;
        }
        fn sub_sstore_refund(&mut self, value: usize) {
            self.refund -= value as i64;
        }
    }

    fn run_code(ext: &mut dyn Ext, code: Vec<u8>, gas: u64) -> Result<Outcome> {
        let params = ActionParams { code: Some(Arc::new(code)), gas: U256::from(gas), ..Default::default() };
        let mut interp = Interpreter::new(ext, params);
        interp.run(U256::from(gas))
    }

    #[test]
    fn add_then_return() {
        let mut ext = TestExt::new();
        // PUSH1 3, PUSH1 2, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
        let code = vec![
            0x60, 3, 0x60, 2, 0x01, 0x60, 0, 0x52, 0x60, 32, 0x60, 0, 0xf3,
        ];
        match run_code(&mut ext, code, 100_000).unwrap() {
            Outcome::Normal { data, .. } => {
                assert_eq!(U256::from_big_endian(&data), U256::from(5));
            }
            Outcome::Reverted { .. } => panic!("should not revert"),
        }
    }

    #[test]
    fn addmod_wraps_through_512_bits() {
        let a = U256::max_value();
        let b = U256::max_value();
        let m = U256::from(7);
        // (a + b) mod m computed without truncation.
        let expected = U256::from((U512::from(a) + U512::from(b)) % U512::from(m));
        assert_eq!(addmod(a, b, m), expected);
    }

    #[test]
    fn mulmod_zero_modulus_is_zero() {
        assert_eq!(mulmod(U256::from(5), U256::from(6), U256::zero()), U256::zero());
    }

    #[test]
    fn sdiv_handles_min_over_minus_one() {
        let min = U256::one() << 255;
        assert_eq!(signed_div(min, U256::max_value()), min);
    }

    #[test]
    fn sar_of_negative_fills_with_ones() {
        let neg_one = U256::max_value();
        assert_eq!(arithmetic_shift_right(neg_one, U256::from(4)), U256::max_value());
    }

    #[test]
    fn stack_underflow_is_reported() {
        let mut ext = TestExt::new();
        let code = vec![0x01]; // ADD with nothing on the stack
        let err = run_code(&mut ext, code, 100_000).unwrap_err();
        assert_eq!(err, Error::StackUnderflow { instruction: "ADD", wanted: 2, on_stack: 0 });
    }

    #[test]
    fn runs_out_of_gas() {
        let mut ext = TestExt::new();
        let code = vec![0x60, 1, 0x60, 1, 0x01]; // PUSH1 1, PUSH1 1, ADD
        let err = run_code(&mut ext, code, 5).unwrap_err();
        assert_eq!(err, Error::OutOfGas);
    }

    #[test]
    fn implicit_stop_past_end_of_code() {
        let mut ext = TestExt::new();
        match run_code(&mut ext, vec![], 100_000).unwrap() {
            Outcome::Normal { data, .. } => assert!(data.is_empty()),
            Outcome::Reverted { .. } => panic!("should not revert"),
        }
    }

    #[test]
    fn jump_to_valid_destination() {
        let mut ext = TestExt::new();
        // PUSH1 4, JUMP, INVALID, JUMPDEST, STOP
        let code = vec![0x60, 4, 0x56, 0xfe, 0x5b, 0x00];
        match run_code(&mut ext, code, 100_000) {
            Ok(Outcome::Normal { .. }) => {}
            other => panic!("expected normal stop, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn jump_to_invalid_destination_fails() {
        let mut ext = TestExt::new();
        // PUSH1 3, JUMP (destination 3 is a PUSH1 immediate byte, not JUMPDEST)
        let code = vec![0x60, 3, 0x56, 0x00];
        let err = run_code(&mut ext, code, 100_000).unwrap_err();
        assert_eq!(err, Error::BadJumpDestination { destination: 3 });
    }

    #[test]
    fn sstore_is_rejected_in_static_context() {
        let mut ext = TestExt::new();
        ext.static_flag = true;
        // PUSH1 1, PUSH1 0, SSTORE
        let code = vec![0x60, 1, 0x60, 0, 0x55];
        let err = run_code(&mut ext, code, 100_000).unwrap_err();
        assert_eq!(err, Error::MutableCallInStaticContext);
    }

    #[test]
    fn selfdestruct_returns_normal_outcome() {
        let mut ext = TestExt::new();
        // PUSH20 <zero address>, SELFDESTRUCT
        let mut code = vec![0x73];
        code.extend_from_slice(&[0u8; 20]);
        code.push(0xff);
        match run_code(&mut ext, code, 100_000).unwrap() {
            Outcome::Normal { .. } => {}
            Outcome::Reverted { .. } => panic!("should not revert"),
        }
        assert_eq!(ext.suicided, Some(Address::zero()));
    }

    #[test]
    fn revert_preserves_output_and_distinguishes_from_normal() {
        let mut ext = TestExt::new();
        // PUSH1 1, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, REVERT
        let code = vec![0x60, 1, 0x60, 0, 0x53, 0x60, 1, 0x60, 0, 0xfd];
        match run_code(&mut ext, code, 100_000).unwrap() {
            Outcome::Reverted { data, .. } => assert_eq!(&data[..], &[1]),
            Outcome::Normal { .. } => panic!("should revert"),
        }
    }
}
