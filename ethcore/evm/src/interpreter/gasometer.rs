//! Gas cost formulas that don't reduce to a flat per-opcode constant
//! (§4.8). Flat base costs (`W_zero`..`W_high`) are applied directly at
//! the call site in `interpreter::mod`; this module covers the opcodes
//! whose cost depends on operands, memory growth, or the SSTORE/1283
//! refund table.

use ethereum_types::U256;
use vm::Schedule;

/// `C_mem(w) = 3w + floor(w^2/512)` (quad coefficient configurable per
/// schedule, though every real fork uses 512).
pub fn mem_gas(words: usize, schedule: &Schedule) -> u64 {
    let w = words as u64;
    schedule.memory_gas as u64 * w + (w * w) / schedule.quad_coeff_div as u64
}

/// Incremental cost of growing the active region from `old_words` to
/// `new_words`. Zero if the region doesn't actually grow (reading/writing
/// within the already-active area is free).
pub fn mem_expansion_cost(old_words: usize, new_words: usize, schedule: &Schedule) -> u64 {
    if new_words <= old_words {
        return 0;
    }
    mem_gas(new_words, schedule) - mem_gas(old_words, schedule)
}

fn ceil_div32(len: usize) -> u64 {
    ((len + 31) / 32) as u64
}

/// Number of non-zero big-endian bytes in `exponent`, minimum 1 counted
/// for a zero exponent's single (zero) byte — matches `EXP`'s
/// byte-length-of-the-operand metering.
pub fn exp_byte_len(exponent: U256) -> u64 {
    let bytes = exponent.to_big_endian_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0);
    match first_nonzero {
        None => 0,
        Some(i) => (32 - i) as u64,
    }
}

trait U256BigEndianBytes {
    fn to_big_endian_bytes(&self) -> [u8; 32];
}

impl U256BigEndianBytes for U256 {
    fn to_big_endian_bytes(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.to_big_endian(&mut buf);
        buf
    }
}

pub fn exp_cost(schedule: &Schedule, exponent: U256) -> u64 {
    schedule.exp_gas as u64 + schedule.exp_byte_gas as u64 * exp_byte_len(exponent)
}

pub fn sha3_cost(schedule: &Schedule, len: usize) -> u64 {
    schedule.sha3_gas as u64 + schedule.sha3_word_gas as u64 * ceil_div32(len)
}

/// `CALLDATACOPY`/`CODECOPY`/`EXTCODECOPY`/`RETURNDATACOPY`'s per-word cost
/// (`EXTCODECOPY` additionally pays `extcodecopy_base_gas`, charged by the
/// caller).
pub fn copy_cost(schedule: &Schedule, len: usize) -> u64 {
    schedule.copy_gas as u64 * ceil_div32(len)
}

pub fn log_cost(schedule: &Schedule, topic_count: usize, data_len: usize) -> u64 {
    schedule.log_gas as u64
        + schedule.log_data_gas as u64 * data_len as u64
        + schedule.log_topic_gas as u64 * topic_count as u64
}

/// Result of metering an `SSTORE`: the gas to charge now, and the signed
/// change to the transaction-wide refund counter (negative values
/// subtract a previously-granted refund, as EIP-1283 requires when a slot
/// that was cleared gets un-cleared).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SstoreCost {
    pub gas: u64,
    pub refund_delta: i64,
}

/// Pre-Constantinople metering: keyed only off `(current, new)`.
pub fn sstore_cost_basic(schedule: &Schedule, current: U256, new: U256) -> SstoreCost {
    if current.is_zero() && !new.is_zero() {
        SstoreCost { gas: schedule.sstore_set_gas as u64, refund_delta: 0 }
    } else if !current.is_zero() && new.is_zero() {
        SstoreCost { gas: schedule.sstore_reset_gas as u64, refund_delta: schedule.sstore_refund_gas as i64 }
    } else {
        SstoreCost { gas: schedule.sstore_reset_gas as u64, refund_delta: 0 }
    }
}

/// EIP-1283 metering: keyed off `(original, current, new)`, with the
/// refund table needed to make repeated writes within one transaction
/// charge the slot's "real" net effect rather than double-counting.
pub fn sstore_cost_eip1283(schedule: &Schedule, original: U256, current: U256, new: U256) -> SstoreCost {
    if current == new {
        return SstoreCost { gas: schedule.sload_gas as u64, refund_delta: 0 };
    }
    if original == current {
        if original.is_zero() {
            return SstoreCost { gas: schedule.sstore_set_gas as u64, refund_delta: 0 };
        }
        let mut refund_delta = 0i64;
        if new.is_zero() {
            refund_delta += schedule.sstore_refund_gas as i64;
        }
        return SstoreCost { gas: schedule.sstore_reset_gas as u64, refund_delta };
    }
    // original != current: this slot was already touched earlier in the
    // transaction, so we're adjusting a previously-charged write rather
    // than paying the first-touch price again.
    let mut refund_delta = 0i64;
    if !original.is_zero() {
        if current.is_zero() {
            refund_delta -= schedule.sstore_refund_gas as i64;
        }
        if new.is_zero() {
            refund_delta += schedule.sstore_refund_gas as i64;
        }
    }
    if original == new {
        let reset_refund = if original.is_zero() {
            schedule.sstore_set_gas as i64 - schedule.sload_gas as i64
        } else {
            schedule.sstore_reset_gas as i64 - schedule.sload_gas as i64
        };
        refund_delta += reset_refund;
    }
    SstoreCost { gas: schedule.sload_gas as u64, refund_delta }
}

/// EIP-150 "all but one 64th": the maximum gas a `CALL`/`CREATE` may
/// forward to the callee out of `available` (gas remaining after the
/// opcode's own static cost and memory expansion have been deducted).
pub fn eip150_forward_gas(available: u64, requested: U256) -> u64 {
    let cap = available - available / 64;
    if requested > U256::from(cap) {
        cap
    } else {
        requested.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm::Schedule;

    #[test]
    fn mem_expansion_is_free_within_the_active_region() {
        let s = Schedule::new_constantinople();
        assert_eq!(mem_expansion_cost(4, 4, &s), 0);
        assert_eq!(mem_expansion_cost(4, 2, &s), 0);
    }

    #[test]
    fn mem_expansion_matches_known_small_values() {
        let s = Schedule::new_constantinople();
        // 1 word: 3*1 + 0 = 3
        assert_eq!(mem_expansion_cost(0, 1, &s), 3);
        // growing from 1 to 2 words costs C_mem(2)-C_mem(1) = 6-3 = 3
        assert_eq!(mem_expansion_cost(1, 2, &s), 3);
    }

    #[test]
    fn exp_cost_scales_with_exponent_byte_length() {
        let s = Schedule::new_frontier();
        assert_eq!(exp_cost(&s, U256::zero()), s.exp_gas as u64);
        assert_eq!(exp_cost(&s, U256::from(255)), s.exp_gas as u64 + s.exp_byte_gas as u64);
        assert_eq!(exp_cost(&s, U256::from(256)), s.exp_gas as u64 + 2 * s.exp_byte_gas as u64);
    }

    #[test]
    fn sstore_basic_path_matches_frontier_table() {
        let s = Schedule::new_frontier();
        assert_eq!(
            sstore_cost_basic(&s, U256::zero(), U256::from(1)),
            SstoreCost { gas: 20_000, refund_delta: 0 }
        );
        assert_eq!(
            sstore_cost_basic(&s, U256::from(1), U256::zero()),
            SstoreCost { gas: 5_000, refund_delta: 15_000 }
        );
        assert_eq!(
            sstore_cost_basic(&s, U256::from(1), U256::from(2)),
            SstoreCost { gas: 5_000, refund_delta: 0 }
        );
    }

    #[test]
    fn sstore_eip1283_noop_costs_sload() {
        let s = Schedule::new_constantinople();
        let r = sstore_cost_eip1283(&s, U256::from(1), U256::from(1), U256::from(1));
        assert_eq!(r, SstoreCost { gas: s.sload_gas as u64, refund_delta: 0 });
    }

    #[test]
    fn sstore_eip1283_dirty_clear_then_restore_refunds_correctly() {
        let s = Schedule::new_constantinople();
        // original=0, current=1 (dirty), new=0: restores to original -> refund sset-sload
        let r = sstore_cost_eip1283(&s, U256::zero(), U256::from(1), U256::zero());
        assert_eq!(r.gas, s.sload_gas as u64);
        assert_eq!(r.refund_delta, s.sstore_set_gas as i64 - s.sload_gas as i64);
    }

    #[test]
    fn eip150_forwards_all_but_one_64th() {
        assert_eq!(eip150_forward_gas(6400, U256::from(u64::MAX)), 6400 - 100);
        assert_eq!(eip150_forward_gas(6400, U256::from(10)), 10);
    }
}
