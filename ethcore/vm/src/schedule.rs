//! Hardfork-dependent gas costs and capability flags (§4.6).
//!
//! `Schedule` is a flat struct. Each `new_<fork>` constructor starts from
//! the previous fork's schedule and overwrites the fields that changed,
//! rather than delegating through a chain of trait objects — there is only
//! ever one schedule active at a time, for the block being executed.

/// EIP-150 exception semantics: does running out of the "all but one
/// 64th" forwarded gas in a sub-call propagate as an exception to the
/// caller, or just fail the sub-call?
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Schedule {
    /// Gas cost of a `SSTORE` setting a zero slot to non-zero.
    pub sload_gas: usize,
    pub sstore_set_gas: usize,
    pub sstore_reset_gas: usize,
    pub sstore_refund_gas: usize,
    /// EIP-1283: metering keyed off (original, current, new) instead of
    /// the basic (current, new) rule.
    pub eip1283: bool,

    pub exp_gas: usize,
    pub exp_byte_gas: usize,

    pub call_gas: usize,
    pub call_stipend: usize,
    pub call_value_transfer_gas: usize,
    pub call_new_account_gas: usize,

    pub create_gas: usize,
    pub create_data_gas: usize,
    pub create_by_value: usize,

    pub suicide_gas: usize,
    pub suicide_to_new_account_cost: usize,

    pub tx_gas: usize,
    pub tx_create_gas: usize,
    pub tx_data_zero_gas: usize,
    pub tx_data_non_zero_gas: usize,

    pub copy_gas: usize,
    pub extcodesize_gas: usize,
    pub extcodecopy_base_gas: usize,
    pub extcodehash_gas: usize,
    pub balance_gas: usize,
    pub log_gas: usize,
    pub log_data_gas: usize,
    pub log_topic_gas: usize,
    pub sha3_gas: usize,
    pub sha3_word_gas: usize,
    pub memory_gas: usize,
    pub quad_coeff_div: usize,

    /// Maximum signature `s` value accepted in `ECRECOVER`-derived checks
    /// and transaction signature validation: secp256k1n (Frontier) or
    /// secp256k1n/2 (Homestead, EIP-2).
    pub max_signature_s_half: bool,

    pub has_delegate_call: bool,
    pub has_create2: bool,
    pub has_revert: bool,
    pub has_return_data: bool,
    pub has_static_call: bool,
    pub has_shift_operations: bool,
    pub has_extcodehash: bool,

    pub has_mod_exp_builtin: bool,
    pub has_ec_add_builtin: bool,
    pub has_ec_mult_builtin: bool,
    pub has_ec_pairing_builtin: bool,

    /// If true, a code-deposit-gas shortfall during contract creation
    /// aborts the whole creation (failure); if false, the contract is
    /// created with empty code and the call itself still succeeds.
    pub fail_on_create_gas_shortfall: bool,
    /// EIP-150: does running an inner call/create out of its forwarded
    /// (all-but-one-64th) gas bubble up as an exceptional failure to the
    /// caller, or just fail that one call?
    pub fail_nested_operation_lack_of_gas: bool,

    pub limit_contract_code_size: Option<usize>,

    pub increment_nonce_on_create: bool,
    pub empty_account_value_transfer: bool,
    pub clean_touched_accounts: bool,
}

impl Schedule {
    pub fn new_frontier() -> Schedule {
        Schedule {
            sload_gas: 50,
            sstore_set_gas: 20_000,
            sstore_reset_gas: 5_000,
            sstore_refund_gas: 15_000,
            eip1283: false,

            exp_gas: 10,
            exp_byte_gas: 10,

            call_gas: 40,
            call_stipend: 2_300,
            call_value_transfer_gas: 9_000,
            call_new_account_gas: 25_000,

            create_gas: 32_000,
            create_data_gas: 200,
            create_by_value: 0,

            suicide_gas: 0,
            suicide_to_new_account_cost: 25_000,

            tx_gas: 21_000,
            tx_create_gas: 53_000,
            tx_data_zero_gas: 4,
            tx_data_non_zero_gas: 68,

            copy_gas: 3,
            extcodesize_gas: 20,
            extcodecopy_base_gas: 20,
            extcodehash_gas: 400,
            balance_gas: 20,
            log_gas: 375,
            log_data_gas: 8,
            log_topic_gas: 375,
            sha3_gas: 30,
            sha3_word_gas: 6,
            memory_gas: 3,
            quad_coeff_div: 512,

            max_signature_s_half: false,

            has_delegate_call: false,
            has_create2: false,
            has_revert: false,
            has_return_data: false,
            has_static_call: false,
            has_shift_operations: false,
            has_extcodehash: false,

            has_mod_exp_builtin: false,
            has_ec_add_builtin: false,
            has_ec_mult_builtin: false,
            has_ec_pairing_builtin: false,

            fail_on_create_gas_shortfall: false,
            fail_nested_operation_lack_of_gas: false,

            limit_contract_code_size: None,

            increment_nonce_on_create: false,
            empty_account_value_transfer: true,
            clean_touched_accounts: false,
        }
    }

    pub fn new_homestead() -> Schedule {
        let mut s = Schedule::new_frontier();
        s.max_signature_s_half = true;
        s.fail_on_create_gas_shortfall = true;
        s.has_delegate_call = true;
        s
    }

    pub fn new_tangerine_whistle() -> Schedule {
        let mut s = Schedule::new_homestead();
        // EIP-150 repricing.
        s.sload_gas = 200;
        s.call_gas = 700;
        s.extcodesize_gas = 700;
        s.extcodecopy_base_gas = 700;
        s.balance_gas = 400;
        s.suicide_gas = 5_000;
        s.fail_nested_operation_lack_of_gas = true;
        s
    }

    pub fn new_spurious_dragon() -> Schedule {
        let mut s = Schedule::new_tangerine_whistle();
        s.exp_byte_gas = 50;
        s.limit_contract_code_size = Some(0x6000);
        s.increment_nonce_on_create = true;
        s.empty_account_value_transfer = false;
        s.clean_touched_accounts = true;
        s
    }

    pub fn new_byzantium() -> Schedule {
        let mut s = Schedule::new_spurious_dragon();
        s.has_revert = true;
        s.has_return_data = true;
        s.has_static_call = true;
        s.has_mod_exp_builtin = true;
        s.has_ec_add_builtin = true;
        s.has_ec_mult_builtin = true;
        s.has_ec_pairing_builtin = true;
        s
    }

    pub fn new_constantinople() -> Schedule {
        let mut s = Schedule::new_byzantium();
        s.has_shift_operations = true;
        s.has_create2 = true;
        s.has_extcodehash = true;
        s.eip1283 = true;
        s
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::new_constantinople()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homestead_tightens_signature_bound_and_create_failure() {
        let f = Schedule::new_frontier();
        let h = Schedule::new_homestead();
        assert!(!f.max_signature_s_half);
        assert!(h.max_signature_s_half);
        assert!(!f.fail_on_create_gas_shortfall);
        assert!(h.fail_on_create_gas_shortfall);
    }

    #[test]
    fn tangerine_whistle_reprices_eip150_opcodes() {
        let s = Schedule::new_tangerine_whistle();
        assert_eq!(s.sload_gas, 200);
        assert_eq!(s.call_gas, 700);
        assert!(s.fail_nested_operation_lack_of_gas);
    }

    #[test]
    fn constantinople_enables_eip1283_and_create2() {
        let s = Schedule::new_constantinople();
        assert!(s.eip1283);
        assert!(s.has_create2);
        assert!(s.has_shift_operations);
        assert!(s.has_extcodehash);
    }

    #[test]
    fn later_forks_keep_earlier_capability_flags() {
        let s = Schedule::new_constantinople();
        assert!(s.has_delegate_call);
        assert!(s.has_revert);
        assert!(s.has_static_call);
    }
}
