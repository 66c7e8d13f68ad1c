//! Precompiled contracts (§4.12): addresses `0x01..0x09` are ordinary
//! accounts as far as `message_call` is concerned, except that their code
//! is a native function rather than EVM bytecode. `builtins(schedule)`
//! returns the set reachable under a given hardfork configuration.

use std::collections::HashMap;

use bn::{AffineG1, AffineG2, Fq, Fq2, Group, Gt, G1, G2};
use ethereum_types::{Address, H256, U256};
use parity_bytes::BytesRef;
use parity_crypto::publickey::{recover as ec_recover, Signature};

mod modexp;

/// A precompiled contract: gas cost as a function of input, plus the
/// native function it runs.
pub struct Builtin {
    pricer: Box<dyn Pricer>,
    native: Box<dyn Implementation>,
}

impl Builtin {
    pub fn cost(&self, input: &[u8]) -> U256 {
        self.pricer.cost(input)
    }

    pub fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        self.native.execute(input, output)
    }
}

pub trait Pricer: Send + Sync {
    fn cost(&self, input: &[u8]) -> U256;
}

pub trait Implementation: Send + Sync {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str>;
}

fn ceil_div32(len: usize) -> u64 {
    ((len + 31) / 32) as u64
}

/// `base + word * ceil(len/32)`, the shape shared by ECRECOVER, SHA256,
/// RIPEMD160 and IDENTITY.
struct Linear {
    base: u64,
    word: u64,
}

impl Pricer for Linear {
    fn cost(&self, input: &[u8]) -> U256 {
        U256::from(self.base + self.word * ceil_div32(input.len()))
    }
}

struct Fixed(u64);

impl Pricer for Fixed {
    fn cost(&self, _input: &[u8]) -> U256 {
        U256::from(self.0)
    }
}

struct ModexpPricer;

impl Pricer for ModexpPricer {
    fn cost(&self, input: &[u8]) -> U256 {
        U256::from(modexp::cost(input))
    }
}

/// `100000 + 80000 * num_pairs`, one point-pair per 192 input bytes.
struct PairingPricer;

impl Pricer for PairingPricer {
    fn cost(&self, input: &[u8]) -> U256 {
        let pairs = input.len() / 192;
        U256::from(100_000 + 80_000 * pairs as u64)
    }
}

struct EcRecover;

impl Implementation for EcRecover {
    fn execute(&self, i: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        let mut input = [0u8; 128];
        let len = i.len().min(128);
        input[..len].copy_from_slice(&i[..len]);

        let hash = H256::from_slice(&input[0..32]);
        let v = H256::from_slice(&input[32..64]);
        let r = H256::from_slice(&input[64..96]);
        let s = H256::from_slice(&input[96..128]);

        // the recovery id must be 27 or 28, encoded as a full 32-byte word
        // with every higher byte zero.
        let valid_v = v[..31].iter().all(|b| *b == 0) && (v[31] == 27 || v[31] == 28);
        if !valid_v {
            return Ok(());
        }
        let bit = v[31] - 27;

        let sig = Signature::from_rsv(&r, &s, bit);
        if !sig.is_valid() {
            return Ok(());
        }
        if let Ok(public) = ec_recover(&sig, &hash) {
            let recovered = keccak_hash::keccak(public.as_bytes());
            output.write(0, &[0u8; 12]);
            output.write(12, &recovered[12..]);
        }
        Ok(())
    }
}

struct Sha256;

impl Implementation for Sha256 {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        use sha2::Digest;
        let digest = sha2::Sha256::digest(input);
        output.write(0, &digest);
        Ok(())
    }
}

struct Ripemd160;

impl Implementation for Ripemd160 {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        use ripemd160::Digest;
        let digest = ripemd160::Ripemd160::digest(input);
        output.write(0, &[0u8; 12]);
        output.write(12, &digest);
        Ok(())
    }
}

struct Identity;

impl Implementation for Identity {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        output.write(0, input);
        Ok(())
    }
}

struct Modexp;

impl Implementation for Modexp {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        let result = modexp::execute(input);
        output.write(0, &result);
        Ok(())
    }
}

fn read_fq(input: &[u8], offset: usize) -> Result<Fq, &'static str> {
    Fq::from_slice(&input[offset..offset + 32]).map_err(|_| "invalid field element")
}

fn read_point(input: &[u8], offset: usize) -> Result<G1, &'static str> {
    let px = read_fq(input, offset)?;
    let py = read_fq(input, offset + 32)?;
    if px.is_zero() && py.is_zero() {
        Ok(G1::zero())
    } else {
        AffineG1::new(px, py).map_err(|_| "invalid curve point").map(Into::into)
    }
}

fn padded(input: &[u8], len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let n = input.len().min(len);
    buf[..n].copy_from_slice(&input[..n]);
    buf
}

struct Bn128Add;

impl Implementation for Bn128Add {
    fn execute(&self, i: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        let input = padded(i, 128);
        let p1 = read_point(&input, 0)?;
        let p2 = read_point(&input, 64)?;

        let mut buf = [0u8; 64];
        if let Some(sum) = AffineG1::from_jacobian(p1 + p2) {
            sum.x().to_big_endian(&mut buf[0..32]).map_err(|_| "field element overflow")?;
            sum.y().to_big_endian(&mut buf[32..64]).map_err(|_| "field element overflow")?;
        }
        output.write(0, &buf);
        Ok(())
    }
}

struct Bn128Mul;

impl Implementation for Bn128Mul {
    fn execute(&self, i: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        let input = padded(i, 96);
        let p = read_point(&input, 0)?;
        let fr = bn::Fr::from_slice(&input[64..96]).map_err(|_| "invalid scalar")?;

        let mut buf = [0u8; 64];
        if let Some(product) = AffineG1::from_jacobian(p * fr) {
            product.x().to_big_endian(&mut buf[0..32]).map_err(|_| "field element overflow")?;
            product.y().to_big_endian(&mut buf[32..64]).map_err(|_| "field element overflow")?;
        }
        output.write(0, &buf);
        Ok(())
    }
}

struct Bn128Pairing;

impl Implementation for Bn128Pairing {
    fn execute(&self, input: &[u8], output: &mut BytesRef) -> Result<(), &'static str> {
        if input.len() % 192 != 0 {
            return Err("invalid input length, must be multiple of 192 bytes");
        }

        let mut accumulator = Gt::one();
        for chunk in input.chunks(192) {
            let ax = read_fq(chunk, 0)?;
            let ay = read_fq(chunk, 32)?;
            let bay = read_fq(chunk, 64)?;
            let bax = read_fq(chunk, 96)?;
            let bby = read_fq(chunk, 128)?;
            let bbx = read_fq(chunk, 160)?;

            let b_a = Fq2::new(bax, bay);
            let b_b = Fq2::new(bbx, bby);

            let a = if ax.is_zero() && ay.is_zero() {
                G1::zero()
            } else {
                AffineG1::new(ax, ay).map_err(|_| "invalid curve point")?.into()
            };
            let b = if b_a.is_zero() && b_b.is_zero() {
                G2::zero()
            } else {
                AffineG2::new(b_a, b_b).map_err(|_| "invalid curve point")?.into()
            };
            accumulator = accumulator * bn::pairing(a, b);
        }

        let success = accumulator == Gt::one();
        let mut word = [0u8; 32];
        word[31] = success as u8;
        output.write(0, &word);
        Ok(())
    }
}

/// Every precompile reachable under `schedule`'s hardfork capability flags
/// (§4.6). `BLAKE2F` (address 9) has no capability flag in this schedule
/// generation and is never included — see the "Open Question" entry for
/// address 9 in the design ledger.
pub fn builtins(schedule: &vm::Schedule) -> HashMap<Address, Builtin> {
    let mut map = HashMap::new();

    map.insert(
        address(1),
        Builtin { pricer: Box::new(Linear { base: 3_000, word: 0 }), native: Box::new(EcRecover) },
    );
    map.insert(
        address(2),
        Builtin { pricer: Box::new(Linear { base: 60, word: 12 }), native: Box::new(Sha256) },
    );
    map.insert(
        address(3),
        Builtin { pricer: Box::new(Linear { base: 600, word: 120 }), native: Box::new(Ripemd160) },
    );
    map.insert(
        address(4),
        Builtin { pricer: Box::new(Linear { base: 15, word: 3 }), native: Box::new(Identity) },
    );

    if schedule.has_mod_exp_builtin {
        map.insert(address(5), Builtin { pricer: Box::new(ModexpPricer), native: Box::new(Modexp) });
    }
    if schedule.has_ec_add_builtin {
        map.insert(address(6), Builtin { pricer: Box::new(Fixed(500)), native: Box::new(Bn128Add) });
    }
    if schedule.has_ec_mult_builtin {
        map.insert(address(7), Builtin { pricer: Box::new(Fixed(40_000)), native: Box::new(Bn128Mul) });
    }
    if schedule.has_ec_pairing_builtin {
        map.insert(address(8), Builtin { pricer: Box::new(PairingPricer), native: Box::new(Bn128Pairing) });
    }

    map
}

fn address(n: u8) -> Address {
    Address::from_low_u64_be(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hex::FromHex;
    use vm::Schedule;

    fn call(b: &Builtin, input: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 256];
        {
            let mut r = BytesRef::Fixed(&mut out);
            b.execute(input, &mut r).unwrap();
        }
        out
    }

    #[test]
    fn identity_echoes_input() {
        let s = Schedule::new_constantinople();
        let b = &builtins(&s)[&address(4)];
        let mut out = vec![0u8; 4];
        {
            let mut r = BytesRef::Fixed(&mut out);
            b.execute(b"ping", &mut r).unwrap();
        }
        assert_eq!(out, b"ping");
    }

    #[test]
    fn identity_cost_is_linear() {
        let s = Schedule::new_constantinople();
        let b = &builtins(&s)[&address(4)];
        assert_eq!(b.cost(&[0u8; 0]), U256::from(15));
        assert_eq!(b.cost(&[0u8; 32]), U256::from(18));
        assert_eq!(b.cost(&[0u8; 33]), U256::from(21));
    }

    #[test]
    fn sha256_matches_known_digest() {
        let s = Schedule::new_constantinople();
        let b = &builtins(&s)[&address(2)];
        let out = call(b, b"");
        let expected: Vec<u8> =
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".from_hex().unwrap();
        assert_eq!(&out[..32], &expected[..]);
    }

    #[test]
    fn mod_exp_gated_off_before_byzantium() {
        let s = Schedule::new_homestead();
        assert!(!builtins(&s).contains_key(&address(5)));
        let s = Schedule::new_byzantium();
        assert!(builtins(&s).contains_key(&address(5)));
    }

    #[test]
    fn blake2f_is_never_registered() {
        let s = Schedule::new_constantinople();
        assert!(!builtins(&s).contains_key(&address(9)));
    }

    #[test]
    fn ec_recover_rejects_malformed_v() {
        let s = Schedule::new_constantinople();
        let b = &builtins(&s)[&address(1)];
        let mut input = [0u8; 128];
        input[63] = 99; // not 27/28
        let out = call(b, &input);
        assert_eq!(&out[..32], &[0u8; 32][..]);
    }
}
