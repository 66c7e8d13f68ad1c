use crate::ext::CreateContractAddress;
use ethereum_types::Address;
use keccak_hash::keccak;

/// Address a `CREATE`/`CREATE2` would assign its new contract (§4.10 step
/// 2). The low 20 bytes of the relevant Keccak-256 hash.
pub fn contract_address(scheme: CreateContractAddress, sender: &Address, nonce: u64, init_code: &[u8]) -> Address {
    match scheme {
        CreateContractAddress::FromSenderAndNonce => {
            let mut stream = rlp::RlpStream::new_list(2);
            stream.append(sender);
            stream.append(&nonce);
            Address::from_slice(&keccak(stream.out()).as_bytes()[12..])
        }
        CreateContractAddress::FromSenderSaltAndCodeHash(salt) => {
            let code_hash = keccak(init_code);
            let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
            buf.push(0xff);
            buf.extend_from_slice(sender.as_bytes());
            buf.extend_from_slice(salt.as_bytes());
            buf.extend_from_slice(code_hash.as_bytes());
            Address::from_slice(&keccak(&buf).as_bytes()[12..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256;

    #[test]
    fn create_address_depends_only_on_sender_and_nonce() {
        let sender = Address::repeat_byte(1);
        let a = contract_address(CreateContractAddress::FromSenderAndNonce, &sender, 0, &[1, 2, 3]);
        let b = contract_address(CreateContractAddress::FromSenderAndNonce, &sender, 0, &[9, 9, 9]);
        assert_eq!(a, b);
        let c = contract_address(CreateContractAddress::FromSenderAndNonce, &sender, 1, &[1, 2, 3]);
        assert_ne!(a, c);
    }

    #[test]
    fn create2_address_depends_on_salt_and_code() {
        let sender = Address::repeat_byte(1);
        let salt = H256::repeat_byte(2);
        let a = contract_address(
            CreateContractAddress::FromSenderSaltAndCodeHash(salt),
            &sender,
            0,
            &[1, 2, 3],
        );
        let b = contract_address(
            CreateContractAddress::FromSenderSaltAndCodeHash(salt),
            &sender,
            0,
            &[1, 2, 4],
        );
        assert_ne!(a, b);
    }
}
