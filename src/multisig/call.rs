//! Wallet call encoding
//!
//! Payloads addressed to a wallet carry a 4-byte selector followed by
//! fixed-width big-endian arguments:
//!
//! | type    | encoding                         |
//! |---------|----------------------------------|
//! | address | 20 bytes                         |
//! | uint128 | 16 bytes                         |
//! | uint64  | 8 bytes                          |
//! | bool    | 1 byte, `0x00` or `0x01`         |
//! | bytes   | 4-byte length, then the data     |

use crate::crypto::{selector, Address, ADDRESS_LEN};
use crate::multisig::transaction::TxId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROPOSE_SIGNATURE: &str = "propose(address,uint128,bytes)";
pub const CONFIRM_SIGNATURE: &str = "confirm(uint64)";
pub const EXECUTE_SIGNATURE: &str = "execute(uint64)";
pub const UPDATE_OWNER_SIGNATURE: &str = "updateOwner(address,bool)";

/// Payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too short: need {need} bytes at offset {offset}, have {have}")]
    Truncated {
        offset: usize,
        need: usize,
        have: usize,
    },
    #[error("Unknown selector: 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),
    #[error("Invalid bool encoding: {0:#04x}")]
    InvalidBool(u8),
    #[error("Unexpected {0} trailing bytes")]
    TrailingBytes(usize),
}

/// A call into a wallet's public interface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum WalletCall {
    Propose {
        target: Address,
        #[serde(with = "crate::multisig::amount")]
        value: u128,
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
    },
    Confirm {
        id: TxId,
    },
    Execute {
        id: TxId,
    },
    UpdateOwner {
        owner: Address,
        is_owner: bool,
    },
}

impl WalletCall {
    /// Signature string the selector is derived from
    pub fn signature(&self) -> &'static str {
        match self {
            WalletCall::Propose { .. } => PROPOSE_SIGNATURE,
            WalletCall::Confirm { .. } => CONFIRM_SIGNATURE,
            WalletCall::Execute { .. } => EXECUTE_SIGNATURE,
            WalletCall::UpdateOwner { .. } => UPDATE_OWNER_SIGNATURE,
        }
    }

    /// Encode into payload bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = selector(self.signature()).to_vec();
        match self {
            WalletCall::Propose {
                target,
                value,
                payload,
            } => {
                out.extend_from_slice(target.as_bytes());
                out.extend_from_slice(&value.to_be_bytes());
                out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                out.extend_from_slice(payload);
            }
            WalletCall::Confirm { id } | WalletCall::Execute { id } => {
                out.extend_from_slice(&id.to_be_bytes());
            }
            WalletCall::UpdateOwner { owner, is_owner } => {
                out.extend_from_slice(owner.as_bytes());
                out.push(u8::from(*is_owner));
            }
        }
        out
    }

    /// Decode payload bytes
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(payload);
        let sel: [u8; 4] = reader.array()?;

        let call = if sel == selector(PROPOSE_SIGNATURE) {
            let target = reader.address()?;
            let value = u128::from_be_bytes(reader.array()?);
            let len = u32::from_be_bytes(reader.array()?) as usize;
            let payload = reader.take(len)?.to_vec();
            WalletCall::Propose {
                target,
                value,
                payload,
            }
        } else if sel == selector(CONFIRM_SIGNATURE) {
            WalletCall::Confirm {
                id: u64::from_be_bytes(reader.array()?),
            }
        } else if sel == selector(EXECUTE_SIGNATURE) {
            WalletCall::Execute {
                id: u64::from_be_bytes(reader.array()?),
            }
        } else if sel == selector(UPDATE_OWNER_SIGNATURE) {
            let owner = reader.address()?;
            let is_owner = match reader.array::<1>()?[0] {
                0 => false,
                1 => true,
                other => return Err(DecodeError::InvalidBool(other)),
            };
            WalletCall::UpdateOwner { owner, is_owner }
        } else {
            return Err(DecodeError::UnknownSelector(sel));
        };

        reader.finish()?;
        Ok(call)
    }
}

/// Cursor over payload bytes
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.data.len() - self.offset;
        if remaining < n {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                need: n,
                have: remaining,
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn address(&mut self) -> Result<Address, DecodeError> {
        Ok(Address::from_bytes(self.array::<ADDRESS_LEN>()?))
    }

    fn finish(self) -> Result<(), DecodeError> {
        match self.data.len() - self.offset {
            0 => Ok(()),
            extra => Err(DecodeError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_owner_layout() {
        let owner = Address::from_bytes([9; ADDRESS_LEN]);
        let encoded = WalletCall::UpdateOwner {
            owner,
            is_owner: true,
        }
        .encode();

        assert_eq!(encoded.len(), 4 + ADDRESS_LEN + 1);
        assert_eq!(&encoded[..4], &selector(UPDATE_OWNER_SIGNATURE));
        assert_eq!(&encoded[4..24], owner.as_bytes());
        assert_eq!(encoded[24], 1);
    }

    #[test]
    fn test_propose_carries_nested_payload() {
        let inner = WalletCall::Confirm { id: 3 }.encode();
        let call = WalletCall::Propose {
            target: Address::from_bytes([2; ADDRESS_LEN]),
            value: 1_000,
            payload: inner.clone(),
        };

        match WalletCall::decode(&call.encode()).unwrap() {
            WalletCall::Propose { value, payload, .. } => {
                assert_eq!(value, 1_000);
                assert_eq!(payload, inner);
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_selector() {
        // updateOwner(address) is not part of the wallet interface
        let mut payload = selector("updateOwner(address)").to_vec();
        payload.extend_from_slice(&[5; ADDRESS_LEN]);

        assert_eq!(
            WalletCall::decode(&payload),
            Err(DecodeError::UnknownSelector(selector("updateOwner(address)")))
        );
    }

    #[test]
    fn test_truncated_and_trailing() {
        let mut payload = WalletCall::Execute { id: 1 }.encode();
        payload.pop();
        assert!(matches!(
            WalletCall::decode(&payload),
            Err(DecodeError::Truncated { need: 8, have: 7, .. })
        ));

        let mut payload = WalletCall::Execute { id: 1 }.encode();
        payload.push(0);
        assert_eq!(
            WalletCall::decode(&payload),
            Err(DecodeError::TrailingBytes(1))
        );

        assert!(matches!(
            WalletCall::decode(&[]),
            Err(DecodeError::Truncated { offset: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let mut payload = WalletCall::UpdateOwner {
            owner: Address::from_bytes([1; ADDRESS_LEN]),
            is_owner: false,
        }
        .encode();
        *payload.last_mut().unwrap() = 2;

        assert_eq!(WalletCall::decode(&payload), Err(DecodeError::InvalidBool(2)));
    }
}
