// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC GlobalId generation.
//!
//! A GlobalId is a 128-bit UUID packed into 22 characters of the IFC
//! base-64 alphabet; the first character carries the top two bits.

use uuid::Uuid;

const ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

/// A fresh random GlobalId.
pub fn new_guid() -> String {
    encode(u128::from_be_bytes(*Uuid::new_v4().as_bytes()))
}

fn encode(mut n: u128) -> String {
    let mut chars = [0u8; 22];
    for slot in chars.iter_mut().rev() {
        *slot = ALPHABET[(n & 63) as usize];
        n >>= 6;
    }
    String::from_utf8(chars.to_vec()).expect("alphabet is ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_has_22_ifc_characters() {
        let guid = new_guid();
        assert_eq!(guid.len(), 22);
        assert!(guid.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn first_character_is_bounded() {
        // 128 bits into 22 six-bit slots leaves 2 bits for the first
        for _ in 0..64 {
            let guid = new_guid();
            assert!(matches!(guid.as_bytes()[0], b'0'..=b'3'));
        }
    }

    #[test]
    fn encodes_zero() {
        assert_eq!(encode(0), "0000000000000000000000");
    }
}
