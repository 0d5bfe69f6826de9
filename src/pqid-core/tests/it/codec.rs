//! Property-based tests for the hex and PEM codecs.

use proptest::prelude::*;

use pqid_core::codec::{LABEL_CERTIFICATE, LABEL_CSR, LABEL_PRIVATE_KEY, LABEL_PUBLIC_KEY, LABEL_SIGNATURE};
use pqid_core::{bytes_to_hex, from_pem, from_pem_labeled, from_pem_lenient, hex_to_bytes, to_pem};

fn byte_array() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

fn label() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        LABEL_PRIVATE_KEY,
        LABEL_PUBLIC_KEY,
        LABEL_SIGNATURE,
        LABEL_CSR,
        LABEL_CERTIFICATE,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Hex decoding inverts encoding, including the empty buffer.
    #[test]
    fn hex_inverts(data in byte_array()) {
        let text = bytes_to_hex(&data);
        prop_assert_eq!(text.len(), data.len() * 2);
        prop_assert!(text.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        prop_assert_eq!(hex_to_bytes(&text).unwrap(), data.clone());
        prop_assert_eq!(hex_to_bytes(&text.to_uppercase()).unwrap(), data);
    }

    /// Odd-length hex is always rejected.
    #[test]
    fn hex_rejects_odd_length(data in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut text = bytes_to_hex(&data);
        text.pop();
        prop_assert!(hex_to_bytes(&text).is_err());
    }

    /// Every decoder recovers the bytes of a well-formed PEM block.
    #[test]
    fn pem_decoders_agree(data in byte_array(), label in label()) {
        let pem = to_pem(&data, label);
        prop_assert!(pem.lines().all(|line| line.len() <= 64 || line.starts_with("-----")));
        prop_assert_eq!(from_pem(&pem).unwrap(), data.clone());
        prop_assert_eq!(from_pem_labeled(&pem, label).unwrap(), data.clone());
        prop_assert_eq!(from_pem_lenient(&pem).unwrap(), data);
    }

    /// Strict decoding refuses a block closed under another label.
    #[test]
    fn strict_rejects_relabeled_end(data in byte_array(), open in label(), close in label()) {
        prop_assume!(open != close);
        let pem = to_pem(&data, open).replace(
            &format!("-----END {open}-----"),
            &format!("-----END {close}-----"),
        );
        prop_assert!(from_pem(&pem).is_err());
        prop_assert_eq!(from_pem_lenient(&pem).unwrap(), data);
    }
}
