//! End-to-end identity scenarios against the software engine.

use pqid_core::{IdentityEngine, KeyPair, PkiError, SoftwareEngine};

use crate::support::{software, subject};

struct Identity {
    key_pair: KeyPair,
    certificate: pqid_core::Certificate,
}

async fn self_signed(engine: &IdentityEngine, cn: &str) -> Identity {
    let key_pair = engine.generate_key_pair().await.unwrap();
    let csr = engine
        .generate_csr(
            key_pair.private_key(),
            key_pair.public_key(),
            &subject(&["C=US", cn]),
        )
        .await
        .unwrap();
    let certificate = engine
        .generate_self_signed_certificate(key_pair.private_key(), &csr, None)
        .await
        .unwrap();
    Identity {
        key_pair,
        certificate,
    }
}

#[tokio::test]
async fn hello_signature_scenario() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    assert_eq!(key_pair.private_key().len(), 4032);
    assert_eq!(key_pair.public_key().len(), 1952);

    let signature = engine.sign(key_pair.private_key(), "hello").await.unwrap();
    assert_eq!(signature.len(), 3309);

    assert!(engine
        .verify(key_pair.public_key(), &signature, "hello")
        .await
        .unwrap());
    assert!(!engine
        .verify(key_pair.public_key(), &signature, "hellx")
        .await
        .unwrap());
}

#[tokio::test]
async fn text_and_bytes_messages_agree() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let signature = engine.sign(key_pair.private_key(), "payload").await.unwrap();
    assert!(engine
        .verify(key_pair.public_key(), &signature, b"payload".to_vec())
        .await
        .unwrap());
}

#[tokio::test]
async fn foreign_signature_is_false_not_error() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let verdict = engine
        .verify(key_pair.public_key(), [0u8; 64], "hello")
        .await
        .unwrap();
    assert!(!verdict);
}

#[tokio::test]
async fn signature_from_other_key_is_rejected() {
    let engine = software().await;
    let alice = engine.generate_key_pair().await.unwrap();
    let bob = engine.generate_key_pair().await.unwrap();
    let signature = engine.sign(alice.private_key(), "hello").await.unwrap();
    assert!(!engine.verify(bob.public_key(), &signature, "hello").await.unwrap());
}

#[tokio::test]
async fn empty_message_signs_and_verifies() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let signature = engine.sign(key_pair.private_key(), "").await.unwrap();
    assert!(engine.verify(key_pair.public_key(), &signature, "").await.unwrap());
}

#[tokio::test]
async fn self_signed_certificate_is_its_own_issuer() {
    let engine = software().await;
    let root = self_signed(&engine, "CN=root.example").await;

    assert!(engine
        .verify_certificate_issued_by_ca(&root.certificate, &root.certificate)
        .await
        .unwrap());

    let record = root.certificate.record().unwrap();
    assert!(record.is_ca);
    assert!(record.is_self_issued());
    assert_eq!(record.subject.attributes(), ["C=US", "CN=root.example"]);
    assert_eq!(record.not_after - record.not_before, 365 * 86_400);
}

#[tokio::test]
async fn ca_issued_certificate_chains_to_ca_only() {
    let engine = software().await;
    let ca = self_signed(&engine, "CN=ca.example").await;
    let other_ca = self_signed(&engine, "CN=other.example").await;

    let leaf_keys = engine.generate_key_pair().await.unwrap();
    let leaf_csr = engine
        .generate_csr(
            leaf_keys.private_key(),
            leaf_keys.public_key(),
            &subject(&["CN=leaf.example"]),
        )
        .await
        .unwrap();
    let leaf = engine
        .sign_certificate(ca.key_pair.private_key(), &leaf_csr, &ca.certificate, Some(30))
        .await
        .unwrap();

    assert!(engine
        .verify_certificate_issued_by_ca(&leaf, &ca.certificate)
        .await
        .unwrap());
    assert!(!engine
        .verify_certificate_issued_by_ca(&leaf, &other_ca.certificate)
        .await
        .unwrap());
    assert!(!engine
        .verify_certificate_issued_by_ca(&ca.certificate, &other_ca.certificate)
        .await
        .unwrap());

    let record = leaf.record().unwrap();
    assert!(!record.is_ca);
    assert_eq!(record.issuer.attributes(), ["C=US", "CN=ca.example"]);
    assert_eq!(record.not_after - record.not_before, 30 * 86_400);
}

#[tokio::test]
async fn same_name_unrelated_ca_is_rejected() {
    let engine = software().await;
    let ca = self_signed(&engine, "CN=shared.example").await;
    let impostor = self_signed(&engine, "CN=shared.example").await;

    let leaf_keys = engine.generate_key_pair().await.unwrap();
    let csr = engine
        .generate_csr(
            leaf_keys.private_key(),
            leaf_keys.public_key(),
            &subject(&["CN=leaf"]),
        )
        .await
        .unwrap();
    let leaf = engine
        .sign_certificate(ca.key_pair.private_key(), &csr, &ca.certificate, None)
        .await
        .unwrap();

    assert!(!engine
        .verify_certificate_issued_by_ca(&leaf, &impostor.certificate)
        .await
        .unwrap());
}

#[tokio::test]
async fn end_entity_certificate_cannot_issue() {
    let engine = software().await;
    let ca = self_signed(&engine, "CN=ca.example").await;

    let leaf_keys = engine.generate_key_pair().await.unwrap();
    let leaf_csr = engine
        .generate_csr(
            leaf_keys.private_key(),
            leaf_keys.public_key(),
            &subject(&["CN=leaf.example"]),
        )
        .await
        .unwrap();
    let leaf = engine
        .sign_certificate(ca.key_pair.private_key(), &leaf_csr, &ca.certificate, None)
        .await
        .unwrap();

    let child_keys = engine.generate_key_pair().await.unwrap();
    let child_csr = engine
        .generate_csr(
            child_keys.private_key(),
            child_keys.public_key(),
            &subject(&["CN=child.example"]),
        )
        .await
        .unwrap();
    let err = engine
        .sign_certificate(leaf_keys.private_key(), &child_csr, &leaf, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PkiError::CertificateSigningFailed));
    assert_eq!(engine.heap_stats().await.unwrap().live_allocations, 0);
}

#[tokio::test]
async fn certificate_binds_signing_key() {
    let engine = software().await;
    let identity = self_signed(&engine, "CN=signer").await;
    let signature = engine
        .sign(identity.key_pair.private_key(), "attested")
        .await
        .unwrap();

    assert!(engine
        .verify_with_certificate(&identity.certificate, &signature, "attested")
        .await
        .unwrap());

    let mut tampered = signature.into_bytes();
    tampered[0] ^= 0x01;
    assert!(!engine
        .verify_with_certificate(&identity.certificate, &tampered, "attested")
        .await
        .unwrap());
}

#[tokio::test]
async fn garbage_certificate_verifies_false() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let signature = engine.sign(key_pair.private_key(), "m").await.unwrap();
    assert!(!engine
        .verify_with_certificate(b"not a certificate".to_vec(), &signature, "m")
        .await
        .unwrap());
    assert!(!engine
        .verify_certificate_issued_by_ca(b"x".to_vec(), b"y".to_vec())
        .await
        .unwrap());
}

#[tokio::test]
async fn argument_errors_precede_engine() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let subject = subject(&["CN=x"]);

    let short_key = engine
        .generate_csr(&[0u8; 10], key_pair.public_key(), &subject)
        .await;
    assert!(matches!(short_key, Err(PkiError::InvalidArgument { .. })));

    let short_pub = engine.verify(&[0u8; 10], [0u8; 3309], "m").await;
    assert!(matches!(short_pub, Err(PkiError::InvalidArgument { .. })));

    let empty_csr = engine
        .generate_self_signed_certificate(key_pair.private_key(), Vec::<u8>::new(), None)
        .await;
    assert!(matches!(empty_csr, Err(PkiError::InvalidArgument { .. })));

    let zero_days = engine
        .sign_certificate(key_pair.private_key(), [1u8], [1u8], Some(0))
        .await;
    assert!(matches!(zero_days, Err(PkiError::InvalidArgument { .. })));

    assert_eq!(engine.heap_stats().await.unwrap().live_allocations, 0);
}

#[tokio::test]
async fn malformed_subject_fails_in_engine() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let result = engine
        .generate_csr(
            key_pair.private_key(),
            key_pair.public_key(),
            &subject(&["no-equals-sign"]),
        )
        .await;
    assert!(matches!(result, Err(PkiError::CsrGenerationFailed)));
    assert_eq!(engine.heap_stats().await.unwrap().live_allocations, 0);
}

#[tokio::test]
async fn tampered_csr_is_not_self_signed() {
    let engine = software().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let csr = engine
        .generate_csr(
            key_pair.private_key(),
            key_pair.public_key(),
            &subject(&["CN=honest"]),
        )
        .await
        .unwrap();
    let mut bytes = csr.into_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let result = engine
        .generate_self_signed_certificate(key_pair.private_key(), bytes, None)
        .await;
    assert!(matches!(result, Err(PkiError::CertificateGenerationFailed)));
}

#[tokio::test]
async fn operations_require_initialization() {
    let engine = IdentityEngine::<SoftwareEngine>::new();
    assert!(matches!(
        engine.generate_key_pair().await,
        Err(PkiError::NotInitialized)
    ));
    assert!(matches!(
        engine.sign(&[0u8; 4032], "m").await,
        Err(PkiError::NotInitialized)
    ));
    assert!(matches!(
        engine.verify_certificate_issued_by_ca([1u8], [1u8]).await,
        Err(PkiError::NotInitialized)
    ));
    assert!(matches!(engine.heap_stats().await, Err(PkiError::NotInitialized)));
}

#[tokio::test]
async fn artifacts_survive_pem() {
    let engine = software().await;
    let identity = self_signed(&engine, "CN=pem").await;
    let pem = identity.certificate.to_pem();
    let back = pqid_core::Certificate::from_pem(&pem).unwrap();
    assert_eq!(back, identity.certificate);
    assert!(engine
        .verify_certificate_issued_by_ca(&back, &identity.certificate)
        .await
        .unwrap());
}

#[tokio::test]
async fn shared_engine_serves_concurrent_callers() {
    let engine = std::sync::Arc::new(software().await);
    let key_pair = std::sync::Arc::new(engine.generate_key_pair().await.unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = std::sync::Arc::clone(&engine);
        let key_pair = std::sync::Arc::clone(&key_pair);
        handles.push(tokio::spawn(async move {
            let message = format!("message {i}");
            let signature = engine.sign(key_pair.private_key(), &message).await.unwrap();
            engine
                .verify(key_pair.public_key(), &signature, &message)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(engine.heap_stats().await.unwrap().live_allocations, 0);
}
