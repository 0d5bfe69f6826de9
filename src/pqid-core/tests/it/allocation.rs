//! Allocation discipline: failing any single native allocation inside an
//! operation must leave the engine heap empty.

use pqid_core::PkiError;

use crate::support::{subject, tracking};

/// Run `$op` once per allocation it makes, failing a different allocation
/// each time, until it succeeds. Returns the number of allocations the
/// operation makes when nothing fails.
macro_rules! fail_each_allocation {
    ($engine:expr, $faults:expr, $op:expr, $failure:pat) => {{
        let mut n = 1;
        loop {
            $faults.fail_nth_malloc(n);
            let result = $op;
            $faults.disarm();
            assert_eq!(
                $engine.heap_stats().await.unwrap().live_allocations,
                0,
                "leak after failing allocation #{n}"
            );
            match result {
                Ok(_) => break,
                Err(e) => assert!(matches!(e, $failure), "allocation #{n}: unexpected {e:?}"),
            }
            n += 1;
            assert!(n < 64, "operation never succeeded");
        }
        n - 1
    }};
}

#[tokio::test]
async fn key_generation() {
    let (engine, faults) = tracking().await;
    let count = fail_each_allocation!(
        engine,
        faults,
        engine.generate_key_pair().await,
        PkiError::AllocationFailure { .. }
    );
    assert_eq!(count, 2);
}

#[tokio::test]
async fn csr_generation() {
    let (engine, faults) = tracking().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let subject = subject(&["C=US", "O=Example", "CN=example.com"]);

    let count = fail_each_allocation!(
        engine,
        faults,
        engine
            .generate_csr(key_pair.private_key(), key_pair.public_key(), &subject)
            .await,
        PkiError::AllocationFailure { .. }
    );
    // two keys, three strings, the pointer index, the output
    assert_eq!(count, 7);
}

#[tokio::test]
async fn certificate_issuance() {
    let (engine, faults) = tracking().await;
    let ca_keys = engine.generate_key_pair().await.unwrap();
    let ca_csr = engine
        .generate_csr(
            ca_keys.private_key(),
            ca_keys.public_key(),
            &subject(&["CN=ca"]),
        )
        .await
        .unwrap();

    let count = fail_each_allocation!(
        engine,
        faults,
        engine
            .generate_self_signed_certificate(ca_keys.private_key(), &ca_csr, None)
            .await,
        PkiError::AllocationFailure { .. }
    );
    assert_eq!(count, 3);

    let ca_cert = engine
        .generate_self_signed_certificate(ca_keys.private_key(), &ca_csr, None)
        .await
        .unwrap();
    let count = fail_each_allocation!(
        engine,
        faults,
        engine
            .sign_certificate(ca_keys.private_key(), &ca_csr, &ca_cert, None)
            .await,
        PkiError::AllocationFailure { .. }
    );
    assert_eq!(count, 4);
}

#[tokio::test]
async fn signing_and_verification() {
    let (engine, faults) = tracking().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let csr = engine
        .generate_csr(
            key_pair.private_key(),
            key_pair.public_key(),
            &subject(&["CN=signer"]),
        )
        .await
        .unwrap();
    let certificate = engine
        .generate_self_signed_certificate(key_pair.private_key(), &csr, None)
        .await
        .unwrap();

    let count = fail_each_allocation!(
        engine,
        faults,
        engine.sign(key_pair.private_key(), "hello").await,
        PkiError::AllocationFailure { .. }
    );
    assert_eq!(count, 3);

    let signature = engine.sign(key_pair.private_key(), "hello").await.unwrap();

    let count = fail_each_allocation!(
        engine,
        faults,
        engine.verify(key_pair.public_key(), &signature, "hello").await,
        PkiError::VerificationError { .. }
    );
    assert_eq!(count, 3);

    let count = fail_each_allocation!(
        engine,
        faults,
        engine
            .verify_with_certificate(&certificate, &signature, "hello")
            .await,
        PkiError::VerificationError { .. }
    );
    assert_eq!(count, 3);

    let count = fail_each_allocation!(
        engine,
        faults,
        engine
            .verify_certificate_issued_by_ca(&certificate, &certificate)
            .await,
        PkiError::VerificationError { .. }
    );
    assert_eq!(count, 2);
}

#[tokio::test]
async fn primitive_failures_map_to_typed_errors() {
    let (engine, faults) = tracking().await;
    let key_pair = engine.generate_key_pair().await.unwrap();
    let csr = engine
        .generate_csr(
            key_pair.private_key(),
            key_pair.public_key(),
            &subject(&["CN=x"]),
        )
        .await
        .unwrap();
    let certificate = engine
        .generate_self_signed_certificate(key_pair.private_key(), &csr, None)
        .await
        .unwrap();
    let signature = engine.sign(key_pair.private_key(), "m").await.unwrap();

    faults.fail_primitives(true);

    assert!(matches!(
        engine.generate_key_pair().await,
        Err(PkiError::KeyGenerationFailed)
    ));
    assert!(matches!(
        engine
            .generate_csr(key_pair.private_key(), key_pair.public_key(), &subject(&["CN=x"]))
            .await,
        Err(PkiError::CsrGenerationFailed)
    ));
    assert!(matches!(
        engine
            .generate_self_signed_certificate(key_pair.private_key(), &csr, None)
            .await,
        Err(PkiError::CertificateGenerationFailed)
    ));
    assert!(matches!(
        engine
            .sign_certificate(key_pair.private_key(), &csr, &certificate, None)
            .await,
        Err(PkiError::CertificateSigningFailed)
    ));
    assert!(matches!(
        engine.sign(key_pair.private_key(), "m").await,
        Err(PkiError::SigningFailed)
    ));
    assert!(!engine
        .verify(key_pair.public_key(), &signature, "m")
        .await
        .unwrap());
    assert!(!engine
        .verify_with_certificate(&certificate, &signature, "m")
        .await
        .unwrap());
    assert!(!engine
        .verify_certificate_issued_by_ca(&certificate, &certificate)
        .await
        .unwrap());

    assert_eq!(engine.heap_stats().await.unwrap().live_allocations, 0);
}
