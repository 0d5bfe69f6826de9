//! Initialization: load-once under concurrency, failure recovery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pqid_core::{
    IdentityEngine, LifecycleState, PkiConfig, PkiError, SoftwareEngine, SoftwareEngineLoader,
};

use crate::support::{FailingLoader, TrackingEngine, TrackingLoader};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initialize_loads_once() {
    let engine = Arc::new(IdentityEngine::<TrackingEngine>::new());
    let loader = Arc::new(TrackingLoader {
        delay: Some(Duration::from_millis(50)),
        ..TrackingLoader::default()
    });

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        let loader = Arc::clone(&loader);
        handles.push(tokio::spawn(async move {
            engine.initialize(&*loader).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), LifecycleState::Ready);
    assert!(engine.generate_key_pair().await.is_ok());
}

#[tokio::test]
async fn initialize_when_ready_is_noop() {
    let engine = IdentityEngine::<TrackingEngine>::new();
    let loader = TrackingLoader::default();
    engine.initialize(&loader).await.unwrap();
    engine.initialize(&loader).await.unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_load_returns_to_uninitialized() {
    let engine = IdentityEngine::<SoftwareEngine>::new();
    let err = engine.initialize(&FailingLoader).await.unwrap_err();
    assert!(matches!(err, PkiError::InitializationFailed { .. }));
    assert_eq!(engine.state(), LifecycleState::Uninitialized);
    assert!(matches!(
        engine.generate_key_pair().await,
        Err(PkiError::NotInitialized)
    ));

    engine
        .initialize(&SoftwareEngineLoader::default())
        .await
        .unwrap();
    assert!(engine.is_ready());
}

#[tokio::test]
async fn broken_heap_fails_probe() {
    let engine = IdentityEngine::<TrackingEngine>::new();
    let loader = TrackingLoader::default();
    loader.faults.fail_nth_malloc(1);

    let err = engine.initialize(&loader).await.unwrap_err();
    assert!(matches!(err, PkiError::InitializationFailed { .. }));
    assert_eq!(engine.state(), LifecycleState::Uninitialized);

    loader.faults.disarm();
    engine.initialize(&loader).await.unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unusable_config_never_loads() {
    for config in [
        PkiConfig::default().output_capacity(0),
        PkiConfig::default().output_capacity(usize::MAX),
    ] {
        let engine = IdentityEngine::<TrackingEngine>::with_config(config);
        let loader = TrackingLoader::default();

        let err = engine.initialize(&loader).await.unwrap_err();
        assert!(matches!(err, PkiError::InvalidArgument { .. }));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(engine.state(), LifecycleState::Uninitialized);
    }

    let err = IdentityEngine::<SoftwareEngine>::initialized(
        PkiConfig::default().output_capacity(usize::MAX),
        &SoftwareEngineLoader::default(),
    )
    .await
    .err()
    .unwrap();
    assert!(err.is_argument_error());
}
