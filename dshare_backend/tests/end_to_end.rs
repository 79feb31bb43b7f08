//! Coordinator workflows against the reference backend.

use bytes::Bytes;
use dshare_backend::{Backend, Client, MemoryLedger};
use dshare_core::testutil::RecordingSignals;
use dshare_core::{
    AccessHandle, FileRegistry, IdentityProvider, LoginMethod, PreconditionError, Signals,
    StorageProvider, TransferCoordinator, TransferLimits, UploadSource, WorkflowError,
};
use dshare_store_memory::MemoryStore;
use std::sync::Arc;

const ALICE_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const BOB_PHRASE: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";

struct User {
    client: Arc<Client>,
    signals: Arc<RecordingSignals>,
    coordinator: TransferCoordinator,
}

async fn user(backend: &Arc<Backend>, email: &str, phrase: &str) -> User {
    let client = Arc::new(Client::new(backend.clone()));
    client
        .login(LoginMethod::SeedPhrase {
            email: email.into(),
            phrase: phrase.into(),
        })
        .await
        .unwrap();
    let signals = Arc::new(RecordingSignals::default());
    let coordinator = TransferCoordinator::new(
        client.clone(),
        client.clone(),
        Arc::new(FileRegistry::new()),
        Signals::from_shared(signals.clone()),
    );
    User {
        client,
        signals,
        coordinator,
    }
}

fn shared_backend() -> Arc<Backend> {
    Arc::new(Backend::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryLedger::new()),
    ))
}

#[tokio::test]
async fn share_download_and_transfer() {
    let backend = shared_backend();
    let alice = user(&backend, "alice@example.com", ALICE_PHRASE).await;
    let bob = user(&backend, "bob@example.com", BOB_PHRASE).await;

    let file = alice
        .coordinator
        .upload(UploadSource::from_chunks(
            "report.pdf",
            Bytes::from(vec![1u8; 100_000]),
            16 * 1024,
        ))
        .await
        .unwrap();
    assert_eq!(file.size, 100_000);
    assert!(alice.coordinator.registry().contains_mine(&file.id));
    let quota = alice.coordinator.registry().quota().unwrap();
    assert_eq!(quota.storage_used, 100_000);

    let recipient = alice
        .coordinator
        .share(&file.id, "Bob@Example.com")
        .await
        .unwrap();
    assert_eq!(
        alice.coordinator.list_grantees(&file.id).await.unwrap(),
        vec![recipient.address.clone()]
    );

    let shared = bob.coordinator.refresh_shared().await.unwrap();
    assert_eq!(shared.len(), 1);
    let bytes = bob.coordinator.download(&file.id).await.unwrap();
    assert_eq!(bytes.len(), 100_000);
    assert_eq!(
        bob.coordinator.registry().quota().unwrap().bandwidth_used,
        100_000
    );

    alice
        .coordinator
        .transfer_ownership(&file.id, "bob@example.com")
        .await
        .unwrap();
    assert!(!alice.coordinator.registry().contains_mine(&file.id));
    assert_eq!(alice.coordinator.registry().quota().unwrap().storage_used, 0);

    let mine = bob.coordinator.refresh_mine().await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(bob.coordinator.refresh_shared().await.unwrap().is_empty());

    for user in [&alice, &bob] {
        assert!(user.signals.errors().is_empty(), "{:?}", user.signals.errors());
        assert_eq!(user.signals.busy_set_count(), user.signals.busy_clear_count());
    }
}

#[tokio::test]
async fn non_owner_delete_is_an_access_error() {
    let backend = shared_backend();
    let alice = user(&backend, "alice@example.com", ALICE_PHRASE).await;
    let bob = user(&backend, "bob@example.com", BOB_PHRASE).await;

    let file = alice
        .coordinator
        .upload(UploadSource::from_bytes("a.txt", Bytes::from_static(b"alice")))
        .await
        .unwrap();

    let err = bob.coordinator.delete_file(&file.id).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Access(_)));
    assert!(err.to_string().contains("not the owner"));
    assert_eq!(bob.signals.errors().len(), 1);
    assert_eq!(alice.coordinator.refresh_mine().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_upload_fails_through_the_transfer_stream() {
    let backend = shared_backend();
    let alice = user(&backend, "alice@example.com", ALICE_PHRASE).await;

    let source = || UploadSource::from_bytes("a.txt", Bytes::from_static(b"same"));
    alice.coordinator.upload(source()).await.unwrap();
    let err = alice.coordinator.upload(source()).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Transport(_)));
    assert_eq!(alice.coordinator.registry().mine().len(), 1);
    assert_eq!(alice.client.list_mine().await.unwrap().len(), 1);
}

#[tokio::test]
async fn understated_upload_is_stopped_at_the_limit() {
    let backend = shared_backend();
    let mut alice = user(&backend, "alice@example.com", ALICE_PHRASE).await;
    alice.coordinator = alice.coordinator.with_limits(TransferLimits {
        max_upload_size: 100,
    });

    let body = futures::stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from(vec![1u8; 8])),
        Ok(Bytes::from(vec![2u8; 992])),
    ]);
    let err = alice
        .coordinator
        .upload(UploadSource::new("understated.bin", 10, Box::new(body)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Precondition(PreconditionError::SizeLimitExceeded {
            size: 1000,
            limit: 100
        })
    ));
    assert!(alice.coordinator.registry().mine().is_empty());
    assert!(alice.client.list_mine().await.unwrap().is_empty());
    let (stored, _) = alice
        .client
        .access()
        .await
        .unwrap()
        .upload_limit()
        .await
        .unwrap();
    assert_eq!(stored, 0);
    assert_eq!(alice.signals.errors().len(), 1);
}
