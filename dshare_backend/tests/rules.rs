use bytes::Bytes;
use dshare_backend::{Backend, BackendError, Client, MemoryLedger, QuotaLimits, blob_path};
use dshare_core::keys::AccountKeys;
use dshare_core::{
    AccessHandle, FileId, IdentityProvider, LoginMethod, RecipientAddress, StorageProvider,
    TransferEvent, UploadSource,
};
use dshare_store_memory::MemoryStore;
use futures::StreamExt;
use std::sync::Arc;

const ALICE_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const BOB_PHRASE: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";
const CAROL_PHRASE: &str = "letter advice cage absurd amount doctor acoustic avoid letter advice cage above";

fn backend(limits: QuotaLimits) -> Arc<Backend> {
    Arc::new(
        Backend::new(Arc::new(MemoryStore::new()), Arc::new(MemoryLedger::new()))
            .with_limits(limits),
    )
}

async fn login(backend: &Arc<Backend>, email: &str, phrase: &str) -> Client {
    let client = Client::new(backend.clone());
    client
        .login(LoginMethod::SeedPhrase {
            email: email.into(),
            phrase: phrase.into(),
        })
        .await
        .unwrap();
    client
}

fn address(phrase: &str) -> RecipientAddress {
    AccountKeys::from_seed_phrase(phrase).unwrap().address()
}

async fn upload(client: &Client, content: &[u8]) -> anyhow::Result<FileId> {
    let uploader = client.uploader().await?;
    let mut events = uploader
        .upload(UploadSource::from_chunks("test.bin", Bytes::copy_from_slice(content), 64 * 1024))
        .await?;
    while let Some(event) = events.next().await {
        match event {
            TransferEvent::Progress { .. } => {}
            TransferEvent::Finished(id) => return Ok(id),
            TransferEvent::Failed(message) => anyhow::bail!(message),
        }
    }
    anyhow::bail!("no terminal event")
}

async fn download(client: &Client, id: &FileId) -> anyhow::Result<Bytes> {
    let downloader = client.downloader().await?;
    let mut events = downloader.download(id).await?;
    while let Some(event) = events.next().await {
        match event {
            TransferEvent::Progress { .. } => {}
            TransferEvent::Finished(bytes) => return Ok(bytes),
            TransferEvent::Failed(message) => anyhow::bail!(message),
        }
    }
    anyhow::bail!("no terminal event")
}

fn backend_error(err: &anyhow::Error) -> &BackendError {
    err.downcast_ref::<BackendError>()
        .unwrap_or_else(|| panic!("not a backend error: {err:#}"))
}

#[tokio::test]
async fn upload_assigns_content_hash_and_stores_blob() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;

    let id = upload(&alice, b"hello world").await.unwrap();

    assert_eq!(id.as_str(), blake3::hash(b"hello world").to_hex().as_str());
    assert!(backend.blobs().exists(&blob_path(&id)).await.unwrap());
    let mine = alice.list_mine().await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].size, 11);
}

#[tokio::test]
async fn body_longer_than_declared_size_is_rejected() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;

    let body = futures::stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 8])),
        Ok(Bytes::from(vec![7u8; 8])),
    ]);
    let uploader = alice.uploader().await.unwrap();
    let events: Vec<_> = uploader
        .upload(UploadSource::new("understated.bin", 10, Box::new(body)))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        events.first(),
        Some(&TransferEvent::Progress {
            transferred: 8,
            total: 10
        })
    );
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Failed(message)) if message.contains("declared")
    ));
    assert!(alice.list_mine().await.unwrap().is_empty());
    let (stored, _) = alice
        .access()
        .await
        .unwrap()
        .upload_limit()
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn duplicate_content_is_rejected() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;

    upload(&alice, b"same bytes").await.unwrap();
    let err = upload(&alice, b"same bytes").await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn only_the_owner_manages_access() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let bob = login(&backend, "bob@example.com", BOB_PHRASE).await;
    let id = upload(&alice, b"alice's notes").await.unwrap();

    let bob_access = bob.access().await.unwrap();
    let err = bob_access
        .grant(&id, &address(CAROL_PHRASE))
        .await
        .unwrap_err();
    assert!(matches!(backend_error(&err), BackendError::NotOwner { .. }));
    assert!(bob_access.delete(&id).await.is_err());
    assert!(bob_access.list_grantees(&id).await.is_err());
    assert!(
        bob_access
            .transfer_ownership(&id, &address(BOB_PHRASE))
            .await
            .is_err()
    );

    let err = download(&bob, &id).await.unwrap_err();
    assert!(matches!(backend_error(&err), BackendError::NoAccess { .. }));
}

#[tokio::test]
async fn grantee_can_download_until_revoked() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let bob = login(&backend, "bob@example.com", BOB_PHRASE).await;
    let id = upload(&alice, b"shared doc").await.unwrap();
    let access = alice.access().await.unwrap();

    access.grant(&id, &address(BOB_PHRASE)).await.unwrap();
    access.grant(&id, &address(BOB_PHRASE)).await.unwrap();
    assert_eq!(
        access.list_grantees(&id).await.unwrap(),
        vec![address(BOB_PHRASE)]
    );

    let shared = bob.list_shared().await.unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].owner, address(ALICE_PHRASE));
    assert_eq!(&download(&bob, &id).await.unwrap()[..], b"shared doc");

    access.revoke(&id, &address(BOB_PHRASE)).await.unwrap();
    assert!(bob.list_shared().await.unwrap().is_empty());
    assert!(download(&bob, &id).await.is_err());
}

#[tokio::test]
async fn transfer_moves_ownership_and_clears_grants() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let bob = login(&backend, "bob@example.com", BOB_PHRASE).await;
    let carol = login(&backend, "carol@example.com", CAROL_PHRASE).await;
    let id = upload(&alice, b"deed").await.unwrap();
    let access = alice.access().await.unwrap();
    access.grant(&id, &address(CAROL_PHRASE)).await.unwrap();

    access
        .transfer_ownership(&id, &address(BOB_PHRASE))
        .await
        .unwrap();

    assert!(alice.list_mine().await.unwrap().is_empty());
    assert_eq!(bob.list_mine().await.unwrap().len(), 1);
    assert!(carol.list_shared().await.unwrap().is_empty());
    let bob_access = bob.access().await.unwrap();
    assert!(bob_access.list_grantees(&id).await.unwrap().is_empty());
    // the previous owner lost every right
    assert!(access.delete(&id).await.is_err());
}

#[tokio::test]
async fn delete_removes_blob_and_record() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let id = upload(&alice, b"short lived").await.unwrap();

    alice.access().await.unwrap().delete(&id).await.unwrap();

    assert!(!backend.blobs().exists(&blob_path(&id)).await.unwrap());
    assert!(alice.list_mine().await.unwrap().is_empty());
    let err = alice.access().await.unwrap().delete(&id).await.unwrap_err();
    assert!(matches!(backend_error(&err), BackendError::UnknownFile(_)));
}

#[tokio::test]
async fn storage_and_bandwidth_quotas_are_enforced() {
    let backend = backend(QuotaLimits {
        total_storage: 16,
        total_bandwidth: 20,
    });
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;

    let id = upload(&alice, b"0123456789").await.unwrap();
    let err = upload(&alice, b"abcdefghij").await.unwrap_err();
    assert!(err.to_string().contains("storage quota exceeded"));

    let access = alice.access().await.unwrap();
    assert_eq!(access.upload_limit().await.unwrap(), (10, 16));

    download(&alice, &id).await.unwrap();
    download(&alice, &id).await.unwrap();
    assert_eq!(access.download_limit().await.unwrap(), (20, 20));
    let err = download(&alice, &id).await.unwrap_err();
    assert!(matches!(
        backend_error(&err),
        BackendError::BandwidthQuotaExceeded { .. }
    ));
}

#[tokio::test]
async fn identities_match_case_insensitively() {
    let backend = backend(QuotaLimits::default());
    let _bob = login(&backend, "  Bob@Example.com", BOB_PHRASE).await;
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;

    let key = alice
        .lookup_public_key("BOB@example.COM ")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(key.address(), address(BOB_PHRASE));
    assert!(
        alice
            .lookup_public_key("nobody@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn email_cannot_be_claimed_by_another_key() {
    let backend = backend(QuotaLimits::default());
    login(&backend, "alice@example.com", ALICE_PHRASE).await;

    let mallory = Client::new(backend.clone());
    let err = mallory
        .login(LoginMethod::SeedPhrase {
            email: "alice@example.com".into(),
            phrase: BOB_PHRASE.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        backend_error(&err),
        BackendError::IdentityConflict { .. }
    ));
    assert!(!mallory.is_logged_in().await.unwrap());
}

#[tokio::test]
async fn logout_disconnects_and_drops_capabilities() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let mut events = alice.subscribe();

    alice.logout().await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        dshare_core::SessionEvent::Disconnect
    );
    assert!(!alice.is_logged_in().await.unwrap());
    assert!(alice.access().await.is_err());
}

#[tokio::test]
async fn social_login_is_unsupported() {
    let backend = backend(QuotaLimits::default());
    let client = Client::new(backend);
    let err = client
        .login(LoginMethod::Social {
            provider: "google".into(),
            email: "alice@example.com".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        backend_error(&err),
        BackendError::UnsupportedLogin(_)
    ));
}

#[tokio::test]
async fn downloads_report_fixed_slices() {
    let backend = backend(QuotaLimits::default());
    let alice = login(&backend, "alice@example.com", ALICE_PHRASE).await;
    let id = upload(&alice, &vec![7u8; 600 * 1024]).await.unwrap();

    let downloader = alice.downloader().await.unwrap();
    let events: Vec<_> = downloader.download(&id).await.unwrap().collect().await;

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress { transferred, .. } => Some(*transferred),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![256 * 1024, 512 * 1024, 600 * 1024]);
    assert!(matches!(events.last(), Some(TransferEvent::Finished(b)) if b.len() == 600 * 1024));
}
